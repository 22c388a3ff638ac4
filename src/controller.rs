//! Adaptive step-length controller
//!
//! Each iteration moves every particle from the current buffer along its
//! descent direction into the next buffer, then decides whether the trial
//! step length was acceptable using two Wolfe-type conditions:
//!
//! - **Sufficient decrease**: `E(k+1) - E(k) <= step * C1 * (p·∇E)(k)`
//! - **Curvature**: `(p·∇E)(k+1) >= C2 * (p·∇E)(k)`
//!
//! | decrease | curvature | action        |
//! |----------|-----------|---------------|
//! | yes      | yes       | accept        |
//! | yes      | no        | increase step |
//! | no       | no        | increase step |
//! | no       | yes       | decrease step |
//!
//! Steps change by a fixed additive amount, not multiplicatively. The search
//! is bounded by `SearchIterations` tries; when they run out the last trial
//! state is accepted as is, even if its energy went up. This trades line
//! search correctness for guaranteed forward progress.
//!
//! Once the chosen step length has stayed the same for `SwitchToManualAfter`
//! consecutive iterations, the controller switches to FIXED mode: every
//! iteration is a single move with no energy evaluation. Only
//! [`StepController::reset`] returns it to ADAPTIVE.

use std::fmt;

use tracing::{debug, info, warn};

use crate::config::OptimizerConfig;
use crate::kernels::{ComputeKernels, EnergyReport, KernelBuffers};
use crate::types::ComputeParams;

/// Step-length regime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    /// Line search on every iteration
    Adaptive,
    /// Step length frozen, one move per iteration
    Fixed,
}

impl fmt::Display for StepMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepMode::Adaptive => write!(f, "ADAPTIVE"),
            StepMode::Fixed => write!(f, "FIXED"),
        }
    }
}

/// Whether update ticks execute iterations at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Run,
    Pause,
}

impl RunState {
    pub fn toggled(self) -> Self {
        match self {
            RunState::Run => RunState::Pause,
            RunState::Pause => RunState::Run,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Run => write!(f, "RUN"),
            RunState::Pause => write!(f, "PAUSE"),
        }
    }
}

/// Snapshot of the controller after the last update, for display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Diagnostics {
    pub mode: StepMode,
    pub run_state: RunState,
    pub step_length: f32,
    /// Energy of the last accepted adaptive trial
    pub energy: f32,
    /// Energy change of the last accepted adaptive trial
    pub delta_energy: f32,
    /// Directional derivative at the last accepted adaptive trial
    pub directional_derivative: f32,
    /// Total line-search tries since reset
    pub iterations: u64,
    /// Consecutive iterations without a step change
    pub stability: u32,
    /// Tries used by the last iteration
    pub last_tries: u32,
    /// Iterations whose search ran out of tries
    pub forced_accepts: u64,
    pub checksum: f32,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "mode: {} ({})", self.mode, self.run_state)?;
        writeln!(f, "step length: {}", self.step_length)?;
        writeln!(f, "energy: {}", self.energy)?;
        writeln!(f, "delta energy: {}", self.delta_energy)?;
        writeln!(f, "directional derivative: {}", self.directional_derivative)?;
        writeln!(f, "iterations: {}", self.iterations)?;
        writeln!(f, "stability: {}", self.stability)?;
        write!(f, "checksum: {}", self.checksum)
    }
}

/// Iterative energy minimizer with an adaptive step length.
///
/// The controller owns no particle data; callers pass the kernels and the
/// buffer pair into every call.
#[derive(Debug, Clone)]
pub struct StepController {
    config: OptimizerConfig,
    step_length: f32,
    chosen_step_length: f32,
    mode: StepMode,
    run_state: RunState,
    primed: bool,
    iterations: u64,
    stability: u32,
    last_tries: u32,
    forced_accepts: u64,
    energy: f32,
    delta_energy: f32,
    directional_derivative: f32,
    checksum: f32,
}

impl StepController {
    /// Create a controller in ADAPTIVE mode with the given run flag
    pub fn new(config: OptimizerConfig, run_state: RunState) -> Self {
        let step_length = config.initial_step_length;
        Self {
            config,
            step_length,
            chosen_step_length: step_length,
            mode: StepMode::Adaptive,
            run_state,
            primed: false,
            iterations: 0,
            stability: 0,
            last_tries: 0,
            forced_accepts: 0,
            energy: 0.0,
            delta_energy: 0.0,
            directional_derivative: 0.0,
            checksum: 0.0,
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn step_length(&self) -> f32 {
        self.step_length
    }

    pub fn mode(&self) -> StepMode {
        self.mode
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn set_run_state(&mut self, run_state: RunState) {
        self.run_state = run_state;
    }

    pub fn toggle_pause(&mut self) {
        self.run_state = self.run_state.toggled();
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn stability(&self) -> u32 {
        self.stability
    }

    /// Restore the initial step length, zero the counters and return to
    /// ADAPTIVE. The next update recomputes the descent direction.
    pub fn reset(&mut self) {
        self.step_length = self.config.initial_step_length;
        self.chosen_step_length = self.step_length;
        self.iterations = 0;
        self.stability = 0;
        self.last_tries = 0;
        self.forced_accepts = 0;
        self.mode = StepMode::Adaptive;
        self.primed = false;
        info!(step_length = self.step_length, "Step controller reset");
    }

    fn increase_step(&self, step: f32) -> f32 {
        step + self.config.step_adjustment
    }

    fn decrease_step(&self, step: f32) -> f32 {
        step - self.config.step_adjustment
    }

    fn params(&self, base: &ComputeParams) -> ComputeParams {
        ComputeParams {
            step_length: self.step_length,
            ..*base
        }
    }

    /// Compute the descent direction and energy of the current buffer.
    ///
    /// Must run after every commit, before the first move.
    pub fn prime<K: ComputeKernels>(
        &mut self,
        kernels: &mut K,
        buffers: &mut KernelBuffers<K>,
        base: &ComputeParams,
    ) {
        let params = self.params(base);
        kernels.compute_descent(buffers.current_mut(), &params);

        let (current, _, scratch) = buffers.split_mut();
        let report = kernels.energy_and_dot(current, current, scratch, &params);
        self.energy = report.energy;
        self.directional_derivative = report.directional_derivative;
        self.checksum = report.checksum;
        self.primed = true;
    }

    /// Run one frame: apply the manual command, then `IterationsPerFrame`
    /// iterations if the run flag is RUN.
    ///
    /// A positive `command` increases the step length by one adjustment, a
    /// negative one decreases it, regardless of mode and run flag.
    pub fn update<K: ComputeKernels>(
        &mut self,
        kernels: &mut K,
        buffers: &mut KernelBuffers<K>,
        base: &ComputeParams,
        command: i32,
    ) -> Diagnostics {
        if command > 0 {
            self.step_length = self.increase_step(self.step_length);
        } else if command < 0 {
            self.step_length = self.decrease_step(self.step_length);
        }

        if self.run_state == RunState::Run {
            if !self.primed {
                self.prime(kernels, buffers, base);
            }
            for _ in 0..self.config.iterations_per_frame {
                self.iterate(kernels, buffers, base);
            }
        }

        self.diagnostics()
    }

    /// One accepted step: line search, swap, stability bookkeeping
    fn iterate<K: ComputeKernels>(
        &mut self,
        kernels: &mut K,
        buffers: &mut KernelBuffers<K>,
        base: &ComputeParams,
    ) {
        let c1 = self.config.sufficient_decrease;
        let c2 = self.config.curvature;

        let mut ek = self.energy;
        let mut pk_grad_ek = self.directional_derivative;
        if self.mode == StepMode::Adaptive {
            let params = self.params(base);
            let (current, _, scratch) = buffers.split_mut();
            let report = kernels.energy_and_dot(current, current, scratch, &params);
            ek = report.energy;
            pk_grad_ek = report.directional_derivative;
            self.checksum = report.checksum;
        }

        let mut tries = 0;
        let mut accepted: Option<EnergyReport> = None;
        loop {
            let params = self.params(base);
            let (current, next, scratch) = buffers.split_mut();
            kernels.move_vertices(current, next, &params);
            kernels.compute_descent(next, &params);
            tries += 1;
            self.iterations += 1;

            if self.mode == StepMode::Fixed {
                break;
            }

            let report = kernels.energy_and_dot(current, next, scratch, &params);
            self.checksum = report.checksum;
            accepted = Some(report);

            let decrease = report.energy - ek <= self.step_length * c1 * pk_grad_ek;
            let curvature = report.directional_derivative >= c2 * pk_grad_ek;
            debug!(
                step_length = self.step_length,
                decrease,
                curvature,
                delta_energy = report.energy - ek,
                "Line search try {}",
                tries
            );

            match (decrease, curvature) {
                (true, true) => break,
                (_, false) => self.step_length = self.increase_step(self.step_length),
                (false, true) => self.step_length = self.decrease_step(self.step_length),
            }

            if tries >= self.config.search_iterations {
                warn!(
                    tries,
                    step_length = self.step_length,
                    "Line search exhausted, accepting last trial"
                );
                self.forced_accepts += 1;
                break;
            }
        }

        buffers.swap();
        self.last_tries = tries;

        if self.step_length == self.chosen_step_length {
            self.stability += 1;
        } else {
            self.stability = 0;
        }
        self.chosen_step_length = self.step_length;

        if self.mode == StepMode::Adaptive && self.stability >= self.config.switch_to_manual_after
        {
            self.mode = StepMode::Fixed;
            info!(
                step_length = self.step_length,
                stability = self.stability,
                "Stable step length found, switching to fixed step"
            );
        }

        if let Some(report) = accepted {
            self.energy = report.energy;
            self.delta_energy = report.energy - ek;
            self.directional_derivative = report.directional_derivative;
        }
    }

    /// Metrics of the last update
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            mode: self.mode,
            run_state: self.run_state,
            step_length: self.step_length,
            energy: self.energy,
            delta_energy: self.delta_energy,
            directional_derivative: self.directional_derivative,
            iterations: self.iterations,
            stability: self.stability,
            last_tries: self.last_tries,
            forced_accepts: self.forced_accepts,
            checksum: self.checksum,
        }
    }
}
