//! Layout session: store, kernels, state buffers and step controller wired
//! together behind one owner.

use std::ops::Range;

use tracing::info;

use crate::config::LayoutConfig;
use crate::controller::{Diagnostics, RunState, StepController};
use crate::error::LayoutResult;
use crate::kernels::{ComputeKernels, KernelBuffers};
use crate::store::{FlatGraph, ParticleStore};
use crate::types::{ComputeParams, Link, Particle};

/// A running force-directed layout on kernels `K`.
///
/// Graph edits are staged with [`add_particle`](Self::add_particle),
/// [`add_link`](Self::add_link) or [`build_chain`](Self::build_chain) and
/// become visible to the optimizer only after [`commit`](Self::commit).
pub struct LayoutSession<K: ComputeKernels> {
    config: LayoutConfig,
    store: ParticleStore,
    kernels: K,
    buffers: KernelBuffers<K>,
    controller: StepController,
    committed_particles: usize,
    committed_links: usize,
}

impl<K: ComputeKernels> LayoutSession<K> {
    /// Validate `config`, allocate the buffer pair and start an empty session
    pub fn new(config: LayoutConfig, mut kernels: K, run_state: RunState) -> LayoutResult<Self> {
        config.validate()?;
        let buffers = kernels.create_buffers(config.capacity)?;
        let store = ParticleStore::new(config.capacity, config.particles.clone());
        let controller = StepController::new(config.optimizer.clone(), run_state);

        Ok(Self {
            config,
            store,
            kernels,
            buffers,
            controller,
            committed_particles: 0,
            committed_links: 0,
        })
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn store(&self) -> &ParticleStore {
        &self.store
    }

    pub fn controller(&self) -> &StepController {
        &self.controller
    }

    pub fn kernels(&self) -> &K {
        &self.kernels
    }

    pub fn buffers(&self) -> &KernelBuffers<K> {
        &self.buffers
    }

    pub fn add_particle(
        &mut self,
        position: [f32; 3],
        lifetime: f32,
        size: f32,
        color_boost: f32,
    ) -> LayoutResult<u32> {
        self.store.add_particle(position, lifetime, size, color_boost)
    }

    pub fn add_link(&mut self, end1: u32, end2: u32) -> LayoutResult<u32> {
        self.store.add_link(end1, end2)
    }

    pub fn build_chain(&mut self, n: usize) -> LayoutResult<Range<u32>> {
        self.store.build_chain(n)
    }

    /// Upload the staged graph and recompute the descent direction
    pub fn commit(&mut self) -> LayoutResult<FlatGraph> {
        let graph = self.store.commit(&mut self.kernels, &mut self.buffers)?;
        self.committed_particles = graph.particles.len();
        self.committed_links = graph.links.len();

        let base = self.base_params();
        self.controller
            .prime(&mut self.kernels, &mut self.buffers, &base);
        Ok(graph)
    }

    fn base_params(&self) -> ComputeParams {
        self.config.compute_params(
            self.controller.step_length(),
            self.committed_particles,
            self.committed_links,
        )
    }

    /// Run one frame with the manual step `command`
    pub fn update(&mut self, command: i32) -> Diagnostics {
        let base = self.base_params();
        self.controller
            .update(&mut self.kernels, &mut self.buffers, &base, command)
    }

    pub fn toggle_pause(&mut self) {
        self.controller.toggle_pause();
    }

    pub fn set_run_state(&mut self, run_state: RunState) {
        self.controller.set_run_state(run_state);
    }

    /// Restart the step search from the initial step length
    pub fn reset_optimizer(&mut self) {
        self.controller.reset();
    }

    /// Discard the graph and reallocate the buffers for `capacity` particles
    pub fn reset(&mut self, capacity: usize) -> LayoutResult<()> {
        self.buffers = self.kernels.create_buffers(capacity)?;
        self.store.reset(capacity);
        self.config.capacity = capacity;
        self.committed_particles = 0;
        self.committed_links = 0;
        self.controller.reset();
        info!(capacity, "Layout session reset");
        Ok(())
    }

    /// Read back the authoritative particle buffer
    pub fn particles(&self) -> LayoutResult<Vec<Particle>> {
        self.kernels.read_particles(self.buffers.current())
    }

    pub fn links(&self) -> LayoutResult<Vec<Link>> {
        self.kernels.read_links()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.controller.diagnostics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::StepMode;
    use crate::cpu::CpuKernels;
    use crate::error::LayoutError;

    fn session(capacity: usize) -> LayoutSession<CpuKernels> {
        let mut config = LayoutConfig {
            capacity,
            ..LayoutConfig::default()
        };
        config.particles.seed = Some(3);
        LayoutSession::new(config, CpuKernels::new(), RunState::Run).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = LayoutConfig {
            capacity: 0,
            ..LayoutConfig::default()
        };
        let result = LayoutSession::new(config, CpuKernels::new(), RunState::Run);
        assert!(matches!(result, Err(LayoutError::Config(_))));
    }

    #[test]
    fn edits_are_invisible_until_commit() {
        let mut session = session(8);
        session.build_chain(3).unwrap();
        assert!(session.particles().unwrap().is_empty());

        session.commit().unwrap();
        assert_eq!(session.particles().unwrap().len(), 3);
        assert_eq!(session.links().unwrap().len(), 2);
    }

    #[test]
    fn update_before_commit_is_harmless() {
        let mut session = session(4);
        let diag = session.update(0);
        assert_eq!(diag.energy, 0.0);
        assert!(session.particles().unwrap().is_empty());
    }

    #[test]
    fn reset_reallocates_and_restarts() {
        let mut session = session(3);
        session.build_chain(3).unwrap();
        session.commit().unwrap();
        session.update(1);

        session.reset(6).unwrap();
        assert_eq!(session.store().capacity(), 6);
        assert_eq!(session.buffers().capacity(), 6);
        assert_eq!(session.store().particle_count(), 0);
        let diag = session.diagnostics();
        assert_eq!(diag.mode, StepMode::Adaptive);
        assert_eq!(diag.iterations, 0);

        session.build_chain(6).unwrap();
        session.commit().unwrap();
        assert_eq!(session.particles().unwrap().len(), 6);
    }

    #[test]
    fn reset_discards_uploaded_links_before_next_commit() {
        let mut session = session(3);
        session.build_chain(3).unwrap();
        session.commit().unwrap();
        session.update(0);

        session.reset(6).unwrap();
        assert!(session.links().unwrap().is_empty());
        assert!(session.kernels().link_ptrs().is_empty());

        let diag = session.update(0);
        assert_eq!(diag.energy, 0.0);
        assert!(session.particles().unwrap().is_empty());
        assert!(session.links().unwrap().is_empty());

        session.build_chain(4).unwrap();
        session.commit().unwrap();
        assert_eq!(session.links().unwrap().len(), 3);
    }

    #[test]
    fn paused_session_keeps_positions() {
        let mut session = session(4);
        session.build_chain(4).unwrap();
        session.commit().unwrap();
        session.toggle_pause();

        let before = session.particles().unwrap();
        session.update(0);
        let after = session.particles().unwrap();
        assert_eq!(before, after);
    }
}
