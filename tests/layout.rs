use graphvis::{
    CpuKernels, IntegratorType, LayoutConfig, LayoutError, LayoutSession, RunState, StepMode,
};

fn seeded_config(capacity: usize) -> LayoutConfig {
    let mut config = LayoutConfig {
        capacity,
        ..LayoutConfig::default()
    };
    config.particles.seed = Some(42);
    config
}

fn stretched_pair(config: LayoutConfig) -> LayoutSession<CpuKernels> {
    let mut session = LayoutSession::new(config, CpuKernels::new(), RunState::Run).unwrap();
    session.add_particle([0.0, 0.0, 0.0], 1.0, 1.0, 1.0).unwrap();
    session.add_particle([20.0, 0.0, 0.0], 1.0, 1.0, 1.0).unwrap();
    session.add_link(0, 1).unwrap();
    session.commit().unwrap();
    session
}

#[test]
fn chain_of_five_round_trips_through_commit() {
    let mut session = LayoutSession::new(seeded_config(5), CpuKernels::new(), RunState::Pause)
        .unwrap();
    session.build_chain(5).unwrap();
    let graph = session.commit().unwrap();

    let counts: Vec<u32> = graph.particles.iter().map(|p| p.links_count).collect();
    assert_eq!(counts, vec![1, 2, 2, 2, 1]);
    assert_eq!(graph.link_ptrs.len(), 8);

    let particles = session.particles().unwrap();
    assert_eq!(particles.len(), 5);
    for (read, staged) in particles.iter().zip(session.store().particles()) {
        assert_eq!(read.position, staged.position);
        assert_eq!(read.color, staged.color);
        assert_eq!(read.size, staged.size);
    }
    for (read, committed) in particles.iter().zip(&graph.particles) {
        assert_eq!(read.links_ptr, committed.links_ptr);
        assert_eq!(read.links_count, committed.links_count);
    }

    let links = session.links().unwrap();
    let endpoints: Vec<(u32, u32)> = links.iter().map(|l| (l.par1, l.par2)).collect();
    assert_eq!(endpoints, vec![(0, 1), (1, 2), (2, 3), (3, 4)]);
}

#[test]
fn invalid_endpoint_leaves_links_unchanged() {
    let mut session = LayoutSession::new(seeded_config(5), CpuKernels::new(), RunState::Pause)
        .unwrap();
    session.build_chain(5).unwrap();
    session.commit().unwrap();

    let err = session.add_link(0, 7).unwrap_err();
    assert!(matches!(err, LayoutError::InvalidEndpoint { endpoint: 7, .. }));
    assert_eq!(session.store().link_count(), 4);
}

#[test]
fn capacity_overflow_requires_reset() {
    let mut session = LayoutSession::new(seeded_config(4), CpuKernels::new(), RunState::Run)
        .unwrap();
    assert!(matches!(
        session.build_chain(5),
        Err(LayoutError::CapacityExceeded { capacity: 4 })
    ));

    session.reset(5).unwrap();
    session.build_chain(5).unwrap();
    session.commit().unwrap();
    assert_eq!(session.particles().unwrap().len(), 5);
}

#[test]
fn adaptive_frames_reduce_energy() {
    let mut session = stretched_pair(LayoutConfig::default());
    let mut energy = session.diagnostics().energy;

    for _ in 0..5 {
        let diag = session.update(0);
        assert!(diag.energy < energy, "{} !< {}", diag.energy, energy);
        assert!(diag.delta_energy < 0.0);
        energy = diag.energy;
    }

    let particles = session.particles().unwrap();
    let gap = particles[1].position[0] - particles[0].position[0];
    assert!(gap < 20.0 && gap > 10.0, "gap = {gap}");
}

#[test]
fn midpoint_integrator_also_contracts() {
    let mut config = LayoutConfig::default();
    config.particles.integrator = IntegratorType::RungeKutta;
    let mut session = stretched_pair(config);

    for _ in 0..5 {
        session.update(0);
    }
    let particles = session.particles().unwrap();
    let gap = particles[1].position[0] - particles[0].position[0];
    assert!(gap < 20.0, "gap = {gap}");
}

#[test]
fn accepted_iteration_publishes_next_buffer() {
    let mut session = stretched_pair(LayoutConfig::default());
    let before = session.particles().unwrap();
    let swaps = session.buffers().swap_count();

    session.update(0);
    let after = session.particles().unwrap();
    assert_eq!(session.buffers().swap_count(), swaps + 1);
    assert!(after[0].position[0] > before[0].position[0]);
    assert!(after[1].position[0] < before[1].position[0]);
    // Velocity records the accepted displacement
    let moved = after[0].position[0] - before[0].position[0];
    assert!((after[0].velocity[0] - moved).abs() < 1e-5);
}

#[test]
fn stable_layout_switches_to_fixed_step() {
    let mut config = LayoutConfig::default();
    config.optimizer.switch_to_manual_after = 3;
    let mut session = stretched_pair(config);

    let mut diag = session.diagnostics();
    for _ in 0..10 {
        diag = session.update(0);
    }
    assert_eq!(diag.mode, StepMode::Fixed);
    assert_eq!(diag.last_tries, 1);

    session.reset_optimizer();
    let diag = session.diagnostics();
    assert_eq!(diag.mode, StepMode::Adaptive);
    assert_eq!(diag.iterations, 0);
    assert_eq!(diag.step_length, 0.01);
}

#[test]
fn paused_session_only_applies_nudges() {
    let mut session = stretched_pair(LayoutConfig::default());
    session.toggle_pause();
    let before = session.particles().unwrap();

    for _ in 0..3 {
        session.update(1);
    }
    let diag = session.diagnostics();
    assert_eq!(diag.run_state, RunState::Pause);
    assert!((diag.step_length - 0.04).abs() < 1e-6);
    assert_eq!(diag.iterations, 0);
    assert_eq!(session.particles().unwrap(), before);
}
