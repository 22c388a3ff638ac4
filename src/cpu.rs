//! Reference CPU implementation of the layout kernels
//!
//! Each kernel is written as a loop over lanes (one per particle or link),
//! mirroring the data-parallel shaders of the GPU backend.
//!
//! Energy model:
//! - spring energy per link: `½·k·(r − L)²`
//! - repulsion energy per particle pair: `q / max(r, min_distance)`
//!
//! The descent direction stored in `acceleration` is the force divided by
//! the particle mass, so it is always a descent direction for the energy.

use glam::Vec3;

use crate::buffers::StateBuffers;
use crate::config::IntegratorType;
use crate::error::{LayoutError, LayoutResult};
use crate::kernels::{ComputeKernels, EnergyReport, KernelBuffers};
use crate::store::FlatGraph;
use crate::types::{ComputeParams, Link, Particle};

/// Sequential kernels operating on host memory
#[derive(Debug, Default)]
pub struct CpuKernels {
    links: Vec<Link>,
    link_ptrs: Vec<u32>,
}

impl CpuKernels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flattened link-pointer table uploaded by the last commit
    pub fn link_ptrs(&self) -> &[u32] {
        &self.link_ptrs
    }
}

fn positions(particles: &[Particle]) -> Vec<Vec3> {
    particles.iter().map(|p| Vec3::from_array(p.xyz())).collect()
}

/// Per-link lane: orientation and per-endpoint spring force magnitudes
fn link_pass(links: &mut [Link], positions: &[Vec3], params: &ComputeParams) {
    for link in links.iter_mut() {
        let delta = positions[link.par2 as usize] - positions[link.par1 as usize];
        let dist = delta.length();
        let orientation = if dist > 0.0 { delta / dist } else { Vec3::ZERO };
        let magnitude = params.link_stiffness * (dist - params.link_size);

        link.orientation = orientation.to_array();
        link.force1 = magnitude;
        link.force2 = magnitude;
    }
}

/// Repulsion force on particle `i` from every other particle
fn repulsion(i: usize, positions: &[Vec3], params: &ComputeParams) -> Vec3 {
    let xi = positions[i];
    let mut force = Vec3::ZERO;
    for (j, &xj) in positions.iter().enumerate() {
        if j == i {
            continue;
        }
        let delta = xi - xj;
        let dist = delta.length();
        // Inside the softening radius the energy is flat
        if dist <= params.min_distance || dist == 0.0 {
            continue;
        }
        force += delta * (params.repulsion / (dist * dist * dist));
    }
    force
}

/// Per-particle lane: accumulate forces through the adjacency run
fn descent_pass(
    links: &[Link],
    link_ptrs: &[u32],
    particles: &[Particle],
    positions: &[Vec3],
    params: &ComputeParams,
) -> Vec<Vec3> {
    particles
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let start = p.links_ptr as usize;
            let run = &link_ptrs[start..start + p.links_count as usize];

            let mut force = Vec3::ZERO;
            for &l in run {
                let link = &links[l as usize];
                let orientation = Vec3::from_array(link.orientation);
                if link.par1 as usize == i {
                    force += orientation * link.force1;
                } else {
                    force -= orientation * link.force2;
                }
            }
            force += repulsion(i, positions, params);
            force / p.mass()
        })
        .collect()
}

/// Energy attributed to particle `i`: half of each incident spring and half
/// of each pair interaction, so the lanes sum to the total
fn particle_energy(
    i: usize,
    links: &[Link],
    link_ptrs: &[u32],
    particle: &Particle,
    positions: &[Vec3],
    params: &ComputeParams,
) -> f32 {
    let start = particle.links_ptr as usize;
    let run = &link_ptrs[start..start + particle.links_count as usize];

    let mut energy = 0.0;
    for &l in run {
        let link = &links[l as usize];
        let other = link.other(i as u32) as usize;
        let stretch = positions[i].distance(positions[other]) - params.link_size;
        energy += 0.25 * params.link_stiffness * stretch * stretch;
    }
    for (j, &xj) in positions.iter().enumerate() {
        if j != i {
            let dist = positions[i].distance(xj).max(params.min_distance);
            energy += 0.5 * params.repulsion / dist;
        }
    }
    energy
}

impl ComputeKernels for CpuKernels {
    type Buffer = Vec<Particle>;
    type Scratch = Vec<f32>;

    fn create_buffers(&mut self, capacity: usize) -> LayoutResult<KernelBuffers<Self>> {
        // Fresh buffers hold no particles, so the old topology is stale
        self.links.clear();
        self.link_ptrs.clear();
        Ok(StateBuffers::new(
            Vec::with_capacity(capacity),
            Vec::with_capacity(capacity),
            vec![0.0; capacity],
            capacity,
        ))
    }

    fn upload(&mut self, graph: &FlatGraph, buffers: &mut KernelBuffers<Self>) -> LayoutResult<()> {
        if graph.particles.len() > buffers.capacity() {
            return Err(LayoutError::CapacityExceeded {
                capacity: buffers.capacity(),
            });
        }
        for slot in buffers.slots_mut() {
            slot.clear();
            slot.extend_from_slice(&graph.particles);
        }
        self.links = graph.links.clone();
        self.link_ptrs = graph.link_ptrs.clone();
        Ok(())
    }

    fn compute_descent(&mut self, buffer: &mut Self::Buffer, params: &ComputeParams) {
        let positions = positions(buffer);
        link_pass(&mut self.links, &positions, params);
        let descent = descent_pass(&self.links, &self.link_ptrs, buffer, &positions, params);
        for (particle, direction) in buffer.iter_mut().zip(descent) {
            particle.acceleration = direction.to_array();
        }
    }

    fn energy_and_dot(
        &mut self,
        a: &Self::Buffer,
        b: &Self::Buffer,
        scratch: &mut Self::Scratch,
        params: &ComputeParams,
    ) -> EnergyReport {
        let positions = positions(b);
        let mut directional_derivative = 0.0;
        let mut checksum = 0.0;

        for (i, (pa, pb)) in a.iter().zip(b).enumerate() {
            scratch[i] = particle_energy(i, &self.links, &self.link_ptrs, pb, &positions, params);

            // Gradient at b is the negated force, i.e. -mass * descent
            let gradient = Vec3::from_array(pb.acceleration) * -pb.mass();
            directional_derivative += Vec3::from_array(pa.acceleration).dot(gradient);
            checksum += pb.position[0] + pb.position[1] + pb.position[2];
        }

        EnergyReport {
            energy: scratch[..b.len()].iter().sum(),
            directional_derivative,
            checksum,
        }
    }

    fn move_vertices(
        &mut self,
        source: &Self::Buffer,
        destination: &mut Self::Buffer,
        params: &ComputeParams,
    ) {
        let step = params.step_length;
        let start = positions(source);

        let directions: Vec<Vec3> = match IntegratorType::from_flag(params.integrator) {
            IntegratorType::Euler => source
                .iter()
                .map(|p| Vec3::from_array(p.acceleration))
                .collect(),
            IntegratorType::RungeKutta => {
                // Midpoint stage evaluated on a private copy of the link table
                let midpoint: Vec<Vec3> = source
                    .iter()
                    .zip(&start)
                    .map(|(p, &x)| x + Vec3::from_array(p.acceleration) * (0.5 * step))
                    .collect();
                let mut stage_links = self.links.clone();
                link_pass(&mut stage_links, &midpoint, params);
                descent_pass(&stage_links, &self.link_ptrs, source, &midpoint, params)
            }
        };

        destination.clear();
        destination.extend(source.iter().zip(start).zip(directions).map(
            |((p, x), direction)| {
                let displacement = direction * step;
                let moved = x + displacement;
                Particle {
                    position: [moved.x, moved.y, moved.z, p.mass()],
                    velocity: displacement.to_array(),
                    ..*p
                }
            },
        ));
    }

    fn read_particles(&self, buffer: &Self::Buffer) -> LayoutResult<Vec<Particle>> {
        Ok(buffer.clone())
    }

    fn read_links(&self) -> LayoutResult<Vec<Link>> {
        Ok(self.links.clone())
    }
}
