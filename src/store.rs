//! Particle/link store and injector
//!
//! Graph edits are staged in host memory: particles and links are appended
//! to plain lists and every link registers itself in both endpoints'
//! adjacency lists. [`ParticleStore::commit`] then flattens the adjacency
//! lists into one pointer table (each particle owns a contiguous run) and
//! uploads everything to the kernel buffers. Nothing reaches the kernels
//! until commit, so edits can be batched.

use std::ops::Range;

use glam::{Vec3, Vec4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::config::ParticleConfig;
use crate::error::{LayoutError, LayoutResult};
use crate::kernels::{ComputeKernels, KernelBuffers};
use crate::types::{Link, Particle};

/// Lifetime given to particles seeded by [`ParticleStore::build_chain`]
const CHAIN_LIFETIME: f32 = 9999.0;

/// Size given to particles seeded by [`ParticleStore::build_chain`]
const CHAIN_PARTICLE_SIZE: f32 = 5.0;

/// Compact, kernel-ready form of the graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatGraph {
    /// Particles with `links_ptr`/`links_count` filled in
    pub particles: Vec<Particle>,
    pub links: Vec<Link>,
    /// Incident link indices, one contiguous run per particle
    pub link_ptrs: Vec<u32>,
}

impl FlatGraph {
    /// Indices of the links incident to `particle`, or `None` if there is
    /// no such particle
    pub fn adjacency(&self, particle: usize) -> Option<&[u32]> {
        let p = self.particles.get(particle)?;
        let start = p.links_ptr as usize;
        self.link_ptrs.get(start..start + p.links_count as usize)
    }
}

/// Host-side particle and link lists with a fixed particle capacity
pub struct ParticleStore {
    particles: Vec<Particle>,
    links: Vec<Link>,
    link_lists: Vec<Vec<u32>>,
    capacity: usize,
    config: ParticleConfig,
    rng: StdRng,
}

impl ParticleStore {
    /// Create an empty store for up to `capacity` particles
    pub fn new(capacity: usize, config: ParticleConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            particles: Vec::with_capacity(capacity),
            links: Vec::new(),
            link_lists: Vec::with_capacity(capacity),
            capacity,
            config,
            rng,
        }
    }

    /// Discard all particles and links and set a new capacity
    pub fn reset(&mut self, capacity: usize) {
        self.particles = Vec::with_capacity(capacity);
        self.links.clear();
        self.link_lists = Vec::with_capacity(capacity);
        self.capacity = capacity;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn config(&self) -> &ParticleConfig {
        &self.config
    }

    /// Links registered so far for `particle`, in insertion order
    pub fn incident_links(&self, particle: usize) -> &[u32] {
        &self.link_lists[particle]
    }

    /// Append a particle at rest.
    ///
    /// Mass is drawn uniformly from the configured range and the color is a
    /// uniform RGBA sample scaled by `color_boost`. Returns the new index.
    pub fn add_particle(
        &mut self,
        position: [f32; 3],
        lifetime: f32,
        size: f32,
        color_boost: f32,
    ) -> LayoutResult<u32> {
        if self.particles.len() >= self.capacity {
            return Err(LayoutError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let mass = self.sample_mass();
        let color = Vec4::new(
            self.rng.random(),
            self.rng.random(),
            self.rng.random(),
            self.rng.random(),
        ) * color_boost;

        let index = self.particles.len() as u32;
        self.particles.push(
            Particle::new(position, mass)
                .with_size(size)
                .with_color(color.to_array())
                .with_lifetime(lifetime),
        );
        self.link_lists.push(Vec::new());
        Ok(index)
    }

    /// Append a link between two existing particles. Returns the new index.
    ///
    /// On error the store is left unchanged.
    pub fn add_link(&mut self, end1: u32, end2: u32) -> LayoutResult<u32> {
        let particle_count = self.particles.len();
        for endpoint in [end1, end2] {
            if endpoint as usize >= particle_count {
                return Err(LayoutError::InvalidEndpoint {
                    endpoint,
                    particle_count,
                });
            }
        }
        if end1 == end2 {
            return Err(LayoutError::SelfLink(end1));
        }

        let index = self.links.len() as u32;
        self.links.push(Link::new(end1, end2));
        self.link_lists[end1 as usize].push(index);
        self.link_lists[end2 as usize].push(index);
        Ok(index)
    }

    /// Seed a path graph of `n` particles.
    ///
    /// Each particle sits one link length from its predecessor in a random
    /// direction, and consecutive particles are linked. The chain is appended
    /// to whatever the store already holds; if it does not fit, nothing is
    /// added. Returns the index range of the new particles.
    pub fn build_chain(&mut self, n: usize) -> LayoutResult<Range<u32>> {
        if self.particles.len() + n > self.capacity {
            return Err(LayoutError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let first = self.particles.len() as u32;
        let mut pos = Vec3::ZERO;
        for _ in 0..n {
            self.add_particle(pos.to_array(), CHAIN_LIFETIME, CHAIN_PARTICLE_SIZE, 1.0)?;
            pos += self.radial_random_vector() * self.config.link_size;
        }

        let end = first + n as u32;
        for i in (first + 1)..end {
            self.add_link(i - 1, i)?;
        }
        Ok(first..end)
    }

    /// Random unit vector with isotropic direction.
    ///
    /// Samples the unit ball by rejection before normalizing; a per-axis
    /// sample normalized directly would favor the cube's diagonals.
    pub fn radial_random_vector(&mut self) -> Vec3 {
        loop {
            let r = Vec3::new(
                self.rng.random_range(-1.0..1.0),
                self.rng.random_range(-1.0..1.0),
                self.rng.random_range(-1.0..1.0),
            );
            let len_sq = r.length_squared();
            // Near-zero samples cannot be normalized
            if len_sq <= 1.0 && len_sq > 1e-12 {
                return r / len_sq.sqrt();
            }
        }
    }

    fn sample_mass(&mut self) -> f32 {
        let (min, max) = (self.config.min_mass, self.config.max_mass);
        if max > min {
            self.rng.random_range(min..=max)
        } else {
            min
        }
    }

    /// Build the flattened adjacency index.
    ///
    /// Runs are laid out in particle order, so the pointer table has exactly
    /// two entries per link.
    pub fn flatten(&self) -> FlatGraph {
        let mut particles = self.particles.clone();
        let mut link_ptrs = Vec::with_capacity(self.links.len() * 2);

        for (particle, list) in particles.iter_mut().zip(&self.link_lists) {
            particle.links_ptr = link_ptrs.len() as u32;
            particle.links_count = list.len() as u32;
            link_ptrs.extend_from_slice(list);
        }

        FlatGraph {
            particles,
            links: self.links.clone(),
            link_ptrs,
        }
    }

    /// Flatten the staged graph and upload it to the kernel buffers
    pub fn commit<K: ComputeKernels>(
        &self,
        kernels: &mut K,
        buffers: &mut KernelBuffers<K>,
    ) -> LayoutResult<FlatGraph> {
        if self.particles.len() > buffers.capacity() {
            return Err(LayoutError::CapacityExceeded {
                capacity: buffers.capacity(),
            });
        }

        let graph = self.flatten();
        kernels.upload(&graph, buffers)?;
        info!(
            particles = graph.particles.len(),
            links = graph.links.len(),
            "Committed graph"
        );
        Ok(graph)
    }
}
