//! Particle and link buffer types
//!
//! These types are designed to be uploaded directly to GPU buffers.
//! All use f32/u32 for GPU compatibility and are repr(C) for predictable layout.

use bytemuck::{Pod, Zeroable};

// =============================================================================
// Default Constants
// =============================================================================

/// Default step length the optimizer starts from and returns to on reset
pub const DEFAULT_STEP_LENGTH: f32 = 0.01;

/// Default additive step adjustment, for both line search and manual nudges
pub const DEFAULT_STEP_ADJUSTMENT: f32 = 0.01;

/// Default sufficient-decrease constant (first Wolfe condition)
pub const DEFAULT_C1: f32 = 0.3;

/// Default curvature constant (second Wolfe condition)
pub const DEFAULT_C2: f32 = 0.99;

/// Default rest length of a link, also the spacing used by chain seeding
pub const DEFAULT_LINK_SIZE: f32 = 10.0;

/// Default particle mass (min and max coincide)
pub const DEFAULT_PARTICLE_MASS: f32 = 0.5;

/// Default particle capacity of a store
pub const DEFAULT_CAPACITY: usize = 1024;

/// Default spring constant for links
pub const DEFAULT_LINK_STIFFNESS: f32 = 1.0;

/// Default strength of the pairwise repulsion
pub const DEFAULT_REPULSION: f32 = 10.0;

/// Default softening distance for the pairwise repulsion (avoids singularity)
pub const DEFAULT_MIN_DISTANCE: f32 = 0.1;

/// A node of the layout, modeled as a point mass.
///
/// Layout matches the WGSL struct for direct buffer upload (80 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Particle {
    /// Position in 3D space, mass packed into `w`
    pub position: [f32; 4],
    /// Displacement applied by the last move
    pub velocity: [f32; 3],
    /// Base size for rendering
    pub size: f32,
    /// Base RGBA color for rendering
    pub color: [f32; 4],
    /// Descent direction computed by the descent kernel
    pub acceleration: [f32; 3],
    /// Total lifetime (provisioned, not consulted by the optimizer)
    pub total_lifetime: f32,
    /// Elapsed lifetime
    pub lifetime: f32,
    /// Offset of this particle's run in the flattened link-pointer table
    pub links_ptr: u32,
    /// Number of links incident to this particle
    pub links_count: u32,
    /// Padding for 16-byte alignment
    pub _padding: f32,
}

impl Particle {
    /// Create a particle at rest at the given position
    pub fn new(position: [f32; 3], mass: f32) -> Self {
        Self {
            position: [position[0], position[1], position[2], mass],
            size: 1.0,
            color: [1.0; 4],
            ..Self::zeroed()
        }
    }

    pub fn with_size(mut self, size: f32) -> Self {
        self.size = size;
        self
    }

    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.color = color;
        self
    }

    pub fn with_lifetime(mut self, total_lifetime: f32) -> Self {
        self.total_lifetime = total_lifetime;
        self
    }

    /// Position without the packed mass
    pub fn xyz(&self) -> [f32; 3] {
        [self.position[0], self.position[1], self.position[2]]
    }

    pub fn mass(&self) -> f32 {
        self.position[3]
    }
}

/// An elastic link between two particles.
///
/// Undirected for topology, but each endpoint carries its own force value.
/// Layout matches the WGSL struct for direct buffer upload (32 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Link {
    /// First endpoint particle index
    pub par1: u32,
    /// Second endpoint particle index
    pub par2: u32,
    /// Force magnitude acting on the first endpoint, toward the second
    pub force1: f32,
    /// Force magnitude acting on the second endpoint, toward the first
    pub force2: f32,
    /// Unit vector from the first endpoint to the second
    pub orientation: [f32; 3],
    /// Padding for 16-byte alignment
    pub _padding: f32,
}

impl Link {
    /// Create a link with zero forces and orientation
    pub fn new(par1: u32, par2: u32) -> Self {
        Self {
            par1,
            par2,
            ..Self::zeroed()
        }
    }

    /// The endpoint opposite to `particle`
    pub fn other(&self, particle: u32) -> u32 {
        if self.par1 == particle {
            self.par2
        } else {
            self.par1
        }
    }
}

/// Kernel parameters, passed to the GPU as uniforms
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ComputeParams {
    /// Step length of the current trial move
    pub step_length: f32,
    /// Rest length of every link
    pub link_size: f32,
    /// Spring constant of every link
    pub link_stiffness: f32,
    /// Pairwise repulsion strength
    pub repulsion: f32,
    /// Softening distance for repulsion
    pub min_distance: f32,
    /// Number of live particles
    pub particle_count: u32,
    /// Number of live links
    pub link_count: u32,
    /// Integration scheme (see [`crate::config::IntegratorType::flag`])
    pub integrator: u32,
}

impl Default for ComputeParams {
    fn default() -> Self {
        Self {
            step_length: DEFAULT_STEP_LENGTH,
            link_size: DEFAULT_LINK_SIZE,
            link_stiffness: DEFAULT_LINK_STIFFNESS,
            repulsion: DEFAULT_REPULSION,
            min_distance: DEFAULT_MIN_DISTANCE,
            particle_count: 0,
            link_count: 0,
            integrator: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_particle_size() {
        // 5 rows of 4 scalars = 80 bytes, a multiple of 16 for WGSL arrays
        assert_eq!(std::mem::size_of::<Particle>(), 80);
    }

    #[test]
    fn test_link_size() {
        // 2 u32 + 2 f32 + vec3 + padding = 32 bytes
        assert_eq!(std::mem::size_of::<Link>(), 32);
    }

    #[test]
    fn test_params_size() {
        let size = std::mem::size_of::<ComputeParams>();
        assert_eq!(size % 16, 0, "Params size {} is not 16-byte aligned", size);
    }

    #[test]
    fn particle_packs_mass_with_position() {
        let p = Particle::new([1.0, 2.0, 3.0], 0.75);
        assert_eq!(p.xyz(), [1.0, 2.0, 3.0]);
        assert_eq!(p.mass(), 0.75);
        assert_eq!(p.acceleration, [0.0; 3]);
        assert_eq!(p.links_count, 0);
    }

    #[test]
    fn link_other_endpoint() {
        let link = Link::new(3, 8);
        assert_eq!(link.other(3), 8);
        assert_eq!(link.other(8), 3);
        assert_eq!(link.force1, 0.0);
    }
}
