//! Compute kernel interface
//!
//! The optimizer drives three data-parallel kernels (one lane per particle
//! or link) and depends only on their numeric contracts. Every call is
//! synchronous: when it returns, its writes are complete and visible.

use crate::buffers::StateBuffers;
use crate::error::LayoutResult;
use crate::store::FlatGraph;
use crate::types::{ComputeParams, Link, Particle};

/// Result of the energy reduction kernel
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergyReport {
    /// Total potential energy at the evaluated positions
    pub energy: f32,
    /// Descent direction dotted with the energy gradient
    pub directional_derivative: f32,
    /// Diagnostic scalar with no effect on control flow
    pub checksum: f32,
}

/// Buffer pair type used with kernels `K`
pub type KernelBuffers<K> =
    StateBuffers<<K as ComputeKernels>::Buffer, <K as ComputeKernels>::Scratch>;

/// A parallel-execution substrate able to run the layout kernels
pub trait ComputeKernels: Sized {
    /// One particle array
    type Buffer;
    /// Reduction workspace sized to the particle capacity
    type Scratch;

    /// Allocate a buffer pair and energy workspace for `capacity` particles.
    ///
    /// Discards the link and link-pointer tables of any previous upload.
    fn create_buffers(&mut self, capacity: usize) -> LayoutResult<KernelBuffers<Self>>;

    /// Load particles into both slots of `buffers` and replace the link and
    /// link-pointer tables
    fn upload(&mut self, graph: &FlatGraph, buffers: &mut KernelBuffers<Self>) -> LayoutResult<()>;

    /// Write every particle's descent direction into its acceleration, and
    /// every link's force magnitudes and orientation, from the positions in
    /// `buffer`
    fn compute_descent(&mut self, buffer: &mut Self::Buffer, params: &ComputeParams);

    /// Total energy at `b`'s positions, and `a`'s descent direction dotted
    /// with the gradient at `b`
    fn energy_and_dot(
        &mut self,
        a: &Self::Buffer,
        b: &Self::Buffer,
        scratch: &mut Self::Scratch,
        params: &ComputeParams,
    ) -> EnergyReport;

    /// Advance `source` along its stored descent direction by
    /// `params.step_length` into `destination`. `source` is not modified.
    fn move_vertices(
        &mut self,
        source: &Self::Buffer,
        destination: &mut Self::Buffer,
        params: &ComputeParams,
    );

    /// Copy the live particles of `buffer` back to host memory
    fn read_particles(&self, buffer: &Self::Buffer) -> LayoutResult<Vec<Particle>>;

    /// Copy the link table back to host memory
    fn read_links(&self) -> LayoutResult<Vec<Link>>;
}
