//! GPU backend for the layout kernels (feature `gpu`)
//!
//! Implements [`ComputeKernels`](crate::kernels::ComputeKernels) with wgpu
//! compute shaders: one lane per link for the link pass, one lane per
//! particle for the descent, energy and move passes. Repulsion is evaluated
//! brute force over all pairs.
//!
//! # Example
//!
//! ```rust,ignore
//! use graphvis::gpu::GpuKernels;
//! use graphvis::{LayoutConfig, LayoutSession, RunState};
//!
//! let kernels = GpuKernels::new()?;
//! let mut session = LayoutSession::new(LayoutConfig::default(), kernels, RunState::Run)?;
//! session.build_chain(1000)?;
//! session.commit()?;
//! for _ in 0..100 {
//!     session.update(0);
//! }
//! let particles = session.particles()?;
//! ```

mod kernels;
mod shaders;
mod types;

pub use kernels::GpuKernels;
pub use shaders::{LayoutShaders, WORKGROUP_SIZE};
pub use types::{GpuParticleBuffer, GpuScratch, KernelUniforms};
