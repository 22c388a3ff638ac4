//! graphvis - force-directed graph layout by energy minimization.
//!
//! Nodes are point masses and edges are springs. Each iteration computes a
//! descent direction, picks a step length with an adaptive line search and
//! publishes the result through a pair of swapping state buffers.
//!
//! The kernels run on the CPU by default ([`cpu::CpuKernels`]) or on the GPU
//! with the `gpu` feature.

pub mod buffers;
pub mod config;
pub mod controller;
pub mod cpu;
pub mod error;
pub mod kernels;
pub mod session;
pub mod store;
pub mod types;

#[cfg(feature = "gpu")]
pub mod gpu;

pub use buffers::StateBuffers;
pub use config::{IntegratorType, KernelConfig, LayoutConfig, OptimizerConfig, ParticleConfig};
pub use controller::{Diagnostics, RunState, StepController, StepMode};
pub use cpu::CpuKernels;
pub use error::{LayoutError, LayoutResult};
pub use kernels::{ComputeKernels, EnergyReport, KernelBuffers};
pub use session::LayoutSession;
pub use store::{FlatGraph, ParticleStore};
pub use types::{ComputeParams, Link, Particle};
