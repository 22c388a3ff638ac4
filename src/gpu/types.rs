//! GPU-side buffer handles and uniform layout

use bytemuck::{Pod, Zeroable};

use crate::types::ComputeParams;

/// Uniform block of every layout shader.
///
/// Layout matches the WGSL `Uniforms` struct (48 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct KernelUniforms {
    pub params: ComputeParams,
    /// Nonzero when the energy pass reads its direction from `dst`
    pub same_buffer: u32,
    pub _padding: [u32; 3],
}

impl KernelUniforms {
    pub fn new(params: &ComputeParams, same_buffer: bool) -> Self {
        Self {
            params: *params,
            same_buffer: same_buffer as u32,
            _padding: [0; 3],
        }
    }
}

/// One slot of the state buffer pair
#[derive(Debug)]
pub struct GpuParticleBuffer {
    pub(crate) buffer: wgpu::Buffer,
    /// Index of this slot in the pair, selects the bind group
    pub(crate) slot: usize,
}

impl GpuParticleBuffer {
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// Per-particle reduction partials and their readback buffer
#[derive(Debug)]
pub struct GpuScratch {
    pub(crate) partials: wgpu::Buffer,
    pub(crate) staging: wgpu::Buffer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniforms_size() {
        assert_eq!(std::mem::size_of::<KernelUniforms>(), 48);
    }

    #[test]
    fn same_buffer_flag() {
        let params = ComputeParams::default();
        assert_eq!(KernelUniforms::new(&params, true).same_buffer, 1);
        assert_eq!(KernelUniforms::new(&params, false).same_buffer, 0);
    }
}
