//! Layout kernels on wgpu compute pipelines
//!
//! Every call submits its passes and blocks until the device is idle, so the
//! controller sees the same synchronous contract as with the CPU kernels.
//! The energy reduction is finished on the host after a blocking readback
//! of the per-particle partials.

use std::sync::Arc;

use bytemuck::Pod;
use tracing::{error, info};
use wgpu::util::DeviceExt;

use super::shaders::{LayoutShaders, WORKGROUP_SIZE};
use super::types::{GpuParticleBuffer, GpuScratch, KernelUniforms};
use crate::buffers::StateBuffers;
use crate::error::{LayoutError, LayoutResult};
use crate::kernels::{ComputeKernels, EnergyReport, KernelBuffers};
use crate::store::FlatGraph;
use crate::types::{ComputeParams, Link, Particle};

const PARTICLE_BYTES: u64 = std::mem::size_of::<Particle>() as u64;
const LINK_BYTES: u64 = std::mem::size_of::<Link>() as u64;
const PARTIAL_BYTES: u64 = 16;

/// GPU implementation of [`ComputeKernels`]
pub struct GpuKernels {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,

    // Compute pipelines
    link_pipeline: wgpu::ComputePipeline,
    descent_pipeline: wgpu::ComputePipeline,
    energy_pipeline: wgpu::ComputePipeline,
    move_pipeline: wgpu::ComputePipeline,

    bind_group_layout: wgpu::BindGroupLayout,
    // Indexed by the slot bound as `dst_particles`
    bind_groups: Vec<wgpu::BindGroup>,

    uniform_buffer: wgpu::Buffer,
    link_buffer: wgpu::Buffer,
    link_ptr_buffer: wgpu::Buffer,

    // Staging buffers for reading back results
    particle_staging: Option<wgpu::Buffer>,
    link_staging: wgpu::Buffer,

    particle_count: u32,
    link_count: u32,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl GpuKernels {
    /// Create kernels on the default high-performance adapter
    pub fn new() -> LayoutResult<Self> {
        let (device, queue) = pollster::block_on(Self::create_device())?;
        Ok(Self::with_device(Arc::new(device), Arc::new(queue)))
    }

    /// Create kernels using an existing device and queue
    pub fn with_device(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let shaders = LayoutShaders::new();

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Layout Bind Group Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, false),
                storage_entry(3, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(5, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Layout Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = |source: &str, entry_point: &str, label: &str| {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        let link_pipeline = pipeline(&shaders.link_pass, "link_pass", "Link Pass");
        let descent_pipeline = pipeline(&shaders.descent_pass, "descent_pass", "Descent Pass");
        let energy_pipeline = pipeline(&shaders.energy_pass, "energy_pass", "Energy Pass");
        let move_pipeline = pipeline(&shaders.move_pass, "move_pass", "Move Pass");

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Uniform Buffer"),
            contents: bytemuck::bytes_of(&KernelUniforms::new(&ComputeParams::default(), false)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let link_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Link Buffer (empty)"),
            size: LINK_BYTES,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let link_ptr_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Link Pointer Buffer (empty)"),
            size: 4,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let link_staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Link Staging Buffer"),
            size: LINK_BYTES,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            device,
            queue,
            link_pipeline,
            descent_pipeline,
            energy_pipeline,
            move_pipeline,
            bind_group_layout,
            bind_groups: Vec::new(),
            uniform_buffer,
            link_buffer,
            link_ptr_buffer,
            particle_staging: None,
            link_staging,
            particle_count: 0,
            link_count: 0,
        }
    }

    async fn create_device() -> LayoutResult<(wgpu::Device, wgpu::Queue)> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| LayoutError::Gpu("no suitable GPU adapter".into()))?;
        info!(adapter = ?adapter.get_info().name, "Using GPU adapter");

        adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Layout Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None, // trace path
            )
            .await
            .map_err(|e| LayoutError::Gpu(e.to_string()))
    }

    fn buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    fn buffer_init(
        &self,
        label: &str,
        contents: &[u8],
        min_size: u64,
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        if contents.is_empty() {
            self.buffer(label, min_size, usage)
        } else {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents,
                    usage,
                })
        }
    }

    /// One bind group per slot, with that slot bound as `dst_particles`
    fn bind(&self, slots: [&wgpu::Buffer; 2], partials: &wgpu::Buffer) -> Vec<wgpu::BindGroup> {
        (0..2)
            .map(|dst| {
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Layout Bind Group"),
                    layout: &self.bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: slots[1 - dst].as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: slots[dst].as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: self.link_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: self.link_ptr_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: self.uniform_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 5,
                            resource: partials.as_entire_binding(),
                        },
                    ],
                })
            })
            .collect()
    }

    fn write_uniforms(&self, params: &ComputeParams, same_buffer: bool) {
        let params = ComputeParams {
            particle_count: self.particle_count,
            link_count: self.link_count,
            ..*params
        };
        self.queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&KernelUniforms::new(&params, same_buffer)),
        );
    }

    /// Run `passes` in order against the bind group of `dst_slot` and wait
    fn dispatch(&self, passes: &[(&wgpu::ComputePipeline, u32, &str)], dst_slot: usize) {
        // Buffers only come from `create_buffers`, which binds both slots
        let Some(bind_group) = self.bind_groups.get(dst_slot) else {
            debug_assert!(false, "dispatch to slot {dst_slot} before create_buffers");
            return;
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Layout Encoder"),
            });

        for &(pipeline, lanes, label) in passes {
            if lanes == 0 {
                continue;
            }
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(lanes.div_ceil(WORKGROUP_SIZE), 1, 1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }

    /// Copy the first `count` elements of `source` to the host
    fn read_back<T: Pod>(
        &self,
        source: &wgpu::Buffer,
        staging: &wgpu::Buffer,
        count: usize,
    ) -> LayoutResult<Vec<T>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let size = (count * std::mem::size_of::<T>()) as u64;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(source, 0, staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging.slice(..size);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| LayoutError::Gpu(e.to_string()))?
            .map_err(|e| LayoutError::Gpu(e.to_string()))?;

        let data = buffer_slice.get_mapped_range();
        let values: Vec<T> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();

        Ok(values)
    }
}

impl ComputeKernels for GpuKernels {
    type Buffer = GpuParticleBuffer;
    type Scratch = GpuScratch;

    fn create_buffers(&mut self, capacity: usize) -> LayoutResult<KernelBuffers<Self>> {
        let lanes = capacity.max(1) as u64;
        let slot_usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC;
        let staging_usage = wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST;

        let first = GpuParticleBuffer {
            buffer: self.buffer("Particle Buffer 0", lanes * PARTICLE_BYTES, slot_usage),
            slot: 0,
        };
        let second = GpuParticleBuffer {
            buffer: self.buffer("Particle Buffer 1", lanes * PARTICLE_BYTES, slot_usage),
            slot: 1,
        };
        let scratch = GpuScratch {
            partials: self.buffer(
                "Energy Partials",
                lanes * PARTIAL_BYTES,
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            ),
            staging: self.buffer("Energy Staging Buffer", lanes * PARTIAL_BYTES, staging_usage),
        };

        self.particle_staging = Some(self.buffer(
            "Particle Staging Buffer",
            lanes * PARTICLE_BYTES,
            staging_usage,
        ));
        // Fresh buffers hold no particles, so the old topology is stale
        self.link_buffer = self.buffer(
            "Link Buffer (empty)",
            LINK_BYTES,
            wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
        );
        self.link_ptr_buffer = self.buffer(
            "Link Pointer Buffer (empty)",
            4,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        );
        self.bind_groups = self.bind([&first.buffer, &second.buffer], &scratch.partials);
        self.particle_count = 0;
        self.link_count = 0;

        Ok(StateBuffers::new(first, second, scratch, capacity))
    }

    fn upload(&mut self, graph: &FlatGraph, buffers: &mut KernelBuffers<Self>) -> LayoutResult<()> {
        if graph.particles.len() > buffers.capacity() {
            return Err(LayoutError::CapacityExceeded {
                capacity: buffers.capacity(),
            });
        }

        self.link_buffer = self.buffer_init(
            "Link Buffer",
            bytemuck::cast_slice(&graph.links),
            LINK_BYTES,
            wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
        );
        self.link_ptr_buffer = self.buffer_init(
            "Link Pointer Buffer",
            bytemuck::cast_slice(&graph.link_ptrs),
            4,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        );
        self.link_staging = self.buffer(
            "Link Staging Buffer",
            (graph.links.len() as u64).max(1) * LINK_BYTES,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        );

        let (current, next, scratch) = buffers.split_mut();
        if !graph.particles.is_empty() {
            for slot in [&current.buffer, &next.buffer] {
                self.queue
                    .write_buffer(slot, 0, bytemuck::cast_slice(&graph.particles));
            }
        }
        let slots = if current.slot == 0 {
            [&current.buffer, &next.buffer]
        } else {
            [&next.buffer, &current.buffer]
        };
        self.bind_groups = self.bind(slots, &scratch.partials);

        self.particle_count = graph.particles.len() as u32;
        self.link_count = graph.links.len() as u32;
        Ok(())
    }

    fn compute_descent(&mut self, buffer: &mut GpuParticleBuffer, params: &ComputeParams) {
        self.write_uniforms(params, false);
        self.dispatch(
            &[
                (&self.link_pipeline, self.link_count, "Link Pass"),
                (&self.descent_pipeline, self.particle_count, "Descent Pass"),
            ],
            buffer.slot,
        );
    }

    fn energy_and_dot(
        &mut self,
        a: &GpuParticleBuffer,
        b: &GpuParticleBuffer,
        scratch: &mut GpuScratch,
        params: &ComputeParams,
    ) -> EnergyReport {
        self.write_uniforms(params, a.slot == b.slot);
        self.dispatch(
            &[(&self.energy_pipeline, self.particle_count, "Energy Pass")],
            b.slot,
        );

        match self.read_back::<[f32; 4]>(
            &scratch.partials,
            &scratch.staging,
            self.particle_count as usize,
        ) {
            Ok(partials) => partials
                .iter()
                .fold(EnergyReport::default(), |mut report, partial| {
                    report.energy += partial[0];
                    report.directional_derivative += partial[1];
                    report.checksum += partial[2];
                    report
                }),
            Err(err) => {
                // NaN fails both line-search conditions
                error!(%err, "Energy readback failed");
                EnergyReport {
                    energy: f32::NAN,
                    directional_derivative: f32::NAN,
                    checksum: f32::NAN,
                }
            }
        }
    }

    fn move_vertices(
        &mut self,
        _source: &GpuParticleBuffer,
        destination: &mut GpuParticleBuffer,
        params: &ComputeParams,
    ) {
        // The bind group of `destination` binds the other slot as the source
        self.write_uniforms(params, false);
        self.dispatch(
            &[(&self.move_pipeline, self.particle_count, "Move Pass")],
            destination.slot,
        );
    }

    fn read_particles(&self, buffer: &GpuParticleBuffer) -> LayoutResult<Vec<Particle>> {
        let staging = self
            .particle_staging
            .as_ref()
            .ok_or_else(|| LayoutError::Gpu("particle buffers not created".into()))?;
        self.read_back(&buffer.buffer, staging, self.particle_count as usize)
    }

    fn read_links(&self) -> LayoutResult<Vec<Link>> {
        self.read_back(
            &self.link_buffer,
            &self.link_staging,
            self.link_count as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::controller::RunState;
    use crate::cpu::CpuKernels;
    use crate::session::LayoutSession;

    fn stretched_pair<K: ComputeKernels>(kernels: K) -> LayoutSession<K> {
        let mut session =
            LayoutSession::new(LayoutConfig::default(), kernels, RunState::Run).unwrap();
        session.add_particle([0.0, 0.0, 0.0], 1.0, 1.0, 1.0).unwrap();
        session.add_particle([20.0, 0.0, 0.0], 1.0, 1.0, 1.0).unwrap();
        session.add_link(0, 1).unwrap();
        session.commit().unwrap();
        session
    }

    #[test]
    fn test_matches_cpu_kernels() {
        // Skip on machines without an adapter
        let Ok(gpu) = GpuKernels::new() else {
            return;
        };
        let mut gpu = stretched_pair(gpu);
        let mut cpu = stretched_pair(CpuKernels::new());

        for _ in 0..3 {
            let gpu_diag = gpu.update(0);
            let cpu_diag = cpu.update(0);
            assert!((gpu_diag.energy - cpu_diag.energy).abs() < 1e-3);
        }

        let gpu_particles = gpu.particles().unwrap();
        let cpu_particles = cpu.particles().unwrap();
        for (g, c) in gpu_particles.iter().zip(&cpu_particles) {
            for axis in 0..3 {
                assert!((g.position[axis] - c.position[axis]).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_link_round_trip() {
        let Ok(gpu) = GpuKernels::new() else {
            return;
        };
        let session = stretched_pair(gpu);
        let links = session.links().unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!((links[0].par1, links[0].par2), (0, 1));

        let particles = session.particles().unwrap();
        assert_eq!(particles.len(), 2);
        assert_eq!(particles[1].links_ptr, 1);
    }

    #[test]
    fn test_create_buffers_binds_both_slots() {
        let Ok(mut gpu) = GpuKernels::new() else {
            return;
        };
        assert!(gpu.bind_groups.is_empty());
        gpu.create_buffers(8).unwrap();
        assert_eq!(gpu.bind_groups.len(), 2);
    }

    #[test]
    fn test_reset_then_update_without_commit() {
        let Ok(gpu) = GpuKernels::new() else {
            return;
        };
        let mut session = stretched_pair(gpu);
        session.update(0);

        session.reset(4).unwrap();
        assert!(session.links().unwrap().is_empty());
        session.update(0);
        assert!(session.particles().unwrap().is_empty());
    }

    #[test]
    fn test_empty_graph() {
        let Ok(gpu) = GpuKernels::new() else {
            return;
        };
        let mut session =
            LayoutSession::new(LayoutConfig::default(), gpu, RunState::Run).unwrap();
        session.commit().unwrap();
        session.update(0);
        assert!(session.particles().unwrap().is_empty());
    }
}
