//! WGSL compute shaders for the layout kernels
//!
//! All four entry points share one bind group layout. `src_particles` and `dst_particles` are
//! always the two different slots of the state buffer pair; which slot is
//! which is decided by the bind group chosen for the dispatch.

/// Common type definitions and bindings shared by all shaders
pub const TYPES: &str = r#"
struct Particle {
    position: vec4<f32>,
    velocity: vec3<f32>,
    size: f32,
    color: vec4<f32>,
    acceleration: vec3<f32>,
    total_lifetime: f32,
    lifetime: f32,
    links_ptr: u32,
    links_count: u32,
    _padding: f32,
}

struct Link {
    par1: u32,
    par2: u32,
    force1: f32,
    force2: f32,
    orientation: vec3<f32>,
    _padding: f32,
}

struct Uniforms {
    step_length: f32,
    link_size: f32,
    link_stiffness: f32,
    repulsion: f32,
    min_distance: f32,
    particle_count: u32,
    link_count: u32,
    integrator: u32,
    same_buffer: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

@group(0) @binding(0) var<storage, read> src_particles: array<Particle>;
@group(0) @binding(1) var<storage, read_write> dst_particles: array<Particle>;
@group(0) @binding(2) var<storage, read_write> links: array<Link>;
@group(0) @binding(3) var<storage, read> link_ptrs: array<u32>;
@group(0) @binding(4) var<uniform> uniforms: Uniforms;
@group(0) @binding(5) var<storage, read_write> partials: array<vec4<f32>>;
"#;

/// Per-link lane: orientation and spring force magnitudes at `dst`
pub const LINK_PASS: &str = r#"
@compute @workgroup_size(64)
fn link_pass(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let l = global_id.x;
    if (l >= uniforms.link_count) {
        return;
    }

    let link = links[l];
    let delta = dst_particles[link.par2].position.xyz - dst_particles[link.par1].position.xyz;
    let dist = length(delta);
    var orientation = vec3<f32>(0.0);
    if (dist > 0.0) {
        orientation = delta / dist;
    }
    let magnitude = uniforms.link_stiffness * (dist - uniforms.link_size);

    links[l].orientation = orientation;
    links[l].force1 = magnitude;
    links[l].force2 = magnitude;
}
"#;

/// Per-particle lane: descent direction at `dst` from the link table
pub const DESCENT_PASS: &str = r#"
@compute @workgroup_size(64)
fn descent_pass(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= uniforms.particle_count) {
        return;
    }

    let p = dst_particles[i];
    var force = vec3<f32>(0.0);
    for (var k = 0u; k < p.links_count; k++) {
        let link = links[link_ptrs[p.links_ptr + k]];
        if (link.par1 == i) {
            force += link.orientation * link.force1;
        } else {
            force -= link.orientation * link.force2;
        }
    }

    let xi = p.position.xyz;
    for (var j = 0u; j < uniforms.particle_count; j++) {
        if (j == i) {
            continue;
        }
        let delta = xi - dst_particles[j].position.xyz;
        let dist = length(delta);
        if (dist <= uniforms.min_distance || dist == 0.0) {
            continue;
        }
        force += delta * (uniforms.repulsion / (dist * dist * dist));
    }

    dst_particles[i].acceleration = force / p.position.w;
}
"#;

/// Per-particle lane: energy share, derivative term and checksum term
pub const ENERGY_PASS: &str = r#"
@compute @workgroup_size(64)
fn energy_pass(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= uniforms.particle_count) {
        return;
    }

    let pb = dst_particles[i];
    var direction = pb.acceleration;
    if (uniforms.same_buffer == 0u) {
        direction = src_particles[i].acceleration;
    }

    var energy = 0.0;
    for (var k = 0u; k < pb.links_count; k++) {
        let link = links[link_ptrs[pb.links_ptr + k]];
        var other = link.par1;
        if (link.par1 == i) {
            other = link.par2;
        }
        let stretch = distance(pb.position.xyz, dst_particles[other].position.xyz) - uniforms.link_size;
        energy += 0.25 * uniforms.link_stiffness * stretch * stretch;
    }
    for (var j = 0u; j < uniforms.particle_count; j++) {
        if (j != i) {
            let dist = max(distance(pb.position.xyz, dst_particles[j].position.xyz), uniforms.min_distance);
            energy += 0.5 * uniforms.repulsion / dist;
        }
    }

    let gradient = pb.acceleration * -pb.position.w;
    let checksum = pb.position.x + pb.position.y + pb.position.z;
    partials[i] = vec4<f32>(energy, dot(direction, gradient), checksum, 0.0);
}
"#;

/// Per-particle lane: advance `src` along its descent direction into `dst`
pub const MOVE_PASS: &str = r#"
fn midpoint(j: u32) -> vec3<f32> {
    return src_particles[j].position.xyz + src_particles[j].acceleration * (0.5 * uniforms.step_length);
}

// Descent direction of particle i evaluated at the midpoint positions
fn midpoint_descent(i: u32) -> vec3<f32> {
    let p = src_particles[i];
    var force = vec3<f32>(0.0);
    for (var k = 0u; k < p.links_count; k++) {
        let link = links[link_ptrs[p.links_ptr + k]];
        let delta = midpoint(link.par2) - midpoint(link.par1);
        let dist = length(delta);
        var orientation = vec3<f32>(0.0);
        if (dist > 0.0) {
            orientation = delta / dist;
        }
        let magnitude = uniforms.link_stiffness * (dist - uniforms.link_size);
        if (link.par1 == i) {
            force += orientation * magnitude;
        } else {
            force -= orientation * magnitude;
        }
    }

    let xi = midpoint(i);
    for (var j = 0u; j < uniforms.particle_count; j++) {
        if (j == i) {
            continue;
        }
        let delta = xi - midpoint(j);
        let dist = length(delta);
        if (dist <= uniforms.min_distance || dist == 0.0) {
            continue;
        }
        force += delta * (uniforms.repulsion / (dist * dist * dist));
    }
    return force / p.position.w;
}

@compute @workgroup_size(64)
fn move_pass(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= uniforms.particle_count) {
        return;
    }

    let p = src_particles[i];
    var direction = p.acceleration;
    if (uniforms.integrator == 1u) {
        direction = midpoint_descent(i);
    }
    let displacement = direction * uniforms.step_length;

    var moved = p;
    moved.position = vec4<f32>(p.position.xyz + displacement, p.position.w);
    moved.velocity = displacement;
    dst_particles[i] = moved;
}
"#;

/// Workgroup size used by every entry point
pub const WORKGROUP_SIZE: u32 = 64;

/// Full shader sources, one module per pass
pub struct LayoutShaders {
    pub link_pass: String,
    pub descent_pass: String,
    pub energy_pass: String,
    pub move_pass: String,
}

impl LayoutShaders {
    pub fn new() -> Self {
        Self {
            link_pass: format!("{TYPES}\n{LINK_PASS}"),
            descent_pass: format!("{TYPES}\n{DESCENT_PASS}"),
            energy_pass: format!("{TYPES}\n{ENERGY_PASS}"),
            move_pass: format!("{TYPES}\n{MOVE_PASS}"),
        }
    }
}

impl Default for LayoutShaders {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shaders_contain_entry_points() {
        let shaders = LayoutShaders::new();
        assert!(shaders.link_pass.contains("fn link_pass"));
        assert!(shaders.descent_pass.contains("fn descent_pass"));
        assert!(shaders.energy_pass.contains("fn energy_pass"));
        assert!(shaders.move_pass.contains("fn move_pass"));
    }

    #[test]
    fn every_shader_declares_bindings() {
        let shaders = LayoutShaders::new();
        for source in [
            &shaders.link_pass,
            &shaders.descent_pass,
            &shaders.energy_pass,
            &shaders.move_pass,
        ] {
            assert!(source.contains("struct Particle"));
            assert!(source.contains("@binding(5)"));
        }
    }
}
