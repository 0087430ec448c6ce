use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Per-eye uniform block (group 0).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    /// Direction towards the light, world space.
    pub light_direction: [f32; 4],
}

impl CameraUniform {
    pub fn new(view_proj: Mat4) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            light_direction: LIGHT_DIRECTION.normalize().extend(0.0).into(),
        }
    }
}

/// Per-instance uniform block (group 1).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct ObjectUniform {
    pub world: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
}

impl ObjectUniform {
    pub fn new(world: Mat4) -> Self {
        Self {
            world: world.to_cols_array_2d(),
            normal: world.inverse().transpose().to_cols_array_2d(),
        }
    }
}

const LIGHT_DIRECTION: Vec3 = Vec3::new(0.3, 0.6, 1.0);

pub(crate) const SHADER: &str = r#"
struct CameraUniform {
    view_proj: mat4x4<f32>,
    light_direction: vec4<f32>,
}

struct ObjectUniform {
    world: mat4x4<f32>,
    normal: mat4x4<f32>,
}

@group(0) @binding(0)
var<uniform> camera: CameraUniform;

@group(1) @binding(0)
var<uniform> object: ObjectUniform;

@group(2) @binding(0)
var color_texture: texture_2d<f32>;
@group(2) @binding(1)
var normal_texture: texture_2d<f32>;
@group(2) @binding(2)
var material_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) normal: vec3<f32>,
    @location(3) tangent: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) tangent: vec4<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_position = object.world * vec4<f32>(input.position, 1.0);
    out.position = camera.view_proj * world_position;
    out.uv = input.uv;
    out.normal = normalize((object.normal * vec4<f32>(input.normal, 0.0)).xyz);
    let tangent = normalize((object.world * vec4<f32>(input.tangent.xyz, 0.0)).xyz);
    out.tangent = vec4<f32>(tangent, input.tangent.w);
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let n = normalize(input.normal);
    let t = normalize(input.tangent.xyz - n * dot(n, input.tangent.xyz));
    let b = cross(n, t) * input.tangent.w;
    let tbn = mat3x3<f32>(t, b, n);

    let sampled = textureSample(normal_texture, material_sampler, input.uv).xyz * 2.0 - 1.0;
    let normal = normalize(tbn * sampled);

    let albedo = textureSample(color_texture, material_sampler, input.uv);
    let diffuse = max(dot(normal, camera.light_direction.xyz), 0.0);
    let ambient = 0.2;
    return vec4<f32>(albedo.rgb * (ambient + diffuse * 0.8), albedo.a);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_sizes_match_shader_layout() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 80);
        assert_eq!(std::mem::size_of::<ObjectUniform>(), 128);
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let world = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let uniform = ObjectUniform::new(world);
        let normal = Mat4::from_cols_array_2d(&uniform.normal);
        let n = normal.transform_vector3(Vec3::X);
        assert!((n.x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn light_direction_is_normalized() {
        let uniform = CameraUniform::new(Mat4::IDENTITY);
        let light = Vec3::from_slice(&uniform.light_direction[..3]);
        assert!((light.length() - 1.0).abs() < 1e-6);
    }
}
