//! GPU-facing layouts of per-frame and per-draw data

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use lumen_ecs::components::{Material, Skybox};
use lumen_ecs::systems::{ActiveCamera, SceneLighting, MAX_LOCAL_LIGHTS};

/// Flips clip-space Y so a right-handed, Y-up projection lands upright in
/// Vulkan's Y-down framebuffer.
pub fn vulkan_clip_correction() -> Mat4 {
    Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
}

fn vec4(v: Vec3, w: f32) -> [f32; 4] {
    [v.x, v.y, v.z, w]
}

/// Scene-wide uniforms (std140 compatible: every member is 16-byte aligned)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SceneUniforms {
    pub view_projection: [[f32; 4]; 4],
    /// xyz = camera position
    pub camera_position: [f32; 4],
    /// xyz = direction the sun light travels
    pub sun_direction: [f32; 4],
    /// rgb = color premultiplied by intensity
    pub sun_color: [f32; 4],
    pub ambient: [f32; 4],
    /// xyz = position, w = range
    pub point_position_range: [[f32; 4]; MAX_LOCAL_LIGHTS],
    pub point_color: [[f32; 4]; MAX_LOCAL_LIGHTS],
    /// xyz = position, w = range
    pub spot_position_range: [[f32; 4]; MAX_LOCAL_LIGHTS],
    /// xyz = direction, w = cos(outer angle)
    pub spot_direction_outer: [[f32; 4]; MAX_LOCAL_LIGHTS],
    /// rgb = color, w = cos(inner angle)
    pub spot_color_inner: [[f32; 4]; MAX_LOCAL_LIGHTS],
    /// x = point lights, y = spot lights
    pub light_counts: [u32; 4],
}

impl SceneUniforms {
    pub fn new(camera: Option<&ActiveCamera>, lighting: &SceneLighting) -> Self {
        let mut uniforms = Self::zeroed();

        if let Some(camera) = camera {
            uniforms.view_projection =
                (vulkan_clip_correction() * camera.view_projection()).to_cols_array_2d();
            uniforms.camera_position = vec4(camera.position, 1.0);
        } else {
            uniforms.view_projection = Mat4::IDENTITY.to_cols_array_2d();
        }
        uniforms.sun_direction = vec4(lighting.sun_direction, 0.0);
        uniforms.sun_color = vec4(lighting.sun_color, 1.0);
        uniforms.ambient = vec4(lighting.ambient, 1.0);

        let points = lighting.point_lights.iter().take(MAX_LOCAL_LIGHTS);
        for (i, light) in points.enumerate() {
            uniforms.point_position_range[i] = vec4(light.position, light.range);
            uniforms.point_color[i] = vec4(light.color, 1.0);
            uniforms.light_counts[0] += 1;
        }
        let spots = lighting.spot_lights.iter().take(MAX_LOCAL_LIGHTS);
        for (i, light) in spots.enumerate() {
            uniforms.spot_position_range[i] = vec4(light.position, light.range);
            uniforms.spot_direction_outer[i] = vec4(light.direction, light.cos_outer);
            uniforms.spot_color_inner[i] = vec4(light.color, light.cos_inner);
            uniforms.light_counts[1] += 1;
        }
        uniforms
    }
}

impl Default for SceneUniforms {
    fn default() -> Self {
        Self::new(None, &SceneLighting::default())
    }
}

/// Push constants for one forward-shaded draw
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ForwardPushConstants {
    pub model: [[f32; 4]; 4],
    pub base_color: [f32; 4],
    /// x = roughness, y = metallic, z = emissive
    pub surface: [f32; 4],
}

impl ForwardPushConstants {
    pub fn new(model: Mat4, material: &Material) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            base_color: material.base_color.to_array(),
            surface: [material.roughness, material.metallic, material.emissive, 0.0],
        }
    }
}

/// Push constants for sky dome rendering
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SkyPushConstants {
    /// Projection times the view rotation; the dome follows the camera
    pub view_projection: [[f32; 4]; 4],
    /// xyz = direction towards the sun
    pub sun_direction: [f32; 4],
    pub sky_zenith: [f32; 4],
    pub sky_horizon: [f32; 4],
    /// x = sun size, y = sun glow
    pub sun_params: [f32; 4],
}

impl SkyPushConstants {
    pub fn new(camera: &ActiveCamera, sun_direction: Vec3, sky: &Skybox) -> Self {
        let mut rotation_only = camera.view;
        rotation_only.w_axis = glam::Vec4::W;
        let view_projection = vulkan_clip_correction() * camera.projection * rotation_only;
        Self {
            view_projection: view_projection.to_cols_array_2d(),
            sun_direction: vec4(-sun_direction.normalize_or_zero(), 0.0),
            sky_zenith: sky.zenith.to_array(),
            sky_horizon: sky.horizon.to_array(),
            sun_params: [sky.sun_size, sky.sun_glow, 0.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_ecs::systems::PointSample;
    use lumen_ecs::Entity;

    #[test]
    fn layouts_fit_limits() {
        // 128 bytes is the guaranteed minimum push constant range.
        assert!(std::mem::size_of::<ForwardPushConstants>() <= 128);
        assert!(std::mem::size_of::<SkyPushConstants>() <= 128);
        assert_eq!(std::mem::size_of::<SceneUniforms>() % 16, 0);
    }

    #[test]
    fn local_lights_are_capped() {
        let mut lighting = SceneLighting::default();
        lighting.point_lights = (0..MAX_LOCAL_LIGHTS + 3)
            .map(|i| PointSample {
                position: Vec3::splat(i as f32),
                color: Vec3::ONE,
                range: 5.0,
            })
            .collect();
        let uniforms = SceneUniforms::new(None, &lighting);
        assert_eq!(uniforms.light_counts[0] as usize, MAX_LOCAL_LIGHTS);
        assert_eq!(uniforms.point_position_range[1], [1.0, 1.0, 1.0, 5.0]);
    }

    #[test]
    fn sky_ignores_camera_translation() {
        let camera = |x: f32| ActiveCamera {
            entity: Entity::from_raw(1, 0),
            view: Mat4::from_translation(Vec3::new(-x, 0.0, 0.0)),
            projection: Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0),
            position: Vec3::new(x, 0.0, 0.0),
        };
        let near = SkyPushConstants::new(&camera(0.0), Vec3::NEG_Y, &Skybox::default());
        let far = SkyPushConstants::new(&camera(500.0), Vec3::NEG_Y, &Skybox::default());
        assert_eq!(near.view_projection, far.view_projection);
        assert_eq!(near.sun_direction, [0.0, 1.0, 0.0, 0.0]);
    }
}
