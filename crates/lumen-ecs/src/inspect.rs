//! Editor introspection.
//!
//! The editor overlay implements [`Inspector`] and the stores call
//! [`Inspect::inspect`] on the selected entity's components. Inspectors only
//! ever receive `&mut` field access to a component that already exists, so they
//! can edit values but cannot add or remove components.

use glam::{EulerRot, Quat, Vec3};

use lumen_core::{Color, Transform};

use crate::components::{
    AmbientLight, BoxCollider, Camera, DirectionalLight, Material, MeshRenderer, MeshSource,
    PointLight, RigidBody, Skybox, Spin, SpotLight, Tag,
};

/// Widget surface offered by an editor. Every method returns `true` when the
/// value was changed.
pub trait Inspector {
    /// Start a section for one component.
    fn header(&mut self, title: &str);

    fn edit_f32(&mut self, label: &str, value: &mut f32, min: f32, max: f32) -> bool;

    fn edit_vec3(&mut self, label: &str, value: &mut Vec3) -> bool;

    fn edit_color(&mut self, label: &str, value: &mut Color) -> bool;

    fn edit_bool(&mut self, label: &str, value: &mut bool) -> bool;

    fn edit_text(&mut self, label: &str, value: &mut String) -> bool;

    /// Pick one of `options`; `selected` is an index into it.
    fn edit_choice(&mut self, label: &str, selected: &mut usize, options: &[&str]) -> bool;
}

/// Components that can present their fields to an [`Inspector`].
pub trait Inspect {
    fn inspect(&mut self, ui: &mut dyn Inspector) -> bool;
}

impl Inspect for Tag {
    fn inspect(&mut self, ui: &mut dyn Inspector) -> bool {
        ui.header("Tag");
        ui.edit_text("Name", &mut self.name)
    }
}

impl Inspect for Transform {
    fn inspect(&mut self, ui: &mut dyn Inspector) -> bool {
        ui.header("Transform");
        let mut changed = ui.edit_vec3("Position", &mut self.position);

        let (x, y, z) = self.rotation.to_euler(EulerRot::XYZ);
        let mut degrees = Vec3::new(x, y, z) * (180.0 / std::f32::consts::PI);
        if ui.edit_vec3("Rotation", &mut degrees) {
            let radians = degrees * (std::f32::consts::PI / 180.0);
            self.rotation = Quat::from_euler(EulerRot::XYZ, radians.x, radians.y, radians.z);
            changed = true;
        }

        changed |= ui.edit_vec3("Scale", &mut self.scale);
        changed
    }
}

impl Inspect for Camera {
    fn inspect(&mut self, ui: &mut dyn Inspector) -> bool {
        ui.header("Camera");
        let mut changed = ui.edit_f32("Field of view", &mut self.fov_y_degrees, 1.0, 179.0);
        changed |= ui.edit_f32("Near", &mut self.near, 0.001, 10.0);
        changed |= ui.edit_f32("Far", &mut self.far, 1.0, 100_000.0);
        changed |= ui.edit_bool("Primary", &mut self.primary);
        changed
    }
}

impl Inspect for MeshRenderer {
    fn inspect(&mut self, ui: &mut dyn Inspector) -> bool {
        ui.header("Mesh Renderer");
        let names: Vec<&str> = MeshSource::ALL.iter().map(|m| m.name()).collect();
        let mut selected = MeshSource::ALL
            .iter()
            .position(|m| *m == self.mesh)
            .unwrap_or(0);
        let mut changed = false;
        if ui.edit_choice("Mesh", &mut selected, &names) {
            if let Some(mesh) = MeshSource::ALL.get(selected) {
                self.mesh = *mesh;
                changed = true;
            }
        }
        changed |= ui.edit_bool("Visible", &mut self.visible);
        changed
    }
}

impl Inspect for Material {
    fn inspect(&mut self, ui: &mut dyn Inspector) -> bool {
        ui.header("Material");
        let mut changed = ui.edit_color("Base color", &mut self.base_color);
        changed |= ui.edit_f32("Roughness", &mut self.roughness, 0.0, 1.0);
        changed |= ui.edit_f32("Metallic", &mut self.metallic, 0.0, 1.0);
        changed |= ui.edit_f32("Emissive", &mut self.emissive, 0.0, 10.0);
        changed
    }
}

impl Inspect for DirectionalLight {
    fn inspect(&mut self, ui: &mut dyn Inspector) -> bool {
        ui.header("Directional Light");
        let mut changed = false;
        if ui.edit_vec3("Direction", &mut self.direction) {
            let direction = self.direction.normalize_or_zero();
            self.direction = if direction == Vec3::ZERO {
                Vec3::NEG_Y
            } else {
                direction
            };
            changed = true;
        }
        changed |= ui.edit_color("Color", &mut self.color);
        changed |= ui.edit_f32("Intensity", &mut self.intensity, 0.0, 100.0);
        changed
    }
}

impl Inspect for PointLight {
    fn inspect(&mut self, ui: &mut dyn Inspector) -> bool {
        ui.header("Point Light");
        let mut changed = ui.edit_color("Color", &mut self.color);
        changed |= ui.edit_f32("Intensity", &mut self.intensity, 0.0, 100.0);
        changed |= ui.edit_f32("Range", &mut self.range, 0.0, 1000.0);
        changed
    }
}

impl Inspect for SpotLight {
    fn inspect(&mut self, ui: &mut dyn Inspector) -> bool {
        ui.header("Spot Light");
        let mut changed = ui.edit_color("Color", &mut self.color);
        changed |= ui.edit_f32("Intensity", &mut self.intensity, 0.0, 100.0);
        changed |= ui.edit_f32("Range", &mut self.range, 0.0, 1000.0);
        changed |= ui.edit_f32("Inner angle", &mut self.inner_angle_degrees, 0.0, 89.0);
        changed |= ui.edit_f32("Outer angle", &mut self.outer_angle_degrees, 0.0, 90.0);
        if self.inner_angle_degrees > self.outer_angle_degrees {
            self.inner_angle_degrees = self.outer_angle_degrees;
        }
        changed
    }
}

impl Inspect for AmbientLight {
    fn inspect(&mut self, ui: &mut dyn Inspector) -> bool {
        ui.header("Ambient Light");
        let mut changed = ui.edit_color("Color", &mut self.color);
        changed |= ui.edit_f32("Intensity", &mut self.intensity, 0.0, 10.0);
        changed
    }
}

impl Inspect for Skybox {
    fn inspect(&mut self, ui: &mut dyn Inspector) -> bool {
        ui.header("Skybox");
        let mut changed = ui.edit_color("Zenith", &mut self.zenith);
        changed |= ui.edit_color("Horizon", &mut self.horizon);
        changed |= ui.edit_f32("Sun size", &mut self.sun_size, 0.0, 0.1);
        changed |= ui.edit_f32("Sun glow", &mut self.sun_glow, 0.0, 1.0);
        changed
    }
}

impl Inspect for RigidBody {
    fn inspect(&mut self, ui: &mut dyn Inspector) -> bool {
        ui.header("Rigid Body");
        let mut changed = ui.edit_vec3("Velocity", &mut self.velocity);
        changed |= ui.edit_f32("Mass", &mut self.mass, 0.001, 10_000.0);
        changed |= ui.edit_bool("Use gravity", &mut self.use_gravity);
        changed |= ui.edit_f32("Damping", &mut self.damping, 0.0, 10.0);
        changed
    }
}

impl Inspect for BoxCollider {
    fn inspect(&mut self, ui: &mut dyn Inspector) -> bool {
        ui.header("Box Collider");
        let mut changed = ui.edit_vec3("Half extents", &mut self.half_extents);
        changed |= ui.edit_vec3("Offset", &mut self.offset);
        changed |= ui.edit_bool("Trigger", &mut self.is_trigger);
        changed
    }
}

impl Inspect for Spin {
    fn inspect(&mut self, ui: &mut dyn Inspector) -> bool {
        ui.header("Spin");
        let mut changed = ui.edit_vec3("Axis", &mut self.axis);
        changed |= ui.edit_f32("Degrees per second", &mut self.degrees_per_second, -720.0, 720.0);
        changed
    }
}
