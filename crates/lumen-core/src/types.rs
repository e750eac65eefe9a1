//! Value types shared by components and the renderer

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Position, rotation and scale of an entity in world space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Transform at the given position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Builder-style scale override
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Model matrix (scale, then rotation, then translation)
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// World-to-view matrix for a camera placed at this transform. Scale is ignored.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position).inverse()
    }

    /// Forward direction (negative Z in local space)
    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }

    /// Right direction (positive X in local space)
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Up direction (positive Y in local space)
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
    }

    /// Apply a world-space rotation on top of the current one
    pub fn rotate(&mut self, rotation: Quat) {
        self.rotation = (rotation * self.rotation).normalize();
    }

    /// Orient so that `forward()` points at `target`
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let dir = target - self.position;
        if dir.length_squared() <= f32::EPSILON {
            return;
        }
        let view = Mat4::look_at_rh(self.position, target, up);
        self.rotation = Quat::from_mat4(&view.inverse()).normalize();
    }
}

/// RGBA color with floating point components (0.0 to 1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);

    /// Color from RGB values (alpha = 1.0)
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Color from a hex value (0xRRGGBB)
    pub fn from_hex(hex: u32) -> Self {
        let r = ((hex >> 16) & 0xFF) as f32 / 255.0;
        let g = ((hex >> 8) & 0xFF) as f32 / 255.0;
        let b = (hex & 0xFF) as f32 / 255.0;
        Self::rgb(r, g, b)
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// RGB part scaled by `intensity`, alpha dropped
    pub fn scaled_rgb(&self, intensity: f32) -> Vec3 {
        Vec3::new(self.r, self.g, self.b) * intensity
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_matrix_translation() {
        let transform = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        let translation = transform.matrix().col(3).truncate();
        assert_eq!(translation, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn view_matrix_inverts_model() {
        let mut transform = Transform::from_position(Vec3::new(0.0, 2.0, 5.0));
        transform.look_at(Vec3::ZERO, Vec3::Y);
        let origin_in_view = transform.view_matrix().transform_point3(Vec3::ZERO);
        // The target sits straight ahead, down the negative Z axis of view space.
        assert!(origin_in_view.x.abs() < 1e-4);
        assert!(origin_in_view.y.abs() < 1e-4);
        assert!(origin_in_view.z < 0.0);
    }

    #[test]
    fn look_at_points_forward() {
        let mut transform = Transform::from_position(Vec3::new(0.0, 0.0, 10.0));
        transform.look_at(Vec3::ZERO, Vec3::Y);
        assert!((transform.forward() - Vec3::NEG_Z).length() < 1e-4);
    }

    #[test]
    fn color_from_hex() {
        let color = Color::from_hex(0xFF8000);
        assert!((color.r - 1.0).abs() < 0.01);
        assert!((color.g - 0.5).abs() < 0.01);
        assert!(color.b.abs() < 0.01);
    }
}
