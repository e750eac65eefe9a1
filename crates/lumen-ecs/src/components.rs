//! Component kinds known to the engine.
//!
//! Every kind is a plain data record with a sensible `Default`, serde support
//! for scene files, and an [`Inspect`](crate::Inspect) implementation for the
//! editor. The set is closed: adding a kind means adding a [`ComponentType`]
//! variant, a store in the [`ComponentManager`](crate::ComponentManager) and a
//! [`Component`] variant.

use glam::Vec3;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use lumen_core::Color;
pub use lumen_core::Transform;

use crate::inspect::Inspect;
use crate::kind::ComponentType;
use crate::manager::ComponentManager;
use crate::store::DenseStore;

/// Static link between a component type and its kind and store.
///
/// Dispatch is resolved at compile time through `KIND` and the store accessors,
/// never by comparing runtime type identities.
pub trait ComponentKind:
    Clone + Default + PartialEq + Serialize + DeserializeOwned + Inspect + 'static
{
    const KIND: ComponentType;

    fn store(manager: &ComponentManager) -> &DenseStore<Self>;

    fn store_mut(manager: &mut ComponentManager) -> &mut DenseStore<Self>;

    fn into_component(self) -> Component;
}

/// Human-readable entity name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
}

impl Default for Tag {
    fn default() -> Self {
        Self {
            name: "Entity".to_string(),
        }
    }
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Perspective camera. The view comes from the entity's [`Transform`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Vertical field of view in degrees
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Preferred camera when several exist
    pub primary: bool,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            fov_y_degrees: 60.0,
            near: 0.1,
            far: 1000.0,
            primary: true,
        }
    }
}

/// Built-in procedural meshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MeshSource {
    #[default]
    Cube,
    Plane,
    Sphere,
    Capsule,
}

impl MeshSource {
    pub const ALL: [MeshSource; 4] = [
        MeshSource::Cube,
        MeshSource::Plane,
        MeshSource::Sphere,
        MeshSource::Capsule,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MeshSource::Cube => "Cube",
            MeshSource::Plane => "Plane",
            MeshSource::Sphere => "Sphere",
            MeshSource::Capsule => "Capsule",
        }
    }
}

/// Draws a mesh at the entity's transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshRenderer {
    pub mesh: MeshSource,
    pub visible: bool,
}

impl Default for MeshRenderer {
    fn default() -> Self {
        Self {
            mesh: MeshSource::Cube,
            visible: true,
        }
    }
}

/// Surface parameters for mesh rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub base_color: Color,
    pub roughness: f32,
    pub metallic: f32,
    pub emissive: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color: Color::WHITE,
            roughness: 0.5,
            metallic: 0.0,
            emissive: 0.0,
        }
    }
}

/// Sun-like light with parallel rays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionalLight {
    /// Direction the light travels (towards the scene)
    pub direction: Vec3,
    pub color: Color,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.5, -0.8, -0.3).normalize(),
            color: Color::rgb(1.0, 0.95, 0.85),
            intensity: 1.0,
        }
    }
}

/// Omni light placed at the entity's transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointLight {
    pub color: Color,
    pub intensity: f32,
    pub range: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            intensity: 1.0,
            range: 10.0,
        }
    }
}

/// Cone light placed at the entity's transform, pointing along its forward axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotLight {
    pub color: Color,
    pub intensity: f32,
    pub range: f32,
    pub inner_angle_degrees: f32,
    pub outer_angle_degrees: f32,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            intensity: 1.0,
            range: 15.0,
            inner_angle_degrees: 20.0,
            outer_angle_degrees: 30.0,
        }
    }
}

/// Constant fill light.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbientLight {
    pub color: Color,
    pub intensity: f32,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            intensity: 0.3,
        }
    }
}

/// Procedural sky colors, read by the sky pipeline from the active camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skybox {
    /// Color at the top of the sky
    pub zenith: Color,
    /// Color at the horizon
    pub horizon: Color,
    /// Sun disk size (0.0 - 0.1)
    pub sun_size: f32,
    /// Sun glow intensity
    pub sun_glow: f32,
}

impl Default for Skybox {
    fn default() -> Self {
        Self {
            zenith: Color::rgb(0.1, 0.2, 0.5),
            horizon: Color::rgb(0.5, 0.6, 0.7),
            sun_size: 0.02,
            sun_glow: 0.5,
        }
    }
}

/// Simple kinematic body integrated by the motion system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBody {
    pub velocity: Vec3,
    pub mass: f32,
    pub use_gravity: bool,
    /// Fraction of velocity lost per second
    pub damping: f32,
}

impl Default for RigidBody {
    fn default() -> Self {
        Self {
            velocity: Vec3::ZERO,
            mass: 1.0,
            use_gravity: false,
            damping: 0.0,
        }
    }
}

/// Axis-aligned box in the entity's local space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxCollider {
    pub half_extents: Vec3,
    pub offset: Vec3,
    pub is_trigger: bool,
}

impl Default for BoxCollider {
    fn default() -> Self {
        Self {
            half_extents: Vec3::splat(0.5),
            offset: Vec3::ZERO,
            is_trigger: false,
        }
    }
}

/// Constant rotation applied by the spin system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spin {
    pub axis: Vec3,
    pub degrees_per_second: f32,
}

impl Default for Spin {
    fn default() -> Self {
        Self {
            axis: Vec3::Y,
            degrees_per_second: 45.0,
        }
    }
}

/// Any component value, tagged with its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    Tag(Tag),
    Transform(Transform),
    Camera(Camera),
    MeshRenderer(MeshRenderer),
    Material(Material),
    DirectionalLight(DirectionalLight),
    PointLight(PointLight),
    SpotLight(SpotLight),
    AmbientLight(AmbientLight),
    Skybox(Skybox),
    RigidBody(RigidBody),
    BoxCollider(BoxCollider),
    Spin(Spin),
}

impl Component {
    pub fn kind(&self) -> ComponentType {
        match self {
            Component::Tag(_) => ComponentType::Tag,
            Component::Transform(_) => ComponentType::Transform,
            Component::Camera(_) => ComponentType::Camera,
            Component::MeshRenderer(_) => ComponentType::MeshRenderer,
            Component::Material(_) => ComponentType::Material,
            Component::DirectionalLight(_) => ComponentType::DirectionalLight,
            Component::PointLight(_) => ComponentType::PointLight,
            Component::SpotLight(_) => ComponentType::SpotLight,
            Component::AmbientLight(_) => ComponentType::AmbientLight,
            Component::Skybox(_) => ComponentType::Skybox,
            Component::RigidBody(_) => ComponentType::RigidBody,
            Component::BoxCollider(_) => ComponentType::BoxCollider,
            Component::Spin(_) => ComponentType::Spin,
        }
    }
}

macro_rules! impl_component_kind {
    ($($ty:ident => $field:ident),* $(,)?) => {
        $(
            impl ComponentKind for $ty {
                const KIND: ComponentType = ComponentType::$ty;

                fn store(manager: &ComponentManager) -> &DenseStore<Self> {
                    &manager.$field
                }

                fn store_mut(manager: &mut ComponentManager) -> &mut DenseStore<Self> {
                    &mut manager.$field
                }

                fn into_component(self) -> Component {
                    Component::$ty(self)
                }
            }

            impl From<$ty> for Component {
                fn from(value: $ty) -> Self {
                    Component::$ty(value)
                }
            }
        )*
    };
}

impl_component_kind! {
    Tag => tags,
    Transform => transforms,
    Camera => cameras,
    MeshRenderer => mesh_renderers,
    Material => materials,
    DirectionalLight => directional_lights,
    PointLight => point_lights,
    SpotLight => spot_lights,
    AmbientLight => ambient_lights,
    Skybox => skyboxes,
    RigidBody => rigid_bodies,
    BoxCollider => box_colliders,
    Spin => spins,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_kind_tags_match_variants() {
        assert_eq!(Tag::KIND, ComponentType::Tag);
        assert_eq!(Spin::KIND, ComponentType::Spin);
        assert_eq!(Component::from(Camera::default()).kind(), ComponentType::Camera);
        assert_eq!(
            Transform::default().into_component().kind(),
            ComponentType::Transform
        );
    }
}
