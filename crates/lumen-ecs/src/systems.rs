//! Built-in logic systems and the per-tick resources they publish.

use glam::{Mat4, Quat, Vec3};
use tracing::debug;

use crate::components::{
    AmbientLight, Camera, DirectionalLight, PointLight, RigidBody, Spin, SpotLight, Transform,
};
use crate::entity::Entity;
use crate::kind::{ComponentMask, ComponentType};
use crate::system::System;
use crate::world::World;

/// Size of the render target in pixels, written by the frame loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Camera the frame is rendered from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveCamera {
    pub entity: Entity,
    pub view: Mat4,
    /// Right-handed perspective with a 0..1 depth range
    pub projection: Mat4,
    pub position: Vec3,
}

impl ActiveCamera {
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// Most point and spot lights forwarded to shading each frame.
pub const MAX_LOCAL_LIGHTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointSample {
    pub position: Vec3,
    /// Color premultiplied by intensity
    pub color: Vec3,
    pub range: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotSample {
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub range: f32,
    pub cos_inner: f32,
    pub cos_outer: f32,
}

/// Light components of the scene folded into one record.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneLighting {
    pub sun_direction: Vec3,
    pub sun_color: Vec3,
    pub ambient: Vec3,
    pub point_lights: Vec<PointSample>,
    pub spot_lights: Vec<SpotSample>,
}

impl Default for SceneLighting {
    fn default() -> Self {
        let sun = DirectionalLight::default();
        Self {
            sun_direction: sun.direction,
            sun_color: sun.color.scaled_rgb(sun.intensity),
            ambient: Vec3::splat(0.1),
            point_lights: Vec::new(),
            spot_lights: Vec::new(),
        }
    }
}

/// Publishes [`ActiveCamera`] from the primary camera, or the first camera
/// registered when none is marked primary.
#[derive(Debug, Default)]
pub struct CameraSystem;

impl System for CameraSystem {
    fn name(&self) -> &str {
        "camera"
    }

    fn signature(&self) -> ComponentMask {
        ComponentMask::of(&[ComponentType::Transform, ComponentType::Camera])
    }

    fn update(&mut self, world: &mut World, entities: &[Entity], _dt: f32) {
        let chosen = entities
            .iter()
            .copied()
            .find(|e| world.get::<Camera>(*e).is_some_and(|c| c.primary))
            .or_else(|| entities.first().copied());

        let Some(entity) = chosen else {
            if world.remove_resource::<ActiveCamera>().is_some() {
                debug!("no camera left in scene");
            }
            return;
        };
        let (Some(transform), Some(camera)) =
            (world.get::<Transform>(entity), world.get::<Camera>(entity))
        else {
            return;
        };

        let aspect = world
            .resource::<Viewport>()
            .copied()
            .unwrap_or_default()
            .aspect_ratio();
        let active = ActiveCamera {
            entity,
            view: transform.view_matrix(),
            projection: Mat4::perspective_rh(
                camera.fov_y_degrees.to_radians(),
                aspect,
                camera.near,
                camera.far,
            ),
            position: transform.position,
        };
        world.insert_resource(active);
    }
}

/// Gathers every light component into [`SceneLighting`].
///
/// Lights are optional on any entity, so this runs as a global system and
/// walks the light stores directly.
#[derive(Debug, Default)]
pub struct LightingSystem;

impl System for LightingSystem {
    fn name(&self) -> &str {
        "lighting"
    }

    fn signature(&self) -> ComponentMask {
        ComponentMask::EMPTY
    }

    fn is_global(&self) -> bool {
        true
    }

    fn update(&mut self, world: &mut World, _entities: &[Entity], _dt: f32) {
        let mut lighting = SceneLighting::default();

        if let Some((_, sun)) = world.iter::<DirectionalLight>().next() {
            lighting.sun_direction = sun.direction.normalize_or_zero();
            lighting.sun_color = sun.color.scaled_rgb(sun.intensity);
        }

        let ambient: Vec3 = world
            .iter::<AmbientLight>()
            .map(|(_, a)| a.color.scaled_rgb(a.intensity))
            .sum();
        if world.iter::<AmbientLight>().next().is_some() {
            lighting.ambient = ambient;
        }

        lighting.point_lights = world
            .iter::<PointLight>()
            .filter_map(|(e, light)| {
                let transform = world.get::<Transform>(e)?;
                Some(PointSample {
                    position: transform.position,
                    color: light.color.scaled_rgb(light.intensity),
                    range: light.range,
                })
            })
            .take(MAX_LOCAL_LIGHTS)
            .collect();

        lighting.spot_lights = world
            .iter::<SpotLight>()
            .filter_map(|(e, light)| {
                let transform = world.get::<Transform>(e)?;
                Some(SpotSample {
                    position: transform.position,
                    direction: transform.forward(),
                    color: light.color.scaled_rgb(light.intensity),
                    range: light.range,
                    cos_inner: light.inner_angle_degrees.to_radians().cos(),
                    cos_outer: light.outer_angle_degrees.to_radians().cos(),
                })
            })
            .take(MAX_LOCAL_LIGHTS)
            .collect();

        world.insert_resource(lighting);
    }
}

/// Integrates [`RigidBody`] velocity into the entity's position.
#[derive(Debug)]
pub struct MotionSystem {
    pub gravity: Vec3,
}

impl Default for MotionSystem {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
        }
    }
}

impl System for MotionSystem {
    fn name(&self) -> &str {
        "motion"
    }

    fn signature(&self) -> ComponentMask {
        ComponentMask::of(&[ComponentType::Transform, ComponentType::RigidBody])
    }

    fn update(&mut self, world: &mut World, entities: &[Entity], dt: f32) {
        for &entity in entities {
            let Some(body) = world.get_mut::<RigidBody>(entity) else {
                continue;
            };
            if body.use_gravity {
                body.velocity += self.gravity * dt;
            }
            body.velocity *= (1.0 - body.damping * dt).max(0.0);
            let velocity = body.velocity;

            if let Some(transform) = world.get_mut::<Transform>(entity) {
                transform.translate(velocity * dt);
            }
        }
    }
}

/// Rotates entities at the rate given by their [`Spin`].
#[derive(Debug, Default)]
pub struct SpinSystem;

impl System for SpinSystem {
    fn name(&self) -> &str {
        "spin"
    }

    fn signature(&self) -> ComponentMask {
        ComponentMask::of(&[ComponentType::Transform, ComponentType::Spin])
    }

    fn update(&mut self, world: &mut World, entities: &[Entity], dt: f32) {
        for &entity in entities {
            let Some(spin) = world.get::<Spin>(entity) else {
                continue;
            };
            let axis = spin.axis.normalize_or_zero();
            if axis == Vec3::ZERO {
                continue;
            }
            let rotation = Quat::from_axis_angle(axis, spin.degrees_per_second.to_radians() * dt);
            if let Some(transform) = world.get_mut::<Transform>(entity) {
                transform.rotate(rotation);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::SystemSchedule;
    use lumen_core::Color;

    fn run(world: &mut World, system: impl System + 'static, dt: f32) {
        let mut schedule = SystemSchedule::new();
        schedule.add_system(world, system).unwrap();
        schedule.run_all(world, dt);
    }

    #[test]
    fn camera_prefers_primary() {
        let mut world = World::new();
        let secondary = Camera {
            primary: false,
            ..Default::default()
        };
        world
            .spawn([Transform::default().into(), secondary.into()])
            .unwrap();
        let primary = world
            .spawn([
                Transform::from_position(Vec3::new(0.0, 2.0, 5.0)).into(),
                Camera::default().into(),
            ])
            .unwrap();
        world.insert_resource(Viewport {
            width: 800,
            height: 400,
        });

        run(&mut world, CameraSystem, 0.0);
        let active = world.resource::<ActiveCamera>().unwrap();
        assert_eq!(active.entity, primary);
        assert_eq!(active.position, Vec3::new(0.0, 2.0, 5.0));
        let eye = active.view.transform_point3(Vec3::new(0.0, 2.0, 5.0));
        assert!(eye.length() < 1e-5);
    }

    #[test]
    fn camera_resource_removed_without_cameras() {
        let mut world = World::new();
        let cam = world
            .spawn([Transform::default().into(), Camera::default().into()])
            .unwrap();
        let mut schedule = SystemSchedule::new();
        schedule.add_system(&mut world, CameraSystem).unwrap();
        schedule.run_all(&mut world, 0.0);
        assert!(world.resource::<ActiveCamera>().is_some());

        world.destroy_entity(cam).unwrap();
        schedule.run_all(&mut world, 0.0);
        assert!(world.resource::<ActiveCamera>().is_none());
    }

    #[test]
    fn lighting_collects_lights() {
        let mut world = World::new();
        world
            .spawn([AmbientLight {
                color: Color::WHITE,
                intensity: 0.5,
            }
            .into()])
            .unwrap();
        world
            .spawn([
                Transform::from_position(Vec3::new(1.0, 2.0, 3.0)).into(),
                PointLight::default().into(),
            ])
            .unwrap();
        // A point light without a transform has no position and is skipped.
        world.spawn([PointLight::default().into()]).unwrap();

        run(&mut world, LightingSystem, 0.0);
        assert!(world.signatures().is_empty());
        let lighting = world.resource::<SceneLighting>().unwrap();
        assert_eq!(lighting.ambient, Vec3::splat(0.5));
        assert_eq!(lighting.point_lights.len(), 1);
        assert_eq!(lighting.point_lights[0].position, Vec3::new(1.0, 2.0, 3.0));
        assert!(lighting.spot_lights.is_empty());
    }

    #[test]
    fn motion_applies_gravity() {
        let mut world = World::new();
        let e = world
            .spawn([
                Transform::default().into(),
                RigidBody {
                    use_gravity: true,
                    ..Default::default()
                }
                .into(),
            ])
            .unwrap();
        run(&mut world, MotionSystem::default(), 1.0);
        let body = world.get::<RigidBody>(e).unwrap();
        assert!((body.velocity.y + 9.81).abs() < 1e-5);
        assert!((world.get::<Transform>(e).unwrap().position.y + 9.81).abs() < 1e-5);
    }

    #[test]
    fn spin_rotates_about_axis() {
        let mut world = World::new();
        let e = world
            .spawn([
                Transform::default().into(),
                Spin {
                    axis: Vec3::Y,
                    degrees_per_second: 90.0,
                }
                .into(),
            ])
            .unwrap();
        run(&mut world, SpinSystem, 1.0);
        let forward = world.get::<Transform>(e).unwrap().forward();
        assert!((forward - Vec3::NEG_X).length() < 1e-5);
    }
}
