//! Scene files on disk
//!
//! Scenes are JSON documents in the layout produced by
//! [`lumen_ecs::scene::encode_scene`].

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use glam::{Quat, Vec3};
use lumen_core::Color;
use lumen_ecs::components::{
    AmbientLight, Camera, DirectionalLight, Material, MeshRenderer, MeshSource, PointLight,
    RigidBody, Skybox, Spin, Tag, Transform,
};
use lumen_ecs::scene::{decode_scene, encode_scene};
use lumen_ecs::World;
use tracing::info;

/// Load the scene at `path` into `world`, returning the number of entities
/// created. Field-level problems are logged by the decoder and skipped.
pub fn load_scene(world: &mut World, path: &Path) -> Result<usize> {
    let json = fs::read_to_string(path).context("Failed to read scene file")?;
    let document: serde_json::Value =
        serde_json::from_str(&json).context("Failed to parse scene file")?;
    let load = decode_scene(world, &document).context("Failed to load scene")?;

    info!(
        "Loaded {} entities from {:?} ({} warnings)",
        load.entities.len(),
        path,
        load.warnings.len()
    );
    Ok(load.entities.len())
}

pub fn save_scene(world: &World, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).context("Failed to create scene directory")?;
    }
    let json = serde_json::to_string_pretty(&encode_scene(world))
        .context("Failed to serialize scene")?;
    fs::write(path, json).context("Failed to write scene file")?;
    info!("Saved {} entities to {:?}", world.entity_count(), path);
    Ok(())
}

/// Camera, sun, ground and a few spinning shapes, used when no scene file
/// exists yet.
pub fn populate_default_scene(world: &mut World) -> Result<()> {
    let mut camera = Transform::from_position(Vec3::new(0.0, 3.0, 10.0));
    camera.look_at(Vec3::ZERO, Vec3::Y);
    world.spawn([
        Tag::new("Main Camera").into(),
        camera.into(),
        Camera::default().into(),
        Skybox::default().into(),
    ])?;

    world.spawn([
        Tag::new("Sun").into(),
        Transform::default().into(),
        DirectionalLight::default().into(),
        AmbientLight::default().into(),
    ])?;

    world.spawn([
        Tag::new("Ground").into(),
        Transform::default().with_scale(Vec3::new(20.0, 1.0, 20.0)).into(),
        MeshRenderer {
            mesh: MeshSource::Plane,
            visible: true,
        }
        .into(),
        Material {
            base_color: Color::rgb(0.35, 0.4, 0.35),
            roughness: 0.9,
            ..Default::default()
        }
        .into(),
    ])?;

    let shapes = [
        (MeshSource::Cube, Color::from_hex(0xd95f43), -3.0),
        (MeshSource::Sphere, Color::from_hex(0x4a90d9), 0.0),
        (MeshSource::Capsule, Color::from_hex(0xe0c341), 3.0),
    ];
    for (mesh, base_color, x) in shapes {
        world.spawn([
            Tag::new(mesh.name()).into(),
            Transform::from_position(Vec3::new(x, 1.0, 0.0)).into(),
            MeshRenderer {
                mesh,
                visible: true,
            }
            .into(),
            Material {
                base_color,
                ..Default::default()
            }
            .into(),
            Spin::default().into(),
        ])?;
    }

    let mut falling = Transform::from_position(Vec3::new(0.0, 6.0, -3.0));
    falling.rotation = Quat::from_rotation_z(0.4);
    world.spawn([
        Tag::new("Falling Cube").into(),
        falling.into(),
        MeshRenderer::default().into(),
        Material::default().into(),
        RigidBody::default().into(),
    ])?;

    world.spawn([
        Tag::new("Lamp").into(),
        Transform::from_position(Vec3::new(0.0, 2.5, 2.0)).into(),
        PointLight::default().into(),
    ])?;

    Ok(())
}
