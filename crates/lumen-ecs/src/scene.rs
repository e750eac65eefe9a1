//! Scene documents.
//!
//! A scene is `{"entities": [[{"type": "<kind>", "fields": {...}}, ...], ...]}`:
//! one array of component records per entity. Record problems are reported as
//! [`DecodeWarning`]s and the rest of the scene still loads; only a document
//! without an `entities` array is rejected outright.

use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::entity::Entity;
use crate::error::EcsError;
use crate::kind::ComponentType;
use crate::persist::DecodeWarning;
use crate::world::World;

/// Result of loading a scene document into a world.
#[derive(Debug, Default)]
pub struct SceneLoad {
    /// Created entities, in document order
    pub entities: Vec<Entity>,
    pub warnings: Vec<DecodeWarning>,
}

/// Encode every live entity and its components, in id order.
pub fn encode_scene(world: &World) -> Value {
    let entities: Vec<Value> = world
        .entities()
        .map(|entity| {
            let mask = world.entity_mask(entity).unwrap_or_default();
            let records: Vec<Value> = mask
                .iter()
                .filter_map(|kind| {
                    let fields = world.encode_component(entity, kind)?;
                    Some(json!({ "type": kind.name(), "fields": fields }))
                })
                .collect();
            Value::Array(records)
        })
        .collect();
    json!({ "entities": entities })
}

/// Create one entity per entry of `document["entities"]` and decode its
/// component records into `world`.
pub fn decode_scene(world: &mut World, document: &Value) -> Result<SceneLoad, EcsError> {
    let root = document
        .as_object()
        .ok_or_else(|| EcsError::MalformedScene("document root is not an object".into()))?;
    let entries = root
        .get("entities")
        .and_then(Value::as_array)
        .ok_or_else(|| EcsError::MalformedScene("missing 'entities' array".into()))?;

    let mut load = SceneLoad::default();
    for (index, entry) in entries.iter().enumerate() {
        let Some(records) = entry.as_array() else {
            load.warnings.push(
                DecodeWarning::new("entity entry is not an array of components")
                    .with_entity(index),
            );
            continue;
        };

        let entity = world.create_entity();
        for record in records {
            match decode_record(world, entity, record) {
                Ok(warnings) => load
                    .warnings
                    .extend(warnings.into_iter().map(|w| w.with_entity(index))),
                Err(warning) => load.warnings.push(warning.with_entity(index)),
            }
        }
        load.entities.push(entity);
    }

    for warning in &load.warnings {
        warn!("scene: {warning}");
    }
    info!(
        "loaded {} entities ({} warnings)",
        load.entities.len(),
        load.warnings.len()
    );
    Ok(load)
}

fn decode_record(
    world: &mut World,
    entity: Entity,
    record: &Value,
) -> Result<Vec<DecodeWarning>, DecodeWarning> {
    let object = record
        .as_object()
        .ok_or_else(|| DecodeWarning::new("component record is not an object"))?;
    let kind = record_kind(object)?;
    let empty = Value::Object(Map::new());
    let fields = object.get("fields").unwrap_or(&empty);
    world
        .decode_component(entity, kind, fields)
        .map_err(|e| DecodeWarning::new(e.to_string()).with_kind(kind))
}

/// Kind of a record, by name or by numeric index.
fn record_kind(object: &Map<String, Value>) -> Result<ComponentType, DecodeWarning> {
    let kind = match object.get("type") {
        Some(Value::String(name)) => ComponentType::from_name(name),
        Some(Value::Number(n)) => match n.as_u64().and_then(|n| u32::try_from(n).ok()) {
            Some(n) => ComponentType::try_from(n),
            None => return Err(DecodeWarning::new(format!("invalid component type {n}"))),
        },
        Some(_) => return Err(DecodeWarning::new("component 'type' must be a string")),
        None => return Err(DecodeWarning::new("component record has no 'type'")),
    };
    kind.map_err(|e| DecodeWarning::new(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{
        AmbientLight, BoxCollider, Camera, DirectionalLight, Material, MeshRenderer, MeshSource,
        PointLight, RigidBody, Skybox, Spin, SpotLight, Tag, Transform,
    };
    use crate::components::Component;
    use glam::{Quat, Vec3};
    use lumen_core::Color;

    fn populated() -> Vec<Component> {
        vec![
            Tag::new("Lamp post").into(),
            Transform {
                position: Vec3::new(1.0, -2.5, 3.25),
                rotation: Quat::from_xyzw(0.0, 0.6, 0.0, 0.8),
                scale: Vec3::new(2.0, 1.0, 0.5),
            }
            .into(),
            Camera {
                fov_y_degrees: 75.0,
                near: 0.25,
                far: 500.0,
                primary: false,
            }
            .into(),
            MeshRenderer {
                mesh: MeshSource::Capsule,
                visible: false,
            }
            .into(),
            Material {
                base_color: Color::rgba(0.25, 0.5, 0.75, 1.0),
                roughness: 0.125,
                metallic: 1.0,
                emissive: 2.0,
            }
            .into(),
            DirectionalLight {
                direction: Vec3::NEG_Y,
                color: Color::rgb(1.0, 0.5, 0.25),
                intensity: 3.0,
            }
            .into(),
            PointLight {
                color: Color::rgb(0.5, 0.5, 1.0),
                intensity: 4.0,
                range: 12.0,
            }
            .into(),
            SpotLight {
                color: Color::rgb(1.0, 1.0, 0.5),
                intensity: 2.0,
                range: 8.0,
                inner_angle_degrees: 10.0,
                outer_angle_degrees: 15.0,
            }
            .into(),
            AmbientLight {
                color: Color::rgb(0.5, 0.25, 0.125),
                intensity: 0.75,
            }
            .into(),
            Skybox {
                zenith: Color::rgb(0.0, 0.125, 0.5),
                horizon: Color::rgb(0.75, 0.5, 0.25),
                sun_size: 0.0625,
                sun_glow: 1.5,
            }
            .into(),
            RigidBody {
                velocity: Vec3::new(0.5, 0.0, -1.0),
                mass: 3.0,
                use_gravity: true,
                damping: 0.25,
            }
            .into(),
            BoxCollider {
                half_extents: Vec3::new(1.0, 2.0, 3.0),
                offset: Vec3::Y,
                is_trigger: true,
            }
            .into(),
            Spin {
                axis: Vec3::X,
                degrees_per_second: 180.0,
            }
            .into(),
        ]
    }

    fn snapshot(world: &World, entity: Entity) -> Vec<Component> {
        ComponentType::ALL
            .into_iter()
            .filter_map(|kind| world.component(entity, kind))
            .collect()
    }

    #[test]
    fn every_kind_survives_save_and_load() {
        let mut world = World::new();
        let source = world.spawn(populated()).unwrap();
        let defaults = world.create_entity();
        for kind in ComponentType::ALL {
            world.create_component(defaults, kind).unwrap();
        }

        let document = encode_scene(&world);
        let mut loaded = World::new();
        let load = decode_scene(&mut loaded, &document).unwrap();
        assert!(load.warnings.is_empty(), "{:?}", load.warnings);
        assert_eq!(load.entities.len(), 2);
        assert_eq!(snapshot(&loaded, load.entities[0]), snapshot(&world, source));
        assert_eq!(snapshot(&loaded, load.entities[1]), snapshot(&world, defaults));
        assert_eq!(
            loaded.entity_mask(load.entities[0]),
            world.entity_mask(source)
        );
    }

    #[test]
    fn encoded_shape() {
        let mut world = World::new();
        world.spawn([Tag::new("a").into()]).unwrap();
        assert_eq!(
            encode_scene(&world),
            json!({ "entities": [[{ "type": "Tag", "fields": { "name": "a" } }]] })
        );
    }

    #[test]
    fn bad_records_become_warnings() {
        let document = json!({
            "entities": [
                [
                    { "type": "Camera", "fields": { "near": "close", "far": 50.0 } },
                    { "type": "Teleporter", "fields": {} },
                    { "type": 99 },
                    { "type": 0, "fields": { "name": "by index" } },
                    "not a record"
                ],
                { "oops": true }
            ]
        });
        let mut world = World::new();
        let load = decode_scene(&mut world, &document).unwrap();
        assert_eq!(load.entities.len(), 1);
        let e = load.entities[0];
        assert_eq!(world.get::<Camera>(e).unwrap().far, 50.0);
        assert_eq!(world.get::<Camera>(e).unwrap().near, Camera::default().near);
        assert_eq!(world.get::<Tag>(e).unwrap().name, "by index");

        assert_eq!(load.warnings.len(), 5);
        assert_eq!(load.warnings[0].kind, Some(ComponentType::Camera));
        assert_eq!(load.warnings[0].field.as_deref(), Some("near"));
        assert!(load.warnings[2].message.contains("99"));
        assert_eq!(load.warnings[4].entity, Some(1));
    }

    #[test]
    fn missing_entities_is_an_error() {
        let mut world = World::new();
        assert!(matches!(
            decode_scene(&mut world, &json!({ "things": [] })),
            Err(EcsError::MalformedScene(_))
        ));
        assert!(matches!(
            decode_scene(&mut world, &json!([1, 2])),
            Err(EcsError::MalformedScene(_))
        ));
        assert_eq!(world.entity_count(), 0);
    }
}
