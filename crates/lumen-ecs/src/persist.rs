//! Lenient component decoding for scene files.
//!
//! A malformed field never aborts a load: it keeps its default value and a
//! [`DecodeWarning`] is handed back to the caller for logging.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::kind::ComponentType;

/// A recoverable problem found while decoding scene data.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeWarning {
    /// Position of the entity in the scene's entity array
    pub entity: Option<usize>,
    pub kind: Option<ComponentType>,
    pub field: Option<String>,
    pub message: String,
}

impl DecodeWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            entity: None,
            kind: None,
            field: None,
            message: message.into(),
        }
    }

    pub fn for_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            ..Self::new(message)
        }
    }

    pub fn with_kind(mut self, kind: ComponentType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_entity(mut self, entity: usize) -> Self {
        self.entity = Some(entity);
        self
    }
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(entity) = self.entity {
            write!(f, "entity #{entity}: ")?;
        }
        if let Some(kind) = self.kind {
            write!(f, "{kind}: ")?;
        }
        if let Some(field) = &self.field {
            write!(f, "field '{field}': ")?;
        }
        f.write_str(&self.message)
    }
}

/// Encode a component as its JSON field object.
pub fn encode<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::warn!("failed to encode component: {e}");
        Value::Null
    })
}

/// Decode `fields` into `T`, falling back to the default value field by field.
///
/// Each incoming field is merged on top of the default object and kept only if
/// the result still deserializes. Unknown fields are ignored with a warning.
pub fn decode_lenient<T>(fields: &Value) -> (T, Vec<DecodeWarning>)
where
    T: Serialize + DeserializeOwned + Default,
{
    let mut warnings = Vec::new();
    let default = T::default();

    let mut merged: Map<String, Value> = match serde_json::to_value(&default) {
        Ok(Value::Object(map)) => map,
        _ => {
            // Not a struct-shaped component; all or nothing.
            return match serde_json::from_value(fields.clone()) {
                Ok(value) => (value, warnings),
                Err(e) => {
                    warnings.push(DecodeWarning::new(e.to_string()));
                    (default, warnings)
                }
            };
        }
    };

    let incoming = match fields {
        Value::Object(map) => map,
        Value::Null => return (default, warnings),
        other => {
            warnings.push(DecodeWarning::new(format!(
                "expected an object of fields, found {}",
                json_type_name(other)
            )));
            return (default, warnings);
        }
    };

    for (key, value) in incoming {
        if !merged.contains_key(key) {
            warnings.push(DecodeWarning::for_field(key, "unknown field ignored"));
            continue;
        }
        let previous = merged.insert(key.clone(), value.clone());
        if let Err(e) = serde_json::from_value::<T>(Value::Object(merged.clone())) {
            if let Some(previous) = previous {
                merged.insert(key.clone(), previous);
            }
            warnings.push(DecodeWarning::for_field(
                key,
                format!("{e}; using default"),
            ));
        }
    }

    match serde_json::from_value(Value::Object(merged)) {
        Ok(value) => (value, warnings),
        Err(e) => {
            warnings.push(DecodeWarning::new(e.to_string()));
            (default, warnings)
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Camera, Material, MeshSource, MeshRenderer, PointLight, Tag};
    use crate::components::Transform;
    use glam::{Quat, Vec3};
    use serde_json::json;

    #[test]
    fn populated_round_trip() {
        let transform = Transform {
            position: Vec3::new(1.5, -2.0, 3.25),
            rotation: Quat::from_xyzw(0.0, 0.6, 0.0, 0.8),
            scale: Vec3::new(2.0, 2.0, 0.5),
        };
        let (decoded, warnings) = decode_lenient::<Transform>(&encode(&transform));
        assert!(warnings.is_empty());
        assert_eq!(decoded, transform);

        let renderer = MeshRenderer {
            mesh: MeshSource::Capsule,
            visible: false,
        };
        let (decoded, warnings) = decode_lenient::<MeshRenderer>(&encode(&renderer));
        assert!(warnings.is_empty());
        assert_eq!(decoded, renderer);
    }

    #[test]
    fn default_round_trip() {
        let (decoded, warnings) = decode_lenient::<Camera>(&encode(&Camera::default()));
        assert!(warnings.is_empty());
        assert_eq!(decoded, Camera::default());
    }

    #[test]
    fn bad_field_falls_back_and_reports() {
        let fields = json!({ "intensity": "bright", "range": 4.0 });
        let (light, warnings) = decode_lenient::<PointLight>(&fields);
        assert_eq!(light.intensity, PointLight::default().intensity);
        assert_eq!(light.range, 4.0);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field.as_deref(), Some("intensity"));
    }

    #[test]
    fn missing_fields_keep_defaults() {
        let (material, warnings) = decode_lenient::<Material>(&json!({ "metallic": 1.0 }));
        assert!(warnings.is_empty());
        assert_eq!(material.metallic, 1.0);
        assert_eq!(material.roughness, Material::default().roughness);
    }

    #[test]
    fn unknown_fields_are_reported() {
        let (tag, warnings) = decode_lenient::<Tag>(&json!({ "name": "Crate", "layer": 3 }));
        assert_eq!(tag.name, "Crate");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field.as_deref(), Some("layer"));
    }

    #[test]
    fn non_object_fields_yield_default() {
        let (tag, warnings) = decode_lenient::<Tag>(&json!([1, 2]));
        assert_eq!(tag, Tag::default());
        assert_eq!(warnings.len(), 1);
    }
}
