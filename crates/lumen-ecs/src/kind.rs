use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EcsError;

/// The closed set of component kinds. The discriminant is the kind's bit in a
/// [`ComponentMask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ComponentType {
    Tag = 0,
    Transform,
    Camera,
    MeshRenderer,
    Material,
    DirectionalLight,
    PointLight,
    SpotLight,
    AmbientLight,
    Skybox,
    RigidBody,
    BoxCollider,
    Spin,
}

impl ComponentType {
    pub const COUNT: usize = 13;

    pub const ALL: [ComponentType; Self::COUNT] = [
        ComponentType::Tag,
        ComponentType::Transform,
        ComponentType::Camera,
        ComponentType::MeshRenderer,
        ComponentType::Material,
        ComponentType::DirectionalLight,
        ComponentType::PointLight,
        ComponentType::SpotLight,
        ComponentType::AmbientLight,
        ComponentType::Skybox,
        ComponentType::RigidBody,
        ComponentType::BoxCollider,
        ComponentType::Spin,
    ];

    /// Bit position of this kind inside a mask.
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            ComponentType::Tag => "Tag",
            ComponentType::Transform => "Transform",
            ComponentType::Camera => "Camera",
            ComponentType::MeshRenderer => "MeshRenderer",
            ComponentType::Material => "Material",
            ComponentType::DirectionalLight => "DirectionalLight",
            ComponentType::PointLight => "PointLight",
            ComponentType::SpotLight => "SpotLight",
            ComponentType::AmbientLight => "AmbientLight",
            ComponentType::Skybox => "Skybox",
            ComponentType::RigidBody => "RigidBody",
            ComponentType::BoxCollider => "BoxCollider",
            ComponentType::Spin => "Spin",
        }
    }

    /// Look a kind up by its [`name`](Self::name).
    pub fn from_name(name: &str) -> Result<Self, EcsError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| EcsError::UnknownKindName(name.to_string()))
    }
}

impl TryFrom<u32> for ComponentType {
    type Error = EcsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(EcsError::UnregisteredKind(value))
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const _: () = assert!(ComponentType::COUNT <= u16::BITS as usize);

/// Bitset of component kinds present on an entity (its "signature").
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ComponentMask(u16);

impl ComponentMask {
    pub const EMPTY: ComponentMask = ComponentMask(0);

    /// Mask containing exactly the given kinds.
    pub const fn of(kinds: &[ComponentType]) -> Self {
        let mut bits = 0u16;
        let mut i = 0;
        while i < kinds.len() {
            bits |= 1 << kinds[i].index();
            i += 1;
        }
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, kind: ComponentType) -> bool {
        self.0 & (1 << kind.index()) != 0
    }

    /// True when every kind in `other` is also in `self`.
    pub const fn contains_all(self, other: ComponentMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn with(self, kind: ComponentType) -> Self {
        Self(self.0 | (1 << kind.index()))
    }

    pub const fn without(self, kind: ComponentType) -> Self {
        Self(self.0 & !(1 << kind.index()))
    }

    pub fn insert(&mut self, kind: ComponentType) {
        *self = self.with(kind);
    }

    pub fn remove(&mut self, kind: ComponentType) {
        *self = self.without(kind);
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Kinds in the mask, in bit order.
    pub fn iter(self) -> impl Iterator<Item = ComponentType> {
        ComponentType::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

impl FromIterator<ComponentType> for ComponentMask {
    fn from_iter<I: IntoIterator<Item = ComponentType>>(iter: I) -> Self {
        iter.into_iter()
            .fold(ComponentMask::EMPTY, |mask, kind| mask.with(kind))
    }
}

impl fmt::Debug for ComponentMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_indices_match_all_order() {
        for (i, kind) in ComponentType::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
            assert_eq!(ComponentType::try_from(i as u32), Ok(*kind));
        }
    }

    #[test]
    fn unknown_numeric_kind_is_unregistered() {
        assert_eq!(
            ComponentType::try_from(13),
            Err(EcsError::UnregisteredKind(13))
        );
    }

    #[test]
    fn names_round_trip() {
        for kind in ComponentType::ALL {
            assert_eq!(ComponentType::from_name(kind.name()), Ok(kind));
        }
        assert!(ComponentType::from_name("Velocity").is_err());
    }

    #[test]
    fn superset_test() {
        let signature = ComponentMask::of(&[ComponentType::Transform, ComponentType::Camera]);
        let full = signature.with(ComponentType::Tag);
        assert!(full.contains_all(signature));
        assert!(!signature.without(ComponentType::Camera).contains_all(signature));
        assert!(signature.contains_all(ComponentMask::EMPTY));
    }

    #[test]
    fn iteration_and_len() {
        let mask: ComponentMask = [ComponentType::Spin, ComponentType::Tag].into_iter().collect();
        assert_eq!(mask.len(), 2);
        assert_eq!(
            mask.iter().collect::<Vec<_>>(),
            vec![ComponentType::Tag, ComponentType::Spin]
        );
    }
}
