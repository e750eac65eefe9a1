use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Singleton values shared between systems and pipelines within a tick
/// (active camera, viewport, aggregated lighting).
///
/// Resources are keyed by Rust type; component kinds are not, they go through
/// the closed [`ComponentType`](crate::ComponentType) dispatch instead.
#[derive(Default)]
pub struct Resources {
    map: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resource, returning the value it replaced.
    pub fn insert<T: Any + Send>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast().ok())
            .map(|old| *old)
    }

    pub fn get<T: Any + Send>(&self) -> Option<&T> {
        self.map.get(&TypeId::of::<T>())?.downcast_ref()
    }

    pub fn get_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.map.get_mut(&TypeId::of::<T>())?.downcast_mut()
    }

    /// Mutable access, inserting `T::default()` first if absent.
    pub fn get_or_default<T: Any + Send + Default>(&mut self) -> &mut T {
        self.map
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::default()))
            .downcast_mut()
            .expect("resource stored under a foreign TypeId")
    }

    pub fn remove<T: Any + Send>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())?
            .downcast()
            .ok()
            .map(|b| *b)
    }

    pub fn contains<T: Any + Send>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Viewport(u32, u32);

    #[test]
    fn insert_replace_and_get() {
        let mut res = Resources::new();
        assert_eq!(res.insert(Viewport(800, 600)), None);
        assert_eq!(res.insert(Viewport(1280, 720)), Some(Viewport(800, 600)));
        assert_eq!(res.get::<Viewport>(), Some(&Viewport(1280, 720)));
    }

    #[test]
    fn get_or_default_inserts_once() {
        let mut res = Resources::new();
        res.get_or_default::<Vec<u32>>().push(1);
        res.get_or_default::<Vec<u32>>().push(2);
        assert_eq!(res.get::<Vec<u32>>(), Some(&vec![1, 2]));
    }

    #[test]
    fn remove_resource() {
        let mut res = Resources::new();
        res.insert(99u32);
        assert_eq!(res.remove::<u32>(), Some(99));
        assert!(!res.contains::<u32>());
    }
}
