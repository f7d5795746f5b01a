//! Name-keyed object registry
//!
//! Objects live in a slot arena so removal never moves other entries. A
//! separate insertion-order list gives the stable iteration order the
//! pipeline relies on, and a name map gives O(1) lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::foundation::collections::{new_key_type, SlotMap};

use super::model::ModelData;
use super::object::SceneObject;

new_key_type! {
    /// Stable handle to a registered object
    pub struct ObjectKey;
}

/// Shared handle to a scene object
pub type ObjectRef = Arc<Mutex<SceneObject>>;

/// Lock an object, recovering from a poisoned lock
pub fn lock_object(obj: &ObjectRef) -> MutexGuard<'_, SceneObject> {
    obj.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owner of every live scene object
///
/// The registry is mutated only by the driving thread between job batches.
#[derive(Default)]
pub struct ObjectRegistry {
    slots: SlotMap<ObjectKey, ObjectRef>,
    order: Vec<ObjectKey>,
    names: HashMap<String, ObjectKey>,
    serial: u64,
}

impl ObjectRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an object bound to `model`
    ///
    /// Returns `None` without a model. An existing object with the same
    /// name is returned instead of creating a duplicate; unnamed objects get
    /// a synthetic unique name.
    pub fn create(&mut self, model: Option<Arc<ModelData>>, name: Option<&str>) -> Option<ObjectKey> {
        let model = model?;
        let name = match name {
            Some(name) => {
                if let Some(&key) = self.names.get(name) {
                    return Some(key);
                }
                name.to_string()
            }
            None => self.synthetic_name(),
        };
        let obj = SceneObject::new(name.clone(), Some(model));
        let key = self.slots.insert(Arc::new(Mutex::new(obj)));
        self.order.push(key);
        log::trace!("Created object '{}'", name);
        self.names.insert(name, key);
        Some(key)
    }

    fn synthetic_name(&mut self) -> String {
        loop {
            let name = format!("$obj@{}", self.serial);
            self.serial += 1;
            if !self.names.contains_key(&name) {
                return name;
            }
        }
    }

    /// Key of the object called `name`
    pub fn find(&self, name: &str) -> Option<ObjectKey> {
        self.names.get(name).copied()
    }

    /// Object for `key`
    pub fn get(&self, key: ObjectKey) -> Option<&ObjectRef> {
        self.slots.get(key)
    }

    /// Object called `name`
    pub fn get_by_name(&self, name: &str) -> Option<&ObjectRef> {
        self.find(name).and_then(|key| self.get(key))
    }

    /// Remove an object, running its delete callback first
    pub fn remove(&mut self, key: ObjectKey) -> bool {
        let Some(obj) = self.slots.remove(key) else { return false };
        self.order.retain(|&k| k != key);
        Self::release(&obj);
        let guard = lock_object(&obj);
        self.names.remove(guard.name());
        log::trace!("Removed object '{}'", guard.name());
        true
    }

    /// Remove every object; callbacks run in insertion order
    pub fn remove_all(&mut self) {
        let order = std::mem::take(&mut self.order);
        let mut slots = std::mem::take(&mut self.slots);
        self.names.clear();
        for key in order {
            if let Some(obj) = slots.remove(key) {
                Self::release(&obj);
            }
        }
        log::trace!("Removed all objects");
    }

    fn release(obj: &ObjectRef) {
        let mut guard = lock_object(obj);
        if let Some(f) = guard.callbacks.delete.clone() {
            f(&mut *guard);
        }
    }

    /// Visit objects in insertion order until `f` returns false
    pub fn for_each(&self, mut f: impl FnMut(ObjectKey, &ObjectRef) -> bool) {
        for &key in &self.order {
            if let Some(obj) = self.slots.get(key) {
                if !f(key, obj) {
                    break;
                }
            }
        }
    }

    /// Objects in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (ObjectKey, &ObjectRef)> + '_ {
        self.order
            .iter()
            .filter_map(|&key| self.slots.get(key).map(|obj| (key, obj)))
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no objects are registered
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::test_support::box_model;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_create_requires_model() {
        let mut reg = ObjectRegistry::new();
        assert!(reg.create(None, Some("ghost")).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_create_is_idempotent_by_name() {
        let mut reg = ObjectRegistry::new();
        let a = reg.create(Some(box_model()), Some("crate")).unwrap();
        let b = reg.create(Some(box_model()), Some("crate")).unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.find("crate"), Some(a));
    }

    #[test]
    fn test_synthetic_names_are_unique() {
        let mut reg = ObjectRegistry::new();
        reg.create(Some(box_model()), Some("$obj@1"));
        let a = reg.create(Some(box_model()), None).unwrap();
        let b = reg.create(Some(box_model()), None).unwrap();
        let name_a = lock_object(reg.get(a).unwrap()).name().to_string();
        let name_b = lock_object(reg.get(b).unwrap()).name().to_string();
        assert_eq!(name_a, "$obj@0");
        assert_eq!(name_b, "$obj@2");
    }

    #[test]
    fn test_iteration_order_survives_removal() {
        let mut reg = ObjectRegistry::new();
        let keys: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .map(|n| reg.create(Some(box_model()), Some(*n)).unwrap())
            .collect();
        assert!(reg.remove(keys[1]));
        assert!(!reg.remove(keys[1]));
        reg.create(Some(box_model()), Some("e"));

        let mut names = Vec::new();
        reg.for_each(|_, obj| {
            names.push(lock_object(obj).name().to_string());
            true
        });
        assert_eq!(names, ["a", "c", "d", "e"]);
        assert!(reg.find("b").is_none());
    }

    #[test]
    fn test_for_each_stops_early() {
        let mut reg = ObjectRegistry::new();
        for n in ["a", "b", "c"] {
            reg.create(Some(box_model()), Some(n));
        }
        let mut visited = 0;
        reg.for_each(|_, _| {
            visited += 1;
            visited < 2
        });
        assert_eq!(visited, 2);
    }

    #[test]
    fn test_remove_all_runs_delete_callbacks() {
        let deleted = Arc::new(AtomicUsize::new(0));
        let mut reg = ObjectRegistry::new();
        for n in ["a", "b", "c"] {
            let key = reg.create(Some(box_model()), Some(n)).unwrap();
            let deleted = Arc::clone(&deleted);
            lock_object(reg.get(key).unwrap()).callbacks.delete = Some(Arc::new(move |_obj: &mut SceneObject| {
                deleted.fetch_add(1, Ordering::SeqCst);
            }));
        }
        reg.remove_all();
        assert_eq!(deleted.load(Ordering::SeqCst), 3);
        assert_eq!(reg.len(), 0);
        let mut visited = 0;
        reg.for_each(|_, _| {
            visited += 1;
            true
        });
        assert_eq!(visited, 0);
    }
}
