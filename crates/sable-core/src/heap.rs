//! Instance heap with deferred reclamation
//!
//! The heap hands out strong references and keeps a weak tracking entry per
//! allocation. Dropping the last strong reference makes an instance
//! reclaimable, but the tracking entry is only swept by an explicit
//! `collect()` call. Scope unload forces a collection so that everything
//! the scope kept alive is reclaimed before the caller observes the unload
//! as complete.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Weak};

use crate::object::{ClassDef, Instance};
use crate::value::Value;

/// Strong reference to a heap instance
pub type InstanceRef = Arc<Mutex<Instance>>;

/// The instance heap
#[derive(Default)]
pub struct Heap {
    tracked: Mutex<Vec<Weak<Mutex<Instance>>>>,
}

impl Heap {
    /// Create an empty heap
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an instance of `class` with fields set to their defaults
    ///
    /// Property backing storage is seeded alongside declared fields.
    pub fn allocate(&self, class: Arc<ClassDef>) -> InstanceRef {
        let mut fields = FxHashMap::default();
        for field in class.fields.iter().filter(|f| !f.is_static) {
            fields.insert(field.name.clone(), field.initial_value());
        }
        for prop in class.properties.iter().filter(|p| !p.is_static) {
            fields.insert(prop.backing.clone(), prop.ty.default_value());
        }

        let instance = Arc::new(Mutex::new(Instance { class, fields }));
        self.tracked.lock().push(Arc::downgrade(&instance));
        instance
    }

    /// Run one full collection cycle
    ///
    /// Sweeps tracking entries whose instance has no remaining strong
    /// reference and returns the number reclaimed.
    pub fn collect(&self) -> usize {
        let mut tracked = self.tracked.lock();
        let before = tracked.len();
        tracked.retain(|entry| entry.strong_count() > 0);
        before - tracked.len()
    }

    /// Number of instances still reachable through a strong reference
    pub fn live_count(&self) -> usize {
        self.tracked
            .lock()
            .iter()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }
}

/// Static field storage for the classes of one loaded module
///
/// Keyed by (qualified class name, field name). Populated from static
/// field defaults at module load.
#[derive(Default)]
pub struct StaticStore {
    values: Mutex<FxHashMap<(String, String), Value>>,
}

impl StaticStore {
    /// Build the store for a set of classes, seeding static defaults
    pub fn for_classes<'a>(classes: impl Iterator<Item = &'a ClassDef>) -> Self {
        let mut values = FxHashMap::default();
        for class in classes {
            for field in class.fields.iter().filter(|f| f.is_static) {
                values.insert(
                    (class.name.clone(), field.name.clone()),
                    field.initial_value(),
                );
            }
            for prop in class.properties.iter().filter(|p| p.is_static) {
                values.insert(
                    (class.name.clone(), prop.backing.clone()),
                    prop.ty.default_value(),
                );
            }
        }
        Self { values: Mutex::new(values) }
    }

    /// Read a static field value
    pub fn get(&self, class: &str, field: &str) -> Option<Value> {
        self.values
            .lock()
            .get(&(class.to_string(), field.to_string()))
            .cloned()
    }

    /// Overwrite a static field value
    pub fn set(&self, class: &str, field: &str, value: Value) {
        self.values
            .lock()
            .insert((class.to_string(), field.to_string()), value);
    }
}
