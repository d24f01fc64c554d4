//! Extension Registry
//!
//! Holds accepted descriptors and indexes them by layer and by extension
//! identifier. Both indexes live behind one lock so readers never see one
//! updated without the other; queries copy `Arc`s out under a short read
//! lock, so a caller iterating results never holds the lock.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::checksum::Checksum;
use crate::descriptor::{ExtensionDescriptor, ExtensionId};
use crate::error::{ExtensionError, Result};
use crate::validator::Validator;

/// Handle of a registered descriptor, increasing in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DescriptorId(u64);

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Uniqueness key: one extension version may be declared once per layer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RegistryKey {
    extension: ExtensionId,
    layer: String,
}

type Entry = (DescriptorId, Arc<ExtensionDescriptor>);

#[derive(Debug, Default)]
struct Indexes {
    /// Insertion order follows id order
    entries: BTreeMap<DescriptorId, Arc<ExtensionDescriptor>>,
    keys: HashMap<RegistryKey, DescriptorId>,
    by_layer: HashMap<String, Vec<Entry>>,
    by_extension: HashMap<ExtensionId, Vec<Entry>>,
    next_id: u64,
    source: Option<Checksum>,
}

impl Indexes {
    fn starting_at(next_id: u64) -> Self {
        Self {
            next_id,
            ..Self::default()
        }
    }

    fn insert(&mut self, descriptor: ExtensionDescriptor) -> Result<DescriptorId> {
        let extension = descriptor.id();
        let mut layers: Vec<&String> = Vec::with_capacity(descriptor.layers.len());
        for layer in &descriptor.layers {
            if layers.contains(&layer) {
                continue;
            }
            let key = RegistryKey {
                extension: extension.clone(),
                layer: layer.clone(),
            };
            if self.keys.contains_key(&key) {
                return Err(ExtensionError::DuplicateExtension {
                    name: extension.name,
                    version: extension.version,
                    layer: layer.clone(),
                });
            }
            layers.push(layer);
        }

        let id = DescriptorId(self.next_id);
        self.next_id += 1;
        let layers: Vec<String> = layers.into_iter().cloned().collect();
        let descriptor = Arc::new(descriptor);

        for layer in layers {
            self.keys.insert(
                RegistryKey {
                    extension: extension.clone(),
                    layer: layer.clone(),
                },
                id,
            );
            self.by_layer
                .entry(layer)
                .or_default()
                .push((id, Arc::clone(&descriptor)));
        }
        self.by_extension
            .entry(extension)
            .or_default()
            .push((id, Arc::clone(&descriptor)));
        self.entries.insert(id, descriptor);

        Ok(id)
    }

    fn remove(&mut self, id: DescriptorId) -> Option<Arc<ExtensionDescriptor>> {
        let descriptor = self.entries.remove(&id)?;
        let extension = descriptor.id();

        for layer in &descriptor.layers {
            self.keys.remove(&RegistryKey {
                extension: extension.clone(),
                layer: layer.clone(),
            });
            if let Some(list) = self.by_layer.get_mut(layer) {
                list.retain(|(entry_id, _)| *entry_id != id);
                if list.is_empty() {
                    self.by_layer.remove(layer);
                }
            }
        }
        if let Some(list) = self.by_extension.get_mut(&extension) {
            list.retain(|(entry_id, _)| *entry_id != id);
            if list.is_empty() {
                self.by_extension.remove(&extension);
            }
        }

        Some(descriptor)
    }
}

/// Read-only copy of the registry contents, in insertion order
///
/// Iterating a snapshot never observes later registrations or removals and
/// can be restarted any number of times.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    descriptors: Vec<Arc<ExtensionDescriptor>>,
}

impl RegistrySnapshot {
    pub fn iter(&self) -> impl Iterator<Item = &ExtensionDescriptor> + '_ {
        self.descriptors.iter().map(|d| d.as_ref())
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Owned copies of every descriptor
    pub fn to_vec(&self) -> Vec<ExtensionDescriptor> {
        self.iter().cloned().collect()
    }
}

impl IntoIterator for RegistrySnapshot {
    type Item = Arc<ExtensionDescriptor>;
    type IntoIter = std::vec::IntoIter<Arc<ExtensionDescriptor>>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.into_iter()
    }
}

impl<'a> IntoIterator for &'a RegistrySnapshot {
    type Item = &'a Arc<ExtensionDescriptor>;
    type IntoIter = std::slice::Iter<'a, Arc<ExtensionDescriptor>>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.iter()
    }
}

/// Concurrent index of accepted extension descriptors
///
/// Construct one per configuration and pass it to whoever needs it; there
/// is no process-wide instance. Only descriptors that pass the per-record
/// rules (non-empty name, valid documentation URI, distinct non-empty
/// layers) are stored.
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    inner: RwLock<Indexes>,
    validator: Validator,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Indexes> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Indexes> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, descriptor: &ExtensionDescriptor) -> Result<()> {
        let issues = self.validator.check_descriptor(descriptor);
        if issues.is_empty() {
            return Ok(());
        }
        Err(ExtensionError::InvalidDescriptor {
            extension: descriptor.id(),
            issues,
        })
    }

    /// Register a descriptor
    ///
    /// Fails with [`ExtensionError::InvalidDescriptor`] if the record breaks
    /// a per-record rule, or with [`ExtensionError::DuplicateExtension`] if
    /// any of its `(name, version, layer)` keys is taken; nothing is
    /// inserted then.
    pub fn register(&self, descriptor: ExtensionDescriptor) -> Result<DescriptorId> {
        self.check(&descriptor)?;
        let id = self.write().insert(descriptor)?;
        debug!(%id, "registered extension descriptor");
        Ok(id)
    }

    /// Remove a descriptor by handle
    pub fn remove(&self, id: DescriptorId) -> Result<Arc<ExtensionDescriptor>> {
        self.write()
            .remove(id)
            .ok_or_else(|| ExtensionError::NotFound(format!("descriptor {}", id)))
    }

    /// Remove every descriptor of one extension version, returning them
    pub fn remove_extension(&self, name: &str, version: Option<&str>) -> Vec<Arc<ExtensionDescriptor>> {
        let mut indexes = self.write();
        let ids: Vec<DescriptorId> = indexes
            .by_extension
            .get(&ExtensionId::new(name, version))
            .map(|list| list.iter().map(|(id, _)| *id).collect())
            .unwrap_or_default();
        ids.into_iter()
            .filter_map(|id| indexes.remove(id))
            .collect()
    }

    /// Replace the whole contents with `descriptors`
    ///
    /// Invalid descriptors and those whose keys collide with an earlier one
    /// in the same batch are left out and returned as errors. Readers see either the old or
    /// the new contents, never a mix.
    pub fn replace_all(
        &self,
        descriptors: impl IntoIterator<Item = ExtensionDescriptor>,
        source: Option<Checksum>,
    ) -> Vec<ExtensionError> {
        let mut errors = Vec::new();
        let valid: Vec<ExtensionDescriptor> = descriptors
            .into_iter()
            .filter(|d| match self.check(d) {
                Ok(()) => true,
                Err(e) => {
                    errors.push(e);
                    false
                }
            })
            .collect();

        let mut indexes = self.write();
        let mut fresh = Indexes::starting_at(indexes.next_id);
        for descriptor in valid {
            if let Err(e) = fresh.insert(descriptor) {
                errors.push(e);
            }
        }
        fresh.source = source;
        *indexes = fresh;
        errors
    }

    /// Drop every descriptor
    pub fn clear(&self) {
        let mut indexes = self.write();
        let next_id = indexes.next_id;
        *indexes = Indexes::starting_at(next_id);
    }

    pub fn get(&self, id: DescriptorId) -> Option<Arc<ExtensionDescriptor>> {
        self.read().entries.get(&id).cloned()
    }

    /// Descriptors that apply to `layer`, in registration order
    pub fn by_layer(&self, layer: &str) -> Vec<Arc<ExtensionDescriptor>> {
        self.read()
            .by_layer
            .get(layer)
            .map(|list| list.iter().map(|(_, d)| Arc::clone(d)).collect())
            .unwrap_or_default()
    }

    /// Descriptors of one extension version across all layers
    pub fn by_extension(&self, name: &str, version: Option<&str>) -> Vec<Arc<ExtensionDescriptor>> {
        self.read()
            .by_extension
            .get(&ExtensionId::new(name, version))
            .map(|list| list.iter().map(|(_, d)| Arc::clone(d)).collect())
            .unwrap_or_default()
    }

    /// Snapshot of every descriptor in registration order
    pub fn all(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            descriptors: self.read().entries.values().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// Layer names with at least one descriptor, sorted
    pub fn layers(&self) -> Vec<String> {
        let mut layers: Vec<String> = self.read().by_layer.keys().cloned().collect();
        layers.sort();
        layers
    }

    /// Registered extension identifiers, sorted
    pub fn extensions(&self) -> Vec<ExtensionId> {
        let mut extensions: Vec<ExtensionId> = self.read().by_extension.keys().cloned().collect();
        extensions.sort();
        extensions
    }

    /// Fingerprint of the document the current contents were loaded from
    pub fn source_checksum(&self) -> Option<Checksum> {
        self.read().source.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ExtensionProperty;
    use crate::schema::Field;
    use crate::validator::ValidationIssue;

    fn descriptor(name: &str, layers: &[&str]) -> ExtensionDescriptor {
        ExtensionDescriptor::new(name, Some("1.0"), "https://docs.example.org", layers.iter().copied())
    }

    #[test]
    fn test_create_registry() {
        let registry = ExtensionRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.all().is_empty());
        assert_eq!(registry.source_checksum(), None);
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ExtensionRegistry::new();
        let ab = registry.register(descriptor("user_band_math", &["A", "B"])).unwrap();
        registry.register(descriptor("time_series", &["B", "C"])).unwrap();

        let b = registry.by_layer("B");
        assert_eq!(b.len(), 2);
        assert_eq!(b[0].name, "user_band_math");
        assert_eq!(b[1].name, "time_series");
        assert!(registry.by_layer("Z").is_empty());

        assert_eq!(registry.by_extension("user_band_math", Some("1.0")).len(), 1);
        assert!(registry.by_extension("user_band_math", None).is_empty());
        assert_eq!(registry.get(ab).unwrap().layers, vec!["A", "B"]);
        assert_eq!(registry.layers(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let registry = ExtensionRegistry::new();
        registry.register(descriptor("user_band_math", &["ndvi"])).unwrap();

        let result = registry.register(
            descriptor("user_band_math", &["other", "ndvi"])
                .with_property(ExtensionProperty::new("float")),
        );
        match result {
            Err(ExtensionError::DuplicateExtension { layer, .. }) => assert_eq!(layer, "ndvi"),
            other => panic!("Expected DuplicateExtension, got {:?}", other),
        }
        assert_eq!(registry.len(), 1);
        // nothing from the rejected descriptor leaked into the indexes
        assert!(registry.by_layer("other").is_empty());
    }

    #[test]
    fn test_invalid_descriptor_not_stored() {
        let registry = ExtensionRegistry::new();
        let layerless = ExtensionDescriptor::new("x", Some("1"), "https://docs.example.org", Vec::<&str>::new());

        for _ in 0..2 {
            match registry.register(layerless.clone()) {
                Err(ExtensionError::InvalidDescriptor { issues, .. }) => {
                    assert_eq!(issues, vec![ValidationIssue::EmptyLayerSet])
                }
                other => panic!("Expected InvalidDescriptor, got {:?}", other),
            }
        }
        assert!(registry.is_empty());

        let no_uri = ExtensionDescriptor::new("x", Some("1"), "", ["A"]);
        match registry.register(no_uri) {
            Err(ExtensionError::InvalidDescriptor { issues, .. }) => assert_eq!(
                issues,
                vec![ValidationIssue::EmptyField {
                    field: Field::OnlineResource
                }]
            ),
            other => panic!("Expected InvalidDescriptor, got {:?}", other),
        }

        let unnamed = ExtensionDescriptor::new(" ", Some("1"), "https://docs.example.org", ["A"]);
        assert!(matches!(
            registry.register(unnamed),
            Err(ExtensionError::InvalidDescriptor { .. })
        ));
        assert_eq!(registry.len(), 0);
        assert!(registry.layers().is_empty());
    }

    #[test]
    fn test_replace_all_skips_invalid() {
        let registry = ExtensionRegistry::new();
        let errors = registry.replace_all(
            vec![
                ExtensionDescriptor::new("layerless", Some("1"), "https://docs.example.org", Vec::<&str>::new()),
                descriptor("user_band_math", &["ndvi", "ndvi"]),
                descriptor("time_series", &["A"]),
            ],
            None,
        );

        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| matches!(e, ExtensionError::InvalidDescriptor { .. })));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.extensions(), vec![ExtensionId::new("time_series", Some("1.0"))]);
    }

    #[test]
    fn test_same_extension_different_layers() {
        let registry = ExtensionRegistry::new();
        registry.register(descriptor("user_band_math", &["ndvi"])).unwrap();
        registry
            .register(
                descriptor("user_band_math", &["ndwi"])
                    .with_property(ExtensionProperty::new("int")),
            )
            .unwrap();
        assert_eq!(registry.by_extension("user_band_math", Some("1.0")).len(), 2);
    }

    #[test]
    fn test_remove_then_register() {
        let registry = ExtensionRegistry::new();
        let id = registry.register(descriptor("user_band_math", &["ndvi"])).unwrap();

        let removed = registry.remove(id).unwrap();
        assert_eq!(removed.name, "user_band_math");
        assert!(registry.is_empty());
        assert!(registry.layers().is_empty());
        assert!(registry.extensions().is_empty());
        assert!(matches!(registry.remove(id), Err(ExtensionError::NotFound(_))));

        let replacement = registry
            .register(descriptor("user_band_math", &["ndvi"]).with_property(ExtensionProperty::new("x")))
            .unwrap();
        assert_ne!(replacement, id);
        assert_eq!(registry.by_layer("ndvi")[0].properties.len(), 1);
    }

    #[test]
    fn test_remove_extension() {
        let registry = ExtensionRegistry::new();
        registry.register(descriptor("user_band_math", &["A"])).unwrap();
        registry.register(descriptor("user_band_math", &["B"])).unwrap();
        registry.register(descriptor("time_series", &["A"])).unwrap();

        let removed = registry.remove_extension("user_band_math", Some("1.0"));
        assert_eq!(removed.len(), 2);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.by_layer("A")[0].name, "time_series");
    }

    #[test]
    fn test_snapshot_is_isolated() {
        let registry = ExtensionRegistry::new();
        registry.register(descriptor("a", &["A"])).unwrap();
        registry.register(descriptor("b", &["B"])).unwrap();

        let snapshot = registry.all();
        registry.register(descriptor("c", &["C"])).unwrap();
        registry.clear();

        let names: Vec<_> = snapshot.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        // restartable
        assert_eq!(snapshot.iter().count(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_replace_all() {
        let registry = ExtensionRegistry::new();
        let old = registry.register(descriptor("old", &["A"])).unwrap();

        let checksum = Checksum::of_document("<doc/>");
        let errors = registry.replace_all(
            vec![
                descriptor("new", &["A"]),
                descriptor("new", &["A"]),
                descriptor("other", &["B"]),
            ],
            Some(checksum.clone()),
        );

        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ExtensionError::DuplicateExtension { .. }));
        assert_eq!(registry.len(), 2);
        assert!(registry.get(old).is_none());
        assert_eq!(registry.by_layer("A")[0].name, "new");
        assert_eq!(registry.source_checksum(), Some(checksum));
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let registry = Arc::new(ExtensionRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let layer = format!("L{}-{}", t, i);
                        registry.register(descriptor("ext", &[layer.as_str()])).unwrap();
                        assert_eq!(registry.by_layer(&layer).len(), 1);
                        let _ = registry.all().len();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 200);
        assert_eq!(registry.by_extension("ext", Some("1.0")).len(), 200);
    }
}
