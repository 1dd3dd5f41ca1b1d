//! The registry of live managed objects.
//!
//! Registration runs the whole pipeline (name, introspection, metadata)
//! before touching shared state, then checks for a collision and inserts
//! under one write lock. A failure at any step leaves the registry as it
//! was.

use std::any::Any;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use tracing::{debug, info, warn};

use crate::error::PublishError;
use crate::introspect::{introspect, Descriptors};
use crate::metadata::{describe, MetadataRecord};
use crate::name::{build_name, StructuredName};
use crate::resource::{Managed, Resource};
use crate::{Error, Result};

/// Endpoint that makes registered names visible to remote clients.
///
/// Both calls are made while the registry's write lock is held, so the
/// endpoint sees changes in the order the registry commits them.
/// Implementations must not call back into the registry.
pub trait Publisher: Send + Sync {
    fn publish(
        &self,
        name: &StructuredName,
        metadata: &MetadataRecord,
    ) -> std::result::Result<(), PublishError>;

    fn retract(&self, name: &StructuredName) -> std::result::Result<(), PublishError>;
}

/// A registered object: its name, descriptors, metadata and a non-owning
/// reference to the object itself.
pub struct Binding {
    name: StructuredName,
    target: Weak<dyn Any + Send + Sync>,
    descriptors: Descriptors,
    metadata: MetadataRecord,
}

impl Binding {
    pub fn name(&self) -> &StructuredName {
        &self.name
    }

    pub fn descriptors(&self) -> &Descriptors {
        &self.descriptors
    }

    pub fn metadata(&self) -> &MetadataRecord {
        &self.metadata
    }

    /// The object, unless its owner has dropped it.
    pub fn target(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.target.upgrade()
    }

    pub fn is_live(&self) -> bool {
        self.target.strong_count() > 0
    }

    fn is_bound_to<T>(&self, object: &Arc<T>) -> bool {
        std::ptr::eq(
            self.target.as_ptr().cast::<()>(),
            Arc::as_ptr(object).cast::<()>(),
        )
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("name", &self.name)
            .field("live", &self.is_live())
            .field("descriptors", &self.descriptors)
            .finish_non_exhaustive()
    }
}

type Bindings = BTreeMap<StructuredName, Arc<Binding>>;

/// Thread-safe map from structured name to binding.
#[derive(Default)]
pub struct Registry {
    bindings: RwLock<Bindings>,
    publisher: Option<Arc<dyn Publisher>>,
}

impl Registry {
    /// A registry that publishes nowhere.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that notifies `publisher` of every change it commits.
    pub fn with_publisher(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            bindings: RwLock::new(BTreeMap::new()),
            publisher: Some(publisher),
        }
    }

    /// Register an object under its type's declaration.
    pub fn register<T: Managed>(&self, object: &Arc<T>) -> Result<StructuredName> {
        self.register_with(object, T::resource())
    }

    /// Register an object under a caller-supplied declaration.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidName`] / [`Error::InvalidMember`] from validation
    /// - [`Error::DuplicateName`] if a live object already holds the name
    /// - [`Error::Publish`] if the binding was inserted but the publisher failed
    pub fn register_with<T: Managed>(
        &self,
        object: &Arc<T>,
        resource: Resource<T>,
    ) -> Result<StructuredName> {
        let name = build_name(&resource, object)?;
        let descriptors = introspect(&resource)?;
        let metadata = describe(&descriptors, resource.object_description());

        let target: Arc<dyn Any + Send + Sync> = object.clone();
        let binding = Arc::new(Binding {
            name: name.clone(),
            target: Arc::downgrade(&target),
            descriptors,
            metadata,
        });

        let mut bindings = self.write();
        match bindings.entry(name.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_live() {
                    return Err(Error::DuplicateName(name));
                }
                debug!(name = %name, "replacing binding of a dropped object");
                entry.insert(Arc::clone(&binding));
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&binding));
            }
        }
        info!(
            name = %name,
            members = binding.descriptors.len(),
            "registered managed object"
        );

        if let Some(publisher) = &self.publisher {
            publisher
                .publish(&name, &binding.metadata)
                .map_err(|source| Error::Publish {
                    name: name.clone(),
                    source,
                })?;
        }
        Ok(name)
    }

    /// Remove every binding that refers to `object`, whatever name it was
    /// registered under.
    ///
    /// Objects that were never registered, were already removed, or whose
    /// name is now held by a different object are left alone.
    pub fn unregister<T: Managed>(&self, object: &Arc<T>) -> Result<()> {
        let mut bindings = self.write();
        let names: Vec<StructuredName> = bindings
            .values()
            .filter(|binding| binding.is_bound_to(object))
            .map(|binding| binding.name.clone())
            .collect();
        if names.is_empty() {
            debug!("unregister of an object that is not registered");
            return Ok(());
        }

        let mut failure = None;
        for name in &names {
            bindings.remove(name);
            if let Err(err) = self.retract(name) {
                failure.get_or_insert(err);
            }
        }
        failure.map_or(Ok(()), Err)
    }

    /// Remove whatever is registered under `name`. Returns whether a binding
    /// was removed.
    pub fn unregister_name(&self, name: &StructuredName) -> Result<bool> {
        let mut bindings = self.write();
        if bindings.remove(name).is_none() {
            return Ok(false);
        }
        self.retract(name)?;
        Ok(true)
    }

    /// Drop the bindings of objects whose owners have released them and
    /// retract their names. Returns how many were removed.
    pub fn prune(&self) -> usize {
        if self.read().values().all(|binding| binding.is_live()) {
            return 0;
        }
        let mut bindings = self.write();
        let dead: Vec<StructuredName> = bindings
            .values()
            .filter(|binding| !binding.is_live())
            .map(|binding| binding.name.clone())
            .collect();
        for name in &dead {
            bindings.remove(name);
            debug!(name = %name, "pruned binding of a dropped object");
            self.retract_logged(name);
        }
        dead.len()
    }

    // Called with the write lock held.
    fn retract(&self, name: &StructuredName) -> Result<()> {
        info!(name = %name, "unregistered managed object");
        if let Some(publisher) = &self.publisher {
            publisher.retract(name).map_err(|source| Error::Publish {
                name: name.clone(),
                source,
            })?;
        }
        Ok(())
    }

    fn retract_logged(&self, name: &StructuredName) {
        if let Err(err) = self.retract(name) {
            warn!(error = %err, "failed to retract a dropped object");
        }
    }

    /// Find the binding for `name`. The lock is released before returning.
    ///
    /// The binding of a dropped object is removed and reported as
    /// [`Error::NotFound`].
    pub fn lookup(&self, name: &StructuredName) -> Result<Arc<Binding>> {
        let found = self.read().get(name).cloned();
        match found {
            Some(binding) if binding.is_live() => Ok(binding),
            Some(dead) => {
                let mut bindings = self.write();
                if bindings
                    .get(name)
                    .is_some_and(|current| Arc::ptr_eq(current, &dead))
                {
                    bindings.remove(name);
                    debug!(name = %name, "pruned binding of a dropped object");
                    self.retract_logged(name);
                }
                Err(Error::NotFound(name.clone()))
            }
            None => Err(Error::NotFound(name.clone())),
        }
    }

    /// Names of live objects in sorted order.
    pub fn names(&self) -> Vec<StructuredName> {
        self.prune();
        self.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.prune();
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // The map is updated before the publisher runs, so a panic in the
    // publisher leaves it consistent.
    fn read(&self) -> RwLockReadGuard<'_, Bindings> {
        self.bindings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Bindings> {
        self.bindings.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.read().keys().collect::<Vec<_>>())
            .field("publishing", &self.publisher.is_some())
            .finish()
    }
}
