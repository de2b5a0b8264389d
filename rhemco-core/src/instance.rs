//! Extension instance registry
//!
//! An extension can be activated several times with different species lists
//! and parameters. Each activation is an [`Instance`] owned by the
//! [`InstanceRegistry`]; the extension only keeps the integer handle that was
//! returned on creation and looks the instance up again whenever it runs.
//!
//! One registry holds the instances of every extension of a simulation domain.
//! Handles come from a counter that is never reset, so a removed handle is
//! never handed out again.
//!
//! ```
//! use rhemco_core::instance::InstanceRegistry;
//!
//! let mut registry = InstanceRegistry::new();
//! let (handle, instance) = registry.create(7).unwrap();
//! instance.push_species(1, 2.0, "O3_FIELD");
//!
//! assert_eq!(registry.get(handle).unwrap().n_species(), 1);
//!
//! registry.remove(handle);
//! assert!(registry.get(handle).is_err());
//! ```

use crate::config::ExtensionHandle;
use crate::errors::{HcoError, HcoResult};
use crate::species::SpeciesHandle;
use log::debug;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Handle of an extension instance
pub type InstanceHandle = i32;

/// Access to the concrete type behind a trait object
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Extension-specific state carried by an instance.
///
/// Implementations are registered with `#[typetag::serde]` so that a registry
/// can be serialised together with the data of every extension.
#[typetag::serde(tag = "type")]
pub trait InstanceData: AsAny + std::fmt::Debug + Send + Sync {}

/// One species handled by an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpecies {
    pub handle: SpeciesHandle,
    pub scale_factor: f64,
    /// Name of an auxiliary input field, empty if unused
    pub field_name: String,
}

/// One activation of an extension
#[derive(Debug, Serialize, Deserialize)]
pub struct Instance {
    handle: InstanceHandle,
    extension: ExtensionHandle,
    species: Vec<InstanceSpecies>,
    data: Option<Box<dyn InstanceData>>,
}

impl Instance {
    fn new(handle: InstanceHandle, extension: ExtensionHandle) -> Self {
        Self {
            handle,
            extension,
            species: vec![],
            data: None,
        }
    }

    pub fn handle(&self) -> InstanceHandle {
        self.handle
    }

    /// Handle of the extension this instance belongs to
    pub fn extension(&self) -> ExtensionHandle {
        self.extension
    }

    pub fn n_species(&self) -> usize {
        self.species.len()
    }

    pub fn species(&self) -> &[InstanceSpecies] {
        &self.species
    }

    pub fn species_handles(&self) -> Vec<SpeciesHandle> {
        self.species.iter().map(|s| s.handle).collect()
    }

    pub fn scale_factors(&self) -> Vec<f64> {
        self.species.iter().map(|s| s.scale_factor).collect()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.species.iter().map(|s| s.field_name.as_str()).collect()
    }

    pub fn push_species(
        &mut self,
        handle: SpeciesHandle,
        scale_factor: f64,
        field_name: impl Into<String>,
    ) -> &mut Self {
        self.species.push(InstanceSpecies {
            handle,
            scale_factor,
            field_name: field_name.into(),
        });
        self
    }

    /// Replace the species of this instance from parallel sequences.
    ///
    /// `scale_factors` and `field_names` must be as long as `handles`.
    pub fn set_species(
        &mut self,
        handles: &[SpeciesHandle],
        scale_factors: &[f64],
        field_names: &[String],
    ) -> HcoResult<()> {
        if scale_factors.len() != handles.len() || field_names.len() != handles.len() {
            return Err(HcoError::configuration(format!(
                "instance {}: {} species but {} scale factors and {} field names",
                self.handle,
                handles.len(),
                scale_factors.len(),
                field_names.len()
            )));
        }
        self.species = handles
            .iter()
            .zip(scale_factors)
            .zip(field_names)
            .map(|((handle, scale_factor), field_name)| InstanceSpecies {
                handle: *handle,
                scale_factor: *scale_factor,
                field_name: field_name.clone(),
            })
            .collect();
        Ok(())
    }

    pub fn set_data(&mut self, data: Box<dyn InstanceData>) -> &mut Self {
        self.data = Some(data);
        self
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Extension data as a concrete type
    pub fn data<T: InstanceData + 'static>(&self) -> Option<&T> {
        self.data.as_deref().and_then(|d| d.as_any().downcast_ref::<T>())
    }

    pub fn data_mut<T: InstanceData + 'static>(&mut self) -> Option<&mut T> {
        self.data
            .as_deref_mut()
            .and_then(|d| d.as_any_mut().downcast_mut::<T>())
    }
}

/// Owner of every extension instance of a simulation domain
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(try_from = "RegistrySnapshot")]
pub struct InstanceRegistry {
    instances: BTreeMap<InstanceHandle, Instance>,
    last_handle: InstanceHandle,
}

/// Serialised form of an [`InstanceRegistry`], checked before use
#[derive(Deserialize)]
struct RegistrySnapshot {
    instances: BTreeMap<InstanceHandle, Instance>,
    last_handle: InstanceHandle,
}

impl TryFrom<RegistrySnapshot> for InstanceRegistry {
    type Error = HcoError;

    fn try_from(snapshot: RegistrySnapshot) -> HcoResult<Self> {
        for (key, instance) in &snapshot.instances {
            if *key != instance.handle || *key < 1 || *key > snapshot.last_handle {
                return Err(HcoError::configuration(format!(
                    "instance snapshot holds handle {} under key {} with last handle {}",
                    instance.handle, key, snapshot.last_handle
                )));
            }
        }
        Ok(Self {
            instances: snapshot.instances,
            last_handle: snapshot.last_handle,
        })
    }
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that the next call to [`create`](Self::create) will assign
    pub fn next_handle(&self) -> InstanceHandle {
        self.last_handle.saturating_add(1)
    }

    /// Create an empty instance for an extension.
    ///
    /// Returns the new handle and the instance so that the caller can fill in
    /// its fields. Fails only once every handle has been used.
    pub fn create(
        &mut self,
        extension: ExtensionHandle,
    ) -> HcoResult<(InstanceHandle, &mut Instance)> {
        let handle = self
            .last_handle
            .checked_add(1)
            .ok_or_else(|| HcoError::Allocation {
                what: "instance handles".to_string(),
                requested: self.instances.len() + 1,
            })?;
        self.last_handle = handle;

        match self.instances.entry(handle) {
            Entry::Vacant(slot) => {
                debug!("Creating instance {} of extension {}", handle, extension);
                Ok((handle, slot.insert(Instance::new(handle, extension))))
            }
            Entry::Occupied(_) => Err(HcoError::configuration(format!(
                "instance handle {} is already in use",
                handle
            ))),
        }
    }

    pub fn get(&self, handle: InstanceHandle) -> HcoResult<&Instance> {
        self.instances
            .get(&handle)
            .ok_or_else(|| HcoError::not_found("instance", handle))
    }

    pub fn get_mut(&mut self, handle: InstanceHandle) -> HcoResult<&mut Instance> {
        self.instances
            .get_mut(&handle)
            .ok_or_else(|| HcoError::not_found("instance", handle))
    }

    pub fn contains(&self, handle: InstanceHandle) -> bool {
        self.instances.contains_key(&handle)
    }

    /// Remove an instance and everything it owns.
    ///
    /// Unknown handles are ignored. Returns true if an instance was removed.
    pub fn remove(&mut self, handle: InstanceHandle) -> bool {
        match self.instances.remove(&handle) {
            Some(instance) => {
                debug!(
                    "Removed instance {} of extension {}",
                    handle, instance.extension
                );
                true
            }
            None => false,
        }
    }

    /// Remove every instance of an extension, returning how many were removed
    pub fn remove_extension(&mut self, extension: ExtensionHandle) -> usize {
        let before = self.instances.len();
        self.instances.retain(|_, i| i.extension != extension);
        before - self.instances.len()
    }

    /// Remove every instance, returning how many were removed.
    ///
    /// The handle counter is not reset.
    pub fn clear(&mut self) -> usize {
        let n = self.instances.len();
        self.instances.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Instances in order of creation
    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.instances.values()
    }

    pub fn instances_of(&self, extension: ExtensionHandle) -> impl Iterator<Item = &Instance> {
        self.iter().filter(move |i| i.extension == extension)
    }
}
