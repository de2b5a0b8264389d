//! Extension framework
//!
//! An extension is an emission module that can be switched on in the
//! configuration. It keeps no state of its own between calls: during `init` it
//! creates an instance in the runtime state's [`InstanceRegistry`] and stores
//! the returned handle in the [`ExtensionSlots`]; `run` and `finalize` fetch the
//! handle from there.
//!
//! [`InstanceRegistry`]: crate::instance::InstanceRegistry

use crate::config::ExtensionHandle;
use crate::errors::{HcoError, HcoResult};
use crate::instance::InstanceHandle;
use crate::state::RuntimeState;
use log::{debug, info};
use std::collections::HashMap;

/// Instance handles of active extensions, keyed by extension name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtensionSlots {
    slots: HashMap<String, InstanceHandle>,
}

impl ExtensionSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, extension: &str, handle: InstanceHandle) {
        self.slots.insert(extension.to_string(), handle);
    }

    pub fn get(&self, extension: &str) -> Option<InstanceHandle> {
        self.slots.get(extension).copied()
    }

    /// Like [`get`](Self::get) but a missing slot is an error
    pub fn require(&self, extension: &str) -> HcoResult<InstanceHandle> {
        self.get(extension)
            .ok_or_else(|| HcoError::not_found("extension slot", extension))
    }

    /// Remove and return the handle of an extension
    pub fn take(&mut self, extension: &str) -> Option<InstanceHandle> {
        self.slots.remove(extension)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// An emission module
pub trait Extension: std::fmt::Debug {
    /// Name under which the extension is registered in the configuration
    fn name(&self) -> &str;

    /// Create this extension's instance
    fn init(
        &self,
        extension: ExtensionHandle,
        state: &mut RuntimeState,
        slots: &mut ExtensionSlots,
    ) -> HcoResult<()>;

    /// Called once per time step
    fn run(&self, state: &mut RuntimeState, slots: &ExtensionSlots) -> HcoResult<()>;

    /// Remove this extension's instance.
    ///
    /// Must be safe to call when `init` failed part way or was never called.
    fn finalize(&self, state: &mut RuntimeState, slots: &mut ExtensionSlots);
}

/// Drives a set of extensions through their lifecycle.
///
/// Extensions are initialized and run in the order they were added and
/// finalized in reverse order. Extensions that the configuration does not
/// enable are skipped.
#[derive(Debug, Default)]
pub struct ExtensionManager {
    extensions: Vec<Box<dyn Extension>>,
    /// Indexes of extensions whose `init` was called
    started: Vec<usize>,
    slots: ExtensionSlots,
}

impl ExtensionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extension(&mut self, extension: Box<dyn Extension>) -> &mut Self {
        self.extensions.push(extension);
        self
    }

    pub fn slots(&self) -> &ExtensionSlots {
        &self.slots
    }

    /// Names of the extensions that have been started
    pub fn active(&self) -> Vec<&str> {
        self.started
            .iter()
            .map(|idx| self.extensions[*idx].name())
            .collect()
    }

    /// Initialize every enabled extension.
    ///
    /// Stops at the first failure; call [`finalize`](Self::finalize) to clean
    /// up the extensions that were started.
    pub fn init(&mut self, state: &mut RuntimeState) -> HcoResult<()> {
        for (idx, extension) in self.extensions.iter().enumerate() {
            if self.started.contains(&idx) {
                continue;
            }
            let handle = match state.config()?.extension_handle(extension.name()) {
                Some(handle) => handle,
                None => {
                    debug!("Extension {} is not enabled", extension.name());
                    continue;
                }
            };

            info!("Initializing extension {} ({})", extension.name(), handle);
            self.started.push(idx);
            extension
                .init(handle, state, &mut self.slots)
                .map_err(|e| e.context("ExtensionManager::init"))?;
        }
        Ok(())
    }

    pub fn run(&self, state: &mut RuntimeState) -> HcoResult<()> {
        for idx in &self.started {
            self.extensions[*idx]
                .run(state, &self.slots)
                .map_err(|e| e.context("ExtensionManager::run"))?;
        }
        Ok(())
    }

    /// Finalize started extensions in reverse order
    pub fn finalize(&mut self, state: &mut RuntimeState) {
        while let Some(idx) = self.started.pop() {
            self.extensions[idx].finalize(state, &mut self.slots);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtensionConfig, ExtensionEntry};
    use crate::errors::ErrorKind;
    use std::sync::Arc;

    /// Creates one instance and fails afterwards if asked to
    #[derive(Debug)]
    struct Probe {
        name: String,
        fail_init: bool,
    }

    impl Probe {
        fn boxed(name: &str, fail_init: bool) -> Box<dyn Extension> {
            Box::new(Probe {
                name: name.to_string(),
                fail_init,
            })
        }
    }

    impl Extension for Probe {
        fn name(&self) -> &str {
            &self.name
        }

        fn init(
            &self,
            extension: ExtensionHandle,
            state: &mut RuntimeState,
            slots: &mut ExtensionSlots,
        ) -> HcoResult<()> {
            let species = state.resolve_extension_species(extension)?;
            let (handle, instance) = state.instances_mut().create(extension)?;
            for (species_handle, _) in species.iter() {
                instance.push_species(species_handle, 1.0, "");
            }
            slots.set(&self.name, handle);
            if self.fail_init {
                return Err(HcoError::configuration("probe failure"));
            }
            Ok(())
        }

        fn run(&self, state: &mut RuntimeState, slots: &ExtensionSlots) -> HcoResult<()> {
            let handle = slots.require(&self.name)?;
            state.instances().get(handle)?;
            Ok(())
        }

        fn finalize(&self, state: &mut RuntimeState, slots: &mut ExtensionSlots) {
            if let Some(handle) = slots.take(&self.name) {
                state.instances_mut().remove(handle);
            }
        }
    }

    fn state() -> RuntimeState {
        let mut config = ExtensionConfig::new();
        config.mark_parsed();
        config
            .add_extension(ExtensionEntry::new("A", 1, "X"))
            .unwrap();
        config
            .add_extension(ExtensionEntry::new("B", 2, "X/Y"))
            .unwrap();
        let mut disabled = ExtensionEntry::new("C", 3, "Y");
        disabled.enabled = false;
        config.add_extension(disabled).unwrap();

        let mut state = RuntimeState::new();
        state.init(2, Arc::new(config)).unwrap();
        state.species_mut().define(1, "X").unwrap();
        state.species_mut().define(2, "Y").unwrap();
        state
    }

    #[test]
    fn test_lifecycle() {
        let mut state = state();
        let mut manager = ExtensionManager::new();
        manager
            .with_extension(Probe::boxed("A", false))
            .with_extension(Probe::boxed("B", false))
            .with_extension(Probe::boxed("C", false));

        manager.init(&mut state).unwrap();
        assert_eq!(manager.active(), vec!["A", "B"]);
        assert_eq!(manager.slots().get("A"), Some(1));
        assert_eq!(manager.slots().get("B"), Some(2));
        assert_eq!(manager.slots().get("C"), None);
        assert_eq!(
            state.instances().get(2).unwrap().species_handles(),
            vec![1, 2]
        );

        manager.run(&mut state).unwrap();

        manager.finalize(&mut state);
        assert!(state.instances().is_empty());
        assert!(manager.slots().is_empty());
        assert!(manager.active().is_empty());
    }

    #[test]
    fn test_failed_init_can_be_finalized() {
        let mut state = state();
        let mut manager = ExtensionManager::new();
        manager
            .with_extension(Probe::boxed("A", false))
            .with_extension(Probe::boxed("B", true));

        let err = manager.init(&mut state).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.traceback(), vec!["ExtensionManager::init"]);
        assert_eq!(state.instances().len(), 2);

        manager.finalize(&mut state);
        assert!(state.instances().is_empty());

        // A second finalize has nothing left to do
        manager.finalize(&mut state);
    }

    #[test]
    fn test_run_with_removed_instance_fails() {
        let mut state = state();
        let mut manager = ExtensionManager::new();
        manager.with_extension(Probe::boxed("A", false));
        manager.init(&mut state).unwrap();

        state.instances_mut().clear();
        let err = manager.run(&mut state).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_slots() {
        let mut slots = ExtensionSlots::new();
        assert_eq!(
            slots.require("Custom").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        slots.set("Custom", 4);
        assert_eq!(slots.require("Custom").unwrap(), 4);
        assert_eq!(slots.take("Custom"), Some(4));
        assert_eq!(slots.take("Custom"), None);
    }
}
