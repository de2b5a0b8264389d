//! Custom extension
//!
//! A generic extension that applies a fixed scale factor to the emissions of
//! each of its species. Several copies can be active at once, each registered
//! under its own name in the configuration.
//!
//! Options read from the configuration:
//!
//! - `Scaling` (real): scale factor for species without their own factor
//! - `Scaling_<species>` (real): scale factor of one species
//! - `Field_<species>` (string): name of an auxiliary input field

use log::warn;
use rhemco_core::config::ExtensionHandle;
use rhemco_core::errors::{HcoResult, ResultExt};
use rhemco_core::extension::{Extension, ExtensionSlots};
use rhemco_core::instance::{InstanceData, InstanceSpecies};
use rhemco_core::species::WILDCARD_SPECIES;
use rhemco_core::state::RuntimeState;
use serde::{Deserialize, Serialize};

const OPT_SCALING: &str = "Scaling";

/// Parameters of one Custom instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomParameters {
    /// Scale factor used for species without an explicit one
    ///
    /// Default: 1.0
    pub default_scale: f64,
}

impl Default for CustomParameters {
    fn default() -> Self {
        Self { default_scale: 1.0 }
    }
}

/// State carried by a Custom instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomData {
    pub parameters: CustomParameters,
    /// Number of completed time steps
    pub steps: u64,
}

#[typetag::serde]
impl InstanceData for CustomData {}

/// Scale the emissions of a list of species
#[derive(Debug, Clone)]
pub struct Custom {
    name: String,
}

impl Default for Custom {
    fn default() -> Self {
        Self::new("Custom")
    }
}

impl Custom {
    /// Create a Custom extension registered under `name`
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    fn resolve_species(
        &self,
        extension: ExtensionHandle,
        state: &RuntimeState,
        parameters: &CustomParameters,
    ) -> HcoResult<Vec<InstanceSpecies>> {
        let resolved = state.resolve_extension_species(extension)?;
        let config = state.config()?;

        let mut species = vec![];
        for (handle, name) in resolved.iter() {
            if handle <= WILDCARD_SPECIES {
                warn!("{}: skipping species '{}'", self.name, name);
                continue;
            }
            let scale_factor = config
                .get_real(extension, &format!("Scaling_{}", name))?
                .unwrap_or(parameters.default_scale);
            let field_name = config
                .get_string(extension, &format!("Field_{}", name))?
                .unwrap_or_default();
            species.push(InstanceSpecies {
                handle,
                scale_factor,
                field_name,
            });
        }
        Ok(species)
    }
}

impl Extension for Custom {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(
        &self,
        extension: ExtensionHandle,
        state: &mut RuntimeState,
        slots: &mut ExtensionSlots,
    ) -> HcoResult<()> {
        let parameters = CustomParameters {
            default_scale: state
                .config()?
                .get_real(extension, OPT_SCALING)
                .context("Custom::init")?
                .unwrap_or(CustomParameters::default().default_scale),
        };
        let species = self
            .resolve_species(extension, state, &parameters)
            .context("Custom::init")?;

        let handles: Vec<_> = species.iter().map(|s| s.handle).collect();
        let scale_factors: Vec<_> = species.iter().map(|s| s.scale_factor).collect();
        let field_names: Vec<_> = species.into_iter().map(|s| s.field_name).collect();

        let (handle, instance) = state
            .instances_mut()
            .create(extension)
            .context("Custom::init")?;
        slots.set(&self.name, handle);
        instance
            .set_species(&handles, &scale_factors, &field_names)
            .context("Custom::init")?;
        instance.set_data(Box::new(CustomData {
            parameters,
            steps: 0,
        }));
        Ok(())
    }

    fn run(&self, state: &mut RuntimeState, slots: &ExtensionSlots) -> HcoResult<()> {
        let handle = slots.require(&self.name).context("Custom::run")?;
        let species = state
            .instances()
            .get(handle)
            .context("Custom::run")?
            .species()
            .to_vec();

        if state.options()?.scale_emissions {
            for entry in &species {
                let emissions = state
                    .species_mut()
                    .get_mut(entry.handle)
                    .and_then(|s| s.emissions.as_owned_mut());
                if let Some(values) = emissions {
                    *values *= entry.scale_factor;
                }
            }
        }

        if let Some(data) = state
            .instances_mut()
            .get_mut(handle)
            .context("Custom::run")?
            .data_mut::<CustomData>()
        {
            data.steps += 1;
        }
        Ok(())
    }

    fn finalize(&self, state: &mut RuntimeState, slots: &mut ExtensionSlots) {
        if let Some(handle) = slots.take(&self.name) {
            state.instances_mut().remove(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;
    use ndarray::Array3;
    use rhemco_core::config::{ExtensionConfig, ExtensionEntry, OptionValue, CORE_EXTENSION};
    use rhemco_core::errors::ErrorKind;
    use std::sync::Arc;

    fn state(config: ExtensionConfig) -> RuntimeState {
        let mut state = RuntimeState::new();
        state.init(3, Arc::new(config)).unwrap();
        for (handle, name) in [(1, "O3"), (2, "NO"), (3, "NO2")] {
            state.species_mut().define(handle, name).unwrap();
        }
        state
    }

    fn config() -> ExtensionConfig {
        let mut config = ExtensionConfig::new();
        config.with_separator(";").unwrap().mark_parsed();
        config
            .add_extension(
                ExtensionEntry::new("Custom", 7, "O3;NO;CO")
                    .with_option("Scaling", OptionValue::Real(2.0))
                    .with_option("Scaling_NO", OptionValue::Real(0.5))
                    .with_option("Field_O3", OptionValue::Str("O3_SRC".to_string())),
            )
            .unwrap();
        config
    }

    #[test]
    fn test_init_creates_instance() {
        let mut state = state(config());
        let mut slots = ExtensionSlots::new();
        let custom = Custom::default();

        custom.init(7, &mut state, &mut slots).unwrap();

        let handle = slots.get("Custom").unwrap();
        let instance = state.instances().get(handle).unwrap();
        assert_eq!(instance.extension(), 7);
        // CO is not a known species and is dropped
        assert_eq!(instance.species_handles(), vec![1, 2]);
        assert_eq!(instance.scale_factors(), vec![2.0, 0.5]);
        assert_eq!(instance.field_names(), vec!["O3_SRC", ""]);
        assert_eq!(
            instance.data::<CustomData>().unwrap().parameters.default_scale,
            2.0
        );
    }

    #[test]
    fn test_run_scales_owned_emissions() {
        let mut state = state(config());
        let mut slots = ExtensionSlots::new();
        let custom = Custom::default();
        custom.init(7, &mut state, &mut slots).unwrap();

        state
            .species_mut()
            .get_mut(2)
            .unwrap()
            .emissions
            .bind_owned(Array3::from_elem((2, 2, 1), 4.0));

        custom.run(&mut state, &slots).unwrap();

        let values = state
            .species()
            .get(2)
            .unwrap()
            .emissions
            .as_owned()
            .unwrap();
        assert!(values.iter().all(|v| is_close!(*v, 2.0)));

        let handle = slots.get("Custom").unwrap();
        let data = state
            .instances()
            .get(handle)
            .unwrap()
            .data::<CustomData>()
            .unwrap();
        assert_eq!(data.steps, 1);
    }

    #[test]
    fn test_run_respects_scale_switch() {
        let mut config = config();
        config.set_core_option("Scale emissions", OptionValue::Bool(false));
        let mut state = state(config);
        let mut slots = ExtensionSlots::new();
        let custom = Custom::default();
        custom.init(7, &mut state, &mut slots).unwrap();

        state
            .species_mut()
            .get_mut(1)
            .unwrap()
            .emissions
            .bind_owned(Array3::from_elem((1, 1, 1), 3.0));
        custom.run(&mut state, &slots).unwrap();

        let values = state.species().get(1).unwrap().emissions.as_owned().unwrap();
        assert_eq!(values[[0, 0, 0]], 3.0);
        assert_eq!(
            state.config().unwrap().get_bool(CORE_EXTENSION, "Scale emissions").unwrap(),
            Some(false)
        );
    }

    #[test]
    fn test_run_without_init_fails() {
        let mut state = state(config());
        let slots = ExtensionSlots::new();
        let err = Custom::default().run(&mut state, &slots).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.traceback(), vec!["Custom::run"]);
    }

    #[test]
    fn test_two_copies_get_distinct_instances() {
        let mut config = config();
        config
            .add_extension(ExtensionEntry::new("Custom.2", 8, "NO2"))
            .unwrap();
        let mut state = state(config);
        let mut slots = ExtensionSlots::new();

        let first = Custom::default();
        let second = Custom::new("Custom.2");
        first.init(7, &mut state, &mut slots).unwrap();
        second.init(8, &mut state, &mut slots).unwrap();

        assert_eq!(slots.get("Custom"), Some(1));
        assert_eq!(slots.get("Custom.2"), Some(2));
        let instance = state.instances().get(2).unwrap();
        assert_eq!(instance.species_handles(), vec![3]);
        assert_eq!(instance.scale_factors(), vec![1.0]);

        first.finalize(&mut state, &mut slots);
        assert!(state.instances().get(1).is_err());
        assert!(state.instances().get(2).is_ok());

        // Finalizing again is a no-op
        first.finalize(&mut state, &mut slots);
        second.finalize(&mut state, &mut slots);
        assert!(state.instances().is_empty());
    }

    #[test]
    fn test_wrong_option_type_aborts_init() {
        let mut config = ExtensionConfig::new();
        config.mark_parsed();
        config
            .add_extension(
                ExtensionEntry::new("Custom", 7, "O3")
                    .with_option("Scaling_O3", OptionValue::Str("high".to_string())),
            )
            .unwrap();
        let mut state = state(config);
        let mut slots = ExtensionSlots::new();

        let err = Custom::default()
            .init(7, &mut state, &mut slots)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(state.instances().is_empty());
        assert!(slots.is_empty());
    }
}
