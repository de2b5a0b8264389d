//! Species registry
//!
//! Species are addressed by a dense 1-based handle that is fixed for the
//! lifetime of the runtime state. Two handles are reserved:
//!
//! - [`WILDCARD_SPECIES`] (0) stands for "all species" and is returned when a
//!   lookup is made with the configured wildcard token
//! - [`SPECIES_NOT_FOUND`] (-1) is returned by lookups that match nothing
//!
//! The registry also records the handle the host model uses for each species
//! (the model id). It is unset (-1) until the host assigns it.

use crate::buffer::{Buffer2D, Buffer3D};
use crate::config::DEFAULT_WILDCARD;
use crate::errors::{try_with_capacity, HcoError, HcoResult};
use crate::utils::check_wildcard;
use serde::{Deserialize, Serialize};

/// Integer species handle
pub type SpeciesHandle = i32;

pub const WILDCARD_SPECIES: SpeciesHandle = 0;
pub const SPECIES_NOT_FOUND: SpeciesHandle = -1;

/// Henry's law coefficients
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HenryLaw {
    /// Solubility at 298 K
    /// unit: M / atm
    pub k0: f64,
    /// Temperature dependence
    /// unit: K
    pub cr: f64,
    /// Acid dissociation constant
    pub pka: f64,
}

/// Metadata and data buffers of one species
#[derive(Debug, Clone)]
pub struct Species {
    handle: SpeciesHandle,
    name: String,
    /// Handle of this species in the host model, -1 until assigned
    pub model_id: SpeciesHandle,
    /// unit: g / mol
    pub molecular_weight: f64,
    /// Molecular weight of the emitted species
    /// unit: g / mol
    pub emitted_molecular_weight: f64,
    /// Molecules of species per molecule of emitted species
    pub molecular_ratio: f64,
    pub henry: HenryLaw,
    pub emissions: Buffer3D,
    pub concentration: Buffer3D,
    pub deposition_velocity: Buffer2D,
}

impl Species {
    fn new(handle: SpeciesHandle) -> Self {
        Self {
            handle,
            name: String::new(),
            model_id: SPECIES_NOT_FOUND,
            molecular_weight: 0.0,
            emitted_molecular_weight: 0.0,
            molecular_ratio: 1.0,
            henry: HenryLaw::default(),
            emissions: Buffer3D::Unbound,
            concentration: Buffer3D::Unbound,
            deposition_velocity: Buffer2D::Unbound,
        }
    }

    pub fn handle(&self) -> SpeciesHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if any data buffer is bound
    pub fn has_data(&self) -> bool {
        self.emissions.is_bound()
            || self.concentration.is_bound()
            || self.deposition_velocity.is_bound()
    }

    pub fn release_buffers(&mut self) {
        self.emissions.release();
        self.concentration.release();
        self.deposition_velocity.release();
    }
}

/// Fixed-size collection of species
#[derive(Debug, Clone)]
pub struct SpeciesRegistry {
    species: Vec<Species>,
    /// Token that stands for "all species"; never a species name
    wildcard: String,
}

impl Default for SpeciesRegistry {
    fn default() -> Self {
        Self {
            species: vec![],
            wildcard: DEFAULT_WILDCARD.to_string(),
        }
    }
}

impl SpeciesRegistry {
    /// Allocate `n` species with handles `1..=n` and no names.
    pub fn with_count(n: usize) -> HcoResult<Self> {
        if SpeciesHandle::try_from(n).is_err() {
            return Err(HcoError::Allocation {
                what: "species handles".to_string(),
                requested: n,
            });
        }
        let mut species = try_with_capacity(n, "species")?;
        // n fits in a SpeciesHandle, checked above
        species.extend((1..=n as SpeciesHandle).map(Species::new));
        Ok(Self {
            species,
            ..Self::default()
        })
    }

    /// Use `wildcard` as the "all species" token.
    ///
    /// Fails if the token is malformed or a species already carries it as name.
    pub fn with_wildcard(mut self, wildcard: &str) -> HcoResult<Self> {
        check_wildcard(wildcard)?;
        if let Some(species) = self.find(wildcard) {
            return Err(HcoError::configuration(format!(
                "species {} is named after the wildcard token '{}'",
                species.handle, wildcard
            )));
        }
        self.wildcard = wildcard.to_string();
        Ok(self)
    }

    pub fn wildcard(&self) -> &str {
        &self.wildcard
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    fn position(&self, handle: SpeciesHandle) -> Option<usize> {
        if handle < 1 {
            return None;
        }
        let idx = (handle - 1) as usize;
        (idx < self.species.len()).then_some(idx)
    }

    pub fn get(&self, handle: SpeciesHandle) -> Option<&Species> {
        self.position(handle).map(|idx| &self.species[idx])
    }

    pub fn get_mut(&mut self, handle: SpeciesHandle) -> Option<&mut Species> {
        self.position(handle).map(move |idx| &mut self.species[idx])
    }

    fn require_mut(&mut self, handle: SpeciesHandle) -> HcoResult<&mut Species> {
        self.get_mut(handle)
            .ok_or_else(|| HcoError::not_found("species", handle))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Species> {
        self.species.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Species> {
        self.species.iter_mut()
    }

    /// Name a species.
    ///
    /// Non-empty names must be unique across the registry and differ from the
    /// wildcard token. Renaming a species to its current name is allowed.
    pub fn define(&mut self, handle: SpeciesHandle, name: &str) -> HcoResult<()> {
        let name = name.trim();
        if name == self.wildcard {
            return Err(HcoError::configuration(format!(
                "species {} cannot be named after the wildcard token '{}'",
                handle, name
            )));
        }
        if !name.is_empty() {
            if let Some(other) = self
                .species
                .iter()
                .find(|s| s.name == name && s.handle != handle)
            {
                return Err(HcoError::configuration(format!(
                    "species name '{}' is already used by species {}",
                    name, other.handle
                )));
            }
        }
        self.require_mut(handle)?.name = name.to_string();
        Ok(())
    }

    /// Record the host model's handle for a species
    pub fn set_model_id(
        &mut self,
        handle: SpeciesHandle,
        model_id: SpeciesHandle,
    ) -> HcoResult<()> {
        self.require_mut(handle)?.model_id = model_id;
        Ok(())
    }

    /// Find a species by name.
    ///
    /// Surrounding whitespace is ignored; matching is case sensitive. Unnamed
    /// species never match.
    pub fn find(&self, name: &str) -> Option<&Species> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        self.species.iter().find(|s| s.name == name)
    }

    /// Position (1..N) of the named species.
    ///
    /// Returns [`WILDCARD_SPECIES`] for the wildcard token and
    /// [`SPECIES_NOT_FOUND`] when nothing matches.
    pub fn hemco_index(&self, name: &str) -> SpeciesHandle {
        if name.trim() == self.wildcard {
            return WILDCARD_SPECIES;
        }
        self.find(name)
            .map(|s| s.handle)
            .unwrap_or(SPECIES_NOT_FOUND)
    }

    /// Host model handle of the named species.
    ///
    /// Same lookup rules as [`hemco_index`](Self::hemco_index). A matching
    /// species whose model id was never assigned yields -1.
    pub fn model_index(&self, name: &str) -> SpeciesHandle {
        if name.trim() == self.wildcard {
            return WILDCARD_SPECIES;
        }
        self.find(name)
            .map(|s| s.model_id)
            .unwrap_or(SPECIES_NOT_FOUND)
    }

    /// Release the data buffers of every species
    pub fn release_buffers(&mut self) {
        self.species.iter_mut().for_each(Species::release_buffers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use ndarray::Array3;

    fn registry() -> SpeciesRegistry {
        let mut registry = SpeciesRegistry::with_count(3).unwrap();
        for (handle, name) in [(1, "O3"), (2, "NO"), (3, "NO2")] {
            registry.define(handle, name).unwrap();
            registry.set_model_id(handle, handle + 9).unwrap();
        }
        registry
    }

    #[test]
    fn test_handles_are_dense() {
        let registry = SpeciesRegistry::with_count(4).unwrap();
        let handles: Vec<_> = registry.iter().map(|s| s.handle()).collect();
        assert_eq!(handles, vec![1, 2, 3, 4]);
        assert!(registry.iter().all(|s| s.model_id == SPECIES_NOT_FOUND));
        assert!(registry.iter().all(|s| !s.has_data()));
        assert!(registry.get(0).is_none());
        assert!(registry.get(5).is_none());
    }

    #[test]
    fn test_too_many_species() {
        let err = SpeciesRegistry::with_count(usize::MAX).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Allocation);
    }

    #[test]
    fn test_lookup_by_name() {
        let registry = registry();
        assert_eq!(registry.hemco_index("NO2"), 3);
        assert_eq!(registry.model_index("NO2"), 12);
        assert_eq!(registry.hemco_index("  NO "), 2);
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let registry = registry();
        assert_eq!(registry.hemco_index("no2"), SPECIES_NOT_FOUND);
    }

    #[test]
    fn test_wildcard_and_missing() {
        let registry = registry();
        assert_eq!(registry.model_index("*"), WILDCARD_SPECIES);
        assert_eq!(registry.hemco_index("*"), WILDCARD_SPECIES);
        assert_eq!(registry.model_index(""), SPECIES_NOT_FOUND);
        assert_eq!(registry.model_index("CO"), SPECIES_NOT_FOUND);

        let empty = SpeciesRegistry::default();
        assert_eq!(empty.model_index("*"), WILDCARD_SPECIES);
    }

    #[test]
    fn test_wildcard_is_not_a_species_name() {
        let mut registry = registry();
        let err = registry.define(1, " * ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(registry.get(1).unwrap().name(), "O3");
        assert_eq!(registry.hemco_index("O3"), 1);

        let mut registry = SpeciesRegistry::with_count(2)
            .unwrap()
            .with_wildcard("ALL")
            .unwrap();
        registry.define(1, "*").unwrap();
        assert_eq!(registry.hemco_index("*"), 1);
        assert_eq!(registry.hemco_index("ALL"), WILDCARD_SPECIES);
        assert!(registry.define(2, "ALL").is_err());

        let err = registry.clone().with_wildcard("*").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(registry.with_wildcard("").is_err());
    }

    #[test]
    fn test_unnamed_species_do_not_match_empty_name() {
        let registry = SpeciesRegistry::with_count(2).unwrap();
        assert_eq!(registry.hemco_index(""), SPECIES_NOT_FOUND);
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut registry = registry();
        let err = registry.define(1, "NO").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        // Same name on the same species is fine
        registry.define(2, "NO").unwrap();
        assert_eq!(registry.get(1).unwrap().name(), "O3");
    }

    #[test]
    fn test_define_unknown_handle() {
        let mut registry = registry();
        let err = registry.define(4, "CO").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = registry.set_model_id(0, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_release_buffers() {
        let mut registry = registry();
        registry.get_mut(2).unwrap().emissions.bind_owned(Array3::zeros((2, 2, 1)));
        assert!(registry.get(2).unwrap().has_data());

        registry.release_buffers();
        assert!(registry.iter().all(|s| !s.has_data()));
        // Metadata is kept
        assert_eq!(registry.get(2).unwrap().name(), "NO");
    }
}
