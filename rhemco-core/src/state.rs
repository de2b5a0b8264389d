//! Runtime state of a simulation domain.
//!
//! The runtime state aggregates everything the extensions of one domain share:
//! species, grid, physical constants, switches, time steps and the extension
//! instance registry. It also holds references to objects owned by the host
//! (configuration, diagnostics, read list) without taking ownership of them.
//!
//! # Lifecycle
//!
//! A state is created [`Uninitialized`](Lifecycle::Uninitialized) by a
//! [`StateBuilder`], moved to [`Initialized`](Lifecycle::Initialized) by
//! [`RuntimeState::init`] and to [`Finalized`](Lifecycle::Finalized) by
//! [`RuntimeState::finalize`]. A finalized state cannot be initialized again.
//!
//! ```
//! use rhemco_core::config::ExtensionConfig;
//! use rhemco_core::state::{InitStatus, Lifecycle, RuntimeState};
//! use std::sync::Arc;
//!
//! let config = Arc::new(ExtensionConfig::from_toml_str("").unwrap());
//! let mut state = RuntimeState::new();
//!
//! assert_eq!(state.init(3, config).unwrap(), InitStatus::Initialized);
//! assert_eq!(state.species().len(), 3);
//!
//! state.finalize();
//! assert_eq!(state.lifecycle(), Lifecycle::Finalized);
//! ```

use crate::config::{ConfigService, ExtensionHandle};
use crate::errors::{HcoError, HcoResult, ResultExt};
use crate::grid::Grid;
use crate::instance::InstanceRegistry;
use crate::options::Options;
use crate::physics::{MicroPhysics, PhysConstants, TimeSteps};
use crate::species::{SpeciesHandle, SpeciesRegistry, SPECIES_NOT_FOUND};
use crate::utils::split_list;
use log::{info, warn};
use std::sync::Arc;

/// Diagnostics container owned by the host.
///
/// The runtime state stores a reference to it but never looks inside.
pub trait DiagnosticsBundle: std::fmt::Debug + Send + Sync {}

/// Schedule of input fields to read, owned by the host.
pub trait ReadList: std::fmt::Debug + Send + Sync {}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initialized,
    Finalized,
}

/// Outcome of [`RuntimeState::init`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InitStatus {
    Initialized,
    /// The state was already initialized and has not been changed
    AlreadyInitialized,
}

/// Optional parts of a runtime state, chosen at construction time
#[derive(Debug, Clone, PartialEq)]
pub struct Capabilities {
    /// Whether a diagnostics bundle may be attached
    pub diagnostics: bool,
    /// Run in adjoint mode
    pub adjoint: bool,
    /// Name of the host grid component, for hosts that have one
    pub host_grid_component: Option<String>,
    /// Number of active aerosol mode bins; `None` for no microphysics block
    pub microphysics_bins: Option<usize>,
    /// Whether this domain is the root domain
    pub is_root: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            diagnostics: true,
            adjoint: false,
            host_grid_component: None,
            microphysics_bins: None,
            is_root: false,
        }
    }
}

/// Build an uninitialized [`RuntimeState`] with the selected capabilities.
#[derive(Debug, Clone, Default)]
pub struct StateBuilder {
    capabilities: Capabilities,
}

impl StateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_diagnostics(&mut self, enabled: bool) -> &mut Self {
        self.capabilities.diagnostics = enabled;
        self
    }

    pub fn with_adjoint(&mut self, enabled: bool) -> &mut Self {
        self.capabilities.adjoint = enabled;
        self
    }

    pub fn with_host_grid_component(&mut self, name: &str) -> &mut Self {
        self.capabilities.host_grid_component = Some(name.to_string());
        self
    }

    /// Carry a microphysics block with `n_bins` active mode bins
    pub fn with_microphysics(&mut self, n_bins: usize) -> &mut Self {
        self.capabilities.microphysics_bins = Some(n_bins);
        self
    }

    pub fn as_root(&mut self, is_root: bool) -> &mut Self {
        self.capabilities.is_root = is_root;
        self
    }

    pub fn build(&self) -> RuntimeState {
        RuntimeState::with_capabilities(self.capabilities.clone())
    }
}

/// Species resolved for an extension.
///
/// `handles` and `names` are parallel. Species that could not be resolved keep
/// their name and carry [`SPECIES_NOT_FOUND`] as handle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtensionSpecies {
    pub handles: Vec<SpeciesHandle>,
    pub names: Vec<String>,
}

impl ExtensionSpecies {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SpeciesHandle, &str)> {
        self.handles
            .iter()
            .copied()
            .zip(self.names.iter().map(String::as_str))
    }

    /// Names that did not resolve to a species
    pub fn unresolved(&self) -> Vec<&str> {
        self.iter()
            .filter(|(handle, _)| *handle == SPECIES_NOT_FOUND)
            .map(|(_, name)| name)
            .collect()
    }
}

/// Shared state of one simulation domain
#[derive(Debug)]
pub struct RuntimeState {
    lifecycle: Lifecycle,
    capabilities: Capabilities,
    species: SpeciesRegistry,
    grid: Option<Grid>,
    phys: Option<PhysConstants>,
    options: Option<Options>,
    microphysics: Option<MicroPhysics>,
    time_steps: TimeSteps,
    instances: InstanceRegistry,
    config: Option<Arc<dyn ConfigService>>,
    diagnostics: Option<Arc<dyn DiagnosticsBundle>>,
    read_list: Option<Arc<dyn ReadList>>,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

fn not_initialized(what: &str) -> HcoError {
    HcoError::configuration(format!("{} is not available before StateInit", what))
}

impl RuntimeState {
    /// Create an uninitialized state with default capabilities
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::default())
    }

    pub fn builder() -> StateBuilder {
        StateBuilder::new()
    }

    fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            lifecycle: Lifecycle::Uninitialized,
            capabilities,
            species: SpeciesRegistry::default(),
            grid: None,
            phys: None,
            options: None,
            microphysics: None,
            time_steps: TimeSteps::default(),
            instances: InstanceRegistry::new(),
            config: None,
            diagnostics: None,
            read_list: None,
        }
    }

    /// Initialize the state for `n_species` species.
    ///
    /// The configuration must have been parsed at least once. Species are
    /// created without names, the grid without dimensions, and the switches
    /// are resolved from the configuration. The configuration is attached,
    /// not copied.
    ///
    /// Calling this on an initialized state changes nothing and reports
    /// [`InitStatus::AlreadyInitialized`].
    pub fn init(
        &mut self,
        n_species: usize,
        config: Arc<dyn ConfigService>,
    ) -> HcoResult<InitStatus> {
        match self.lifecycle {
            Lifecycle::Initialized => {
                warn!("Runtime state is already initialized; ignoring repeated StateInit");
                return Ok(InitStatus::AlreadyInitialized);
            }
            Lifecycle::Finalized => {
                return Err(HcoError::configuration(
                    "runtime state has been finalized; create a new state instead",
                ))
                .context("StateInit");
            }
            Lifecycle::Uninitialized => {}
        }

        if !config.is_ready() {
            return Err(HcoError::configuration(
                "configuration has not been read yet",
            ))
            .context("StateInit");
        }

        // Everything is built before being stored so that a failure leaves
        // the state untouched.
        let species = SpeciesRegistry::with_count(n_species)
            .and_then(|species| species.with_wildcard(config.wildcard()))
            .context("StateInit")?;
        let options = Options::resolve(config.as_ref()).context("StateInit")?;
        let microphysics = self.capabilities.microphysics_bins.map(MicroPhysics::new);

        self.species = species;
        self.grid = Some(Grid::new());
        self.phys = Some(PhysConstants::default());
        self.options = Some(options);
        self.microphysics = microphysics;
        self.time_steps = TimeSteps::default();
        self.config = Some(config);
        self.lifecycle = Lifecycle::Initialized;

        info!("Runtime state initialized with {} species", n_species);
        Ok(InitStatus::Initialized)
    }

    /// Release everything the state owns and detach host-owned references.
    ///
    /// Species buffers are released before the species themselves and grid
    /// buffers before the grid. Safe to call on a state in any lifecycle
    /// stage, any number of times.
    pub fn finalize(&mut self) {
        if self.lifecycle == Lifecycle::Finalized {
            return;
        }

        self.species.release_buffers();
        self.species = SpeciesRegistry::default();

        if let Some(grid) = self.grid.as_mut() {
            grid.release_buffers();
        }
        self.grid = None;

        if let Some(microphysics) = self.microphysics.as_mut() {
            microphysics.release();
        }
        self.microphysics = None;
        self.options = None;
        self.phys = None;

        if !self.instances.is_empty() {
            warn!(
                "Finalizing runtime state with {} extension instance(s) still registered",
                self.instances.len()
            );
            self.instances.clear();
        }

        self.config = None;
        self.diagnostics = None;
        self.read_list = None;
        self.lifecycle = Lifecycle::Finalized;
        info!("Runtime state finalized");
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_initialized(&self) -> bool {
        self.lifecycle == Lifecycle::Initialized
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn is_adjoint(&self) -> bool {
        self.capabilities.adjoint
    }

    pub fn is_root(&self) -> bool {
        self.capabilities.is_root
    }

    pub fn host_grid_component(&self) -> Option<&str> {
        self.capabilities.host_grid_component.as_deref()
    }

    pub fn species(&self) -> &SpeciesRegistry {
        &self.species
    }

    pub fn species_mut(&mut self) -> &mut SpeciesRegistry {
        &mut self.species
    }

    pub fn grid(&self) -> HcoResult<&Grid> {
        self.grid.as_ref().ok_or_else(|| not_initialized("grid"))
    }

    pub fn grid_mut(&mut self) -> HcoResult<&mut Grid> {
        self.grid.as_mut().ok_or_else(|| not_initialized("grid"))
    }

    pub fn phys(&self) -> HcoResult<&PhysConstants> {
        self.phys
            .as_ref()
            .ok_or_else(|| not_initialized("physical constants"))
    }

    pub fn options(&self) -> HcoResult<&Options> {
        self.options.as_ref().ok_or_else(|| not_initialized("options"))
    }

    pub fn options_mut(&mut self) -> HcoResult<&mut Options> {
        self.options.as_mut().ok_or_else(|| not_initialized("options"))
    }

    /// Present only if the state was built with microphysics
    pub fn microphysics(&self) -> Option<&MicroPhysics> {
        self.microphysics.as_ref()
    }

    pub fn microphysics_mut(&mut self) -> Option<&mut MicroPhysics> {
        self.microphysics.as_mut()
    }

    pub fn time_steps(&self) -> &TimeSteps {
        &self.time_steps
    }

    pub fn time_steps_mut(&mut self) -> &mut TimeSteps {
        &mut self.time_steps
    }

    pub fn instances(&self) -> &InstanceRegistry {
        &self.instances
    }

    pub fn instances_mut(&mut self) -> &mut InstanceRegistry {
        &mut self.instances
    }

    pub fn config(&self) -> HcoResult<&dyn ConfigService> {
        self.config
            .as_deref()
            .ok_or_else(|| not_initialized("configuration"))
    }

    /// Attach the host's diagnostics bundle.
    ///
    /// Requires a state built with diagnostics enabled.
    pub fn attach_diagnostics(&mut self, diagnostics: Arc<dyn DiagnosticsBundle>) -> HcoResult<()> {
        if !self.capabilities.diagnostics {
            return Err(HcoError::configuration(
                "runtime state was built without diagnostics",
            ));
        }
        self.diagnostics = Some(diagnostics);
        Ok(())
    }

    pub fn diagnostics(&self) -> Option<&Arc<dyn DiagnosticsBundle>> {
        self.diagnostics.as_ref()
    }

    pub fn detach_diagnostics(&mut self) {
        self.diagnostics = None;
    }

    pub fn attach_read_list(&mut self, read_list: Arc<dyn ReadList>) {
        self.read_list = Some(read_list);
    }

    pub fn read_list(&self) -> Option<&Arc<dyn ReadList>> {
        self.read_list.as_ref()
    }

    pub fn detach_read_list(&mut self) {
        self.read_list = None;
    }

    /// Wildcard token taken from the configuration at StateInit
    pub fn wildcard(&self) -> &str {
        self.species.wildcard()
    }

    /// Host model handle of a species.
    ///
    /// Returns 0 for the wildcard token and -1 if no species matches.
    pub fn resolve_model_species_index(&self, name: &str) -> SpeciesHandle {
        self.species.model_index(name)
    }

    /// Position (1..N) of a species.
    ///
    /// Returns 0 for the wildcard token and -1 if no species matches.
    pub fn resolve_hemco_species_index(&self, name: &str) -> SpeciesHandle {
        self.species.hemco_index(name)
    }

    /// Resolve the species list registered to an extension.
    ///
    /// Species that do not exist are kept with a handle of -1; callers must
    /// check for it before use.
    pub fn resolve_extension_species(
        &self,
        extension: ExtensionHandle,
    ) -> HcoResult<ExtensionSpecies> {
        let config = self.config().context("ResolveExtensionSpecies")?;
        let list = config
            .extension_species(extension)
            .context("ResolveExtensionSpecies")?;
        let names = split_list(&list, config.separator()).context("ResolveExtensionSpecies")?;

        let handles: Vec<SpeciesHandle> = names
            .iter()
            .map(|name| self.resolve_hemco_species_index(name))
            .collect();

        let species = ExtensionSpecies { handles, names };
        for name in species.unresolved() {
            warn!(
                "Species '{}' of extension {} is not a known species",
                name, extension
            );
        }
        Ok(species)
    }
}
