//! Runtime core of an emissions component.
//!
//! Re-exports the runtime state and extension framework from `rhemco-core`
//! together with the extensions bundled in `rhemco-extensions`.

pub use rhemco_core::{
    buffer, config, errors, extension, grid, instance, options, physics, species, state, utils,
};
pub use rhemco_extensions::extensions;
