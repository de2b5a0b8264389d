//! Runtime switches resolved once from the configuration.
//!
//! Each switch is looked up under the core extension handle. When the
//! configuration does not define it, the documented default applies.

use crate::config::{ConfigService, CORE_EXTENSION};
use crate::errors::HcoResult;
use log::debug;
use serde::{Deserialize, Serialize};

pub const OPT_NEGATIVE_VALUES: &str = "Negative values";
pub const OPT_PBL_DRYDEP: &str = "PBL dry deposition";
pub const OPT_SCALE_EMISSIONS: &str = "Scale emissions";
pub const OPT_CAP_TIME_SHIFT: &str = "Cap time shift";
pub const OPT_MAX_DEP_EXPONENT: &str = "Maximum dep exponent";
pub const OPT_MASK_FRACTIONS: &str = "Mask fractions";
pub const OPT_FIELD_TO_DIAGNOSTICS: &str = "ConfigField to diagnostics";
pub const OPT_VERTICAL_WEIGHTS: &str = "Vertical weights";

/// How negative emission values are handled
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegativeValuePolicy(pub i64);

impl NegativeValuePolicy {
    /// No special handling
    pub const KEEP: NegativeValuePolicy = NegativeValuePolicy(0);
}

impl Default for NegativeValuePolicy {
    fn default() -> Self {
        NegativeValuePolicy::KEEP
    }
}

/// Switches of the runtime state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Options {
    /// Treatment of negative values.
    ///
    /// Default: 0 (no special handling)
    pub negative_values: NegativeValuePolicy,

    /// Apply dry deposition throughout the planetary boundary layer.
    ///
    /// Default: false
    pub pbl_drydep: bool,

    /// Apply uniform scale factors to emissions.
    ///
    /// Default: true
    pub scale_emissions: bool,

    /// Cap time shifts so they never cross whole fields.
    ///
    /// Default: false
    pub cap_time_shift: bool,

    /// Upper limit of the exponent argument used in deposition calculations.
    ///
    /// Default: 20.0
    pub max_dep_exponent: f64,

    /// Interpret mask values as fractions rather than binary flags.
    ///
    /// Default: false
    pub mask_fractions: bool,

    /// Promote configuration fields to diagnostics.
    ///
    /// Default: false
    pub field_to_diagnostics: bool,

    /// Apply vertical weighting when distributing emissions.
    ///
    /// Default: true
    pub vertical_weights: bool,

    /// Set by the host for dry runs; never read from the configuration.
    ///
    /// Default: false
    pub is_dry_run: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            negative_values: NegativeValuePolicy::KEEP,
            pbl_drydep: false,
            scale_emissions: true,
            cap_time_shift: false,
            max_dep_exponent: 20.0,
            mask_fractions: false,
            field_to_diagnostics: false,
            vertical_weights: true,
            is_dry_run: false,
        }
    }
}

fn or_default<T: std::fmt::Debug>(value: Option<T>, name: &str, default: T) -> T {
    match value {
        Some(v) => v,
        None => {
            debug!("Option '{}' not set, using default {:?}", name, default);
            default
        }
    }
}

impl Options {
    /// Resolve every switch from the configuration, falling back to defaults.
    ///
    /// Options of the wrong type are configuration errors rather than being
    /// silently replaced by the default.
    pub fn resolve(config: &dyn ConfigService) -> HcoResult<Self> {
        let defaults = Options::default();
        let ext = CORE_EXTENSION;

        Ok(Self {
            negative_values: NegativeValuePolicy(or_default(
                config.get_int(ext, OPT_NEGATIVE_VALUES)?,
                OPT_NEGATIVE_VALUES,
                defaults.negative_values.0,
            )),
            pbl_drydep: or_default(
                config.get_bool(ext, OPT_PBL_DRYDEP)?,
                OPT_PBL_DRYDEP,
                defaults.pbl_drydep,
            ),
            scale_emissions: or_default(
                config.get_bool(ext, OPT_SCALE_EMISSIONS)?,
                OPT_SCALE_EMISSIONS,
                defaults.scale_emissions,
            ),
            cap_time_shift: or_default(
                config.get_bool(ext, OPT_CAP_TIME_SHIFT)?,
                OPT_CAP_TIME_SHIFT,
                defaults.cap_time_shift,
            ),
            max_dep_exponent: or_default(
                config.get_real(ext, OPT_MAX_DEP_EXPONENT)?,
                OPT_MAX_DEP_EXPONENT,
                defaults.max_dep_exponent,
            ),
            mask_fractions: or_default(
                config.get_bool(ext, OPT_MASK_FRACTIONS)?,
                OPT_MASK_FRACTIONS,
                defaults.mask_fractions,
            ),
            field_to_diagnostics: or_default(
                config.get_bool(ext, OPT_FIELD_TO_DIAGNOSTICS)?,
                OPT_FIELD_TO_DIAGNOSTICS,
                defaults.field_to_diagnostics,
            ),
            vertical_weights: or_default(
                config.get_bool(ext, OPT_VERTICAL_WEIGHTS)?,
                OPT_VERTICAL_WEIGHTS,
                defaults.vertical_weights,
            ),
            is_dry_run: defaults.is_dry_run,
        })
    }
}
