//! Physical constants, aerosol microphysics and time steps.

use serde::{Deserialize, Serialize};

/// Physical constants shared by all extensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysConstants {
    /// Avogadro's number
    /// unit: 1 / mol
    pub avogadro: f64,
    /// Mean Earth radius
    /// unit: m
    pub earth_radius: f64,
    /// Molecular weight of dry air
    /// unit: g / mol
    pub air_mw: f64,
    /// Gravitational acceleration
    /// unit: m / s^2
    pub g0: f64,
    /// Gas constant of dry air
    /// unit: J / K / kg
    pub rd: f64,
    /// Universal gas constant
    /// unit: J / K / mol
    pub rstarg: f64,
}

impl Default for PhysConstants {
    fn default() -> Self {
        Self {
            avogadro: 6.022e23,
            earth_radius: 6.375e6,
            air_mw: 28.97,
            g0: 9.80665,
            rd: 287.0,
            rstarg: 8.31450,
        }
    }
}

impl PhysConstants {
    /// Rd / g0
    pub fn rd_over_g0(&self) -> f64 {
        self.rd / self.g0
    }

    pub fn pi_180(&self) -> f64 {
        std::f64::consts::PI / 180.0
    }
}

/// Size-resolved aerosol settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MicroPhysics {
    /// Number of active mode bins
    pub n_active_mode_bins: usize,
    /// Bin boundaries, empty until set by the host
    pub bin_bound: Vec<f64>,
}

impl MicroPhysics {
    pub fn new(n_active_mode_bins: usize) -> Self {
        Self {
            n_active_mode_bins,
            bin_bound: vec![],
        }
    }

    pub fn release(&mut self) {
        self.bin_bound = vec![];
    }
}

/// Time steps in seconds, set by the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSteps {
    pub emission: f64,
    pub chemistry: f64,
    pub dynamics: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    #[test]
    fn test_derived_constants() {
        let phys = PhysConstants::default();
        assert!(is_close!(phys.rd_over_g0(), 287.0 / 9.80665));
        assert!(is_close!(phys.pi_180() * 180.0, std::f64::consts::PI));
    }

    #[test]
    fn test_time_steps_start_at_zero() {
        let ts = TimeSteps::default();
        assert_eq!(ts.emission, 0.0);
        assert_eq!(ts.chemistry, 0.0);
        assert_eq!(ts.dynamics, 0.0);
    }
}
