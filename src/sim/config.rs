// Construction-time parameters for the solver

use serde::{Deserialize, Serialize};

use crate::sim::error::{Result, SimError};

/// Immutable parameters of a simulation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Number of cell columns
    pub width: usize,

    /// Number of cell rows
    pub height: usize,

    /// Fixed timestep of one tick
    pub dt: f32,

    /// Over-relaxation factor for the projection sweeps. Values above 1
    /// converge faster; values at or above 2 diverge.
    pub over_relaxation: f32,

    /// Number of projection sweeps per tick
    pub div_iter: usize,

    /// Upper end of the density range consumers should display. Not
    /// enforced by the solver.
    pub max_density: f32,

    /// Edge length of a cell in world units
    pub cell_size: f32,

    /// Velocity magnitude past which a tick is considered unstable
    pub max_velocity: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            width: 10,
            height: 10,
            dt: 0.005,
            over_relaxation: 1.9,
            div_iter: 100,
            max_density: 100.,
            cell_size: 1.,
            max_velocity: 1000.,
        }
    }
}

impl SimConfig {
    /// Config with default solver parameters for a `width` x `height` grid.
    pub fn with_size(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Check every parameter, returning the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(SimError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }

        let positive = [
            ("dt", self.dt),
            ("cell_size", self.cell_size),
            ("max_density", self.max_density),
            ("max_velocity", self.max_velocity),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0. {
                return Err(SimError::InvalidParameter { name, value });
            }
        }

        if !(self.over_relaxation > 0. && self.over_relaxation < 2.) {
            return Err(SimError::InvalidParameter {
                name: "over_relaxation",
                value: self.over_relaxation,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(SimConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_zero_dimension() {
        let config = SimConfig::with_size(0, 4);

        assert_eq!(
            config.validate(),
            Err(SimError::InvalidDimensions {
                width: 0,
                height: 4
            })
        );
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let config = SimConfig {
            dt: f32::NAN,
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SimError::InvalidParameter { name: "dt", .. })
        ));

        let config = SimConfig {
            over_relaxation: 2.,
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SimError::InvalidParameter {
                name: "over_relaxation",
                ..
            })
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SimConfig = serde_json::from_str(r#"{"width": 32, "div_iter": 40}"#).unwrap();

        assert_eq!(config.width, 32);
        assert_eq!(config.height, 10);
        assert_eq!(config.div_iter, 40);
        assert_eq!(config.over_relaxation, 1.9);
    }
}
