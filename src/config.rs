//! Engine Configuration
//!
//! All numeric tuning knobs in one place, with the defaults the engine ships
//! with. Values are validated once at world construction: a bad knob is a
//! startup failure, never a silently wrong simulation.

use crate::error::PhysicsError;

/// Tuning knobs for the collision/integration pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhysicsConfig {
    /// Shape inner margin as a fraction of the smallest half-extent.
    /// The margin softens GJK/EPA numerics; clamping it keeps thin shapes
    /// from being swallowed by their own margin.
    pub maximum_margin_percentage: f32,
    /// Base inner margin applied to convex shapes before clamping (world units).
    pub collision_margin: f32,
    /// Distance beyond which a persisted contact point is dropped.
    pub contact_breaking_threshold: f32,

    /// GJK iteration cap before giving up on a pair for this step.
    pub gjk_max_iterations: u32,
    /// Relative termination tolerance (fraction of closest squared distance).
    pub gjk_relative_termination_tolerance: f32,
    /// Absolute termination floor.
    pub gjk_minimum_termination_tolerance: f32,
    /// Per-iteration growth of the absolute floor, loosening termination on
    /// hard pairs instead of spinning to the iteration cap.
    pub gjk_minimum_tolerance_growth: f32,

    /// EPA iteration cap.
    pub epa_max_iterations: u32,
    /// EPA stops when the polytope stops expanding by more than this.
    pub epa_termination_tolerance: f32,

    /// Upper bound on per-pair collision algorithm slots used in one step.
    /// The pool must be sized for the scene: a step whose broad phase reports
    /// more candidate pairs fails with `PhysicsError::PoolExhausted`.
    pub algorithm_pool_size: usize,

    /// Fat-AABB margin used by the broad-phase tree.
    pub broad_phase_fat_margin: f32,

    /// Bodies slower than these for `sleep_frames` consecutive steps sleep.
    pub sleep_linear_velocity_threshold: f32,
    /// Angular counterpart of the sleep threshold (rad/s).
    pub sleep_angular_velocity_threshold: f32,
    /// Consecutive low-energy steps before an island is put to sleep.
    pub sleep_frames: u32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            maximum_margin_percentage: 0.3,
            collision_margin: 0.04,
            contact_breaking_threshold: 0.02,
            gjk_max_iterations: 30,
            gjk_relative_termination_tolerance: 1.0e-3,
            gjk_minimum_termination_tolerance: 1.0e-6,
            gjk_minimum_tolerance_growth: 0.1,
            epa_max_iterations: 40,
            epa_termination_tolerance: 1.0e-4,
            algorithm_pool_size: 4096,
            broad_phase_fat_margin: 0.2,
            sleep_linear_velocity_threshold: 0.15,
            sleep_angular_velocity_threshold: 0.05,
            sleep_frames: 15,
        }
    }
}

impl PhysicsConfig {
    /// Validate the configuration. Called once by `PhysicsWorld::new`.
    pub fn validate(&self) -> Result<(), PhysicsError> {
        if !(0.0..=1.0).contains(&self.maximum_margin_percentage) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "maximum_margin_percentage must be in [0, 1]",
            });
        }
        if self.collision_margin < 0.0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "collision_margin must be >= 0",
            });
        }
        if self.contact_breaking_threshold <= 0.0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "contact_breaking_threshold must be > 0",
            });
        }
        if self.gjk_max_iterations == 0 || self.epa_max_iterations == 0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "iteration caps must be > 0",
            });
        }
        if self.algorithm_pool_size == 0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "algorithm_pool_size must be > 0",
            });
        }
        if self.broad_phase_fat_margin < 0.0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "broad_phase_fat_margin must be >= 0",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PhysicsConfig::default().validate().is_ok());
    }

    #[test]
    fn test_bad_margin_percentage_rejected() {
        let config = PhysicsConfig {
            maximum_margin_percentage: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_pool_rejected() {
        let config = PhysicsConfig {
            algorithm_pool_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
