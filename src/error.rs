//! Physics Error Types
//!
//! Unified error type for the physics core. Geometric degeneracy (zero-length
//! vectors, collapsed simplices) is *not* an error: those cases are recovered
//! locally with fallback axes or an invalid-result marker. `PhysicsError`
//! covers configuration-class failures that indicate programmer error and must
//! surface loudly at startup or on the offending call.

use core::fmt;

/// Unified error type for physics operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PhysicsError {
    /// No body with the given id exists in the world.
    UnknownBody {
        /// The id that was looked up
        id: String,
    },
    /// No collision algorithm is registered for a shape-kind pair.
    /// This is a missing registration, not a runtime data issue.
    UnsupportedShapePair {
        /// Kind of the first shape
        first: &'static str,
        /// Kind of the second shape
        second: &'static str,
    },
    /// A fixed-size pool ran out of slots; the pool must be sized via
    /// configuration for the scene, so exhaustion is fatal.
    PoolExhausted {
        /// What pool was exhausted
        resource: &'static str,
        /// The configured capacity
        capacity: usize,
    },
    /// Invalid configuration parameter.
    InvalidConfiguration {
        /// Description of the invalid configuration
        reason: &'static str,
    },
    /// A shape was constructed with non-positive or non-finite dimensions.
    InvalidShape {
        /// Description of the problem
        reason: &'static str,
    },
}

impl fmt::Display for PhysicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownBody { id } => write!(f, "unknown body '{id}'"),
            Self::UnsupportedShapePair { first, second } => {
                write!(f, "no collision algorithm registered for ({first}, {second})")
            }
            Self::PoolExhausted { resource, capacity } => {
                write!(f, "{resource} pool exhausted (capacity={capacity})")
            }
            Self::InvalidConfiguration { reason } => {
                write!(f, "invalid configuration: {reason}")
            }
            Self::InvalidShape { reason } => write!(f, "invalid shape: {reason}"),
        }
    }
}

impl std::error::Error for PhysicsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let e = PhysicsError::UnsupportedShapePair {
            first: "Sphere",
            second: "Heightfield",
        };
        assert!(e.to_string().contains("Sphere"));
        assert!(e.to_string().contains("Heightfield"));

        let e = PhysicsError::PoolExhausted {
            resource: "collision algorithm",
            capacity: 64,
        };
        assert!(e.to_string().contains("64"));
    }

    #[test]
    fn test_error_is_std_error() {
        fn assert_error<E: std::error::Error>(_e: &E) {}
        assert_error(&PhysicsError::InvalidConfiguration { reason: "x" });
    }
}
