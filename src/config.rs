//! Registry configuration

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Window capacity used when none is configured
pub const DEFAULT_SAMPLING_SIZE: usize = 128;

/// Configuration applied to every metric created through a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegistryConfig {
    /// Number of recent measures kept per metric
    pub sampling_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sampling_size: DEFAULT_SAMPLING_SIZE,
        }
    }
}

impl RegistryConfig {
    /// Configuration with a custom window capacity
    pub fn with_sampling_size(sampling_size: usize) -> Self {
        Self { sampling_size }
    }
}
