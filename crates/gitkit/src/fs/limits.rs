//! Per-object size ceiling for stores with bounded value columns.
//!
//! The persistent store keeps each file in one text column whose values are
//! capped by the storage substrate. Content is base64 encoded before it is
//! stored, which inflates it by 4/3, so the ceiling is checked against the
//! encoded size and sits below the column cap.

use std::fmt;

/// Value cap of a single text column in the persistent substrate: 2 MiB.
pub const STORAGE_FIELD_LIMIT: u64 = 2_097_152;

/// Default maximum encoded object size: 1.8MB
pub const DEFAULT_MAX_OBJECT_SIZE: u64 = 1_800_000;

/// Store limits.
///
/// # Example
///
/// ```rust
/// use gitkit::StoreLimits;
///
/// let limits = StoreLimits::new().max_object_size(64 * 1024);
/// assert_eq!(limits.max_object_size, 65_536);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Maximum encoded size of a single file in bytes.
    /// Default: 1,800,000 bytes
    pub max_object_size: u64,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
        }
    }
}

impl StoreLimits {
    /// Create new limits with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create unlimited limits (no ceiling).
    pub fn unlimited() -> Self {
        Self {
            max_object_size: u64::MAX,
        }
    }

    /// Set the maximum encoded object size.
    ///
    /// Values above [`STORAGE_FIELD_LIMIT`] are clamped to it.
    pub fn max_object_size(mut self, bytes: u64) -> Self {
        self.max_object_size = bytes.min(STORAGE_FIELD_LIMIT);
        self
    }

    /// Check whether an encoded size fits.
    pub fn allows(&self, encoded_size: u64) -> bool {
        encoded_size <= self.max_object_size
    }
}

impl fmt::Display for StoreLimits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.max_object_size == u64::MAX {
            write!(f, "unlimited")
        } else {
            write!(f, "max object size {} bytes", self.max_object_size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_leaves_headroom_under_field_limit() {
        let limits = StoreLimits::default();
        assert!(limits.max_object_size < STORAGE_FIELD_LIMIT);
        assert!(limits.allows(DEFAULT_MAX_OBJECT_SIZE));
        assert!(!limits.allows(DEFAULT_MAX_OBJECT_SIZE + 1));
    }

    #[test]
    fn setter_clamps_to_field_limit() {
        let limits = StoreLimits::new().max_object_size(10 * STORAGE_FIELD_LIMIT);
        assert_eq!(limits.max_object_size, STORAGE_FIELD_LIMIT);
    }

    #[test]
    fn unlimited_allows_everything() {
        assert!(StoreLimits::unlimited().allows(u64::MAX));
        assert_eq!(StoreLimits::unlimited().to_string(), "unlimited");
    }
}
