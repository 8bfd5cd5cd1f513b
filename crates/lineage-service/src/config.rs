//! Service configuration
//!
//! Built in code through `with_*` methods or loaded from TOML; every field
//! has a default so partial files are accepted.

use crate::error::ServiceError;
use lineage_cache::{DEFAULT_ANCESTOR_DEPTH, DEFAULT_MAX_CAPACITY};
use lineage_graph::{DEFAULT_MAX_ROLE_LEN, DEFAULT_TRAVERSAL_CEILING};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Lineage service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineageConfig {
    /// Absolute hop limit for every traversal
    pub traversal_ceiling: u32,
    /// Maximum edge role length, in characters
    pub max_role_len: usize,
    /// Write retry policy
    pub retry: RetryPolicy,
    /// Closure cache settings
    pub cache: CacheConfig,
}

impl LineageConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With traversal ceiling
    #[inline]
    #[must_use]
    pub fn with_traversal_ceiling(mut self, ceiling: u32) -> Self {
        self.traversal_ceiling = ceiling;
        self
    }

    /// With maximum role length
    #[inline]
    #[must_use]
    pub fn with_max_role_len(mut self, len: usize) -> Self {
        self.max_role_len = len;
        self
    }

    /// With retry policy
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// With cache settings
    #[inline]
    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// `Config` if the text is not valid TOML or fails validation.
    pub fn from_toml_str(text: &str) -> Result<Self, ServiceError> {
        let config: Self = toml::from_str(text).map_err(|e| ServiceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// `Config` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `Config` naming the first offending field.
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.traversal_ceiling == 0 {
            return Err(ServiceError::Config("traversal_ceiling must be positive".into()));
        }
        if self.max_role_len == 0 {
            return Err(ServiceError::Config("max_role_len must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ServiceError::Config("retry.max_attempts must be positive".into()));
        }
        if self.cache.ancestor_depth == 0 {
            return Err(ServiceError::Config("cache.ancestor_depth must be positive".into()));
        }
        if self.cache.ancestor_depth > self.traversal_ceiling {
            return Err(ServiceError::Config(
                "cache.ancestor_depth exceeds traversal_ceiling".into(),
            ));
        }
        Ok(())
    }
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            traversal_ceiling: DEFAULT_TRAVERSAL_CEILING,
            max_role_len: DEFAULT_MAX_ROLE_LEN,
            retry: RetryPolicy::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Retry policy for transient commit failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Backoff per failed attempt, grows linearly
    pub backoff_ms: u64,
}

impl RetryPolicy {
    /// Policy with `max_attempts` attempts and no backoff
    #[inline]
    #[must_use]
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_ms: 0,
        }
    }

    /// Delay before attempt number `attempt + 1`
    #[inline]
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 2,
        }
    }
}

/// Closure cache settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached source types
    pub max_capacity: u64,
    /// Ancestor search depth, in hops
    pub ancestor_depth: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: DEFAULT_MAX_CAPACITY,
            ancestor_depth: DEFAULT_ANCESTOR_DEPTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = LineageConfig::from_toml_str(
            r"
            traversal_ceiling = 40

            [retry]
            max_attempts = 3
            ",
        )
        .unwrap();
        assert_eq!(config.traversal_ceiling, 40);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff_ms, 2);
        assert_eq!(config.cache, CacheConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(LineageConfig::from_toml_str("traversal_ceiling = 0").is_err());
        assert!(LineageConfig::from_toml_str("traversal_ceiling = 10").is_err());
        assert!(LineageConfig::from_toml_str("traversal_ceiling = [").is_err());

        let no_depth = LineageConfig::default().with_cache(CacheConfig {
            ancestor_depth: 0,
            ..CacheConfig::default()
        });
        assert_eq!(
            no_depth.validate(),
            Err(ServiceError::Config("cache.ancestor_depth must be positive".into()))
        );
        assert!(LineageConfig::from_toml_str("[cache]\nancestor_depth = 0").is_err());
    }

    #[test]
    fn backoff_grows_linearly() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff_ms: 5,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(5));
        assert_eq!(policy.backoff(3), Duration::from_millis(15));
        assert_eq!(RetryPolicy::attempts(2).backoff(1), Duration::ZERO);
    }
}
