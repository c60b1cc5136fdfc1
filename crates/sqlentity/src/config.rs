//! Runtime configuration for the facade.

use std::time::Duration;

/// Behaviour knobs shared by every model of an [`Orm`](crate::Orm).
#[derive(Debug, Clone)]
pub struct OrmConfig {
    /// Statements slower than this are logged at `warn`.
    pub slow_query_threshold: Duration,
    /// Maximum nesting depth for relationship includes.
    pub max_include_depth: usize,
    /// Log bound parameter values at `trace` level.
    pub log_parameters: bool,
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold: Duration::from_millis(500),
            max_include_depth: 8,
            log_parameters: false,
        }
    }
}

impl OrmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    #[must_use]
    pub fn max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    #[must_use]
    pub fn log_parameters(mut self, enabled: bool) -> Self {
        self.log_parameters = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrmConfig::default();
        assert_eq!(config.slow_query_threshold, Duration::from_millis(500));
        assert_eq!(config.max_include_depth, 8);
        assert!(!config.log_parameters);
    }

    #[test]
    fn test_builder_overrides() {
        let config = OrmConfig::new()
            .slow_query_threshold(Duration::from_secs(2))
            .max_include_depth(3)
            .log_parameters(true);
        assert_eq!(config.slow_query_threshold, Duration::from_secs(2));
        assert_eq!(config.max_include_depth, 3);
        assert!(config.log_parameters);
    }
}
