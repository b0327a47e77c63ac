//! Cache configuration.
//!
//! Controls paging defaults, event history and delete propagation via the
//! `[cache]` section of `folio.toml`.

use std::num::NonZeroU32;

use serde::Deserialize;

// Default values for cache configuration
pub(crate) const DEFAULT_PAGE_LIMIT: u32 = crate::domain::query::DEFAULT_LIMIT;
pub(crate) const DEFAULT_HISTORY_LIMIT: usize = 1024;
const DEFAULT_PRUNE_ON_DELETE: bool = false;

/// Cache configuration from `folio.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Page size used when a query does not ask for one.
    pub default_page_limit: u32,
    /// Maximum applied events kept for replay; zero disables the history.
    pub history_limit: usize,
    /// Remove deleted identities from every cached window immediately.
    pub prune_on_delete: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_page_limit: DEFAULT_PAGE_LIMIT,
            history_limit: DEFAULT_HISTORY_LIMIT,
            prune_on_delete: DEFAULT_PRUNE_ON_DELETE,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            default_page_limit: settings.default_page_limit.get(),
            history_limit: settings.history_limit,
            prune_on_delete: settings.prune_on_delete,
        }
    }
}

impl CacheConfig {
    /// Returns the page limit as NonZeroU32, clamping to 1 if zero.
    pub fn page_limit_non_zero(&self) -> NonZeroU32 {
        NonZeroU32::new(self.default_page_limit).unwrap_or(NonZeroU32::MIN)
    }

    pub fn history_enabled(&self) -> bool {
        self.history_limit > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.default_page_limit, 20);
        assert_eq!(config.history_limit, 1024);
        assert!(!config.prune_on_delete);
        assert!(config.history_enabled());
    }

    #[test]
    fn zero_history_disables_it() {
        let config = CacheConfig {
            history_limit: 0,
            ..Default::default()
        };
        assert!(!config.history_enabled());
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            default_page_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.page_limit_non_zero().get(), 1);
    }

    #[test]
    fn partial_section_keeps_defaults() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"prune_on_delete": true}"#).expect("config should parse");
        assert!(config.prune_on_delete);
        assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
    }
}
