//! Gateway configuration.
//!
//! Deserialized from YAML; every section has workable defaults so an empty
//! document is a valid configuration.

use std::str::FromStr;

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use url::Url;

use crate::error::ConfigurationError;

/// The gateway's static configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct Configuration {
    /// The backend services this gateway aggregates.
    pub backends: Vec<BackendConfig>,

    /// Pagination behavior for list fields.
    pub pagination: PaginationConfig,
}

impl Configuration {
    /// Look up a backend by its service name.
    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|backend| backend.name == name)
    }

    fn validate(self) -> Result<Self, ConfigurationError> {
        let mut seen = std::collections::HashSet::new();
        for backend in &self.backends {
            if !seen.insert(backend.name.as_str()) {
                return Err(ConfigurationError::DuplicateBackend {
                    name: backend.name.clone(),
                });
            }
        }
        Ok(self)
    }
}

impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let configuration: Configuration = serde_yaml::from_str(s)?;
        configuration.validate()
    }
}

/// One aggregated backend service.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Service name, used in error attribution and logs.
    pub name: String,

    /// Base URL; endpoint paths are joined onto it.
    pub url: Url,

    /// Total-count reporting: whether this backend honors the total count
    /// request flag. Backends that never report counts fall back to the
    /// full-page heuristic for `hasNextPage`.
    #[serde(default = "default_true")]
    pub reports_total_count: bool,
}

/// Pagination behavior for list fields.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct PaginationConfig {
    /// Page size applied when a list field is queried without `first` or
    /// `size`.
    pub default_page_size: u64,

    /// Page size used when draining an entire collection page by page.
    pub all_pages_size: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: 25,
            all_pages_size: 100,
        }
    }
}

fn default_true() -> bool {
    true
}
