//! Configuration for resource types, pagination, and resolution.
//!
//! Loaded from TOML:
//!
//! ```toml
//! [resource_types.document]
//! permissions = ["view", "edit", "delete"]
//! inheritable = true
//!
//! [pagination]
//! default_items_per_page = 50
//!
//! [resolution]
//! strict_resource_permissions = false
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::ResourceType;

/// Top-level Keystone configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeystoneConfig {
    /// Registered resource types, keyed by type tag.
    #[serde(default)]
    pub resource_types: BTreeMap<ResourceType, ResourceTypeConfig>,

    /// Pagination defaults.
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Resolution behavior.
    #[serde(default)]
    pub resolution: ResolutionConfig,
}

/// Per-type settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceTypeConfig {
    /// Every permission name defined for the type. Owners hold all of them.
    #[serde(default)]
    pub permissions: BTreeSet<String>,

    /// Whether grants on resources of this type flow to their descendants
    /// when a resolution call asks for inheritance.
    #[serde(default)]
    pub inheritable: bool,
}

impl ResourceTypeConfig {
    /// Creates a non-inheritable type with the given permission names.
    pub fn new<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            permissions: permissions.into_iter().map(Into::into).collect(),
            inheritable: false,
        }
    }

    /// Marks the type inheritable.
    pub fn inheritable(mut self) -> Self {
        self.inheritable = true;
        self
    }
}

/// Pagination defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Page size used when a caller does not pass one.
    #[serde(default = "default_items_per_page")]
    pub default_items_per_page: i64,
}

fn default_items_per_page() -> i64 {
    50
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_items_per_page: default_items_per_page(),
        }
    }
}

/// Resolution behavior.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Reject resource grants whose name is not defined for a registered type.
    #[serde(default)]
    pub strict_resource_permissions: bool,
}

impl KeystoneConfig {
    /// Parses and validates configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(e, path))?;
        let config = Self::from_toml_str(&content)?;
        log::debug!(
            "Loaded config from {} ({} resource types)",
            path.display(),
            config.resource_types.len()
        );
        Ok(config)
    }

    /// Checks the configuration for values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.pagination.default_items_per_page <= 0 {
            return Err(Error::config(
                "pagination.default_items_per_page must be positive",
            ));
        }
        for (resource_type, settings) in &self.resource_types {
            if resource_type.as_str().trim().is_empty() {
                return Err(Error::config("resource type names must not be empty"));
            }
            if settings.permissions.iter().any(|p| p.trim().is_empty()) {
                return Err(Error::config(format!(
                    "resource type '{resource_type}' declares an empty permission name"
                )));
            }
        }
        Ok(())
    }

    /// Registers a resource type, replacing any previous settings.
    pub fn with_resource_type(
        mut self,
        resource_type: impl Into<ResourceType>,
        settings: ResourceTypeConfig,
    ) -> Self {
        self.resource_types.insert(resource_type.into(), settings);
        self
    }

    /// Permission names defined for a type, if the type is registered.
    pub fn permissions_for(&self, resource_type: &ResourceType) -> Option<&BTreeSet<String>> {
        self.resource_types
            .get(resource_type)
            .map(|settings| &settings.permissions)
    }

    /// Whether grants on this type flow to descendants.
    pub fn is_inheritable(&self, resource_type: &ResourceType) -> bool {
        self.resource_types
            .get(resource_type)
            .is_some_and(|settings| settings.inheritable)
    }
}

// ============================================================================
// Tests
// ============================================================================
