//! Resource Registry - load resource definitions from JSON or YAML
//!
//! A definitions file lists resources under a top-level `resources` key:
//!
//! ```yaml
//! resources:
//!   - id: volume
//!     url: /api/volume/:id
//!     paramDefaults: { id: "@id" }
//!     hotParams: [access]
//!     actions:
//!       attach: { method: POST, url: /api/volume/:id/attach }
//! ```

use super::action::Actions;
use super::class::ResourceClass;
use super::template::Params;
use crate::cache::{CachePolicy, CachedResource};
use crate::transport::Transport;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// One resource as written in a definitions file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    /// Names the cache namespace
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub param_defaults: Params,
    /// Parameters whose presence on a cached entry is required for a hit
    #[serde(default)]
    pub hot_params: Vec<String>,
    #[serde(default)]
    pub actions: Actions,
}

impl ResourceDefinition {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            param_defaults: Params::new(),
            hot_params: Vec::new(),
            actions: Actions::new(),
        }
    }

    /// A fresh resource class for this definition
    pub fn build_class(&self, transport: Arc<dyn Transport>) -> ResourceClass {
        ResourceClass::new(
            self.url.clone(),
            self.param_defaults.clone(),
            self.actions.clone(),
            transport,
        )
    }
}

/// Root structure of a definitions file
#[derive(Debug, Clone, Deserialize)]
pub struct DefinitionsFile {
    #[serde(default)]
    pub resources: Vec<ResourceDefinition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Json,
    Yaml,
}

impl DefinitionFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(DefinitionFormat::Json),
            "yaml" | "yml" => Some(DefinitionFormat::Yaml),
            _ => None,
        }
    }
}

pub fn parse_definitions(content: &str, format: DefinitionFormat) -> Result<Vec<ResourceDefinition>> {
    let file: DefinitionsFile = match format {
        DefinitionFormat::Json => serde_json::from_str(content).context("Invalid JSON definitions")?,
        DefinitionFormat::Yaml => serde_yaml::from_str(content).context("Invalid YAML definitions")?,
    };
    Ok(file.resources)
}

pub fn load_definitions(path: &Path) -> Result<Vec<ResourceDefinition>> {
    let Some(format) = DefinitionFormat::from_path(path) else {
        bail!("Unsupported definitions file (expected .json, .yaml or .yml): {}", path.display());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read definitions from {}", path.display()))?;
    parse_definitions(&content, format).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Cached resources by id, all sharing one transport and cache policy
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: BTreeMap<String, CachedResource>,
}

impl ResourceRegistry {
    pub fn new(
        definitions: Vec<ResourceDefinition>,
        transport: Arc<dyn Transport>,
        policy: CachePolicy,
    ) -> Result<Self> {
        let mut resources = BTreeMap::new();
        for definition in definitions {
            let id = definition.id.clone();
            if resources.contains_key(&id) {
                bail!("Duplicate resource id: {}", id);
            }
            tracing::debug!(resource = %id, url = %definition.url, "registering resource");
            resources.insert(id, CachedResource::new(definition, transport.clone(), policy));
        }
        Ok(Self { resources })
    }

    pub fn from_file(path: &Path, transport: Arc<dyn Transport>, policy: CachePolicy) -> Result<Self> {
        Self::new(load_definitions(path)?, transport, policy)
    }

    pub fn get(&self, id: &str) -> Option<&CachedResource> {
        self.resources.get(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.resources.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
