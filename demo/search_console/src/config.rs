use std::fs;
use std::path::Path;

use quarry_core::{ConfigError, WorkspaceCredentials};

/// What the console shows and which serving endpoint it talks to
#[derive(Clone, Debug)]
pub struct ConsoleConfig {
    pub title: String,
    pub description: String,
    /// Placeholder query shown in the prompt
    pub example: String,
    pub serving_endpoint: String,
    pub vs_index_name: String,
    pub workspace: WorkspaceCredentials,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            title: "Quarry Search".to_string(),
            description: String::new(),
            example: String::new(),
            serving_endpoint: std::env::var("SEARCH_CONSOLE_ENDPOINT")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "quarry-agent".to_string()),
            vs_index_name: String::new(),
            workspace: WorkspaceCredentials::default(),
        }
    }
}

impl ConsoleConfig {
    /// Load the interface YAML (path via SEARCH_CONSOLE_CONFIG or ./interface.yaml),
    /// overlaying its values onto env-driven defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("SEARCH_CONSOLE_CONFIG").unwrap_or_else(|_| "interface.yaml".into());
        Self::load_from(path, Self::default())
    }

    /// A missing file yields `base`; an unreadable or invalid one is an error.
    pub fn load_from(path: impl AsRef<Path>, base: Self) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(target: "search_console", path = %path.display(), "No interface config found; using defaults/env");
            return Ok(base);
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_yaml_str(&raw, base)?)
    }

    pub fn from_yaml_str(yaml: &str, base: Self) -> Result<Self, serde_yml::Error> {
        let overlay: InterfaceYaml = serde_yml::from_str(yaml)?;
        Ok(overlay.overlay(base))
    }

    pub fn invocations_url(&self) -> String {
        format!(
            "{}/serving-endpoints/{}/invocations",
            self.workspace.base_url(),
            self.serving_endpoint
        )
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct InterfaceYaml {
    pub title: Option<String>,
    pub description: Option<String>,
    pub example: Option<String>,
    pub serving_endpoint: Option<String>,
    pub vs_index_name: Option<String>,
}

impl InterfaceYaml {
    fn overlay(self, mut base: ConsoleConfig) -> ConsoleConfig {
        if let Some(v) = self.title {
            base.title = v;
        }
        if let Some(v) = self.description {
            base.description = v;
        }
        if let Some(v) = self.example {
            base.example = v;
        }
        if let Some(v) = self.serving_endpoint {
            base.serving_endpoint = v;
        }
        if let Some(v) = self.vs_index_name {
            base.vs_index_name = v;
        }
        base
    }
}
