//! Worker configuration.
//!
//! The cache version, scope, and precache manifest are injected at startup
//! so deployments can bump versions without code edits. Bumping
//! `cache_name` on a deploy that changes precached assets is what triggers
//! the stale-cache cleanup on the next activation.

use serde::{Deserialize, Serialize};

use crate::SwError;

/// Default cache container name.
pub const DEFAULT_CACHE_NAME: &str = "navigo-v1";

/// Cache worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwConfig {
    /// Name of the current cache container. All containers with other
    /// names are deleted on activation.
    pub cache_name: String,

    /// Scope path the worker controls.
    pub scope: String,

    /// Path the worker script is served from.
    pub script_path: String,

    /// Paths fetched and stored at install time, as one atomic batch.
    pub precache: Vec<String>,

    /// Cached path served when an uncategorized navigation fails and no
    /// exact entry exists. `None` disables the fallback.
    pub navigation_fallback: Option<String>,
}

impl Default for SwConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            scope: "/".to_string(),
            script_path: "/sw.js".to_string(),
            precache: vec![
                "/".to_string(),
                "/login".to_string(),
                "/static/css/style.css".to_string(),
                "/static/js/main.js".to_string(),
                "/static/manifest.webmanifest".to_string(),
                "/static/icons/icon-192.png".to_string(),
                "/static/icons/icon-512.png".to_string(),
            ],
            navigation_fallback: Some("/".to_string()),
        }
    }
}

impl SwConfig {
    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self, SwError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SwError::Config(format!("read {}: {}", path.as_ref().display(), e)))?;
        serde_json::from_str(&contents).map_err(|e| SwError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SwConfig::default();
        assert_eq!(config.cache_name, "navigo-v1");
        assert_eq!(config.scope, "/");
        assert_eq!(config.precache.len(), 7);
        assert_eq!(config.precache[0], "/");
        assert_eq!(config.navigation_fallback.as_deref(), Some("/"));
    }

    #[test]
    fn test_json_round_trip() {
        let config = SwConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: SwConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.cache_name, config.cache_name);
        assert_eq!(parsed.precache, config.precache);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let parsed: SwConfig = serde_json::from_str(r#"{"cache_name":"navigo-v2"}"#).unwrap();
        assert_eq!(parsed.cache_name, "navigo-v2");
        assert_eq!(parsed.precache.len(), 7);
    }

    #[test]
    fn test_from_json_file() {
        let path = std::env::temp_dir().join("navigo-sw-config-test.json");
        std::fs::write(&path, r#"{"cache_name":"navigo-v3","scope":"/"}"#).unwrap();

        let config = SwConfig::from_json_file(&path).unwrap();
        assert_eq!(config.cache_name, "navigo-v3");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_from_json_file_missing() {
        let result = SwConfig::from_json_file("/nonexistent/navigo.json");
        assert!(matches!(result, Err(SwError::Config(_))));
    }
}
