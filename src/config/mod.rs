// Engine configuration with TOML loading
//
// Every tunable has a default so the engine runs with no config file at all.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for the fill pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Wall-clock timeout for one template download, in seconds
    pub download_timeout_secs: u64,
    /// Maximum accepted template size in bytes; larger downloads are a
    /// DownloadFailure
    pub max_template_bytes: u64,
    /// Timeout for one text-completion call, in seconds
    pub completion_timeout_secs: u64,
    /// Minimum heuristic density (fields + sections per 1,000 chars of
    /// extracted text) below which the AI-assisted parse kicks in.
    /// No universally correct cutoff exists; validate against real forms.
    pub ai_assist_min_density: f32,
    /// Hard cap for single-line (short-text/date/number) content
    pub short_text_max_chars: usize,
    /// TTL for the in-memory template cache, in seconds. The persisted row
    /// has no TTL; it lives until explicitly invalidated.
    pub template_cache_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            download_timeout_secs: 30,
            max_template_bytes: 20 * 1024 * 1024,
            completion_timeout_secs: 60,
            ai_assist_min_density: 0.8,
            short_text_max_chars: 80,
            template_cache_ttl_secs: 6 * 60 * 60,
        }
    }
}

impl EngineConfig {
    /// Load config from a TOML file, falling back to defaults for any
    /// missing key
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: EngineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        log::info!("[Config] Loaded engine config from {:?}", path);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_cover_every_knob() {
        let config = EngineConfig::default();
        assert!(config.download_timeout_secs > 0);
        assert!(config.max_template_bytes > 0);
        assert!(config.ai_assist_min_density > 0.0);
        assert!(config.short_text_max_chars > 0);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("engine.toml");
        fs::write(&path, "downloadTimeoutSecs = 5\naiAssistMinDensity = 1.5\n").unwrap();

        let config = EngineConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.download_timeout_secs, 5);
        assert!((config.ai_assist_min_density - 1.5).abs() < f32::EPSILON);
        // Unspecified keys keep their defaults
        assert_eq!(config.short_text_max_chars, 80);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = EngineConfig::from_toml_file(Path::new("/nonexistent/engine.toml"));
        assert!(result.is_err());
    }
}
