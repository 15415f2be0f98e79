//! Configuration management for the qlbot replay tool.
//!
//! The configuration lives in a TOML file. A missing file is created with
//! the default settings.

use qlbot_event_system::{AgentConfig, MemoryPermissions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Bot identity and command prefix
    #[serde(default)]
    pub agent: AgentConfig,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Plugin configuration settings
    #[serde(default)]
    pub plugins: PluginSettings,
    /// Permission level per player name
    #[serde(default)]
    pub permissions: BTreeMap<String, u32>,
}

/// Which plugins are loaded at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSettings {
    /// Plugin names, loaded in this order
    pub enabled: Vec<String>,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            enabled: vec!["greeter".to_string()],
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
    /// Optional file path for log output (None means stderr only)
    pub file_path: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            file_path: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            logging: LoggingSettings::default(),
            plugins: PluginSettings::default(),
            permissions: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the
    /// specified path and returns the default configuration.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Builds the in-memory permission store from the `[permissions]` table.
    pub fn permission_store(&self) -> MemoryPermissions {
        self.permissions
            .iter()
            .map(|(name, level)| (name.as_str(), *level))
            .collect()
    }

    /// Validates the configuration.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is usable, or a description of the first
    /// problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.agent.nickname.trim().is_empty() {
            return Err("Agent nickname cannot be empty".to_string());
        }

        if self.agent.command_prefix.is_empty() {
            return Err("Command prefix cannot be empty".to_string());
        }
        if self.agent.command_prefix.chars().any(char::is_whitespace) {
            return Err(format!(
                "Command prefix cannot contain whitespace: '{}'",
                self.agent.command_prefix
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        if let Some(name) = self.plugins.enabled.iter().find(|name| name.trim().is_empty()) {
            return Err(format!("Invalid plugin name: '{name}'"));
        }

        if let Some(name) = self.permissions.keys().find(|name| name.trim().is_empty()) {
            return Err(format!("Invalid permission entry: '{name}'"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qlbot_event_system::PermissionStore;
    use tempfile::NamedTempFile;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.agent.nickname, "QLBot");
        assert_eq!(config.agent.command_prefix, "!");
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(config.logging.file_path.is_none());
        assert_eq!(config.plugins.enabled, vec!["greeter".to_string()]);
        assert!(config.permissions.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();

        config.agent.nickname = "  ".to_string();
        assert!(config.validate().is_err());

        config.agent.nickname = "QLBot".to_string();
        config.agent.command_prefix = "! ".to_string();
        assert!(config.validate().is_err());

        config.agent.command_prefix = "!".to_string();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "debug".to_string();
        config.plugins.enabled.push(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [agent]
            nickname = "Referee"

            [permissions]
            mino = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.agent.nickname, "Referee");
        assert_eq!(config.agent.command_prefix, "!");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.permission_store().permission_level("mino"), Some(3));
    }

    #[tokio::test]
    async fn test_missing_file_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qlbot.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(config.agent.nickname, "QLBot");

        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.plugins.enabled, config.plugins.enabled);
    }

    #[tokio::test]
    async fn test_load_existing_file() {
        let file = NamedTempFile::new().unwrap();
        tokio::fs::write(
            file.path(),
            r#"
            [agent]
            nickname = "Warden"
            command_prefix = "."

            [logging]
            level = "debug"
            json_format = true

            [plugins]
            enabled = []
            "#,
        )
        .await
        .unwrap();

        let config = AppConfig::load_from_file(&file.path().to_path_buf()).await.unwrap();
        assert_eq!(config.agent.command_prefix, ".");
        assert!(config.logging.json_format);
        assert!(config.plugins.enabled.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_toml_is_an_error() {
        let file = NamedTempFile::new().unwrap();
        tokio::fs::write(file.path(), "[agent\nnickname = ").await.unwrap();
        assert!(AppConfig::load_from_file(&file.path().to_path_buf()).await.is_err());
    }
}
