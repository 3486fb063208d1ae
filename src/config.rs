use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub poll: PollConfig,
    pub names: NamesConfig,
    pub upload: UploadConfig,
    pub bindings: BindingsSection,
}

// ---------------------------------------------------------------------------
// Relay server
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the relay's web interface, e.g. `http://127.0.0.1:5000`.
    pub base_url: String,
    /// Operator login. Without it we assume the relay needs no session.
    pub username: Option<String>,
    pub password: Option<String>,
    /// Shell command whose stdout provides the password (e.g. "pass relay/admin").
    pub password_command: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            username: None,
            password: None,
            password_command: None,
            timeout_secs: 20,
        }
    }
}

impl ServerConfig {
    /// Retrieve the login password: run password_command if set, otherwise
    /// use the plain password. `None` when neither is configured.
    pub fn password(&self) -> Result<Option<String>> {
        if let Some(ref cmd) = self.password_command {
            let output = std::process::Command::new("sh")
                .args(["-c", cmd])
                .output()
                .with_context(|| format!("failed to run password command: {}", cmd))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                anyhow::bail!("password command failed: {}", stderr.trim());
            }

            Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ))
        } else {
            Ok(self.password.clone())
        }
    }
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollConfig {
    /// Chat-list refresh interval.
    pub chats_secs: u64,
    /// New-message check interval.
    pub new_messages_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            chats_secs: 15,
            new_messages_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Display names and uploads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NamesConfig {
    /// Show generated pseudonyms instead of Telegram names (aliases still win).
    pub anonymize: bool,
}

impl Default for NamesConfig {
    fn default() -> Self {
        Self { anonymize: true }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UploadConfig {
    pub max_bytes: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 20 * 1024 * 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// Keybindings
// ---------------------------------------------------------------------------

/// The `[bindings]` config section: key → action name, e.g. `F5 = "refresh"`.
///
/// Top-level keys are global (apply to the list and message panes).
/// `[bindings.list]` and `[bindings.messages]` provide per-pane overrides.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct BindingsSection {
    #[serde(default)]
    pub list: HashMap<String, String>,
    #[serde(default)]
    pub messages: HashMap<String, String>,
    #[serde(flatten)]
    pub global: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Try to load the configuration file from, in order:
    ///
    /// 1. `$BOTDESK_CONFIG`
    /// 2. `$XDG_CONFIG_HOME/botdesk/config.toml`
    /// 3. `~/.config/botdesk/config.toml`
    ///
    /// If none of these paths exist, return a default `Config`.
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::locate() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("failed to parse config file {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Return the first config path that actually exists on disk, or `None`.
    fn locate() -> Option<PathBuf> {
        let candidates = Self::candidate_paths();
        candidates.into_iter().find(|p| p.is_file())
    }

    /// Ordered list of paths we check for a config file.
    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(p) = std::env::var("BOTDESK_CONFIG") {
            paths.push(PathBuf::from(p));
        }

        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join("botdesk").join("config.toml"));
        }

        if let Ok(home) = std::env::var("HOME") {
            paths.push(
                PathBuf::from(home)
                    .join(".config")
                    .join("botdesk")
                    .join("config.toml"),
            );
        }

        paths
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.server.base_url, "http://127.0.0.1:5000");
        assert_eq!(cfg.poll.chats_secs, 15);
        assert_eq!(cfg.poll.new_messages_secs, 10);
        assert!(cfg.names.anonymize);
        assert!(cfg.server.username.is_none());
    }

    #[test]
    fn parse_minimal_toml() {
        let toml_str = r#"
            [server]
            base_url = "https://relay.example.com"
        "#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.server.base_url, "https://relay.example.com");
        assert_eq!(cfg.server.timeout_secs, 20);
        assert_eq!(cfg.upload.max_bytes, 20 * 1024 * 1024);
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
            [server]
            base_url = "http://10.0.0.2:8080"
            username = "admin"
            password_command = "pass relay/admin"
            timeout_secs = 5

            [poll]
            chats_secs = 30
            new_messages_secs = 4

            [names]
            anonymize = false

            [upload]
            max_bytes = 1024
        "#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.server.username.as_deref(), Some("admin"));
        assert_eq!(
            cfg.server.password_command.as_deref(),
            Some("pass relay/admin")
        );
        assert_eq!(cfg.server.timeout_secs, 5);
        assert_eq!(cfg.poll.chats_secs, 30);
        assert_eq!(cfg.poll.new_messages_secs, 4);
        assert!(!cfg.names.anonymize);
        assert_eq!(cfg.upload.max_bytes, 1024);
    }

    #[test]
    fn parse_bindings_global_and_per_pane() {
        let toml_str = r#"
            [bindings]
            F5 = "refresh"
            "ctrl+f" = "search"

            [bindings.messages]
            x = "delete-message"
        "#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.bindings.global.len(), 2);
        assert_eq!(cfg.bindings.global.get("F5").map(String::as_str), Some("refresh"));
        assert_eq!(
            cfg.bindings.messages.get("x").map(String::as_str),
            Some("delete-message")
        );
        assert!(cfg.bindings.list.is_empty());
    }

    #[test]
    fn password_prefers_command() {
        let server = ServerConfig {
            password: Some("plain".into()),
            password_command: Some("echo from-command".into()),
            ..ServerConfig::default()
        };
        assert_eq!(server.password().unwrap().as_deref(), Some("from-command"));

        let server = ServerConfig {
            password: Some("plain".into()),
            ..ServerConfig::default()
        };
        assert_eq!(server.password().unwrap().as_deref(), Some("plain"));
    }

    #[test]
    fn failing_password_command_is_an_error() {
        let server = ServerConfig {
            password_command: Some("exit 3".into()),
            ..ServerConfig::default()
        };
        assert!(server.password().is_err());
    }
}
