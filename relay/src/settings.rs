//! Key material and the optional server settings file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use serde::Deserialize;
use telemetry_relay::core::EMERGENCY_TIMEOUT;
use telemetry_relay::{PresharedKey, RelayError};

/// Where the pre-shared key comes from.
#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    /// Pre-shared key, URL-safe base64 (44 characters).
    #[arg(long, env = "RELAY_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// File whose first non-empty line is the pre-shared key.
    #[arg(long, env = "RELAY_KEY_FILE", value_name = "PATH")]
    pub key_file: Option<PathBuf>,
}

impl KeyArgs {
    /// Resolve the key. Missing or malformed key material is an error.
    pub fn load(&self) -> Result<PresharedKey, RelayError> {
        match (&self.key, &self.key_file) {
            (Some(key), _) => Ok(PresharedKey::from_base64(key)?),
            (None, Some(path)) => PresharedKey::from_file(path),
            (None, None) => Err(RelayError::Config(
                "no key configured; pass --key or --key-file (or set RELAY_KEY / RELAY_KEY_FILE)"
                    .to_string(),
            )),
        }
    }
}

/// Server settings file, JSON.
///
/// ```json
/// { "emergency_timeout": 30 }
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerSettings {
    /// Seconds of client silence before an emergency is raised.
    #[serde(default = "default_emergency_timeout")]
    pub emergency_timeout: u64,
}

fn default_emergency_timeout() -> u64 {
    EMERGENCY_TIMEOUT.as_secs()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            emergency_timeout: default_emergency_timeout(),
        }
    }
}

impl ServerSettings {
    /// Read `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, RelayError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
            .map_err(|e| RelayError::Config(format!("{}: {e}", path.display())))
    }

    fn parse(text: &str) -> Result<Self, String> {
        let settings: Self = serde_json::from_str(text).map_err(|e| e.to_string())?;
        if settings.emergency_timeout == 0 {
            return Err("emergency_timeout must be at least 1 second".to_string());
        }
        Ok(settings)
    }

    /// Emergency timeout as a duration.
    pub fn emergency_timeout(&self) -> Duration {
        Duration::from_secs(self.emergency_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "uJnmGjIDuQnR_GYZ5uFPGYW5xYAi-JpMO_gwoTqg0EM=";

    #[test]
    fn test_settings_defaults_and_overrides() {
        assert_eq!(ServerSettings::load(None).unwrap().emergency_timeout, 30);
        assert_eq!(ServerSettings::parse("{}").unwrap().emergency_timeout, 30);

        let settings = ServerSettings::parse(r#"{"emergency_timeout": 45, "theme": "dark"}"#).unwrap();
        assert_eq!(settings.emergency_timeout(), Duration::from_secs(45));
    }

    #[test]
    fn test_settings_rejects_bad_values() {
        assert!(ServerSettings::parse(r#"{"emergency_timeout": 0}"#).is_err());
        assert!(ServerSettings::parse(r#"{"emergency_timeout": "soon"}"#).is_err());
        assert!(ServerSettings::parse("not json").is_err());
    }

    #[test]
    fn test_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"emergency_timeout": 12}"#).unwrap();

        let settings = ServerSettings::load(Some(&path)).unwrap();
        assert_eq!(settings.emergency_timeout, 12);

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            ServerSettings::load(Some(&missing)),
            Err(RelayError::Io(_))
        ));
    }

    #[test]
    fn test_key_sources() {
        let inline = KeyArgs {
            key: Some(KEY.to_string()),
            key_file: None,
        };
        assert_eq!(inline.load().unwrap().to_base64(), KEY);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.key");
        std::fs::write(&path, format!("\n{KEY}\n")).unwrap();
        let from_file = KeyArgs {
            key: None,
            key_file: Some(path),
        };
        assert_eq!(from_file.load().unwrap().to_base64(), KEY);

        let none = KeyArgs {
            key: None,
            key_file: None,
        };
        assert!(matches!(none.load(), Err(RelayError::Config(_))));

        let bad = KeyArgs {
            key: Some("short".to_string()),
            key_file: None,
        };
        assert!(matches!(bad.load(), Err(RelayError::Codec(_))));
    }
}
