//! Warden configuration file handling
//!
//! Provides default configuration generation and loading for the Warden bot.
//! Configuration files are TOML and live under the user data directory by
//! default (`~/.local/share/warden/config.toml`).
//!
//! The file holds OPERATOR settings only: enforcement timings, gate and
//! exempt roles, code alphabet, logging. Nothing in it is written back by
//! the bot.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use warden::gatekeeper::{EnforcementProfile, GateConfig};

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Warden bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardenConfig {
    /// Verification gate and enforcement settings
    pub gate: GateConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl WardenConfig {
    /// Create a new configuration with every default for the given gate role
    #[cfg(test)]
    pub fn new(gate_role: warden::RoleId) -> Self {
        Self {
            gate: GateConfig::new(gate_role),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file and validate it
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: WardenConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        config
            .gate
            .validate()
            .map_err(|e| format!("Invalid config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    #[cfg(test)]
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(path, contents)
            .map_err(|e| format!("Failed to write config file '{}': {}", path.display(), e))?;

        Ok(())
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml(gate_role: &str, profile: EnforcementProfile) -> String {
        let profile = match profile {
            EnforcementProfile::Production => "production",
            EnforcementProfile::Testing => "testing",
        };
        format!(
            r#"# Warden Bot Configuration (Operator Settings)
#
# All durations are in milliseconds.

[gate]
# Restricted role given to new members and removed once they verify
gate_role = "{gate_role}"

# Members holding any of these roles are never revoked
exempt_roles = []

# Timing profile: "production" (first check after 12.5 min) or "testing" (30 s)
profile = "{profile}"

# Verification code lifetime
expiration_ms = 60000

# Enforcement window. The first check fires lower_age_ms after join; members
# whose age is outside [lower_age_ms, upper_age_ms] at check time are left alone.
# Defaults: lower from the profile, upper = 2 x lower.
# lower_age_ms = 750000
# upper_age_ms = 1500000

# Wait between detecting non-compliance and the final re-check
grace_period_ms = 5000

# Characters codes are drawn from (look-alikes I, O, 0, 1 excluded)
code_alphabet = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789"

[logging]
# Log level: trace, debug, info, warn, error (RUST_LOG overrides)
level = "info"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/warden/warden.log"
"#
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(
        config_path: &Path,
        gate_role: &str,
        profile: EnforcementProfile,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let contents = Self::generate_default_toml(gate_role, profile);

        // Create parent directory if needed
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(config_path, contents).map_err(|e| {
            format!(
                "Failed to write config file '{}': {}",
                config_path.display(),
                e
            )
        })?;

        Ok(())
    }
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("warden")
        .join("config.toml")
}

/// Resolve an optional `--config` argument
pub fn resolve_config_path(config: Option<String>) -> PathBuf {
    config.map(PathBuf::from).unwrap_or_else(default_config_path)
}
