//! Tracing subscriber setup
//!
//! `RUST_LOG` wins over the configured level when set.

use super::config::LoggingConfig;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Failed to open log file '{}': {}", path.display(), e))?;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_with_log_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = LoggingConfig {
            level: "debug".to_string(),
            file: Some(temp_dir.path().join("warden.log")),
        };

        init(&config).unwrap();
        assert!(temp_dir.path().join("warden.log").exists());

        // Second init is a no-op, not an error
        init(&LoggingConfig::default()).unwrap();
    }

    #[test]
    fn test_init_with_unwritable_file() {
        let config = LoggingConfig {
            level: "info".to_string(),
            file: Some("/nonexistent/dir/warden.log".into()),
        };
        assert!(init(&config).is_err());
    }
}
