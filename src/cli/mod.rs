use clap::{Parser, Subcommand, ValueEnum};
use warden::gatekeeper::EnforcementProfile;

pub mod check;
pub mod config;
pub mod init;
pub mod logging;
pub mod simulate;
pub mod version;

#[derive(Parser)]
#[command(name = "warden")]
#[command(author = "Warden Project")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator CLI for the Warden verification gate bot", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Replay a JSON-lines event script against an in-memory platform
    Simulate {
        /// Config file path (optional, uses default if not specified)
        #[arg(long)]
        config: Option<String>,

        /// Event script path, or "-" for stdin
        #[arg(long)]
        events: String,

        /// Exit right after the last event instead of waiting for scheduled checks
        #[arg(long)]
        no_drain: bool,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write a commented default config file
    Init {
        /// Config file path (optional, uses default if not specified)
        #[arg(long)]
        path: Option<String>,

        /// Restricted role new members hold until verified
        #[arg(long, default_value = "unverified")]
        gate_role: String,

        /// Timing profile
        #[arg(long, value_enum, default_value = "production")]
        profile: ProfileArg,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate a config file and print the resolved enforcement policy
    Check {
        /// Config file path (optional, uses default if not specified)
        #[arg(long)]
        path: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProfileArg {
    Production,
    Testing,
}

impl From<ProfileArg> for EnforcementProfile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Production => EnforcementProfile::Production,
            ProfileArg::Testing => EnforcementProfile::Testing,
        }
    }
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Init {
                path,
                gate_role,
                profile,
                force,
            } => init::execute(path, gate_role, profile.into(), force),
            ConfigAction::Check { path } => check::execute(path),
        },
        Commands::Simulate {
            config,
            events,
            no_drain,
        } => simulate::execute(config, events, !no_drain).await,
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_config_init_defaults() {
        let cli = Cli::parse_from(["warden", "config", "init"]);

        match cli.command {
            Commands::Config {
                action:
                    ConfigAction::Init {
                        path,
                        gate_role,
                        profile,
                        force,
                    },
            } => {
                assert_eq!(path, None);
                assert_eq!(gate_role, "unverified"); // default
                assert_eq!(profile, ProfileArg::Production); // default
                assert!(!force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }

    #[test]
    fn test_cli_parse_config_init_with_all_options() {
        let cli = Cli::parse_from([
            "warden",
            "config",
            "init",
            "--path",
            "/tmp/warden.toml",
            "--gate-role",
            "newcomer",
            "--profile",
            "testing",
            "--force",
        ]);

        match cli.command {
            Commands::Config {
                action:
                    ConfigAction::Init {
                        path,
                        gate_role,
                        profile,
                        force,
                    },
            } => {
                assert_eq!(path, Some("/tmp/warden.toml".to_string()));
                assert_eq!(gate_role, "newcomer");
                assert_eq!(EnforcementProfile::from(profile), EnforcementProfile::Testing);
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }

    #[test]
    fn test_cli_parse_config_check() {
        let cli = Cli::parse_from(["warden", "config", "check", "--path", "/tmp/warden.toml"]);

        match cli.command {
            Commands::Config {
                action: ConfigAction::Check { path },
            } => assert_eq!(path, Some("/tmp/warden.toml".to_string())),
            _ => panic!("Expected Config Check command"),
        }
    }

    #[test]
    fn test_cli_parse_simulate() {
        let cli = Cli::parse_from(["warden", "simulate", "--events", "-"]);

        match cli.command {
            Commands::Simulate {
                config,
                events,
                no_drain,
            } => {
                assert_eq!(config, None);
                assert_eq!(events, "-");
                assert!(!no_drain);
            }
            _ => panic!("Expected Simulate command"),
        }
    }

    #[test]
    fn test_cli_parse_simulate_requires_events() {
        assert!(Cli::try_parse_from(["warden", "simulate"]).is_err());
    }

    #[test]
    fn test_cli_rejects_unknown_profile() {
        assert!(
            Cli::try_parse_from(["warden", "config", "init", "--profile", "staging"]).is_err()
        );
    }

    #[test]
    fn test_cli_parse_version() {
        let cli = Cli::parse_from(["warden", "version"]);
        assert!(matches!(cli.command, Commands::Version));
    }
}
