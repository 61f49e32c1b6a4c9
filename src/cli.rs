//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Agropest - identify crop pests from free-text symptom descriptions
#[derive(Parser, Debug)]
#[command(name = "agropest")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "AGROPEST_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "AGROPEST_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "AGROPEST_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server (default)
    Serve {
        /// Host to bind to
        #[arg(long, env = "AGROPEST_HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long, env = "AGROPEST_PORT")]
        port: Option<u16>,
    },

    /// Identify the pest behind a description. Without one, reads
    /// descriptions from stdin until an empty line.
    Analyze {
        /// Symptom description
        description: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print a pest profile
    Show {
        /// Pest name (case-insensitive)
        #[arg(required = true)]
        name: String,
    },

    /// List known pests
    List,

    /// Insert or replace a pest profile from a JSON or YAML file
    Update {
        /// Pest name
        #[arg(required = true)]
        name: String,

        /// Profile file
        #[arg(required = true)]
        file: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_server_mode() {
        let cli = Cli::try_parse_from(["agropest"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn analyze_accepts_optional_description() {
        let cli = Cli::try_parse_from(["agropest", "analyze", "white bugs", "--format", "json"])
            .unwrap();
        match cli.command {
            Some(Command::Analyze { description, format }) => {
                assert_eq!(description.as_deref(), Some("white bugs"));
                assert_eq!(format, "json");
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["agropest", "analyze"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Analyze { description: None, .. })
        ));
    }

    #[test]
    fn update_requires_file() {
        assert!(Cli::try_parse_from(["agropest", "update", "thrips"]).is_err());
    }

    #[test]
    fn global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["agropest", "list", "--config", "agropest.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("agropest.yaml")));
    }
}
