//! CLI command definitions for the `memoria` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod extract;

use clap::{Parser, Subcommand};

/// Orchestrate memory extraction from chat history.
#[derive(Parser)]
#[command(name = "memoria", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also export spans to stdout through OpenTelemetry.
    #[arg(long, global = true, env = "MEMORIA_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Log level for Memoria crates derived from `-v`/`-q`.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3010")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Request a memory extraction batch for a user.
    Extract {
        /// User to extract memories for.
        #[arg(long)]
        user: String,

        /// Only topics created on or after this date (YYYY-MM-DD or RFC 3339).
        #[arg(long)]
        from: Option<String>,

        /// Only topics created on or before this date.
        #[arg(long)]
        to: Option<String>,

        /// Include topics whose memories were already extracted.
        #[arg(long)]
        force_all: bool,

        /// Stay in the foreground until the batch settles.
        #[arg(long)]
        wait: bool,
    },

    /// Show an extraction task.
    Task {
        /// Task id (UUID).
        id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_extract_flags() {
        let cli = Cli::parse_from([
            "memoria", "--json", "extract", "--user", "u1", "--from", "2024-01-01", "--force-all", "--wait",
        ]);
        assert!(cli.json);
        match cli.command {
            Commands::Extract {
                user,
                from,
                to,
                force_all,
                wait,
            } => {
                assert_eq!(user, "u1");
                assert_eq!(from.as_deref(), Some("2024-01-01"));
                assert!(to.is_none());
                assert!(force_all && wait);
            }
            _ => panic!("expected extract"),
        }
    }

    #[test]
    fn verbosity_maps_to_level() {
        let cli = Cli::parse_from(["memoria", "-vv", "task", "x"]);
        assert_eq!(cli.log_level(), "trace");
        let cli = Cli::parse_from(["memoria", "-q", "task", "x"]);
        assert_eq!(cli.log_level(), "error");
    }

    #[test]
    fn serve_defaults() {
        let cli = Cli::parse_from(["memoria", "serve"]);
        match cli.command {
            Commands::Serve { port, host } => {
                assert_eq!(port, 3010);
                assert_eq!(host, "127.0.0.1");
            }
            _ => panic!("expected serve"),
        }
    }
}
