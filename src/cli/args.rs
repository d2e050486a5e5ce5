//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Live camera feed with on-demand frame descriptions
#[derive(Parser, Debug)]
#[command(name = "glasscam")]
#[command(version, about = "Describe what your tethered camera sees", long_about = None)]
#[command(after_help = "EXAMPLES:
    glasscam list-sources
    glasscam describe --instruction \"Read the sign\"
    glasscam run --simulate

ENVIRONMENT:
    GLASSCAM_API_KEY    Required for analysis. Your vision API key.
    RUST_LOG            Log filter (default: info)")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Use simulated cameras instead of real hardware
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Source id to select (overrides camera.source)
    #[arg(long, short, global = true)]
    pub source: Option<String>,

    /// Mirror captured stills horizontally
    #[arg(long, global = true)]
    pub mirror: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List available video sources
    ListSources,
    /// Capture one frame and print its description
    Describe {
        /// Instruction sent with the frame
        #[arg(long, short)]
        instruction: Option<String>,
    },
    /// Interactive session (default)
    Run,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["glasscam"]);
        assert!(args.command.is_none());
        assert!(args.config.is_none());
        assert!(!args.simulate);
        assert!(args.source.is_none());
        assert!(!args.mirror);
    }

    #[test]
    fn test_list_sources_subcommand() {
        let args = Args::parse_from(["glasscam", "list-sources"]);
        assert!(matches!(args.command, Some(Command::ListSources)));
    }

    #[test]
    fn test_describe_with_instruction() {
        let args = Args::parse_from(["glasscam", "describe", "-i", "Read the sign"]);
        match args.command {
            Some(Command::Describe { instruction }) => {
                assert_eq!(instruction.as_deref(), Some("Read the sign"));
            }
            other => panic!("Expected describe, got {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from(["glasscam", "run", "--simulate", "--source", "usb-1"]);
        assert!(matches!(args.command, Some(Command::Run)));
        assert!(args.simulate);
        assert_eq!(args.source.as_deref(), Some("usb-1"));
    }

    #[test]
    fn test_config_subcommands() {
        let args = Args::parse_from(["glasscam", "config", "show"]);
        assert!(matches!(
            args.command,
            Some(Command::Config {
                action: ConfigAction::Show
            })
        ));

        let args = Args::parse_from(["glasscam", "--config", "/tmp/g.toml", "config", "init"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/g.toml")));
        assert!(matches!(
            args.command,
            Some(Command::Config {
                action: ConfigAction::Init
            })
        ));
    }

    #[test]
    fn test_unknown_subcommand_is_rejected() {
        assert!(Args::try_parse_from(["glasscam", "record"]).is_err());
    }
}
