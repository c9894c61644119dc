use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "whisparr-bridge")]
#[command(author, version, about = "Stash hook that adds scenes to Whisparr and imports their files")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Defaults to `hook` when omitted, which is how Stash runs the plugin
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Handle a Stash hook payload read from stdin
    Hook {
        /// Process this scene instead of the one in the hook context
        #[arg(long)]
        scene_id: Option<String>,

        /// Ignore Stash plugin settings and log in plain format
        #[arg(long)]
        dev: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses config.toml if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
