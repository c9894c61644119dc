mod cli;

use whisparr_bridge::config;
use whisparr_bridge::hook::{self, HookOptions};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::io::Read;
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Hook {
        scene_id: None,
        dev: false,
    });

    match command {
        Commands::Hook { scene_id, dev } => {
            let options = HookOptions {
                config_path: cli
                    .config
                    .unwrap_or_else(|| PathBuf::from(config::DEFAULT_CONFIG_FILE)),
                scene_id,
                verbose: cli.verbose,
                dev,
            };
            run_hook(&options)
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path
                .or(cli.config)
                .unwrap_or_else(|| PathBuf::from(config::DEFAULT_CONFIG_FILE));
            validate_config(&path)
        }
        Commands::Version => {
            println!("whisparr-bridge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_hook(options: &HookOptions) -> Result<()> {
    let mut raw = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut raw) {
        eprintln!("Failed to read hook input: {}", e);
        return Ok(());
    }

    // One scene, one call at a time
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;
    rt.block_on(hook::run(&raw, options));

    Ok(())
}

fn validate_config(path: &Path) -> Result<()> {
    println!("Validating config: {:?}", path);
    if !path.is_file() {
        anyhow::bail!("Config file not found: {:?}", path);
    }

    let config = config::load_config(path)?;
    println!("✓ Configuration is valid");
    println!("  Whisparr: {}", config.whisparr_url);
    println!("  StashDB endpoint match: {}", config.stashdb_endpoint_substr);
    println!("  Monitored: {}", config.monitored);
    println!("  Move files: {}", config.move_files);
    println!("  Rename after import: {}", config.whisparr_rename);
    println!("  Quality profile: {}", config.quality_profile);
    match config.root_folder {
        Some(ref root) => println!("  Root folder: {}", root.display()),
        None => println!("  Root folder: first available"),
    }
    println!("  Ignored tags: {}", config.ignore_tags.len());
    println!("  Path mappings: {}", config.path_mapping.len());

    Ok(())
}
