//! Config command handlers.

use std::path::Path;

use anyhow::{Context, Result};

use evogate::config::validate::{self, DiagnosticLevel};
use evogate::config::Config;

use super::ConfigAction;

pub(crate) fn cmd_config(action: ConfigAction, config_path: &Path) -> Result<()> {
    match action {
        ConfigAction::Check => cmd_check(config_path),
        ConfigAction::Init { force } => cmd_init(config_path, force),
        ConfigAction::Show => cmd_show(config_path),
    }
}

/// Validate the config file, then the resolved configuration.
fn cmd_check(config_path: &Path) -> Result<()> {
    println!("Config file: {}", config_path.display());

    let mut diagnostics = Vec::new();
    if config_path.exists() {
        let content =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let raw: serde_json::Value = match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(e) => {
                println!("[ERROR] Invalid JSON: {}", e);
                return Ok(());
            }
        };
        diagnostics.extend(validate::validate_config(&raw));
    } else {
        println!("[OK] No config file found (using defaults)");
    }

    let config = Config::load_from_path(config_path).context("Failed to load config")?;
    diagnostics.extend(validate::validate_semantics(&config));

    for diag in &diagnostics {
        println!("{}", diag);
    }

    let errors = validate::count_level(&diagnostics, DiagnosticLevel::Error);
    let warnings = validate::count_level(&diagnostics, DiagnosticLevel::Warn);

    if errors == 0 && warnings == 0 {
        println!("\nConfiguration looks good!");
    } else {
        println!("\nFound {} error(s), {} warning(s)", errors, warnings);
    }
    Ok(())
}

fn cmd_init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {} (use --force to overwrite)",
            config_path.display()
        );
    }

    let mut config = Config::default();
    config.auth.api_key = uuid::Uuid::new_v4().simple().to_string();
    config
        .save_to_path(config_path)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    println!("Config written to {}", config_path.display());
    println!("API key: {}", config.auth.api_key);
    println!();
    println!("Send it in the `apikey` header. Start the gateway with: evogate serve");
    Ok(())
}

fn cmd_show(config_path: &Path) -> Result<()> {
    let config = Config::load_from_path(config_path).context("Failed to load config")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&config.redacted()).context("Failed to render config")?
    );
    Ok(())
}
