use anyhow::{Context as _, Result};
use clap::Args;
use faultline_core::config::{self, FAULTLINE_DIR};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::cmd::Workspace;
use crate::output::{OutputMode, pretty_kv, render_mode};

#[derive(Args, Debug, Default)]
pub struct InitArgs {
    /// Api key notifiers must send (defaults to a placeholder).
    #[arg(long)]
    pub api_key: Option<String>,

    /// Identifier of the first project (defaults to `example`).
    #[arg(long)]
    pub project: Option<String>,
}

#[derive(Debug, Serialize)]
struct InitReport {
    config: String,
    database: String,
}

/// Execute `fl init`. Creates:
///
/// ```text
/// .faultline/
///   config.toml     (starter config: api key, one example project)
///   faultline.db    (migrated tracking store)
/// ```
///
/// # Errors
///
/// Returns an error if `.faultline/config.toml` already exists or any
/// filesystem operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let config_path = config::write_starter_config(project_root).with_context(|| {
        format!(
            "cannot initialize {}",
            project_root.join(FAULTLINE_DIR).display()
        )
    })?;
    if args.api_key.is_some() || args.project.is_some() {
        let starter = std::fs::read_to_string(&config_path)?;
        let customized = customize(&starter, args)?;
        std::fs::write(&config_path, customized)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
    }

    let workspace = Workspace::load(Some(&config_path), project_root)?;
    workspace.open_store()?;

    let report = InitReport {
        config: config_path.display().to_string(),
        database: workspace.database_path().display().to_string(),
    };
    render_mode(
        output,
        &report,
        |r, w| writeln!(w, "{}\n{}", r.config, r.database),
        |r, w| {
            writeln!(w, "Initialized faultline")?;
            pretty_kv(w, "config", &r.config)?;
            pretty_kv(w, "database", &r.database)?;
            writeln!(w, "\nSet server.api_key before pointing notifiers here.")
        },
    )
}

/// Substitute the starter placeholders. Values are written as quoted
/// strings; JSON string escapes are valid TOML basic-string escapes.
fn customize(starter: &str, args: &InitArgs) -> Result<String> {
    let mut text = starter.to_string();
    if let Some(key) = &args.api_key {
        text = text.replacen(
            "api_key = \"change-me\"",
            &format!("api_key = {}", serde_json::to_string(key)?),
            1,
        );
    }
    if let Some(project) = &args.project {
        text = text.replacen(
            "identifier = \"example\"",
            &format!("identifier = {}", serde_json::to_string(project)?),
            1,
        );
    }
    Ok(text)
}
