//! `fl config`: show where configuration was found and what it resolves to.

use anyhow::Result;
use clap::Args;
use faultline_core::directory::StaticDirectory;
use serde::Serialize;
use std::io::Write;

use crate::cmd::Workspace;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ConfigArgs {}

#[derive(Debug, Serialize)]
struct ProjectSummary {
    id: i64,
    identifier: String,
    trackers: Vec<String>,
    backtrace_filters: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    repository_root: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConfigReport {
    config: String,
    config_exists: bool,
    database: String,
    api_key_set: bool,
    text_formatting: String,
    store_timeout_ms: u64,
    projects: Vec<ProjectSummary>,
}

fn report(workspace: &Workspace) -> ConfigReport {
    let config = &workspace.config;
    let directory = StaticDirectory::from_config(config);
    let projects = directory
        .projects()
        .iter()
        .map(|project| ProjectSummary {
            id: project.id.0,
            identifier: project.identifier.clone(),
            trackers: config
                .projects
                .iter()
                .find(|p| p.identifier == project.identifier)
                .map(|p| p.trackers.clone())
                .unwrap_or_default(),
            backtrace_filters: project.backtrace_filters.len(),
            repository_root: project.repository_root.clone(),
        })
        .collect();

    ConfigReport {
        config: workspace.config_path.display().to_string(),
        config_exists: workspace.config_path.is_file(),
        database: workspace.database_path().display().to_string(),
        api_key_set: config.server.api_key.as_deref().is_some_and(|k| !k.is_empty()),
        text_formatting: config.server.text_formatting.to_string(),
        store_timeout_ms: config.server.store_timeout_ms,
        projects,
    }
}

/// # Errors
///
/// Returns an error if writing the report fails.
pub fn run_config(_args: &ConfigArgs, output: OutputMode, workspace: &Workspace) -> Result<()> {
    render_mode(
        output,
        &report(workspace),
        |r, w| {
            writeln!(w, "config\t{}", r.config)?;
            writeln!(w, "database\t{}", r.database)?;
            for p in &r.projects {
                writeln!(w, "project\t{}\t{}", p.identifier, p.trackers.join(","))?;
            }
            Ok(())
        },
        |r, w| {
            pretty_section(w, "Configuration")?;
            let source = if r.config_exists {
                r.config.clone()
            } else {
                format!("{} (not found, using defaults)", r.config)
            };
            pretty_kv(w, "config", source)?;
            pretty_kv(w, "database", &r.database)?;
            pretty_kv(w, "api key", if r.api_key_set { "set" } else { "NOT SET (ingest disabled)" })?;
            pretty_kv(w, "formatting", &r.text_formatting)?;
            pretty_kv(w, "timeout", format!("{} ms", r.store_timeout_ms))?;
            for p in &r.projects {
                pretty_kv(
                    w,
                    "project",
                    format!("{} [{}]", p.identifier, p.trackers.join(", ")),
                )?;
            }
            Ok(())
        },
    )
}
