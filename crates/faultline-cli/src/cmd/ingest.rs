//! `fl ingest`: push one notice body through the endpoint, as a notifier's
//! POST would.

use anyhow::{Context as _, Result, bail};
use clap::Args;
use faultline_core::directory::StaticDirectory;
use faultline_core::endpoint::{Endpoint, Response, Route};
use faultline_core::reconcile::Reconciler;
use serde::Serialize;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cmd::Workspace;
use crate::output::{OutputMode, pretty_kv, render_mode};

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Read the notice from this file instead of stdin (`-` is stdin).
    #[arg(long, short)]
    pub file: Option<PathBuf>,

    /// Treat the body as a legacy YAML notice (`POST /notices`).
    #[arg(long, conflicts_with = "route")]
    pub legacy: bool,

    /// Route path the body was posted to.
    #[arg(long)]
    pub route: Option<Route>,
}

impl IngestArgs {
    fn route(&self) -> Route {
        match (self.route, self.legacy) {
            (Some(route), _) => route,
            (None, true) => Route::LegacyNotices,
            (None, false) => Route::V2Notices,
        }
    }
}

#[derive(Debug, Serialize)]
struct IngestReport {
    route: String,
    status: u16,
    body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    record_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
}

impl IngestReport {
    fn new(route: Route, response: &Response) -> Self {
        Self {
            route: route.to_string(),
            status: response.status,
            body: response.body.clone(),
            record_id: response.record_id.map(|id| id.0),
            error_code: response.error_code.map(|code| code.code().to_string()),
        }
    }
}

/// # Errors
///
/// Returns an error when the body cannot be read, the store cannot be
/// opened, or the endpoint answers with a non-200 status.
pub fn run_ingest(
    args: &IngestArgs,
    output: OutputMode,
    workspace: &Workspace,
) -> Result<()> {
    let body = read_body(args.file.as_deref())?;
    let route = args.route();

    let store = Arc::new(workspace.open_store()?);
    let directory = Arc::new(StaticDirectory::from_config(&workspace.config));
    let reconciler = Reconciler::new(
        directory.clone(),
        directory,
        store,
        workspace.config.server.text_formatting,
    );
    let endpoint = Endpoint::new(workspace.config.server.api_key.clone(), reconciler);

    let response = endpoint.handle(route, &body);
    let report = IngestReport::new(route, &response);
    render_mode(
        output,
        &report,
        |r, w| writeln!(w, "{}\n{}", r.status, r.body),
        |r, w| {
            pretty_kv(w, "route", &r.route)?;
            pretty_kv(w, "status", r.status.to_string())?;
            if let Some(code) = &r.error_code {
                pretty_kv(w, "code", code)?;
            }
            writeln!(w, "\n{}", r.body)
        },
    )?;

    if !response.is_success() {
        bail!("notice rejected with status {}", response.status);
    }
    Ok(())
}

fn read_body(file: Option<&Path>) -> Result<Vec<u8>> {
    match file {
        Some(path) if path != Path::new("-") => {
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
        }
        _ => {
            let mut body = Vec::new();
            std::io::stdin()
                .read_to_end(&mut body)
                .context("Failed to read notice from stdin")?;
            Ok(body)
        }
    }
}
