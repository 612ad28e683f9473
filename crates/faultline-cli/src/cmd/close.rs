//! `fl close`: move records to a closed status, as an operator resolving
//! them would. The next occurrence of the same error reopens the record.

use anyhow::{Result, bail};
use clap::Args;
use faultline_core::config::Config;
use faultline_core::model::record::{RecordId, Status};
use serde::Serialize;
use std::io::Write;

use crate::cmd::{Workspace, store_error};
use crate::output::{CliError, OutputMode, pretty_kv, render_error, render_mode};

#[derive(Args, Debug)]
pub struct CloseArgs {
    /// Record id to close.
    pub id: i64,

    /// Additional record ids to close in the same command.
    #[arg(value_name = "ID")]
    pub ids: Vec<i64>,

    /// Closed status to use (defaults to the first configured closed status).
    #[arg(long)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
struct Closed {
    id: i64,
    status: String,
    lock_version: i64,
}

/// Resolve `requested` against the configured closed statuses.
fn closed_status(config: &Config, requested: Option<&str>) -> Result<Status, CliError> {
    let mut closed = config.statuses.iter().filter(|s| s.is_closed);
    let found = match requested {
        Some(name) => closed.find(|s| s.name.eq_ignore_ascii_case(name)),
        None => closed.next(),
    };
    found.map(|s| Status::closed(s.name.clone())).ok_or_else(|| {
        let names: Vec<&str> = config
            .statuses
            .iter()
            .filter(|s| s.is_closed)
            .map(|s| s.name.as_str())
            .collect();
        match requested {
            Some(name) => CliError {
                message: format!("'{name}' is not a closed status"),
                suggestion: Some(format!("Use one of: {}", names.join(", "))),
                error_code: None,
            },
            None => CliError::new("no closed status is configured"),
        }
    })
}

/// # Errors
///
/// Returns an error if the status is not a configured closed status or any
/// record cannot be updated.
pub fn run_close(args: &CloseArgs, output: OutputMode, workspace: &Workspace) -> Result<()> {
    let status = match closed_status(&workspace.config, args.status.as_deref()) {
        Ok(status) => status,
        Err(err) => {
            render_error(output, &err)?;
            bail!("{}", err.message);
        }
    };

    let store = workspace.open_store()?;
    let mut closed = Vec::new();
    for id in std::iter::once(args.id).chain(args.ids.iter().copied()) {
        match store.set_status(RecordId(id), &status) {
            Ok(record) => closed.push(Closed {
                id,
                status: status.name.clone(),
                lock_version: record.lock_version,
            }),
            Err(err) => {
                render_error(output, &store_error(&err))?;
                bail!("{err}");
            }
        }
    }

    render_mode(
        output,
        &closed,
        |rows, w| {
            for row in rows {
                writeln!(w, "{}\t{}", row.id, row.status)?;
            }
            Ok(())
        },
        |rows, w| {
            for row in rows {
                pretty_kv(w, &format!("#{}", row.id), format!("-> {}", row.status))?;
            }
            Ok(())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_closed_status_is_first_configured() {
        let status = closed_status(&Config::default(), None).expect("status");
        assert_eq!(status, Status::closed("Closed"));
    }

    #[test]
    fn requested_status_matches_case_insensitively() {
        let status = closed_status(&Config::default(), Some("rejected")).expect("status");
        assert_eq!(status, Status::closed("Rejected"));
    }

    #[test]
    fn open_status_is_refused() {
        let err = closed_status(&Config::default(), Some("New")).expect_err("open status");
        assert!(err.message.contains("not a closed status"));
        assert!(
            err.suggestion
                .as_deref()
                .is_some_and(|s| s.contains("Closed"))
        );
    }
}
