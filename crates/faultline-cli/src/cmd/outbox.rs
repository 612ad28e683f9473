//! `fl outbox`: outbound notifications queued by the store.
//!
//! Records created while ingesting notices never queue a notification, so
//! on a store written only by `fl ingest` this list stays empty.

use anyhow::{Result, bail};
use clap::Args;
use std::io::Write;

use crate::cmd::{Workspace, micros_to_local_datetime, store_error};
use crate::output::{OutputMode, render_error, render_mode};

#[derive(Args, Debug)]
pub struct OutboxArgs {}

/// # Errors
///
/// Returns an error if the store cannot be opened or queried.
pub fn run_outbox(_args: &OutboxArgs, output: OutputMode, workspace: &Workspace) -> Result<()> {
    let store = workspace.open_store()?;
    let pending = match store.pending_notifications() {
        Ok(pending) => pending,
        Err(err) => {
            render_error(output, &store_error(&err))?;
            bail!("{err}");
        }
    };

    render_mode(
        output,
        &pending,
        |rows, w| {
            for n in rows {
                writeln!(w, "{}\t{}\t{}", n.id, n.record_id, n.event)?;
            }
            Ok(())
        },
        |rows, w| {
            if rows.is_empty() {
                return writeln!(w, "No pending notifications.");
            }
            for n in rows {
                writeln!(
                    w,
                    "{:>5}  record #{:<6} {:<8} {}",
                    n.id,
                    n.record_id,
                    n.event,
                    micros_to_local_datetime(n.created_at_us)
                )?;
            }
            Ok(())
        },
    )
}
