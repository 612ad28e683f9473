//! `fl show`: one tracking record with its attributes and journal.

use anyhow::{Result, bail};
use clap::Args;
use faultline_core::model::record::RecordId;
use faultline_core::store::TrackingStore;
use std::io::Write;

use crate::cmd::{Workspace, micros_to_local_datetime, store_error};
use crate::output::{OutputMode, pretty_kv, pretty_rule, pretty_section, render_error, render_mode};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Record id, as printed by `fl list` or in the ingest response.
    pub id: i64,

    /// Omit journal notes, printing only their headers.
    #[arg(long)]
    pub brief: bool,
}

/// # Errors
///
/// Returns an error if the store cannot be opened or the record is unknown.
pub fn run_show(args: &ShowArgs, output: OutputMode, workspace: &Workspace) -> Result<()> {
    let store = workspace.open_store()?;
    let record = match store.reload(RecordId(args.id)) {
        Ok(record) => record,
        Err(err) => {
            render_error(output, &store_error(&err))?;
            bail!("{err}");
        }
    };

    let brief = args.brief;
    render_mode(
        output,
        &record,
        |r, w| {
            writeln!(w, "{}\t{}\t{}", r.id, r.occurrences(), r.subject())?;
            for entry in &r.journal {
                writeln!(w, "journal\t{}\t{}", entry.id, entry.created_at_us)?;
            }
            Ok(())
        },
        |r, w| {
            pretty_section(w, &format!("#{} {}", r.id, r.subject()))?;
            let status = r
                .status
                .as_ref()
                .map_or_else(|| "-".to_string(), |s| s.name.clone());
            pretty_kv(w, "status", status)?;
            pretty_kv(w, "occurrences", r.occurrences().to_string())?;
            pretty_kv(w, "priority", r.priority.to_string())?;
            if let Some(assignee) = r.assignee {
                pretty_kv(w, "assignee", format!("{} {}", assignee.kind(), assignee.raw_id()))?;
            }
            if let Some(category) = r.category {
                pretty_kv(w, "category", category.to_string())?;
            }
            pretty_kv(w, "created", micros_to_local_datetime(r.created_at_us))?;
            pretty_kv(w, "updated", micros_to_local_datetime(r.updated_at_us))?;
            for (name, value) in &r.attributes {
                pretty_kv(w, name, value)?;
            }
            writeln!(w, "\n{}", r.description)?;

            for entry in &r.journal {
                writeln!(w)?;
                pretty_rule(w)?;
                let change = entry
                    .status_change
                    .as_deref()
                    .map(|s| format!(" (status -> {s})"))
                    .unwrap_or_default();
                writeln!(
                    w,
                    "journal {} by user {} at {}{change}",
                    entry.id,
                    entry.author,
                    micros_to_local_datetime(entry.created_at_us)
                )?;
                if !brief {
                    writeln!(w, "\n{}", entry.notes)?;
                }
            }
            Ok(())
        },
    )
}
