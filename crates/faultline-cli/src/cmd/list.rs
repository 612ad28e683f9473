use anyhow::Result;
use clap::Args;
use faultline_core::model::record::TrackingRecord;
use serde::Serialize;
use std::io::Write;

use crate::cmd::{Workspace, micros_to_local_datetime, store_error};
use crate::output::{OutputMode, pretty_rule, render_error, render_mode};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Maximum number of records to show, most recently updated first.
    #[arg(long, short = 'n', default_value_t = 50)]
    pub limit: usize,

    /// Only records whose status is closed (or only open ones with `--open`).
    #[arg(long, conflicts_with = "open")]
    pub closed: bool,

    #[arg(long)]
    pub open: bool,
}

#[derive(Debug, Serialize)]
pub struct ListRow {
    pub id: i64,
    pub status: String,
    pub closed: bool,
    pub occurrences: i64,
    pub subject: String,
    pub updated_at_us: i64,
}

impl From<&TrackingRecord> for ListRow {
    fn from(record: &TrackingRecord) -> Self {
        Self {
            id: record.id.0,
            status: record
                .status
                .as_ref()
                .map_or_else(|| "-".to_string(), |s| s.name.clone()),
            closed: record.status.as_ref().is_some_and(|s| s.is_closed),
            occurrences: record.occurrences(),
            subject: record.subject().to_string(),
            updated_at_us: record.updated_at_us,
        }
    }
}

#[derive(Debug, Serialize)]
struct ListOutput {
    records: Vec<ListRow>,
}

/// # Errors
///
/// Returns an error if the store cannot be opened or queried.
pub fn run_list(args: &ListArgs, output: OutputMode, workspace: &Workspace) -> Result<()> {
    let store = workspace.open_store()?;
    let records = match store.list_records(args.limit) {
        Ok(records) => records,
        Err(err) => {
            render_error(output, &store_error(&err))?;
            anyhow::bail!("{err}");
        }
    };

    let rows = records
        .iter()
        .map(ListRow::from)
        .filter(|row| match (args.closed, args.open) {
            (true, _) => row.closed,
            (_, true) => !row.closed,
            _ => true,
        })
        .collect();

    render_mode(
        output,
        &ListOutput { records: rows },
        |out, w| {
            for row in &out.records {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}",
                    row.id, row.status, row.occurrences, row.subject
                )?;
            }
            Ok(())
        },
        |out, w| {
            if out.records.is_empty() {
                return writeln!(w, "No tracking records.");
            }
            writeln!(w, "{:>5}  {:<12} {:>6}  {:<19}  SUBJECT", "ID", "STATUS", "COUNT", "UPDATED")?;
            pretty_rule(w)?;
            for row in &out.records {
                writeln!(
                    w,
                    "{:>5}  {:<12} {:>6}  {:<19}  {}",
                    row.id,
                    row.status,
                    row.occurrences,
                    micros_to_local_datetime(row.updated_at_us),
                    row.subject
                )?;
            }
            Ok(())
        },
    )
}
