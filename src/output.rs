use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    AggregateResult, AssetsResult, BuildResult, CheckpointResult, ClearResult, DatasetOutcome,
    FileReportResult, ProgressEvent, ProgressSink, ReportResult, SubmissionResult, UuidResult,
};
use crate::report::human_size;
use crate::checkpoint::CheckpointState;
use crate::metadata::DatasetSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => {
                tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message)
            }
            None => tracing::info!("{}", event.message),
        }
    }
}

pub struct HumanOutput;

impl HumanOutput {
    pub fn print_build(result: &BuildResult) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        for item in &result.items {
            write_outcome(&mut stdout, item)?;
        }
        Ok(())
    }

    pub fn print_submission(result: &SubmissionResult) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        if !result.ignored_data_types.is_empty() {
            writeln!(stdout, "ignored: {}", result.ignored_data_types.join(", "))?;
        }
        for item in &result.items {
            write_outcome(&mut stdout, item)?;
        }
        Ok(())
    }

    pub fn print_aggregate(result: &AggregateResult) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(
            stdout,
            "merged {} bags into {}",
            result.bags.len(),
            result.destination
        )?;
        for table in result.tables.iter().filter(|table| table.rows > 0) {
            writeln!(stdout, "  {:<32} {}", table.table, table.rows)?;
        }
        Ok(())
    }

    pub fn print_report(result: &ReportResult) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        let source = if result.loaded { "loaded" } else { "built" };
        writeln!(stdout, "{source} {} ({} rows)", result.path, result.rows)?;
        for plot in &result.plots {
            writeln!(stdout, "  {plot}")?;
        }
        Ok(())
    }

    pub fn print_file_report(result: &FileReportResult) -> io::Result<()> {
        writeln!(
            io::stdout(),
            "wrote {} ({} datasets, {} files, {})",
            result.path,
            result.rows,
            result.files,
            human_size(result.bytes)
        )
    }

    pub fn print_assets(result: &AssetsResult) -> io::Result<()> {
        writeln!(
            io::stdout(),
            "{}: {}/{} files ready, {} behind login ({})",
            result.hubmap_id,
            result.ready,
            result.files,
            result.login_required,
            result.path
        )
    }

    pub fn print_uuids(result: &UuidResult) -> io::Result<()> {
        writeln!(
            io::stdout(),
            "{}: {} local files, {} remote uuids, {} registered, {} matched",
            result.hubmap_id,
            result.local_files,
            result.remote_uuids,
            result.registered,
            result.matched
        )
    }

    pub fn print_info(summary: &DatasetSummary) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{} ({})", summary.hubmap_id, summary.dataset_uuid)?;
        writeln!(stdout, "  status     {}", summary.status)?;
        writeln!(stdout, "  data type  {}", summary.data_type)?;
        writeln!(stdout, "  group      {}", summary.group_name)?;
        writeln!(stdout, "  organ      {} ({})", summary.organ_type, summary.organ_id)?;
        writeln!(stdout, "  donor      {}", summary.donor_id)?;
        writeln!(stdout, "  protected  {}", summary.is_protected)?;
        writeln!(stdout, "  path       {}", summary.full_path)?;
        writeln!(stdout, "  bag        {}", summary.bag_name())
    }

    pub fn print_checkpoint(result: &CheckpointResult) -> io::Result<()> {
        let state = match &result.state {
            CheckpointState::Free => "free".to_string(),
            CheckpointState::Done => "done".to_string(),
            CheckpointState::Computing { lease, expired } => {
                let expired = if *expired { ", expired" } else { "" };
                match lease {
                    Some(lease) => format!(
                        "computing by {} (pid {}) until {}{expired}",
                        lease.owner, lease.pid, lease.expires_at
                    ),
                    None => format!("computing{expired}"),
                }
            }
            CheckpointState::Broken { reason } => match reason {
                Some(reason) => format!("broken: {reason}"),
                None => "broken".to_string(),
            },
        };
        writeln!(io::stdout(), "{}: {state}", result.key)
    }

    pub fn print_clear(result: &ClearResult) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        if result.removed.is_empty() {
            return writeln!(stdout, "{}: no markers", result.key);
        }
        for path in &result.removed {
            writeln!(stdout, "removed {path}")?;
        }
        Ok(())
    }
}

fn write_outcome(out: &mut impl Write, item: &DatasetOutcome) -> io::Result<()> {
    write!(out, "{:<16} {:<12}", item.hubmap_id, item.outcome.as_str())?;
    if let Some(bag) = &item.bag {
        write!(out, " {bag} ({} files)", item.files)?;
    }
    if item.unreadable > 0 {
        write!(out, " [{} unreadable]", item.unreadable)?;
    }
    if let Some(reason) = &item.reason {
        write!(out, " {reason}")?;
    }
    writeln!(out)
}
