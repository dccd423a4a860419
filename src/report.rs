use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{DatasetType, HubmapId};
use crate::error::BagsError;
use crate::formats;
use crate::inventory;
use crate::search::SearchHit;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub hubmap_id: HubmapId,
    pub uuid: String,
    pub status: String,
    pub group_name: String,
    pub data_type: String,
    pub dataset_type: String,
    pub created_datetime: String,
    pub published_datetime: String,
    pub is_protected: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub group_name: String,
    pub data_type: String,
    pub dataset_type: DatasetType,
    pub created_datetime: Option<String>,
    pub published_datetime: Option<String>,
    pub is_protected: bool,
}

pub fn report_path(dir: &Utf8Path, date: NaiveDate) -> Utf8PathBuf {
    dir.join(format!("{}.tsv", date.format("%Y%m%d")))
}

pub fn plot_paths(dir: &Utf8Path, date: NaiveDate) -> (Utf8PathBuf, Utf8PathBuf) {
    let stamp = date.format("%Y%m%d");
    (
        dir.join(format!("data-type-{stamp}.svg")),
        dir.join(format!("group-{stamp}.svg")),
    )
}

pub fn enrich_rows<F>(
    hits: &[SearchHit],
    workers: usize,
    enrich: F,
) -> Result<Vec<ReportRow>, BagsError>
where
    F: Fn(&SearchHit) -> Result<Enrichment, BagsError> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|err| BagsError::Filesystem(err.to_string()))?;

    let mut rows: Vec<ReportRow> = pool.install(|| {
        hits.par_iter()
            .map(|hit| {
                let mut row = ReportRow {
                    hubmap_id: hit.hubmap_id.clone(),
                    uuid: hit.uuid.clone(),
                    status: hit.status.as_str().to_string(),
                    group_name: hit.group_name.clone(),
                    data_type: hit.data_type.clone(),
                    dataset_type: String::new(),
                    created_datetime: String::new(),
                    published_datetime: String::new(),
                    is_protected: None,
                };
                match enrich(hit) {
                    Ok(details) => {
                        row.group_name = details.group_name;
                        row.data_type = details.data_type;
                        row.dataset_type = details.dataset_type.as_str().to_string();
                        row.created_datetime = details.created_datetime.unwrap_or_default();
                        row.published_datetime = details.published_datetime.unwrap_or_default();
                        row.is_protected = Some(details.is_protected);
                    }
                    Err(err) => {
                        tracing::warn!(
                            id = %hit.hubmap_id,
                            error = %err,
                            "unable to enrich report row"
                        );
                    }
                }
                row
            })
            .collect()
    });
    sort_rows(&mut rows);
    Ok(rows)
}

pub fn sort_rows(rows: &mut [ReportRow]) {
    rows.sort_by(|a, b| {
        b.published_datetime
            .cmp(&a.published_datetime)
            .then_with(|| a.hubmap_id.as_str().cmp(b.hubmap_id.as_str()))
    });
}

pub fn read_report(path: &Utf8Path) -> Result<Vec<ReportRow>, BagsError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path.as_std_path())?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

pub fn write_report(path: &Utf8Path, rows: &[ReportRow]) -> Result<(), BagsError> {
    write_tsv(path, rows)
}

fn write_tsv<T: Serialize>(path: &Utf8Path, rows: &[T]) -> Result<(), BagsError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let content = writer
        .into_inner()
        .map_err(|err| BagsError::Tsv(err.to_string()))?;
    Store::write_bytes_atomic(path, &content)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackedCounts {
    pub counts: BTreeMap<String, BTreeMap<String, usize>>,
}

impl StackedCounts {
    pub fn add(&mut self, category: &str, series: &str) {
        *self
            .counts
            .entry(label(category))
            .or_default()
            .entry(label(series))
            .or_default() += 1;
    }

    pub fn series(&self) -> Vec<String> {
        self.counts
            .values()
            .flat_map(|series| series.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn total(&self, category: &str) -> usize {
        self.counts
            .get(category)
            .map(|series| series.values().sum())
            .unwrap_or(0)
    }
}

pub fn counts_by_data_type(rows: &[ReportRow]) -> StackedCounts {
    let mut counts = StackedCounts::default();
    for row in rows
        .iter()
        .filter(|row| row.dataset_type == DatasetType::Primary.as_str())
    {
        counts.add(&row.status, &row.data_type);
    }
    counts
}

pub fn counts_by_group(rows: &[ReportRow]) -> StackedCounts {
    let mut counts = StackedCounts::default();
    for row in rows {
        counts.add(&row.group_name, &row.status);
    }
    counts
}

pub fn write_plots(
    dir: &Utf8Path,
    date: NaiveDate,
    rows: &[ReportRow],
) -> Result<Vec<Utf8PathBuf>, BagsError> {
    let (data_type_path, group_path) = plot_paths(dir, date);
    let stamp = date.format("%Y%m%d");
    let data_type_svg = render_svg(
        &format!("HuBMAP Data Status as of {stamp}"),
        "Status",
        "Data Type",
        &counts_by_data_type(rows),
    );
    let group_svg = render_svg(
        &format!("HuBMAP Datasets by Group as of {stamp}"),
        "Group",
        "Status",
        &counts_by_group(rows),
    );
    Store::write_bytes_atomic(&data_type_path, data_type_svg.as_bytes())?;
    Store::write_bytes_atomic(&group_path, group_svg.as_bytes())?;
    Ok(vec![data_type_path, group_path])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReportRow {
    pub hubmap_id: HubmapId,
    pub status: String,
    pub data_type: String,
    pub group_name: String,
    pub directory: String,
    pub registered_doi: String,
    pub directory_size: u64,
    pub human_directory_size: String,
    pub total_number_of_files: usize,
    pub frequency: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryStats {
    pub bytes: u64,
    pub files: usize,
    pub by_extension: BTreeMap<String, usize>,
}

pub fn file_report_path(dir: &Utf8Path, date: NaiveDate) -> Utf8PathBuf {
    dir.join(format!("file-report-{}.tsv", date.format("%Y%m%d")))
}

pub fn directory_stats(root: &Utf8Path) -> Result<DirectoryStats, BagsError> {
    let (files, errors) = inventory::scan(root)?;
    for error in &errors {
        tracing::warn!(path = %error.path, error = %error.message, "skipping unreadable entry");
    }
    let mut stats = DirectoryStats::default();
    for relative in files {
        let path = root.join(&relative);
        let size = match std::fs::metadata(path.as_std_path()) {
            Ok(meta) => meta.len(),
            Err(err) => {
                tracing::warn!(%path, error = %err, "unable to stat file");
                continue;
            }
        };
        let extension = formats::extension_of(path.file_name().unwrap_or(&relative));
        let key = if extension.is_empty() {
            "none".to_string()
        } else {
            extension
        };
        *stats.by_extension.entry(key).or_default() += 1;
        stats.files += 1;
        stats.bytes += size;
    }
    Ok(stats)
}

pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];
    if bytes == 0 {
        return "0B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{}{}", (value * 100.0).round() / 100.0, UNITS[unit])
}

pub fn file_rows<F>(
    hits: &[SearchHit],
    workers: usize,
    describe: F,
) -> Result<Vec<FileReportRow>, BagsError>
where
    F: Fn(&SearchHit) -> Result<FileReportRow, BagsError> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|err| BagsError::Filesystem(err.to_string()))?;
    let mut rows: Vec<FileReportRow> = pool.install(|| {
        hits.par_iter()
            .filter_map(|hit| match describe(hit) {
                Ok(row) => Some(row),
                Err(err) => {
                    tracing::warn!(id = %hit.hubmap_id, error = %err, "unable to size dataset");
                    None
                }
            })
            .collect()
    });
    rows.sort_by(|a, b| {
        a.data_type
            .cmp(&b.data_type)
            .then_with(|| a.hubmap_id.as_str().cmp(b.hubmap_id.as_str()))
    });
    Ok(rows)
}

pub fn file_report_row(
    hit: &SearchHit,
    directory: &Utf8Path,
    registered_doi: Option<&str>,
    stats: &DirectoryStats,
) -> Result<FileReportRow, BagsError> {
    let frequency = serde_json::to_string(&stats.by_extension)
        .map_err(|err| BagsError::Tsv(err.to_string()))?;
    Ok(FileReportRow {
        hubmap_id: hit.hubmap_id.clone(),
        status: hit.status.as_str().to_string(),
        data_type: hit.data_type.clone(),
        group_name: hit.group_name.clone(),
        directory: directory.to_string(),
        registered_doi: registered_doi.unwrap_or_default().to_string(),
        directory_size: stats.bytes,
        human_directory_size: human_size(stats.bytes),
        total_number_of_files: stats.files,
        frequency,
    })
}

pub fn write_file_report(path: &Utf8Path, rows: &[FileReportRow]) -> Result<(), BagsError> {
    write_tsv(path, rows)
}

const BAR_WIDTH: usize = 36;
const BAR_GAP: usize = 18;
const PLOT_HEIGHT: usize = 400;
const MARGIN_LEFT: usize = 60;
const MARGIN_TOP: usize = 50;
const MARGIN_BOTTOM: usize = 160;
const LEGEND_WIDTH: usize = 260;

pub fn render_svg(title: &str, x_label: &str, legend_title: &str, data: &StackedCounts) -> String {
    let series = data.series();
    let categories = data.counts.keys().collect::<Vec<_>>();
    let max = categories
        .iter()
        .map(|category| data.total(category))
        .max()
        .unwrap_or(0)
        .max(1);
    let plot_width = categories.len().max(1) * (BAR_WIDTH + BAR_GAP) + BAR_GAP;
    let legend_rows = series.len().max(1);
    let width = MARGIN_LEFT + plot_width + LEGEND_WIDTH;
    let height = (MARGIN_TOP + PLOT_HEIGHT + MARGIN_BOTTOM).max(MARGIN_TOP + legend_rows * 18 + 40);
    let baseline = MARGIN_TOP + PLOT_HEIGHT;

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" font-family="sans-serif" font-size="11">"#
    );
    let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="24" font-size="16" text-anchor="middle">{}</text>"#,
        width / 2,
        escape(title)
    );
    let _ = writeln!(
        svg,
        r#"<line x1="{MARGIN_LEFT}" y1="{baseline}" x2="{}" y2="{baseline}" stroke="black"/>"#,
        MARGIN_LEFT + plot_width
    );
    let _ = writeln!(
        svg,
        r#"<line x1="{MARGIN_LEFT}" y1="{MARGIN_TOP}" x2="{MARGIN_LEFT}" y2="{baseline}" stroke="black"/>"#
    );
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="{baseline}" text-anchor="end">0</text>"#,
        MARGIN_LEFT - 6
    );
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="{}" text-anchor="end">{max}</text>"#,
        MARGIN_LEFT - 6,
        MARGIN_TOP + 4
    );
    let _ = writeln!(
        svg,
        r#"<text x="16" y="{}" transform="rotate(-90 16 {})" text-anchor="middle">Count</text>"#,
        MARGIN_TOP + PLOT_HEIGHT / 2,
        MARGIN_TOP + PLOT_HEIGHT / 2
    );

    for (index, category) in categories.iter().enumerate() {
        let x = MARGIN_LEFT + BAR_GAP + index * (BAR_WIDTH + BAR_GAP);
        let mut top = baseline as f64;
        if let Some(stack) = data.counts.get(*category) {
            for (series_index, name) in series.iter().enumerate() {
                let Some(count) = stack.get(name) else {
                    continue;
                };
                let bar = *count as f64 / max as f64 * PLOT_HEIGHT as f64;
                top -= bar;
                let _ = writeln!(
                    svg,
                    r#"<rect x="{x}" y="{top:.1}" width="{BAR_WIDTH}" height="{bar:.1}" fill="{}"><title>{}: {count}</title></rect>"#,
                    color(series_index, series.len()),
                    escape(name)
                );
            }
        }
        let label_x = x + BAR_WIDTH / 2;
        let label_y = baseline + 12;
        let _ = writeln!(
            svg,
            r#"<text x="{label_x}" y="{label_y}" transform="rotate(45 {label_x} {label_y})">{}</text>"#,
            escape(category)
        );
    }
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="{}" text-anchor="middle">{}</text>"#,
        MARGIN_LEFT + plot_width / 2,
        height - 12,
        escape(x_label)
    );

    let legend_x = MARGIN_LEFT + plot_width + 20;
    let _ = writeln!(
        svg,
        r#"<text x="{legend_x}" y="{}" font-weight="bold">{}</text>"#,
        MARGIN_TOP,
        escape(legend_title)
    );
    for (index, name) in series.iter().enumerate() {
        let y = MARGIN_TOP + 10 + index * 18;
        let _ = writeln!(
            svg,
            r#"<rect x="{legend_x}" y="{y}" width="12" height="12" fill="{}"/><text x="{}" y="{}">{}</text>"#,
            color(index, series.len()),
            legend_x + 18,
            y + 10,
            escape(name)
        );
    }
    svg.push_str("</svg>\n");
    svg
}

fn color(index: usize, count: usize) -> String {
    let hue = index * 360 / count.max(1);
    format!("hsl({hue}, 65%, 55%)")
}

fn label(value: &str) -> String {
    if value.trim().is_empty() {
        "unknown".to_string()
    } else {
        value.to_string()
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
