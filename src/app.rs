use std::collections::HashSet;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use serde::Serialize;

use crate::assets::{self, AssetsClient};
use crate::bag::{self, TableCount};
use crate::checkpoint::{Acquire, CheckpointState, Checkpoints};
use crate::config::ResolvedConfig;
use crate::domain::{EntityKind, HubmapId};
use crate::donor::DonorMetadata;
use crate::entity::EntityClient;
use crate::error::BagsError;
use crate::formats;
use crate::inventory::{self, FileRecord, InventoryOptions};
use crate::manifest::{self, BagContext, SCHEMAS};
use crate::metadata::{DatasetRecord, DatasetSummary, Freshness, MetadataService, format_timestamp};
use crate::report::{self, Enrichment};
use crate::search::SearchClient;
use crate::store::Store;
use crate::uuid_api::{FileRegistration, REGISTER_CHUNK, UuidClient};

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub overwrite: bool,
    pub archive: bool,
    pub inventory_only: bool,
    pub refresh: bool,
    pub dbgap_study_id: Option<String>,
}

impl BuildOptions {
    fn freshness(&self) -> Freshness {
        if self.refresh {
            Freshness::Refresh
        } else {
            Freshness::Cached
        }
    }
}

#[derive(Debug, Clone)]
pub enum BuildInput {
    Id(HubmapId),
    Tsv(Utf8PathBuf),
    Configured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Built,
    Done,
    InProgress,
    Unpublished,
    Skipped,
    Failed,
    Broken,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Built => "built",
            Outcome::Done => "done",
            Outcome::InProgress => "in-progress",
            Outcome::Unpublished => "unpublished",
            Outcome::Skipped => "skipped",
            Outcome::Failed => "failed",
            Outcome::Broken => "broken",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetOutcome {
    pub hubmap_id: String,
    pub outcome: Outcome,
    pub bag: Option<String>,
    pub archive: Option<String>,
    pub files: usize,
    pub unreadable: usize,
    pub reason: Option<String>,
}

impl DatasetOutcome {
    fn new(id: &HubmapId, outcome: Outcome) -> Self {
        Self {
            hubmap_id: id.to_string(),
            outcome,
            bag: None,
            archive: None,
            files: 0,
            unreadable: 0,
            reason: None,
        }
    }

    fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub items: Vec<DatasetOutcome>,
}

impl BuildResult {
    pub fn count(&self, outcome: Outcome) -> usize {
        self.items.iter().filter(|item| item.outcome == outcome).count()
    }

    pub fn first_failure(&self) -> Option<&DatasetOutcome> {
        self.items
            .iter()
            .find(|item| matches!(item.outcome, Outcome::Failed | Outcome::Broken))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionResult {
    pub data_types: Vec<String>,
    pub ignored_data_types: Vec<String>,
    pub items: Vec<DatasetOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateResult {
    pub destination: String,
    pub bags: Vec<String>,
    pub tables: Vec<TableCount>,
}

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub date: NaiveDate,
    pub refresh: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportResult {
    pub path: String,
    pub plots: Vec<String>,
    pub rows: usize,
    pub loaded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReportResult {
    pub path: String,
    pub rows: usize,
    pub files: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetsResult {
    pub hubmap_id: String,
    pub path: String,
    pub files: usize,
    pub ready: usize,
    pub login_required: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct UuidResult {
    pub hubmap_id: String,
    pub local_files: usize,
    pub remote_uuids: usize,
    pub registered: usize,
    pub matched: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckpointResult {
    pub key: String,
    pub state: CheckpointState,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub key: String,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<E: EntityClient, S: SearchClient, U: UuidClient> {
    store: Store,
    config: ResolvedConfig,
    entity: E,
    search: S,
    uuid: U,
}

impl<E: EntityClient, S: SearchClient, U: UuidClient> App<E, S, U> {
    pub fn new(store: Store, config: ResolvedConfig, entity: E, search: S, uuid: U) -> Self {
        Self {
            store,
            config,
            entity,
            search,
            uuid,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    fn metadata(&self) -> MetadataService<'_, E> {
        MetadataService::new(&self.entity, &self.store, &self.config)
    }

    fn checkpoints(&self) -> Checkpoints {
        Checkpoints::new(self.store.checkpoint_dir(), self.config.lease_ttl)
    }

    pub fn build(
        &self,
        input: BuildInput,
        options: BuildOptions,
        sink: &dyn ProgressSink,
    ) -> Result<BuildResult, BagsError> {
        let requests: Vec<(HubmapId, Option<DatasetSummary>, Option<String>)> = match input {
            BuildInput::Id(id) => vec![(id, None, options.dbgap_study_id.clone())],
            BuildInput::Tsv(path) => read_dataset_tsv(&path)?
                .into_iter()
                .map(|summary| (summary.hubmap_id.clone(), Some(summary), None))
                .collect(),
            BuildInput::Configured => self
                .config
                .datasets
                .iter()
                .map(|request| (request.id.clone(), None, request.dbgap_study_id.clone()))
                .collect(),
        };
        if requests.is_empty() {
            return Err(BagsError::InvalidInput("no datasets to build".to_string()));
        }

        let total = requests.len();
        let mut items = Vec::with_capacity(total);
        for (index, (id, summary, dbgap)) in requests.into_iter().enumerate() {
            sink.event(ProgressEvent {
                message: format!("phase=Resolve; dataset {id} ({}/{total})", index + 1),
                elapsed: None,
            });
            let outcome = self.build_dataset(&id, summary, dbgap, &options, sink);
            tracing::info!(id = %id, outcome = outcome.outcome.as_str(), "dataset finished");
            items.push(outcome);
        }
        Ok(BuildResult { items })
    }

    pub fn build_dataset(
        &self,
        id: &HubmapId,
        summary: Option<DatasetSummary>,
        dbgap_study_id: Option<String>,
        options: &BuildOptions,
        sink: &dyn ProgressSink,
    ) -> DatasetOutcome {
        let metadata = self.metadata();
        let record = match metadata.dataset(id, options.freshness()) {
            Ok(record) => record,
            Err(err) => return failed(id, &err),
        };
        if !record.status.is_published() {
            sink.event(ProgressEvent {
                message: format!("phase=Resolve; {id} is {}, skipping", record.status),
                elapsed: None,
            });
            return DatasetOutcome::new(id, Outcome::Unpublished)
                .with_reason(format!("status is {}", record.status));
        }

        let prepared = match self.prepare(id, &record, summary, dbgap_study_id) {
            Ok(prepared) => prepared,
            Err(err) => return failed(id, &err),
        };

        // File-only runs never touch the bag or its markers.
        if options.inventory_only {
            if options.overwrite {
                let cache = self.store.inventory_path(&record.uuid);
                if let Err(err) = Store::remove_file_if_exists(&cache) {
                    return failed(id, &err);
                }
            }
            return match self.assemble(&prepared, &record, options, sink) {
                Ok(outcome) => outcome,
                Err(err) => failed(id, &err),
            };
        }

        let checkpoints = self.checkpoints();
        let key = Checkpoints::key(&prepared.summary.full_path);
        if options.overwrite {
            let cache = self.store.inventory_path(&record.uuid);
            let cleared = checkpoints
                .reset(&key)
                .and_then(|_| Store::remove_file_if_exists(&cache));
            if let Err(err) = cleared {
                return failed(id, &err);
            }
        }

        let guard = match checkpoints.acquire(&key) {
            Ok(Acquire::Acquired(guard)) => guard,
            Ok(Acquire::Done) => return DatasetOutcome::new(id, Outcome::Done),
            Ok(Acquire::Held(lease)) => {
                let holder = lease
                    .map(|lease| {
                        format!(
                            "held by {} (pid {}) until {}",
                            lease.owner, lease.pid, lease.expires_at
                        )
                    })
                    .unwrap_or_else(|| "held by another run".to_string());
                return DatasetOutcome::new(id, Outcome::InProgress).with_reason(holder);
            }
            Err(err) => return failed(id, &err),
        };

        match self.assemble(&prepared, &record, options, sink) {
            Ok(mut outcome) => match guard.complete() {
                Ok(_) => {
                    outcome.outcome = Outcome::Built;
                    outcome
                }
                Err(err) => failed(id, &err),
            },
            Err(err) => {
                tracing::error!(id = %id, error = %err, "bag build failed");
                if let Err(mark_err) = guard.fail(&err.to_string()) {
                    tracing::warn!(id = %id, error = %mark_err, "unable to mark dataset broken");
                }
                DatasetOutcome::new(id, Outcome::Broken).with_reason(err.to_string())
            }
        }
    }

    fn prepare(
        &self,
        id: &HubmapId,
        record: &DatasetRecord,
        summary: Option<DatasetSummary>,
        dbgap_study_id: Option<String>,
    ) -> Result<Prepared, BagsError> {
        let metadata = self.metadata();
        let summary = match summary {
            Some(summary) => summary,
            None => metadata.summary(id, Freshness::Cached)?,
        };
        formats::anatomy(&summary.organ_type)?;

        let dataset_url = metadata.entity_url(EntityKind::Dataset, id)?;
        let sample_id: HubmapId = summary.first_sample_id.parse()?;
        let sample_url = metadata.entity_url(EntityKind::Sample, &sample_id)?;
        let donor_id: HubmapId = summary.donor_id.parse()?;
        let donor = metadata.donor(&donor_id)?;
        let dbgap_study_id = dbgap_study_id.or_else(|| {
            self.config
                .dbgap_study_for(id, &record.group_name, record.is_protected)
        });

        Ok(Prepared {
            summary,
            dataset_url,
            sample_url,
            donor,
            dbgap_study_id,
        })
    }

    fn assemble(
        &self,
        prepared: &Prepared,
        record: &DatasetRecord,
        options: &BuildOptions,
        sink: &dyn ProgressSink,
    ) -> Result<DatasetOutcome, BagsError> {
        let start = Instant::now();
        let summary = &prepared.summary;
        let name = summary.bag_name();

        let mut inventory = inventory::build_inventory(
            &summary.data_directory(),
            Some(&self.store.inventory_path(&summary.dataset_uuid)),
            InventoryOptions {
                threads: self.config.workers,
                ..InventoryOptions::default()
            },
            sink,
        )?;
        match self.uuid.file_uuids(&summary.hubmap_id) {
            Ok(uuids) => {
                let matched = inventory::attach_file_uuids(&mut inventory.records, &uuids);
                tracing::debug!(id = %summary.hubmap_id, matched, "attached file uuids");
            }
            Err(err) => {
                tracing::warn!(
                    id = %summary.hubmap_id,
                    error = %err,
                    "file uuids unavailable; using paths"
                );
            }
        }

        let ctx = BagContext {
            summary,
            dataset: record,
            dataset_url: &prepared.dataset_url,
            sample_url: &prepared.sample_url,
            donor: &prepared.donor,
            files: &inventory.records,
            dbgap_study_id: prepared.dbgap_study_id.as_deref(),
        };
        if options.inventory_only {
            let dir = self.store.inventory_dir(&name);
            Store::reset_dir(&dir)?;
            for table in manifest::inventory_tables(&ctx)? {
                manifest::write_table(&dir, &table)?;
            }
            return Ok(DatasetOutcome {
                hubmap_id: summary.hubmap_id.to_string(),
                outcome: Outcome::Built,
                bag: Some(dir.to_string()),
                archive: None,
                files: inventory.records.len(),
                unreadable: inventory.errors.len(),
                reason: None,
            });
        }

        let tables = manifest::bag_tables(&ctx)?;
        let staging = self.store.staging_dir(&name);
        Store::reset_dir(&staging)?;
        sink.event(ProgressEvent {
            message: format!("phase=Manifest; writing {} tables", tables.len()),
            elapsed: Some(start.elapsed()),
        });
        for table in &tables {
            manifest::write_table(&staging, table)?;
        }

        let expected = SCHEMAS.len();
        let written = manifest::count_tables(&staging)?;
        if written != expected {
            return Err(BagsError::Broken {
                id: summary.hubmap_id.to_string(),
                reason: format!("expected {expected} manifests, found {written}"),
            });
        }

        let bag_dir = self.store.publish_bag(&staging, &name)?;
        let archive = if options.archive {
            sink.event(ProgressEvent {
                message: format!("phase=Archive; zipping {name}"),
                elapsed: Some(start.elapsed()),
            });
            let zip_path = bag::archive_bag(&bag_dir)?;
            bag::validate_archive(&zip_path)?;
            Some(zip_path.to_string())
        } else {
            bag::remove_archive(&bag_dir)?;
            None
        };

        Ok(DatasetOutcome {
            hubmap_id: summary.hubmap_id.to_string(),
            outcome: Outcome::Built,
            bag: Some(bag_dir.to_string()),
            archive,
            files: inventory.records.len(),
            unreadable: inventory.errors.len(),
            reason: None,
        })
    }

    pub fn submission(
        &self,
        options: BuildOptions,
        sink: &dyn ProgressSink,
    ) -> Result<SubmissionResult, BagsError> {
        sink.event(ProgressEvent {
            message: "phase=Resolve; listing data types".to_string(),
            elapsed: None,
        });
        let data_types = self.search.assay_types()?;
        let (ignored, selected): (Vec<String>, Vec<String>) = data_types
            .iter()
            .cloned()
            .partition(|data_type| self.config.is_ignored(data_type));

        let metadata = self.metadata();
        let mut items = Vec::new();
        for data_type in &selected {
            let hits = self.search.datasets_by_data_type(data_type)?;
            sink.event(ProgressEvent {
                message: format!("phase=Resolve; {data_type}: {} datasets", hits.len()),
                elapsed: None,
            });
            for hit in hits {
                let id = hit.hubmap_id.clone();
                if !hit.status.is_published() {
                    items.push(
                        DatasetOutcome::new(&id, Outcome::Unpublished)
                            .with_reason(format!("status is {}", hit.status)),
                    );
                    continue;
                }
                match metadata.is_primary(&id) {
                    Ok(true) => {}
                    Ok(false) => {
                        let outcome = DatasetOutcome::new(&id, Outcome::Skipped);
                        items.push(outcome.with_reason("derived dataset"));
                        continue;
                    }
                    Err(err) => {
                        items.push(failed(&id, &err));
                        continue;
                    }
                }
                let dbgap = match metadata.is_protected(&id) {
                    Ok(protected) => self.config.dbgap_study_for(&id, &hit.group_name, protected),
                    Err(err) => {
                        items.push(failed(&id, &err));
                        continue;
                    }
                };
                let outcome = self.build_dataset(&id, None, dbgap, &options, sink);
                tracing::info!(id = %id, outcome = outcome.outcome.as_str(), "dataset finished");
                items.push(outcome);
            }
        }

        Ok(SubmissionResult {
            data_types: selected,
            ignored_data_types: ignored,
            items,
        })
    }

    pub fn aggregate(&self, sink: &dyn ProgressSink) -> Result<AggregateResult, BagsError> {
        let bags = self.store.list_bags()?;
        sink.event(ProgressEvent {
            message: format!("phase=Aggregate; merging {} bags", bags.len()),
            elapsed: None,
        });
        let destination = self.store.submission_dir();
        let tables = bag::aggregate_bags(&bags, &destination)?;
        Ok(AggregateResult {
            destination: destination.to_string(),
            bags: bags.iter().map(|bag| bag.to_string()).collect(),
            tables,
        })
    }

    pub fn report(
        &self,
        options: ReportOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ReportResult, BagsError> {
        let start = Instant::now();
        let dir = self.store.reports_dir();
        let path = report::report_path(&dir, options.date);
        let loaded = !options.refresh && path.as_std_path().exists();

        let rows = if loaded {
            sink.event(ProgressEvent {
                message: format!("phase=Report; loading {path}"),
                elapsed: None,
            });
            report::read_report(&path)?
        } else {
            let mut hits = Vec::new();
            for data_type in self.search.assay_types()? {
                hits.extend(self.search.datasets_by_data_type(&data_type)?);
            }
            sink.event(ProgressEvent {
                message: format!("phase=Report; enriching {} datasets", hits.len()),
                elapsed: Some(start.elapsed()),
            });
            let metadata = self.metadata();
            let rows = report::enrich_rows(&hits, self.config.workers, |hit| {
                let record = metadata.dataset(&hit.hubmap_id, Freshness::Cached)?;
                let dataset_type = metadata.dataset_type(&hit.hubmap_id)?;
                Ok(Enrichment {
                    group_name: record.group_name,
                    data_type: record.data_type,
                    dataset_type,
                    created_datetime: record.created_timestamp.and_then(format_timestamp),
                    published_datetime: record.published_timestamp.and_then(format_timestamp),
                    is_protected: record.is_protected,
                })
            })?;
            report::write_report(&path, &rows)?;
            rows
        };

        let plots = report::write_plots(&dir, options.date, &rows)?;
        sink.event(ProgressEvent {
            message: format!("phase=Report; {} rows", rows.len()),
            elapsed: Some(start.elapsed()),
        });
        Ok(ReportResult {
            path: path.to_string(),
            plots: plots.iter().map(|plot| plot.to_string()).collect(),
            rows: rows.len(),
            loaded,
        })
    }

    pub fn file_report(
        &self,
        date: NaiveDate,
        sink: &dyn ProgressSink,
    ) -> Result<FileReportResult, BagsError> {
        let start = Instant::now();
        let mut seen = HashSet::new();
        let mut hits = Vec::new();
        for data_type in self.search.assay_types()? {
            hits.extend(
                self.search
                    .datasets_by_data_type(&data_type)?
                    .into_iter()
                    .filter(|hit| hit.status.is_published())
                    .filter(|hit| seen.insert(hit.hubmap_id.clone())),
            );
        }
        sink.event(ProgressEvent {
            message: format!("phase=Report; sizing {} published datasets", hits.len()),
            elapsed: Some(start.elapsed()),
        });

        let metadata = self.metadata();
        let rows = report::file_rows(&hits, self.config.workers, |hit| {
            let summary = metadata.summary(&hit.hubmap_id, Freshness::Cached)?;
            let record = metadata.dataset(&hit.hubmap_id, Freshness::Cached)?;
            let directory = summary.data_directory();
            let stats = report::directory_stats(&directory)?;
            report::file_report_row(hit, &directory, record.registered_doi.as_deref(), &stats)
        })?;
        let path = report::file_report_path(&self.store.reports_dir(), date);
        report::write_file_report(&path, &rows)?;

        Ok(FileReportResult {
            path: path.to_string(),
            rows: rows.len(),
            files: rows.iter().map(|row| row.total_number_of_files).sum(),
            bytes: rows.iter().map(|row| row.directory_size).sum(),
        })
    }

    /// HEAD-checks the assets server for every file the uuid-api knows of.
    /// Results accumulate in `.assets/<dataset_uuid>.tsv`; ready files are
    /// not checked again.
    pub fn check_assets(
        &self,
        id: &HubmapId,
        client: &dyn AssetsClient,
        sink: &dyn ProgressSink,
    ) -> Result<AssetsResult, BagsError> {
        let summary = self.metadata().summary(id, Freshness::Cached)?;
        let files = self.uuid.file_uuids(id)?;
        let path = self.store.assets_path(&summary.dataset_uuid);
        let previous = assets::read_checks(&path)?;
        sink.event(ProgressEvent {
            message: format!("phase=Assets; {} files for {id}", files.len()),
            elapsed: None,
        });

        let checks = assets::check_assets(client, &summary.dataset_uuid, &files, &previous, sink);
        assets::write_checks(&path, &checks)?;
        Ok(AssetsResult {
            hubmap_id: id.to_string(),
            path: path.to_string(),
            files: checks.len(),
            ready: checks.iter().filter(|check| check.ready).count(),
            login_required: checks.iter().filter(|check| check.login_required).count(),
        })
    }

    pub fn info(&self, id: &HubmapId, refresh: bool) -> Result<DatasetSummary, BagsError> {
        let freshness = if refresh {
            Freshness::Refresh
        } else {
            Freshness::Cached
        };
        self.metadata().summary(id, freshness)
    }

    /// Attaches uuid-api file UUIDs to the cached inventory. With `generate`,
    /// UUIDs are minted when the service has none for this dataset.
    pub fn populate_uuids(
        &self,
        id: &HubmapId,
        generate: bool,
        sink: &dyn ProgressSink,
    ) -> Result<UuidResult, BagsError> {
        let summary = self.metadata().summary(id, Freshness::Cached)?;
        let cache = self.store.inventory_path(&summary.dataset_uuid);
        let mut records = inventory::read_inventory(&cache)?;
        if records.is_empty() {
            records = inventory::build_inventory(
                &summary.data_directory(),
                Some(&cache),
                InventoryOptions {
                    threads: self.config.workers,
                    ..InventoryOptions::default()
                },
                sink,
            )?
            .records;
        }

        let mut uuids = self.uuid.file_uuids(id)?;
        let remote = uuids.len();
        let mut registered = 0;
        if generate {
            if should_generate(records.len(), remote) {
                for chunk in registrations(&records).chunks(REGISTER_CHUNK) {
                    sink.event(ProgressEvent {
                        message: format!("phase=Register; {} files", chunk.len()),
                        elapsed: None,
                    });
                    let minted = self.uuid.register_files(&summary.dataset_uuid, chunk)?;
                    registered += minted.len();
                    uuids.extend(minted);
                }
            } else if remote != records.len() {
                tracing::warn!(
                    id = %id,
                    local = records.len(),
                    remote,
                    "local and remote file counts differ; not generating uuids"
                );
            }
        }

        let matched = inventory::attach_file_uuids(&mut records, &uuids);
        inventory::write_inventory(&cache, &records)?;
        Ok(UuidResult {
            hubmap_id: id.to_string(),
            local_files: records.len(),
            remote_uuids: remote,
            registered,
            matched,
        })
    }

    pub fn checkpoint_status(&self, target: &str) -> Result<CheckpointResult, BagsError> {
        let key = self.checkpoint_key(target)?;
        let state = self.checkpoints().state(&key)?;
        Ok(CheckpointResult { key, state })
    }

    pub fn checkpoint_clear(&self, target: &str) -> Result<ClearResult, BagsError> {
        let key = self.checkpoint_key(target)?;
        let removed = self.checkpoints().clear(&key)?;
        Ok(ClearResult {
            key,
            removed: removed.iter().map(|path| path.to_string()).collect(),
        })
    }

    fn checkpoint_key(&self, target: &str) -> Result<String, BagsError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(BagsError::InvalidInput("empty checkpoint target".to_string()));
        }
        match target.parse::<HubmapId>() {
            Ok(id) => {
                let summary = self.metadata().summary(&id, Freshness::Cached)?;
                Ok(Checkpoints::key(&summary.full_path))
            }
            Err(_) => Ok(Checkpoints::key(target)),
        }
    }
}

struct Prepared {
    summary: DatasetSummary,
    dataset_url: String,
    sample_url: String,
    donor: DonorMetadata,
    dbgap_study_id: Option<String>,
}

fn failed(id: &HubmapId, err: &BagsError) -> DatasetOutcome {
    tracing::warn!(id = %id, error = %err, "dataset failed");
    DatasetOutcome::new(id, Outcome::Failed).with_reason(err.to_string())
}

pub fn should_generate(local: usize, remote: usize) -> bool {
    local > 0 && remote == 0
}

fn registrations(records: &[FileRecord]) -> Vec<FileRegistration> {
    records
        .iter()
        .filter(|record| record.file_uuid.is_none())
        .map(|record| FileRegistration {
            path: record.relative_path.clone(),
            size: record.size,
            checksum: record.sha256.clone(),
        })
        .collect()
}

pub fn read_dataset_tsv(path: &Utf8Path) -> Result<Vec<DatasetSummary>, BagsError> {
    if !path.as_std_path().is_file() {
        return Err(BagsError::InvalidInput(format!("no such file: {path}")));
    }
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path.as_std_path())
        .map_err(|err| BagsError::InvalidInput(format!("{path}: {err}")))?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row.map_err(|err| BagsError::InvalidInput(format!("{path}: {err}")))?);
    }
    Ok(rows)
}
