use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use serde_json::{Value, json};

use hubmap_bags::app::{App, BuildInput, BuildOptions, Outcome, ReportOptions};
use hubmap_bags::assets::{AssetsClient, read_checks};
use hubmap_bags::checkpoint::{Acquire, CheckpointState, Checkpoints, Marker};
use hubmap_bags::config::{Config, ConfigLoader};
use hubmap_bags::domain::{DatasetStatus, HubmapId};
use hubmap_bags::domain::Instance;
use hubmap_bags::entity::{EntityClient, EntityHttpClient};
use hubmap_bags::http::HeadResponse;
use hubmap_bags::error::BagsError;
use hubmap_bags::manifest::{self, SCHEMAS};
use hubmap_bags::output::JsonOutput;
use hubmap_bags::search::{SearchClient, SearchHit, SearchHttpClient};
use hubmap_bags::store::Store;
use hubmap_bags::uuid_api::{FileRegistration, FileUuid, UuidClient, UuidHttpClient};

const DATASET: &str = "HBM123.ABCD.456";
const SAMPLE: &str = "HBM222.BBBB.222";
const DONOR: &str = "HBM444.DDDD.444";

struct MockEntity {
    records: HashMap<String, Value>,
    organ: String,
}

impl MockEntity {
    fn new(status: &str, organ: &str) -> Self {
        let mut records = HashMap::new();
        records.insert(
            DATASET.to_string(),
            json!({
                "hubmap_id": DATASET,
                "uuid": "d1",
                "status": status,
                "data_types": ["CODEX"],
                "group_name": "Stanford TMC",
                "group_uuid": "g1",
                "direct_ancestors": [{ "hubmap_id": SAMPLE, "uuid": "s1" }],
                "contains_human_genetic_sequences": false,
                "created_timestamp": 1_590_000_000_000_i64,
                "published_timestamp": 1_600_000_000_000_i64,
                "description": "CODEX imaging of spleen"
            }),
        );
        records.insert(
            SAMPLE.to_string(),
            json!({ "hubmap_id": SAMPLE, "uuid": "s1" }),
        );
        records.insert(
            DONOR.to_string(),
            json!({
                "hubmap_id": DONOR,
                "uuid": "u4",
                "metadata": {
                    "organ_donor_data": [
                        { "grouping_concept_preferred_term": "Sex", "preferred_term": "Male" },
                        { "grouping_concept_preferred_term": "Race", "preferred_term": "White" },
                        { "grouping_concept_preferred_term": "Age", "preferred_term": "Age", "data_value": "61" }
                    ]
                }
            }),
        );
        Self {
            records,
            organ: organ.to_string(),
        }
    }
}

impl EntityClient for MockEntity {
    fn entity(&self, id: &HubmapId) -> Result<Value, BagsError> {
        self.records
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| BagsError::NotFound {
                service: "entity-api",
                id: id.to_string(),
            })
    }

    fn ancestors(&self, _id: &HubmapId) -> Result<Value, BagsError> {
        Ok(json!([{ "entity_type": "Sample", "hubmap_id": SAMPLE }]))
    }

    fn provenance(&self, _id: &HubmapId) -> Result<Value, BagsError> {
        Ok(json!({
            "organ_type": [self.organ],
            "organ_hubmap_id": ["HBM333.CCCC.333"],
            "organ_uuid": ["o1"],
            "donor_hubmap_id": [DONOR],
            "donor_uuid": ["u4"]
        }))
    }
}

#[derive(Default)]
struct MockSearch;

impl SearchClient for MockSearch {
    fn assay_types(&self) -> Result<Vec<String>, BagsError> {
        Ok(vec!["CODEX".to_string(), "LC-MS".to_string()])
    }

    fn datasets_by_data_type(&self, data_type: &str) -> Result<Vec<SearchHit>, BagsError> {
        if data_type != "CODEX" {
            return Ok(Vec::new());
        }
        Ok(vec![
            SearchHit {
                hubmap_id: DATASET.parse().unwrap(),
                uuid: "d1".to_string(),
                status: DatasetStatus::Published,
                data_type: "CODEX".to_string(),
                group_name: "Stanford TMC".to_string(),
            },
            SearchHit {
                hubmap_id: "HBM999.ZZZZ.999".parse().unwrap(),
                uuid: "d9".to_string(),
                status: DatasetStatus::Qa,
                data_type: "CODEX".to_string(),
                group_name: "Stanford TMC".to_string(),
            },
        ])
    }
}

#[derive(Default)]
struct MockUuid {
    known: Mutex<Vec<FileUuid>>,
}

impl UuidClient for MockUuid {
    fn file_uuids(&self, _id: &HubmapId) -> Result<Vec<FileUuid>, BagsError> {
        Ok(self.known.lock().unwrap().clone())
    }

    fn register_files(
        &self,
        _dataset_uuid: &str,
        files: &[FileRegistration],
    ) -> Result<Vec<FileUuid>, BagsError> {
        Ok(files
            .iter()
            .enumerate()
            .map(|(index, file)| FileUuid {
                file_uuid: format!("f{index}"),
                path: file.path.clone(),
            })
            .collect())
    }
}

struct Fixture {
    _temp: tempfile::TempDir,
    root: Utf8PathBuf,
    data_dir: Utf8PathBuf,
}

fn fixture() -> Fixture {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let data_dir = root.join("public").join("d1");
    fs::create_dir_all(data_dir.join("raw").as_std_path()).unwrap();
    fs::write(data_dir.join("metadata.tsv").as_std_path(), "a\tb\n").unwrap();
    fs::write(data_dir.join("raw/cycle 1.ome.tiff").as_std_path(), b"tiff").unwrap();
    fs::write(data_dir.join("raw/reads.fastq.gz").as_std_path(), b"reads").unwrap();
    Fixture {
        _temp: temp,
        root,
        data_dir,
    }
}

fn app(fixture: &Fixture, entity: MockEntity) -> App<MockEntity, MockSearch, MockUuid> {
    app_with_uuids(fixture, entity, MockUuid::default())
}

fn app_with_uuids(
    fixture: &Fixture,
    entity: MockEntity,
    uuid: MockUuid,
) -> App<MockEntity, MockSearch, MockUuid> {
    let config = ConfigLoader::resolve_config(Config {
        public_root: Some(fixture.root.join("public").to_string()),
        protected_root: Some(fixture.root.join("protected").to_string()),
        work_dir: Some(fixture.root.join("work").to_string()),
        workers: Some(2),
        ..Config::default()
    })
    .unwrap();
    let store = Store::new(fixture.root.join("work"));
    App::new(store, config, entity, MockSearch::default(), uuid)
}

fn build_one(app: &App<MockEntity, MockSearch, MockUuid>) -> hubmap_bags::app::DatasetOutcome {
    let result = app
        .build(
            BuildInput::Id(DATASET.parse().unwrap()),
            BuildOptions::default(),
            &JsonOutput,
        )
        .unwrap();
    assert_eq!(result.items.len(), 1);
    result.items.into_iter().next().unwrap()
}

#[test]
fn build_writes_every_manifest_and_marks_done() {
    let fixture = fixture();
    let app = app(&fixture, MockEntity::new("Published", "Spleen"));

    let outcome = build_one(&app);
    assert_eq!(outcome.outcome, Outcome::Built, "{:?}", outcome.reason);
    assert_eq!(outcome.files, 3);

    let bag = app.store().bag_dir("codex-published-d1");
    assert_eq!(manifest::count_tables(&bag).unwrap(), SCHEMAS.len());
    let (header, rows) = manifest::read_table(&bag.join("file.tsv")).unwrap();
    assert_eq!(header.len(), 20);
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().any(|row| row[10] == "cycle%201.ome.tiff"));
    let (_, subjects) = manifest::read_table(&bag.join("subject.tsv")).unwrap();
    assert_eq!(subjects[0][7], "cfde_subject_sex:2");
    assert_eq!(subjects[0][9], "61");

    let key = Checkpoints::key(fixture.data_dir.as_str());
    let checkpoints = Checkpoints::new(app.store().checkpoint_dir(), Duration::from_secs(60));
    assert!(checkpoints.marker_path(&key, Marker::Done).exists());
    assert!(!checkpoints.marker_path(&key, Marker::Computing).exists());
}

#[test]
fn second_build_is_a_no_op() {
    let fixture = fixture();
    let app = app(&fixture, MockEntity::new("Published", "Spleen"));
    assert_eq!(build_one(&app).outcome, Outcome::Built);

    let file_tsv = app.store().bag_dir("codex-published-d1").join("file.tsv");
    let before = fs::metadata(file_tsv.as_std_path()).unwrap().modified().unwrap();
    let outcome = build_one(&app);
    assert_eq!(outcome.outcome, Outcome::Done);
    let after = fs::metadata(file_tsv.as_std_path()).unwrap().modified().unwrap();
    assert_eq!(before, after);
}

#[test]
fn unpublished_dataset_is_skipped() {
    let fixture = fixture();
    let app = app(&fixture, MockEntity::new("QA", "Spleen"));
    let outcome = build_one(&app);
    assert_eq!(outcome.outcome, Outcome::Unpublished);
    assert!(!app.store().bags_dir().exists());
    assert!(!app.store().checkpoint_dir().exists());
}

#[test]
fn unknown_organ_fails_without_markers() {
    let fixture = fixture();
    let app = app(&fixture, MockEntity::new("Published", "Appendix"));
    let outcome = build_one(&app);
    assert_eq!(outcome.outcome, Outcome::Failed);
    assert!(outcome.reason.unwrap().contains("Appendix"));
}

#[test]
fn live_lease_reports_in_progress() {
    let fixture = fixture();
    let app = app(&fixture, MockEntity::new("Published", "Spleen"));
    let checkpoints = Checkpoints::new(app.store().checkpoint_dir(), Duration::from_secs(3600));
    let held = checkpoints
        .acquire(&Checkpoints::key(fixture.data_dir.as_str()))
        .unwrap();
    assert_matches!(held, Acquire::Acquired(_));

    assert_eq!(build_one(&app).outcome, Outcome::InProgress);
    drop(held);
    assert_eq!(build_one(&app).outcome, Outcome::Built);
}

#[test]
fn inventory_only_writes_file_manifest() {
    let fixture = fixture();
    let app = app(&fixture, MockEntity::new("Published", "Spleen"));
    let result = app
        .build(
            BuildInput::Id(DATASET.parse().unwrap()),
            BuildOptions {
                inventory_only: true,
                ..BuildOptions::default()
            },
            &JsonOutput,
        )
        .unwrap();
    assert_eq!(result.items[0].outcome, Outcome::Built);
    let dir = app.store().inventory_dir("codex-published-d1");
    assert_eq!(manifest::count_tables(&dir).unwrap(), 1);
    assert!(app.store().inventory_path("d1").exists());
    assert!(!app.store().bag_dir("codex-published-d1").exists());
    let status = app.checkpoint_status(DATASET).unwrap();
    assert_matches!(status.state, CheckpointState::Free);
}

#[test]
fn archive_is_written_and_valid() {
    let fixture = fixture();
    let app = app(&fixture, MockEntity::new("Published", "Spleen"));
    let result = app
        .build(
            BuildInput::Id(DATASET.parse().unwrap()),
            BuildOptions {
                archive: true,
                ..BuildOptions::default()
            },
            &JsonOutput,
        )
        .unwrap();
    let archive = result.items[0].archive.clone().unwrap();
    assert!(archive.ends_with("codex-published-d1.zip"));
    assert_eq!(
        hubmap_bags::bag::validate_archive(Utf8Path::new(&archive)).unwrap(),
        SCHEMAS.len()
    );
}

#[test]
fn submission_builds_published_primary_datasets() {
    let fixture = fixture();
    let app = app(&fixture, MockEntity::new("Published", "Spleen"));
    let result = app.submission(BuildOptions::default(), &JsonOutput).unwrap();
    assert_eq!(result.ignored_data_types, ["LC-MS"]);
    assert_eq!(result.items.len(), 2);
    assert_eq!(result.items[0].outcome, Outcome::Built);
    assert_eq!(result.items[1].outcome, Outcome::Unpublished);
}

#[test]
fn aggregate_merges_built_bags() {
    let fixture = fixture();
    let app = app(&fixture, MockEntity::new("Published", "Spleen"));
    build_one(&app);
    let result = app.aggregate(&JsonOutput).unwrap();
    assert_eq!(result.bags.len(), 1);
    let files = result.tables.iter().find(|count| count.table == "file").unwrap();
    assert_eq!(files.rows, 3);
    assert!(app.store().submission_dir().join("dcc.tsv").exists());
}

#[test]
fn checkpoints_can_be_inspected_and_cleared() {
    let fixture = fixture();
    let app = app(&fixture, MockEntity::new("Published", "Spleen"));
    build_one(&app);

    let status = app.checkpoint_status(fixture.data_dir.as_str()).unwrap();
    assert_eq!(status.state, CheckpointState::Done);
    let by_id = app.checkpoint_status(DATASET).unwrap();
    assert_eq!(by_id.key, status.key);

    let cleared = app.checkpoint_clear(DATASET).unwrap();
    assert_eq!(cleared.removed.len(), 1);
    assert_eq!(
        app.checkpoint_status(DATASET).unwrap().state,
        CheckpointState::Free
    );
}

#[test]
fn uuids_are_minted_for_unregistered_datasets() {
    let fixture = fixture();
    let app = app(&fixture, MockEntity::new("Published", "Spleen"));
    let id: HubmapId = DATASET.parse().unwrap();
    let result = app.populate_uuids(&id, true, &JsonOutput).unwrap();
    assert_eq!(result.local_files, 3);
    assert_eq!(result.remote_uuids, 0);
    assert_eq!(result.registered, 3);
    assert_eq!(result.matched, 3);

    let cache = app.store().inventory_path("d1");
    let records = hubmap_bags::inventory::read_inventory(&cache).unwrap();
    assert!(records.iter().all(|record| record.file_uuid.is_some()));
}

#[test]
fn report_is_built_once_per_day() {
    let fixture = fixture();
    let app = app(&fixture, MockEntity::new("Published", "Spleen"));
    let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

    let first = app
        .report(ReportOptions { date, refresh: false }, &JsonOutput)
        .unwrap();
    assert!(!first.loaded);
    assert_eq!(first.rows, 2);
    assert_eq!(first.plots.len(), 2);
    assert!(first.path.ends_with("daily-report/20240501.tsv"));

    let second = app
        .report(ReportOptions { date, refresh: false }, &JsonOutput)
        .unwrap();
    assert!(second.loaded);
    assert_eq!(second.rows, 2);
}

#[test]
fn info_is_served_from_cache() {
    let fixture = fixture();
    let app = app(&fixture, MockEntity::new("Published", "Spleen"));
    let id: HubmapId = DATASET.parse().unwrap();

    let summary = app.info(&id, false).unwrap();
    assert_eq!(summary.full_path, fixture.data_dir.as_str());
    assert_eq!(summary.bag_name(), "codex-published-d1");
    let _ = app.info(&id, false).unwrap();
    assert!(app.store().cache_path(hubmap_bags::store::CacheKind::Datasets, DATASET).exists());
}

struct MockAssets;

impl AssetsClient for MockAssets {
    fn head(&self, _dataset_uuid: &str, path: &str) -> Result<HeadResponse, BagsError> {
        let status = if path.ends_with(".tsv") { 200 } else { 404 };
        Ok(HeadResponse {
            status,
            final_url: self.url("d1", path),
        })
    }

    fn url(&self, dataset_uuid: &str, path: &str) -> String {
        format!("https://assets.example.org/{dataset_uuid}/{path}")
    }
}

#[test]
fn assets_are_checked_for_registered_files() {
    let fixture = fixture();
    let uuids = MockUuid {
        known: Mutex::new(vec![
            FileUuid {
                file_uuid: "f1".to_string(),
                path: "metadata.tsv".to_string(),
            },
            FileUuid {
                file_uuid: "f2".to_string(),
                path: "raw/reads.fastq.gz".to_string(),
            },
        ]),
    };
    let app = app_with_uuids(&fixture, MockEntity::new("Published", "Spleen"), uuids);
    let id: HubmapId = DATASET.parse().unwrap();

    let result = app.check_assets(&id, &MockAssets, &JsonOutput).unwrap();
    assert_eq!(result.files, 2);
    assert_eq!(result.ready, 1);
    assert_eq!(result.login_required, 0);

    let checks = read_checks(Utf8Path::new(&result.path)).unwrap();
    assert_eq!(checks[1].status_code, 404);
    assert!(result.path.ends_with(".assets/d1.tsv"));
}

#[test]
fn file_report_sizes_published_datasets() {
    let fixture = fixture();
    let app = app(&fixture, MockEntity::new("Published", "Spleen"));
    let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

    let result = app.file_report(date, &JsonOutput).unwrap();
    assert_eq!(result.rows, 1);
    assert_eq!(result.files, 3);
    assert_eq!(result.bytes, 4 + 4 + 5);
    assert!(result.path.ends_with("daily-report/file-report-20240501.tsv"));

    let content = fs::read_to_string(&result.path).unwrap();
    assert!(content.starts_with("hubmap_id\tstatus\tdata_type"));
    assert!(content.contains(r#"{".gz":1,".ome.tiff":1,".tsv":1}"#));
}

#[test]
fn offline_commands_need_no_token() {
    let fixture = fixture();
    let config = ConfigLoader::resolve_config(Config {
        work_dir: Some(fixture.root.join("work").to_string()),
        ..Config::default()
    })
    .unwrap();
    let app = App::new(
        Store::new(fixture.root.join("work")),
        config,
        EntityHttpClient::new(Instance::Prod, "").unwrap(),
        SearchHttpClient::new(Instance::Prod, "").unwrap(),
        UuidHttpClient::new(Instance::Prod, "").unwrap(),
    );

    assert!(app.aggregate(&JsonOutput).unwrap().bags.is_empty());
    let status = app.checkpoint_status(fixture.data_dir.as_str()).unwrap();
    assert_matches!(status.state, CheckpointState::Free);
    assert_matches!(
        app.info(&DATASET.parse().unwrap(), false),
        Err(BagsError::MissingToken)
    );
}
