use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{HubmapId, Instance};
use crate::error::BagsError;

pub const CONFIG_FILE: &str = "hubmapbags.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub instance: Option<Instance>,
    #[serde(default)]
    pub protected_root: Option<String>,
    #[serde(default)]
    pub public_root: Option<String>,
    #[serde(default)]
    pub work_dir: Option<String>,
    #[serde(default)]
    pub ignored_data_types: Option<Vec<String>>,
    #[serde(default)]
    pub lease_ttl_secs: Option<u64>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub datasets: Vec<DatasetEntry>,
    #[serde(default)]
    pub dbgap_studies: Vec<DbgapRule>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DatasetEntry {
    Shorthand(String),
    Detailed(DatasetEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatasetEntryObject {
    pub id: String,
    #[serde(default)]
    pub dbgap_study_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DbgapRule {
    pub study_id: String,
    #[serde(default)]
    pub hubmap_ids: Vec<String>,
    #[serde(default)]
    pub group_names: Vec<String>,
}

impl DbgapRule {
    pub fn matches(&self, hubmap_id: &HubmapId, group_name: &str, is_protected: bool) -> bool {
        if self
            .hubmap_ids
            .iter()
            .any(|id| id.trim().eq_ignore_ascii_case(hubmap_id.as_str()))
        {
            return true;
        }
        is_protected && self.group_names.iter().any(|group| group == group_name)
    }
}

#[derive(Debug, Clone)]
pub struct DatasetRequest {
    pub id: HubmapId,
    pub dbgap_study_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub instance: Instance,
    pub protected_root: Utf8PathBuf,
    pub public_root: Utf8PathBuf,
    pub work_dir: Utf8PathBuf,
    pub ignored_data_types: Vec<String>,
    pub lease_ttl: Duration,
    pub workers: usize,
    pub datasets: Vec<DatasetRequest>,
    pub dbgap_rules: Vec<DbgapRule>,
}

impl ResolvedConfig {
    pub fn is_ignored(&self, data_type: &str) -> bool {
        self.ignored_data_types
            .iter()
            .any(|ignored| ignored.eq_ignore_ascii_case(data_type))
    }

    pub fn dbgap_study_for(
        &self,
        hubmap_id: &HubmapId,
        group_name: &str,
        is_protected: bool,
    ) -> Option<String> {
        if let Some(request) = self.datasets.iter().find(|request| &request.id == hubmap_id) {
            if request.dbgap_study_id.is_some() {
                return request.dbgap_study_id.clone();
            }
        }
        self.dbgap_rules
            .iter()
            .find(|rule| rule.matches(hubmap_id, group_name, is_protected))
            .map(|rule| rule.study_id.clone())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, BagsError> {
        let config_path = match path {
            Some(path) => {
                let path = PathBuf::from(path);
                if !path.exists() {
                    return Err(BagsError::MissingConfig(path));
                }
                Some(path)
            }
            None => default_config_paths().into_iter().find(|path| path.exists()),
        };

        let Some(config_path) = config_path else {
            tracing::debug!("no config file found; using defaults");
            return Self::resolve_config(Config::default());
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| BagsError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| BagsError::ConfigParse(err.to_string()))?;
        tracing::debug!(path = %config_path.display(), "loaded config");

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, BagsError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let datasets = config
            .datasets
            .into_iter()
            .map(|entry| match entry {
                DatasetEntry::Shorthand(value) => Ok(DatasetRequest {
                    id: value.parse()?,
                    dbgap_study_id: None,
                }),
                DatasetEntry::Detailed(obj) => Ok(DatasetRequest {
                    id: obj.id.parse()?,
                    dbgap_study_id: obj.dbgap_study_id,
                }),
            })
            .collect::<Result<Vec<_>, BagsError>>()?;

        Ok(ResolvedConfig {
            schema_version,
            instance: config.instance.unwrap_or_default(),
            protected_root: Utf8PathBuf::from(
                config
                    .protected_root
                    .unwrap_or_else(|| "/hive/hubmap/data/protected".to_string()),
            ),
            public_root: Utf8PathBuf::from(
                config
                    .public_root
                    .unwrap_or_else(|| "/hive/hubmap/data/public".to_string()),
            ),
            work_dir: Utf8PathBuf::from(config.work_dir.unwrap_or_else(|| ".".to_string())),
            ignored_data_types: config
                .ignored_data_types
                .unwrap_or_else(default_ignored_data_types),
            lease_ttl: Duration::from_secs(config.lease_ttl_secs.unwrap_or(24 * 60 * 60)),
            workers: config.workers.unwrap_or(8).max(1),
            datasets,
            dbgap_rules: config.dbgap_studies,
        })
    }
}

pub fn default_ignored_data_types() -> Vec<String> {
    [
        "LC-MS",
        "LC-MS-untargeted",
        "LC-MS_bottom_up",
        "LC-MS_top_down",
        "TMT-LC-MS",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE)];
    if let Some(dirs) = BaseDirs::new() {
        paths.push(dirs.config_dir().join("hubmapbags").join(CONFIG_FILE));
    }
    paths
}
