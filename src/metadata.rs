use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::ResolvedConfig;
use crate::domain::{DatasetStatus, DatasetType, EntityKind, HubmapId};
use crate::donor::DonorMetadata;
use crate::entity::EntityClient;
use crate::error::BagsError;
use crate::search::first_data_type;
use crate::store::{CacheKind, Store};

pub const PORTAL_BASE: &str = "https://portal.hubmapconsortium.org/browse";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Cached,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRef {
    pub hubmap_id: HubmapId,
    pub uuid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetRecord {
    pub hubmap_id: HubmapId,
    pub uuid: String,
    pub status: DatasetStatus,
    pub data_type: String,
    pub group_name: String,
    pub group_uuid: Option<String>,
    pub first_sample: Option<EntityRef>,
    pub is_protected: bool,
    pub created_timestamp: Option<i64>,
    pub published_timestamp: Option<i64>,
    pub description: Option<String>,
    pub registered_doi: Option<String>,
}

impl DatasetRecord {
    pub fn from_json(record: &Value) -> Result<Self, BagsError> {
        let hubmap_id: HubmapId = required_str(record, "hubmap_id", "dataset")?.parse()?;
        let id = hubmap_id.as_str();
        let first_sample = record
            .get("direct_ancestors")
            .and_then(Value::as_array)
            .and_then(|ancestors| ancestors.first())
            .and_then(|sample| {
                let hubmap_id = sample.get("hubmap_id")?.as_str()?.parse().ok()?;
                let uuid = sample.get("uuid")?.as_str()?.to_string();
                Some(EntityRef { hubmap_id, uuid })
            });

        Ok(Self {
            uuid: required_str(record, "uuid", id)?,
            status: DatasetStatus::from(required_str(record, "status", id)?.as_str()),
            data_type: first_data_type(record).ok_or_else(|| BagsError::MissingField {
                id: id.to_string(),
                field: "data_types".to_string(),
            })?,
            group_name: required_str(record, "group_name", id)?,
            group_uuid: optional_str(record, "group_uuid"),
            first_sample,
            // Only an explicit `false` makes a dataset public.
            is_protected: record
                .get("contains_human_genetic_sequences")
                .and_then(Value::as_bool)
                != Some(false),
            created_timestamp: record.get("created_timestamp").and_then(Value::as_i64),
            published_timestamp: record.get("published_timestamp").and_then(Value::as_i64),
            description: optional_str(record, "description"),
            registered_doi: optional_str(record, "registered_doi"),
            hubmap_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub organ_type: String,
    pub organ_hubmap_id: String,
    pub organ_uuid: String,
    pub donor_hubmap_id: HubmapId,
    pub donor_uuid: String,
}

impl Provenance {
    pub fn from_json(id: &HubmapId, record: &Value) -> Result<Self, BagsError> {
        let first = |field: &str| -> Result<String, BagsError> {
            record
                .get(field)
                .and_then(Value::as_array)
                .and_then(|values| values.first())
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| BagsError::MissingField {
                    id: id.to_string(),
                    field: field.to_string(),
                })
        };
        Ok(Self {
            organ_type: first("organ_type")?,
            organ_hubmap_id: first("organ_hubmap_id")?,
            organ_uuid: first("organ_uuid")?,
            donor_hubmap_id: first("donor_hubmap_id")?.parse()?,
            donor_uuid: first("donor_uuid")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    #[serde(rename = "ds.group_name")]
    pub group_name: String,
    #[serde(rename = "ds.uuid")]
    pub group_uuid: String,
    #[serde(rename = "ds.hubmap_id")]
    pub hubmap_id: HubmapId,
    pub dataset_uuid: String,
    #[serde(rename = "ds.status")]
    pub status: DatasetStatus,
    #[serde(rename = "ds.data_types", deserialize_with = "first_listed")]
    pub data_type: String,
    pub first_sample_id: String,
    pub first_sample_uuid: String,
    pub organ_type: String,
    pub organ_id: String,
    pub donor_id: String,
    pub donor_uuid: String,
    #[serde(deserialize_with = "flexible_bool")]
    pub is_protected: bool,
    pub full_path: String,
}

impl DatasetSummary {
    pub fn data_directory(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.full_path)
    }

    pub fn bag_name(&self) -> String {
        format!("{}-{}-{}", self.data_type, self.status, self.dataset_uuid).to_lowercase()
    }
}

pub fn portal_url(kind: EntityKind, uuid: &str, registered_doi: Option<&str>) -> String {
    match registered_doi.map(str::trim).filter(|doi| !doi.is_empty()) {
        Some(doi) => format!("https://doi.org/{doi}"),
        None => format!("{PORTAL_BASE}/{}/{uuid}", kind.as_str()),
    }
}

pub fn data_directory(config: &ResolvedConfig, record: &DatasetRecord) -> Utf8PathBuf {
    if record.is_protected {
        config
            .protected_root
            .join(&record.group_name)
            .join(&record.uuid)
    } else {
        config.public_root.join(&record.uuid)
    }
}

pub fn format_timestamp(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|time| time.format("%Y-%m-%dT%H:%M:%S").to_string())
}

pub struct MetadataService<'a, E: EntityClient> {
    client: &'a E,
    store: &'a Store,
    config: &'a ResolvedConfig,
}

impl<'a, E: EntityClient> MetadataService<'a, E> {
    pub fn new(client: &'a E, store: &'a Store, config: &'a ResolvedConfig) -> Self {
        Self {
            client,
            store,
            config,
        }
    }

    fn cached<F>(
        &self,
        kind: CacheKind,
        id: &HubmapId,
        freshness: Freshness,
        fetch: F,
    ) -> Result<Value, BagsError>
    where
        F: FnOnce() -> Result<Value, BagsError>,
    {
        let path = self.store.cache_path(kind, id.as_str());
        if freshness == Freshness::Cached {
            if let Some(value) = Store::read_json::<Value>(&path)? {
                tracing::trace!(%path, "cache hit");
                return Ok(value);
            }
        }
        let value = fetch()?;
        Store::write_json(&path, &value)?;
        Ok(value)
    }

    pub fn dataset_json(&self, id: &HubmapId, freshness: Freshness) -> Result<Value, BagsError> {
        self.cached(CacheKind::Datasets, id, freshness, || self.client.entity(id))
    }

    pub fn entity_json(&self, id: &HubmapId) -> Result<Value, BagsError> {
        self.cached(CacheKind::Entity, id, Freshness::Cached, || {
            self.client.entity(id)
        })
    }

    pub fn donor_json(&self, id: &HubmapId) -> Result<Value, BagsError> {
        self.cached(CacheKind::Donor, id, Freshness::Cached, || {
            self.client.entity(id)
        })
    }

    pub fn ancestors_json(&self, id: &HubmapId) -> Result<Value, BagsError> {
        self.cached(CacheKind::Ancestors, id, Freshness::Cached, || {
            self.client.ancestors(id)
        })
    }

    pub fn provenance_json(&self, id: &HubmapId) -> Result<Value, BagsError> {
        self.cached(CacheKind::Provenance, id, Freshness::Cached, || {
            self.client.provenance(id)
        })
    }

    pub fn dataset(&self, id: &HubmapId, freshness: Freshness) -> Result<DatasetRecord, BagsError> {
        DatasetRecord::from_json(&self.dataset_json(id, freshness)?)
    }

    pub fn provenance(&self, id: &HubmapId) -> Result<Provenance, BagsError> {
        Provenance::from_json(id, &self.provenance_json(id)?)
    }

    pub fn is_primary(&self, id: &HubmapId) -> Result<bool, BagsError> {
        let ancestors = self.ancestors_json(id)?;
        Ok(ancestors
            .as_array()
            .and_then(|ancestors| ancestors.first())
            .and_then(|ancestor| ancestor.get("entity_type"))
            .and_then(Value::as_str)
            == Some("Sample"))
    }

    pub fn dataset_type(&self, id: &HubmapId) -> Result<DatasetType, BagsError> {
        Ok(if self.is_primary(id)? {
            DatasetType::Primary
        } else {
            DatasetType::Derived
        })
    }

    pub fn is_protected(&self, id: &HubmapId) -> Result<bool, BagsError> {
        Ok(self.dataset(id, Freshness::Cached)?.is_protected)
    }

    pub fn summary(
        &self,
        id: &HubmapId,
        freshness: Freshness,
    ) -> Result<DatasetSummary, BagsError> {
        let record = self.dataset(id, freshness)?;
        let provenance = self.provenance(id)?;
        let sample = record
            .first_sample
            .clone()
            .ok_or_else(|| BagsError::MissingField {
                id: id.to_string(),
                field: "direct_ancestors".to_string(),
            })?;
        let full_path = data_directory(self.config, &record).to_string();

        Ok(DatasetSummary {
            group_name: record.group_name,
            group_uuid: record.group_uuid.unwrap_or_default(),
            hubmap_id: record.hubmap_id,
            dataset_uuid: record.uuid,
            status: record.status,
            data_type: record.data_type,
            first_sample_id: sample.hubmap_id.to_string(),
            first_sample_uuid: sample.uuid,
            organ_type: provenance.organ_type,
            organ_id: provenance.organ_hubmap_id,
            donor_id: provenance.donor_hubmap_id.to_string(),
            donor_uuid: provenance.donor_uuid,
            is_protected: record.is_protected,
            full_path,
        })
    }

    pub fn entity_url(&self, kind: EntityKind, id: &HubmapId) -> Result<String, BagsError> {
        let record = match kind {
            EntityKind::Dataset => self.dataset_json(id, Freshness::Cached)?,
            EntityKind::Donor => self.donor_json(id)?,
            EntityKind::Sample => self.entity_json(id)?,
        };
        let uuid = required_str(&record, "uuid", id.as_str())?;
        Ok(portal_url(
            kind,
            &uuid,
            record.get("registered_doi").and_then(Value::as_str),
        ))
    }

    pub fn donor(&self, donor_id: &HubmapId) -> Result<DonorMetadata, BagsError> {
        let record = self.donor_json(donor_id)?;
        let url = self.entity_url(EntityKind::Donor, donor_id)?;
        DonorMetadata::from_entity(&record, url)
    }
}

/// Dataset TSVs carry list columns in the `['CODEX']` form.
pub fn first_list_item(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches(['\'', '"'])
        .trim()
        .to_string()
}

fn first_listed<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(first_list_item(&raw))
}

// Spreadsheet tools write booleans in any case.
fn flexible_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(serde::de::Error::custom(format!("not a boolean: {other}"))),
    }
}

fn required_str(record: &Value, field: &str, id: &str) -> Result<String, BagsError> {
    record
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BagsError::MissingField {
            id: id.to_string(),
            field: field.to_string(),
        })
}

fn optional_str(record: &Value, field: &str) -> Option<String> {
    record
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record() -> Value {
        json!({
            "hubmap_id": "HBM123.ABCD.456",
            "uuid": "0123456789abcdef0123456789abcdef",
            "status": "Published",
            "data_types": ["CODEX"],
            "group_name": "Stanford TMC",
            "group_uuid": "g1",
            "direct_ancestors": [{ "hubmap_id": "HBM222.BBBB.222", "uuid": "s1" }],
            "contains_human_genetic_sequences": false,
            "published_timestamp": 1_600_000_000_000_i64
        })
    }

    #[test]
    fn parse_dataset_record() {
        let parsed = DatasetRecord::from_json(&record()).unwrap();
        assert_eq!(parsed.status, DatasetStatus::Published);
        assert_eq!(parsed.data_type, "CODEX");
        assert!(!parsed.is_protected);
        assert_eq!(parsed.first_sample.unwrap().uuid, "s1");
    }

    #[test]
    fn missing_protection_flag_counts_as_protected() {
        let mut value = record();
        value
            .as_object_mut()
            .unwrap()
            .remove("contains_human_genetic_sequences");
        assert!(DatasetRecord::from_json(&value).unwrap().is_protected);
    }

    #[test]
    fn portal_urls_prefer_doi() {
        assert_eq!(
            portal_url(EntityKind::Dataset, "u1", Some("10.35079/HBM123.ABCD.456")),
            "https://doi.org/10.35079/HBM123.ABCD.456"
        );
        assert_eq!(
            portal_url(EntityKind::Sample, "u2", None),
            "https://portal.hubmapconsortium.org/browse/sample/u2"
        );
    }

    #[test]
    fn list_columns_keep_the_first_item() {
        assert_eq!(first_list_item("['CODEX']"), "CODEX");
        assert_eq!(first_list_item("[\"AF\", \"PAS\"]"), "AF");
        assert_eq!(first_list_item("salmon_rnaseq_10x"), "salmon_rnaseq_10x");
        assert_eq!(first_list_item("[]"), "");
    }

    #[test]
    fn timestamps_format_as_utc() {
        assert_eq!(
            format_timestamp(1_600_000_000_000).as_deref(),
            Some("2020-09-13T12:26:40")
        );
    }
}
