use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::BagsError;

static HUBMAP_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^HBM\d{3}\.[A-Z]{4}\.\d{3}$").expect("valid pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HubmapId(String);

impl HubmapId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HubmapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for HubmapId {
    type Err = BagsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        if !HUBMAP_ID.is_match(&normalized) {
            return Err(BagsError::InvalidHubmapId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

impl Serialize for HubmapId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for HubmapId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Instance {
    Dev,
    Test,
    #[default]
    Prod,
}

impl Instance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Instance::Dev => "dev",
            Instance::Test => "test",
            Instance::Prod => "prod",
        }
    }

    pub fn entity_base(&self) -> String {
        self.service_base("entity")
    }

    pub fn search_base(&self) -> String {
        self.service_base("search")
    }

    pub fn uuid_base(&self) -> String {
        self.service_base("uuid")
    }

    pub fn assets_base(&self) -> String {
        match self {
            Instance::Prod => "https://assets.hubmapconsortium.org".to_string(),
            Instance::Dev | Instance::Test => {
                format!("https://assets.{}.hubmapconsortium.org", self.as_str())
            }
        }
    }

    fn service_base(&self, service: &str) -> String {
        match self {
            Instance::Prod => format!("https://{service}.api.hubmapconsortium.org"),
            Instance::Dev | Instance::Test => {
                format!("https://{service}-api.{}.hubmapconsortium.org", self.as_str())
            }
        }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Instance {
    type Err = BagsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "dev" => Ok(Instance::Dev),
            "test" => Ok(Instance::Test),
            "prod" => Ok(Instance::Prod),
            _ => Err(BagsError::InvalidInstance(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DatasetStatus {
    New,
    Published,
    Qa,
    Processing,
    Submitted,
    Hold,
    Invalid,
    Error,
    Other(String),
}

impl DatasetStatus {
    pub fn as_str(&self) -> &str {
        match self {
            DatasetStatus::New => "New",
            DatasetStatus::Published => "Published",
            DatasetStatus::Qa => "QA",
            DatasetStatus::Processing => "Processing",
            DatasetStatus::Submitted => "Submitted",
            DatasetStatus::Hold => "Hold",
            DatasetStatus::Invalid => "Invalid",
            DatasetStatus::Error => "Error",
            DatasetStatus::Other(value) => value,
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, DatasetStatus::Published)
    }
}

impl fmt::Display for DatasetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for DatasetStatus {
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "new" => DatasetStatus::New,
            "published" => DatasetStatus::Published,
            "qa" => DatasetStatus::Qa,
            "processing" => DatasetStatus::Processing,
            "submitted" => DatasetStatus::Submitted,
            "hold" => DatasetStatus::Hold,
            "invalid" => DatasetStatus::Invalid,
            "error" => DatasetStatus::Error,
            _ => DatasetStatus::Other(value.trim().to_string()),
        }
    }
}

impl Serialize for DatasetStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DatasetStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(DatasetStatus::from(raw.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Donor,
    Sample,
    Dataset,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Donor => "donor",
            EntityKind::Sample => "sample",
            EntityKind::Dataset => "dataset",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetType {
    Primary,
    Derived,
}

impl DatasetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetType::Primary => "Primary",
            DatasetType::Derived => "Derived",
        }
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_hubmap_id_normalizes_case() {
        let id: HubmapId = " hbm123.abcd.456 ".parse().unwrap();
        assert_eq!(id.as_str(), "HBM123.ABCD.456");
    }

    #[test]
    fn parse_hubmap_id_rejects_short_ids() {
        let err = "HBM12.ABCD.456".parse::<HubmapId>().unwrap_err();
        assert_matches!(err, BagsError::InvalidHubmapId(_));
    }

    #[test]
    fn instance_hosts() {
        assert_eq!(
            Instance::Prod.entity_base(),
            "https://entity.api.hubmapconsortium.org"
        );
        assert_eq!(
            Instance::Dev.uuid_base(),
            "https://uuid-api.dev.hubmapconsortium.org"
        );
    }

    #[test]
    fn unknown_instance_is_an_error() {
        assert_matches!(
            "staging".parse::<Instance>(),
            Err(BagsError::InvalidInstance(_))
        );
    }

    #[test]
    fn status_round_trips_known_values() {
        assert_eq!(DatasetStatus::from("published"), DatasetStatus::Published);
        assert_eq!(DatasetStatus::from("QA").as_str(), "QA");
        assert_eq!(
            DatasetStatus::from("Reorganized"),
            DatasetStatus::Other("Reorganized".to_string())
        );
    }
}
