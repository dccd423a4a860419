use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::{HubmapId, Instance};
use crate::error::BagsError;
use crate::http::ApiClient;

pub const REGISTER_CHUNK: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUuid {
    pub file_uuid: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileRegistration {
    pub path: String,
    pub size: u64,
    pub checksum: String,
}

pub trait UuidClient: Send + Sync {
    fn file_uuids(&self, id: &HubmapId) -> Result<Vec<FileUuid>, BagsError>;
    fn register_files(
        &self,
        dataset_uuid: &str,
        files: &[FileRegistration],
    ) -> Result<Vec<FileUuid>, BagsError>;
}

#[derive(Clone)]
pub struct UuidHttpClient {
    api: ApiClient,
}

impl UuidHttpClient {
    pub fn new(instance: Instance, token: &str) -> Result<Self, BagsError> {
        Ok(Self {
            api: ApiClient::new("uuid-api", instance.uuid_base(), token)?,
        })
    }
}

impl UuidClient for UuidHttpClient {
    fn file_uuids(&self, id: &HubmapId) -> Result<Vec<FileUuid>, BagsError> {
        let value = match self.api.get_json(&format!("{}/files", id.as_str()), id.as_str()) {
            Ok(value) => value,
            // Datasets without registered files answer with a miss.
            Err(err) if err.is_not_found() => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        parse_file_uuids(&value)
    }

    fn register_files(
        &self,
        dataset_uuid: &str,
        files: &[FileRegistration],
    ) -> Result<Vec<FileUuid>, BagsError> {
        let body = json!({
            "parent_ids": [dataset_uuid],
            "entity_type": "FILE",
            "file_info": files.iter().map(|file| json!({
                "path": file.path,
                "size": file.size,
                "checksum": file.checksum,
                "base_dir": "DATA_UPLOAD",
            })).collect::<Vec<_>>(),
        });
        let path = format!("hmuuid?entity_count={}", files.len());
        let value = self.api.post_json(&path, &body, dataset_uuid)?;
        let minted = value.as_array().ok_or_else(|| BagsError::MalformedResponse {
            service: "uuid-api",
            message: "registration response is not a list".to_string(),
        })?;
        Ok(minted
            .iter()
            .filter_map(|item| {
                Some(FileUuid {
                    file_uuid: item.get("uuid")?.as_str()?.to_string(),
                    path: item.get("file_path")?.as_str()?.to_string(),
                })
            })
            .collect())
    }
}

pub fn parse_file_uuids(value: &Value) -> Result<Vec<FileUuid>, BagsError> {
    serde_json::from_value::<Vec<FileUuid>>(value.clone()).map_err(|err| {
        BagsError::MalformedResponse {
            service: "uuid-api",
            message: err.to_string(),
        }
    })
}
