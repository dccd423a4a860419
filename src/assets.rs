use std::collections::HashMap;

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::Instance;
use crate::error::BagsError;
use crate::http::{ApiClient, HeadResponse};
use crate::store::Store;
use crate::uuid_api::FileUuid;

pub trait AssetsClient: Send + Sync {
    fn head(&self, dataset_uuid: &str, path: &str) -> Result<HeadResponse, BagsError>;
    fn url(&self, dataset_uuid: &str, path: &str) -> String;
}

#[derive(Clone)]
pub struct AssetsHttpClient {
    api: ApiClient,
}

impl AssetsHttpClient {
    pub fn new(instance: Instance, token: &str) -> Result<Self, BagsError> {
        Ok(Self {
            api: ApiClient::new("assets", instance.assets_base(), token)?,
        })
    }
}

impl AssetsClient for AssetsHttpClient {
    fn head(&self, dataset_uuid: &str, path: &str) -> Result<HeadResponse, BagsError> {
        self.api.head(&asset_path(dataset_uuid, path))
    }

    fn url(&self, dataset_uuid: &str, path: &str) -> String {
        self.api.url(&asset_path(dataset_uuid, path))
    }
}

pub fn asset_path(dataset_uuid: &str, path: &str) -> String {
    format!(
        "{dataset_uuid}/{}",
        path.trim_start_matches('/').replace(' ', "%20")
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetCheck {
    pub file_uuid: String,
    pub path: String,
    pub url: String,
    pub ready: bool,
    pub status_code: u16,
    pub login_required: bool,
    pub checked_at: DateTime<Utc>,
}

pub fn is_login_redirect(final_url: &str) -> bool {
    final_url.contains("prompt=login")
}

pub fn check_assets(
    client: &dyn AssetsClient,
    dataset_uuid: &str,
    files: &[FileUuid],
    previous: &[AssetCheck],
    sink: &dyn ProgressSink,
) -> Vec<AssetCheck> {
    let ready = previous
        .iter()
        .filter(|check| check.ready)
        .map(|check| (check.file_uuid.as_str(), check))
        .collect::<HashMap<_, _>>();

    let mut checks = Vec::with_capacity(files.len());
    for (index, file) in files.iter().enumerate() {
        if let Some(check) = ready.get(file.file_uuid.as_str()) {
            checks.push((*check).clone());
            continue;
        }
        let url = client.url(dataset_uuid, &file.path);
        let (status_code, login_required) = match client.head(dataset_uuid, &file.path) {
            Ok(response) => (response.status, is_login_redirect(&response.final_url)),
            Err(err) => {
                tracing::warn!(%url, error = %err, "asset check failed");
                (0, false)
            }
        };
        checks.push(AssetCheck {
            file_uuid: file.file_uuid.clone(),
            path: file.path.clone(),
            url,
            ready: status_code == 200 && !login_required,
            status_code,
            login_required,
            checked_at: Utc::now(),
        });
        if (index + 1) % 100 == 0 {
            sink.event(ProgressEvent {
                message: format!("phase=Assets; checked {}/{}", index + 1, files.len()),
                elapsed: None,
            });
        }
    }
    checks
}

pub fn read_checks(path: &Utf8Path) -> Result<Vec<AssetCheck>, BagsError> {
    if !path.as_std_path().exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path.as_std_path())?;
    let mut checks = Vec::new();
    for check in reader.deserialize() {
        checks.push(check?);
    }
    Ok(checks)
}

pub fn write_checks(path: &Utf8Path, checks: &[AssetCheck]) -> Result<(), BagsError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(Vec::new());
    for check in checks {
        writer.serialize(check)?;
    }
    let content = writer
        .into_inner()
        .map_err(|err| BagsError::Tsv(err.to_string()))?;
    Store::write_bytes_atomic(path, &content)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use camino::Utf8PathBuf;

    use super::*;
    use crate::output::JsonOutput;

    struct FakeAssets {
        requested: Mutex<Vec<String>>,
    }

    impl AssetsClient for FakeAssets {
        fn head(&self, _dataset_uuid: &str, path: &str) -> Result<HeadResponse, BagsError> {
            self.requested.lock().unwrap().push(path.to_string());
            match path {
                "raw/a.tsv" => Ok(HeadResponse {
                    status: 200,
                    final_url: "https://assets.example.org/d1/raw/a.tsv".to_string(),
                }),
                "raw/private.tsv" => Ok(HeadResponse {
                    status: 200,
                    final_url: "https://auth.example.org/authorize?prompt=login".to_string(),
                }),
                _ => Err(BagsError::Http {
                    service: "assets",
                    message: "connection reset".to_string(),
                }),
            }
        }

        fn url(&self, dataset_uuid: &str, path: &str) -> String {
            format!("https://assets.example.org/{}", asset_path(dataset_uuid, path))
        }
    }

    fn file(uuid: &str, path: &str) -> FileUuid {
        FileUuid {
            file_uuid: uuid.to_string(),
            path: path.to_string(),
        }
    }

    #[test]
    fn paths_are_escaped() {
        assert_eq!(asset_path("d1", "/raw/cycle 1.tif"), "d1/raw/cycle%201.tif");
    }

    #[test]
    fn checks_record_status_and_login() {
        let client = FakeAssets {
            requested: Mutex::new(Vec::new()),
        };
        let files = [
            file("f1", "raw/a.tsv"),
            file("f2", "raw/private.tsv"),
            file("f3", "raw/gone.tsv"),
        ];
        let checks = check_assets(&client, "d1", &files, &[], &JsonOutput);

        assert!(checks[0].ready);
        assert_eq!(checks[0].url, "https://assets.example.org/d1/raw/a.tsv");
        assert!(!checks[1].ready);
        assert!(checks[1].login_required);
        assert_eq!(checks[2].status_code, 0);
        assert!(!checks[2].ready);
    }

    #[test]
    fn ready_files_are_not_rechecked() {
        let client = FakeAssets {
            requested: Mutex::new(Vec::new()),
        };
        let files = [file("f1", "raw/a.tsv"), file("f3", "raw/gone.tsv")];
        let first = check_assets(&client, "d1", &files, &[], &JsonOutput);

        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("d1.tsv")).unwrap();
        write_checks(&path, &first).unwrap();
        let previous = read_checks(&path).unwrap();
        assert_eq!(previous, first);

        client.requested.lock().unwrap().clear();
        let second = check_assets(&client, "d1", &files, &previous, &JsonOutput);
        assert_eq!(*client.requested.lock().unwrap(), vec!["raw/gone.tsv"]);
        assert_eq!(second[0], first[0]);
    }
}
