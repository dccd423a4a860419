use std::fs;
use std::io;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::Builder;

use crate::error::BagsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Datasets,
    Provenance,
    Ancestors,
    Entity,
    Donor,
}

impl CacheKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            CacheKind::Datasets => ".datasets",
            CacheKind::Provenance => ".provenance",
            CacheKind::Ancestors => ".ancestors",
            CacheKind::Entity => ".entity",
            CacheKind::Donor => ".donor",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn from_work_dir(work_dir: &Utf8Path) -> Result<Self, BagsError> {
        if work_dir.is_absolute() {
            return Ok(Self::new(work_dir.to_path_buf()));
        }
        let cwd = std::env::current_dir().map_err(|err| BagsError::Filesystem(err.to_string()))?;
        let cwd = Utf8PathBuf::from_path_buf(cwd)
            .map_err(|_| BagsError::Filesystem("working directory is not UTF-8".to_string()))?;
        Ok(Self::new(cwd.join(work_dir)))
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn cache_path(&self, kind: CacheKind, id: &str) -> Utf8PathBuf {
        self.root.join(kind.dir_name()).join(format!("{id}.json"))
    }

    pub fn inventory_path(&self, dataset_uuid: &str) -> Utf8PathBuf {
        self.root.join(".data").join(format!("{dataset_uuid}.tsv"))
    }

    pub fn assets_path(&self, dataset_uuid: &str) -> Utf8PathBuf {
        self.root.join(".assets").join(format!("{dataset_uuid}.tsv"))
    }

    pub fn checkpoint_dir(&self) -> Utf8PathBuf {
        self.root.join(".checkpoints")
    }

    pub fn staging_dir(&self, name: &str) -> Utf8PathBuf {
        self.root.join(".staging").join(name)
    }

    pub fn bags_dir(&self) -> Utf8PathBuf {
        self.root.join("bags")
    }

    pub fn bag_dir(&self, name: &str) -> Utf8PathBuf {
        self.bags_dir().join(name)
    }

    pub fn inventory_dir(&self, name: &str) -> Utf8PathBuf {
        self.root.join("inventory").join(name)
    }

    pub fn reports_dir(&self) -> Utf8PathBuf {
        self.root.join("daily-report")
    }

    pub fn submission_dir(&self) -> Utf8PathBuf {
        self.root.join("submission")
    }

    pub fn ensure_dir(path: &Utf8Path) -> Result<(), BagsError> {
        fs::create_dir_all(path.as_std_path()).map_err(|err| BagsError::Filesystem(err.to_string()))
    }

    pub fn reset_dir(path: &Utf8Path) -> Result<(), BagsError> {
        if path.as_std_path().exists() {
            fs::remove_dir_all(path.as_std_path())
                .map_err(|err| BagsError::Filesystem(format!("remove {path}: {err}")))?;
        }
        Self::ensure_dir(path)
    }

    pub fn read_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<Option<T>, BagsError> {
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| BagsError::Filesystem(format!("read {path}: {err}")))?;
        let value = serde_json::from_str(&content)
            .map_err(|err| BagsError::Filesystem(format!("parse {path}: {err}")))?;
        Ok(Some(value))
    }

    pub fn write_json<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), BagsError> {
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| BagsError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    /// Writes through a sibling temp file so readers never see partial content.
    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), BagsError> {
        let parent = path
            .parent()
            .ok_or_else(|| BagsError::Filesystem(format!("invalid destination path {path}")))?;
        Self::ensure_dir(parent)?;
        let temp = Builder::new()
            .prefix(".hubmapbags")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| BagsError::Filesystem(err.to_string()))?;
        fs::write(temp.path(), content).map_err(|err| BagsError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| BagsError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn remove_file_if_exists(path: &Utf8Path) -> Result<bool, BagsError> {
        match fs::remove_file(path.as_std_path()) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(BagsError::Filesystem(format!("remove {path}: {err}"))),
        }
    }

    pub fn publish_bag(&self, staging: &Utf8Path, name: &str) -> Result<Utf8PathBuf, BagsError> {
        let dest = self.bag_dir(name);
        Self::ensure_dir(&self.bags_dir())?;
        atomic_rename_dir(staging.as_std_path(), dest.as_std_path())
            .map_err(|err| BagsError::Filesystem(format!("move {staging} to {dest}: {err}")))?;
        Ok(dest)
    }

    pub fn list_bags(&self) -> Result<Vec<Utf8PathBuf>, BagsError> {
        let bags_dir = self.bags_dir();
        if !bags_dir.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut bags = Vec::new();
        for entry in fs::read_dir(bags_dir.as_std_path())
            .map_err(|err| BagsError::Filesystem(err.to_string()))?
        {
            let entry = entry.map_err(|err| BagsError::Filesystem(err.to_string()))?;
            if !entry.path().is_dir() {
                continue;
            }
            let path = Utf8PathBuf::from_path_buf(entry.path()).map_err(|path| {
                BagsError::Filesystem(format!("non UTF-8 path {}", path.display()))
            })?;
            bags.push(path);
        }
        bags.sort();
        Ok(bags)
    }
}

pub fn atomic_rename_dir(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        fs::remove_dir_all(to)?;
    }
    fs::rename(from, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new(Utf8PathBuf::from("/work"));
        assert_eq!(
            store.cache_path(CacheKind::Provenance, "HBM123.ABCD.456"),
            Utf8PathBuf::from("/work/.provenance/HBM123.ABCD.456.json")
        );
        assert!(store.inventory_path("abc").ends_with(".data/abc.tsv"));
        assert!(store.bag_dir("af-published-abc").ends_with("bags/af-published-abc"));
    }

    #[test]
    fn publish_replaces_previous_bag() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = Store::new(root);

        let old = store.bag_dir("bag");
        Store::ensure_dir(&old).unwrap();
        fs::write(old.join("stale.tsv"), "x").unwrap();

        let staging = store.staging_dir("bag");
        Store::ensure_dir(&staging).unwrap();
        fs::write(staging.join("file.tsv"), "y").unwrap();

        let dest = store.publish_bag(&staging, "bag").unwrap();
        assert!(dest.join("file.tsv").exists());
        assert!(!dest.join("stale.tsv").exists());
        assert!(!staging.exists());
    }
}
