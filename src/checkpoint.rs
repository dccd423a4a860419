//! Per-dataset checkpoint markers.
//!
//! A run owns a dataset while `<key>.computing` exists and holds an unexpired
//! lease. Finishing renames the marker to `<key>.done` or `<key>.broken`, so
//! `.computing` and `.done` never exist at the same time.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::time::{Duration, SystemTime};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BagsError;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Computing,
    Done,
    Broken,
}

impl Marker {
    pub fn extension(&self) -> &'static str {
        match self {
            Marker::Computing => "computing",
            Marker::Done => "done",
            Marker::Broken => "broken",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub owner: String,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    fn new(ttl: Duration) -> Self {
        let acquired_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            owner: std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at,
            expires_at: acquired_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenReason {
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum CheckpointState {
    Free,
    Computing { lease: Option<Lease>, expired: bool },
    Done,
    Broken { reason: Option<String> },
}

#[derive(Debug)]
pub enum Acquire {
    Acquired(CheckpointGuard),
    Done,
    Held(Option<Lease>),
}

#[derive(Debug, Clone)]
pub struct Checkpoints {
    dir: Utf8PathBuf,
    ttl: Duration,
}

impl Checkpoints {
    pub fn new(dir: Utf8PathBuf, ttl: Duration) -> Self {
        Self { dir, ttl }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    pub fn key(data_directory: &str) -> String {
        data_directory.replace(['/', ' '], "_")
    }

    pub fn marker_path(&self, key: &str, marker: Marker) -> Utf8PathBuf {
        self.dir.join(format!("{key}.{}", marker.extension()))
    }

    pub fn state(&self, key: &str) -> Result<CheckpointState, BagsError> {
        if exists(&self.marker_path(key, Marker::Done)) {
            return Ok(CheckpointState::Done);
        }
        let computing = self.marker_path(key, Marker::Computing);
        if exists(&computing) {
            let lease = read_lease(&computing);
            let expired = self.is_stale(&computing, lease.as_ref())?;
            return Ok(CheckpointState::Computing { lease, expired });
        }
        let broken = self.marker_path(key, Marker::Broken);
        if exists(&broken) {
            let reason = Store::read_json::<BrokenReason>(&broken)
                .ok()
                .flatten()
                .map(|broken| broken.reason);
            return Ok(CheckpointState::Broken { reason });
        }
        Ok(CheckpointState::Free)
    }

    /// Takes the `.computing` lease unless the dataset is done or another
    /// unexpired lease exists. A `.broken` marker is cleared and retried.
    pub fn acquire(&self, key: &str) -> Result<Acquire, BagsError> {
        Store::ensure_dir(&self.dir)?;
        if exists(&self.marker_path(key, Marker::Done)) {
            return Ok(Acquire::Done);
        }
        let computing = self.marker_path(key, Marker::Computing);
        match self.create_lease(&computing)? {
            Some(lease) => return Ok(Acquire::Acquired(self.guard(key, lease))),
            None => {
                let lease = read_lease(&computing);
                if !self.is_stale(&computing, lease.as_ref())? {
                    return Ok(Acquire::Held(lease));
                }
                tracing::warn!(marker = %computing, "taking over expired lease");
                Store::remove_file_if_exists(&computing)?;
            }
        }
        match self.create_lease(&computing)? {
            Some(lease) => Ok(Acquire::Acquired(self.guard(key, lease))),
            None => Ok(Acquire::Held(read_lease(&computing))),
        }
    }

    pub fn reset(&self, key: &str) -> Result<Vec<Utf8PathBuf>, BagsError> {
        self.remove_markers(key, &[Marker::Done, Marker::Broken])
    }

    pub fn clear(&self, key: &str) -> Result<Vec<Utf8PathBuf>, BagsError> {
        self.remove_markers(key, &[Marker::Computing, Marker::Done, Marker::Broken])
    }

    fn remove_markers(&self, key: &str, markers: &[Marker]) -> Result<Vec<Utf8PathBuf>, BagsError> {
        let mut removed = Vec::new();
        for marker in markers {
            let path = self.marker_path(key, *marker);
            if Store::remove_file_if_exists(&path)? {
                removed.push(path);
            }
        }
        Ok(removed)
    }

    fn guard(&self, key: &str, lease: Lease) -> CheckpointGuard {
        CheckpointGuard {
            key: key.to_string(),
            computing: self.marker_path(key, Marker::Computing),
            done: self.marker_path(key, Marker::Done),
            broken: self.marker_path(key, Marker::Broken),
            lease,
            finished: false,
        }
    }

    fn create_lease(&self, path: &Utf8Path) -> Result<Option<Lease>, BagsError> {
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path.as_std_path())
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Ok(None),
            Err(err) => return Err(BagsError::Filesystem(format!("create {path}: {err}"))),
        };
        let lease = Lease::new(self.ttl);
        let content = serde_json::to_vec_pretty(&lease)
            .map_err(|err| BagsError::Filesystem(err.to_string()))?;
        file.write_all(&content)
            .and_then(|_| file.sync_all())
            .map_err(|err| BagsError::Filesystem(format!("write {path}: {err}")))?;
        Ok(Some(lease))
    }

    fn is_stale(&self, path: &Utf8Path, lease: Option<&Lease>) -> Result<bool, BagsError> {
        if let Some(lease) = lease {
            return Ok(lease.is_expired(Utc::now()));
        }
        let modified = match fs::metadata(path.as_std_path()).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(err) => return Err(BagsError::Filesystem(err.to_string())),
        };
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();
        Ok(age >= self.ttl)
    }
}

/// Held while a dataset is being built. Dropping it without finishing
/// releases the `.computing` marker.
#[derive(Debug)]
pub struct CheckpointGuard {
    key: String,
    computing: Utf8PathBuf,
    done: Utf8PathBuf,
    broken: Utf8PathBuf,
    lease: Lease,
    finished: bool,
}

impl CheckpointGuard {
    pub fn lease(&self) -> &Lease {
        &self.lease
    }

    /// Whether `.computing` still holds this guard's lease; a run whose lease
    /// expired and was taken over must leave the new holder's marker alone.
    fn owns_marker(&self) -> bool {
        read_lease(&self.computing).as_ref() == Some(&self.lease)
    }

    fn lease_lost(&self) -> BagsError {
        BagsError::Broken {
            id: self.key.clone(),
            reason: format!("lease lost: {} is no longer held by this run", self.computing),
        }
    }

    pub fn complete(mut self) -> Result<Utf8PathBuf, BagsError> {
        self.finished = true;
        if !self.owns_marker() {
            return Err(self.lease_lost());
        }
        Store::remove_file_if_exists(&self.broken)?;
        fs::rename(self.computing.as_std_path(), self.done.as_std_path())
            .map_err(|err| BagsError::Filesystem(format!("mark done {}: {err}", self.done)))?;
        Ok(self.done.clone())
    }

    pub fn fail(mut self, reason: &str) -> Result<Utf8PathBuf, BagsError> {
        self.finished = true;
        if !self.owns_marker() {
            return Err(self.lease_lost());
        }
        let record = BrokenReason {
            reason: reason.to_string(),
            failed_at: Utc::now(),
        };
        Store::write_json(&self.computing, &record)?;
        fs::rename(self.computing.as_std_path(), self.broken.as_std_path())
            .map_err(|err| BagsError::Filesystem(format!("mark broken {}: {err}", self.broken)))?;
        Ok(self.broken.clone())
    }
}

impl Drop for CheckpointGuard {
    fn drop(&mut self) {
        if self.finished || !self.owns_marker() {
            return;
        }
        if let Err(err) = Store::remove_file_if_exists(&self.computing) {
            tracing::warn!(marker = %self.computing, error = %err, "unable to release lease");
        }
    }
}

fn exists(path: &Utf8Path) -> bool {
    path.as_std_path().exists()
}

fn read_lease(path: &Utf8Path) -> Option<Lease> {
    Store::read_json::<Lease>(path).ok().flatten()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn checkpoints(ttl: Duration) -> (tempfile::TempDir, Checkpoints) {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().join(".checkpoints")).unwrap();
        (temp, Checkpoints::new(dir, ttl))
    }

    #[test]
    fn key_flattens_path() {
        assert_eq!(
            Checkpoints::key("/hive/hubmap/data/public/My Lab/abc"),
            "_hive_hubmap_data_public_My_Lab_abc"
        );
    }

    #[test]
    fn complete_leaves_only_done() {
        let (_temp, checkpoints) = checkpoints(Duration::from_secs(60));
        let Acquire::Acquired(guard) = checkpoints.acquire("k").unwrap() else {
            panic!("expected lease");
        };
        assert!(checkpoints.marker_path("k", Marker::Computing).exists());
        guard.complete().unwrap();
        assert!(!checkpoints.marker_path("k", Marker::Computing).exists());
        assert_eq!(checkpoints.state("k").unwrap(), CheckpointState::Done);
        assert_matches!(checkpoints.acquire("k").unwrap(), Acquire::Done);
    }

    #[test]
    fn live_lease_blocks_second_run() {
        let (_temp, checkpoints) = checkpoints(Duration::from_secs(3600));
        let _guard = checkpoints.acquire("k").unwrap();
        assert_matches!(checkpoints.acquire("k").unwrap(), Acquire::Held(Some(_)));
    }

    #[test]
    fn expired_lease_is_taken_over() {
        let (_temp, checkpoints) = checkpoints(Duration::ZERO);
        let first = checkpoints.acquire("k").unwrap();
        assert_matches!(first, Acquire::Acquired(_));
        std::mem::forget(first);
        assert_matches!(checkpoints.acquire("k").unwrap(), Acquire::Acquired(_));
    }

    #[test]
    fn stale_owner_cannot_finish_a_taken_over_lease() {
        let (_temp, checkpoints) = checkpoints(Duration::ZERO);
        let Acquire::Acquired(stale) = checkpoints.acquire("k").unwrap() else {
            panic!("expected lease");
        };
        let Acquire::Acquired(live) = checkpoints.acquire("k").unwrap() else {
            panic!("expected takeover");
        };
        let computing = checkpoints.marker_path("k", Marker::Computing);
        assert_eq!(read_lease(&computing).as_ref(), Some(live.lease()));

        assert_matches!(stale.complete(), Err(BagsError::Broken { .. }));
        assert!(computing.exists());
        assert!(!checkpoints.marker_path("k", Marker::Done).exists());

        live.complete().unwrap();
        assert_eq!(checkpoints.state("k").unwrap(), CheckpointState::Done);
    }

    #[test]
    fn stale_owner_neither_breaks_nor_releases() {
        let (_temp, checkpoints) = checkpoints(Duration::ZERO);
        let Acquire::Acquired(stale) = checkpoints.acquire("k").unwrap() else {
            panic!("expected lease");
        };
        let Acquire::Acquired(live) = checkpoints.acquire("k").unwrap() else {
            panic!("expected takeover");
        };
        let computing = checkpoints.marker_path("k", Marker::Computing);

        assert_matches!(stale.fail("late failure"), Err(BagsError::Broken { .. }));
        assert!(!checkpoints.marker_path("k", Marker::Broken).exists());
        assert_eq!(read_lease(&computing).as_ref(), Some(live.lease()));

        let Acquire::Acquired(second_stale) = checkpoints.acquire("other").unwrap() else {
            panic!("expected lease");
        };
        let _second_live = checkpoints.acquire("other").unwrap();
        drop(second_stale);
        assert!(checkpoints.marker_path("other", Marker::Computing).exists());
        drop(live);
        assert!(!computing.exists());
    }

    #[test]
    fn dropped_guard_releases_marker() {
        let (_temp, checkpoints) = checkpoints(Duration::from_secs(60));
        drop(checkpoints.acquire("k").unwrap());
        assert_eq!(checkpoints.state("k").unwrap(), CheckpointState::Free);
    }

    #[test]
    fn failure_records_reason_and_is_retried() {
        let (_temp, checkpoints) = checkpoints(Duration::from_secs(60));
        let Acquire::Acquired(guard) = checkpoints.acquire("k").unwrap() else {
            panic!("expected lease");
        };
        guard.fail("expected 50 tables, found 49").unwrap();
        assert_eq!(
            checkpoints.state("k").unwrap(),
            CheckpointState::Broken {
                reason: Some("expected 50 tables, found 49".to_string())
            }
        );
        let Acquire::Acquired(guard) = checkpoints.acquire("k").unwrap() else {
            panic!("broken datasets are retried");
        };
        guard.complete().unwrap();
        assert!(!checkpoints.marker_path("k", Marker::Broken).exists());
    }
}
