use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::BagsError;
use crate::formats;
use crate::store::Store;
use crate::uuid_api::FileUuid;

const BLOCK_SIZE: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub relative_path: String,
    pub filename: String,
    pub size: u64,
    pub md5: String,
    pub sha256: String,
    pub modification_date: String,
    pub file_format: String,
    pub data_type: String,
    pub mime_type: String,
    #[serde(default)]
    pub file_uuid: Option<String>,
}

impl FileRecord {
    pub fn local_id(&self) -> String {
        match &self.file_uuid {
            Some(uuid) if !uuid.is_empty() => uuid.clone(),
            _ => self.relative_path.replace(' ', "%20"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Inventory {
    pub records: Vec<FileRecord>,
    pub errors: Vec<InventoryError>,
    pub reused: usize,
    pub hashed: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct InventoryOptions {
    pub chunk_size: usize,
    pub threads: usize,
}

impl Default for InventoryOptions {
    fn default() -> Self {
        Self {
            chunk_size: 5000,
            threads: 8,
        }
    }
}

pub fn scan(root: &Utf8Path) -> Result<(Vec<String>, Vec<InventoryError>), BagsError> {
    if !root.as_std_path().is_dir() {
        return Err(BagsError::Filesystem(format!("not a directory: {root}")));
    }
    let mut files = Vec::new();
    let mut errors = Vec::new();
    for entry in WalkDir::new(root.as_std_path()).follow_links(false) {
        match entry {
            Ok(entry) => {
                if !entry.file_type().is_file() {
                    continue;
                }
                match relative_path(root, entry.path()) {
                    Some(relative) => files.push(relative),
                    None => errors.push(InventoryError {
                        path: entry.path().display().to_string(),
                        message: "path is not UTF-8".to_string(),
                    }),
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "error accessing entry");
                errors.push(InventoryError {
                    path: err
                        .path()
                        .map(|path| path.display().to_string())
                        .unwrap_or_default(),
                    message: err.to_string(),
                });
            }
        }
    }
    files.sort();
    Ok((files, errors))
}

pub fn hash_file(path: &Path) -> io::Result<(String, String)> {
    let mut file = File::open(path)?;
    let mut md5 = md5::Context::new();
    let mut sha256 = Sha256::new();
    let mut buffer = vec![0u8; BLOCK_SIZE];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        md5.consume(&buffer[..read]);
        sha256.update(&buffer[..read]);
    }
    Ok((
        format!("{:x}", md5.compute()),
        format!("{:x}", sha256.finalize()),
    ))
}

pub fn describe_file(root: &Utf8Path, relative: &str) -> io::Result<FileRecord> {
    let path = root.join(relative);
    let metadata = std::fs::metadata(path.as_std_path())?;
    let (md5, sha256) = hash_file(path.as_std_path())?;
    let filename = path.file_name().unwrap_or(relative).to_string();
    let modification_date = metadata
        .modified()
        .map(|time| DateTime::<Local>::from(time).format("%Y-%m-%d").to_string())
        .unwrap_or_default();

    Ok(FileRecord {
        relative_path: relative.to_string(),
        file_format: formats::file_format(&filename).to_string(),
        data_type: formats::data_type(&filename).to_string(),
        mime_type: formats::mime_type(&filename).to_string(),
        filename: filename.replace(' ', "%20"),
        size: metadata.len(),
        md5,
        sha256,
        modification_date,
        file_uuid: None,
    })
}

/// Walks `root` and hashes every file not already present (same path and size)
/// in the intermediate table at `cache`. The table is rewritten after each chunk.
pub fn build_inventory(
    root: &Utf8Path,
    cache: Option<&Utf8Path>,
    options: InventoryOptions,
    sink: &dyn ProgressSink,
) -> Result<Inventory, BagsError> {
    let start = Instant::now();
    let (files, mut errors) = scan(root)?;

    let mut previous = match cache {
        Some(path) => read_inventory(path)?
            .into_iter()
            .map(|record| (record.relative_path.clone(), record))
            .collect::<HashMap<_, _>>(),
        None => HashMap::new(),
    };

    let mut records = Vec::with_capacity(files.len());
    let mut pending = Vec::new();
    for relative in files {
        let size = std::fs::metadata(root.join(&relative).as_std_path())
            .map(|meta| meta.len())
            .ok();
        match previous.remove(&relative) {
            Some(record) if Some(record.size) == size => records.push(record),
            _ => pending.push(relative),
        }
    }
    let reused = records.len();
    sink.event(ProgressEvent {
        message: format!(
            "phase=Inventory; {} files, {} cached, {} to hash",
            reused + pending.len(),
            reused,
            pending.len()
        ),
        elapsed: Some(start.elapsed()),
    });

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.threads.max(1))
        .build()
        .map_err(|err| BagsError::Filesystem(err.to_string()))?;

    let mut hashed = 0usize;
    let total = pending.len();
    for chunk in pending.chunks(options.chunk_size.max(1)) {
        let results: Vec<Result<FileRecord, InventoryError>> = pool.install(|| {
            chunk
                .par_iter()
                .map(|relative| {
                    describe_file(root, relative).map_err(|err| InventoryError {
                        path: relative.clone(),
                        message: err.to_string(),
                    })
                })
                .collect()
        });
        for result in results {
            match result {
                Ok(record) => {
                    hashed += 1;
                    records.push(record);
                }
                Err(err) => {
                    tracing::warn!(path = %err.path, error = %err.message, "unable to hash file");
                    errors.push(err);
                }
            }
        }
        if let Some(path) = cache {
            write_inventory(path, &records)?;
        }
        sink.event(ProgressEvent {
            message: format!("phase=Inventory; hashed {hashed}/{total}"),
            elapsed: Some(start.elapsed()),
        });
    }

    records.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    if let Some(path) = cache {
        write_inventory(path, &records)?;
    }

    Ok(Inventory {
        records,
        errors,
        reused,
        hashed,
    })
}

pub fn read_inventory(path: &Utf8Path) -> Result<Vec<FileRecord>, BagsError> {
    if !path.as_std_path().exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path.as_std_path())?;
    let mut records = Vec::new();
    for record in reader.deserialize() {
        records.push(record?);
    }
    Ok(records)
}

pub fn write_inventory(path: &Utf8Path, records: &[FileRecord]) -> Result<(), BagsError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    let content = writer
        .into_inner()
        .map_err(|err| BagsError::Tsv(err.to_string()))?;
    Store::write_bytes_atomic(path, &content)
}

pub fn attach_file_uuids(records: &mut [FileRecord], uuids: &[FileUuid]) -> usize {
    let by_path = uuids
        .iter()
        .map(|uuid| (uuid.path.trim_start_matches('/'), uuid.file_uuid.as_str()))
        .collect::<HashMap<_, _>>();
    let mut matched = 0;
    for record in records.iter_mut() {
        if let Some(uuid) = by_path.get(record.relative_path.as_str()) {
            record.file_uuid = Some(uuid.to_string());
            matched += 1;
        }
    }
    matched
}

pub fn total_size(records: &[FileRecord]) -> u64 {
    records.iter().map(|record| record.size).sum()
}

fn relative_path(root: &Utf8Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root.as_std_path()).ok()?;
    let relative = Utf8PathBuf::from_path_buf(relative.to_path_buf()).ok()?;
    Some(relative.as_str().replace('\\', "/"))
}
