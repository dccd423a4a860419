use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::BagsError;
use crate::manifest::{self, SCHEMAS, Table};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: String,
    pub rows: usize,
}

pub fn archive_bag(bag_dir: &Utf8Path) -> Result<Utf8PathBuf, BagsError> {
    let name = bag_dir
        .file_name()
        .ok_or_else(|| BagsError::Archive(format!("invalid bag path {bag_dir}")))?;
    let zip_path = bag_dir.with_extension("zip");
    let parent = zip_path
        .parent()
        .ok_or_else(|| BagsError::Archive(format!("invalid archive path {zip_path}")))?;

    let temp = tempfile::Builder::new()
        .prefix(".hubmapbags")
        .suffix(".zip")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| BagsError::Filesystem(err.to_string()))?;
    let file = temp
        .reopen()
        .map_err(|err| BagsError::Filesystem(err.to_string()))?;
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(bag_dir.as_std_path())
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|err| BagsError::Archive(err.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(bag_dir.as_std_path())
            .map_err(|err| BagsError::Archive(err.to_string()))?;
        let relative = relative
            .to_str()
            .ok_or_else(|| BagsError::Archive("non UTF-8 path in bag".to_string()))?
            .replace('\\', "/");
        let entry_name = if relative.is_empty() {
            name.to_string()
        } else {
            format!("{name}/{relative}")
        };

        if entry.file_type().is_dir() {
            writer
                .add_directory(format!("{entry_name}/"), options)
                .map_err(|err| BagsError::Archive(err.to_string()))?;
            continue;
        }
        writer
            .start_file(entry_name, options)
            .map_err(|err| BagsError::Archive(err.to_string()))?;
        let mut source =
            File::open(entry.path()).map_err(|err| BagsError::Filesystem(err.to_string()))?;
        io::copy(&mut source, &mut writer).map_err(|err| BagsError::Archive(err.to_string()))?;
    }
    writer
        .finish()
        .map_err(|err| BagsError::Archive(err.to_string()))?
        .flush()
        .map_err(|err| BagsError::Filesystem(err.to_string()))?;

    temp.persist(zip_path.as_std_path())
        .map_err(|err| BagsError::Filesystem(err.to_string()))?;
    Ok(zip_path)
}

pub fn validate_archive(zip_path: &Utf8Path) -> Result<usize, BagsError> {
    let file = File::open(zip_path.as_std_path())
        .map_err(|err| BagsError::Archive(format!("open zip {zip_path}: {err}")))?;
    let mut archive = ZipArchive::new(file).map_err(|err| BagsError::Archive(err.to_string()))?;

    let mut files = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| BagsError::Archive(err.to_string()))?;
        if entry.enclosed_name().is_none() {
            return Err(BagsError::Archive(format!(
                "zip entry escapes the archive: {}",
                entry.name()
            )));
        }
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink()).map_err(|err| BagsError::Archive(err.to_string()))?;
        files += 1;
    }
    Ok(files)
}

pub fn aggregate_bags(bags: &[Utf8PathBuf], dest: &Utf8Path) -> Result<Vec<TableCount>, BagsError> {
    Store::reset_dir(dest)?;
    let mut counts = Vec::with_capacity(SCHEMAS.len());
    for schema in SCHEMAS {
        let mut table = Table::for_schema(schema);
        let mut seen = HashSet::new();
        for bag in bags {
            let path = bag.join(schema.file_name());
            if !path.as_std_path().exists() {
                continue;
            }
            let (header, rows) = manifest::read_table(&path)?;
            if header != schema.columns {
                return Err(BagsError::Tsv(format!("unexpected header in {path}")));
            }
            for row in rows {
                if seen.insert(row.clone()) {
                    table.push(row)?;
                }
            }
        }
        manifest::write_table(dest, &table)?;
        counts.push(TableCount {
            table: schema.name.to_string(),
            rows: table.len(),
        });
    }
    tracing::info!(bags = bags.len(), dest = %dest, "aggregated bags");
    Ok(counts)
}

pub fn remove_archive(bag_dir: &Utf8Path) -> Result<bool, BagsError> {
    let zip_path = bag_dir.with_extension("zip");
    match fs::remove_file(zip_path.as_std_path()) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(BagsError::Filesystem(format!("remove {zip_path}: {err}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8(path: &std::path::Path) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
    }

    #[test]
    fn archive_round_trips_through_validation() {
        let temp = tempfile::tempdir().unwrap();
        let bag = utf8(&temp.path().join("codex-published-d1"));
        Store::ensure_dir(&bag.join("data")).unwrap();
        fs::write(bag.join("file.tsv"), "id\n").unwrap();
        fs::write(bag.join("data/extra.txt"), "x").unwrap();

        let zip_path = archive_bag(&bag).unwrap();
        assert!(zip_path.as_str().ends_with("codex-published-d1.zip"));
        assert_eq!(validate_archive(&zip_path).unwrap(), 2);
    }

    #[test]
    fn aggregate_deduplicates_rows() {
        let temp = tempfile::tempdir().unwrap();
        let root = utf8(temp.path());
        let mut bags = Vec::new();
        for name in ["a", "b"] {
            let bag = root.join(name);
            Store::ensure_dir(&bag).unwrap();
            let mut table = Table::new("id_namespace").unwrap();
            table
                .push([
                    manifest::ID_NAMESPACE,
                    "hubmap",
                    "hubmap",
                    "Human BioMolecular Atlas Program",
                ])
                .unwrap();
            manifest::write_table(&bag, &table).unwrap();
            bags.push(bag);
        }

        let counts = aggregate_bags(&bags, &root.join("submission")).unwrap();
        assert_eq!(counts.len(), SCHEMAS.len());
        let ids = counts.iter().find(|count| count.table == "id_namespace").unwrap();
        assert_eq!(ids.rows, 1);
        assert!(root.join("submission/gene.tsv").exists());
    }
}
