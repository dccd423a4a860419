pub mod builders;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::BagsError;
use crate::store::Store;

pub use builders::{BagContext, bag_tables, inventory_tables};

pub const ID_NAMESPACE: &str = "tag:hubmapconsortium.org,2024:";

#[derive(Debug, PartialEq, Eq)]
pub struct Schema {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

impl Schema {
    pub fn file_name(&self) -> String {
        format!("{}.tsv", self.name)
    }
}

const TERM: &[&str] = &["id", "name", "description", "synonyms"];
const TERM_WITH_ORGANISM: &[&str] = &["id", "name", "description", "synonyms", "organism"];

macro_rules! link {
    ($a:literal, $b:literal) => {
        &[
            concat!($a, "_id_namespace"),
            concat!($a, "_local_id"),
            concat!($b, "_id_namespace"),
            concat!($b, "_local_id"),
        ]
    };
}

macro_rules! tagged {
    ($entity:literal, $($extra:literal),+) => {
        &[concat!($entity, "_id_namespace"), concat!($entity, "_local_id"), $($extra),+]
    };
}

pub static SCHEMAS: &[Schema] = &[
    Schema {
        name: "analysis_type",
        columns: TERM,
    },
    Schema {
        name: "anatomy",
        columns: TERM,
    },
    Schema {
        name: "assay_type",
        columns: TERM,
    },
    Schema {
        name: "biofluid",
        columns: TERM,
    },
    Schema {
        name: "biosample",
        columns: &[
            "id_namespace",
            "local_id",
            "project_id_namespace",
            "project_local_id",
            "persistent_id",
            "creation_time",
            "assay_type",
            "anatomy",
        ],
    },
    Schema {
        name: "biosample_disease",
        columns: tagged!("biosample", "association_type", "disease"),
    },
    Schema {
        name: "biosample_from_subject",
        columns: &[
            "biosample_id_namespace",
            "biosample_local_id",
            "subject_id_namespace",
            "subject_local_id",
            "age_at_sampling",
        ],
    },
    Schema {
        name: "biosample_gene",
        columns: tagged!("biosample", "gene"),
    },
    Schema {
        name: "biosample_in_collection",
        columns: link!("biosample", "collection"),
    },
    Schema {
        name: "biosample_substance",
        columns: tagged!("biosample", "substance"),
    },
    Schema {
        name: "collection",
        columns: &[
            "id_namespace",
            "local_id",
            "persistent_id",
            "creation_time",
            "abbreviation",
            "name",
            "description",
            "has_time_series_data",
        ],
    },
    Schema {
        name: "collection_anatomy",
        columns: tagged!("collection", "anatomy"),
    },
    Schema {
        name: "collection_biofluid",
        columns: tagged!("collection", "biofluid"),
    },
    Schema {
        name: "collection_compound",
        columns: tagged!("collection", "compound"),
    },
    Schema {
        name: "collection_defined_by_project",
        columns: link!("collection", "project"),
    },
    Schema {
        name: "collection_disease",
        columns: tagged!("collection", "disease"),
    },
    Schema {
        name: "collection_gene",
        columns: tagged!("collection", "gene"),
    },
    Schema {
        name: "collection_in_collection",
        columns: link!("superset_collection", "subset_collection"),
    },
    Schema {
        name: "collection_phenotype",
        columns: tagged!("collection", "phenotype"),
    },
    Schema {
        name: "collection_protein",
        columns: tagged!("collection", "protein"),
    },
    Schema {
        name: "collection_substance",
        columns: tagged!("collection", "substance"),
    },
    Schema {
        name: "collection_taxonomy",
        columns: tagged!("collection", "taxon"),
    },
    Schema {
        name: "compound",
        columns: TERM,
    },
    Schema {
        name: "data_type",
        columns: TERM,
    },
    Schema {
        name: "dcc",
        columns: &[
            "id",
            "dcc_name",
            "dcc_abbreviation",
            "dcc_description",
            "contact_email",
            "contact_name",
            "dcc_url",
            "project_id_namespace",
            "project_local_id",
        ],
    },
    Schema {
        name: "disease",
        columns: TERM,
    },
    Schema {
        name: "file",
        columns: &[
            "id_namespace",
            "local_id",
            "project_id_namespace",
            "project_local_id",
            "persistent_id",
            "creation_time",
            "size_in_bytes",
            "uncompressed_size_in_bytes",
            "sha256",
            "md5",
            "filename",
            "file_format",
            "compression_format",
            "data_type",
            "assay_type",
            "analysis_type",
            "mime_type",
            "bundle_collection_id_namespace",
            "bundle_collection_local_id",
            "dbgap_study_id",
        ],
    },
    Schema {
        name: "file_describes_biosample",
        columns: link!("file", "biosample"),
    },
    Schema {
        name: "file_describes_collection",
        columns: link!("file", "collection"),
    },
    Schema {
        name: "file_describes_subject",
        columns: link!("file", "subject"),
    },
    Schema {
        name: "file_format",
        columns: TERM,
    },
    Schema {
        name: "file_in_collection",
        columns: link!("file", "collection"),
    },
    Schema {
        name: "gene",
        columns: TERM_WITH_ORGANISM,
    },
    Schema {
        name: "id_namespace",
        columns: &["id", "abbreviation", "name", "description"],
    },
    Schema {
        name: "ncbi_taxonomy",
        columns: &["id", "clade", "name", "description", "synonyms"],
    },
    Schema {
        name: "phenotype",
        columns: TERM,
    },
    Schema {
        name: "phenotype_disease",
        columns: &["phenotype", "disease"],
    },
    Schema {
        name: "phenotype_gene",
        columns: &["phenotype", "gene"],
    },
    Schema {
        name: "project",
        columns: &[
            "id_namespace",
            "local_id",
            "persistent_id",
            "creation_time",
            "abbreviation",
            "name",
            "description",
        ],
    },
    Schema {
        name: "project_in_project",
        columns: link!("parent_project", "child_project"),
    },
    Schema {
        name: "protein",
        columns: TERM_WITH_ORGANISM,
    },
    Schema {
        name: "protein_gene",
        columns: &["protein", "gene"],
    },
    Schema {
        name: "subject",
        columns: &[
            "id_namespace",
            "local_id",
            "project_id_namespace",
            "project_local_id",
            "persistent_id",
            "creation_time",
            "granularity",
            "sex",
            "ethnicity",
            "age_at_enrollment",
        ],
    },
    Schema {
        name: "subject_disease",
        columns: tagged!("subject", "association_type", "disease"),
    },
    Schema {
        name: "subject_in_collection",
        columns: link!("subject", "collection"),
    },
    Schema {
        name: "subject_phenotype",
        columns: tagged!("subject", "association_type", "phenotype"),
    },
    Schema {
        name: "subject_race",
        columns: tagged!("subject", "race"),
    },
    Schema {
        name: "subject_role_taxonomy",
        columns: tagged!("subject", "role_id", "taxonomy_id"),
    },
    Schema {
        name: "subject_substance",
        columns: tagged!("subject", "substance"),
    },
    Schema {
        name: "substance",
        columns: &["id", "name", "description", "synonyms", "compound"],
    },
];

pub fn schema(name: &str) -> Option<&'static Schema> {
    SCHEMAS.iter().find(|schema| schema.name == name)
}

#[derive(Debug, Clone)]
pub struct Table {
    pub schema: &'static Schema,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(name: &str) -> Result<Self, BagsError> {
        let schema =
            schema(name).ok_or_else(|| BagsError::Tsv(format!("unknown manifest table {name}")))?;
        Ok(Self::for_schema(schema))
    }

    pub fn for_schema(schema: &'static Schema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    pub fn push<I, S>(&mut self, row: I) -> Result<(), BagsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let row = row.into_iter().map(Into::into).collect::<Vec<String>>();
        if row.len() != self.schema.columns.len() {
            return Err(BagsError::RowWidth {
                table: self.schema.name,
                expected: self.schema.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn write_table(dir: &Utf8Path, table: &Table) -> Result<Utf8PathBuf, BagsError> {
    let path = dir.join(table.schema.file_name());
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(Vec::new());
    writer.write_record(table.schema.columns)?;
    for row in table.rows() {
        writer.write_record(row)?;
    }
    let content = writer
        .into_inner()
        .map_err(|err| BagsError::Tsv(err.to_string()))?;
    Store::write_bytes_atomic(&path, &content)?;
    Ok(path)
}

pub fn read_table(path: &Utf8Path) -> Result<(Vec<String>, Vec<Vec<String>>), BagsError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(false)
        .from_path(path.as_std_path())?;
    let header = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok((header, rows))
}

pub fn count_tables(dir: &Utf8Path) -> Result<usize, BagsError> {
    let entries =
        std::fs::read_dir(dir.as_std_path()).map_err(|err| BagsError::Filesystem(err.to_string()))?;
    let mut count = 0;
    for entry in entries {
        let entry = entry.map_err(|err| BagsError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if path.is_file() && path.extension().map(|ext| ext == "tsv").unwrap_or(false) {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn schema_names_are_unique() {
        let mut names = SCHEMAS.iter().map(|schema| schema.name).collect::<Vec<_>>();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), SCHEMAS.len());
        assert_eq!(SCHEMAS.len(), 50);
    }

    #[test]
    fn link_tables_expand_columns() {
        assert_eq!(
            schema("file_in_collection").unwrap().columns,
            &[
                "file_id_namespace",
                "file_local_id",
                "collection_id_namespace",
                "collection_local_id"
            ]
        );
        assert_eq!(
            schema("subject_role_taxonomy").unwrap().columns,
            &["subject_id_namespace", "subject_local_id", "role_id", "taxonomy_id"]
        );
    }

    #[test]
    fn rows_must_match_width() {
        let mut table = Table::new("phenotype_gene").unwrap();
        table.push(["HP:1", "ENSG1"]).unwrap();
        assert_matches!(
            table.push(["HP:1"]),
            Err(BagsError::RowWidth { expected: 2, actual: 1, .. })
        );
    }
}
