use crate::donor::DonorMetadata;
use crate::error::BagsError;
use crate::formats;
use crate::inventory::FileRecord;
use crate::metadata::{DatasetRecord, DatasetSummary, format_timestamp};

use super::{ID_NAMESPACE, SCHEMAS, Table};

const PROGRAM: &str = "HuBMAP";
const PROGRAM_NAME: &str = "Human BioMolecular Atlas Program";
const HOMO_SAPIENS: &str = "NCBI:txid9606";
const HOMO_SAPIENS_NAME: &str = "Homo sapiens Linnaeus, 1758";
const DRS_BASE: &str = "http://hubmap-drs.hubmapconsortium.org/v1/objects";

#[derive(Debug, Clone, Copy)]
pub struct BagContext<'a> {
    pub summary: &'a DatasetSummary,
    pub dataset: &'a DatasetRecord,
    pub dataset_url: &'a str,
    pub sample_url: &'a str,
    pub donor: &'a DonorMetadata,
    pub files: &'a [FileRecord],
    pub dbgap_study_id: Option<&'a str>,
}

impl BagContext<'_> {
    fn collection_id(&self) -> &str {
        self.summary.hubmap_id.as_str()
    }

    fn project_id(&self) -> &str {
        &self.summary.group_name
    }

    fn biosample_id(&self) -> &str {
        &self.summary.first_sample_id
    }
}

/// Every table of a bag, in the order they are written. Tables with no
/// builder are present with zero rows.
pub fn bag_tables(ctx: &BagContext<'_>) -> Result<Vec<Table>, BagsError> {
    let mut tables = vec![
        file(ctx)?,
        biosample(ctx)?,
        biosample_in_collection(ctx)?,
        project(ctx)?,
        project_in_project(ctx)?,
        biosample_from_subject(ctx)?,
        ncbi_taxonomy()?,
        collection(ctx)?,
        collection_defined_by_project(ctx)?,
        file_describes_collection(ctx)?,
        dcc()?,
        id_namespace()?,
        subject(ctx)?,
        subject_in_collection(ctx)?,
        file_in_collection(ctx)?,
        subject_race(ctx)?,
    ];
    for schema in SCHEMAS {
        if !tables.iter().any(|table| table.schema.name == schema.name) {
            tables.push(Table::for_schema(schema));
        }
    }
    Ok(tables)
}

pub fn inventory_tables(ctx: &BagContext<'_>) -> Result<Vec<Table>, BagsError> {
    Ok(vec![file(ctx)?])
}

pub fn file(ctx: &BagContext<'_>) -> Result<Table, BagsError> {
    let mut table = Table::new("file")?;
    let assay_type = formats::assay_type(&ctx.summary.data_type);
    for record in ctx.files {
        let persistent_id = record
            .file_uuid
            .as_deref()
            .filter(|uuid| !uuid.is_empty())
            .map(|uuid| format!("{DRS_BASE}/{uuid}"))
            .unwrap_or_default();
        let dbgap = match ctx.dbgap_study_id {
            Some(study) if record.filename.contains("fastq.gz") => study,
            _ => "",
        };
        table.push([
            ID_NAMESPACE.to_string(),
            record.local_id(),
            ID_NAMESPACE.to_string(),
            ctx.project_id().to_string(),
            persistent_id,
            record.modification_date.clone(),
            record.size.to_string(),
            String::new(),
            record.sha256.clone(),
            record.md5.clone(),
            record.filename.clone(),
            record.file_format.clone(),
            String::new(),
            record.data_type.clone(),
            assay_type.to_string(),
            String::new(),
            record.mime_type.clone(),
            ID_NAMESPACE.to_string(),
            ctx.collection_id().to_string(),
            dbgap.to_string(),
        ])?;
    }
    Ok(table)
}

pub fn biosample(ctx: &BagContext<'_>) -> Result<Table, BagsError> {
    let mut table = Table::new("biosample")?;
    let anatomy = formats::anatomy(&ctx.summary.organ_type)?;
    table.push([
        ID_NAMESPACE,
        ctx.biosample_id(),
        ID_NAMESPACE,
        ctx.project_id(),
        ctx.sample_url,
        "",
        formats::assay_type(&ctx.summary.data_type),
        anatomy,
    ])?;
    Ok(table)
}

pub fn biosample_in_collection(ctx: &BagContext<'_>) -> Result<Table, BagsError> {
    let mut table = Table::new("biosample_in_collection")?;
    table.push([ID_NAMESPACE, ctx.biosample_id(), ID_NAMESPACE, ctx.collection_id()])?;
    Ok(table)
}

pub fn biosample_from_subject(ctx: &BagContext<'_>) -> Result<Table, BagsError> {
    let mut table = Table::new("biosample_from_subject")?;
    table.push([
        ID_NAMESPACE,
        ctx.biosample_id(),
        ID_NAMESPACE,
        ctx.donor.local_id.as_str(),
        "",
    ])?;
    Ok(table)
}

pub fn project(ctx: &BagContext<'_>) -> Result<Table, BagsError> {
    let mut table = Table::new("project")?;
    let provider = ctx.project_id();
    table.push([ID_NAMESPACE, PROGRAM, "", "", PROGRAM, PROGRAM_NAME, ""])?;
    table.push([
        ID_NAMESPACE.to_string(),
        provider.to_string(),
        String::new(),
        String::new(),
        provider.replace(' ', "_"),
        provider.to_string(),
        String::new(),
    ])?;
    Ok(table)
}

pub fn project_in_project(ctx: &BagContext<'_>) -> Result<Table, BagsError> {
    let mut table = Table::new("project_in_project")?;
    table.push([ID_NAMESPACE, PROGRAM, ID_NAMESPACE, ctx.project_id()])?;
    Ok(table)
}

pub fn ncbi_taxonomy() -> Result<Table, BagsError> {
    let mut table = Table::new("ncbi_taxonomy")?;
    table.push([HOMO_SAPIENS, "", HOMO_SAPIENS_NAME, HOMO_SAPIENS_NAME, ""])?;
    Ok(table)
}

pub fn collection(ctx: &BagContext<'_>) -> Result<Table, BagsError> {
    let mut table = Table::new("collection")?;
    let creation_time = ctx
        .dataset
        .published_timestamp
        .and_then(format_timestamp)
        .unwrap_or_default();
    table.push([
        ID_NAMESPACE.to_string(),
        ctx.collection_id().to_string(),
        ctx.dataset_url.to_string(),
        creation_time,
        String::new(),
        ctx.collection_id().to_string(),
        ctx.dataset.description.clone().unwrap_or_default(),
        String::new(),
    ])?;
    Ok(table)
}

pub fn collection_defined_by_project(ctx: &BagContext<'_>) -> Result<Table, BagsError> {
    let mut table = Table::new("collection_defined_by_project")?;
    table.push([ID_NAMESPACE, ctx.collection_id(), ID_NAMESPACE, ctx.project_id()])?;
    Ok(table)
}

pub fn file_describes_collection(ctx: &BagContext<'_>) -> Result<Table, BagsError> {
    let mut table = Table::new("file_describes_collection")?;
    for record in ctx
        .files
        .iter()
        .filter(|record| record.filename.contains("metadata.tsv"))
    {
        table.push([
            ID_NAMESPACE.to_string(),
            record.local_id(),
            ID_NAMESPACE.to_string(),
            ctx.collection_id().to_string(),
        ])?;
    }
    Ok(table)
}

pub fn file_in_collection(ctx: &BagContext<'_>) -> Result<Table, BagsError> {
    let mut table = Table::new("file_in_collection")?;
    for record in ctx.files {
        table.push([
            ID_NAMESPACE.to_string(),
            record.local_id(),
            ID_NAMESPACE.to_string(),
            ctx.collection_id().to_string(),
        ])?;
    }
    Ok(table)
}

pub fn dcc() -> Result<Table, BagsError> {
    let mut table = Table::new("dcc")?;
    table.push([
        "cfde_registry_dcc:hubmap",
        PROGRAM,
        PROGRAM,
        PROGRAM_NAME,
        "cfde-submissions@hubmapconsortium.org",
        "Ivan Cao-Berg",
        "http://portal.hubmapconsortium.org",
        ID_NAMESPACE,
        PROGRAM,
    ])?;
    Ok(table)
}

pub fn id_namespace() -> Result<Table, BagsError> {
    let mut table = Table::new("id_namespace")?;
    table.push([ID_NAMESPACE, "hubmap", "hubmap", PROGRAM_NAME])?;
    Ok(table)
}

pub fn subject(ctx: &BagContext<'_>) -> Result<Table, BagsError> {
    let mut table = Table::new("subject")?;
    let donor = ctx.donor;
    table.push([
        ID_NAMESPACE,
        donor.local_id.as_str(),
        ID_NAMESPACE,
        ctx.project_id(),
        donor.persistent_id.as_str(),
        "",
        donor.granularity,
        donor.sex.unwrap_or_default(),
        donor.ethnicity.unwrap_or_default(),
        donor.age_at_enrollment.as_deref().unwrap_or_default(),
    ])?;
    Ok(table)
}

pub fn subject_in_collection(ctx: &BagContext<'_>) -> Result<Table, BagsError> {
    let mut table = Table::new("subject_in_collection")?;
    table.push([
        ID_NAMESPACE,
        ctx.donor.local_id.as_str(),
        ID_NAMESPACE,
        ctx.collection_id(),
    ])?;
    Ok(table)
}

pub fn subject_race(ctx: &BagContext<'_>) -> Result<Table, BagsError> {
    let mut table = Table::new("subject_race")?;
    if let Some(race) = ctx.donor.race {
        table.push([ID_NAMESPACE, ctx.donor.local_id.as_str(), race])?;
    }
    Ok(table)
}
