use crate::error::BagsError;

/// Suffixes that span two dots and must win over their last component.
const COMPOUND_EXTENSIONS: &[&str] = &[".ome.tiff", ".tar.gz"];

const FILE_FORMATS: &[(&str, &str)] = &[
    (".tsv", "format:2330"),
    (".tif", "format:3547"),
    (".tiff", "format:3547"),
    (".png", "format:3547"),
    (".jpg", "format:3547"),
    (".ome.tiff", "format:3547"),
    (".czi", "format:3547"),
    (".fastq", "format:2330"),
    (".txt", "format:2330"),
    (".xml", "format:2332"),
    (".gz", "format:3989"),
    (".json", "format:2330"),
    (".xlsx", "format:3468"),
    ("._truncated_", "format:2330"),
    (".tgz", "format:3989"),
    (".tar.gz", "format:3989"),
    (".csv", "format:3752"),
    (".html", "format:2331"),
    (".htm", "format:2331"),
    (".h5", "format:3590"),
];

const DATA_TYPES: &[(&str, &str)] = &[
    (".tsv", "data:2526"),
    (".tif", "data:2968"),
    (".tiff", "data:2968"),
    (".png", "data:2968"),
    (".jpg", "data:2968"),
    (".ome.tiff", "data:2968"),
    (".czi", "data:2968"),
    (".fastq", "data:2044"),
    (".txt", "data:2526"),
    (".xml", "data:2526"),
    (".gz", "data:2044"),
    (".json", "data:2526"),
    (".xlsx", "data:2526"),
    (".csv", "data:2526"),
    (".html", "data:2526"),
    (".htm", "data:2526"),
];

const MIME_TYPES: &[(&str, &str)] = &[
    (".tsv", "text/tab-separated-values"),
    (".csv", "text/csv"),
    (".txt", "text/plain"),
    (".fastq", "text/plain"),
    (".json", "application/json"),
    (".xml", "application/xml"),
    (".html", "text/html"),
    (".htm", "text/html"),
    (".png", "image/png"),
    (".jpg", "image/jpeg"),
    (".tif", "image/tiff"),
    (".tiff", "image/tiff"),
    (".ome.tiff", "image/tiff"),
    (".gz", "application/gzip"),
    (".tgz", "application/gzip"),
    (".tar.gz", "application/gzip"),
    (".xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    (".h5", "application/x-hdf5"),
];

const ASSAY_TYPES: &[(&str, &[&str])] = &[
    ("OBI:0003087", &["af"]),
    ("OBI:0003089", &["atacseq-bulk"]),
    ("OBI:0001271", &["bulk-rna"]),
    (
        "OBI:0002631",
        &["scrna-seq-10x", "scrnaseq-10xgenomics-v3", "scrnaseq-10xgenomics-v2"],
    ),
    ("OBI:0002762", &["snatacseq"]),
    ("OBI:0002117", &["wgs"]),
    ("OBI:0003093", &["codex"]),
    ("OBI:0003098", &["lightsheet"]),
    ("OBI:0003096", &["imc", "imc2d", "imc3d"]),
    ("OBI:0003099", &["maldi-ims-neg", "maldi-ims-pos", "maldi-ims"]),
    ("OBI:0003103", &["pas"]),
    ("OBI:0003107", &["slide-seq"]),
    ("OBI:0003094", &["seqfish"]),
    (
        "OBI:0003097",
        &[
            "lc-ms-untargeted",
            "lc-ms_bottom_up",
            "lc-ms_top_down",
            "tmt-lc-ms",
            "lc-ms",
            "targeted-shotgun-lc-ms",
        ],
    ),
    ("OBI:0003109", &["snrnaseq", "snrnaseq-10xgenomics-v3"]),
    ("OBI:0003108", &["snare-atacseq2", "snare-rnaseq2", "snareseq"]),
    ("OBI:0003105", &["scirnaseq"]),
    ("OBI:0003104", &["sciatacseq"]),
    ("OBI:0003100", &["mibi"]),
    ("OBI:0003092", &["cell-dive"]),
    ("OBI:0003101", &["nanodesi"]),
    ("OBI:0000470", &["ms"]),
];

const ORGANS: &[(&str, &[&str])] = &[
    ("UBERON:0002108", &["small intestine", "si"]),
    ("UBERON:0000059", &["large intestine", "li"]),
    ("UBERON:0004538", &["left kidney", "kidney (left)", "lk"]),
    ("UBERON:0004539", &["right kidney", "kidney (right)", "rk"]),
    ("UBERON:0002106", &["spleen", "sp"]),
    ("UBERON:0002370", &["thymus", "th"]),
    ("UBERON:0000948", &["heart", "ht"]),
    (
        "UBERON:0000029",
        &[
            "lymph node", "ly", "ly01", "ly02", "ly03", "ly04", "ly05", "ly06", "ly07", "ly08",
            "ly09", "ly10", "ly11",
        ],
    ),
    ("UBERON:0002097", &["skin", "sk"]),
    ("UBERON:0000178", &["blood", "bl"]),
    ("UBERON:0002107", &["liver", "lv"]),
    ("UBERON:0002168", &["left lung", "lung (left)", "ll"]),
    ("UBERON:0002167", &["right lung", "lung (right)", "rl"]),
    ("UBERON:0000955", &["brain", "br"]),
    ("UBERON:0001264", &["pancreas", "pa"]),
];

pub fn extension_of(filename: &str) -> String {
    let lower = filename.to_lowercase();
    if let Some(ext) = COMPOUND_EXTENSIONS
        .iter()
        .find(|ext| lower.len() > ext.len() && lower.ends_with(*ext))
    {
        return ext.to_string();
    }
    match lower.rfind('.') {
        Some(0) | None => String::new(),
        Some(idx) => lower[idx..].to_string(),
    }
}

pub fn file_format(filename: &str) -> &'static str {
    lookup(FILE_FORMATS, &extension_of(filename))
}

pub fn data_type(filename: &str) -> &'static str {
    lookup(DATA_TYPES, &extension_of(filename))
}

pub fn mime_type(filename: &str) -> &'static str {
    lookup(MIME_TYPES, &extension_of(filename))
}

pub fn assay_type(data_type: &str) -> &'static str {
    let key = data_type.trim().to_lowercase();
    ASSAY_TYPES
        .iter()
        .find(|(_, names)| names.contains(&key.as_str()))
        .map(|(code, _)| *code)
        .unwrap_or("")
}

pub fn anatomy(organ: &str) -> Result<&'static str, BagsError> {
    let key = organ.trim().to_lowercase();
    ORGANS
        .iter()
        .find(|(_, names)| names.contains(&key.as_str()))
        .map(|(code, _)| *code)
        .ok_or_else(|| BagsError::UnknownOrgan(organ.to_string()))
}

fn lookup(table: &[(&str, &'static str)], ext: &str) -> &'static str {
    table
        .iter()
        .find(|(key, _)| *key == ext)
        .map(|(_, value)| *value)
        .unwrap_or("")
}
