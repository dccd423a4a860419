use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use hubmap_bags::error::BagsError;
use hubmap_bags::manifest::{SCHEMAS, Table, count_tables, read_table, schema, write_table};

#[test]
fn empty_tables_keep_their_header() {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

    for schema in SCHEMAS {
        write_table(&dir, &Table::for_schema(schema)).unwrap();
    }
    assert_eq!(count_tables(&dir).unwrap(), SCHEMAS.len());

    let (header, rows) = read_table(&dir.join("file_in_collection.tsv")).unwrap();
    assert_eq!(
        header,
        vec![
            "file_id_namespace",
            "file_local_id",
            "collection_id_namespace",
            "collection_local_id"
        ]
    );
    assert!(rows.is_empty());
}

#[test]
fn rows_survive_a_write() {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let mut table = Table::new("file_in_collection").unwrap();
    table
        .push(["tag:ns", "raw/a%20b.tsv", "tag:ns", "HBM123.ABCD.456"])
        .unwrap();

    let path = write_table(&dir, &table).unwrap();
    assert!(path.ends_with("file_in_collection.tsv"));
    let (_, rows) = read_table(&path).unwrap();
    assert_eq!(rows, vec![table.rows()[0].clone()]);
}

#[test]
fn unknown_table_is_rejected() {
    assert!(schema("not_a_table").is_none());
    assert_matches!(Table::new("not_a_table"), Err(BagsError::Tsv(_)));
}
