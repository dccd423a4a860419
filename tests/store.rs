use camino::Utf8PathBuf;

use hubmap_bags::store::{CacheKind, Store};

#[test]
fn layout_paths() {
    let store = Store::new(Utf8PathBuf::from("/work"));

    assert_eq!(
        store.cache_path(CacheKind::Datasets, "HBM123.ABCD.456"),
        Utf8PathBuf::from("/work/.datasets/HBM123.ABCD.456.json")
    );
    assert!(store
        .cache_path(CacheKind::Donor, "HBM1")
        .ends_with(".donor/HBM1.json"));
    assert!(store.inventory_path("abc").ends_with(".data/abc.tsv"));
    assert!(store.checkpoint_dir().ends_with(".checkpoints"));
    assert!(store.staging_dir("bag").ends_with(".staging/bag"));
    assert!(store.reports_dir().ends_with("daily-report"));
    assert!(store.submission_dir().ends_with("submission"));
}

#[test]
fn json_cache_round_trip() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let store = Store::new(root);
    let path = store.cache_path(CacheKind::Entity, "HBM123.ABCD.456");

    assert_eq!(Store::read_json::<serde_json::Value>(&path).unwrap(), None);
    Store::write_json(&path, &serde_json::json!({ "uuid": "u1" })).unwrap();
    let value: serde_json::Value = Store::read_json(&path).unwrap().unwrap();
    assert_eq!(value["uuid"], "u1");
}

#[test]
fn list_bags_ignores_files() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let store = Store::new(root);
    Store::ensure_dir(&store.bag_dir("b-bag")).unwrap();
    Store::ensure_dir(&store.bag_dir("a-bag")).unwrap();
    std::fs::write(store.bags_dir().join("a-bag.zip"), b"zip").unwrap();

    let bags = store.list_bags().unwrap();
    let names = bags
        .iter()
        .map(|bag| bag.file_name().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["a-bag", "b-bag"]);
}
