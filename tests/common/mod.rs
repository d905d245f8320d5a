#![allow(dead_code)]

use tablescope::{ColumnarStore, KvStore, MemoryStore, Row, RowStore};
use tempfile::TempDir;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A row store plus the directory backing it, removed on drop.
pub struct TestStore {
    pub name: &'static str,
    pub store: Box<dyn RowStore>,
    _dir: TempDir,
}

pub fn memory_store() -> TestStore {
    TestStore {
        name: "memory",
        store: Box::new(MemoryStore::new()),
        _dir: tempfile::tempdir().unwrap(),
    }
}

pub fn kv_store() -> TestStore {
    let dir = tempfile::tempdir().unwrap();
    let store = KvStore::open(&dir.path().join("rows.db")).unwrap();
    TestStore {
        name: "kv",
        store: Box::new(store),
        _dir: dir,
    }
}

pub fn columnar_store() -> TestStore {
    let dir = tempfile::tempdir().unwrap();
    let store = ColumnarStore::open(&dir.path().join("columns")).unwrap();
    TestStore {
        name: "columnar",
        store: Box::new(store),
        _dir: dir,
    }
}

pub fn all_stores() -> Vec<TestStore> {
    init_logging();
    vec![memory_store(), kv_store(), columnar_store()]
}

pub fn row(cells: &[(&str, &str)]) -> Row {
    cells.iter().copied().collect()
}

pub fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

pub fn people() -> (Vec<String>, Vec<Row>) {
    (
        fields(&["name", "age"]),
        vec![
            row(&[("name", "Bob"), ("age", "30")]),
            row(&[("name", "Ann"), ("age", "25")]),
        ],
    )
}

pub fn column(rows: &[Row], field: &str) -> Vec<String> {
    rows.iter().map(|row| row.text(field).to_string()).collect()
}
