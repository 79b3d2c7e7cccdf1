use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tracing::info;

use crate::file::{DbFile, PagedFileManager, TableId};
use crate::heap::{HeapError, HeapFile};

const CATALOG_FILE_NAME: &str = "catalog.json";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Heap file error: {0}")]
    HeapError(#[from] HeapError),

    #[error("Table {0} not found")]
    TableNotFound(TableId),

    #[error("Table {0} not found")]
    TableNameNotFound(String),

    #[error("Table {0} already exists")]
    TableExists(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub id: TableId,
    pub name: String,
    /// File name relative to the database directory
    pub file: String,
    pub tuple_size: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogData {
    next_table_id: TableId,
    tables: Vec<TableMetadata>,
}

struct CatalogInner {
    data: CatalogData,
    files: HashMap<TableId, Arc<dyn DbFile>>,
    names: HashMap<String, TableId>,
}

/// Maps table ids to the files that store them.
///
/// Tables created here are heap files in the database directory and are
/// listed in `catalog.json`; `register` adds any other `DbFile` for the
/// lifetime of the process only.
pub struct Catalog {
    dir: PathBuf,
    file_manager: Arc<Mutex<PagedFileManager>>,
    inner: RwLock<CatalogInner>,
}

impl Catalog {
    /// Open the catalog in `dir`, reopening every table it lists
    pub fn open<P: AsRef<Path>>(dir: P) -> CatalogResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let path = dir.join(CATALOG_FILE_NAME);
        let data: CatalogData = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            CatalogData::default()
        };

        let file_manager = Arc::new(Mutex::new(PagedFileManager::new()));
        let mut files: HashMap<TableId, Arc<dyn DbFile>> = HashMap::new();
        let mut names = HashMap::new();

        for table in &data.tables {
            let heap = HeapFile::open(
                Arc::clone(&file_manager),
                dir.join(&table.file),
                table.id,
                table.tuple_size,
            )?;
            files.insert(table.id, Arc::new(heap));
            names.insert(table.name.clone(), table.id);
        }

        info!(dir = %dir.display(), tables = data.tables.len(), "catalog opened");

        Ok(Self {
            dir,
            file_manager,
            inner: RwLock::new(CatalogInner { data, files, names }),
        })
    }

    /// Create a heap table storing tuples of `tuple_size` bytes
    pub fn create_table(&self, name: &str, tuple_size: usize) -> CatalogResult<TableId> {
        let mut inner = self.inner.write().unwrap();
        if inner.names.contains_key(name) {
            return Err(CatalogError::TableExists(name.to_string()));
        }

        let id = inner.data.next_table_id;
        let file = format!("{}.tbl", name);
        let heap = HeapFile::create(
            Arc::clone(&self.file_manager),
            self.dir.join(&file),
            id,
            tuple_size,
        )?;

        inner.data.next_table_id += 1;
        inner.data.tables.push(TableMetadata {
            id,
            name: name.to_string(),
            file,
            tuple_size,
        });
        inner.files.insert(id, Arc::new(heap));
        inner.names.insert(name.to_string(), id);
        self.save(&inner.data)?;

        info!(table = name, id, tuple_size, "table created");
        Ok(id)
    }

    /// Make `file` resolvable by its table id without persisting it
    pub fn register(&self, name: &str, file: Arc<dyn DbFile>) -> CatalogResult<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.names.contains_key(name) {
            return Err(CatalogError::TableExists(name.to_string()));
        }

        let id = file.table_id();
        inner.data.next_table_id = inner.data.next_table_id.max(id + 1);
        inner.names.insert(name.to_string(), id);
        inner.files.insert(id, file);
        Ok(())
    }

    pub fn file(&self, table_id: TableId) -> CatalogResult<Arc<dyn DbFile>> {
        self.inner
            .read()
            .unwrap()
            .files
            .get(&table_id)
            .cloned()
            .ok_or(CatalogError::TableNotFound(table_id))
    }

    pub fn table_id(&self, name: &str) -> CatalogResult<TableId> {
        self.inner
            .read()
            .unwrap()
            .names
            .get(name)
            .copied()
            .ok_or_else(|| CatalogError::TableNameNotFound(name.to_string()))
    }

    /// Persisted tables, in creation order
    pub fn tables(&self) -> Vec<TableMetadata> {
        self.inner.read().unwrap().data.tables.clone()
    }

    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.inner.read().unwrap().files.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn save(&self, data: &CatalogData) -> CatalogResult<()> {
        let json = serde_json::to_string_pretty(data)?;
        fs::write(self.dir.join(CATALOG_FILE_NAME), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_resolve_table() {
        let temp_dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(temp_dir.path()).unwrap();

        let id = catalog.create_table("users", 16).unwrap();
        assert_eq!(catalog.table_id("users").unwrap(), id);
        assert_eq!(catalog.file(id).unwrap().table_id(), id);
        assert!(temp_dir.path().join("users.tbl").exists());
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(temp_dir.path()).unwrap();

        catalog.create_table("users", 16).unwrap();
        let result = catalog.create_table("users", 16);
        assert!(matches!(result, Err(CatalogError::TableExists(_))));
    }

    #[test]
    fn test_unknown_table() {
        let temp_dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(temp_dir.path()).unwrap();

        assert!(matches!(
            catalog.file(42),
            Err(CatalogError::TableNotFound(42))
        ));
        assert!(matches!(
            catalog.table_id("nope"),
            Err(CatalogError::TableNameNotFound(_))
        ));
    }

    #[test]
    fn test_oversized_tuple_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(temp_dir.path()).unwrap();

        let result = catalog.create_table("wide", 8192);
        assert!(matches!(
            result,
            Err(CatalogError::HeapError(HeapError::TupleTooLarge(8192)))
        ));
    }

    #[test]
    fn test_catalog_persists_across_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (a, b) = {
            let catalog = Catalog::open(temp_dir.path()).unwrap();
            (
                catalog.create_table("a", 8).unwrap(),
                catalog.create_table("b", 32).unwrap(),
            )
        };

        let catalog = Catalog::open(temp_dir.path()).unwrap();
        assert_eq!(catalog.table_id("a").unwrap(), a);
        assert_eq!(catalog.table_id("b").unwrap(), b);
        assert_eq!(catalog.tables()[1].tuple_size, 32);

        let c = catalog.create_table("c", 8).unwrap();
        assert!(c > b);
    }
}
