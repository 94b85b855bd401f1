use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, RwLock},
};

use crate::{
    config::ReaderOptions,
    executor::{
        scan::{ScanIterator, Scanner},
        table_scan::TableScanner,
    },
    storage::{
        catalog::{Catalog, CatalogReader},
        header::JetVersion,
        page_store::PageStore,
        schema::TableDefinition,
        table_definition::TableDefinitionParser,
    },
    types::{
        error::{DatabaseError, Result},
        row::Table,
    },
};

/// A read-only handle on an Access database image.
///
/// The catalog is read when the handle is opened; table definitions are
/// parsed on first use and cached by catalog name.
#[derive(Debug)]
pub struct AccessDatabase {
    store: PageStore,
    options: ReaderOptions,
    catalog: Catalog,
    definitions: RwLock<HashMap<String, Arc<TableDefinition>>>,
}

impl AccessDatabase {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, ReaderOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self> {
        Self::with_store(PageStore::open(path)?, options)
    }

    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<Self> {
        Self::from_bytes_with_options(bytes, ReaderOptions::default())
    }

    pub fn from_bytes_with_options(bytes: impl Into<Arc<[u8]>>, options: ReaderOptions) -> Result<Self> {
        Self::with_store(PageStore::open_from(bytes)?, options)
    }

    fn with_store(store: PageStore, options: ReaderOptions) -> Result<Self> {
        let catalog = CatalogReader::new(&store, &options).build()?;
        log::info!(
            "Opened {:?} database with {} pages and {} user tables",
            store.version(),
            store.page_count(),
            catalog.user_tables().count()
        );
        Ok(Self {
            store,
            options,
            catalog,
            definitions: RwLock::new(HashMap::new()),
        })
    }

    pub fn version(&self) -> JetVersion {
        self.store.version()
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn page_store(&self) -> &PageStore {
        &self.store
    }

    /// Names of the tables in catalog order; system tables only when the
    /// options ask for them.
    pub fn list_tables(&self) -> Vec<String> {
        if self.options.include_system_tables {
            self.catalog.tables().map(|entry| entry.name.clone()).collect()
        } else {
            self.catalog
                .user_tables()
                .map(|entry| entry.name.clone())
                .collect()
        }
    }

    pub fn table_definition(&self, name: &str) -> Result<Arc<TableDefinition>> {
        let entry = self.catalog.get(name).ok_or_else(|| DatabaseError::TableNotFound {
            name: name.to_string(),
        })?;

        let cached = self
            .definitions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&entry.name)
            .cloned();
        if let Some(definition) = cached {
            return Ok(definition);
        }

        let definition = TableDefinitionParser::new(&self.store)
            .parse(&entry.name, entry.definition_page)
            .inspect_err(|err| log::error!("Cannot parse table '{}': {}", entry.name, err))?;
        let definition = Arc::new(definition);
        self.definitions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(entry.name.clone())
            .or_insert_with(|| Arc::clone(&definition));
        Ok(definition)
    }

    pub fn create_scanner(&self, name: &str) -> Result<TableScanner> {
        let definition = self.table_definition(name)?;
        Ok(TableScanner::new(self.store.clone(), definition, self.options.clone()))
    }

    pub fn scan_table(&self, name: &str) -> Result<ScanIterator<TableScanner>> {
        Ok(ScanIterator::new(self.create_scanner(name)?))
    }

    /// Decode every row of a table. The table's anomalies start with those
    /// met while parsing its definition, followed by the scan's.
    pub fn parse_table(&self, name: &str) -> Result<Table> {
        let mut scanner = self.create_scanner(name)?;
        let mut rows = Vec::new();
        while let Some(row) = scanner.scan()? {
            rows.push(row);
        }
        let definition = scanner.table();
        let mut anomalies = definition.anomalies.clone();
        let (table_name, columns) = (definition.name.clone(), definition.column_names());
        anomalies.extend(scanner.take_anomalies());
        log::debug!(
            "Decoded {} rows from table '{}' ({} anomalies)",
            rows.len(),
            table_name,
            anomalies.len()
        );
        Ok(Table::new(table_name, columns, rows, anomalies))
    }
}
