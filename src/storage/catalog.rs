use std::collections::HashMap;

use serde::Serialize;

use crate::{
    config::ReaderOptions,
    executor::row_decoder::RowDecoder,
    storage::{page_store::PageStore, table_definition::TableDefinitionParser},
    types::{
        CATALOG_DEFINITION_PAGE, PageId,
        anomaly::{Anomaly, AnomalyKind},
        error::{DatabaseError, Result},
        row::Row,
        value::Value,
    },
};

pub const CATALOG_TABLE_NAME: &str = "MSysObjects";

const SYSTEM_NAME_PREFIX: &str = "msys";
const SYSTEM_FLAGS_MASK: u32 = 0x8000_0002;
const DEFINITION_PAGE_MASK: i64 = 0x00FF_FFFF;
const CATALOG_COLUMNS: [&str; 4] = ["Id", "Name", "Type", "Flags"];

/// Object kinds of catalog entries, keyed by their `Type` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ObjectKind {
    Table,
    OdbcLinkedTable,
    Query,
    LinkedTable,
    Relationship,
    Other(i64),
}

impl ObjectKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => ObjectKind::Table,
            4 => ObjectKind::OdbcLinkedTable,
            5 => ObjectKind::Query,
            6 => ObjectKind::LinkedTable,
            8 => ObjectKind::Relationship,
            other => ObjectKind::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub definition_page: PageId,
    pub kind: ObjectKind,
    pub flags: u32,
    pub system: bool,
}

/// Every object listed by the system catalog, in catalog order.
///
/// Only local tables are reachable by name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    /// Entry positions of the local tables, first occurrence of each name.
    #[serde(skip)]
    tables: Vec<usize>,
    #[serde(skip)]
    tables_by_name: HashMap<String, usize>,
    anomalies: Vec<Anomaly>,
}

impl Catalog {
    /// Exact name first, then ASCII case-insensitive.
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        if let Some(&index) = self.tables_by_name.get(name) {
            return self.entries.get(index);
        }
        self.tables().find(|entry| entry.name.eq_ignore_ascii_case(name))
    }

    /// Local tables, system tables included.
    pub fn tables(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.tables.iter().map(|&index| &self.entries[index])
    }

    pub fn user_tables(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.tables().filter(|entry| !entry.system)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, entry: CatalogEntry) {
        if entry.kind == ObjectKind::Table {
            if self.tables_by_name.contains_key(&entry.name) {
                self.anomalies.push(
                    Anomaly::new(
                        AnomalyKind::DuplicateTableName,
                        entry.definition_page,
                        format!("table '{}' is listed more than once, keeping the first", entry.name),
                    )
                    .logged(),
                );
            } else {
                self.tables_by_name
                    .insert(entry.name.clone(), self.entries.len());
                self.tables.push(self.entries.len());
            }
        }
        self.entries.push(entry);
    }
}

pub fn is_system_object(name: &str, flags: u32) -> bool {
    flags & SYSTEM_FLAGS_MASK != 0
        || name
            .get(..SYSTEM_NAME_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(SYSTEM_NAME_PREFIX))
}

/// Builds the [`Catalog`] from the `MSysObjects` table.
pub struct CatalogReader<'a> {
    store: &'a PageStore,
    options: &'a ReaderOptions,
}

impl<'a> CatalogReader<'a> {
    pub fn new(store: &'a PageStore, options: &'a ReaderOptions) -> Self {
        Self { store, options }
    }

    pub fn build(&self) -> Result<Catalog> {
        let definition = TableDefinitionParser::new(self.store)
            .parse(CATALOG_TABLE_NAME, CATALOG_DEFINITION_PAGE)
            .map_err(|err| catalog_corrupt(format!("catalog definition: {}", err)))?;
        for required in CATALOG_COLUMNS {
            if definition.column(required).is_none() {
                return Err(catalog_corrupt(format!("catalog has no '{}' column", required)));
            }
        }
        // Property blobs and the other catalog columns are never decoded
        let projected = definition.project(&CATALOG_COLUMNS);

        let decoder = RowDecoder::new(self.store, self.options);
        let mut catalog = Catalog {
            anomalies: definition.anomalies.clone(),
            ..Catalog::default()
        };
        for &page_id in &projected.data_pages {
            let page_rows = decoder
                .decode_page_at(page_id, &projected)
                .map_err(|err| catalog_corrupt(format!("catalog data page {}: {}", page_id, err)))?;
            catalog.anomalies.extend(page_rows.anomalies);
            for row in &page_rows.rows {
                match entry_from_row(row) {
                    Some(entry) => catalog.insert(entry),
                    None => catalog.anomalies.push(
                        Anomaly::new(
                            AnomalyKind::CatalogRowSkipped,
                            page_id,
                            format!("catalog row without a name or id skipped: {:?}", row.values()),
                        )
                        .logged(),
                    ),
                }
            }
        }

        log::debug!(
            "Catalog lists {} objects, {} of them user tables",
            catalog.len(),
            catalog.user_tables().count()
        );
        Ok(catalog)
    }
}

fn entry_from_row(row: &Row) -> Option<CatalogEntry> {
    let name = row.get("Name")?.as_str()?.to_string();
    let id = row.get("Id")?.as_i64()?;
    let kind = ObjectKind::from_code(row.get("Type").and_then(Value::as_i64).unwrap_or_default());
    let flags = row.get("Flags").and_then(Value::as_i64).unwrap_or_default() as u32;
    let system = is_system_object(&name, flags);
    Some(CatalogEntry {
        definition_page: (id & DEFINITION_PAGE_MASK) as PageId,
        name,
        kind,
        flags,
        system,
    })
}

fn catalog_corrupt(reason: String) -> DatabaseError {
    log::error!("System catalog is unreadable: {}", reason);
    DatabaseError::CatalogCorrupt { reason }
}
