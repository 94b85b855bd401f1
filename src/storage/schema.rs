use std::{collections::HashMap, sync::Arc};

use serde::Serialize;

use crate::types::{ColumnId, PageId, anomaly::Anomaly, value::ColumnType};

/// Where a column's bytes live inside a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StorageSlot {
    /// `width` bytes at `offset` into the fixed region.
    Fixed { offset: usize, width: usize },
    /// Entry `index` of the variable-length offset table.
    Variable { index: usize },
    /// Booleans store their value as the column's null mask bit.
    NullMask,
}

/// Represents a column definition decoded from a table definition page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDefinition {
    pub name: String,
    /// Position in declared order, starting at 0.
    pub ordinal: usize,
    /// Physical column number; indexes the record's null mask.
    pub column_id: ColumnId,
    pub column_type: ColumnType,
    pub fixed_length: bool,
    /// Declared length in bytes, for variable columns the maximum.
    pub storage_size: Option<usize>,
    pub nullable: bool,
    pub compressed: bool,
    pub autonumber: bool,
    pub precision: u8,
    pub scale: u8,
    pub slot: StorageSlot,
}

impl ColumnDefinition {
    fn base(name: impl Into<String>, ordinal: usize, column_id: ColumnId, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            ordinal,
            column_id,
            column_type,
            fixed_length: false,
            storage_size: None,
            nullable: true,
            compressed: false,
            autonumber: false,
            precision: 0,
            scale: 0,
            slot: StorageSlot::NullMask,
        }
    }

    pub fn fixed(
        name: impl Into<String>,
        ordinal: usize,
        column_id: ColumnId,
        column_type: ColumnType,
        offset: usize,
        width: usize,
    ) -> Self {
        Self {
            fixed_length: true,
            storage_size: Some(width),
            slot: StorageSlot::Fixed { offset, width },
            ..Self::base(name, ordinal, column_id, column_type)
        }
    }

    pub fn variable(
        name: impl Into<String>,
        ordinal: usize,
        column_id: ColumnId,
        column_type: ColumnType,
        index: usize,
    ) -> Self {
        Self {
            slot: StorageSlot::Variable { index },
            ..Self::base(name, ordinal, column_id, column_type)
        }
    }

    pub fn boolean(name: impl Into<String>, ordinal: usize, column_id: ColumnId) -> Self {
        Self {
            fixed_length: true,
            storage_size: Some(0),
            ..Self::base(name, ordinal, column_id, ColumnType::Boolean)
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn compressed(mut self) -> Self {
        self.compressed = true;
        self
    }

    pub fn autonumber(mut self) -> Self {
        self.autonumber = true;
        self
    }

    pub fn with_numeric(mut self, precision: u8, scale: u8) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    pub fn with_storage_size(mut self, size: usize) -> Self {
        self.storage_size = Some(size);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexColumn {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexDefinition {
    pub name: String,
    pub columns: Vec<IndexColumn>,
    pub unique: bool,
    pub primary: bool,
    pub foreign_key: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TableType {
    User,
    System,
    Other(u8),
}

impl TableType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x4E => TableType::User,
            0x53 => TableType::System,
            other => TableType::Other(other),
        }
    }
}

/// Represents a complete table definition with all column definitions
///
/// Immutable once parsed; the catalog hands it out behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDefinition {
    pub name: String,
    pub definition_page: PageId,
    pub table_type: TableType,
    /// Row count as recorded by the engine; deleted rows may still be counted.
    pub row_count_estimate: u32,
    pub variable_column_count: u16,
    /// In declared order.
    pub columns: Vec<ColumnDefinition>,
    pub indexes: Vec<IndexDefinition>,
    /// Data pages owned by this table, in page order.
    pub data_pages: Vec<PageId>,
    /// Damage recovered from while parsing the definition.
    pub anomalies: Vec<Anomaly>,
    #[serde(skip)]
    ordinals_by_id: HashMap<ColumnId, usize>,
    #[serde(skip)]
    column_names: Arc<[String]>,
}

impl TableDefinition {
    /// Columns must already be sorted into declared order.
    pub fn new(
        name: impl Into<String>,
        definition_page: PageId,
        columns: Vec<ColumnDefinition>,
    ) -> Self {
        let ordinals_by_id = columns
            .iter()
            .map(|column| (column.column_id, column.ordinal))
            .collect();
        let column_names = columns.iter().map(|column| column.name.clone()).collect();
        let variable_column_count = columns
            .iter()
            .filter(|column| matches!(column.slot, StorageSlot::Variable { .. }))
            .count() as u16;
        Self {
            name: name.into(),
            definition_page,
            table_type: TableType::User,
            row_count_estimate: 0,
            variable_column_count,
            columns,
            indexes: Vec::new(),
            data_pages: Vec::new(),
            anomalies: Vec::new(),
            ordinals_by_id,
            column_names,
        }
    }

    pub fn with_indexes(mut self, indexes: Vec<IndexDefinition>) -> Self {
        self.indexes = indexes;
        self
    }

    pub fn with_data_pages(mut self, data_pages: Vec<PageId>) -> Self {
        self.data_pages = data_pages;
        self
    }

    pub fn with_anomalies(mut self, anomalies: Vec<Anomaly>) -> Self {
        self.anomalies = anomalies;
        self
    }

    /// A definition holding only the named columns, in the order given.
    ///
    /// Storage slots and the variable column count are kept, so records of
    /// the full table still lay out correctly; missing names are ignored.
    pub fn project(&self, names: &[&str]) -> TableDefinition {
        let columns = names
            .iter()
            .filter_map(|name| self.column(name))
            .enumerate()
            .map(|(ordinal, column)| ColumnDefinition {
                ordinal,
                ..column.clone()
            })
            .collect();
        let mut projected = TableDefinition::new(self.name.clone(), self.definition_page, columns);
        projected.table_type = self.table_type;
        projected.row_count_estimate = self.row_count_estimate;
        projected.variable_column_count = self.variable_column_count;
        projected.data_pages = self.data_pages.clone();
        projected
    }

    /// Column names in declared order, shared with every decoded row.
    pub fn column_names(&self) -> Arc<[String]> {
        Arc::clone(&self.column_names)
    }

    /// Get column by name
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn storage_slot(&self, ordinal: usize) -> Option<StorageSlot> {
        self.columns.get(ordinal).map(|column| column.slot)
    }

    pub fn ordinal_of(&self, column_id: ColumnId) -> Option<usize> {
        self.ordinals_by_id.get(&column_id).copied()
    }

    pub fn has_variable_columns(&self) -> bool {
        self.variable_column_count > 0
    }

    /// Bytes covered by the fixed-width columns.
    pub fn fixed_region_len(&self) -> usize {
        self.columns
            .iter()
            .filter_map(|column| match column.slot {
                StorageSlot::Fixed { offset, width } => Some(offset + width),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    pub fn primary_key(&self) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|index| index.primary)
    }
}
