//! Synthetic database images for tests and benches.
//!
//! [`MockDatabase`] lays out a complete file: header page, usage map page,
//! the `MSysObjects` catalog, then for every table its definition pages,
//! optional usage bitmap page, long value pages, data pages and overflow
//! pages, in that order.

use std::{collections::VecDeque, io::Write, path::Path};

use tempfile::NamedTempFile;

use crate::{
    config::ReaderOptions,
    database::AccessDatabase,
    encoding::{fixed::encode_datetime, text::COMPRESSION_MARKER},
    storage::{
        JET_MAGIC, JET_VERSION_OFFSET,
        catalog::CATALOG_TABLE_NAME,
        header::{JetFormat, JetVersion},
    },
    types::{
        CATALOG_DEFINITION_PAGE, PageId, RECORD_DELETED_FLAG, RECORD_OVERFLOW_FLAG,
        error::{DatabaseError, Result},
        page::{PageType, RowPointer},
        value::{ColumnType, Value},
    },
};

const USAGE_MAP_PAGE: PageId = 1;
const TDEF_SIGNATURE: [u8; 2] = *b"VC";
const LVAL_OWNER: [u8; 4] = *b"LVAL";
const TABLES_CONTAINER_ID: i64 = 0x0F00_0001;
const SYSTEM_OBJECT_FLAGS: u32 = 0x8000_0002;
const CONTAINER_FLAGS: u32 = 0x8000_0000;
const LEGACY_RECORD_LIMIT: usize = 256;
const CATALOG_PROPERTY_BLOB: &[u8] = b"MR2\0\x01\x00\x00\x00";
const MAX_RECORDS_PER_PAGE: usize = 255;
const SEGMENT_SEPARATOR: u8 = 0x00;

/// Compress text the way compressed text columns store it.
///
/// Code units `0x01..=0xFF` go to single-byte segments, everything else to
/// double-byte segments. Returns `None` for text the scheme cannot carry:
/// NUL, or a double-byte unit whose low byte is zero.
pub fn compress_text(text: &str) -> Option<Vec<u8>> {
    let mut out = COMPRESSION_MARKER.to_vec();
    let mut single_byte = true;
    for unit in text.encode_utf16() {
        let wants_single = (0x01..=0xFF).contains(&unit);
        if unit == 0 || (!wants_single && unit & 0xFF == 0) {
            return None;
        }
        if wants_single != single_byte {
            out.push(SEGMENT_SEPARATOR);
            single_byte = wants_single;
        }
        if single_byte {
            out.push(unit as u8);
        } else {
            out.extend_from_slice(&unit.to_le_bytes());
        }
    }
    Some(out)
}

fn mock_error(reason: impl Into<String>) -> DatabaseError {
    DatabaseError::Format {
        reason: format!("mock database: {}", reason.into()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockColumn {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub compressed: bool,
    pub out_of_line: bool,
    pub autonumber: bool,
    pub precision: u8,
    pub scale: u8,
}

impl MockColumn {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            compressed: false,
            out_of_line: false,
            autonumber: false,
            precision: 0,
            scale: 0,
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

    /// Store memo and OLE values on long value pages instead of inline.
    pub fn out_of_line(mut self) -> Self {
        self.out_of_line = true;
        self
    }

    pub fn autonumber(mut self) -> Self {
        self.autonumber = true;
        self
    }

    pub fn numeric(mut self, precision: u8, scale: u8) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockRow {
    Live(Vec<Value>),
    /// Encoded like a live row, but its record pointer carries the deleted flag.
    Deleted(Vec<Value>),
    /// The record lives on an overflow page; the data page holds a pointer to it.
    Overflow(Vec<Value>),
    /// Bytes stored as the record, unchanged.
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UsageMapKind {
    #[default]
    Inline,
    Reference,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockIndex {
    pub name: String,
    pub columns: Vec<(String, bool)>,
    pub unique: bool,
    pub primary: bool,
}

impl MockIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            unique: false,
            primary: false,
        }
    }

    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push((name.into(), true));
        self
    }

    pub fn descending_column(mut self, name: impl Into<String>) -> Self {
        self.columns.push((name.into(), false));
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self.unique = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockTable {
    pub name: String,
    pub columns: Vec<MockColumn>,
    pub rows: Vec<MockRow>,
    pub indexes: Vec<MockIndex>,
    pub system: bool,
    pub usage_map: UsageMapKind,
}

impl MockTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            indexes: Vec::new(),
            system: false,
            usage_map: UsageMapKind::Inline,
        }
    }

    pub fn column(mut self, column: MockColumn) -> Self {
        self.columns.push(column);
        self
    }

    pub fn row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(MockRow::Live(values));
        self
    }

    pub fn deleted_row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(MockRow::Deleted(values));
        self
    }

    pub fn overflow_row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(MockRow::Overflow(values));
        self
    }

    pub fn raw_record(mut self, bytes: Vec<u8>) -> Self {
        self.rows.push(MockRow::Raw(bytes));
        self
    }

    pub fn index(mut self, index: MockIndex) -> Self {
        self.indexes.push(index);
        self
    }

    /// Flag the table as a system table in the catalog.
    pub fn system(mut self) -> Self {
        self.system = true;
        self
    }

    pub fn usage_map(mut self, kind: UsageMapKind) -> Self {
        self.usage_map = kind;
        self
    }

    fn live_row_count(&self) -> u32 {
        self.rows
            .iter()
            .filter(|row| !matches!(row, MockRow::Deleted(_)))
            .count() as u32
    }
}

/// An extra `MSysObjects` row that is not backed by a mock table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCatalogEntry {
    pub name: String,
    pub object_type: i64,
    pub flags: u32,
    pub id: i64,
}

/// Where the builder put a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockTableLayout {
    pub name: String,
    pub definition_pages: Vec<PageId>,
    pub bitmap_page: Option<PageId>,
    pub long_value_pages: Vec<PageId>,
    pub data_pages: Vec<PageId>,
    pub overflow_pages: Vec<PageId>,
}

impl MockTableLayout {
    pub fn definition_page(&self) -> PageId {
        self.definition_pages.first().copied().unwrap_or_default()
    }

    /// Data and overflow pages, the pages the usage map lists.
    pub fn owned_pages(&self) -> Vec<PageId> {
        self.data_pages
            .iter()
            .chain(&self.overflow_pages)
            .copied()
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct MockImage {
    pub version: JetVersion,
    pub page_size: usize,
    pub bytes: Vec<u8>,
    pub catalog: MockTableLayout,
    pub tables: Vec<MockTableLayout>,
}

impl MockImage {
    pub fn table(&self, name: &str) -> Option<&MockTableLayout> {
        self.tables.iter().find(|table| table.name == name)
    }

    pub fn page_count(&self) -> usize {
        self.bytes.len() / self.page_size
    }

    pub fn page(&self, page: PageId) -> &[u8] {
        let start = page as usize * self.page_size;
        self.bytes
            .get(start..start + self.page_size)
            .unwrap_or_default()
    }

    /// Overwrite bytes at `offset` of `page`; out-of-range patches are ignored.
    pub fn patch(&mut self, page: PageId, offset: usize, bytes: &[u8]) {
        let start = page as usize * self.page_size + offset;
        if let Some(target) = self.bytes.get_mut(start..start + bytes.len()) {
            target.copy_from_slice(bytes);
        }
    }

    pub fn patch_u16(&mut self, page: PageId, offset: usize, value: u16) {
        self.patch(page, offset, &value.to_le_bytes());
    }

    pub fn patch_u32(&mut self, page: PageId, offset: usize, value: u32) {
        self.patch(page, offset, &value.to_le_bytes());
    }

    pub fn open(&self) -> Result<AccessDatabase> {
        AccessDatabase::from_bytes(self.bytes.clone())
    }

    pub fn open_with_options(&self, options: ReaderOptions) -> Result<AccessDatabase> {
        AccessDatabase::from_bytes_with_options(self.bytes.clone(), options)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlannedSlot {
    Fixed { offset: usize, width: usize },
    Variable { index: usize },
    NullMask,
}

#[derive(Debug, Clone)]
struct PlannedColumn {
    source: MockColumn,
    display_index: u16,
    column_id: u16,
    slot: PlannedSlot,
}

/// Record placement: page relative to the first page of its group, slot on the page.
#[derive(Debug, Clone, Copy)]
struct Placement {
    page: usize,
    slot: usize,
}

struct BuiltTable {
    layout: MockTableLayout,
    pages: Vec<(PageId, Vec<u8>)>,
    usage_map: Vec<u8>,
}

/// Builder for a complete database image.
#[derive(Debug, Clone)]
pub struct MockDatabase {
    version: JetVersion,
    tables: Vec<MockTable>,
    catalog_entries: Vec<MockCatalogEntry>,
    catalog_rows: Vec<Vec<Value>>,
    catalog_properties: bool,
}

impl MockDatabase {
    pub fn new(version: JetVersion) -> Self {
        Self {
            version,
            tables: Vec::new(),
            catalog_entries: Vec::new(),
            catalog_rows: Vec::new(),
            catalog_properties: false,
        }
    }

    pub fn modern() -> Self {
        Self::new(JetVersion::Jet4)
    }

    pub fn legacy() -> Self {
        Self::new(JetVersion::Jet3)
    }

    pub fn with_table(mut self, table: MockTable) -> Self {
        self.tables.push(table);
        self
    }

    pub fn with_catalog_entry(mut self, entry: MockCatalogEntry) -> Self {
        self.catalog_entries.push(entry);
        self
    }

    /// Append a catalog row as is: `Id, ParentId, Name, Type, Flags`.
    pub fn with_catalog_row(mut self, values: Vec<Value>) -> Self {
        self.catalog_rows.push(values);
        self
    }

    /// Give the catalog an `LvProp` column holding an out-of-line property
    /// blob on every row.
    pub fn with_catalog_properties(mut self) -> Self {
        self.catalog_properties = true;
        self
    }

    pub fn build(&self) -> Result<MockImage> {
        let format = JetFormat::for_version(self.version);

        // Catalog row sizes do not depend on the ids, so a first pass with
        // placeholders tells where the user tables start.
        let placeholder = self.catalog_table(&vec![0; self.tables.len()]);
        let catalog_pages = build_table(&placeholder, CATALOG_DEFINITION_PAGE, 0, &format)?.pages.len();

        let mut next_page = CATALOG_DEFINITION_PAGE + catalog_pages as PageId;
        let mut built_tables = Vec::with_capacity(self.tables.len());
        for (position, table) in self.tables.iter().enumerate() {
            let built = build_table(table, next_page, position + 1, &format)?;
            next_page += built.pages.len() as PageId;
            built_tables.push(built);
        }

        let definition_pages: Vec<PageId> = built_tables
            .iter()
            .map(|built| built.layout.definition_page())
            .collect();
        let catalog = build_table(
            &self.catalog_table(&definition_pages),
            CATALOG_DEFINITION_PAGE,
            0,
            &format,
        )?;
        if catalog.layout.definition_pages.len() != 1 {
            return Err(mock_error("catalog definition does not fit one page"));
        }

        let mut pages = vec![vec![0u8; format.page_size]; next_page as usize];
        pages[0] = header_page(self.version, &format);

        let usage_records: Vec<(Vec<u8>, u16)> = std::iter::once(&catalog)
            .chain(&built_tables)
            .map(|built| (built.usage_map.clone(), 0))
            .collect();
        let sizes: Vec<usize> = usage_records.iter().map(|(record, _)| record.len()).collect();
        let placements = pack(&sizes, &format)?;
        if placements.iter().any(|placement| placement.page > 0) {
            return Err(mock_error("usage maps do not fit one page"));
        }
        let usage_refs: Vec<&(Vec<u8>, u16)> = usage_records.iter().collect();
        pages[USAGE_MAP_PAGE as usize] = data_page(&usage_refs, [0; 4], &format);

        for built in std::iter::once(&catalog).chain(&built_tables) {
            for (page_id, page) in &built.pages {
                pages[*page_id as usize] = page.clone();
            }
        }

        Ok(MockImage {
            version: self.version,
            page_size: format.page_size,
            bytes: pages.concat(),
            catalog: catalog.layout,
            tables: built_tables.into_iter().map(|built| built.layout).collect(),
        })
    }

    fn catalog_table(&self, definition_pages: &[PageId]) -> MockTable {
        let with_properties = |mut values: Vec<Value>| {
            if self.catalog_properties {
                values.push(Value::Binary(CATALOG_PROPERTY_BLOB.to_vec()));
            }
            values
        };
        let catalog_row = |id: i64, name: &str, object_type: i64, flags: u32| {
            with_properties(vec![
                Value::Integer(id),
                Value::Integer(TABLES_CONTAINER_ID),
                Value::Text(name.to_string()),
                Value::Integer(object_type),
                Value::Integer(flags as i32 as i64),
            ])
        };

        let mut table = MockTable::new(CATALOG_TABLE_NAME)
            .column(MockColumn::new("Id", ColumnType::Int32).not_null())
            .column(MockColumn::new("ParentId", ColumnType::Int32))
            .column(MockColumn::new("Name", ColumnType::Text).compressed())
            .column(MockColumn::new("Type", ColumnType::Int16))
            .column(MockColumn::new("Flags", ColumnType::Int32))
            .system();
        if self.catalog_properties {
            table = table.column(MockColumn::new("LvProp", ColumnType::Ole).out_of_line());
        }
        table = table
            .row(catalog_row(
                CATALOG_DEFINITION_PAGE as i64,
                CATALOG_TABLE_NAME,
                1,
                SYSTEM_OBJECT_FLAGS,
            ))
            .row(catalog_row(TABLES_CONTAINER_ID, "Tables", 3, CONTAINER_FLAGS));

        for (source, &page) in self.tables.iter().zip(definition_pages) {
            let flags = if source.system { SYSTEM_OBJECT_FLAGS } else { 0 };
            table = table.row(catalog_row(page as i64, &source.name, 1, flags));
        }
        for entry in &self.catalog_entries {
            table = table.row(catalog_row(entry.id, &entry.name, entry.object_type, entry.flags));
        }
        for values in &self.catalog_rows {
            table = table.row(with_properties(values.clone()));
        }
        table
    }
}

fn header_page(version: JetVersion, format: &JetFormat) -> Vec<u8> {
    let mut page = vec![0u8; format.page_size];
    page[..4].copy_from_slice(&JET_MAGIC);
    let engine = version.engine_name().as_bytes();
    page[4..4 + engine.len()].copy_from_slice(engine);
    put_u32(&mut page, JET_VERSION_OFFSET, version.code());
    page
}

fn build_table(
    table: &MockTable,
    first_page: PageId,
    usage_record: usize,
    format: &JetFormat,
) -> Result<BuiltTable> {
    let columns = plan_columns(&table.columns);
    let has_variable = columns
        .iter()
        .any(|column| matches!(column.slot, PlannedSlot::Variable { .. }));

    let usage_pointer = match table.usage_map {
        UsageMapKind::Missing => 0,
        _ => RowPointer {
            page: USAGE_MAP_PAGE,
            record: usage_record as u8,
        }
        .as_u32(),
    };
    let definition = encode_definition(table, &columns, usage_pointer, format)?;
    let definition_page_count = definition_page_count(definition.len(), format);
    let mut layout = MockTableLayout {
        name: table.name.clone(),
        definition_pages: (first_page..first_page + definition_page_count as PageId).collect(),
        ..MockTableLayout::default()
    };
    let mut next_page = first_page + definition_page_count as PageId;

    if table.usage_map == UsageMapKind::Reference {
        layout.bitmap_page = Some(next_page);
        next_page += 1;
    }

    // Long values
    let payloads = collect_long_values(table, &columns, format);
    let chunk_size = (format.page_size - format.data_row_offsets_start) / 2;
    let mut lval_records: Vec<Vec<u8>> = Vec::new();
    let mut payload_chunks: Vec<(usize, usize)> = Vec::new();
    for payload in &payloads {
        let first = lval_records.len();
        if payload.len() <= chunk_size {
            lval_records.push(payload.clone());
        } else {
            for chunk in payload.chunks(chunk_size) {
                let mut record = vec![0u8; 4];
                record.extend_from_slice(chunk);
                lval_records.push(record);
            }
        }
        payload_chunks.push((first, lval_records.len() - first));
    }
    let lval_sizes: Vec<usize> = lval_records.iter().map(Vec::len).collect();
    let lval_placements = pack(&lval_sizes, format)?;
    let lval_first = next_page;
    let lval_pointer = |index: usize| {
        let placement = lval_placements[index];
        RowPointer {
            page: lval_first + placement.page as PageId,
            record: placement.slot as u8,
        }
        .as_u32()
    };
    let mut long_values = VecDeque::new();
    for &(first, count) in &payload_chunks {
        if count > 1 {
            for index in first..first + count {
                let next = if index + 1 < first + count { lval_pointer(index + 1) } else { 0 };
                put_u32(&mut lval_records[index], 0, next);
            }
        }
        long_values.push_back((lval_pointer(first), count > 1));
    }
    let lval_page_count = page_count(&lval_placements);
    layout.long_value_pages = (lval_first..lval_first + lval_page_count as PageId).collect();
    next_page += lval_page_count as PageId;

    // Primary and overflow records
    let mut primary: Vec<(Vec<u8>, u16)> = Vec::with_capacity(table.rows.len());
    let mut overflow_targets: Vec<Vec<u8>> = Vec::new();
    for row in &table.rows {
        match row {
            MockRow::Live(values) => {
                primary.push((encode_record(&columns, values, has_variable, format, &mut long_values)?, 0));
            }
            MockRow::Deleted(values) => {
                let record = encode_record(&columns, values, has_variable, format, &mut long_values)?;
                primary.push((record, RECORD_DELETED_FLAG));
            }
            MockRow::Overflow(values) => {
                let record = encode_record(&columns, values, has_variable, format, &mut long_values)?;
                overflow_targets.push(record);
                primary.push((vec![0u8; 4], RECORD_OVERFLOW_FLAG));
            }
            MockRow::Raw(bytes) => primary.push((bytes.clone(), 0)),
        }
    }

    let primary_sizes: Vec<usize> = primary.iter().map(|(record, _)| record.len()).collect();
    let primary_placements = pack(&primary_sizes, format)?;
    let data_first = next_page;
    let data_page_count = page_count(&primary_placements);
    layout.data_pages = (data_first..data_first + data_page_count as PageId).collect();
    next_page += data_page_count as PageId;

    let overflow_sizes: Vec<usize> = overflow_targets.iter().map(Vec::len).collect();
    let overflow_placements = pack(&overflow_sizes, format)?;
    let overflow_first = next_page;
    let overflow_page_count = page_count(&overflow_placements);
    layout.overflow_pages = (overflow_first..overflow_first + overflow_page_count as PageId).collect();

    let mut targets = overflow_placements.iter();
    for (record, flags) in primary.iter_mut() {
        if *flags == RECORD_OVERFLOW_FLAG {
            let placement = targets
                .next()
                .ok_or_else(|| mock_error("overflow target missing"))?;
            let pointer = RowPointer {
                page: overflow_first + placement.page as PageId,
                record: placement.slot as u8,
            };
            put_u32(record, 0, pointer.as_u32());
        }
    }

    // Pages
    let owner = layout.definition_page().to_le_bytes();
    let mut pages = Vec::new();
    for (page_id, page) in layout
        .definition_pages
        .iter()
        .zip(split_definition(&definition, &layout.definition_pages, format))
    {
        pages.push((*page_id, page));
    }

    let owned = layout.owned_pages();
    if let Some(bitmap_page) = layout.bitmap_page {
        pages.push((bitmap_page, usage_bitmap_page(&owned, format)?));
    }

    let lval_with_flags: Vec<(Vec<u8>, u16)> = lval_records.into_iter().map(|record| (record, 0)).collect();
    for (offset, page) in group_pages(&lval_with_flags, &lval_placements, LVAL_OWNER, format)
        .into_iter()
        .enumerate()
    {
        pages.push((lval_first + offset as PageId, page));
    }
    for (offset, page) in group_pages(&primary, &primary_placements, owner, format)
        .into_iter()
        .enumerate()
    {
        pages.push((data_first + offset as PageId, page));
    }
    let overflow_with_flags: Vec<(Vec<u8>, u16)> = overflow_targets
        .into_iter()
        .map(|record| (record, RECORD_DELETED_FLAG))
        .collect();
    for (offset, page) in group_pages(&overflow_with_flags, &overflow_placements, owner, format)
        .into_iter()
        .enumerate()
    {
        pages.push((overflow_first + offset as PageId, page));
    }

    let usage_map = match (table.usage_map, layout.bitmap_page) {
        (UsageMapKind::Reference, Some(bitmap_page)) => {
            let mut record = vec![0x01];
            record.extend_from_slice(&bitmap_page.to_le_bytes());
            record
        }
        _ => inline_usage_map(&owned),
    };

    Ok(BuiltTable {
        layout,
        pages,
        usage_map,
    })
}

/// Fixed columns (booleans included) get the low column ids, then variable ones.
fn plan_columns(columns: &[MockColumn]) -> Vec<PlannedColumn> {
    let is_variable = |column: &MockColumn| column.column_type.fixed_width().is_none();
    let storage_order: Vec<usize> = (0..columns.len())
        .filter(|&i| !is_variable(&columns[i]))
        .chain((0..columns.len()).filter(|&i| is_variable(&columns[i])))
        .collect();

    let mut planned: Vec<Option<PlannedColumn>> = vec![None; columns.len()];
    let mut fixed_offset = 0;
    let mut var_index = 0;
    for (column_id, &declared) in storage_order.iter().enumerate() {
        let column = &columns[declared];
        let slot = match column.column_type.fixed_width() {
            _ if column.column_type == ColumnType::Boolean => PlannedSlot::NullMask,
            Some(width) => {
                let slot = PlannedSlot::Fixed {
                    offset: fixed_offset,
                    width,
                };
                fixed_offset += width;
                slot
            }
            None => {
                let slot = PlannedSlot::Variable { index: var_index };
                var_index += 1;
                slot
            }
        };
        planned[declared] = Some(PlannedColumn {
            source: column.clone(),
            display_index: declared as u16,
            column_id: column_id as u16,
            slot,
        });
    }
    planned.into_iter().flatten().collect()
}

fn encode_definition(
    table: &MockTable,
    columns: &[PlannedColumn],
    usage_pointer: u32,
    format: &JetFormat,
) -> Result<Vec<u8>> {
    let variable_count = columns
        .iter()
        .filter(|column| matches!(column.slot, PlannedSlot::Variable { .. }))
        .count();
    let index_count = table.indexes.len();

    let mut buffer = vec![0u8; format.tdef_header_end];
    buffer[0] = PageType::TableDefinition.as_u8();
    buffer[1] = 0x01;
    buffer[2..4].copy_from_slice(&TDEF_SIGNATURE);
    put_u32(&mut buffer, format.tdef_row_count_offset, table.live_row_count());
    buffer[format.tdef_table_type_offset] = if table.system { 0x53 } else { 0x4E };
    put_u16(&mut buffer, format.tdef_var_column_count_offset, variable_count as u16);
    put_u16(&mut buffer, format.tdef_column_count_offset, columns.len() as u16);
    put_u32(&mut buffer, format.tdef_index_count_offset, index_count as u32);
    put_u32(&mut buffer, format.tdef_real_index_count_offset, index_count as u32);
    put_u32(&mut buffer, format.tdef_usage_map_offset, usage_pointer);

    buffer.resize(buffer.len() + index_count * format.real_index_entry_size, 0);

    let mut by_id: Vec<&PlannedColumn> = columns.iter().collect();
    by_id.sort_by_key(|column| column.column_id);
    for column in &by_id {
        buffer.extend(column_descriptor(column, format));
    }
    for column in &by_id {
        push_name(&mut buffer, &column.source.name, format)?;
    }

    for index in &table.indexes {
        let mut descriptor = vec![0u8; format.real_index_descriptor_size];
        for slot in 0..10 {
            let at = format.real_index_column_map_offset + slot * 3;
            match index.columns.get(slot) {
                Some((name, ascending)) => {
                    let column = columns
                        .iter()
                        .find(|column| &column.source.name == name)
                        .ok_or_else(|| mock_error(format!("index column '{}' does not exist", name)))?;
                    put_u16(&mut descriptor, at, column.column_id);
                    descriptor[at + 2] = if *ascending { 0x01 } else { 0x02 };
                }
                None => put_u16(&mut descriptor, at, 0xFFFF),
            }
        }
        descriptor[format.real_index_flags_offset] = if index.unique { 0x01 } else { 0x00 };
        buffer.extend(descriptor);
    }
    for (number, index) in table.indexes.iter().enumerate() {
        let mut descriptor = vec![0u8; format.logical_index_descriptor_size];
        put_u32(&mut descriptor, format.logical_index_number_offset, number as u32);
        put_u32(&mut descriptor, format.logical_index_real_number_offset, number as u32);
        descriptor[format.logical_index_type_offset] = if index.primary { 0x01 } else { 0x00 };
        buffer.extend(descriptor);
    }
    for index in &table.indexes {
        push_name(&mut buffer, &index.name, format)?;
    }

    if !format.version.is_legacy() {
        let length = buffer.len() as u32;
        put_u32(&mut buffer, 8, length);
    }
    Ok(buffer)
}

fn column_descriptor(column: &PlannedColumn, format: &JetFormat) -> Vec<u8> {
    let source = &column.source;
    let mut bytes = vec![0u8; format.column_descriptor_size];
    bytes[format.column_type_offset] = source.column_type.as_u8();
    put_u16(&mut bytes, format.column_id_offset, column.column_id);
    put_u16(&mut bytes, format.column_display_index_offset, column.display_index);
    bytes[format.column_misc_offset] = source.precision;
    bytes[format.column_misc_offset + 1] = source.scale;

    let (fixed, var_index, fixed_offset, length) = match column.slot {
        PlannedSlot::Fixed { offset, width } => (true, 0, offset, width),
        PlannedSlot::NullMask => (true, 0, 0, 0),
        PlannedSlot::Variable { index } => {
            let length = match source.column_type {
                ColumnType::Text if format.version.is_legacy() => 255,
                ColumnType::Text => 510,
                ColumnType::Binary => 255,
                _ => 0,
            };
            (false, index, 0, length)
        }
    };
    put_u16(&mut bytes, format.column_var_index_offset, var_index as u16);
    put_u16(&mut bytes, format.column_fixed_offset_offset, fixed_offset as u16);
    put_u16(&mut bytes, format.column_length_offset, length as u16);

    let mut flags = 0u8;
    if fixed {
        flags |= 0x01;
    }
    if source.nullable {
        flags |= 0x02;
    }
    if source.autonumber {
        flags |= 0x04;
    }
    bytes[format.column_flags_offset] = flags;
    if let Some(ext_offset) = format.column_ext_flags_offset {
        if source.compressed {
            bytes[ext_offset] = 0x01;
        }
    }
    bytes
}

fn push_name(buffer: &mut Vec<u8>, name: &str, format: &JetFormat) -> Result<()> {
    if format.name_length_width == 1 {
        let length = u8::try_from(name.len())
            .map_err(|_| mock_error(format!("name '{}' is too long", name)))?;
        buffer.push(length);
        buffer.extend_from_slice(name.as_bytes());
    } else {
        let encoded: Vec<u8> = name.encode_utf16().flat_map(u16::to_le_bytes).collect();
        buffer.extend_from_slice(&(encoded.len() as u16).to_le_bytes());
        buffer.extend(encoded);
    }
    Ok(())
}

fn definition_page_count(length: usize, format: &JetFormat) -> usize {
    if length <= format.page_size {
        return 1;
    }
    let body = format.page_size - format.tdef_continuation_header;
    1 + (length - format.page_size).div_ceil(body)
}

/// Cut a definition buffer into linked pages.
fn split_definition(buffer: &[u8], pages: &[PageId], format: &JetFormat) -> Vec<Vec<u8>> {
    let body = format.page_size - format.tdef_continuation_header;
    let first_len = buffer.len().min(format.page_size);
    let mut chunks: Vec<Vec<u8>> = vec![buffer[..first_len].to_vec()];
    for chunk in buffer[first_len..].chunks(body) {
        let mut page = vec![0u8; format.tdef_continuation_header];
        page[0] = PageType::TableDefinition.as_u8();
        page[1] = 0x01;
        page[2..4].copy_from_slice(&TDEF_SIGNATURE);
        page.extend_from_slice(chunk);
        chunks.push(page);
    }

    chunks
        .into_iter()
        .enumerate()
        .map(|(position, mut page)| {
            page.resize(format.page_size, 0);
            let next = pages.get(position + 1).copied().unwrap_or(0);
            put_u32(&mut page, format.tdef_next_page_offset, next);
            page
        })
        .collect()
}

fn collect_long_values(
    table: &MockTable,
    columns: &[PlannedColumn],
    format: &JetFormat,
) -> Vec<Vec<u8>> {
    let mut payloads = Vec::new();
    for row in &table.rows {
        let values = match row {
            MockRow::Live(values) | MockRow::Deleted(values) | MockRow::Overflow(values) => values,
            MockRow::Raw(_) => continue,
        };
        for (column, value) in columns.iter().zip(values) {
            if !column.source.out_of_line {
                continue;
            }
            match (column.source.column_type, value) {
                (ColumnType::Memo, Value::Text(text)) => {
                    payloads.push(encode_text(text, column.source.compressed, format));
                }
                (ColumnType::Ole, Value::Binary(bytes)) => payloads.push(bytes.clone()),
                _ => {}
            }
        }
    }
    payloads
}

fn encode_record(
    columns: &[PlannedColumn],
    values: &[Value],
    has_variable: bool,
    format: &JetFormat,
    long_values: &mut VecDeque<(u32, bool)>,
) -> Result<Vec<u8>> {
    if values.len() != columns.len() {
        return Err(mock_error(format!(
            "row has {} values for {} columns",
            values.len(),
            columns.len()
        )));
    }
    let width = format.record_field_width;
    let fixed_len = columns
        .iter()
        .filter_map(|column| match column.slot {
            PlannedSlot::Fixed { offset, width } => Some(offset + width),
            _ => None,
        })
        .max()
        .unwrap_or(0);
    let variable_count = columns
        .iter()
        .filter(|column| matches!(column.slot, PlannedSlot::Variable { .. }))
        .count();

    let mut record = Vec::new();
    put_field(&mut record, columns.len(), width);
    record.resize(width + fixed_len, 0);
    let mut mask = vec![0u8; columns.len().div_ceil(8)];
    let mut variable: Vec<Option<Vec<u8>>> = vec![None; variable_count];

    for (column, value) in columns.iter().zip(values) {
        let id = column.column_id as usize;
        let present = match (column.slot, value) {
            (PlannedSlot::NullMask, Value::Boolean(flag)) => *flag,
            (PlannedSlot::NullMask, Value::Null) => false,
            (PlannedSlot::NullMask, other) => {
                return Err(mock_error(format!("cannot store {:?} in a boolean column", other)));
            }
            (_, Value::Null) => false,
            (PlannedSlot::Fixed { offset, width: size }, value) => {
                let bytes = encode_fixed(&column.source, value)?;
                if bytes.len() != size {
                    return Err(mock_error(format!("column '{}' encodes to the wrong width", column.source.name)));
                }
                record[width + offset..width + offset + size].copy_from_slice(&bytes);
                true
            }
            (PlannedSlot::Variable { index }, value) => {
                variable[index] = Some(encode_variable(&column.source, value, format, long_values)?);
                true
            }
        };
        if present {
            mask[id / 8] |= 1 << (id % 8);
        }
    }

    if has_variable {
        let mut offsets = Vec::with_capacity(variable_count + 1);
        for data in &variable {
            offsets.push(record.len());
            if let Some(data) = data {
                record.extend_from_slice(data);
            }
        }
        offsets.push(record.len());
        for &offset in offsets.iter().rev() {
            if width == 1 && offset >= LEGACY_RECORD_LIMIT {
                return Err(mock_error("legacy records must stay under 256 bytes"));
            }
            put_field(&mut record, offset, width);
        }
        put_field(&mut record, variable_count, width);
    }
    record.extend(mask);

    if width == 1 && record.len() >= LEGACY_RECORD_LIMIT {
        return Err(mock_error("legacy records must stay under 256 bytes"));
    }
    Ok(record)
}

fn put_field(record: &mut Vec<u8>, value: usize, width: usize) {
    if width == 1 {
        record.push(value as u8);
    } else {
        record.extend_from_slice(&(value as u16).to_le_bytes());
    }
}

fn encode_fixed(column: &MockColumn, value: &Value) -> Result<Vec<u8>> {
    let narrow = |value: i64| mock_error(format!("{} does not fit column '{}'", value, column.name));
    let bytes = match (column.column_type, value) {
        (ColumnType::Byte, Value::Integer(i)) => vec![u8::try_from(*i).map_err(|_| narrow(*i))?],
        (ColumnType::Int16, Value::Integer(i)) => {
            i16::try_from(*i).map_err(|_| narrow(*i))?.to_le_bytes().to_vec()
        }
        (ColumnType::Int32 | ColumnType::Complex, Value::Integer(i)) => {
            i32::try_from(*i).map_err(|_| narrow(*i))?.to_le_bytes().to_vec()
        }
        (ColumnType::Int64 | ColumnType::Currency, Value::Integer(i)) => i.to_le_bytes().to_vec(),
        (ColumnType::Float32, Value::Float(f)) => (*f as f32).to_le_bytes().to_vec(),
        (ColumnType::Float64, Value::Float(f)) => f.to_le_bytes().to_vec(),
        (ColumnType::DateTime, Value::DateTime(timestamp)) => {
            encode_datetime(*timestamp).to_le_bytes().to_vec()
        }
        (ColumnType::Guid, Value::Text(text)) => encode_guid(text)?.to_vec(),
        (ColumnType::Numeric, Value::Text(text)) => encode_numeric(text, column.scale)?.to_vec(),
        (column_type, other) => {
            return Err(mock_error(format!("cannot store {:?} in a {} column", other, column_type)));
        }
    };
    Ok(bytes)
}

fn encode_variable(
    column: &MockColumn,
    value: &Value,
    format: &JetFormat,
    long_values: &mut VecDeque<(u32, bool)>,
) -> Result<Vec<u8>> {
    match (column.column_type, value) {
        (ColumnType::Text, Value::Text(text)) => Ok(encode_text(text, column.compressed, format)),
        (ColumnType::Memo, Value::Text(text)) => {
            long_value(encode_text(text, column.compressed, format), column, long_values)
        }
        (ColumnType::Ole, Value::Binary(bytes)) => long_value(bytes.clone(), column, long_values),
        (ColumnType::Binary | ColumnType::Unknown(_), Value::Binary(bytes)) => Ok(bytes.clone()),
        (column_type, other) => Err(mock_error(format!(
            "cannot store {:?} in a {} column",
            other, column_type
        ))),
    }
}

fn long_value(
    data: Vec<u8>,
    column: &MockColumn,
    long_values: &mut VecDeque<(u32, bool)>,
) -> Result<Vec<u8>> {
    let length = data.len() as u32;
    let mut bytes = Vec::with_capacity(12 + data.len());
    if column.out_of_line {
        let (pointer, chained) = long_values
            .pop_front()
            .ok_or_else(|| mock_error("long value was not allocated"))?;
        let header = if chained { length } else { length | 0x4000_0000 };
        bytes.extend_from_slice(&header.to_le_bytes());
        bytes.extend_from_slice(&pointer.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 4]);
    } else {
        bytes.extend_from_slice(&(length | 0x8000_0000).to_le_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        bytes.extend(data);
    }
    Ok(bytes)
}

fn encode_text(text: &str, compressed: bool, format: &JetFormat) -> Vec<u8> {
    if format.version.is_legacy() {
        return text.as_bytes().to_vec();
    }
    if compressed {
        if let Some(bytes) = compress_text(text) {
            return bytes;
        }
    }
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

fn encode_guid(text: &str) -> Result<[u8; 16]> {
    let hex: String = text.chars().filter(|&c| c != '-').collect();
    if hex.len() != 32 || !hex.is_ascii() {
        return Err(mock_error(format!("'{}' is not a GUID", text)));
    }
    let mut bytes = [0u8; 16];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[2 * i..2 * i + 2], 16)
            .map_err(|_| mock_error(format!("'{}' is not a GUID", text)))?;
    }
    Ok(bytes)
}

fn encode_numeric(text: &str, scale: u8) -> Result<[u8; 17]> {
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let scale = scale as usize;
    if frac_part.len() > scale {
        return Err(mock_error(format!("'{}' has more than {} decimals", text, scale)));
    }
    let digits = format!("{}{}{}", int_part, frac_part, "0".repeat(scale - frac_part.len()));
    let magnitude: u128 = digits
        .parse()
        .map_err(|_| mock_error(format!("'{}' is not a decimal", text)))?;

    let mut bytes = [0u8; 17];
    bytes[0] = if negative { 0x80 } else { 0x00 };
    for (word, shift) in [96u32, 64, 32, 0].into_iter().enumerate() {
        let value = (magnitude >> shift) as u32;
        bytes[1 + word * 4..5 + word * 4].copy_from_slice(&value.to_le_bytes());
    }
    Ok(bytes)
}

/// Greedy placement of records onto data pages.
fn pack(sizes: &[usize], format: &JetFormat) -> Result<Vec<Placement>> {
    let capacity = format.page_size - format.data_row_offsets_start;
    let mut placements = Vec::with_capacity(sizes.len());
    let (mut page, mut used, mut slot) = (0, 0, 0);
    for &size in sizes {
        let needed = size + 2;
        if needed > capacity {
            return Err(mock_error(format!("{} byte record does not fit a page", size)));
        }
        if used + needed > capacity || slot == MAX_RECORDS_PER_PAGE {
            page += 1;
            used = 0;
            slot = 0;
        }
        placements.push(Placement { page, slot });
        used += needed;
        slot += 1;
    }
    Ok(placements)
}

fn page_count(placements: &[Placement]) -> usize {
    placements.last().map_or(0, |placement| placement.page + 1)
}

fn group_pages(
    records: &[(Vec<u8>, u16)],
    placements: &[Placement],
    owner: [u8; 4],
    format: &JetFormat,
) -> Vec<Vec<u8>> {
    let mut grouped: Vec<Vec<&(Vec<u8>, u16)>> = vec![Vec::new(); page_count(placements)];
    for (record, placement) in records.iter().zip(placements) {
        grouped[placement.page].push(record);
    }
    grouped
        .iter()
        .map(|records| data_page(records, owner, format))
        .collect()
}

/// Records are written from the end of the page backwards, record 0 last in the page.
fn data_page(records: &[&(Vec<u8>, u16)], owner: [u8; 4], format: &JetFormat) -> Vec<u8> {
    let mut page = vec![0u8; format.page_size];
    page[0] = PageType::Data.as_u8();
    page[1] = 0x01;
    page[format.data_owner_offset..format.data_owner_offset + 4].copy_from_slice(&owner);
    put_u16(&mut page, format.data_row_count_offset, records.len() as u16);

    let mut end = format.page_size;
    for (index, (record, flags)) in records.iter().map(|entry| (&entry.0, entry.1)).enumerate() {
        let start = end - record.len();
        page[start..end].copy_from_slice(record);
        put_u16(&mut page, format.data_row_offsets_start + index * 2, start as u16 | flags);
        end = start;
    }
    let free_space = end - (format.data_row_offsets_start + records.len() * 2);
    put_u16(&mut page, 2, free_space as u16);
    page
}

fn inline_usage_map(pages: &[PageId]) -> Vec<u8> {
    let start = pages.iter().min().copied().unwrap_or(0);
    let mut record = vec![0x00];
    record.extend_from_slice(&start.to_le_bytes());
    if let Some(&last) = pages.iter().max() {
        let mut bitmap = vec![0u8; ((last - start) / 8 + 1) as usize];
        for &page in pages {
            let bit = (page - start) as usize;
            bitmap[bit / 8] |= 1 << (bit % 8);
        }
        record.extend(bitmap);
    }
    record
}

fn usage_bitmap_page(pages: &[PageId], format: &JetFormat) -> Result<Vec<u8>> {
    let mut page = vec![0u8; format.page_size];
    page[0] = PageType::UsageBitmap.as_u8();
    page[1] = 0x01;
    for &owned in pages {
        let bit = owned as usize;
        let byte = page
            .get_mut(format.bitmap_page_header + bit / 8)
            .ok_or_else(|| mock_error(format!("page {} is beyond the first bitmap page", owned)))?;
        *byte |= 1 << (bit % 8);
    }
    Ok(page)
}

fn put_u16(buffer: &mut [u8], offset: usize, value: u16) {
    buffer[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buffer: &mut [u8], offset: usize, value: u32) {
    buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// A database image written to a temporary file, removed on drop.
pub struct TempDatabase {
    file: NamedTempFile,
}

impl TempDatabase {
    pub fn with_prefix(prefix: &str, image: &MockImage) -> std::io::Result<Self> {
        let suffix = if image.version.is_legacy() { ".mdb" } else { ".accdb" };
        let mut file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile()?;
        file.write_all(&image.bytes)?;
        file.flush()?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn open(&self) -> Result<AccessDatabase> {
        AccessDatabase::open(self.path())
    }
}
