use std::collections::HashSet;

use crate::{
    encoding::{read_u16, read_u32, read_u8, text::decode_text},
    storage::{
        header::JetFormat,
        page_store::PageStore,
        schema::{
            ColumnDefinition, IndexColumn, IndexDefinition, TableDefinition, TableType,
        },
        usage_map::read_usage_map,
    },
    types::{
        PageId,
        anomaly::{Anomaly, AnomalyKind},
        error::{DatabaseError, Result},
        page::{PageType, RowPointer},
        value::ColumnType,
    },
};

const COLUMN_FLAG_FIXED: u8 = 0x01;
const COLUMN_FLAG_NULLABLE: u8 = 0x02;
const COLUMN_FLAG_AUTONUMBER: u8 = 0x04;
const COLUMN_EXT_FLAG_COMPRESSED: u8 = 0x01;

const INDEX_MAP_SLOTS: usize = 10;
const INDEX_MAP_UNUSED: u16 = 0xFFFF;
const INDEX_ORDER_ASCENDING: u8 = 0x01;
const INDEX_FLAG_UNIQUE: u8 = 0x01;
const INDEX_TYPE_PRIMARY: u8 = 0x01;
const INDEX_TYPE_FOREIGN_KEY: u8 = 0x02;

/*
 * Table definition buffer (after the chain is concatenated)
 * ┌──────────────────────────────────────────────────────────────┐
 * │ page header | next page(4) | row count | table type          │
 * │ var column count | column count | index count                │
 * │ real index count | usage map pointer | free map pointer      │
 * ├──────────────────────────────────────────────────────────────┤
 * │ real index entries  × real index count                       │
 * │ column descriptors  × column count                           │
 * │ column names        × column count (length prefixed)         │
 * │ real index maps     × real index count                       │
 * │ logical indexes     × index count                            │
 * │ index names         × index count (length prefixed)          │
 * └──────────────────────────────────────────────────────────────┘
 */

/// The concatenated bytes of a definition page chain.
#[derive(Debug, Clone)]
pub struct DefinitionChain {
    pub pages: Vec<PageId>,
    pub bytes: Vec<u8>,
    page_size: usize,
    continuation_header: usize,
}

impl DefinitionChain {
    /// Page and in-page offset holding byte `offset` of the buffer.
    pub fn locate(&self, offset: usize) -> (PageId, usize) {
        let first = self.pages.first().copied().unwrap_or_default();
        if offset < self.page_size {
            return (first, offset);
        }
        let body = self.page_size - self.continuation_header;
        let rest = offset - self.page_size;
        let link = 1 + rest / body;
        match self.pages.get(link) {
            Some(&page) => (page, self.continuation_header + rest % body),
            None => (
                self.pages.last().copied().unwrap_or(first),
                self.page_size,
            ),
        }
    }
}

/// Bounds-checked reads over a definition buffer, reporting failures
/// against the page and offset they happened at.
struct DefinitionCursor<'b> {
    chain: &'b DefinitionChain,
    position: usize,
}

impl<'b> DefinitionCursor<'b> {
    fn new(chain: &'b DefinitionChain, position: usize) -> Self {
        Self { chain, position }
    }

    fn corrupt(&self, offset: usize, reason: impl Into<String>) -> DatabaseError {
        let (page, page_offset) = self.chain.locate(offset);
        DatabaseError::CorruptDefinition {
            page,
            offset: page_offset,
            reason: reason.into(),
        }
    }

    fn u8_at(&self, offset: usize, what: &str) -> Result<u8> {
        read_u8(&self.chain.bytes, offset)
            .ok_or_else(|| self.corrupt(offset, format!("{} is truncated", what)))
    }

    fn u16_at(&self, offset: usize, what: &str) -> Result<u16> {
        read_u16(&self.chain.bytes, offset)
            .ok_or_else(|| self.corrupt(offset, format!("{} is truncated", what)))
    }

    fn u32_at(&self, offset: usize, what: &str) -> Result<u32> {
        read_u32(&self.chain.bytes, offset)
            .ok_or_else(|| self.corrupt(offset, format!("{} is truncated", what)))
    }

    /// Take the next `len` bytes.
    fn take(&mut self, len: usize, what: &str) -> Result<&'b [u8]> {
        let chain = self.chain;
        let start = self.position;
        let bytes = start
            .checked_add(len)
            .and_then(|end| chain.bytes.get(start..end))
            .ok_or_else(|| {
                self.corrupt(
                    start,
                    format!("{} needs {} bytes past the end of the definition", what, len),
                )
            })?;
        self.position += len;
        Ok(bytes)
    }

    fn name(&mut self, format: &JetFormat, what: &str) -> Result<String> {
        let start = self.position;
        let length = match format.name_length_width {
            1 => self.take(1, what)?[0] as usize,
            _ => {
                let bytes = self.take(2, what)?;
                u16::from_le_bytes([bytes[0], bytes[1]]) as usize
            }
        };
        let bytes = self.take(length, what)?;
        decode_text(bytes, format.version, true)
            .map_err(|err| self.corrupt(start, format!("{} is not valid text: {}", what, err)))
    }
}

struct RawColumn {
    column_type: ColumnType,
    column_id: u16,
    var_index: u16,
    display_index: u16,
    precision: u8,
    scale: u8,
    flags: u8,
    ext_flags: u8,
    fixed_offset: u16,
    length: u16,
}

struct RawRealIndex {
    columns: Vec<(u16, bool)>,
    unique: bool,
}

pub struct TableDefinitionParser<'a> {
    store: &'a PageStore,
}

impl<'a> TableDefinitionParser<'a> {
    pub fn new(store: &'a PageStore) -> Self {
        Self { store }
    }

    /// Concatenate the definition page chain starting at `first_page`.
    ///
    /// The first page is kept whole, continuation pages lose their header.
    /// Every link must be an in-range definition page that was not visited
    /// before.
    pub fn read_chain(&self, first_page: PageId) -> Result<DefinitionChain> {
        let format = self.store.format();
        let mut visited = HashSet::new();
        let mut chain = DefinitionChain {
            pages: Vec::new(),
            bytes: Vec::with_capacity(format.page_size),
            page_size: format.page_size,
            continuation_header: format.tdef_continuation_header,
        };

        let mut current = first_page;
        loop {
            if !visited.insert(current) {
                return Err(DatabaseError::Chain {
                    page: current,
                    reason: format!("page {} is linked twice", current),
                });
            }

            let page = self.store.read_page(current).map_err(|err| match err {
                DatabaseError::OutOfRange { page_count, .. } => DatabaseError::Chain {
                    page: current,
                    reason: format!("link points past the last page ({} pages)", page_count),
                },
                other => other,
            })?;
            if page.page_type != PageType::TableDefinition {
                return Err(DatabaseError::Chain {
                    page: current,
                    reason: format!("expected a table definition page, found {:?}", page.page_type),
                });
            }

            if chain.pages.is_empty() {
                chain.bytes.extend_from_slice(page.data);
            } else {
                chain
                    .bytes
                    .extend_from_slice(&page.data[format.tdef_continuation_header..]);
            }
            chain.pages.push(current);

            let next = read_u32(page.data, format.tdef_next_page_offset).unwrap_or_default();
            if next == 0 {
                break;
            }
            log::debug!("Definition page {} continues on page {}", current, next);
            current = next;
        }

        Ok(chain)
    }

    pub fn parse(&self, name: &str, definition_page: PageId) -> Result<TableDefinition> {
        let format = self.store.format();
        let chain = self.read_chain(definition_page)?;
        let cursor = DefinitionCursor::new(&chain, 0);

        let row_count = cursor.u32_at(format.tdef_row_count_offset, "row count")?;
        let table_type = cursor.u8_at(format.tdef_table_type_offset, "table type")?;
        let variable_column_count =
            cursor.u16_at(format.tdef_var_column_count_offset, "variable column count")?;
        let column_count = cursor.u16_at(format.tdef_column_count_offset, "column count")? as usize;
        let index_count = cursor.u32_at(format.tdef_index_count_offset, "index count")? as usize;
        let real_index_count =
            cursor.u32_at(format.tdef_real_index_count_offset, "real index count")? as usize;
        let usage_map = cursor.u32_at(format.tdef_usage_map_offset, "usage map pointer")?;

        let mut cursor = DefinitionCursor::new(&chain, format.tdef_header_end);
        cursor.take(
            real_index_count.saturating_mul(format.real_index_entry_size),
            "real index entries",
        )?;

        let raw_columns = (0..column_count)
            .map(|_| {
                let bytes = cursor.take(format.column_descriptor_size, "column descriptor")?;
                Ok(read_column(bytes, format))
            })
            .collect::<Result<Vec<_>>>()?;
        let names = (0..column_count)
            .map(|_| cursor.name(format, "column name"))
            .collect::<Result<Vec<_>>>()?;

        let columns = build_columns(raw_columns, names);

        let mut definition = TableDefinition::new(name, definition_page, columns);
        definition.table_type = TableType::from_u8(table_type);
        definition.row_count_estimate = row_count;
        definition.variable_column_count = variable_column_count;

        let mut anomalies = Vec::new();
        let parsed = parse_indexes(&mut cursor, format, &definition, index_count, real_index_count);
        let indexes = match parsed {
            Ok(indexes) => indexes,
            Err(err) => {
                anomalies.push(
                    Anomaly::new(
                        AnomalyKind::IndexesUnreadable,
                        definition_page,
                        format!("indexes of table '{}' ignored: {}", name, err),
                    )
                    .logged(),
                );
                Vec::new()
            }
        };

        let data_pages = self.data_pages(definition_page, usage_map, &mut anomalies);
        log::debug!(
            "Parsed table '{}' from {} definition page(s): {} columns, {} indexes, {} data pages",
            name,
            chain.pages.len(),
            definition.columns.len(),
            indexes.len(),
            data_pages.len()
        );

        Ok(definition
            .with_indexes(indexes)
            .with_data_pages(data_pages)
            .with_anomalies(anomalies))
    }

    /// Data pages owned by the definition, from its usage map when it is
    /// readable and from an owner scan otherwise.
    fn data_pages(
        &self,
        definition_page: PageId,
        usage_map: u32,
        anomalies: &mut Vec<Anomaly>,
    ) -> Vec<PageId> {
        let pointer = RowPointer::from_u32(usage_map);
        let mapped = if pointer.is_null() {
            Vec::new()
        } else {
            match read_usage_map(self.store, pointer) {
                Ok(pages) => pages,
                Err(err) => {
                    anomalies.push(
                        Anomaly::new(
                            AnomalyKind::UsageMapUnreadable,
                            definition_page,
                            format!("usage map unreadable, scanning page owners: {}", err),
                        )
                        .logged(),
                    );
                    Vec::new()
                }
            }
        };

        let owned: Vec<PageId> = mapped
            .into_iter()
            .filter(|&page_id| {
                self.store
                    .read_data_page(page_id)
                    .map(|page| page.owner == definition_page)
                    .unwrap_or(false)
            })
            .collect();
        if !owned.is_empty() {
            return owned;
        }
        self.store.data_pages_owned_by(definition_page)
    }
}

fn read_column(bytes: &[u8], format: &JetFormat) -> RawColumn {
    let u8_at = |offset: usize| read_u8(bytes, offset).unwrap_or_default();
    let u16_at = |offset: usize| read_u16(bytes, offset).unwrap_or_default();
    RawColumn {
        column_type: ColumnType::from_u8(u8_at(format.column_type_offset)),
        column_id: u16_at(format.column_id_offset),
        var_index: u16_at(format.column_var_index_offset),
        display_index: u16_at(format.column_display_index_offset),
        precision: u8_at(format.column_misc_offset),
        scale: u8_at(format.column_misc_offset + 1),
        flags: u8_at(format.column_flags_offset),
        ext_flags: format.column_ext_flags_offset.map_or(0, u8_at),
        fixed_offset: u16_at(format.column_fixed_offset_offset),
        length: u16_at(format.column_length_offset),
    }
}

/// Sort descriptors into declared order and attach their storage slots.
fn build_columns(raw_columns: Vec<RawColumn>, names: Vec<String>) -> Vec<ColumnDefinition> {
    let mut raw: Vec<(RawColumn, String)> = raw_columns.into_iter().zip(names).collect();
    raw.sort_by_key(|(column, _)| (column.display_index, column.column_id));

    raw.into_iter()
        .enumerate()
        .map(|(ordinal, (raw, name))| {
            let mut column = if raw.column_type == ColumnType::Boolean {
                ColumnDefinition::boolean(name, ordinal, raw.column_id)
            } else if raw.flags & COLUMN_FLAG_FIXED != 0 {
                let width = raw
                    .column_type
                    .fixed_width()
                    .filter(|&width| width > 0)
                    .unwrap_or(raw.length as usize);
                ColumnDefinition::fixed(
                    name,
                    ordinal,
                    raw.column_id,
                    raw.column_type,
                    raw.fixed_offset as usize,
                    width,
                )
            } else {
                ColumnDefinition::variable(
                    name,
                    ordinal,
                    raw.column_id,
                    raw.column_type,
                    raw.var_index as usize,
                )
                .with_storage_size(raw.length as usize)
            };

            if raw.flags & COLUMN_FLAG_NULLABLE == 0 {
                column = column.not_null();
            }
            if raw.flags & COLUMN_FLAG_AUTONUMBER != 0 {
                column = column.autonumber();
            }
            if raw.ext_flags & COLUMN_EXT_FLAG_COMPRESSED != 0 {
                column = column.compressed();
            }
            if raw.column_type == ColumnType::Numeric {
                column = column.with_numeric(raw.precision, raw.scale);
            }
            if let ColumnType::Unknown(code) = raw.column_type {
                log::debug!("Column '{}' has unknown type 0x{:02x}", column.name, code);
            }
            column
        })
        .collect()
}

fn parse_indexes(
    cursor: &mut DefinitionCursor<'_>,
    format: &JetFormat,
    definition: &TableDefinition,
    index_count: usize,
    real_index_count: usize,
) -> Result<Vec<IndexDefinition>> {
    let mut real_indexes = Vec::with_capacity(real_index_count);
    for _ in 0..real_index_count {
        let bytes = cursor.take(format.real_index_descriptor_size, "real index definition")?;
        let columns = (0..INDEX_MAP_SLOTS)
            .filter_map(|slot| {
                let offset = format.real_index_column_map_offset + slot * 3;
                let column_id = read_u16(bytes, offset)?;
                let order = read_u8(bytes, offset + 2)?;
                (column_id != INDEX_MAP_UNUSED).then_some((column_id, order == INDEX_ORDER_ASCENDING))
            })
            .collect();
        let flags = read_u8(bytes, format.real_index_flags_offset).unwrap_or_default();
        real_indexes.push(RawRealIndex {
            columns,
            unique: flags & INDEX_FLAG_UNIQUE != 0,
        });
    }

    let mut logical = Vec::with_capacity(index_count);
    for _ in 0..index_count {
        let bytes = cursor.take(format.logical_index_descriptor_size, "logical index")?;
        let real_number = read_u32(bytes, format.logical_index_real_number_offset).unwrap_or_default();
        let index_type = read_u8(bytes, format.logical_index_type_offset).unwrap_or_default();
        logical.push((real_number as usize, index_type));
    }

    let mut indexes = Vec::with_capacity(index_count);
    for (real_number, index_type) in logical {
        let name = cursor.name(format, "index name")?;
        let real = real_indexes.get(real_number);
        let columns = real
            .map(|real| {
                real.columns
                    .iter()
                    .filter_map(|&(column_id, ascending)| {
                        let ordinal = definition.ordinal_of(column_id)?;
                        Some(IndexColumn {
                            column: definition.columns[ordinal].name.clone(),
                            ascending,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        indexes.push(IndexDefinition {
            name,
            columns,
            unique: real.is_some_and(|real| real.unique),
            primary: index_type == INDEX_TYPE_PRIMARY,
            foreign_key: index_type == INDEX_TYPE_FOREIGN_KEY,
        });
    }
    Ok(indexes)
}
