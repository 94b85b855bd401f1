use std::collections::HashSet;

use crate::{
    config::ReaderOptions,
    encoding::{fixed::decode_fixed, read_u32, text::decode_text},
    executor::record::RecordLayout,
    storage::{
        page_store::PageStore,
        schema::{ColumnDefinition, StorageSlot, TableDefinition},
    },
    types::{
        PageId, RecordIndex,
        anomaly::{Anomaly, AnomalyKind},
        error::{DatabaseError, Result},
        page::{DataPage, RowPointer},
        row::Row,
        value::{ColumnType, Value},
    },
};

const LONG_VALUE_HEADER: usize = 12;
const LONG_VALUE_INLINE: u32 = 0x8000_0000;
const LONG_VALUE_SINGLE_PAGE: u32 = 0x4000_0000;
const LONG_VALUE_LENGTH_MASK: u32 = 0x3FFF_FFFF;
const OVERFLOW_POINTER_SIZE: usize = 4;

/// Rows decoded from one data page, with whatever had to be skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRows {
    pub rows: Vec<Row>,
    pub anomalies: Vec<Anomaly>,
}

/// Where the record being decoded came from.
#[derive(Debug, Clone, Copy)]
struct RecordSite {
    page: PageId,
    record: RecordIndex,
}

impl RecordSite {
    fn anomaly(&self, kind: AnomalyKind, detail: impl Into<String>) -> Anomaly {
        Anomaly::new(kind, self.page, detail)
            .at_record(self.record)
            .logged()
    }

    fn column_anomaly(
        &self,
        kind: AnomalyKind,
        column: &ColumnDefinition,
        detail: impl Into<String>,
    ) -> Anomaly {
        Anomaly::new(kind, self.page, detail)
            .at_record(self.record)
            .in_column(column.name.as_str())
            .logged()
    }
}

/// Turns data page records into rows of a table.
pub struct RowDecoder<'a> {
    store: &'a PageStore,
    options: &'a ReaderOptions,
}

impl<'a> RowDecoder<'a> {
    pub fn new(store: &'a PageStore, options: &'a ReaderOptions) -> Self {
        Self { store, options }
    }

    /// Read data page `page_id` and decode its rows.
    pub fn decode_page_at(&self, page_id: PageId, table: &TableDefinition) -> Result<PageRows> {
        let page = self.store.read_data_page(page_id)?;
        if page.owner != table.definition_page {
            log::debug!(
                "Data page {} belongs to definition page {}, not {}",
                page_id,
                page.owner,
                table.definition_page
            );
        }
        Ok(self.decode_page(&page, table))
    }

    /// Decode every live record of `page`, in record pointer order.
    ///
    /// Deleted records are skipped silently; records that cannot be laid
    /// out are skipped with an anomaly.
    pub fn decode_page(&self, page: &DataPage<'_>, table: &TableDefinition) -> PageRows {
        let mut output = PageRows::default();
        for (index, slot) in page.slot_directory.slots.iter().enumerate() {
            if slot.is_deleted() {
                continue;
            }
            let site = RecordSite {
                page: page.page_id(),
                record: index as RecordIndex,
            };
            let Some(bytes) = page.record(site.record) else {
                output.anomalies.push(site.anomaly(
                    AnomalyKind::RecordOutOfBounds,
                    format!(
                        "record spans {}..{} outside the record area",
                        slot.offset, slot.end
                    ),
                ));
                continue;
            };

            let record = if slot.is_overflow() {
                if !self.options.follow_overflow_rows {
                    output.anomalies.push(
                        site.anomaly(AnomalyKind::OverflowUnresolved, "overflow rows are not followed"),
                    );
                    continue;
                }
                match self.overflow_target(bytes) {
                    Ok(record) => record,
                    Err(err) => {
                        output
                            .anomalies
                            .push(site.anomaly(AnomalyKind::OverflowUnresolved, err.to_string()));
                        continue;
                    }
                }
            } else {
                bytes
            };

            if let Some(row) = self.decode_record(record, table, site, &mut output.anomalies) {
                output.rows.push(row);
            }
        }
        output
    }

    /// The record an overflow pointer designates. Followed once: a target
    /// that is itself an overflow pointer is an error.
    fn overflow_target(&self, pointer_bytes: &[u8]) -> Result<&'a [u8]> {
        let raw = read_u32(pointer_bytes, 0).ok_or_else(|| {
            DatabaseError::decode(format!(
                "overflow pointer needs {} bytes, record has {}",
                OVERFLOW_POINTER_SIZE,
                pointer_bytes.len()
            ))
        })?;
        let pointer = RowPointer::from_u32(raw);
        let page = self.store.read_data_page(pointer.page)?;
        let slot = page
            .slot_directory
            .slots
            .get(pointer.record as usize)
            .ok_or_else(|| {
                DatabaseError::corrupted_page(
                    pointer.page,
                    format!("overflow target record {} does not exist", pointer.record),
                )
            })?;
        if slot.is_overflow() && !slot.is_deleted() {
            return Err(DatabaseError::corrupted_page(
                pointer.page,
                format!("overflow target record {} is another overflow pointer", pointer.record),
            ));
        }
        page.record(pointer.record as RecordIndex).ok_or_else(|| {
            DatabaseError::corrupted_page(
                pointer.page,
                format!("overflow target record {} is out of bounds", pointer.record),
            )
        })
    }

    fn decode_record(
        &self,
        record: &[u8],
        table: &TableDefinition,
        site: RecordSite,
        anomalies: &mut Vec<Anomaly>,
    ) -> Option<Row> {
        let layout = match RecordLayout::parse(record, self.store.format(), table.has_variable_columns()) {
            Ok(layout) => layout,
            Err(err) => {
                anomalies.push(site.anomaly(err.kind, err.reason));
                return None;
            }
        };

        let values = table
            .columns
            .iter()
            .map(|column| self.decode_column(column, &layout, site, anomalies))
            .collect();

        match Row::new(table.column_names(), values) {
            Ok(row) => Some(row),
            Err(err) => {
                anomalies.push(site.anomaly(AnomalyKind::ValueTruncated, err.to_string()));
                None
            }
        }
    }

    fn decode_column(
        &self,
        column: &ColumnDefinition,
        layout: &RecordLayout<'_>,
        site: RecordSite,
        anomalies: &mut Vec<Anomaly>,
    ) -> Value {
        // Columns added after the record was written read as absent
        let column_id = column.column_id as usize;
        let present = layout.has_column(column_id) && layout.is_present(column_id);

        match column.slot {
            StorageSlot::NullMask => Value::Boolean(present),
            _ if !present => Value::Null,
            StorageSlot::Fixed { offset, width } => match layout.fixed_bytes(offset, width) {
                Some(bytes) => decode_fixed(column.column_type, bytes, column.scale)
                    .unwrap_or_else(|| self.decode_variable(column, bytes, site, anomalies)),
                None => {
                    anomalies.push(site.column_anomaly(
                        AnomalyKind::ValueTruncated,
                        column,
                        format!("{} byte value at fixed offset {} is past the record end", width, offset),
                    ));
                    Value::Null
                }
            },
            StorageSlot::Variable { index } => match layout.variable_bytes(index) {
                Some(bytes) => self.decode_variable(column, bytes, site, anomalies),
                None => Value::Null,
            },
        }
    }

    fn decode_variable(
        &self,
        column: &ColumnDefinition,
        bytes: &[u8],
        site: RecordSite,
        anomalies: &mut Vec<Anomaly>,
    ) -> Value {
        match column.column_type {
            ColumnType::Text => self.text_value(column, bytes, site, anomalies),
            ColumnType::Memo => match self.long_value(column, bytes, site, anomalies) {
                Some(data) => self.text_value(column, &data, site, anomalies),
                None => Value::Null,
            },
            ColumnType::Ole => self
                .long_value(column, bytes, site, anomalies)
                .map_or(Value::Null, Value::Binary),
            column_type if column_type.fixed_width().is_some_and(|width| width > 0) => {
                decode_fixed(column_type, bytes, column.scale).unwrap_or_else(|| {
                    anomalies.push(site.column_anomaly(
                        AnomalyKind::ValueTruncated,
                        column,
                        format!("{} value holds only {} bytes", column_type, bytes.len()),
                    ));
                    Value::Null
                })
            }
            _ => Value::Binary(bytes.to_vec()),
        }
    }

    fn text_value(
        &self,
        column: &ColumnDefinition,
        bytes: &[u8],
        site: RecordSite,
        anomalies: &mut Vec<Anomaly>,
    ) -> Value {
        match decode_text(bytes, self.store.version(), column.compressed) {
            Ok(text) => Value::Text(text),
            Err(err) => {
                anomalies.push(site.column_anomaly(AnomalyKind::TextDecode, column, err.to_string()));
                Value::Null
            }
        }
    }

    /// Bytes of a memo or OLE value.
    ///
    /// Inline values are always returned; out-of-line values only when
    /// long value resolution is enabled.
    fn long_value(
        &self,
        column: &ColumnDefinition,
        bytes: &[u8],
        site: RecordSite,
        anomalies: &mut Vec<Anomaly>,
    ) -> Option<Vec<u8>> {
        let Some(header) = read_u32(bytes, 0).filter(|_| bytes.len() >= LONG_VALUE_HEADER) else {
            anomalies.push(site.column_anomaly(
                AnomalyKind::ValueTruncated,
                column,
                format!("long value header needs {} bytes, found {}", LONG_VALUE_HEADER, bytes.len()),
            ));
            return None;
        };
        let length = (header & LONG_VALUE_LENGTH_MASK) as usize;

        if header & LONG_VALUE_INLINE != 0 {
            let data = &bytes[LONG_VALUE_HEADER..];
            if data.len() < length {
                anomalies.push(site.column_anomaly(
                    AnomalyKind::ValueTruncated,
                    column,
                    format!("inline value declares {} bytes, holds {}", length, data.len()),
                ));
                return Some(data.to_vec());
            }
            return Some(data[..length].to_vec());
        }

        if !self.options.resolve_long_values {
            anomalies.push(site.column_anomaly(
                AnomalyKind::LongValueSkipped,
                column,
                format!("{} byte value is stored out of line", length),
            ));
            return None;
        }

        let pointer = RowPointer::from_u32(read_u32(bytes, 4).unwrap_or_default());
        let resolved = if header & LONG_VALUE_SINGLE_PAGE != 0 {
            self.store
                .read_record(pointer)
                .map(|record| record[..record.len().min(length)].to_vec())
        } else {
            self.long_value_chain(pointer, length)
        };
        match resolved {
            Ok(data) => Some(data),
            Err(err) => {
                anomalies.push(site.column_anomaly(AnomalyKind::OverflowUnresolved, column, err.to_string()));
                None
            }
        }
    }

    /// Collect a multi-page long value. Each record starts with the row
    /// pointer of the next one; a null pointer ends the chain.
    fn long_value_chain(&self, first: RowPointer, length: usize) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(length);
        let mut visited = HashSet::new();
        let mut pointer = first;
        while !pointer.is_null() && data.len() < length {
            if !visited.insert(pointer) {
                return Err(DatabaseError::Chain {
                    page: pointer.page,
                    reason: format!("long value record {} is linked twice", pointer.record),
                });
            }
            let record = self.store.read_record(pointer)?;
            let next = read_u32(record, 0).ok_or_else(|| {
                DatabaseError::corrupted_page(pointer.page, "long value record is shorter than its link")
            })?;
            data.extend_from_slice(&record[4..]);
            pointer = RowPointer::from_u32(next);
        }
        if data.len() < length {
            return Err(DatabaseError::decode(format!(
                "long value chain ended after {} of {} bytes",
                data.len(),
                length
            )));
        }
        data.truncate(length);
        Ok(data)
    }
}
