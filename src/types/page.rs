use std::ops::Range;

use serde::Serialize;

use crate::{
    encoding::{read_u16, read_u32},
    storage::header::JetFormat,
    types::{
        PageId, RECORD_DELETED_FLAG, RECORD_OFFSET_MASK, RECORD_OVERFLOW_FLAG, RecordIndex,
        error::DatabaseError,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PageType {
    Header,
    Data,
    TableDefinition,
    IntermediateIndex,
    LeafIndex,
    UsageBitmap,
    Unknown(u8),
}

impl PageType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => PageType::Header,
            0x01 => PageType::Data,
            0x02 => PageType::TableDefinition,
            0x03 => PageType::IntermediateIndex,
            0x04 => PageType::LeafIndex,
            0x05 => PageType::UsageBitmap,
            other => PageType::Unknown(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            PageType::Header => 0x00,
            PageType::Data => 0x01,
            PageType::TableDefinition => 0x02,
            PageType::IntermediateIndex => 0x03,
            PageType::LeafIndex => 0x04,
            PageType::UsageBitmap => 0x05,
            PageType::Unknown(value) => *value,
        }
    }
}

/// Location of a record: page in the upper 24 bits, record index in the low 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RowPointer {
    pub page: PageId,
    pub record: u8,
}

impl RowPointer {
    pub fn from_u32(raw: u32) -> Self {
        Self {
            page: raw >> 8,
            record: (raw & 0xFF) as u8,
        }
    }

    pub fn as_u32(&self) -> u32 {
        (self.page << 8) | self.record as u32
    }

    pub fn is_null(&self) -> bool {
        self.page == 0
    }
}

/// A borrowed view of one page of the file.
#[derive(Debug, Clone, Copy)]
pub struct Page<'a> {
    pub page_id: PageId,
    pub page_type: PageType,
    pub data: &'a [u8],
}

impl<'a> Page<'a> {
    pub fn new(page_id: PageId, data: &'a [u8]) -> Self {
        let page_type = data
            .first()
            .map_or(PageType::Unknown(0xFF), |&tag| PageType::from_u8(tag));
        Self {
            page_id,
            page_type,
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/*
 * Data page layout
 * ┌─────────────────────────────────────────────────────────────────┐
 * │ 01 01 | free_space(2) | owner(4) | [modern: unknown(4)]         │
 * │ record_count(2) | record pointers: record_count × u16           │
 * ├─────────────────────────────────────────────────────────────────┤
 * │                    FREE SPACE                                   │
 * ├─────────────────────────────────────────────────────────────────┤
 * │  [...record N...] [...record 1...] [...record 0...]  end of page│
 * └─────────────────────────────────────────────────────────────────┘
 *
 * Record i spans [offset_i, offset_{i-1}), record 0 ends at the page end.
 */

/// One record pointer. `raw` keeps the flag bits; `offset`/`end` are masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotEntry {
    pub raw: u16,
    pub offset: u16,
    pub end: u16,
}

impl SlotEntry {
    pub fn is_deleted(&self) -> bool {
        self.raw & RECORD_DELETED_FLAG != 0
    }

    /// The record holds a 4-byte pointer to the real record on another page.
    pub fn is_overflow(&self) -> bool {
        self.raw & RECORD_OVERFLOW_FLAG != 0
    }

    pub fn range(&self) -> Option<Range<usize>> {
        (self.offset <= self.end).then(|| self.offset as usize..self.end as usize)
    }

    pub fn length(&self) -> Option<usize> {
        self.range().map(|range| range.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotDirectory {
    pub slots: Vec<SlotEntry>,
}

/// A data page with its decoded header and record pointers.
#[derive(Debug, Clone)]
pub struct DataPage<'a> {
    pub page: Page<'a>,
    pub owner: PageId,
    pub free_space: u16,
    pub slot_directory: SlotDirectory,
    records_start: usize,
}

impl<'a> DataPage<'a> {
    pub fn from_page(page: Page<'a>, format: &JetFormat) -> Result<Self, DatabaseError> {
        if page.page_type != PageType::Data {
            return Err(DatabaseError::corrupted_page(
                page.page_id,
                format!("expected a data page, found {:?}", page.page_type),
            ));
        }

        let bytes = page.data;
        let header_error = || DatabaseError::corrupted_page(page.page_id, "truncated data page header");
        let free_space = read_u16(bytes, 2).ok_or_else(header_error)?;
        let owner = read_u32(bytes, format.data_owner_offset).ok_or_else(header_error)?;
        let record_count = read_u16(bytes, format.data_row_count_offset).ok_or_else(header_error)?;

        let records_start = format.data_row_offsets_start + record_count as usize * 2;
        if records_start > bytes.len() {
            return Err(DatabaseError::corrupted_page(
                page.page_id,
                format!(
                    "{} record pointers do not fit in a {} byte page",
                    record_count,
                    bytes.len()
                ),
            ));
        }

        let page_end = bytes.len().min(u16::MAX as usize) as u16;
        let mut slots = Vec::with_capacity(record_count as usize);
        let mut end = page_end;
        for index in 0..record_count as usize {
            let raw = read_u16(bytes, format.data_row_offsets_start + index * 2)
                .ok_or_else(header_error)?;
            let offset = raw & RECORD_OFFSET_MASK;
            slots.push(SlotEntry { raw, offset, end });
            end = offset;
        }

        Ok(Self {
            page,
            owner,
            free_space,
            slot_directory: SlotDirectory { slots },
            records_start,
        })
    }

    pub fn page_id(&self) -> PageId {
        self.page.page_id
    }

    pub fn record_count(&self) -> usize {
        self.slot_directory.slots.len()
    }

    /// Bytes of record `index`, ignoring its flags.
    ///
    /// `None` when the pointer is missing or the record would overlap the
    /// page header, its neighbour, or the end of the page.
    pub fn record(&self, index: RecordIndex) -> Option<&'a [u8]> {
        let slot = self.slot_directory.slots.get(index as usize)?;
        let range = slot.range()?;
        if range.start < self.records_start || range.end > self.page.data.len() {
            return None;
        }
        self.page.data.get(range)
    }
}
