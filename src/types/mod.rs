pub mod anomaly;
pub mod error;
pub mod page;
pub mod row;
pub mod value;

// Common type aliases
pub type PageId = u32;
pub type RecordIndex = u16;
pub type ColumnId = u16;

// Page geometry per format flavour
pub const PAGE_SIZE_LEGACY: usize = 2048;
pub const PAGE_SIZE_MODERN: usize = 4096;

// Every typed page starts with its type byte followed by 0x01
pub const PAGE_TAG_SIZE: usize = 2;

// Record pointer flags, see page::SlotEntry
pub const RECORD_DELETED_FLAG: u16 = 0x8000;
pub const RECORD_OVERFLOW_FLAG: u16 = 0x4000;
pub const RECORD_OFFSET_MASK: u16 = 0x1FFF;

// The system catalog's table definition always lives here
pub const CATALOG_DEFINITION_PAGE: PageId = 2;
