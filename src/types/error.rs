use thiserror::Error;

use crate::types::PageId;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unrecognized database format: {reason}")]
    Format { reason: String },

    #[error("Page {page} out of range (page count: {page_count})")]
    OutOfRange { page: PageId, page_count: u32 },

    #[error("Broken definition page chain at page {page}: {reason}")]
    Chain { page: PageId, reason: String },

    #[error("Corrupt table definition (page {page}, offset {offset}): {reason}")]
    CorruptDefinition {
        page: PageId,
        offset: usize,
        reason: String,
    },

    #[error("Corrupted page: page_id={page_id}, reason={reason}")]
    CorruptedPage { page_id: PageId, reason: String },

    #[error("System catalog is corrupt: {reason}")]
    CatalogCorrupt { reason: String },

    #[error("Text decode error: {reason}")]
    Decode { reason: String },

    #[error("Table '{name}' not found")]
    TableNotFound { name: String },
}

impl DatabaseError {
    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        DatabaseError::Decode {
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupted_page(page_id: PageId, reason: impl Into<String>) -> Self {
        DatabaseError::CorruptedPage {
            page_id,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
