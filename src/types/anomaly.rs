use std::fmt;

use serde::Serialize;

use crate::types::{PageId, RecordIndex};

/// Kinds of damage the decoder recovers from instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AnomalyKind {
    /// A data page could not be read or its header is damaged; its records are lost.
    PageUnreadable,
    /// A record extends past its page or overlaps its neighbour.
    RecordOutOfBounds,
    /// The variable-length offset table of a record does not add up.
    OffsetTableInconsistent,
    /// A text value could not be decoded and was replaced by null.
    TextDecode,
    /// A memo/long value stored out of line was not followed.
    LongValueSkipped,
    /// A long value or overflow row pointed somewhere unusable.
    OverflowUnresolved,
    /// A fixed or variable value was shorter than its type requires.
    ValueTruncated,
    /// The catalog holds the same table name more than once.
    DuplicateTableName,
    /// A catalog row without a name or id was left out of the catalog.
    CatalogRowSkipped,
    /// The index descriptors of a table definition could not be read; the
    /// table is listed without indexes.
    IndexesUnreadable,
    /// A table's usage map could not be read; its data pages were found by
    /// scanning page owners instead.
    UsageMapUnreadable,
}

/// A recovered problem, reported next to the data it affected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub page: PageId,
    pub record: Option<RecordIndex>,
    pub column: Option<String>,
    pub detail: String,
}

impl Anomaly {
    pub fn new(kind: AnomalyKind, page: PageId, detail: impl Into<String>) -> Self {
        Self {
            kind,
            page,
            record: None,
            column: None,
            detail: detail.into(),
        }
    }

    pub fn at_record(mut self, record: RecordIndex) -> Self {
        self.record = Some(record);
        self
    }

    pub fn in_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Emit the anomaly through the `log` facade and hand it back for collection.
    pub(crate) fn logged(self) -> Self {
        log::warn!("{}", self);
        self
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} on page {}", self.kind, self.page)?;
        if let Some(record) = self.record {
            write!(f, ", record {}", record)?;
        }
        if let Some(column) = &self.column {
            write!(f, ", column '{}'", column)?;
        }
        write!(f, ": {}", self.detail)
    }
}
