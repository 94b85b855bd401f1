use crate::{
    encoding::{read_u16, read_u8},
    storage::header::JetFormat,
    types::anomaly::AnomalyKind,
};

const JUMP_SPAN: usize = 256;

/*
 * Record layout
 * ┌───────────────────────────────────────────────────────────────────────┐
 * │ column count | fixed data ... | variable data ...                     │
 * │  ... | var offsets (backward) | var count | null mask                  │
 * └───────────────────────────────────────────────────────────────────────┘
 *
 * Modern records use u16 for the column count, the variable count and the
 * offsets. Legacy records use single bytes, plus a jump table before the var
 * count: each jump adds 256 to the offsets from the listed column on.
 */

/// Why a record could not be laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutError {
    pub kind: AnomalyKind,
    pub reason: String,
}

impl LayoutError {
    fn out_of_bounds(reason: impl Into<String>) -> Self {
        Self {
            kind: AnomalyKind::RecordOutOfBounds,
            reason: reason.into(),
        }
    }

    fn inconsistent(reason: impl Into<String>) -> Self {
        Self {
            kind: AnomalyKind::OffsetTableInconsistent,
            reason: reason.into(),
        }
    }
}

/// The structural parts of one record, located but not decoded.
#[derive(Debug, Clone)]
pub struct RecordLayout<'r> {
    record: &'r [u8],
    column_count: usize,
    fixed_start: usize,
    null_mask: &'r [u8],
    /// `variable_count + 1` offsets; the last marks the end of variable data.
    var_offsets: Vec<usize>,
}

impl<'r> RecordLayout<'r> {
    pub fn parse(
        record: &'r [u8],
        format: &JetFormat,
        has_variable_columns: bool,
    ) -> Result<Self, LayoutError> {
        let width = format.record_field_width;
        let mut layout = RecordLayout {
            record,
            column_count: 0,
            fixed_start: width,
            null_mask: &[],
            var_offsets: Vec::new(),
        };
        if record.is_empty() {
            return Ok(layout);
        }

        layout.column_count = match width {
            1 => read_u8(record, 0).map(usize::from),
            _ => read_u16(record, 0).map(usize::from),
        }
        .ok_or_else(|| LayoutError::out_of_bounds("record is shorter than its column count"))?;

        let mask_len = layout.column_count.div_ceil(8);
        let mask_start = record
            .len()
            .checked_sub(mask_len)
            .filter(|&start| start >= width)
            .ok_or_else(|| {
                LayoutError::out_of_bounds(format!(
                    "{} byte null mask does not fit in a {} byte record",
                    mask_len,
                    record.len()
                ))
            })?;
        layout.null_mask = &record[mask_start..];

        if has_variable_columns {
            layout.var_offsets = if width == 1 {
                legacy_offsets(record, mask_start)?
            } else {
                modern_offsets(record, mask_start)?
            };
            validate_offsets(&layout.var_offsets, width, mask_start)?;
        }
        Ok(layout)
    }

    /// A zero-length record carries no columns at all.
    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    pub fn variable_count(&self) -> usize {
        self.var_offsets.len().saturating_sub(1)
    }

    /// Whether the record was written with this column at all.
    pub fn has_column(&self, column_id: usize) -> bool {
        column_id < self.column_count
    }

    /// The null mask bit of a column: set when a value is present.
    pub fn is_present(&self, column_id: usize) -> bool {
        self.null_mask
            .get(column_id / 8)
            .is_some_and(|byte| byte & (1 << (column_id % 8)) != 0)
    }

    pub fn fixed_bytes(&self, offset: usize, width: usize) -> Option<&'r [u8]> {
        let start = self.fixed_start.checked_add(offset)?;
        let end = start.checked_add(width)?;
        self.record.get(start..end)
    }

    /// Bytes of variable column `index`, `None` when the record predates it.
    pub fn variable_bytes(&self, index: usize) -> Option<&'r [u8]> {
        let start = *self.var_offsets.get(index)?;
        let end = *self.var_offsets.get(index.checked_add(1)?)?;
        self.record.get(start..end)
    }
}

fn modern_offsets(record: &[u8], mask_start: usize) -> Result<Vec<usize>, LayoutError> {
    let count_position = mask_start
        .checked_sub(2)
        .filter(|&position| position >= 2)
        .ok_or_else(|| LayoutError::out_of_bounds("record has no room for a variable column count"))?;
    let count = read_u16(record, count_position).unwrap_or_default() as usize;

    (0..=count)
        .map(|i| {
            count_position
                .checked_sub(2 * (i + 1))
                .filter(|&position| position >= 2)
                .and_then(|position| read_u16(record, position))
                .map(usize::from)
                .ok_or_else(|| {
                    LayoutError::inconsistent(format!(
                        "{} variable offsets do not fit before the null mask",
                        count + 1
                    ))
                })
        })
        .collect()
}

fn legacy_offsets(record: &[u8], mask_start: usize) -> Result<Vec<usize>, LayoutError> {
    let len = record.len();
    let count_position = mask_start
        .checked_sub(1)
        .filter(|&position| position >= 1)
        .ok_or_else(|| LayoutError::out_of_bounds("record has no room for a variable column count"))?;
    let count = record[count_position] as usize;

    let mut jumps = (len - 1) / JUMP_SPAN;
    let column_pointer = count_position
        .checked_sub(jumps + 1)
        .ok_or_else(|| LayoutError::inconsistent("jump table overlaps the record start"))?;
    // The last jump entry can be a dummy
    if column_pointer.saturating_sub(count) / JUMP_SPAN < jumps {
        jumps -= 1;
    }

    let mut jumps_used = 0;
    let mut offsets = Vec::with_capacity(count + 1);
    for i in 0..=count {
        while jumps_used < jumps
            && record.get(count_position - 1 - jumps_used).map(|&b| b as usize) == Some(i)
        {
            jumps_used += 1;
        }
        let offset = column_pointer
            .checked_sub(i)
            .filter(|&position| position >= 1)
            .and_then(|position| record.get(position))
            .ok_or_else(|| {
                LayoutError::inconsistent(format!(
                    "{} variable offsets do not fit before the null mask",
                    count + 1
                ))
            })?;
        offsets.push(*offset as usize + jumps_used * JUMP_SPAN);
    }
    Ok(offsets)
}

fn validate_offsets(offsets: &[usize], fixed_start: usize, limit: usize) -> Result<(), LayoutError> {
    if let Some(&first) = offsets.first() {
        if first < fixed_start {
            return Err(LayoutError::inconsistent(format!(
                "variable data starts at {}, inside the column count",
                first
            )));
        }
    }
    if offsets.windows(2).any(|pair| pair[0] > pair[1]) {
        return Err(LayoutError::inconsistent("variable offsets are not ascending"));
    }
    if let Some(&last) = offsets.last() {
        if last > limit {
            return Err(LayoutError::inconsistent(format!(
                "variable data ends at {}, past the offset table at {}",
                last, limit
            )));
        }
    }
    Ok(())
}
