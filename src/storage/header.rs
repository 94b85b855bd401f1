use serde::Serialize;

use crate::{
    encoding::read_u32,
    storage::{JET_ENGINE_NAMES, JET_MAGIC, JET_VERSION_OFFSET},
    types::{PAGE_SIZE_LEGACY, PAGE_SIZE_MODERN, error::DatabaseError},
};

/// Engine generations, keyed by the version code stored in page 0.
///
/// `Jet3` is the legacy flavour (2 KiB pages, single-byte text); every later
/// version shares the modern layout (4 KiB pages, UTF-16 text).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JetVersion {
    Jet3,
    Jet4,
    Ace12,
    Ace14,
    Ace15,
    Ace16,
    Ace17,
}

impl JetVersion {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(JetVersion::Jet3),
            1 => Some(JetVersion::Jet4),
            2 => Some(JetVersion::Ace12),
            3 => Some(JetVersion::Ace14),
            4 => Some(JetVersion::Ace15),
            5 => Some(JetVersion::Ace16),
            6 => Some(JetVersion::Ace17),
            _ => None,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            JetVersion::Jet3 => 0,
            JetVersion::Jet4 => 1,
            JetVersion::Ace12 => 2,
            JetVersion::Ace14 => 3,
            JetVersion::Ace15 => 4,
            JetVersion::Ace16 => 5,
            JetVersion::Ace17 => 6,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, JetVersion::Jet3)
    }

    pub fn page_size(&self) -> usize {
        if self.is_legacy() {
            PAGE_SIZE_LEGACY
        } else {
            PAGE_SIZE_MODERN
        }
    }

    /// Engine string written at offset 4 of page 0.
    pub fn engine_name(&self) -> &'static str {
        match self {
            JetVersion::Jet3 | JetVersion::Jet4 => "Standard Jet DB",
            _ => "Standard ACE DB",
        }
    }
}

/*
 * Header page (page 0), only the unencrypted prefix is decoded
 * ┌──────────────────────────────────────────────────────────────┐
 * │ magic 00 01 00 00 (4) | engine name, NUL padded (16)         │
 * │ version code u32 (4)  | RC4-encrypted database properties... │
 * └──────────────────────────────────────────────────────────────┘
 */

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JetHeader {
    pub engine: String,
    pub version: JetVersion,
    pub version_code: u32,
}

impl JetHeader {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DatabaseError> {
        if bytes.len() < JET_VERSION_OFFSET + 4 {
            return Err(DatabaseError::Format {
                reason: format!("file is only {} bytes long", bytes.len()),
            });
        }

        if bytes[..4] != JET_MAGIC {
            return Err(DatabaseError::Format {
                reason: "missing JET header page magic".to_string(),
            });
        }

        let name_field = &bytes[4..JET_VERSION_OFFSET];
        let name_len = name_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(name_field.len());
        let engine_bytes = &name_field[..name_len];
        if !JET_ENGINE_NAMES.contains(&engine_bytes) {
            return Err(DatabaseError::Format {
                reason: format!(
                    "unrecognized engine signature {:?}",
                    String::from_utf8_lossy(engine_bytes)
                ),
            });
        }
        let engine = String::from_utf8_lossy(engine_bytes).into_owned();

        let version_code = read_u32(bytes, JET_VERSION_OFFSET).unwrap_or_default();
        let version = match JetVersion::from_code(version_code) {
            Some(version) => version,
            None => {
                log::error!(
                    "Unknown database version {}, trying to decode it as Jet3",
                    version_code
                );
                JetVersion::Jet3
            }
        };

        Ok(Self {
            engine,
            version,
            version_code,
        })
    }
}

/// Version-dependent offsets and sizes of every structure the decoder reads.
///
/// Offsets inside table definitions are relative to the start of the
/// assembled definition buffer; column descriptor offsets are relative to the
/// descriptor; data page offsets to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JetFormat {
    pub version: JetVersion,
    pub page_size: usize,

    // Data page header
    pub data_owner_offset: usize,
    pub data_row_count_offset: usize,
    pub data_row_offsets_start: usize,

    // Table definition header
    pub tdef_next_page_offset: usize,
    pub tdef_continuation_header: usize,
    pub tdef_row_count_offset: usize,
    pub tdef_table_type_offset: usize,
    pub tdef_var_column_count_offset: usize,
    pub tdef_column_count_offset: usize,
    pub tdef_index_count_offset: usize,
    pub tdef_real_index_count_offset: usize,
    pub tdef_usage_map_offset: usize,
    pub tdef_header_end: usize,

    // Descriptor array entry sizes
    pub real_index_entry_size: usize,
    pub column_descriptor_size: usize,
    pub real_index_descriptor_size: usize,
    pub logical_index_descriptor_size: usize,

    // Column descriptor fields
    pub column_type_offset: usize,
    pub column_id_offset: usize,
    pub column_var_index_offset: usize,
    pub column_display_index_offset: usize,
    pub column_misc_offset: usize,
    pub column_flags_offset: usize,
    pub column_ext_flags_offset: Option<usize>,
    pub column_fixed_offset_offset: usize,
    pub column_length_offset: usize,

    // Index descriptor fields
    pub real_index_column_map_offset: usize,
    pub real_index_flags_offset: usize,
    pub logical_index_number_offset: usize,
    pub logical_index_real_number_offset: usize,
    pub logical_index_type_offset: usize,

    /// Width of the length prefix of column and index names.
    pub name_length_width: usize,
    /// Width of the column count, variable column count and offset entries of a record.
    pub record_field_width: usize,
    /// Header bytes of a usage bitmap page before its bits start.
    pub bitmap_page_header: usize,
}

impl JetFormat {
    pub fn for_version(version: JetVersion) -> Self {
        if version.is_legacy() {
            Self {
                version,
                page_size: PAGE_SIZE_LEGACY,
                data_owner_offset: 4,
                data_row_count_offset: 8,
                data_row_offsets_start: 10,
                tdef_next_page_offset: 4,
                tdef_continuation_header: 8,
                tdef_row_count_offset: 12,
                tdef_table_type_offset: 20,
                tdef_var_column_count_offset: 23,
                tdef_column_count_offset: 25,
                tdef_index_count_offset: 27,
                tdef_real_index_count_offset: 31,
                tdef_usage_map_offset: 35,
                tdef_header_end: 43,
                real_index_entry_size: 8,
                column_descriptor_size: 18,
                real_index_descriptor_size: 39,
                logical_index_descriptor_size: 20,
                column_type_offset: 0,
                column_id_offset: 1,
                column_var_index_offset: 3,
                column_display_index_offset: 5,
                column_misc_offset: 7,
                column_flags_offset: 13,
                column_ext_flags_offset: None,
                column_fixed_offset_offset: 14,
                column_length_offset: 16,
                real_index_column_map_offset: 0,
                real_index_flags_offset: 38,
                logical_index_number_offset: 0,
                logical_index_real_number_offset: 4,
                logical_index_type_offset: 19,
                name_length_width: 1,
                record_field_width: 1,
                bitmap_page_header: 4,
            }
        } else {
            Self {
                version,
                page_size: PAGE_SIZE_MODERN,
                data_owner_offset: 4,
                data_row_count_offset: 12,
                data_row_offsets_start: 14,
                tdef_next_page_offset: 4,
                tdef_continuation_header: 8,
                tdef_row_count_offset: 16,
                tdef_table_type_offset: 40,
                tdef_var_column_count_offset: 43,
                tdef_column_count_offset: 45,
                tdef_index_count_offset: 47,
                tdef_real_index_count_offset: 51,
                tdef_usage_map_offset: 55,
                tdef_header_end: 63,
                real_index_entry_size: 12,
                column_descriptor_size: 25,
                real_index_descriptor_size: 52,
                logical_index_descriptor_size: 28,
                column_type_offset: 0,
                column_id_offset: 5,
                column_var_index_offset: 7,
                column_display_index_offset: 9,
                column_misc_offset: 11,
                column_flags_offset: 15,
                column_ext_flags_offset: Some(16),
                column_fixed_offset_offset: 21,
                column_length_offset: 23,
                real_index_column_map_offset: 4,
                real_index_flags_offset: 42,
                logical_index_number_offset: 4,
                logical_index_real_number_offset: 8,
                logical_index_type_offset: 23,
                name_length_width: 2,
                record_field_width: 2,
                bitmap_page_header: 4,
            }
        }
    }
}
