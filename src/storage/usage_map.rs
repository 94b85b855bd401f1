//! Usage maps list the pages that belong to a table.
//!
//! A map record starts with its kind byte. Inline maps (`0x00`) carry a start
//! page followed by a bitmap; bit `n` marks page `start + n`. Reference maps
//! (`0x01`) carry an array of bitmap page numbers; bitmap page `i` covers
//! pages `i * bits_per_page ..`.

use crate::{
    encoding::read_u32,
    storage::page_store::PageStore,
    types::{
        PageId,
        error::{DatabaseError, Result},
        page::{PageType, RowPointer},
    },
};

const MAP_INLINE: u8 = 0x00;
const MAP_REFERENCE: u8 = 0x01;
const INLINE_BITMAP_START: usize = 5;

/// Pages whose bit is set, in ascending order, clipped to the file.
pub fn decode_usage_map(store: &PageStore, record: &[u8]) -> Result<Vec<PageId>> {
    let (&kind, body) = record.split_first().ok_or_else(|| DatabaseError::Decode {
        reason: "empty usage map record".to_string(),
    })?;

    let pages = match kind {
        MAP_INLINE => {
            let start = read_u32(record, 1).ok_or_else(|| DatabaseError::Decode {
                reason: "inline usage map is truncated".to_string(),
            })?;
            let bitmap = record.get(INLINE_BITMAP_START..).unwrap_or_default();
            set_bits(bitmap, start as u64, store.page_count())
        }
        MAP_REFERENCE => {
            let bits_per_page = ((store.page_size() - store.format().bitmap_page_header) * 8) as u64;
            let mut pages = Vec::new();
            for (index, chunk) in body.chunks_exact(4).enumerate() {
                let bitmap_page = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                if bitmap_page == 0 {
                    continue;
                }
                let page = store.read_page(bitmap_page)?;
                if page.page_type != PageType::UsageBitmap {
                    return Err(DatabaseError::corrupted_page(
                        bitmap_page,
                        format!("expected a usage bitmap page, found {:?}", page.page_type),
                    ));
                }
                let bitmap = &page.data[store.format().bitmap_page_header..];
                pages.extend(set_bits(bitmap, index as u64 * bits_per_page, store.page_count()));
            }
            pages
        }
        other => {
            return Err(DatabaseError::Decode {
                reason: format!("unknown usage map kind 0x{:02x}", other),
            });
        }
    };
    Ok(pages)
}

/// Follow a usage map pointer and decode the map it designates.
pub fn read_usage_map(store: &PageStore, pointer: RowPointer) -> Result<Vec<PageId>> {
    let record = store.read_record(pointer)?;
    decode_usage_map(store, record)
}

fn set_bits(bitmap: &[u8], first_page: u64, page_count: u32) -> Vec<PageId> {
    let mut pages = Vec::new();
    for (byte_index, &byte) in bitmap.iter().enumerate() {
        if byte == 0 {
            continue;
        }
        for bit in 0..8 {
            if byte & (1 << bit) == 0 {
                continue;
            }
            let page = first_page + (byte_index * 8 + bit) as u64;
            if page < page_count as u64 {
                pages.push(page as PageId);
            }
        }
    }
    pages
}
