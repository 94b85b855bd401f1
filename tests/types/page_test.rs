use jetread::{
    storage::header::{JetFormat, JetVersion},
    types::{
        RECORD_DELETED_FLAG, RECORD_OVERFLOW_FLAG,
        error::DatabaseError,
        page::{DataPage, Page, PageType, RowPointer},
    },
};

/// A modern data page holding `records`, record 0 at the end of the page.
fn data_page_bytes(owner: u32, records: &[(&[u8], u16)]) -> Vec<u8> {
    let format = JetFormat::for_version(JetVersion::Jet4);
    let mut page = vec![0u8; format.page_size];
    page[0] = 0x01;
    page[1] = 0x01;
    page[4..8].copy_from_slice(&owner.to_le_bytes());
    page[12..14].copy_from_slice(&(records.len() as u16).to_le_bytes());
    let mut end = format.page_size;
    for (index, (record, flags)) in records.iter().enumerate() {
        let start = end - record.len();
        page[start..end].copy_from_slice(record);
        let pointer = start as u16 | flags;
        page[14 + index * 2..16 + index * 2].copy_from_slice(&pointer.to_le_bytes());
        end = start;
    }
    page
}

#[test]
fn test_page_type_tags() {
    for tag in 0x00..=0x05u8 {
        assert_eq!(PageType::from_u8(tag).as_u8(), tag);
    }
    assert_eq!(PageType::from_u8(0x02), PageType::TableDefinition);
    assert_eq!(PageType::from_u8(0x05), PageType::UsageBitmap);
    assert_eq!(PageType::from_u8(0x77), PageType::Unknown(0x77));

    let bytes = [0x02, 0x01, 0x00];
    let page = Page::new(3, &bytes);
    assert_eq!(page.page_type, PageType::TableDefinition);
    assert_eq!(page.len(), 3);
}

#[test]
fn test_row_pointer_packing() {
    let pointer = RowPointer::from_u32(0x0000_1203);
    assert_eq!(pointer, RowPointer { page: 0x12, record: 3 });
    assert_eq!(pointer.as_u32(), 0x1203);
    assert!(!pointer.is_null());
    assert!(RowPointer::from_u32(0x0000_0007).is_null());
}

#[test]
fn test_records_are_bounded_by_their_neighbours() -> Result<(), DatabaseError> {
    let format = JetFormat::for_version(JetVersion::Jet4);
    let bytes = data_page_bytes(9, &[(&b"first"[..], 0), (&b"second!"[..], 0), (&b""[..], 0)]);
    let page = DataPage::from_page(Page::new(4, &bytes), &format)?;

    assert_eq!(page.page_id(), 4);
    assert_eq!(page.owner, 9);
    assert_eq!(page.record_count(), 3);
    assert_eq!(page.record(0), Some(&b"first"[..]));
    assert_eq!(page.record(1), Some(&b"second!"[..]));
    assert_eq!(page.record(2), Some(&b""[..]));
    assert_eq!(page.record(3), None);

    let slot = page.slot_directory.slots[1];
    assert_eq!(slot.length(), Some(7));
    assert_eq!(slot.end as usize, format.page_size - 5);
    Ok(())
}

#[test]
fn test_flag_bits_do_not_move_the_record() -> Result<(), DatabaseError> {
    let format = JetFormat::for_version(JetVersion::Jet4);
    let bytes = data_page_bytes(
        9,
        &[
            (&b"gone"[..], RECORD_DELETED_FLAG),
            (&[0x01, 0x02, 0x00, 0x00][..], RECORD_OVERFLOW_FLAG),
        ],
    );
    let page = DataPage::from_page(Page::new(4, &bytes), &format)?;

    let deleted = page.slot_directory.slots[0];
    assert!(deleted.is_deleted());
    assert!(!deleted.is_overflow());
    assert_eq!(page.record(0), Some(&b"gone"[..]));

    let overflow = page.slot_directory.slots[1];
    assert!(overflow.is_overflow());
    assert_eq!(page.record(1), Some(&[0x01, 0x02, 0x00, 0x00][..]));
    Ok(())
}

#[test]
fn test_records_overlapping_the_header_are_rejected() -> Result<(), DatabaseError> {
    let format = JetFormat::for_version(JetVersion::Jet4);
    let mut bytes = data_page_bytes(9, &[(&b"ok"[..], 0), (&b"bad"[..], 0)]);
    // Point record 1 into the pointer array
    bytes[16..18].copy_from_slice(&4u16.to_le_bytes());
    let page = DataPage::from_page(Page::new(4, &bytes), &format)?;
    assert_eq!(page.record(0), Some(&b"ok"[..]));
    assert_eq!(page.record(1), None);

    // Record 1 starting after record 0 ends gives a reversed range
    let mut bytes = data_page_bytes(9, &[(&b"ok"[..], 0), (&b"bad"[..], 0)]);
    bytes[16..18].copy_from_slice(&(format.page_size as u16 - 1).to_le_bytes());
    let page = DataPage::from_page(Page::new(4, &bytes), &format)?;
    assert_eq!(page.record(1), None);
    Ok(())
}

#[test]
fn test_non_data_pages_are_refused() {
    let format = JetFormat::for_version(JetVersion::Jet4);
    let mut bytes = data_page_bytes(9, &[]);
    bytes[0] = 0x02;
    let result = DataPage::from_page(Page::new(6, &bytes), &format);
    assert!(matches!(result, Err(DatabaseError::CorruptedPage { page_id: 6, .. })));
}

#[test]
fn test_record_count_past_the_page_is_refused() {
    let format = JetFormat::for_version(JetVersion::Jet4);
    let mut bytes = data_page_bytes(9, &[]);
    bytes[12..14].copy_from_slice(&u16::MAX.to_le_bytes());
    let result = DataPage::from_page(Page::new(6, &bytes), &format);
    assert!(matches!(result, Err(DatabaseError::CorruptedPage { .. })));
}

#[test]
fn test_legacy_header_offsets() -> Result<(), DatabaseError> {
    let format = JetFormat::for_version(JetVersion::Jet3);
    let mut bytes = vec![0u8; format.page_size];
    bytes[0] = 0x01;
    bytes[1] = 0x01;
    bytes[4..8].copy_from_slice(&17u32.to_le_bytes());
    bytes[8..10].copy_from_slice(&1u16.to_le_bytes());
    let start = format.page_size - 3;
    bytes[start..].copy_from_slice(b"abc");
    bytes[10..12].copy_from_slice(&(start as u16).to_le_bytes());

    let page = DataPage::from_page(Page::new(2, &bytes), &format)?;
    assert_eq!(page.owner, 17);
    assert_eq!(page.record(0), Some(&b"abc"[..]));
    Ok(())
}
