use jetread::{
    storage::{
        header::JetFormat,
        page_store::PageStore,
        schema::{StorageSlot, TableType},
        table_definition::TableDefinitionParser,
    },
    types::{
        anomaly::AnomalyKind,
        error::DatabaseError,
        value::{ColumnType, Value},
    },
    utils::mock::{MockColumn, MockDatabase, MockImage, MockIndex, MockTable, UsageMapKind},
};

fn orders() -> MockTable {
    MockTable::new("Orders")
        .column(MockColumn::new("customer", ColumnType::Text).compressed())
        .column(MockColumn::new("id", ColumnType::Int32).not_null().autonumber())
        .column(MockColumn::new("shipped", ColumnType::Boolean))
        .column(MockColumn::new("notes", ColumnType::Memo))
        .column(MockColumn::new("total", ColumnType::Numeric).numeric(18, 2))
        .column(MockColumn::new("placed", ColumnType::DateTime))
        .row(vec![
            Value::Text("ACME".to_string()),
            Value::Integer(1),
            Value::Boolean(true),
            Value::Null,
            Value::Text("10.50".to_string()),
            Value::Null,
        ])
}

fn store_of(image: &MockImage) -> Result<PageStore, DatabaseError> {
    PageStore::open_from(image.bytes.clone())
}

#[test]
fn test_columns_come_back_in_declared_order() -> Result<(), DatabaseError> {
    let image = MockDatabase::modern().with_table(orders()).build()?;
    let layout = image.table("Orders").cloned().unwrap_or_default();
    let store = store_of(&image)?;
    let table = TableDefinitionParser::new(&store).parse("Orders", layout.definition_page())?;

    let names: Vec<&str> = table.columns.iter().map(|column| column.name.as_str()).collect();
    assert_eq!(names, ["customer", "id", "shipped", "notes", "total", "placed"]);
    assert_eq!(table.column_names().len(), 6);
    for (ordinal, column) in table.columns.iter().enumerate() {
        assert_eq!(column.ordinal, ordinal);
    }

    assert_eq!(table.name, "Orders");
    assert_eq!(table.definition_page, layout.definition_page());
    assert_eq!(table.table_type, TableType::User);
    assert_eq!(table.row_count_estimate, 1);
    assert_eq!(table.variable_column_count, 2);
    assert!(table.has_variable_columns());
    assert_eq!(table.data_pages, layout.data_pages);
    Ok(())
}

#[test]
fn test_storage_slots_follow_column_ids() -> Result<(), DatabaseError> {
    let image = MockDatabase::modern().with_table(orders()).build()?;
    let layout = image.table("Orders").cloned().unwrap_or_default();
    let store = store_of(&image)?;
    let table = TableDefinitionParser::new(&store).parse("Orders", layout.definition_page())?;

    let id = table.column("id").unwrap();
    assert_eq!(id.column_type, ColumnType::Int32);
    assert_eq!(id.slot, StorageSlot::Fixed { offset: 0, width: 4 });
    assert!(id.fixed_length);

    let shipped = table.column("shipped").unwrap();
    assert_eq!(shipped.slot, StorageSlot::NullMask);

    let total = table.column("total").unwrap();
    assert_eq!(total.slot, StorageSlot::Fixed { offset: 4, width: 17 });
    let placed = table.column("placed").unwrap();
    assert_eq!(placed.slot, StorageSlot::Fixed { offset: 21, width: 8 });
    assert_eq!(table.fixed_region_len(), 29);

    let customer = table.column("customer").unwrap();
    assert_eq!(customer.slot, StorageSlot::Variable { index: 0 });
    assert_eq!(customer.storage_size, Some(510));
    let notes = table.column("notes").unwrap();
    assert_eq!(notes.slot, StorageSlot::Variable { index: 1 });

    // Fixed columns take the low ids, so the null mask bit differs from the ordinal
    assert_eq!(id.column_id, 0);
    assert_eq!(customer.column_id, 4);
    assert_eq!(table.ordinal_of(customer.column_id), Some(0));
    assert_eq!(table.storage_slot(1), Some(id.slot));
    Ok(())
}

#[test]
fn test_column_flags() -> Result<(), DatabaseError> {
    let image = MockDatabase::modern().with_table(orders()).build()?;
    let layout = image.table("Orders").cloned().unwrap_or_default();
    let store = store_of(&image)?;
    let table = TableDefinitionParser::new(&store).parse("Orders", layout.definition_page())?;

    let id = table.column("id").unwrap();
    assert!(!id.nullable);
    assert!(id.autonumber);
    assert!(!id.compressed);

    let customer = table.column("customer").unwrap();
    assert!(customer.nullable);
    assert!(customer.compressed);

    let total = table.column("total").unwrap();
    assert_eq!((total.precision, total.scale), (18, 2));
    Ok(())
}

#[test]
fn test_wide_definition_spans_several_pages() -> Result<(), DatabaseError> {
    let mut wide = MockTable::new("Wide");
    for index in 0..200 {
        wide = wide.column(MockColumn::new(format!("c{:03}", index), ColumnType::Int16));
    }
    let values = (0..200).map(Value::Integer).collect();
    let image = MockDatabase::modern().with_table(wide.row(values)).build()?;
    let layout = image.table("Wide").cloned().unwrap_or_default();
    assert!(layout.definition_pages.len() > 1);

    let store = store_of(&image)?;
    let parser = TableDefinitionParser::new(&store);
    let chain = parser.read_chain(layout.definition_page())?;
    assert_eq!(chain.pages, layout.definition_pages);

    let table = parser.parse("Wide", layout.definition_page())?;
    assert_eq!(table.columns.len(), 200);
    assert_eq!(table.columns[0].name, "c000");
    assert_eq!(table.columns[199].name, "c199");
    assert_eq!(
        table.columns[150].slot,
        StorageSlot::Fixed { offset: 300, width: 2 }
    );
    assert!(!table.has_variable_columns());
    Ok(())
}

#[test]
fn test_definition_chain_cycle_is_reported() -> Result<(), DatabaseError> {
    let image = MockDatabase::modern().with_table(orders()).build()?;
    let layout = image.table("Orders").cloned().unwrap_or_default();
    let format = JetFormat::for_version(image.version);

    let mut looped = image.clone();
    looped.patch_u32(layout.definition_page(), format.tdef_next_page_offset, layout.definition_page());
    let store = store_of(&looped)?;
    let result = TableDefinitionParser::new(&store).parse("Orders", layout.definition_page());
    assert!(matches!(result, Err(DatabaseError::Chain { page, .. }) if page == layout.definition_page()));
    Ok(())
}

#[test]
fn test_cycle_across_continuation_pages() -> Result<(), DatabaseError> {
    let mut wide = MockTable::new("Wide");
    for index in 0..200 {
        wide = wide.column(MockColumn::new(format!("column_{}", index), ColumnType::Byte));
    }
    let mut image = MockDatabase::modern().with_table(wide).build()?;
    let layout = image.table("Wide").cloned().unwrap_or_default();
    let format = JetFormat::for_version(image.version);
    let last = *layout.definition_pages.last().unwrap();
    image.patch_u32(last, format.tdef_next_page_offset, layout.definition_page());

    let store = store_of(&image)?;
    let result = TableDefinitionParser::new(&store).read_chain(layout.definition_page());
    assert!(matches!(result, Err(DatabaseError::Chain { .. })));
    Ok(())
}

#[test]
fn test_dangling_and_mistyped_links_are_reported() -> Result<(), DatabaseError> {
    let image = MockDatabase::modern().with_table(orders()).build()?;
    let layout = image.table("Orders").cloned().unwrap_or_default();
    let format = JetFormat::for_version(image.version);

    let mut dangling = image.clone();
    dangling.patch_u32(layout.definition_page(), format.tdef_next_page_offset, 9_999);
    let store = store_of(&dangling)?;
    let result = TableDefinitionParser::new(&store).parse("Orders", layout.definition_page());
    assert!(matches!(result, Err(DatabaseError::Chain { page: 9_999, .. })));

    let mut mistyped = image.clone();
    mistyped.patch_u32(layout.definition_page(), format.tdef_next_page_offset, layout.data_pages[0]);
    let store = store_of(&mistyped)?;
    let result = TableDefinitionParser::new(&store).parse("Orders", layout.definition_page());
    assert!(matches!(result, Err(DatabaseError::Chain { .. })));

    // The first page itself must be a definition page
    let store = store_of(&image)?;
    let result = TableDefinitionParser::new(&store).parse("Orders", layout.data_pages[0]);
    assert!(matches!(result, Err(DatabaseError::Chain { .. })));
    Ok(())
}

#[test]
fn test_truncated_definition_is_corrupt() -> Result<(), DatabaseError> {
    let mut image = MockDatabase::modern().with_table(orders()).build()?;
    let layout = image.table("Orders").cloned().unwrap_or_default();
    let format = JetFormat::for_version(image.version);
    image.patch_u16(layout.definition_page(), format.tdef_column_count_offset, 0x7FFF);

    let store = store_of(&image)?;
    let result = TableDefinitionParser::new(&store).parse("Orders", layout.definition_page());
    assert!(matches!(
        result,
        Err(DatabaseError::CorruptDefinition { page, .. }) if page == layout.definition_page()
    ));
    Ok(())
}

#[test]
fn test_indexes_are_decoded() -> Result<(), DatabaseError> {
    let table = orders()
        .index(MockIndex::new("PrimaryKey").column("id").primary())
        .index(
            MockIndex::new("ByCustomer")
                .column("customer")
                .descending_column("placed")
                .unique(),
        )
        .index(MockIndex::new("ByTotal").column("total"));
    let image = MockDatabase::modern().with_table(table).build()?;
    let layout = image.table("Orders").cloned().unwrap_or_default();
    let store = store_of(&image)?;
    let table = TableDefinitionParser::new(&store).parse("Orders", layout.definition_page())?;

    assert_eq!(table.indexes.len(), 3);
    let primary = table.primary_key().unwrap();
    assert_eq!(primary.name, "PrimaryKey");
    assert!(primary.unique);
    assert_eq!(primary.columns.len(), 1);
    assert_eq!(primary.columns[0].column, "id");

    let by_customer = &table.indexes[1];
    assert!(by_customer.unique);
    assert!(!by_customer.primary);
    assert!(!by_customer.foreign_key);
    let order: Vec<(&str, bool)> = by_customer
        .columns
        .iter()
        .map(|column| (column.column.as_str(), column.ascending))
        .collect();
    assert_eq!(order, [("customer", true), ("placed", false)]);

    assert!(!table.indexes[2].unique);
    Ok(())
}

#[test]
fn test_unreadable_indexes_do_not_fail_the_table() -> Result<(), DatabaseError> {
    let table = orders().index(MockIndex::new("PrimaryKey").column("id").primary());
    let mut image = MockDatabase::modern().with_table(table).build()?;
    let layout = image.table("Orders").cloned().unwrap_or_default();
    let format = JetFormat::for_version(image.version);
    image.patch_u32(layout.definition_page(), format.tdef_index_count_offset, 5_000);

    let store = store_of(&image)?;
    let table = TableDefinitionParser::new(&store).parse("Orders", layout.definition_page())?;
    assert!(table.indexes.is_empty());
    assert_eq!(table.columns.len(), 6);
    assert_eq!(table.anomalies.len(), 1);
    assert_eq!(table.anomalies[0].kind, AnomalyKind::IndexesUnreadable);
    assert_eq!(table.anomalies[0].page, layout.definition_page());
    Ok(())
}

#[test]
fn test_legacy_definitions() -> Result<(), DatabaseError> {
    let table = MockTable::new("Legacy")
        .column(MockColumn::new("code", ColumnType::Text))
        .column(MockColumn::new("qty", ColumnType::Int16).not_null())
        .index(MockIndex::new("PrimaryKey").column("qty").primary())
        .row(vec![Value::Text("x".to_string()), Value::Integer(3)]);
    let image = MockDatabase::legacy().with_table(table).build()?;
    let layout = image.table("Legacy").cloned().unwrap_or_default();
    let store = store_of(&image)?;
    let table = TableDefinitionParser::new(&store).parse("Legacy", layout.definition_page())?;

    let names: Vec<&str> = table.columns.iter().map(|column| column.name.as_str()).collect();
    assert_eq!(names, ["code", "qty"]);
    assert_eq!(table.column("code").unwrap().storage_size, Some(255));
    assert_eq!(table.column("qty").unwrap().slot, StorageSlot::Fixed { offset: 0, width: 2 });
    assert!(!table.column("qty").unwrap().nullable);
    assert_eq!(table.primary_key().map(|index| index.columns.len()), Some(1));
    assert_eq!(table.data_pages, layout.data_pages);
    Ok(())
}

#[test]
fn test_data_pages_from_every_usage_map_kind() -> Result<(), DatabaseError> {
    let mut rows = MockTable::new("Many")
        .column(MockColumn::new("id", ColumnType::Int32))
        .column(MockColumn::new("text", ColumnType::Text));
    for id in 0..300 {
        rows = rows.row(vec![Value::Integer(id), Value::Text("x".repeat(40))]);
    }

    for kind in [UsageMapKind::Inline, UsageMapKind::Reference, UsageMapKind::Missing] {
        let image = MockDatabase::modern()
            .with_table(rows.clone().usage_map(kind))
            .build()?;
        let layout = image.table("Many").cloned().unwrap_or_default();
        assert!(layout.data_pages.len() > 1);
        assert_eq!(layout.bitmap_page.is_some(), kind == UsageMapKind::Reference);

        let store = store_of(&image)?;
        let table = TableDefinitionParser::new(&store).parse("Many", layout.definition_page())?;
        assert_eq!(table.data_pages, layout.data_pages, "usage map {:?}", kind);
        assert!(table.anomalies.is_empty(), "usage map {:?}", kind);
    }
    Ok(())
}

#[test]
fn test_unreadable_usage_map_falls_back_to_owner_scan() -> Result<(), DatabaseError> {
    let mut image = MockDatabase::modern().with_table(orders()).build()?;
    let layout = image.table("Orders").cloned().unwrap_or_default();

    // Usage map record 1 on page 1 belongs to the first user table
    let store = store_of(&image)?;
    let usage_page = store.read_data_page(1)?;
    let offset = usage_page.slot_directory.slots[1].offset as usize;
    image.patch(1, offset, &[0x07]);

    let store = store_of(&image)?;
    let table = TableDefinitionParser::new(&store).parse("Orders", layout.definition_page())?;
    assert_eq!(table.data_pages, layout.data_pages);
    let kinds: Vec<AnomalyKind> = table.anomalies.iter().map(|anomaly| anomaly.kind).collect();
    assert_eq!(kinds, [AnomalyKind::UsageMapUnreadable]);
    Ok(())
}

#[test]
fn test_table_without_rows_has_no_data_pages() -> Result<(), DatabaseError> {
    let empty = MockTable::new("Empty").column(MockColumn::new("id", ColumnType::Int32));
    let image = MockDatabase::modern().with_table(empty).build()?;
    let layout = image.table("Empty").cloned().unwrap_or_default();
    assert!(layout.data_pages.is_empty());

    let store = store_of(&image)?;
    let table = TableDefinitionParser::new(&store).parse("Empty", layout.definition_page())?;
    assert!(table.data_pages.is_empty());
    assert_eq!(table.row_count_estimate, 0);
    Ok(())
}
