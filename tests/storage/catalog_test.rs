use jetread::{
    AccessDatabase, ReaderOptions,
    storage::{
        catalog::{CATALOG_TABLE_NAME, CatalogReader, ObjectKind},
        page_store::PageStore,
    },
    types::{
        CATALOG_DEFINITION_PAGE,
        anomaly::AnomalyKind,
        error::DatabaseError,
        value::{ColumnType, Value},
    },
    utils::mock::{MockCatalogEntry, MockColumn, MockDatabase, MockTable},
};

fn simple(name: &str) -> MockTable {
    MockTable::new(name)
        .column(MockColumn::new("id", ColumnType::Int32))
        .row(vec![Value::Integer(1)])
}

fn catalog_database() -> MockDatabase {
    MockDatabase::modern()
        .with_table(simple("Customers"))
        .with_table(simple("Orders"))
        .with_table(simple("MSysACEs").system())
        .with_catalog_entry(MockCatalogEntry {
            name: "Open Orders".to_string(),
            object_type: 5,
            flags: 0,
            id: 0x0300_0010,
        })
        .with_catalog_entry(MockCatalogEntry {
            name: "Linked Prices".to_string(),
            object_type: 6,
            flags: 0,
            id: 0x0400_0011,
        })
}

#[test]
fn test_catalog_lists_every_object_with_its_kind() -> Result<(), DatabaseError> {
    let image = catalog_database().build()?;
    let store = PageStore::open_from(image.bytes.clone())?;
    let options = ReaderOptions::default();
    let catalog = CatalogReader::new(&store, &options).build()?;

    let kinds: Vec<(&str, ObjectKind)> = catalog
        .entries()
        .iter()
        .map(|entry| (entry.name.as_str(), entry.kind))
        .collect();
    assert_eq!(
        kinds,
        [
            (CATALOG_TABLE_NAME, ObjectKind::Table),
            ("Tables", ObjectKind::Other(3)),
            ("Customers", ObjectKind::Table),
            ("Orders", ObjectKind::Table),
            ("MSysACEs", ObjectKind::Table),
            ("Open Orders", ObjectKind::Query),
            ("Linked Prices", ObjectKind::LinkedTable),
        ]
    );
    assert_eq!(catalog.len(), 7);
    assert!(catalog.anomalies().is_empty());
    Ok(())
}

#[test]
fn test_user_tables_exclude_system_objects() -> Result<(), DatabaseError> {
    let image = catalog_database().build()?;
    let store = PageStore::open_from(image.bytes.clone())?;
    let options = ReaderOptions::default();
    let catalog = CatalogReader::new(&store, &options).build()?;

    let tables: Vec<&str> = catalog.tables().map(|entry| entry.name.as_str()).collect();
    assert_eq!(tables, [CATALOG_TABLE_NAME, "Customers", "Orders", "MSysACEs"]);

    let user: Vec<&str> = catalog.user_tables().map(|entry| entry.name.as_str()).collect();
    assert_eq!(user, ["Customers", "Orders"]);

    let objects = catalog.get(CATALOG_TABLE_NAME).unwrap();
    assert!(objects.system);
    assert_eq!(objects.definition_page, CATALOG_DEFINITION_PAGE);
    assert_eq!(objects.flags, 0x8000_0002);
    Ok(())
}

#[test]
fn test_definition_pages_come_from_the_id_column() -> Result<(), DatabaseError> {
    let image = catalog_database().build()?;
    let store = PageStore::open_from(image.bytes.clone())?;
    let options = ReaderOptions::default();
    let catalog = CatalogReader::new(&store, &options).build()?;

    for name in ["Customers", "Orders", "MSysACEs"] {
        let expected = image.table(name).map(|layout| layout.definition_page());
        assert_eq!(catalog.get(name).map(|entry| entry.definition_page), expected);
    }
    Ok(())
}

#[test]
fn test_only_tables_resolve_by_name() -> Result<(), DatabaseError> {
    let image = catalog_database().build()?;
    let store = PageStore::open_from(image.bytes.clone())?;
    let options = ReaderOptions::default();
    let catalog = CatalogReader::new(&store, &options).build()?;

    assert!(catalog.get("Open Orders").is_none());
    assert!(catalog.get("Linked Prices").is_none());
    assert!(catalog.get("Tables").is_none());
    assert_eq!(catalog.get("customers").map(|entry| entry.name.as_str()), Some("Customers"));
    Ok(())
}

#[test]
fn test_duplicate_names_keep_the_first_entry() -> Result<(), DatabaseError> {
    let image = MockDatabase::modern()
        .with_table(simple("Orders"))
        .with_catalog_entry(MockCatalogEntry {
            name: "Orders".to_string(),
            object_type: 1,
            flags: 0,
            id: 999,
        })
        .build()?;
    let store = PageStore::open_from(image.bytes.clone())?;
    let options = ReaderOptions::default();
    let catalog = CatalogReader::new(&store, &options).build()?;

    let orders = image.table("Orders").map(|layout| layout.definition_page());
    assert_eq!(catalog.get("Orders").map(|entry| entry.definition_page), orders);
    assert_eq!(catalog.user_tables().count(), 1);
    assert_eq!(catalog.anomalies().len(), 1);
    assert_eq!(catalog.anomalies()[0].kind, AnomalyKind::DuplicateTableName);
    Ok(())
}

#[test]
fn test_legacy_catalog() -> Result<(), DatabaseError> {
    let image = MockDatabase::legacy()
        .with_table(simple("Parts"))
        .with_table(simple("Suppliers"))
        .build()?;
    let store = PageStore::open_from(image.bytes.clone())?;
    let options = ReaderOptions::default();
    let catalog = CatalogReader::new(&store, &options).build()?;

    let user: Vec<&str> = catalog.user_tables().map(|entry| entry.name.as_str()).collect();
    assert_eq!(user, ["Parts", "Suppliers"]);
    Ok(())
}

#[test]
fn test_catalog_spanning_several_pages() -> Result<(), DatabaseError> {
    let mut database = MockDatabase::legacy();
    for index in 0..120 {
        database = database.with_table(simple(&format!("Table {:03}", index)));
    }
    let image = database.build()?;
    assert!(image.catalog.data_pages.len() > 1);

    let store = PageStore::open_from(image.bytes.clone())?;
    let options = ReaderOptions::default();
    let catalog = CatalogReader::new(&store, &options).build()?;
    assert_eq!(catalog.user_tables().count(), 120);
    assert_eq!(
        catalog.user_tables().last().map(|entry| entry.name.as_str()),
        Some("Table 119")
    );
    Ok(())
}

#[test]
fn test_unreadable_catalog_fails_open() -> Result<(), DatabaseError> {
    let mut image = catalog_database().build()?;
    image.patch(CATALOG_DEFINITION_PAGE, 0, &[0x01]);

    let store = PageStore::open_from(image.bytes.clone())?;
    let options = ReaderOptions::default();
    let result = CatalogReader::new(&store, &options).build();
    assert!(matches!(result, Err(DatabaseError::CatalogCorrupt { .. })));

    assert!(matches!(image.open(), Err(DatabaseError::CatalogCorrupt { .. })));
    Ok(())
}

#[test]
fn test_catalog_without_required_columns_is_corrupt() -> Result<(), DatabaseError> {
    let image = catalog_database().build()?;
    let store = PageStore::open_from(image.bytes.clone())?;
    let catalog_page = store.read_page(CATALOG_DEFINITION_PAGE)?;
    let renamed = catalog_page
        .data
        .windows(4)
        .position(|window| window == [b'T', 0, b'y', 0])
        .unwrap();

    // Rename "Type" to "Tzpe"
    let mut image = image;
    image.patch(CATALOG_DEFINITION_PAGE, renamed + 2, &[b'z']);
    let result = AccessDatabase::from_bytes(image.bytes.clone());
    assert!(matches!(result, Err(DatabaseError::CatalogCorrupt { .. })));
    Ok(())
}

#[test]
fn test_rows_without_a_name_are_skipped_and_recorded() -> Result<(), DatabaseError> {
    let image = catalog_database()
        .with_catalog_row(vec![
            Value::Integer(99),
            Value::Integer(0),
            Value::Null,
            Value::Integer(1),
            Value::Integer(0),
        ])
        .build()?;
    let store = PageStore::open_from(image.bytes.clone())?;
    let options = ReaderOptions::default();
    let catalog = CatalogReader::new(&store, &options).build()?;

    let user: Vec<&str> = catalog.user_tables().map(|entry| entry.name.as_str()).collect();
    assert_eq!(user, ["Customers", "Orders"]);
    assert_eq!(catalog.len(), 7);
    assert_eq!(catalog.anomalies().len(), 1);
    assert_eq!(catalog.anomalies()[0].kind, AnomalyKind::CatalogRowSkipped);
    assert!(image.catalog.data_pages.contains(&catalog.anomalies()[0].page));

    let database = image.open()?;
    assert_eq!(database.catalog().anomalies(), catalog.anomalies());
    Ok(())
}

#[test]
fn test_property_blobs_are_not_read_while_listing_tables() -> Result<(), DatabaseError> {
    let image = catalog_database().with_catalog_properties().build()?;
    let store = PageStore::open_from(image.bytes.clone())?;
    let options = ReaderOptions::default();
    let catalog = CatalogReader::new(&store, &options).build()?;

    let user: Vec<&str> = catalog.user_tables().map(|entry| entry.name.as_str()).collect();
    assert_eq!(user, ["Customers", "Orders"]);
    assert!(catalog.anomalies().is_empty());

    // Read as a table, the catalog still shows its property column
    let options = ReaderOptions::default().with_include_system_tables(true);
    let database = image.open_with_options(options)?;
    assert!(database.catalog().anomalies().is_empty());
    let objects = database.parse_table(CATALOG_TABLE_NAME)?;
    assert!(objects.column_names().iter().any(|name| name == "LvProp"));
    assert_eq!(objects.anomalies().len(), objects.row_count());
    assert!(
        objects
            .anomalies()
            .iter()
            .all(|anomaly| anomaly.kind == AnomalyKind::LongValueSkipped)
    );
    Ok(())
}
