pub mod catalog;
pub mod header;
pub mod page_store;
pub mod schema;
pub mod table_definition;
pub mod usage_map;

pub(crate) const JET_MAGIC: [u8; 4] = [0x00, 0x01, 0x00, 0x00];
pub(crate) const JET_ENGINE_NAMES: [&[u8]; 2] = [b"Standard Jet DB", b"Standard ACE DB"];
pub(crate) const JET_VERSION_OFFSET: usize = 0x14;
