pub mod record;
pub mod row_decoder;
pub mod scan;
pub mod table_scan;
