pub mod config;
pub mod database;
pub mod encoding;
pub mod executor;
pub mod storage;
pub mod types;
pub mod utils;

pub use config::ReaderOptions;
pub use database::AccessDatabase;
