pub mod bronze;
pub mod parquet;

pub use bronze::BronzeWriter;
pub use parquet::{ParquetFileInfo, ParquetTableWriter};
