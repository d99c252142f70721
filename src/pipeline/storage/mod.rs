// Durable state: the working table and the enrichment checkpoint

pub mod atomic;
pub mod checkpoint;
pub mod table;

pub use checkpoint::{CheckpointState, CheckpointStore};
pub use table::{CsvOptions, Table};
