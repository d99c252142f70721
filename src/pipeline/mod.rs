// Data pipeline: cleaning and enrichment, plus the files they persist to

pub mod processing;
pub mod storage;
