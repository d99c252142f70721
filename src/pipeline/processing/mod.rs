// Pipeline processing: dataset cleaning and metadata enrichment

pub mod duration;
pub mod enrich;
pub mod normalize;
