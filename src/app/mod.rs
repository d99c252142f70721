pub mod ports;
pub mod normalize_use_case;
pub mod enrich_use_case;
pub mod lookup_use_case;
pub mod snapshot_use_case;
