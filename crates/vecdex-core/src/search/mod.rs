//! Search: mode dispatch, RRF fusion, and geo proximity (§4.5).

pub mod fusion;
pub mod planner;

pub use fusion::{reciprocal_rank_fusion, FusedDoc};
pub use planner::{GeoQuery, SearchHit, SearchMode, SearchPlanner, SearchRequest};
