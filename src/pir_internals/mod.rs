pub mod answer;
pub mod block;
pub mod branch_opt_util;
pub mod database;
pub mod error;
pub mod geometry;
pub mod params;
pub mod query;
pub mod reconstruct;
pub mod selector;
pub mod serialization;
