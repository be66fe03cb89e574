//! Wire and domain types shared by every consumer of the GeoQB HTTP API.

pub mod domain;
pub mod error;
pub mod plan;
pub mod protocol;
pub mod time;
