//! `sg-core`: foundational types for the shapegen workspace.
//!
//! This crate is a dependency of every other `sg-*` crate.  It has no `sg-*`
//! dependencies and a single external one (`thiserror`, plus optional
//! `serde`).
//!
//! # What lives here
//!
//! | Module    | Contents                                                   |
//! |-----------|------------------------------------------------------------|
//! | [`ids`]   | `NodeId`, `EdgeId`, `StopId`, `ShapeId`                    |
//! | [`geo`]   | `GeoPoint`, haversine distance, point-to-line distance     |
//! | [`mode`]  | `Mode` enum (bus, tram, train)                             |
//! | [`error`] | `CoreError`, `CoreResult`                                  |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                     |
//! |---------|------------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to all public types.        |

pub mod error;
pub mod geo;
pub mod ids;
pub mod mode;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use error::{CoreError, CoreResult};
pub use geo::{line_distance, polyline_length_m, GeoPoint};
pub use ids::{EdgeId, NodeId, ShapeId, StopId};
pub use mode::Mode;
