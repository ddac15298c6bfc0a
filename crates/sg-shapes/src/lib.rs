//! `sg-shapes`: routed GTFS shapes from ordered stop lists.
//!
//! For every pair of consecutive stops in a trip pattern the assembler
//! matches both stops to nodes of the mode's graph, routes between them
//! within a time budget (optionally through a curated via point), rejects
//! implausibly long routes, and falls back to the straight line otherwise.
//! Legs are stitched into one polyline per pattern and written, one batch
//! per leg, to a [`ShapeSink`](sg_output::ShapeSink).
//!
//! # Crate layout
//!
//! | Module          | Contents                                                  |
//! |-----------------|-----------------------------------------------------------|
//! | [`assembler`]   | `ShapeAssembler`, `ShapeRequest`, `ShapeDistances`        |
//! | [`modes`]       | `ModeTable`, `ModeGraph`, `GraphSource`                   |
//! | [`matcher`]     | `node_for`: stop → node with hints and memo              |
//! | [`leg`]         | `LegRouter` trait, `GraphLegRouter`                       |
//! | [`ratio`]       | `RatioValidator`, `length_ratio`                          |
//! | [`simplify`]    | Ramer–Douglas–Peucker                                     |
//! | [`stops`]       | `StopTable` (`stops.txt` loader)                          |
//! | [`overrides`]   | via points and ratio overrides                            |
//! | [`cache`]       | `CacheManager`, TTL blob cache                           |
//! | [`diagnostics`] | `DiagnosticsSink`, `GeoJsonDiagnostics`                   |
//! | [`config`]      | `ShapeConfig`                                             |
//! | [`error`]       | `ShapeError`, `LegError`                                  |
//!
//! # Feature flags
//!
//! | Flag       | Effect                                                    |
//! |------------|-----------------------------------------------------------|
//! | `parallel` | `generate_all` assembles shapes on Rayon's thread pool.   |
//! | `osm`      | `OsmGraphSource`: graphs from cached OSM PBF extracts.    |

pub mod assembler;
pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod leg;
pub mod matcher;
pub mod modes;
pub mod overrides;
pub mod ratio;
pub mod simplify;
pub mod stops;

#[cfg(test)]
mod tests;

pub use assembler::{ShapeAssembler, ShapeDistances, ShapeRequest};
pub use cache::CacheManager;
pub use config::{ModeThresholds, ShapeConfig};
pub use diagnostics::{DiagnosticsSink, GeoJsonDiagnostics, LegFailure, NoDiagnostics};
pub use error::{LegError, ShapeError, ShapeResult, ViaHalf};
pub use leg::{GraphLegRouter, LegRouter};
pub use modes::{GraphSource, ModeGraph, ModeTable, NoGraphSource};
pub use overrides::Overrides;
pub use ratio::{length_ratio, RatioValidator};
pub use simplify::simplify;
pub use stops::StopTable;

#[cfg(feature = "osm")]
pub use modes::OsmGraphSource;
