//! `sg-spatial`: routing graphs, spatial indexing, and path search.
//!
//! # Crate layout
//!
//! | Module      | Contents                                                    |
//! |-------------|-------------------------------------------------------------|
//! | [`network`] | `RoadNetwork` (CSR + stop hints), `RoadNetworkBuilder`      |
//! | [`kdtree`]  | `KdTree<T>` nearest-neighbour index                         |
//! | [`router`]  | `Router` trait, `Route`, deadline-bounded `DijkstraRouter`  |
//! | [`osm`]     | `load_from_pbf` (feature = `"osm"` only)                    |
//! | [`error`]   | `SpatialError`, `SpatialResult<T>`                          |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                       |
//! |---------|--------------------------------------------------------------|
//! | `osm`   | Enables OSM PBF loading via the `osmpbf` crate.              |
//! | `serde` | Derives `Serialize`/`Deserialize` on core types.             |

pub mod error;
pub mod kdtree;
pub mod network;
pub mod router;

#[cfg(feature = "osm")]
pub mod osm;


pub use error::{SpatialError, SpatialResult};
pub use kdtree::KdTree;
pub use network::{RoadNetwork, RoadNetworkBuilder};
pub use router::{DijkstraRouter, Route, Router};
