//! corridor: end-to-end shape generation on a synthetic city centre.
//!
//! Builds bus and tram graphs in memory, loads stops, overrides and
//! configuration from embedded CSV/JSON, shapes a handful of patterns, and
//! writes `shapes.txt` plus one GeoJSON file per leg that had to fall back
//! to a straight line.  Stop matches are persisted to a cache directory so
//! a second run starts warm.

mod network;

use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use tracing::{info, Level};

use sg_core::Mode;
use sg_output::{CsvShapeWriter, ShapeSink};
use sg_shapes::{
    CacheManager, GeoJsonDiagnostics, ModeTable, Overrides, ShapeAssembler, ShapeConfig,
    ShapeError, ShapeRequest, ShapeResult, StopTable,
};
use sg_spatial::RoadNetwork;

use network::{bus_network, tram_network};

const OUTPUT_DIR: &str = "output/corridor";

// ── Embedded inputs ───────────────────────────────────────────────────────────

const CONFIG_JSON: &str = r#"{
    "search_timeout_ms": 500,
    "simplify_epsilon": 0.00001,
    "max_snap_distance_m": 150.0,
    "modes": {
        "tram": { "default_ratio": 1.5, "same_group_ratio": 2.0, "search_timeout_ms": 200 }
    }
}"#;

// Grid intersections: row r, col c → (50.0600 + 0.002 r, 19.9300 + 0.003 c).
// 1004 is published 40 m off its corner; the graph's platform hint fixes it.
// 1090 sits on the spur, which has no road to the grid.
const STOPS_CSV: &str = "\
stop_id,stop_name,stop_lat,stop_lon\n\
1001,Rondo,50.0600,19.9300\n\
1002,Poczta,50.0600,19.9360\n\
1003,Rynek,50.0640,19.9360\n\
1004,Dworzec,50.0684,19.9420\n\
1090,Zajezdnia,50.0640,19.9510\n\
2001,Teatr,50.0640,19.9300\n\
2002,Hala,50.0640,19.9330\n\
2003,Most,50.0640,19.9390\n\
2004,Park,50.0640,19.9420\n\
";

// Force 1002 → 1003 round the east block instead of straight up.
const VIA_CSV: &str = "\
from_stop,to_stop,lat,lon\n\
1002,1003,50.0600,19.9390\n\
";

const RATIO_CSV: &str = "\
from_stop,to_stop,ratio\n\
1002,1003,4.0\n\
";

fn requests() -> Vec<ShapeRequest> {
    vec![
        ShapeRequest::new(Mode::Bus, "B1", "0", ["1001", "1002", "1003", "1004"]),
        ShapeRequest::new(Mode::Bus, "B1", "1", ["1004", "1003", "1002", "1001"]),
        ShapeRequest::new(Mode::Bus, "B7", "0", ["1003", "1090"]),
        ShapeRequest::new(Mode::Tram, "T3", "0", ["2001", "2002", "2003", "2004"]),
        // Same pattern again: served from the shape cache.
        ShapeRequest::new(Mode::Bus, "B1", "0", ["1001", "1002", "1003", "1004"]),
    ]
}

fn load_graph(mode: Mode) -> ShapeResult<RoadNetwork> {
    match mode {
        Mode::Bus => Ok(bus_network()),
        Mode::Tram => Ok(tram_network()),
        Mode::Train => Err(ShapeError::NoGraph(mode)),
    }
}

// ── main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).with_target(false).init();

    // 1. Inputs.
    let config = ShapeConfig::from_json_reader(CONFIG_JSON.as_bytes())?;
    let stops = StopTable::load_reader(STOPS_CSV.as_bytes())?;
    let mut overrides = Overrides::new();
    overrides.load_via_reader(VIA_CSV.as_bytes())?;
    overrides.load_ratio_reader(RATIO_CSV.as_bytes())?;
    info!(stops = stops.len(), via = overrides.via_count(), ratio = overrides.ratio_count(), "inputs loaded");

    // 2. Output locations.
    let out_dir = Path::new(OUTPUT_DIR);
    std::fs::create_dir_all(out_dir)?;
    let cache = CacheManager::new(out_dir.join("cache"));
    let diagnostics = GeoJsonDiagnostics::new(out_dir.join("diagnostics"))?;

    // 3. Graphs load on first use; warm them so persisted matches can be
    //    restored before any shape is built.
    let modes = ModeTable::new(load_graph, config.leaf_size);
    for mode in [Mode::Bus, Mode::Tram] {
        modes.graph(mode)?;
    }
    let restored = modes.restore_matches(&cache, config.cache_ttl());
    info!(restored, "stop matches restored from cache");

    let assembler = ShapeAssembler::new(modes, stops, overrides, config.clone()).with_diagnostics(diagnostics);

    // 4. Run.
    let requests = requests();
    let mut sink = CsvShapeWriter::new(out_dir)?;
    let t0 = Instant::now();
    let shapes = assembler.generate_all(&requests, &mut sink)?;
    sink.finish()?;
    let elapsed = t0.elapsed();

    assembler.modes().persist_matches(&cache);

    // 5. Summary.
    println!();
    println!("Shapes generated in {:.3} s", elapsed.as_secs_f64());
    println!("  {}/shapes.txt", OUTPUT_DIR);
    println!("  {}/diagnostics/ : {} failed pair(s)", OUTPUT_DIR, assembler.failed_pair_count());
    println!();
    println!("{:<8} {:>6} {:>7} {:>7} {:>10}", "Shape", "Stops", "Points", "Failed", "Length m");
    println!("{}", "-".repeat(42));
    for shape in &shapes {
        println!(
            "{:<8} {:>6} {:>7} {:>7} {:>10.1}",
            shape.shape_id.as_str(),
            shape.distances.len(),
            shape.point_count,
            shape.failed_legs,
            shape.total_m(),
        );
    }

    Ok(())
}
