//! Unit and scenario tests for sg-shapes.
//!
//! Networks are built by hand at metre scale so every expected length and
//! ratio can be worked out on paper.

#[cfg(test)]
mod helpers {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use sg_core::{GeoPoint, Mode, NodeId};
    use sg_spatial::{DijkstraRouter, RoadNetwork, RoadNetworkBuilder, Route, Router, SpatialError};

    use crate::{
        DiagnosticsSink, GraphLegRouter, LegError, LegFailure, LegRouter, ModeTable, Overrides,
        ShapeAssembler, ShapeConfig, ShapeResult, StopTable,
    };

    pub const ORIGIN: GeoPoint = GeoPoint { lat: 52.0, lon: 21.0 };

    /// `base` moved `north_m` metres north and `east_m` metres east, on the
    /// same sphere the haversine distance uses.
    pub fn offset(base: GeoPoint, north_m: f64, east_m: f64) -> GeoPoint {
        let r = 6_371_000.0_f64;
        let dlat = (north_m / r).to_degrees();
        let dlon = (east_m / (r * base.lat.to_radians().cos())).to_degrees();
        GeoPoint::new(base.lat + dlat, base.lon + dlon)
    }

    /// `A ── B ── C` along one parallel, 100 m apart.
    pub fn line_network() -> (RoadNetwork, [GeoPoint; 3]) {
        let pts = [ORIGIN, offset(ORIGIN, 0.0, 100.0), offset(ORIGIN, 0.0, 200.0)];
        let mut b = RoadNetworkBuilder::new();
        let ids: Vec<NodeId> = pts.iter().map(|&p| b.add_node(p)).collect();
        b.add_road(ids[0], ids[1]);
        b.add_road(ids[1], ids[2]);
        (b.build(), pts)
    }

    /// Two ways from `A` to `C`, 200 m apart: a detour via `N` (60 m
    /// north of the midpoint) and a shorter one via `S` (30 m south).
    ///
    /// Returns the network and `[A, N, S, C]`.
    pub fn two_path_network() -> (RoadNetwork, [GeoPoint; 4]) {
        let a = ORIGIN;
        let n = offset(ORIGIN, 60.0, 100.0);
        let s = offset(ORIGIN, -30.0, 100.0);
        let c = offset(ORIGIN, 0.0, 200.0);
        let mut b = RoadNetworkBuilder::new();
        let (ia, in_, is, ic) = (b.add_node(a), b.add_node(n), b.add_node(s), b.add_node(c));
        b.add_road(ia, in_);
        b.add_road(in_, ic);
        b.add_road(ia, is);
        b.add_road(is, ic);
        (b.build(), [a, n, s, c])
    }

    pub fn table(mode: Mode, network: RoadNetwork) -> ModeTable {
        ModeTable::from_networks([(mode, network)], 4)
    }

    pub fn stops<'a>(entries: impl IntoIterator<Item = (&'a str, GeoPoint)>) -> StopTable {
        entries.into_iter().collect()
    }

    pub fn assembler<D: DiagnosticsSink>(
        network:     RoadNetwork,
        stops:       StopTable,
        overrides:   Overrides,
        config:      ShapeConfig,
        diagnostics: D,
    ) -> ShapeAssembler<CountingLegRouter<GraphLegRouter>, D> {
        ShapeAssembler::with_parts(
            table(Mode::Bus, network),
            stops,
            overrides,
            config,
            CountingLegRouter::new(GraphLegRouter::default()),
            diagnostics,
        )
    }

    /// Counts calls before delegating.
    pub struct CountingLegRouter<L> {
        inner: L,
        calls: AtomicUsize,
    }

    impl<L> CountingLegRouter<L> {
        pub fn new(inner: L) -> Self {
            Self { inner, calls: AtomicUsize::new(0) }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl<L: LegRouter> LegRouter for CountingLegRouter<L> {
        fn route(
            &self,
            network: &RoadNetwork,
            from:    NodeId,
            to:      NodeId,
            via:     Option<NodeId>,
            timeout: Duration,
        ) -> Result<Vec<GeoPoint>, LegError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.route(network, from, to, via, timeout)
        }
    }

    /// Times out on any search touching `blocked`.
    pub struct BlockedRouter {
        pub blocked: NodeId,
    }

    impl Router for BlockedRouter {
        fn route(
            &self,
            network:  &RoadNetwork,
            from:     NodeId,
            to:       NodeId,
            deadline: Instant,
        ) -> Result<Route, SpatialError> {
            if from == self.blocked || to == self.blocked {
                return Err(SpatialError::Timeout { from, to });
            }
            DijkstraRouter.route(network, from, to, deadline)
        }
    }

    #[derive(Default)]
    pub struct CollectingDiagnostics {
        pub failures: Mutex<Vec<LegFailure>>,
    }

    impl CollectingDiagnostics {
        pub fn taken(&self) -> Vec<LegFailure> {
            self.failures.lock().unwrap().clone()
        }
    }

    impl DiagnosticsSink for CollectingDiagnostics {
        fn record(&self, failure: &LegFailure) -> ShapeResult<()> {
            self.failures.lock().unwrap().push(failure.clone());
            Ok(())
        }
    }
}

// ── Simplification ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod simplify_tests {
    use sg_core::GeoPoint;
    use crate::simplify;

    /// Planar point with x = lon, y = lat.
    fn xy(x: f64, y: f64) -> GeoPoint {
        GeoPoint::new(y, x)
    }

    fn wiggle(n: usize) -> Vec<GeoPoint> {
        (0..n)
            .map(|i| {
                let x = i as f64 * 0.001;
                xy(x, (i as f64 * 0.7).sin() * 0.0004 + (i as f64 * 0.13).cos() * 0.002)
            })
            .collect()
    }

    #[test]
    fn short_inputs_unchanged() {
        assert!(simplify(&[], 1.0).is_empty());
        let one = vec![xy(0.0, 0.0)];
        assert_eq!(simplify(&one, 1.0), one);
        let two = vec![xy(0.0, 0.0), xy(1.0, 1.0)];
        assert_eq!(simplify(&two, f64::INFINITY), two);
    }

    #[test]
    fn collinear_input_survives_zero_epsilon() {
        let straight: Vec<_> = (0..6).map(|i| xy(i as f64, 2.0 * i as f64)).collect();
        assert_eq!(simplify(&straight, 0.0), straight);
    }

    #[test]
    fn infinite_epsilon_keeps_endpoints() {
        let pts = wiggle(50);
        let out = simplify(&pts, f64::INFINITY);
        assert_eq!(out, vec![pts[0], pts[49]]);
    }

    #[test]
    fn drops_points_within_tolerance() {
        let pts = vec![xy(0.0, 0.0), xy(1.0, 0.01), xy(2.0, 0.0), xy(3.0, 1.0), xy(4.0, 0.0)];
        let out = simplify(&pts, 0.1);
        assert_eq!(out, vec![xy(0.0, 0.0), xy(2.0, 0.0), xy(3.0, 1.0), xy(4.0, 0.0)]);
    }

    #[test]
    fn idempotent() {
        let pts = wiggle(200);
        for eps in [1e-5, 1e-4, 5e-4, 1e-3] {
            let once = simplify(&pts, eps);
            assert_eq!(simplify(&once, eps), once, "eps {eps}");
        }
    }

    #[test]
    fn output_is_ordered_subsequence() {
        let pts = wiggle(120);
        let out = simplify(&pts, 2e-4);
        assert_eq!(out.first(), pts.first());
        assert_eq!(out.last(), pts.last());

        let mut cursor = pts.iter();
        for p in &out {
            assert!(cursor.any(|q| q == p), "{p} out of order or invented");
        }
    }
}

// ── Ratio validation ───────────────────────────────────────────────────────────

#[cfg(test)]
mod ratio_tests {
    use sg_core::{Mode, StopId};
    use super::helpers::{offset, ORIGIN};
    use crate::{length_ratio, LegError, ModeThresholds, Overrides, RatioValidator, ShapeConfig};

    fn ids(a: &str, b: &str) -> (StopId, StopId) {
        (StopId::new(a), StopId::new(b))
    }

    #[test]
    fn degenerate_straight_line_is_ratio_one() {
        let p = ORIGIN;
        assert_eq!(length_ratio(&[p, offset(p, 50.0, 0.0), p], &[p, p]), 1.0);
    }

    #[test]
    fn route_equal_to_straight_line_passes_any_override() {
        let (a, b) = ids("10001", "20001");
        let line = [ORIGIN, offset(ORIGIN, 0.0, 500.0)];
        for over in [0.2, 1.0, 3.5, 50.0] {
            let overrides = Overrides::new().with_ratio(a.clone(), b.clone(), over);
            let v = RatioValidator::new(&ShapeConfig::default(), Mode::Bus, &overrides);
            assert_eq!(v.validate(&line, &line, &a, &b), Ok(()), "override {over}");
        }
    }

    #[test]
    fn limit_is_inclusive() {
        let overrides = Overrides::new();
        let v = RatioValidator::new(&ShapeConfig::default(), Mode::Bus, &overrides);
        let (a, b) = ids("10001", "20001");

        assert_eq!(v.judge(3.5, &a, &b), Ok(()));
        assert_eq!(
            v.judge(3.5 + 1e-9, &a, &b),
            Err(LegError::RouteTooLong { ratio: 3.5 + 1e-9, expected: 3.5 })
        );
    }

    #[test]
    fn same_group_gets_the_looser_limit() {
        let overrides = Overrides::new();
        let v = RatioValidator::new(&ShapeConfig::default(), Mode::Bus, &overrides);
        let (a, b) = ids("1000a", "1000b");
        let (c, d) = ids("1000a", "2000b");

        assert_eq!(v.expected_ratio(&a, &b), 7.0);
        assert!(v.judge(6.9, &a, &b).is_ok());
        assert!(v.judge(6.9, &c, &d).is_err());
    }

    #[test]
    fn override_is_directional() {
        let (a, b) = ids("10001", "20001");
        let overrides = Overrides::new().with_ratio(a.clone(), b.clone(), 6.0);
        let v = RatioValidator::new(&ShapeConfig::default(), Mode::Bus, &overrides);

        assert!(v.judge(5.0, &a, &b).is_ok());
        assert!(v.judge(5.0, &b, &a).is_err());
    }

    #[test]
    fn loosening_override_on_a_passing_leg_is_unneeded() {
        let (a, b) = ids("10001", "20001");
        let overrides = Overrides::new().with_ratio(a.clone(), b.clone(), 6.0);
        let v = RatioValidator::new(&ShapeConfig::default(), Mode::Bus, &overrides);

        assert_eq!(v.unneeded_override(2.0, &a, &b), Some(6.0));
        assert_eq!(v.unneeded_override(3.5, &a, &b), Some(6.0));
        assert!(v.judge(2.0, &a, &b).is_ok());
    }

    #[test]
    fn loosening_override_that_admits_the_leg_is_needed() {
        let (a, b) = ids("10001", "20001");
        let overrides = Overrides::new().with_ratio(a.clone(), b.clone(), 6.0);
        let v = RatioValidator::new(&ShapeConfig::default(), Mode::Bus, &overrides);

        assert_eq!(v.unneeded_override(5.0, &a, &b), None);
        assert!(v.judge(5.0, &a, &b).is_ok());
    }

    #[test]
    fn tightening_override_is_never_unneeded() {
        let (a, b) = ids("10001", "20001");
        let overrides = Overrides::new().with_ratio(a.clone(), b.clone(), 2.0);
        let v = RatioValidator::new(&ShapeConfig::default(), Mode::Bus, &overrides);

        for ratio in [1.0, 1.5, 2.5, 3.0] {
            assert_eq!(v.unneeded_override(ratio, &a, &b), None, "ratio {ratio}");
        }
        assert!(v.judge(2.5, &a, &b).is_err());
        assert_eq!(v.unneeded_override(1.0, &b, &a), None);
    }

    #[test]
    fn limits_follow_the_mode() {
        let config = ShapeConfig::default().with_mode(
            Mode::Tram,
            ModeThresholds { default_ratio: Some(2.0), ..ModeThresholds::default() },
        );
        let overrides = Overrides::new();
        let bus = RatioValidator::new(&config, Mode::Bus, &overrides);
        let tram = RatioValidator::new(&config, Mode::Tram, &overrides);
        let (a, b) = ids("10001", "20001");
        let (c, d) = ids("1000a", "1000b");

        assert_eq!(bus.expected_ratio(&a, &b), 3.5);
        assert_eq!(tram.expected_ratio(&a, &b), 2.0);
        assert!(bus.judge(3.0, &a, &b).is_ok());
        assert!(tram.judge(3.0, &a, &b).is_err());
        // Unset tram fields fall back to the global values.
        assert_eq!(tram.expected_ratio(&c, &d), 7.0);
    }
}

// ── Stops, overrides, config ───────────────────────────────────────────────────

#[cfg(test)]
mod input_tests {
    use std::time::Duration;

    use sg_core::{GeoPoint, Mode, StopId};
    use crate::{Overrides, ShapeConfig, ShapeError, StopTable};

    #[test]
    fn stops_csv_ignores_extra_columns() {
        let csv = "stop_id,stop_name,stop_lat,stop_lon,zone_id\n\
                   10001,Centrum,52.23,21.01,1\n\
                   10002,Dworzec,52.228,21.003,1\n";
        let table = StopTable::load_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.position(&"10002".into()).unwrap(), GeoPoint::new(52.228, 21.003));
    }

    #[test]
    fn unknown_stop_is_an_error() {
        let table = StopTable::new();
        let stop = StopId::new("nope");
        assert!(matches!(table.position(&stop), Err(ShapeError::UnknownStop(s)) if s == stop));
    }

    #[test]
    fn malformed_stop_row_is_a_parse_error() {
        let csv = "stop_id,stop_lat,stop_lon\n10001,north,21.0\n";
        assert!(matches!(StopTable::load_reader(csv.as_bytes()), Err(ShapeError::Parse(_))));
    }

    #[test]
    fn override_files() {
        let mut o = Overrides::new();
        o.load_via_reader("from_stop,to_stop,lat,lon\n1,2,52.1,21.1\n".as_bytes()).unwrap();
        o.load_ratio_reader("from_stop,to_stop,ratio\n1,2,8.5\n2,3,4\n".as_bytes()).unwrap();

        let (s1, s2, s3) = (StopId::new("1"), StopId::new("2"), StopId::new("3"));
        assert_eq!(o.via(&s1, &s2), Some(GeoPoint::new(52.1, 21.1)));
        assert_eq!(o.via(&s2, &s1), None);
        assert_eq!(o.ratio(&s1, &s2), Some(8.5));
        assert_eq!(o.ratio(&s2, &s3), Some(4.0));
        assert_eq!(o.ratio_count(), 2);
    }

    #[test]
    fn override_dir_with_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ratio_overrides.csv"), "from_stop,to_stop,ratio\na,b,5\n").unwrap();
        let o = Overrides::load_dir(dir.path()).unwrap();
        assert_eq!(o.via_count(), 0);
        assert_eq!(o.ratio_count(), 1);
    }

    #[test]
    fn non_positive_ratio_rejected() {
        let mut o = Overrides::new();
        let res = o.load_ratio_reader("from_stop,to_stop,ratio\n1,2,0\n".as_bytes());
        assert!(matches!(res, Err(ShapeError::Parse(_))));
    }

    #[test]
    fn config_defaults_and_partial_json() {
        let cfg = ShapeConfig::from_json_reader(
            r#"{ "simplify_epsilon": 0.00001, "group_prefix_len": 3 }"#.as_bytes(),
        )
        .unwrap();
        assert_eq!(cfg.simplify_epsilon, Some(0.00001));
        assert_eq!(cfg.group_prefix_len, 3);
        assert_eq!(cfg.search_timeout_ms, ShapeConfig::default().search_timeout_ms);
        assert_eq!(cfg.same_group_ratio, 7.0);
        assert_eq!(cfg.max_snap_distance_m, None);
    }

    #[test]
    fn config_per_mode_limits() {
        let cfg = ShapeConfig::from_json_reader(
            r#"{ "search_timeout_ms": 800,
                 "modes": { "train": { "default_ratio": 2.0, "search_timeout_ms": 3000 } } }"#
                .as_bytes(),
        )
        .unwrap();
        assert_eq!(cfg.default_ratio(Mode::Train), 2.0);
        assert_eq!(cfg.default_ratio(Mode::Bus), 3.5);
        assert_eq!(cfg.same_group_ratio(Mode::Train), 7.0);
        assert_eq!(cfg.search_timeout(Mode::Train), Duration::from_millis(3000));
        assert_eq!(cfg.search_timeout(Mode::Tram), Duration::from_millis(800));
    }

    #[test]
    fn config_rejects_nonsense() {
        for json in [
            r#"{ "leaf_size": 0 }"#,
            r#"{ "default_ratio": 0.5 }"#,
            r#"{ "simplify_epsilon": -1 }"#,
            r#"{ "modes": { "tram": { "same_group_ratio": 0.9 } } }"#,
        ] {
            let res = ShapeConfig::from_json_reader(json.as_bytes());
            assert!(matches!(res, Err(ShapeError::Config(_))), "{json}");
        }
        assert!(ShapeConfig::from_json_reader(r#"{ "modes": { "ferry": {} } }"#.as_bytes()).is_err());
    }
}

// ── Cache ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod cache_tests {
    use std::time::{Duration, SystemTime};
    use crate::CacheManager;

    const DAY: Duration = Duration::from_secs(86_400);

    #[test]
    fn miss_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().join("cache"));

        assert_eq!(cache.retrieve("bus.osm.pbf", DAY), None);
        assert!(cache.save("bus.osm.pbf", b"payload"));
        assert_eq!(cache.retrieve("bus.osm.pbf", DAY).as_deref(), Some(&b"payload"[..]));
    }

    #[test]
    fn stale_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path());
        assert!(cache.save("tram.osm.pbf", b"old"));

        let file = std::fs::File::options().write(true).open(cache.path_for("tram.osm.pbf")).unwrap();
        file.set_modified(SystemTime::now() - 2 * DAY).unwrap();

        assert_eq!(cache.retrieve("tram.osm.pbf", DAY), None);
        assert!(cache.retrieve("tram.osm.pbf", 3 * DAY).is_some());
    }

    #[test]
    fn save_replaces_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path());
        cache.save("x", b"one");
        cache.save("x", b"two");
        assert_eq!(cache.retrieve("x", DAY).unwrap(), b"two");
        // Only the entry itself remains; no temporaries left behind.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn concurrent_saves_of_one_entry_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path());

        std::thread::scope(|scope| {
            for t in 0..8u8 {
                let cache = &cache;
                scope.spawn(move || {
                    for _ in 0..25 {
                        assert!(cache.save("matches-bus.json", &[t; 64]));
                    }
                });
            }
        });

        let bytes = cache.retrieve("matches-bus.json", DAY).unwrap();
        assert_eq!(bytes.len(), 64);
        assert!(bytes.iter().all(|&b| b == bytes[0]));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn names_cannot_escape_the_directory() {
        let cache = CacheManager::new("/tmp/sg-cache");
        let path = cache.path_for("../etc/passwd");
        assert_eq!(path.parent(), Some(cache.dir()));
    }

    #[test]
    fn unwritable_directory_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        let cache = CacheManager::new(blocker.join("sub"));
        assert!(!cache.save("x", b"y"));
        assert_eq!(cache.retrieve("x", DAY), None);
    }
}

// ── Mode graphs & stop matching ────────────────────────────────────────────────

#[cfg(test)]
mod matcher_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use sg_core::{Mode, NodeId, StopId};
    use sg_spatial::RoadNetworkBuilder;

    use super::helpers::{line_network, offset, table, ORIGIN};
    use crate::matcher::node_for;
    use crate::{CacheManager, ModeGraph, ModeTable, ShapeError};

    #[test]
    fn nearest_node_is_memoised() {
        let (net, pts) = line_network();
        let t = table(Mode::Bus, net);
        let g = t.graph(Mode::Bus).unwrap();
        let stop = StopId::new("10001");

        let near_b = offset(pts[1], 8.0, 3.0);
        assert_eq!(node_for(&g, &stop, near_b, None).unwrap(), Some(NodeId(1)));
        assert_eq!(g.match_count(), 1);

        // The memo wins even when asked with a different position.
        assert_eq!(node_for(&g, &stop, pts[0], None).unwrap(), Some(NodeId(1)));
    }

    #[test]
    fn hint_beats_proximity() {
        let (_, pts) = line_network();
        let mut b = RoadNetworkBuilder::new();
        let ids: Vec<_> = pts.iter().map(|&p| b.add_node(p)).collect();
        b.add_road(ids[0], ids[1]);
        b.add_stop_hint("s-far", ids[2]);
        b.add_stop_hint("s-ghost", NodeId(99));
        let t = table(Mode::Tram, b.build());
        let g = t.graph(Mode::Tram).unwrap();

        assert_eq!(node_for(&g, &"s-far".into(), pts[0], None).unwrap(), Some(ids[2]));
        // A hint naming a node the graph lacks falls back to proximity.
        assert_eq!(node_for(&g, &"s-ghost".into(), pts[0], None).unwrap(), Some(ids[0]));
    }

    #[test]
    fn far_stop_is_unmatched_and_not_memoised() {
        let (net, _) = line_network();
        let t = table(Mode::Bus, net);
        let g = t.graph(Mode::Bus).unwrap();
        let far = offset(ORIGIN, 1_000.0, 0.0);

        assert_eq!(node_for(&g, &"x".into(), far, Some(50.0)).unwrap(), None);
        assert_eq!(g.match_count(), 0);
        assert_eq!(node_for(&g, &"x".into(), far, None).unwrap(), Some(NodeId(0)));
    }

    #[test]
    fn empty_graph_is_a_hard_error() {
        let t = table(Mode::Train, RoadNetworkBuilder::new().build());
        let g = t.graph(Mode::Train).unwrap();
        assert!(matches!(node_for(&g, &"x".into(), ORIGIN, None), Err(ShapeError::NoGraphNodes(Mode::Train))));
    }

    #[test]
    fn missing_mode_graph_is_reported() {
        let (net, _) = line_network();
        let t = table(Mode::Bus, net);
        assert!(matches!(t.graph(Mode::Tram), Err(ShapeError::NoGraph(Mode::Tram))));
    }

    #[test]
    fn graphs_load_lazily_and_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let t = ModeTable::new(
            move |_mode: Mode| -> crate::ShapeResult<sg_spatial::RoadNetwork> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(line_network().0)
            },
            8,
        );

        assert!(t.loaded(Mode::Bus).is_none());
        let a = t.graph(Mode::Bus).unwrap();
        let b = t.graph(Mode::Bus).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn replace_invalidates_matches() {
        let (net, pts) = line_network();
        let t = table(Mode::Bus, net);
        let old = t.graph(Mode::Bus).unwrap();
        node_for(&old, &"10001".into(), pts[2], None).unwrap();
        assert_eq!(old.match_count(), 1);

        let (net2, _) = line_network();
        let new = t.replace(Mode::Bus, net2);
        assert_eq!(new.match_count(), 0);
        assert!(Arc::ptr_eq(&new, &t.graph(Mode::Bus).unwrap()));
        // Holders of the old graph still see their matches.
        assert_eq!(old.match_count(), 1);
    }

    #[test]
    fn exported_matches_only_apply_to_the_same_graph() {
        let (net, pts) = line_network();
        let g = ModeGraph::new(Mode::Bus, Arc::new(net), 4);
        node_for(&g, &"a".into(), pts[0], None).unwrap();
        node_for(&g, &"b".into(), pts[2], None).unwrap();
        let bytes = g.export_matches().unwrap();

        let same = ModeGraph::new(Mode::Bus, Arc::new(line_network().0), 4);
        assert_eq!(same.import_matches(&bytes).unwrap(), 2);
        assert_eq!(node_for(&same, &"b".into(), pts[0], None).unwrap(), Some(NodeId(2)));

        let mut b = RoadNetworkBuilder::new();
        b.add_node(ORIGIN);
        let other = ModeGraph::new(Mode::Bus, Arc::new(b.build()), 4);
        assert_eq!(other.import_matches(&bytes).unwrap(), 0);
        assert_eq!(other.match_count(), 0);
    }

    #[test]
    fn matches_round_trip_through_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path());
        let (net, pts) = line_network();

        let t = table(Mode::Bus, net);
        node_for(&t.graph(Mode::Bus).unwrap(), &"a".into(), pts[1], None).unwrap();
        t.persist_matches(&cache);

        let fresh = table(Mode::Bus, line_network().0);
        assert_eq!(fresh.restore_matches(&cache, Duration::from_secs(60)), 1);
        assert_eq!(fresh.graph(Mode::Bus).unwrap().match_count(), 1);
    }
}

// ── Leg routing ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod leg_tests {
    use std::time::Duration;

    use sg_core::{GeoPoint, NodeId};
    use sg_spatial::{DijkstraRouter, RoadNetworkBuilder};

    use super::helpers::{line_network, two_path_network, BlockedRouter, ORIGIN};
    use crate::{GraphLegRouter, LegError, LegRouter, ViaHalf};

    const T: Duration = Duration::from_secs(5);

    #[test]
    fn shortest_path_without_via() {
        let (net, [a, _n, s, c]) = two_path_network();
        let legs = GraphLegRouter::new(DijkstraRouter);
        assert_eq!(legs.route(&net, NodeId(0), NodeId(3), None, T).unwrap(), vec![a, s, c]);
    }

    #[test]
    fn via_forces_detour_without_duplicate() {
        let (net, [a, n, _s, c]) = two_path_network();
        let legs = GraphLegRouter::new(DijkstraRouter);
        assert_eq!(legs.route(&net, NodeId(0), NodeId(3), Some(NodeId(1)), T).unwrap(), vec![a, n, c]);
    }

    #[test]
    fn same_node_is_too_few() {
        let (net, _) = line_network();
        let legs = GraphLegRouter::<DijkstraRouter>::default();
        assert_eq!(legs.route(&net, NodeId(1), NodeId(1), None, T), Err(LegError::TooFewNodes(1)));
    }

    #[test]
    fn via_at_an_endpoint_still_routes() {
        let (net, pts) = line_network();
        let legs = GraphLegRouter::<DijkstraRouter>::default();
        let out = legs.route(&net, NodeId(0), NodeId(2), Some(NodeId(0)), T).unwrap();
        assert_eq!(out, pts.to_vec());
    }

    #[test]
    fn disconnected_is_search_failed() {
        let mut b = RoadNetworkBuilder::new();
        b.add_node(ORIGIN);
        b.add_node(GeoPoint::new(52.01, 21.0));
        let net = b.build();
        let legs = GraphLegRouter::<DijkstraRouter>::default();
        assert_eq!(legs.route(&net, NodeId(0), NodeId(1), None, T), Err(LegError::SearchFailed));
    }

    #[test]
    fn expired_budget_is_timeout() {
        let (net, _) = line_network();
        let legs = GraphLegRouter::<DijkstraRouter>::default();
        assert_eq!(legs.route(&net, NodeId(0), NodeId(2), None, Duration::ZERO), Err(LegError::SearchTimeout));
    }

    #[test]
    fn via_failures_name_their_half() {
        let (net, _) = two_path_network();
        let legs = GraphLegRouter::new(BlockedRouter { blocked: NodeId(3) });

        let err = legs.route(&net, NodeId(0), NodeId(3), Some(NodeId(1)), T).unwrap_err();
        assert_eq!(err, LegError::ViaLegFailed { half: ViaHalf::Second, cause: Box::new(LegError::SearchTimeout) });
        assert_eq!(err.status(), "via_second_half:timeout");

        let legs = GraphLegRouter::new(BlockedRouter { blocked: NodeId(0) });
        let err = legs.route(&net, NodeId(0), NodeId(3), Some(NodeId(1)), T).unwrap_err();
        assert_eq!(err.status(), "via_first_half:timeout");
    }
}

// ── Diagnostics ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod diagnostics_tests {
    use geojson::{GeoJson, Value};
    use serde_json::json;

    use sg_core::{NodeId, StopId};

    use super::helpers::{offset, ORIGIN};
    use crate::diagnostics::to_geojson;
    use crate::{DiagnosticsSink, GeoJsonDiagnostics, LegError, LegFailure, ViaHalf};

    fn failure(error: LegError) -> LegFailure {
        LegFailure {
            from_stop: StopId::new("a/1"),
            to_stop:   StopId::new("b 2"),
            from_node: Some(NodeId(4)),
            to_node:   None,
            error,
            polyline:  vec![ORIGIN, offset(ORIGIN, 100.0, 0.0)],
        }
    }

    #[test]
    fn status_strings() {
        let cases = [
            (LegError::NoNodesFound, "no_nodes_found"),
            (LegError::SearchTimeout, "timeout"),
            (LegError::SearchFailed, "search_failed"),
            (LegError::TooFewNodes(1), "too_few_nodes"),
            (LegError::RouteTooLong { ratio: 9.0, expected: 3.5 }, "route_too_long"),
            (LegError::via(ViaHalf::First, LegError::SearchFailed), "via_first_half:search_failed"),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status);
        }
    }

    #[test]
    fn feature_collection_layout() {
        let gj = to_geojson(&failure(LegError::RouteTooLong { ratio: 8.25, expected: 7.0 }));
        let GeoJson::FeatureCollection(fc) = gj else { panic!("not a collection") };
        assert_eq!(fc.features.len(), 3);

        let line = &fc.features[0];
        assert!(matches!(line.geometry.as_ref().unwrap().value, Value::LineString(ref c) if c.len() == 2));
        let props = line.properties.as_ref().unwrap();
        assert_eq!(props["from_stop"], json!("a/1"));
        assert_eq!(props["from_node"], json!(4));
        assert_eq!(props["to_node"], json!(-1));
        assert_eq!(props["status"], json!("route_too_long"));
        assert_eq!(props["ratio"], json!(8.25));

        for f in &fc.features[1..] {
            assert!(matches!(f.geometry.as_ref().unwrap().value, Value::Point(_)));
        }
    }

    #[test]
    fn coordinates_are_lon_lat() {
        let gj = to_geojson(&failure(LegError::SearchTimeout));
        let GeoJson::FeatureCollection(fc) = gj else { panic!("not a collection") };
        let Value::Point(ref p) = fc.features[1].geometry.as_ref().unwrap().value else { panic!() };
        assert_eq!(p, &vec![ORIGIN.lon, ORIGIN.lat]);
        assert!(!fc.features[0].properties.as_ref().unwrap().contains_key("ratio"));
    }

    #[test]
    fn one_file_per_pair_with_safe_name() {
        let dir = tempfile::tempdir().unwrap();
        let diag = GeoJsonDiagnostics::new(dir.path().join("diag")).unwrap();
        diag.record(&failure(LegError::SearchTimeout)).unwrap();

        let path = diag.dir().join("a%2F1__b%202.geojson");
        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: GeoJson = text.parse().unwrap();
        assert!(matches!(parsed, GeoJson::FeatureCollection(_)));
    }

    #[test]
    fn look_alike_pairs_get_their_own_files() {
        let dir = tempfile::tempdir().unwrap();
        let diag = GeoJsonDiagnostics::new(dir.path()).unwrap();
        let pairs = [("a__b", "c"), ("a", "b__c"), ("A/1", "B"), ("A_1", "B"), ("A%2F1", "B")];

        for (from, to) in pairs {
            let f = LegFailure { from_stop: StopId::new(from), to_stop: StopId::new(to), ..failure(LegError::SearchFailed) };
            diag.record(&f).unwrap();
        }

        let files = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, pairs.len());
        for (from, to) in pairs {
            let path = diag.path_for(&StopId::new(from), &StopId::new(to));
            let text = std::fs::read_to_string(&path).unwrap();
            let GeoJson::FeatureCollection(fc) = text.parse::<GeoJson>().unwrap() else { panic!("not a collection") };
            let props = fc.features[0].properties.as_ref().unwrap();
            assert_eq!(props["from_stop"], json!(from));
            assert_eq!(props["to_stop"], json!(to));
        }
    }
}

// ── Assembly ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod assembler_tests {
    use std::sync::Arc;

    use sg_core::{Mode, NodeId, ShapeId, StopId};
    use sg_output::{OutputError, OutputResult, ShapePoint, ShapeSink, VecSink};
    use sg_spatial::RoadNetworkBuilder;

    use super::helpers::{
        assembler, line_network, offset, stops, two_path_network, BlockedRouter, CollectingDiagnostics,
        CountingLegRouter, ORIGIN,
    };
    use crate::{
        GeoJsonDiagnostics, GraphLegRouter, LegError, ModeTable, ModeThresholds, NoDiagnostics, Overrides,
        ShapeAssembler, ShapeConfig, ShapeError, ShapeRequest,
    };

    /// Accepts `writes_left` batches, then fails every write.
    struct FlakySink {
        inner:       VecSink,
        writes_left: usize,
    }

    impl ShapeSink for FlakySink {
        fn write_points(&mut self, shape_id: &ShapeId, points: &[ShapePoint]) -> OutputResult<()> {
            if self.writes_left == 0 {
                return Err(OutputError::Io(std::io::Error::other("disk full")));
            }
            self.writes_left -= 1;
            self.inner.write_points(shape_id, points)
        }

        fn finish(&mut self) -> OutputResult<()> {
            Ok(())
        }
    }

    fn ids(raw: &[&str]) -> Vec<StopId> {
        raw.iter().map(|s| StopId::new(*s)).collect()
    }

    fn line_stops() -> (sg_spatial::RoadNetwork, crate::StopTable) {
        let (net, pts) = line_network();
        let table = stops([("10001", pts[0]), ("20001", pts[1]), ("30001", pts[2])]);
        (net, table)
    }

    #[test]
    fn distances_start_at_zero_and_never_decrease() {
        let (net, table) = line_stops();
        let asm = assembler(net, table, Overrides::new(), ShapeConfig::default(), NoDiagnostics);
        let mut sink = VecSink::new();

        let shape = asm
            .get_shape(Mode::Bus, "R1", "0", &ids(&["10001", "20001", "30001"]), &mut sink)
            .unwrap();

        assert_eq!(shape.distances.len(), 3);
        assert_eq!(shape.distances[0], 0.0);
        assert!(shape.distances.windows(2).all(|w| w[0] <= w[1]));
        assert!((shape.total_m() - 200.0).abs() < 0.5, "{}", shape.total_m());
        assert_eq!(shape.failed_legs, 0);

        let pts = sink.points_for(&ShapeId::new("R1", "0"));
        assert_eq!(pts.len(), 3);
        assert_eq!(shape.point_count, 3);
        for (i, p) in pts.iter().enumerate() {
            assert_eq!(p.sequence, i as u32);
        }
        assert!(pts.windows(2).all(|w| w[0].dist_traveled_m <= w[1].dist_traveled_m));
        assert_eq!(pts[2].dist_traveled_m, shape.total_m());
    }

    #[test]
    fn repeated_pattern_is_served_from_cache() {
        let (net, table) = line_stops();
        let asm = assembler(net, table, Overrides::new(), ShapeConfig::default(), NoDiagnostics);
        let pattern = ids(&["10001", "20001", "30001"]);
        let mut sink = VecSink::new();

        let first = asm.get_shape(Mode::Bus, "R1", "0", &pattern, &mut sink).unwrap();
        let calls = asm.leg_router().calls();
        let rows = sink.len();
        assert_eq!(calls, 2);

        let second = asm.get_shape(Mode::Bus, "R1", "0", &pattern, &mut sink).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(asm.leg_router().calls(), calls);
        assert_eq!(sink.len(), rows);
    }

    #[test]
    fn empty_pattern_is_rejected() {
        let (net, table) = line_stops();
        let asm = assembler(net, table, Overrides::new(), ShapeConfig::default(), NoDiagnostics);
        let res = asm.get_shape(Mode::Bus, "R1", "0", &[], &mut VecSink::new());
        assert!(matches!(res, Err(ShapeError::EmptyPattern(_))));
    }

    #[test]
    fn single_stop_needs_no_graph() {
        let (_, table) = line_stops();
        let asm = ShapeAssembler::new(
            crate::ModeTable::from_networks(Vec::<(Mode, sg_spatial::RoadNetwork)>::new(), 4),
            table,
            Overrides::new(),
            ShapeConfig::default(),
        );
        let mut sink = VecSink::new();
        let shape = asm.get_shape(Mode::Train, "R", "p", &ids(&["20001"]), &mut sink).unwrap();
        assert_eq!(shape.distances, vec![0.0]);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn unknown_stop_aborts_before_output() {
        let (net, table) = line_stops();
        let asm = assembler(net, table, Overrides::new(), ShapeConfig::default(), NoDiagnostics);
        let mut sink = VecSink::new();
        let res = asm.get_shape(Mode::Bus, "R", "p", &ids(&["10001", "99999"]), &mut sink);
        assert!(matches!(res, Err(ShapeError::UnknownStop(s)) if s.as_str() == "99999"));
        assert!(sink.is_empty());
    }

    #[test]
    fn unreachable_middle_stop_falls_back_to_straight_lines() {
        let (net, pts) = line_network();
        let table = stops([("10001", pts[0]), ("20001", pts[1]), ("30001", pts[2])]);
        let dir = tempfile::tempdir().unwrap();
        let diag = GeoJsonDiagnostics::new(dir.path()).unwrap();
        let asm = ShapeAssembler::with_parts(
            super::helpers::table(Mode::Bus, net),
            table,
            Overrides::new(),
            ShapeConfig::default(),
            GraphLegRouter::new(BlockedRouter { blocked: NodeId(1) }),
            diag,
        );
        let mut sink = VecSink::new();

        let shape = asm
            .get_shape(Mode::Bus, "R1", "0", &ids(&["10001", "20001", "30001"]), &mut sink)
            .unwrap();

        assert_eq!(shape.failed_legs, 2);
        let out: Vec<_> = sink.points_for(&ShapeId::new("R1", "0")).iter().map(|p| p.pos()).collect();
        assert_eq!(out, pts.to_vec());
        assert!((shape.distances[1] - 100.0).abs() < 0.5);

        let mut files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        files.sort();
        assert_eq!(files, vec!["10001__20001.geojson", "20001__30001.geojson"]);
    }

    #[test]
    fn each_failing_pair_is_reported_once() {
        let (net, pts) = line_network();
        let table = stops([("10001", pts[0]), ("20001", pts[1]), ("30001", pts[2])]);
        let asm = ShapeAssembler::with_parts(
            super::helpers::table(Mode::Bus, net),
            table,
            Overrides::new(),
            ShapeConfig::default(),
            GraphLegRouter::new(BlockedRouter { blocked: NodeId(1) }),
            CollectingDiagnostics::default(),
        );
        let pattern = ids(&["10001", "20001", "30001"]);
        let mut sink = VecSink::new();
        asm.get_shape(Mode::Bus, "R1", "0", &pattern, &mut sink).unwrap();
        asm.get_shape(Mode::Bus, "R1", "1", &pattern, &mut sink).unwrap();

        let failures = asm.diagnostics().taken();
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|f| f.error == LegError::SearchTimeout));
        assert_eq!(asm.failed_pair_count(), 2);
    }

    /// Two stops of one group 5 m apart, joined only by a 40 m detour.
    fn detour_fixture() -> (sg_spatial::RoadNetwork, crate::StopTable) {
        let a = ORIGIN;
        let b = offset(ORIGIN, 5.0, 0.0);
        let east = (20.0f64 * 20.0 - 2.5 * 2.5).sqrt();
        let c = offset(ORIGIN, 2.5, east);

        let mut nb = RoadNetworkBuilder::new();
        let (ia, ib, ic) = (nb.add_node(a), nb.add_node(b), nb.add_node(c));
        nb.add_road(ia, ic);
        nb.add_road(ic, ib);
        (nb.build(), stops([("100001", a), ("100002", b)]))
    }

    #[test]
    fn implausible_detour_is_rejected() {
        let (net, table) = detour_fixture();
        let asm = assembler(net, table, Overrides::new(), ShapeConfig::default(), CollectingDiagnostics::default());
        let mut sink = VecSink::new();

        let shape = asm.get_shape(Mode::Bus, "R", "p", &ids(&["100001", "100002"]), &mut sink).unwrap();
        assert_eq!(shape.failed_legs, 1);
        assert_eq!(sink.len(), 2);
        assert!((shape.total_m() - 5.0).abs() < 0.01);

        let failures = asm.diagnostics().taken();
        assert_eq!(failures.len(), 1);
        match failures[0].error {
            LegError::RouteTooLong { ratio, expected } => {
                assert!((ratio - 8.0).abs() < 0.05, "ratio {ratio}");
                assert_eq!(expected, 7.0);
            }
            ref other => panic!("unexpected {other:?}"),
        }
        assert_eq!(failures[0].from_node, Some(NodeId(0)));
        assert_eq!(failures[0].to_node, Some(NodeId(1)));
    }

    #[test]
    fn ratio_override_admits_the_detour() {
        let (net, table) = detour_fixture();
        let overrides = Overrides::new().with_ratio("100001", "100002", 9.0);
        let asm = assembler(net, table, overrides, ShapeConfig::default(), CollectingDiagnostics::default());
        let mut sink = VecSink::new();

        let shape = asm.get_shape(Mode::Bus, "R", "p", &ids(&["100001", "100002"]), &mut sink).unwrap();
        assert_eq!(shape.failed_legs, 0);
        assert_eq!(sink.len(), 3);
        assert!((shape.total_m() - 40.0).abs() < 0.1);
        assert!(asm.diagnostics().taken().is_empty());
    }

    #[test]
    fn via_point_steers_the_route() {
        let (net, [a, n, s, c]) = two_path_network();
        let table = stops([("10001", a), ("30001", c)]);
        let pattern = ids(&["10001", "30001"]);

        let plain = assembler(net.clone(), table.clone(), Overrides::new(), ShapeConfig::default(), NoDiagnostics);
        let mut sink = VecSink::new();
        plain.get_shape(Mode::Bus, "R", "p", &pattern, &mut sink).unwrap();
        let out: Vec<_> = sink.rows().iter().map(|r| r.point.pos()).collect();
        assert_eq!(out, vec![a, s, c]);

        let overrides = Overrides::new().with_via("10001", "30001", offset(n, 1.0, -1.0));
        let steered = assembler(net, table, overrides, ShapeConfig::default(), NoDiagnostics);
        let mut sink = VecSink::new();
        let shape = steered.get_shape(Mode::Bus, "R", "p", &pattern, &mut sink).unwrap();
        let out: Vec<_> = sink.rows().iter().map(|r| r.point.pos()).collect();
        assert_eq!(out, vec![a, n, c]);
        assert_eq!(shape.failed_legs, 0);
    }

    #[test]
    fn out_of_reach_stop_gets_straight_line() {
        let (net, pts) = line_network();
        let far = offset(ORIGIN, 1_000.0, 0.0);
        let table = stops([("10001", pts[0]), ("20001", far)]);
        let config = ShapeConfig { max_snap_distance_m: Some(50.0), ..ShapeConfig::default() };
        let asm = assembler(net, table, Overrides::new(), config, CollectingDiagnostics::default());
        let mut sink = VecSink::new();

        asm.get_shape(Mode::Bus, "R", "p", &ids(&["10001", "20001"]), &mut sink).unwrap();
        assert_eq!(asm.leg_router().calls(), 0);
        let failures = asm.diagnostics().taken();
        assert_eq!(failures[0].error, LegError::NoNodesFound);
        assert_eq!(failures[0].to_node, None);
        assert_eq!(sink.rows().last().unwrap().point.pos(), far);
    }

    #[test]
    fn simplification_drops_collinear_points() {
        let (net, pts) = line_network();
        let table = stops([("10001", pts[0]), ("30001", pts[2])]);
        let pattern = ids(&["10001", "30001"]);

        let asm = assembler(net.clone(), table.clone(), Overrides::new(), ShapeConfig::default(), NoDiagnostics);
        let mut sink = VecSink::new();
        asm.get_shape(Mode::Bus, "R", "p", &pattern, &mut sink).unwrap();
        assert_eq!(sink.len(), 3);

        let config = ShapeConfig { simplify_epsilon: Some(1e-7), ..ShapeConfig::default() };
        let asm = assembler(net, table, Overrides::new(), config, NoDiagnostics);
        let mut sink = VecSink::new();
        asm.get_shape(Mode::Bus, "R", "p", &pattern, &mut sink).unwrap();
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn generate_all_dedupes_and_keeps_request_order() {
        let (net, table) = line_stops();
        let asm = assembler(net, table, Overrides::new(), ShapeConfig::default(), NoDiagnostics);
        let requests = vec![
            ShapeRequest::new(Mode::Bus, "R1", "0", ["10001", "20001", "30001"]),
            ShapeRequest::new(Mode::Bus, "R2", "0", ["30001", "20001"]),
            ShapeRequest::new(Mode::Bus, "R1", "0", ["10001", "20001", "30001"]),
        ];
        let mut sink = VecSink::new();

        let shapes = asm.generate_all(&requests, &mut sink).unwrap();
        sink.finish().unwrap();

        assert_eq!(shapes.len(), 3);
        assert!(Arc::ptr_eq(&shapes[0], &shapes[2]));
        assert_eq!(shapes[1].shape_id, ShapeId::new("R2", "0"));
        assert_eq!(sink.len(), 3 + 2);
        assert_eq!(asm.leg_router().calls(), 3);

        let order: Vec<_> = sink.rows().iter().map(|r| r.shape_id.as_str().to_owned()).collect();
        assert_eq!(order, vec!["R1/0", "R1/0", "R1/0", "R2/0", "R2/0"]);
    }

    #[test]
    fn mode_limits_decide_the_same_detour_differently() {
        let (net, table) = detour_fixture();
        let config = ShapeConfig::default().with_mode(
            Mode::Tram,
            ModeThresholds { same_group_ratio: Some(9.0), ..ModeThresholds::default() },
        );
        let asm = ShapeAssembler::with_parts(
            ModeTable::from_networks([(Mode::Bus, net.clone()), (Mode::Tram, net)], 4),
            table,
            Overrides::new(),
            config,
            <GraphLegRouter>::default(),
            CollectingDiagnostics::default(),
        );
        let pattern = ids(&["100001", "100002"]);
        let mut sink = VecSink::new();

        let bus = asm.get_shape(Mode::Bus, "B", "p", &pattern, &mut sink).unwrap();
        let tram = asm.get_shape(Mode::Tram, "T", "p", &pattern, &mut sink).unwrap();

        assert_eq!(bus.failed_legs, 1);
        assert_eq!(tram.failed_legs, 0);
        assert!((tram.total_m() - 40.0).abs() < 0.1);
        let failures = asm.diagnostics().taken();
        assert!(matches!(failures[0].error, LegError::RouteTooLong { expected, .. } if expected == 7.0));
    }

    #[test]
    fn sink_failure_leaves_the_shape_unmemoised() {
        let (net, table) = line_stops();
        let asm = assembler(net, table, Overrides::new(), ShapeConfig::default(), NoDiagnostics);
        let pattern = ids(&["10001", "20001", "30001"]);

        let mut flaky = FlakySink { inner: VecSink::new(), writes_left: 1 };
        let res = asm.get_shape(Mode::Bus, "R1", "0", &pattern, &mut flaky);
        assert!(matches!(res, Err(ShapeError::Output(_))));
        assert_eq!(flaky.inner.len(), 2);

        // The retry starts over rather than returning a shape whose rows
        // never reached a sink.
        let mut sink = VecSink::new();
        let shape = asm.get_shape(Mode::Bus, "R1", "0", &pattern, &mut sink).unwrap();
        let seq: Vec<u32> = sink.rows().iter().map(|r| r.point.sequence).collect();
        assert_eq!(seq, vec![0, 1, 2]);
        assert_eq!(shape.point_count, 3);
        assert_eq!(asm.leg_router().calls(), 4);
    }

    #[test]
    fn aborted_run_keeps_earlier_shapes_and_forgets_later_ones() {
        let (net, table) = line_stops();
        let asm = assembler(net, table, Overrides::new(), ShapeConfig::default(), NoDiagnostics);
        let requests = vec![
            ShapeRequest::new(Mode::Bus, "R1", "0", ["10001", "20001", "30001"]),
            ShapeRequest::new(Mode::Bus, "R9", "0", ["10001", "99999"]),
            ShapeRequest::new(Mode::Bus, "R2", "0", ["30001", "20001"]),
        ];
        let mut sink = VecSink::new();

        let res = asm.generate_all(&requests, &mut sink);
        assert!(matches!(res, Err(ShapeError::UnknownStop(_))));
        let order: Vec<_> = sink.rows().iter().map(|r| r.shape_id.as_str().to_owned()).collect();
        assert_eq!(order, vec!["R1/0", "R1/0", "R1/0"]);

        let mut again = VecSink::new();
        asm.get_shape(Mode::Bus, "R1", "0", &requests[0].stops, &mut again).unwrap();
        assert!(again.is_empty());
        asm.get_shape(Mode::Bus, "R2", "0", &requests[2].stops, &mut again).unwrap();
        assert_eq!(again.len(), 2);
    }

    #[test]
    fn assembler_is_sync() {
        // The assembler is Sync, so one instance can serve many threads.
        fn assert_sync<T: Sync>(_: &T) {}
        let (net, table) = line_stops();
        let asm = assembler(net, table, Overrides::new(), ShapeConfig::default(), NoDiagnostics);
        assert_sync(&asm);
        let _: &CountingLegRouter<GraphLegRouter> = asm.leg_router();
    }
}
