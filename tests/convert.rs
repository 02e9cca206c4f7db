use chrono::{Days, NaiveDate};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use zarr_convert::paths::PathResolver;
use zarr_convert::runner::convert_local;
use zarr_convert::{
    Converter, DayGrid, DaySource, Field, PartitionKey, PartitionStatus, Season, SourceError,
    StoreState, VariablePolicy, ZarrStore, probe,
};

const SEASON: Season = Season::S16_17;
const STATE: &str = "Colorado";
const REGION: &str = "Steamboat";

#[derive(Clone, Copy)]
enum Broken {
    /// The file exists but cannot be opened
    Unreadable,
    /// The file opens but cannot be put on one grid
    Invalid,
}

/// Serves prepared grids by path and records which days were requested
#[derive(Default)]
struct MemorySource {
    files: Mutex<HashMap<PathBuf, DayGrid>>,
    broken: Mutex<HashMap<PathBuf, Broken>>,
    calls: Mutex<Vec<NaiveDate>>,
}

impl MemorySource {
    fn insert(&self, path: PathBuf, grid: DayGrid) {
        self.files.lock().unwrap().insert(path, grid);
    }

    fn break_file(&self, path: PathBuf, broken: Broken) {
        self.broken.lock().unwrap().insert(path, broken);
    }

    fn calls(&self) -> Vec<NaiveDate> {
        self.calls.lock().unwrap().clone()
    }
}

impl DaySource for MemorySource {
    fn load_day(&self, path: &Path, date: NaiveDate) -> Result<Option<DayGrid>, SourceError> {
        self.calls.lock().unwrap().push(date);
        match self.broken.lock().unwrap().get(path) {
            Some(Broken::Unreadable) => Err(SourceError::Unreadable {
                path: path.to_path_buf(),
                message: "NetCDF: HDF error".to_string(),
            }),
            Some(Broken::Invalid) => Err(SourceError::Invalid {
                path: path.to_path_buf(),
                message: "variable 't2m' holds 2 time steps, expected one".to_string(),
            }),
            None => Ok(self.files.lock().unwrap().get(path).cloned()),
        }
    }
}

/// Day `n` of the season, 1-based
fn day(n: u64) -> NaiveDate {
    SEASON.start_date().checked_add_days(Days::new(n - 1)).unwrap()
}

fn grid_on(date: NaiveDate, names: &[&str], lat: usize, lon: usize) -> DayGrid {
    let seed = date.signed_duration_since(SEASON.start_date()).num_days() as f32;
    let latitude = (0..lat).map(|i| 40.0 + i as f64 * 0.25).collect();
    let longitude = (0..lon).map(|i| -107.0 + i as f64 * 0.25).collect();
    let fields = names
        .iter()
        .enumerate()
        .map(|(v, n)| Field::new(*n, (0..lat * lon).map(|c| seed * 100.0 + v as f32 * 10.0 + c as f32).collect()))
        .collect();
    DayGrid::new(date, latitude, longitude, fields).unwrap()
}

fn grid(n: u64, names: &[&str]) -> DayGrid {
    grid_on(day(n), names, 2, 2)
}

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    resolver: PathResolver,
    source: Arc<MemorySource>,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        Self {
            resolver: PathResolver::new(&root, 1),
            root,
            _dir: dir,
            source: Arc::new(MemorySource::default()),
        }
    }

    fn add(&self, region: &str, grid: DayGrid) {
        let path = self.resolver.input_path(SEASON, region, grid.date());
        self.source.insert(path, grid);
    }

    fn break_day(&self, region: &str, date: NaiveDate, broken: Broken) {
        let path = self.resolver.input_path(SEASON, region, date);
        self.source.break_file(path, broken);
    }

    fn converter(&self, policy: VariablePolicy) -> Converter {
        let source: Box<dyn DaySource> = Box::new(Arc::clone(&self.source));
        Converter::new(&self.root, 1, source, policy).unwrap()
    }

    fn store_path(&self, region: &str) -> PathBuf {
        self.resolver.store_path(SEASON, STATE, region)
    }

    fn open_store(&self, region: &str) -> ZarrStore {
        ZarrStore::open(self.store_path(region)).unwrap().unwrap()
    }
}

#[test]
fn test_gaps_are_skipped_and_order_kept() {
    let fx = Fixture::new();
    for n in [1, 2, 5] {
        fx.add(REGION, grid(n, &["t2m", "snod"]));
    }

    let report = fx
        .converter(VariablePolicy::default())
        .compute_region(REGION, SEASON, STATE)
        .unwrap();

    assert_eq!(report.status, PartitionStatus::Finished);
    assert_eq!(report.written, vec![day(1), day(2), day(5)]);
    assert_eq!(report.missing_inputs.len(), 181 - 3);
    assert!(report.missing_inputs.contains(&day(3)));
    assert!(report.missing_inputs.contains(&day(4)));

    let store = fx.open_store(REGION);
    assert_eq!(store.times(), &[day(1), day(2), day(5)]);
    assert_eq!(store.variables(), &["t2m", "snod"]);
    // seed for day 5 is 4 -> 400 + variable offset + cell index
    assert_eq!(store.read_cell(2, 1, 1).unwrap(), vec![403.0, 413.0]);
}

#[test]
fn test_complete_store_is_left_untouched() {
    let fx = Fixture::new();
    for n in 1..=181 {
        fx.add(REGION, grid_on(day(n), &["t2m"], 1, 1));
    }
    let converter = fx.converter(VariablePolicy::default());

    let first = converter.compute_region(REGION, SEASON, STATE).unwrap();
    assert_eq!(first.status, PartitionStatus::Finished);
    assert_eq!(first.written.len(), 181);
    assert!(matches!(
        probe(&fx.store_path(REGION), SEASON).unwrap(),
        StoreState::Complete(_)
    ));

    let calls_before = fx.source.calls().len();
    let zmetadata = fx.store_path(REGION).join(".zmetadata");
    let modified = std::fs::metadata(&zmetadata).unwrap().modified().unwrap();

    let second = converter.compute_region(REGION, SEASON, STATE).unwrap();
    assert_eq!(second.status, PartitionStatus::AlreadyComplete);
    assert!(second.written.is_empty());
    assert_eq!(fx.source.calls().len(), calls_before);
    assert_eq!(
        std::fs::metadata(&zmetadata).unwrap().modified().unwrap(),
        modified
    );
    assert_eq!(fx.open_store(REGION).times().len(), 181);
    assert_eq!(fx.open_store(REGION).last_day(), Some(SEASON.last_day()));
}

#[test]
fn test_later_extra_variables_are_dropped() {
    let fx = Fixture::new();
    fx.add(REGION, grid(1, &["t2m", "snod"]));
    fx.add(REGION, grid(2, &["snod", "gust", "t2m"]));

    let report = fx
        .converter(VariablePolicy::ErrorOnMissing)
        .compute_region(REGION, SEASON, STATE)
        .unwrap();
    assert_eq!(report.written, vec![day(1), day(2)]);

    let store = fx.open_store(REGION);
    assert_eq!(store.variables(), &["t2m", "snod"]);
    // day 2 seed is 1: t2m was the third input field, snod the first
    assert_eq!(store.read_cell(1, 0, 0).unwrap(), vec![120.0, 100.0]);
}

#[test]
fn test_missing_fixed_variable_follows_policy() {
    let fx = Fixture::new();
    fx.add(REGION, grid(1, &["t2m", "snod"]));
    fx.add(REGION, grid(2, &["t2m"]));
    fx.add(REGION, grid(3, &["t2m", "snod"]));

    let report = fx
        .converter(VariablePolicy::ErrorOnMissing)
        .compute_region(REGION, SEASON, STATE)
        .unwrap();
    assert!(matches!(report.status, PartitionStatus::Aborted(_)));
    assert_eq!(report.written, vec![day(1)]);

    let lenient = Fixture::new();
    lenient.add(REGION, grid(1, &["t2m", "snod"]));
    lenient.add(REGION, grid(2, &["t2m"]));
    let report = lenient
        .converter(VariablePolicy::DropExtra)
        .compute_region(REGION, SEASON, STATE)
        .unwrap();
    assert_eq!(report.written, vec![day(1), day(2)]);
    let cell = lenient.open_store(REGION).read_cell(1, 0, 0).unwrap();
    assert_eq!(cell[0], 100.0);
    assert!(cell[1].is_nan());
}

#[test]
fn test_invalid_day_aborts_rest_of_partition() {
    let fx = Fixture::new();
    fx.add(REGION, grid(1, &["t2m"]));
    fx.add(REGION, grid(2, &["t2m"]));
    // Day 3 is on a different grid, so the append is rejected
    fx.add(REGION, grid_on(day(3), &["t2m"], 3, 2));
    fx.add(REGION, grid(4, &["t2m"]));

    let report = fx
        .converter(VariablePolicy::default())
        .compute_region(REGION, SEASON, STATE)
        .unwrap();

    assert!(matches!(report.status, PartitionStatus::Aborted(_)));
    assert_eq!(report.written, vec![day(1), day(2)]);
    assert_eq!(fx.source.calls(), vec![day(1), day(2), day(3)]);
    assert_eq!(fx.open_store(REGION).times(), &[day(1), day(2)]);
}

#[test]
fn test_unreadable_input_is_a_gap() {
    let fx = Fixture::new();
    fx.add(REGION, grid(1, &["t2m"]));
    fx.break_day(REGION, day(2), Broken::Unreadable);
    fx.add(REGION, grid(3, &["t2m"]));

    let report = fx
        .converter(VariablePolicy::default())
        .compute_region(REGION, SEASON, STATE)
        .unwrap();

    assert_eq!(report.status, PartitionStatus::Finished);
    assert_eq!(report.written, vec![day(1), day(3)]);
    assert_eq!(report.missing_inputs[0], day(2));
    assert_eq!(report.missing_inputs.len(), 181 - 2);
    assert_eq!(fx.source.calls().len(), 181);
    assert_eq!(fx.open_store(REGION).times(), &[day(1), day(3)]);
}

#[test]
fn test_unrestructurable_input_aborts_partition() {
    let fx = Fixture::new();
    fx.add(REGION, grid(1, &["t2m"]));
    fx.break_day(REGION, day(2), Broken::Invalid);
    fx.add(REGION, grid(3, &["t2m"]));

    let report = fx
        .converter(VariablePolicy::default())
        .compute_region(REGION, SEASON, STATE)
        .unwrap();

    match &report.status {
        PartitionStatus::Aborted(message) => assert!(message.contains("time steps"), "{}", message),
        other => panic!("expected an aborted partition, got {:?}", other),
    }
    assert_eq!(report.written, vec![day(1)]);
    assert!(report.missing_inputs.is_empty());
    assert_eq!(fx.source.calls(), vec![day(1), day(2)]);
    assert_eq!(fx.open_store(REGION).times(), &[day(1)]);
}

#[test]
fn test_rerun_appends_only_new_days() {
    let fx = Fixture::new();
    fx.add(REGION, grid(1, &["t2m"]));
    fx.add(REGION, grid(3, &["t2m"]));
    let converter = fx.converter(VariablePolicy::default());
    converter.compute_region(REGION, SEASON, STATE).unwrap();

    fx.add(REGION, grid(2, &["t2m"]));
    fx.add(REGION, grid(4, &["t2m"]));
    fx.add(REGION, grid(5, &["t2m", "extra"]));

    match probe(&fx.store_path(REGION), SEASON).unwrap() {
        StoreState::Partial { missing, .. } => {
            assert_eq!(missing.len(), 181 - 2);
            assert_eq!(missing[0], day(2));
        }
        other => panic!("expected partial store, got {:?}", other),
    }

    let report = converter.compute_region(REGION, SEASON, STATE).unwrap();
    assert_eq!(report.status, PartitionStatus::Finished);
    assert_eq!(report.skipped_backfill, vec![day(2)]);
    assert_eq!(report.written, vec![day(4), day(5)]);

    let store = fx.open_store(REGION);
    assert_eq!(store.times(), &[day(1), day(3), day(4), day(5)]);
    assert!(store.times().windows(2).all(|w| w[0] < w[1]));
    assert_eq!(store.variables(), &["t2m"]);
}

#[test]
fn test_converter_creates_output_base() {
    let fx = Fixture::new();
    let _converter = fx.converter(VariablePolicy::default());
    assert!(fx.root.join("4.GFSFiltered1xInterpolationZarr").is_dir());
    assert!(matches!(
        probe(&fx.store_path(REGION), SEASON).unwrap(),
        StoreState::Absent
    ));
}

#[tokio::test]
async fn test_convert_local_runs_every_partition() {
    let fx = Fixture::new();
    let regions = ["North", "South", "East"];
    for region in regions {
        fx.add(region, grid(1, &["t2m"]));
        fx.add(region, grid(2, &["t2m"]));
    }

    let partitions: Vec<PartitionKey> = regions
        .iter()
        .map(|r| PartitionKey::new(*r, SEASON, STATE))
        .collect();
    let converter = Arc::new(fx.converter(VariablePolicy::default()));
    let summary = convert_local(converter, partitions, 2).await;

    assert_eq!(summary.finished, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.days_written, 6);
    assert_eq!(summary.missing_inputs, 3 * 179);
    for region in regions {
        assert_eq!(fx.open_store(region).times(), &[day(1), day(2)]);
    }
}
