//! Incremental conversion of one partition's daily inputs into its Zarr store.

use crate::error::{ConvertError, Result};
use crate::grid::DayGrid;
use crate::metadata::{AttributeValue, Attributes};
use crate::partition::PartitionKey;
use crate::paths::PathResolver;
use crate::season::Season;
use crate::source::DaySource;
use crate::store::ZarrStore;
use crate::variables::{FixedVariables, VariablePolicy};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// What the prober found at a partition's store path
#[derive(Debug)]
pub enum StoreState {
    /// Nothing written yet; every expected day is work
    Absent,
    /// Last recorded day is the season's last day
    Complete(ZarrStore),
    /// Store exists but lacks `missing` days
    Partial {
        store: ZarrStore,
        missing: Vec<NaiveDate>,
    },
}

/// Classify the store at `path` against the season's expected days
pub fn probe(path: &Path, season: Season) -> Result<StoreState> {
    let Some(store) = ZarrStore::open(path)? else {
        return Ok(StoreState::Absent);
    };

    if store.last_day() == Some(season.last_day()) {
        return Ok(StoreState::Complete(store));
    }

    let present: HashSet<NaiveDate> = store.times().iter().copied().collect();
    let missing = season
        .expected_days()
        .into_iter()
        .filter(|d| !present.contains(d))
        .collect();
    Ok(StoreState::Partial { store, missing })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionStatus {
    /// The store was already complete; nothing was written
    AlreadyComplete,
    /// Every day of the work set was attempted
    Finished,
    /// A data-validity error stopped the partition
    Aborted(String),
}

/// Outcome of one `compute_region` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionReport {
    pub key: PartitionKey,
    pub status: PartitionStatus,
    /// Days written, in the order they were written
    pub written: Vec<NaiveDate>,
    /// Days whose input file was absent or unreadable
    pub missing_inputs: Vec<NaiveDate>,
    /// Days before the store's last recorded day, which append-only writes cannot fill
    pub skipped_backfill: Vec<NaiveDate>,
}

impl PartitionReport {
    fn new(key: &PartitionKey) -> Self {
        Self {
            key: key.clone(),
            status: PartitionStatus::Finished,
            written: Vec::new(),
            missing_inputs: Vec::new(),
            skipped_backfill: Vec::new(),
        }
    }
}

/// Converts partitions from the filtered NetCDF tree into Zarr stores
pub struct Converter {
    resolver: PathResolver,
    source: Box<dyn DaySource>,
    policy: VariablePolicy,
}

impl Converter {
    /// Build a converter, creating the output base directory if needed
    pub fn new(
        data_root: impl AsRef<Path>,
        interpolate: u32,
        source: Box<dyn DaySource>,
        policy: VariablePolicy,
    ) -> Result<Self> {
        let resolver = PathResolver::new(data_root, interpolate);
        let base = resolver.zarr_base_path();
        fs::create_dir_all(base).map_err(|e| ConvertError::io(base, e))?;

        Ok(Self {
            resolver,
            source,
            policy,
        })
    }

    /// Single-partition entry point for the parallel runner
    pub fn process_partition(&self, key: &PartitionKey) -> Result<PartitionReport> {
        self.compute_region(&key.region, key.season, &key.state)
    }

    /// Append every missing day of (region, season, state) to its store, in ascending order.
    ///
    /// Missing input files leave gaps. A data-validity error stops the partition and is
    /// reported through [`PartitionStatus::Aborted`]; any other error is returned.
    pub fn compute_region(&self, region: &str, season: Season, state: &str) -> Result<PartitionReport> {
        let key = PartitionKey::new(region, season, state);
        let mut report = PartitionReport::new(&key);
        let store_path = self.resolver.store_path(season, state, region);

        let (store, work) = match probe(&store_path, season)? {
            StoreState::Absent => (None, season.expected_days()),
            StoreState::Complete(_) => {
                log::info!("already exists: {}", key);
                report.status = PartitionStatus::AlreadyComplete;
                return Ok(report);
            }
            StoreState::Partial { store, missing } => {
                log::info!("some exist but have to complete {}: {}", missing.len(), key);
                (Some(store), missing)
            }
        };

        // Resuming: the store's own variable coordinate is the fixed set
        let mut target: Option<(ZarrStore, FixedVariables)> = store.map(|s| {
            let vars = FixedVariables::new(s.variables().to_vec());
            (s, vars)
        });

        for day in work {
            if let Some(last) = target.as_ref().and_then(|(s, _)| s.last_day()) {
                if day <= last {
                    log::warn!("{}: cannot backfill {} before {}, skipping", key, day, last);
                    report.skipped_backfill.push(day);
                    continue;
                }
            }

            let path = self.resolver.input_path(season, region, day);
            log::debug!("On {}", path.display());

            let grid = match self.source.load_day(&path, day) {
                Ok(Some(grid)) => grid,
                Ok(None) => {
                    log::info!(" missing file: {}", path.display());
                    report.missing_inputs.push(day);
                    continue;
                }
                Err(e) => {
                    let e = ConvertError::from(e);
                    if e.is_data_validity() {
                        return Ok(self.abort(report, &store_path, e));
                    }
                    log::warn!(" unreadable file, skipping: {}", e);
                    report.missing_inputs.push(day);
                    continue;
                }
            };

            let result = match target.as_mut() {
                Some((existing, vars)) => self.append_day(existing, vars, grid),
                None => {
                    let vars = FixedVariables::from_grid(&grid);
                    let attrs = store_attributes(&key, &vars);
                    match ZarrStore::create(&store_path, &grid, attrs) {
                        Ok(created) => {
                            log::info!(
                                "created {} with {} variables on a {}x{} grid",
                                store_path.display(),
                                created.variables().len(),
                                created.latitude().len(),
                                created.longitude().len()
                            );
                            target = Some((created, vars));
                            Ok(())
                        }
                        Err(e) => Err(e),
                    }
                }
            };

            match result {
                Ok(()) => report.written.push(day),
                Err(e) if e.is_data_validity() => return Ok(self.abort(report, &store_path, e)),
                Err(e) => return Err(e),
            }
        }

        log::info!(
            "finished {}: {} written, {} missing inputs",
            key,
            report.written.len(),
            report.missing_inputs.len()
        );
        Ok(report)
    }

    fn append_day(&self, store: &mut ZarrStore, vars: &FixedVariables, grid: DayGrid) -> Result<()> {
        let grid = vars.conform(grid, self.policy)?;
        store.append(&grid)
    }

    fn abort(&self, mut report: PartitionReport, store_path: &Path, err: ConvertError) -> PartitionReport {
        log::error!("Value Error {} on {}", err, store_path.display());
        report.status = PartitionStatus::Aborted(err.to_string());
        report
    }
}

fn store_attributes(key: &PartitionKey, vars: &FixedVariables) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("region".to_string(), AttributeValue::from(key.region.as_str()));
    attrs.insert("season".to_string(), AttributeValue::from(key.season.label()));
    attrs.insert("state".to_string(), AttributeValue::from(key.state.as_str()));
    attrs.insert(
        "fixed_variables".to_string(),
        AttributeValue::Array(vars.names().iter().map(|n| AttributeValue::from(n.as_str())).collect()),
    );
    attrs
}
