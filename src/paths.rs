use crate::season::Season;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Maps (season, state, region, day) onto the input files and output stores under a data root
#[derive(Debug, Clone)]
pub struct PathResolver {
    processed_path: PathBuf,
    zarr_base_path: PathBuf,
}

impl PathResolver {
    pub fn new(data_root: impl AsRef<Path>, interpolate: u32) -> Self {
        let data_root = data_root.as_ref();
        Self {
            processed_path: data_root.join(format!("3.GFSFiltered{}xInterpolation", interpolate)),
            zarr_base_path: data_root.join(format!("4.GFSFiltered{}xInterpolationZarr", interpolate)),
        }
    }

    /// Directory holding the filtered NetCDF inputs
    pub fn processed_path(&self) -> &Path {
        &self.processed_path
    }

    /// Directory under which every partition's store lives
    pub fn zarr_base_path(&self) -> &Path {
        &self.zarr_base_path
    }

    /// `<processed>/<season>/Region_<region>_<YYYYMMDD>.nc`
    pub fn input_path(&self, season: Season, region: &str, date: NaiveDate) -> PathBuf {
        self.processed_path.join(season.label()).join(format!(
            "Region_{}_{}.nc",
            region,
            date.format("%Y%m%d")
        ))
    }

    /// `<zarr_base>/<season>/<state>/Region_<region>.zarr`
    pub fn store_path(&self, season: Season, state: &str, region: &str) -> PathBuf {
        self.zarr_base_path
            .join(season.label())
            .join(state)
            .join(format!("Region_{}.zarr", region))
    }
}
