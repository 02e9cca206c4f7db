use crate::error::SourceError;
use crate::grid::DayGrid;
use chrono::NaiveDate;
use std::path::Path;
use std::sync::Arc;

/// Loads one day's input file and restructures it onto a single grid.
///
/// Implementations return `Ok(None)` when the file does not exist, so the
/// caller can leave a gap for that day and move on.
pub trait DaySource: Send + Sync {
    fn load_day(&self, path: &Path, date: NaiveDate) -> Result<Option<DayGrid>, SourceError>;
}

impl<T: DaySource + ?Sized> DaySource for Arc<T> {
    fn load_day(&self, path: &Path, date: NaiveDate) -> Result<Option<DayGrid>, SourceError> {
        (**self).load_day(path, date)
    }
}

#[cfg(feature = "netcdf")]
pub use self::nc::NetCdfSource;

#[cfg(feature = "netcdf")]
mod nc {
    use super::DaySource;
    use crate::error::SourceError;
    use crate::grid::{DayGrid, Field};
    use chrono::NaiveDate;
    use std::path::Path;

    const LAT_NAMES: [&str; 2] = ["latitude", "lat"];
    const LON_NAMES: [&str; 2] = ["longitude", "lon"];

    /// Reads the filtered GFS NetCDF files, one per region per day
    #[derive(Debug, Default, Clone)]
    pub struct NetCdfSource;

    impl NetCdfSource {
        pub fn new() -> Self {
            Self
        }
    }

    impl DaySource for NetCdfSource {
        fn load_day(&self, path: &Path, date: NaiveDate) -> Result<Option<DayGrid>, SourceError> {
            if !path.is_file() {
                return Ok(None);
            }

            let unreadable = |e: netcdf::Error| SourceError::Unreadable {
                path: path.to_path_buf(),
                message: e.to_string(),
            };
            let invalid = |message: String| SourceError::Invalid {
                path: path.to_path_buf(),
                message,
            };

            let file = netcdf::open(path).map_err(unreadable)?;

            let (lat_name, latitude) = read_coord(&file, &LAT_NAMES)
                .map_err(unreadable)?
                .ok_or_else(|| invalid("no latitude coordinate".to_string()))?;
            let (lon_name, longitude) = read_coord(&file, &LON_NAMES)
                .map_err(unreadable)?
                .ok_or_else(|| invalid("no longitude coordinate".to_string()))?;

            let mut fields = Vec::new();
            for var in file.variables() {
                let name = var.name();
                if name == lat_name || name == lon_name {
                    continue;
                }

                let dims = var.dimensions();
                let n = dims.len();
                if n < 2 || dims[n - 2].name() != lat_name || dims[n - 1].name() != lon_name {
                    log::debug!("{}: skipping '{}', not on the lat/lon grid", path.display(), name);
                    continue;
                }
                let leading: usize = dims[..n - 2].iter().map(|d| d.len()).product();
                if leading != 1 {
                    return Err(invalid(format!(
                        "variable '{}' holds {} time steps, expected one",
                        name, leading
                    )));
                }

                let raw: Vec<f32> = var.get_values::<f32, _>(..).map_err(unreadable)?;
                let scale = attribute_f64(&var, "scale_factor").unwrap_or(1.0);
                let offset = attribute_f64(&var, "add_offset").unwrap_or(0.0);
                let fill = attribute_f64(&var, "_FillValue").or_else(|| attribute_f64(&var, "missing_value"));

                let values = raw
                    .into_iter()
                    .map(|v| match fill {
                        Some(f) if (v as f64 - f).abs() < f64::EPSILON * f.abs().max(1.0) => f32::NAN,
                        _ => (v as f64 * scale + offset) as f32,
                    })
                    .collect();
                fields.push(Field::new(name, values));
            }

            DayGrid::new(date, latitude, longitude, fields)
                .map(Some)
                .map_err(|e| invalid(e.to_string()))
        }
    }

    fn read_coord(
        file: &netcdf::File,
        names: &[&str],
    ) -> Result<Option<(String, Vec<f64>)>, netcdf::Error> {
        for name in names {
            if let Some(var) = file.variable(name) {
                let data: Vec<f64> = var.get_values(..)?;
                return Ok(Some((name.to_string(), data)));
            }
        }
        Ok(None)
    }

    fn attribute_f64(var: &netcdf::Variable, name: &str) -> Option<f64> {
        var.attribute_value(name)
            .and_then(|r| r.ok())
            .and_then(|v| match v {
                netcdf::AttributeValue::Double(d) => Some(d),
                netcdf::AttributeValue::Float(f) => Some(f as f64),
                netcdf::AttributeValue::Short(s) => Some(s as f64),
                netcdf::AttributeValue::Int(i) => Some(i as f64),
                _ => None,
            })
    }
}
