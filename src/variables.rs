use crate::error::{ConvertError, Result};
use crate::grid::{DayGrid, Field};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// What to do when a later day's fields differ from the partition's fixed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum VariablePolicy {
    /// Drop extra fields, fill absent ones with NaN
    DropExtra,
    /// Drop extra fields, reject days lacking a fixed field
    #[default]
    ErrorOnMissing,
    /// Reject any day whose fields differ from the fixed set
    RequireExact,
}

impl fmt::Display for VariablePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VariablePolicy::DropExtra => "drop-extra",
            VariablePolicy::ErrorOnMissing => "error-on-missing",
            VariablePolicy::RequireExact => "require-exact",
        };
        f.write_str(s)
    }
}

/// Field names locked in by a partition's first write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedVariables {
    names: Vec<String>,
}

impl FixedVariables {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn from_grid(grid: &DayGrid) -> Self {
        Self::new(grid.variable_names())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Restrict and reorder `grid` to the fixed names according to `policy`
    pub fn conform(&self, grid: DayGrid, policy: VariablePolicy) -> Result<DayGrid> {
        let fixed: HashSet<&str> = self.names.iter().map(String::as_str).collect();
        let extra: Vec<&str> = grid
            .fields()
            .iter()
            .map(|f| f.name.as_str())
            .filter(|name| !fixed.contains(name))
            .collect();
        let missing: Vec<&str> = self
            .names
            .iter()
            .map(String::as_str)
            .filter(|name| grid.field(name).is_none())
            .collect();

        match policy {
            VariablePolicy::RequireExact if !extra.is_empty() || !missing.is_empty() => {
                return Err(ConvertError::invalid(format!(
                    "variables for {} differ from the fixed set (extra: [{}], missing: [{}])",
                    grid.date(),
                    extra.join(", "),
                    missing.join(", ")
                )));
            }
            VariablePolicy::ErrorOnMissing if !missing.is_empty() => {
                return Err(ConvertError::invalid(format!(
                    "variables for {} lack fixed fields: [{}]",
                    grid.date(),
                    missing.join(", ")
                )));
            }
            _ => {}
        }

        if !extra.is_empty() {
            log::debug!("{}: dropping extra variables [{}]", grid.date(), extra.join(", "));
        }
        if !missing.is_empty() {
            log::warn!(
                "{}: filling absent variables with NaN [{}]",
                grid.date(),
                missing.join(", ")
            );
        }

        let cells = grid.latitude().len() * grid.longitude().len();
        let fields = self
            .names
            .iter()
            .map(|name| match grid.field(name) {
                Some(field) => field.clone(),
                None => Field::new(name.clone(), vec![f32::NAN; cells]),
            })
            .collect();

        grid.with_fields(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn grid(names: &[&str]) -> DayGrid {
        let fields = names
            .iter()
            .enumerate()
            .map(|(i, n)| Field::new(*n, vec![i as f32; 2]))
            .collect();
        DayGrid::new(
            NaiveDate::from_ymd_opt(2017, 1, 5).unwrap(),
            vec![39.0],
            vec![-106.0, -105.5],
            fields,
        )
        .unwrap()
    }

    fn fixed(names: &[&str]) -> FixedVariables {
        FixedVariables::new(names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_from_grid_records_order() {
        let f = FixedVariables::from_grid(&grid(&["b", "a", "c"]));
        assert_eq!(f.names(), &["b", "a", "c"]);
    }

    #[test]
    fn test_extra_fields_are_dropped_and_reordered() {
        let out = fixed(&["a", "b"])
            .conform(grid(&["b", "extra", "a"]), VariablePolicy::ErrorOnMissing)
            .unwrap();
        assert_eq!(out.variable_names(), vec!["a", "b"]);
        // "a" was the third field in the input
        assert_eq!(out.field("a").unwrap().values, vec![2.0, 2.0]);
    }

    #[test]
    fn test_missing_field_errors_by_default() {
        let err = fixed(&["a", "b"])
            .conform(grid(&["a"]), VariablePolicy::default())
            .unwrap_err();
        assert!(err.is_data_validity());
        assert!(err.to_string().contains("b"));
    }

    #[test]
    fn test_drop_extra_fills_missing_with_nan() {
        let out = fixed(&["a", "b"])
            .conform(grid(&["a", "z"]), VariablePolicy::DropExtra)
            .unwrap();
        assert_eq!(out.variable_names(), vec!["a", "b"]);
        assert!(out.field("b").unwrap().values.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_require_exact_rejects_extra() {
        let err = fixed(&["a"])
            .conform(grid(&["a", "b"]), VariablePolicy::RequireExact)
            .unwrap_err();
        assert!(err.to_string().contains("extra: [b]"));

        let ok = fixed(&["a", "b"])
            .conform(grid(&["b", "a"]), VariablePolicy::RequireExact)
            .unwrap();
        assert_eq!(ok.variable_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_policy_serde_names() {
        let p: VariablePolicy = serde_json::from_str("\"drop-extra\"").unwrap();
        assert_eq!(p, VariablePolicy::DropExtra);
        assert_eq!(VariablePolicy::RequireExact.to_string(), "require-exact");
    }
}
