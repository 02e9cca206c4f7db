use crate::error::{ConvertError, Result};
use chrono::NaiveDate;
use std::collections::HashSet;

/// A single named field on the day's latitude/longitude grid, row-major `[lat][lon]`
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub values: Vec<f32>,
}

impl Field {
    pub fn new(name: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// One day of one region, restructured so every field shares the same grid
#[derive(Debug, Clone)]
pub struct DayGrid {
    date: NaiveDate,
    latitude: Vec<f64>,
    longitude: Vec<f64>,
    fields: Vec<Field>,
}

impl DayGrid {
    pub fn new(
        date: NaiveDate,
        latitude: Vec<f64>,
        longitude: Vec<f64>,
        fields: Vec<Field>,
    ) -> Result<Self> {
        if latitude.is_empty() || longitude.is_empty() {
            return Err(ConvertError::invalid(format!(
                "grid for {} has an empty axis ({} latitudes, {} longitudes)",
                date,
                latitude.len(),
                longitude.len()
            )));
        }
        if fields.is_empty() {
            return Err(ConvertError::invalid(format!("grid for {} has no fields", date)));
        }

        let cells = latitude.len() * longitude.len();
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(ConvertError::invalid(format!(
                    "field '{}' appears twice in grid for {}",
                    field.name, date
                )));
            }
            if field.values.len() != cells {
                return Err(ConvertError::invalid(format!(
                    "field '{}' has {} values, expected {} ({} x {})",
                    field.name,
                    field.values.len(),
                    cells,
                    latitude.len(),
                    longitude.len()
                )));
            }
        }

        Ok(Self {
            date,
            latitude,
            longitude,
            fields,
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn latitude(&self) -> &[f64] {
        &self.latitude
    }

    pub fn longitude(&self) -> &[f64] {
        &self.longitude
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.latitude.len(), self.longitude.len())
    }

    /// Values of every field at one cell, in field order
    pub fn cell(&self, lat: usize, lon: usize) -> impl Iterator<Item = f32> + '_ {
        let idx = lat * self.longitude.len() + lon;
        self.fields.iter().map(move |f| f.values[idx])
    }

    /// Replace the field list, keeping date and axes
    pub(crate) fn with_fields(self, fields: Vec<Field>) -> Result<Self> {
        Self::new(self.date, self.latitude, self.longitude, fields)
    }
}
