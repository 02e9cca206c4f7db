use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Represents an attribute in Zarr metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Array(Vec<AttributeValue>),
    Object(BTreeMap<String, AttributeValue>),
    Null,
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

pub type Attributes = BTreeMap<String, AttributeValue>;

/// Key under which xarray records an array's dimension names
pub const ARRAY_DIMENSIONS: &str = "_ARRAY_DIMENSIONS";

/// Raw Zarr array metadata from .zarray file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZArrayMetadata {
    pub zarr_format: u8,
    pub shape: Vec<u64>,
    pub chunks: Vec<u64>,
    pub dtype: String,
    pub compressor: Option<serde_json::Value>,
    pub fill_value: Option<serde_json::Value>,
    pub order: String,
    pub filters: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_separator: Option<String>,
}

impl ZArrayMetadata {
    /// Uncompressed C-order array, the only layout this crate writes
    pub fn plain(shape: Vec<u64>, chunks: Vec<u64>, dtype: &str, fill_value: serde_json::Value) -> Self {
        Self {
            zarr_format: 2,
            shape,
            chunks,
            dtype: dtype.to_string(),
            compressor: None,
            fill_value: Some(fill_value),
            order: "C".to_string(),
            filters: None,
            dimension_separator: Some(".".to_string()),
        }
    }

    pub fn separator(&self) -> &str {
        self.dimension_separator.as_deref().unwrap_or(".")
    }

    /// Number of chunks along each dimension
    pub fn chunk_grid(&self) -> Vec<u64> {
        self.shape
            .iter()
            .zip(&self.chunks)
            .map(|(&s, &c)| if c == 0 { 0 } else { s.div_ceil(c) })
            .collect()
    }

    /// Store key of a chunk relative to the array directory
    pub fn chunk_key(&self, index: &[u64]) -> String {
        index
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(self.separator())
    }
}

/// Raw Zarr group metadata from .zgroup file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZGroupMetadata {
    pub zarr_format: u8,
}

impl Default for ZGroupMetadata {
    fn default() -> Self {
        Self { zarr_format: 2 }
    }
}

/// Consolidated metadata from .zmetadata file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedMetadata {
    pub zarr_consolidated_format: u8,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// An array of the store together with its attributes
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayEntry {
    pub zarray: ZArrayMetadata,
    pub attributes: Attributes,
}

impl ArrayEntry {
    pub fn new(zarray: ZArrayMetadata, dims: &[&str]) -> Self {
        let mut attributes = Attributes::new();
        attributes.insert(
            ARRAY_DIMENSIONS.to_string(),
            AttributeValue::Array(dims.iter().map(|d| AttributeValue::from(*d)).collect()),
        );
        Self { zarray, attributes }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Dimension names from _ARRAY_DIMENSIONS, or `dim_<i>` defaults
    pub fn dimension_names(&self) -> Vec<String> {
        if let Some(AttributeValue::Array(dims)) = self.attributes.get(ARRAY_DIMENSIONS) {
            dims.iter()
                .filter_map(|val| match val {
                    AttributeValue::String(s) => Some(s.clone()),
                    _ => None,
                })
                .collect()
        } else {
            (0..self.zarray.shape.len())
                .map(|i| format!("dim_{}", i))
                .collect()
        }
    }
}

/// Root metadata of a Zarr store: global attributes plus every array by path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreMetadata {
    pub global_attributes: Attributes,
    pub arrays: BTreeMap<String, ArrayEntry>,
}

impl StoreMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn array(&self, path: &str) -> Option<&ArrayEntry> {
        self.arrays.get(path)
    }

    pub fn array_mut(&mut self, path: &str) -> Option<&mut ArrayEntry> {
        self.arrays.get_mut(path)
    }

    /// Parse consolidated metadata into a StoreMetadata structure
    pub fn from_consolidated(consolidated: ConsolidatedMetadata) -> Result<Self, serde_json::Error> {
        let mut metadata = StoreMetadata::new();
        let metadata_map = &consolidated.metadata;

        for (key, value) in metadata_map {
            if key == ".zattrs" {
                metadata.global_attributes = serde_json::from_value(value.clone())?;
            } else if let Some(path) = key.strip_suffix("/.zarray") {
                let zarray: ZArrayMetadata = serde_json::from_value(value.clone())?;

                // Look for corresponding .zattrs
                let attrs_key = format!("{}/.zattrs", path);
                let attributes = match metadata_map.get(&attrs_key) {
                    Some(v) => serde_json::from_value(v.clone())?,
                    None => Attributes::new(),
                };

                metadata
                    .arrays
                    .insert(path.to_string(), ArrayEntry { zarray, attributes });
            }
        }

        Ok(metadata)
    }

    /// Build the .zmetadata document for the whole store
    pub fn to_consolidated(&self) -> Result<ConsolidatedMetadata, serde_json::Error> {
        let mut metadata = BTreeMap::new();
        metadata.insert(
            ".zgroup".to_string(),
            serde_json::to_value(ZGroupMetadata::default())?,
        );
        metadata.insert(
            ".zattrs".to_string(),
            serde_json::to_value(&self.global_attributes)?,
        );
        for (path, entry) in &self.arrays {
            metadata.insert(format!("{}/.zarray", path), serde_json::to_value(&entry.zarray)?);
            metadata.insert(
                format!("{}/.zattrs", path),
                serde_json::to_value(&entry.attributes)?,
            );
        }

        Ok(ConsolidatedMetadata {
            zarr_consolidated_format: 1,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zarr_array_metadata_parsing() {
        let json_data = r#"{
            "zarr_format": 2,
            "shape": [100, 200],
            "chunks": [10, 20],
            "dtype": "<f8",
            "compressor": {"id": "zstd", "level": 3},
            "fill_value": null,
            "order": "C",
            "filters": [{"id": "shuffle"}]
        }"#;

        let metadata: ZArrayMetadata = serde_json::from_str(json_data).unwrap();
        assert_eq!(metadata.zarr_format, 2);
        assert_eq!(metadata.shape, vec![100, 200]);
        assert_eq!(metadata.chunks, vec![10, 20]);
        assert_eq!(metadata.dtype, "<f8");
        assert_eq!(metadata.separator(), ".");
        assert!(metadata.compressor.is_some());
        assert!(metadata.filters.is_some());
    }

    #[test]
    fn test_chunk_grid_and_keys() {
        let zarray = ZArrayMetadata::plain(
            vec![4, 3, 10, 7],
            vec![4, 1, 1, 1],
            "<f4",
            serde_json::json!("NaN"),
        );
        assert_eq!(zarray.chunk_grid(), vec![1, 3, 10, 7]);
        assert_eq!(zarray.chunk_key(&[0, 2, 9, 6]), "0.2.9.6");

        let mut slashed = zarray.clone();
        slashed.dimension_separator = Some("/".to_string());
        assert_eq!(slashed.chunk_key(&[0, 1]), "0/1");
    }

    #[test]
    fn test_dimension_names() {
        let entry = ArrayEntry::new(
            ZArrayMetadata::plain(vec![5, 2], vec![1, 2], "<f8", serde_json::Value::Null),
            &["time", "latitude"],
        );
        assert_eq!(entry.dimension_names(), vec!["time", "latitude"]);

        let bare = ArrayEntry {
            zarray: entry.zarray.clone(),
            attributes: Attributes::new(),
        };
        assert_eq!(bare.dimension_names(), vec!["dim_0", "dim_1"]);
    }

    #[test]
    fn test_consolidated_round_trip_keeps_attributes() {
        let mut metadata = StoreMetadata::new();
        metadata
            .global_attributes
            .insert("region".to_string(), AttributeValue::from("Steamboat"));
        metadata.arrays.insert(
            "time".to_string(),
            ArrayEntry::new(
                ZArrayMetadata::plain(vec![3], vec![1], "<i8", serde_json::json!(0)),
                &["time"],
            )
            .with_attribute("units", "days since 1970-01-01"),
        );

        let consolidated = metadata.to_consolidated().unwrap();
        assert!(consolidated.metadata.contains_key(".zgroup"));
        assert!(consolidated.metadata.contains_key("time/.zarray"));
        assert!(consolidated.metadata.contains_key("time/.zattrs"));

        let text = serde_json::to_string(&consolidated).unwrap();
        let parsed: ConsolidatedMetadata = serde_json::from_str(&text).unwrap();
        let reparsed = StoreMetadata::from_consolidated(parsed).unwrap();
        assert_eq!(reparsed, metadata);
    }

    #[test]
    fn test_attribute_integer_before_float() {
        let v: AttributeValue = serde_json::from_str("3").unwrap();
        assert_eq!(v, AttributeValue::Integer(3));
        let v: AttributeValue = serde_json::from_str("3.5").unwrap();
        assert_eq!(v, AttributeValue::Number(3.5));
    }
}
