use crate::error::{ConvertError, Result};
use crate::grid::DayGrid;
use crate::metadata::*;
use byteorder::{ByteOrder, LittleEndian, NativeEndian};
use chrono::{Days, NaiveDate};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Array holding every field, dims (variable, time, latitude, longitude)
pub const DATA_ARRAY: &str = "vars";
pub const VARIABLE_DIM: &str = "variable";
pub const TIME_DIM: &str = "time";
pub const LAT_DIM: &str = "latitude";
pub const LON_DIM: &str = "longitude";

const TIME_UNITS: &str = "days since 1970-01-01";
const TIME_CALENDAR: &str = "proleptic_gregorian";
const COORD_TOLERANCE: f64 = 1e-6;

fn unix_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid epoch")
}

/// A per-partition Zarr v2 store laid out as `vars(variable, time, latitude, longitude)`
/// with one chunk per (time, latitude, longitude) cell.
#[derive(Debug)]
pub struct ZarrStore {
    path: PathBuf,
    metadata: StoreMetadata,
    variables: Vec<String>,
    latitude: Vec<f64>,
    longitude: Vec<f64>,
    times: Vec<NaiveDate>,
}

impl ZarrStore {
    /// True once a first write has left group metadata at `path`
    pub fn exists<P: AsRef<Path>>(path: P) -> bool {
        let path = path.as_ref();
        path.join(".zmetadata").is_file() || path.join(".zgroup").is_file()
    }

    /// Open an existing store. Returns `Ok(None)` when nothing has been written at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        if !Self::exists(&path) {
            return Ok(None);
        }

        let metadata = Self::load_metadata(&path)?;
        let mut store = Self {
            path,
            metadata,
            variables: Vec::new(),
            latitude: Vec::new(),
            longitude: Vec::new(),
            times: Vec::new(),
        };
        store.check_layout()?;

        store.variables = store.read_string_array(VARIABLE_DIM)?;
        store.latitude = store.read_f64_array(LAT_DIM)?;
        store.longitude = store.read_f64_array(LON_DIM)?;
        store.check_extents()?;
        store.times = store.read_time_axis()?;

        Ok(Some(store))
    }

    /// Create a new store whose first time step is `grid`
    pub fn create<P: AsRef<Path>>(path: P, grid: &DayGrid, attributes: Attributes) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if Self::exists(&path) {
            return Err(ConvertError::invalid(format!(
                "store '{}' already exists",
                path.display()
            )));
        }
        fs::create_dir_all(&path).map_err(|e| ConvertError::io(&path, e))?;

        let variables = grid.variable_names();
        let (nlat, nlon) = grid.shape();
        let nvar = variables.len() as u64;
        let name_len = variables
            .iter()
            .map(|v| v.chars().count())
            .max()
            .unwrap_or(1)
            .max(1);

        let mut metadata = StoreMetadata::new();
        metadata.global_attributes = attributes;
        metadata.arrays.insert(
            DATA_ARRAY.to_string(),
            ArrayEntry::new(
                ZArrayMetadata::plain(
                    vec![nvar, 0, nlat as u64, nlon as u64],
                    vec![nvar, 1, 1, 1],
                    "<f4",
                    serde_json::json!("NaN"),
                ),
                &[VARIABLE_DIM, TIME_DIM, LAT_DIM, LON_DIM],
            ),
        );
        metadata.arrays.insert(
            VARIABLE_DIM.to_string(),
            ArrayEntry::new(
                ZArrayMetadata::plain(
                    vec![nvar],
                    vec![nvar],
                    &format!("<U{}", name_len),
                    serde_json::Value::Null,
                ),
                &[VARIABLE_DIM],
            ),
        );
        metadata.arrays.insert(
            TIME_DIM.to_string(),
            ArrayEntry::new(
                ZArrayMetadata::plain(vec![0], vec![1], "<i8", serde_json::Value::Null),
                &[TIME_DIM],
            )
            .with_attribute("units", TIME_UNITS)
            .with_attribute("calendar", TIME_CALENDAR)
            .with_attribute("standard_name", "time"),
        );
        for (name, axis) in [(LAT_DIM, grid.latitude()), (LON_DIM, grid.longitude())] {
            let len = axis.len() as u64;
            metadata.arrays.insert(
                name.to_string(),
                ArrayEntry::new(
                    ZArrayMetadata::plain(vec![len], vec![len], "<f8", serde_json::json!("NaN")),
                    &[name],
                )
                .with_attribute("standard_name", name),
            );
        }

        let mut store = Self {
            path,
            metadata,
            variables,
            latitude: grid.latitude().to_vec(),
            longitude: grid.longitude().to_vec(),
            times: Vec::new(),
        };

        store.write_chunk(VARIABLE_DIM, "0", &encode_utf32(&store.variables, name_len))?;
        store.write_chunk(LAT_DIM, "0", &encode_f64(&store.latitude))?;
        store.write_chunk(LON_DIM, "0", &encode_f64(&store.longitude))?;
        store.write_day(grid)?;

        Ok(store)
    }

    /// Append `grid` as the next time step. The grid must already carry the store's variables in order.
    pub fn append(&mut self, grid: &DayGrid) -> Result<()> {
        if grid.shape() != (self.latitude.len(), self.longitude.len()) {
            return Err(ConvertError::invalid(format!(
                "grid for {} is {}x{}, store '{}' is {}x{}",
                grid.date(),
                grid.shape().0,
                grid.shape().1,
                self.path.display(),
                self.latitude.len(),
                self.longitude.len()
            )));
        }
        if !axes_match(grid.latitude(), &self.latitude)
            || !axes_match(grid.longitude(), &self.longitude)
        {
            return Err(ConvertError::invalid(format!(
                "grid coordinates for {} differ from store '{}'",
                grid.date(),
                self.path.display()
            )));
        }
        if grid.variable_names() != self.variables {
            return Err(ConvertError::invalid(format!(
                "variables for {} [{}] do not match store variables [{}]",
                grid.date(),
                grid.variable_names().join(", "),
                self.variables.join(", ")
            )));
        }
        if let Some(last) = self.last_day() {
            if grid.date() <= last {
                return Err(ConvertError::invalid(format!(
                    "cannot append {} to store '{}' ending {}",
                    grid.date(),
                    self.path.display(),
                    last
                )));
            }
        }

        self.write_day(grid)
    }

    pub fn metadata(&self) -> &StoreMetadata {
        &self.metadata
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn latitude(&self) -> &[f64] {
        &self.latitude
    }

    pub fn longitude(&self) -> &[f64] {
        &self.longitude
    }

    /// Recorded days, ascending
    pub fn times(&self) -> &[NaiveDate] {
        &self.times
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        self.times.last().copied()
    }

    /// All variables at one (time, latitude, longitude) cell
    pub fn read_cell(&self, time: usize, lat: usize, lon: usize) -> Result<Vec<f32>> {
        if time >= self.times.len() || lat >= self.latitude.len() || lon >= self.longitude.len() {
            return Err(ConvertError::invalid(format!(
                "cell ({}, {}, {}) is outside store '{}'",
                time,
                lat,
                lon,
                self.path.display()
            )));
        }

        let entry = self.array_entry(DATA_ARRAY)?;
        let key = entry
            .zarray
            .chunk_key(&[0, time as u64, lat as u64, lon as u64]);
        let nvar = self.variables.len();
        match self.read_chunk(DATA_ARRAY, &key)? {
            Some(bytes) if bytes.len() == nvar * 4 => {
                let mut values = vec![0f32; nvar];
                LittleEndian::read_f32_into(&bytes, &mut values);
                Ok(values)
            }
            Some(bytes) => Err(self.corrupt(format!(
                "chunk {}/{} holds {} bytes, expected {}",
                DATA_ARRAY,
                key,
                bytes.len(),
                nvar * 4
            ))),
            None => Ok(vec![f32::NAN; nvar]),
        }
    }

    fn write_day(&mut self, grid: &DayGrid) -> Result<()> {
        let t = self.times.len() as u64;
        let (nlat, nlon) = grid.shape();
        let data_entry = self.array_entry(DATA_ARRAY)?.zarray.clone();

        let mut buf = vec![0u8; grid.fields().len() * 4];
        for y in 0..nlat {
            for x in 0..nlon {
                let cell: Vec<f32> = grid.cell(y, x).collect();
                LittleEndian::write_f32_into(&cell, &mut buf);
                let key = data_entry.chunk_key(&[0, t, y as u64, x as u64]);
                self.write_chunk(DATA_ARRAY, &key, &buf)?;
            }
        }

        let days = grid.date().signed_duration_since(unix_epoch()).num_days();
        let mut time_buf = [0u8; 8];
        LittleEndian::write_i64(&mut time_buf, days);
        let time_key = self.array_entry(TIME_DIM)?.zarray.chunk_key(&[t]);
        self.write_chunk(TIME_DIM, &time_key, &time_buf)?;

        // Shapes grow only after every chunk of the day is on disk
        self.times.push(grid.date());
        let len = self.times.len() as u64;
        if let Some(entry) = self.metadata.array_mut(DATA_ARRAY) {
            entry.zarray.shape[1] = len;
        }
        if let Some(entry) = self.metadata.array_mut(TIME_DIM) {
            entry.zarray.shape[0] = len;
        }
        self.write_metadata()
    }

    /// Write .zgroup, .zattrs and every array's metadata, then the consolidated index
    fn write_metadata(&self) -> Result<()> {
        write_json(&self.path.join(".zgroup"), &ZGroupMetadata::default())?;
        write_json(&self.path.join(".zattrs"), &self.metadata.global_attributes)?;
        for (name, entry) in &self.metadata.arrays {
            let dir = self.path.join(name);
            fs::create_dir_all(&dir).map_err(|e| ConvertError::io(&dir, e))?;
            write_json(&dir.join(".zarray"), &entry.zarray)?;
            write_json(&dir.join(".zattrs"), &entry.attributes)?;
        }

        let consolidated = self
            .metadata
            .to_consolidated()
            .map_err(|source| ConvertError::Metadata {
                path: self.path.join(".zmetadata"),
                source,
            })?;
        write_json(&self.path.join(".zmetadata"), &consolidated)
    }

    /// Load metadata from the store, preferring the consolidated index
    fn load_metadata(path: &Path) -> Result<StoreMetadata> {
        let zmetadata_path = path.join(".zmetadata");
        match fs::read(&zmetadata_path) {
            Ok(data) => {
                let consolidated: ConsolidatedMetadata = serde_json::from_slice(&data)
                    .map_err(|source| ConvertError::Metadata {
                        path: zmetadata_path.clone(),
                        source,
                    })?;
                StoreMetadata::from_consolidated(consolidated).map_err(|source| {
                    ConvertError::Metadata {
                        path: zmetadata_path,
                        source,
                    }
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!(
                    "No consolidated metadata in '{}', scanning arrays",
                    path.display()
                );
                Self::load_hierarchical_metadata(path)
            }
            Err(e) => Err(ConvertError::io(zmetadata_path, e)),
        }
    }

    /// Load metadata by scanning .zarray/.zattrs files
    fn load_hierarchical_metadata(path: &Path) -> Result<StoreMetadata> {
        let mut metadata = StoreMetadata::new();
        metadata.global_attributes = read_optional_json(&path.join(".zattrs"))?.unwrap_or_default();
        Self::scan_directory(&mut metadata, "", path)?;
        Ok(metadata)
    }

    /// Recursively scan directory for arrays
    fn scan_directory(metadata: &mut StoreMetadata, current_path: &str, fs_path: &Path) -> Result<()> {
        let entries = fs::read_dir(fs_path).map_err(|e| ConvertError::io(fs_path, e))?;

        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let entry_path = entry.path();
            if name.starts_with('.') || !entry_path.is_dir() {
                continue;
            }

            let child_path = if current_path.is_empty() {
                name
            } else {
                format!("{}/{}", current_path, name)
            };

            if let Some(zarray) = read_optional_json::<ZArrayMetadata>(&entry_path.join(".zarray"))? {
                let attributes = read_optional_json(&entry_path.join(".zattrs"))?.unwrap_or_default();
                metadata
                    .arrays
                    .insert(child_path, ArrayEntry { zarray, attributes });
            } else {
                Self::scan_directory(metadata, &child_path, &entry_path)?;
            }
        }

        Ok(())
    }

    fn check_layout(&self) -> Result<()> {
        for name in [DATA_ARRAY, VARIABLE_DIM, TIME_DIM, LAT_DIM, LON_DIM] {
            let entry = self.array_entry(name)?;
            if entry.zarray.order != "C" {
                return Err(self.corrupt(format!("array '{}' is not C-ordered", name)));
            }
        }

        let data = self.array_entry(DATA_ARRAY)?;
        let dims = data.dimension_names();
        if dims != [VARIABLE_DIM, TIME_DIM, LAT_DIM, LON_DIM] {
            return Err(self.corrupt(format!(
                "'{}' has dimensions ({}), expected ({}, {}, {}, {})",
                DATA_ARRAY,
                dims.join(", "),
                VARIABLE_DIM,
                TIME_DIM,
                LAT_DIM,
                LON_DIM
            )));
        }
        if data.zarray.shape.len() != 4 {
            return Err(self.corrupt(format!(
                "'{}' has {} dimensions in its shape, expected 4",
                DATA_ARRAY,
                data.zarray.shape.len()
            )));
        }
        let nvar = data.zarray.shape[0];
        self.check_plain(DATA_ARRAY, "<f4", &[nvar, 1, 1, 1])?;
        self.check_plain(TIME_DIM, "<i8", &[1])?;

        let time = self.array_entry(TIME_DIM)?;
        if time.zarray.shape.first() != data.zarray.shape.get(1) {
            return Err(self.corrupt(format!(
                "'{}' and '{}' disagree on the time length",
                TIME_DIM, DATA_ARRAY
            )));
        }
        Ok(())
    }

    /// Appends write raw little-endian chunks, so the array must be stored uncompressed
    /// with exactly the dtype and chunking `create` gives it
    fn check_plain(&self, name: &str, dtype: &str, chunks: &[u64]) -> Result<()> {
        let zarray = &self.array_entry(name)?.zarray;
        if zarray.dtype != dtype {
            return Err(self.corrupt(format!(
                "array '{}' has dtype {}, expected {}",
                name, zarray.dtype, dtype
            )));
        }
        if zarray.chunks != chunks {
            return Err(self.corrupt(format!(
                "array '{}' has chunks {:?}, expected {:?}",
                name, zarray.chunks, chunks
            )));
        }
        if zarray.compressor.as_ref().is_some_and(|c| !c.is_null()) {
            return Err(self.corrupt(format!("array '{}' is compressed", name)));
        }
        if zarray.filters.as_ref().is_some_and(|f| !f.is_empty()) {
            return Err(self.corrupt(format!("array '{}' has filters", name)));
        }
        Ok(())
    }

    /// Coordinate lengths must agree with the data array they index
    fn check_extents(&self) -> Result<()> {
        let shape = &self.array_entry(DATA_ARRAY)?.zarray.shape;
        let extents = [
            (VARIABLE_DIM, self.variables.len(), shape[0]),
            (LAT_DIM, self.latitude.len(), shape[2]),
            (LON_DIM, self.longitude.len(), shape[3]),
        ];
        for (name, len, expected) in extents {
            if len as u64 != expected {
                return Err(self.corrupt(format!(
                    "coordinate '{}' holds {} values, '{}' expects {}",
                    name, len, DATA_ARRAY, expected
                )));
            }
        }
        Ok(())
    }

    fn array_entry(&self, name: &str) -> Result<&ArrayEntry> {
        self.metadata
            .array(name)
            .ok_or_else(|| self.corrupt(format!("missing array '{}'", name)))
    }

    fn corrupt(&self, message: String) -> ConvertError {
        ConvertError::CorruptStore {
            path: self.path.clone(),
            message,
        }
    }

    fn chunk_path(&self, array: &str, key: &str) -> PathBuf {
        self.path.join(array).join(key)
    }

    fn write_chunk(&self, array: &str, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.chunk_path(array, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConvertError::io(parent, e))?;
        }
        fs::write(&path, bytes).map_err(|e| ConvertError::io(&path, e))
    }

    fn read_chunk(&self, array: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.chunk_path(array, key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConvertError::io(path, e)),
        }
    }

    /// Decode the time coordinate into calendar days
    fn read_time_axis(&self) -> Result<Vec<NaiveDate>> {
        let entry = self.array_entry(TIME_DIM)?;
        let origin = match entry.attributes.get("units") {
            Some(AttributeValue::String(units)) => parse_day_units(units)
                .ok_or_else(|| self.corrupt(format!("unsupported time units '{}'", units)))?,
            _ => unix_epoch(),
        };

        let values: Vec<i64> = match self.retrieve_with_zarrs(TIME_DIM) {
            Ok(bytes) => bytes.chunks_exact(8).map(NativeEndian::read_i64).collect(),
            Err(e) => {
                log::debug!("zarrs could not read '{}' ({}), reading chunks directly", TIME_DIM, e);
                let bytes = self.read_1d_manual(TIME_DIM, 8)?;
                bytes.chunks_exact(8).map(LittleEndian::read_i64).collect()
            }
        };

        let mut times = Vec::with_capacity(values.len());
        for v in values {
            let day = if v >= 0 {
                origin.checked_add_days(Days::new(v as u64))
            } else {
                origin.checked_sub_days(Days::new(v.unsigned_abs()))
            };
            times.push(day.ok_or_else(|| self.corrupt(format!("time value {} out of range", v)))?);
        }

        if times.windows(2).any(|w| w[0] >= w[1]) {
            return Err(self.corrupt("time axis is not strictly ascending".to_string()));
        }
        Ok(times)
    }

    fn read_f64_array(&self, name: &str) -> Result<Vec<f64>> {
        let entry = self.array_entry(name)?;
        if entry.zarray.dtype != "<f8" {
            return Err(self.corrupt(format!(
                "array '{}' has dtype {}, expected <f8",
                name, entry.zarray.dtype
            )));
        }

        match self.retrieve_with_zarrs(name) {
            Ok(bytes) => Ok(bytes.chunks_exact(8).map(NativeEndian::read_f64).collect()),
            Err(e) => {
                log::debug!("zarrs could not read '{}' ({}), reading chunks directly", name, e);
                let bytes = self.read_1d_manual(name, 8)?;
                Ok(bytes.chunks_exact(8).map(LittleEndian::read_f64).collect())
            }
        }
    }

    /// Read a fixed-width unicode (`<U{n}`) coordinate
    fn read_string_array(&self, name: &str) -> Result<Vec<String>> {
        let entry = self.array_entry(name)?;
        let width: usize = entry
            .zarray
            .dtype
            .strip_prefix("<U")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| {
                self.corrupt(format!(
                    "array '{}' has dtype {}, expected <U",
                    name, entry.zarray.dtype
                ))
            })?;

        let bytes = self.read_1d_manual(name, width * 4)?;
        bytes
            .chunks_exact(width * 4)
            .map(|item| decode_utf32(item).ok_or_else(|| self.corrupt(format!("invalid text in '{}'", name))))
            .collect()
    }

    /// Read an entire array through the zarrs crate
    fn retrieve_with_zarrs(&self, name: &str) -> Result<Vec<u8>> {
        use zarrs::array::{Array, ArrayBytes};
        use zarrs::array_subset::ArraySubset;
        use zarrs::storage::store::FilesystemStore;

        let store = FilesystemStore::new(&self.path)
            .map_err(|e| self.corrupt(format!("Failed to create zarrs FilesystemStore: {}", e)))?;

        let array_path = format!("/{}", name);
        let array = Array::open(Arc::new(store), &array_path)
            .map_err(|e| self.corrupt(format!("Failed to open array '{}': {}", array_path, e)))?;

        let array_subset = ArraySubset::new_with_shape(array.shape().to_vec());
        let array_bytes = array
            .retrieve_array_subset(&array_subset)
            .map_err(|e| self.corrupt(format!("Failed to read array data: {}", e)))?;

        match array_bytes {
            ArrayBytes::Fixed(data) => Ok(data.into_owned()),
            ArrayBytes::Variable(_, _) => {
                Err(self.corrupt(format!("array '{}' has variable-length elements", name)))
            }
        }
    }

    /// Concatenate the chunks of an uncompressed 1-D array, filling absent chunks with zeros
    fn read_1d_manual(&self, name: &str, item_size: usize) -> Result<Vec<u8>> {
        let entry = self.array_entry(name)?;
        let zarray = &entry.zarray;
        if zarray.compressor.is_some() || zarray.filters.as_ref().is_some_and(|f| !f.is_empty()) {
            return Err(self.corrupt(format!(
                "array '{}' is compressed or filtered and could not be read by zarrs",
                name
            )));
        }
        let (len, chunk) = match (zarray.shape.as_slice(), zarray.chunks.as_slice()) {
            ([len], [chunk]) => (*len as usize, *chunk as usize),
            _ => return Err(self.corrupt(format!("array '{}' is not one-dimensional", name))),
        };

        let mut out = Vec::with_capacity(len * item_size);
        for index in 0..zarray.chunk_grid()[0] {
            let wanted = chunk.min(len - index as usize * chunk) * item_size;
            let key = zarray.chunk_key(&[index]);
            match self.read_chunk(name, &key)? {
                Some(bytes) if bytes.len() >= wanted => out.extend_from_slice(&bytes[..wanted]),
                Some(bytes) => {
                    return Err(self.corrupt(format!(
                        "chunk {}/{} holds {} bytes, expected {}",
                        name,
                        key,
                        bytes.len(),
                        wanted
                    )));
                }
                None => out.resize(out.len() + wanted, 0),
            }
        }
        Ok(out)
    }
}

fn axes_match(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= COORD_TOLERANCE)
}

/// Parse CF units of the form `days since YYYY-MM-DD[ ...]`
fn parse_day_units(units: &str) -> Option<NaiveDate> {
    let rest = units.trim().strip_prefix("days since")?.trim();
    let date = rest.split([' ', 'T']).next()?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn encode_f64(values: &[f64]) -> Vec<u8> {
    let mut buf = vec![0u8; values.len() * 8];
    LittleEndian::write_f64_into(values, &mut buf);
    buf
}

fn encode_utf32(values: &[String], width: usize) -> Vec<u8> {
    let mut buf = vec![0u8; values.len() * width * 4];
    for (i, value) in values.iter().enumerate() {
        for (j, c) in value.chars().take(width).enumerate() {
            let offset = (i * width + j) * 4;
            LittleEndian::write_u32(&mut buf[offset..offset + 4], c as u32);
        }
    }
    buf
}

fn decode_utf32(item: &[u8]) -> Option<String> {
    item.chunks_exact(4)
        .map(LittleEndian::read_u32)
        .take_while(|&c| c != 0)
        .map(char::from_u32)
        .collect()
}

fn read_optional_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path) {
        Ok(data) => serde_json::from_slice(&data)
            .map(Some)
            .map_err(|source| ConvertError::Metadata {
                path: path.to_path_buf(),
                source,
            }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConvertError::io(path, e)),
    }
}

/// Write JSON through a temporary file so readers never see a half-written document
fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value).map_err(|source| ConvertError::Metadata {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data).map_err(|e| ConvertError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| ConvertError::io(path, e))
}
