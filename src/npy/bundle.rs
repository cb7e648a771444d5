//! Named collections of arrays in the NumPy `.npz` layout.
//!
//! A bundle is an uncompressed zip archive in which every member is a
//! `.npy` buffer named after its key, as produced by `numpy.savez`.
//! Scalars are stored as 0-dimensional arrays.
use super::{from_bytes, to_bytes, NpyArray};
use crate::error::{PrepError, Result};
use std::collections::btree_map::{self, BTreeMap};
use std::io::{Cursor, Read, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// The signature at the start of a non-empty zip archive.
pub const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// The signature at the start of an empty zip archive.
pub const EMPTY_ZIP_MAGIC: &[u8; 4] = b"PK\x05\x06";

/// A set of named arrays, kept in key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bundle {
    arrays: BTreeMap<String, NpyArray>,
}

impl Bundle {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an array under `name`, returning the array it replaces.
    pub fn insert<S, A>(&mut self, name: S, array: A) -> Option<NpyArray>
    where
        S: Into<String>,
        A: Into<NpyArray>,
    {
        self.arrays.insert(name.into(), array.into())
    }

    /// Insert a double precision scalar under `name`.
    pub fn insert_scalar<S: Into<String>>(&mut self, name: S, value: f64) -> Option<NpyArray> {
        self.insert(name, NpyArray::scalar(value))
    }

    /// Builder-style variant of [`insert_scalar`](#method.insert_scalar).
    pub fn with_scalar<S: Into<String>>(mut self, name: S, value: f64) -> Self {
        let _ = self.insert_scalar(name, value);
        self
    }

    /// Retrieve the array stored under `name`.
    pub fn get(&self, name: &str) -> Option<&NpyArray> {
        self.arrays.get(name)
    }

    /// Retrieve the scalar stored under `name`.
    ///
    /// # Errors
    ///
    /// - `PrepError::Format` if there is no such member.
    /// - `PrepError::Shape` if the member holds more than one element.
    pub fn scalar(&self, name: &str) -> Result<f64> {
        self.get(name)
            .ok_or_else(|| PrepError::Format(format!("bundle has no member `{}`", name)))?
            .scalar_value()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    /// Whether the bundle has no members.
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Iterate over the members in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, NpyArray> {
        self.arrays.iter()
    }

    /// Serialize this bundle into an `.npz` archive.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, array) in &self.arrays {
            let bytes = to_bytes(array)?;
            let options = FileOptions::default()
                .compression_method(CompressionMethod::Stored)
                .large_file(bytes.len() as u64 >= u64::from(u32::MAX));
            zip.start_file(format!("{}.npy", name), options)?;
            zip.write_all(&bytes)?;
        }
        Ok(zip.finish()?.into_inner())
    }

    /// Deserialize a bundle from an `.npz` archive.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut bundle = Bundle::new();
        for i in 0..archive.len() {
            let mut member = archive.by_index(i)?;
            let name = member.name();
            let name = name.strip_suffix(".npy").unwrap_or(name).to_string();
            let mut raw = Vec::with_capacity(member.size().min(1 << 24) as usize);
            let _ = member.read_to_end(&mut raw)?;
            let _ = bundle.insert(name, from_bytes(&raw)?);
        }
        Ok(bundle)
    }
}

impl<'a> IntoIterator for &'a Bundle {
    type Item = (&'a String, &'a NpyArray);
    type IntoIter = btree_map::Iter<'a, String, NpyArray>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
