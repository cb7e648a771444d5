//! Private utility module
use byteordered::Endianness;
use std::path::Path;

use crate::error::{PrepError, Result};

/// Interpret the byte order character of a NumPy type descriptor.
///
/// `'|'` is used by single-byte types, for which any byte order will do.
pub fn byte_order_from_char(c: char) -> Result<Endianness> {
    match c {
        '<' | '|' => Ok(Endianness::Little),
        '>' => Ok(Endianness::Big),
        '=' => Ok(Endianness::native()),
        _ => Err(PrepError::Format(format!("invalid byte order mark `{}`", c))),
    }
}

/// Check whether the file name of `path` ends with the given suffix
/// (typically a compound extension such as `.npy.zst`).
pub fn has_suffix<P: AsRef<Path>>(path: P, suffix: &str) -> bool {
    path.as_ref()
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.len() > suffix.len() && name.ends_with(suffix))
        .unwrap_or(false)
}

/// Check whether the file name of `path` ends with ".gz".
pub fn is_gz_file<P: AsRef<Path>>(path: P) -> bool {
    has_suffix(path, ".gz")
}

/// Remove the first matching suffix from `name`, if any.
pub fn strip_suffix<'a>(name: &'a str, suffixes: &[&str]) -> &'a str {
    suffixes
        .iter()
        .find_map(|s| name.strip_suffix(s))
        .unwrap_or(name)
}
