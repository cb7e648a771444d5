//! The textual header of a `.npy` buffer.
use super::{DType, MAGIC};
use crate::error::{PrepError, Result};
use byteordered::Endianness;
use std::io::{Read, Write};

/// Total header size (including magic and length prefix) is a multiple of this.
const HEADER_ALIGN: usize = 64;

/// Upper bound on the size of a header dictionary that we accept to read.
const MAX_HEADER_LEN: usize = 1 << 20;

/// The decoded header of a `.npy` buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyHeader {
    /// The element type.
    pub dtype: DType,
    /// Byte order of the element data.
    pub endianness: Endianness,
    /// Whether the element data is in column major order.
    pub fortran_order: bool,
    /// The array shape; empty for 0-dimensional arrays.
    pub shape: Vec<usize>,
}

impl NpyHeader {
    /// Number of elements described by this header.
    pub fn element_count(&self) -> Result<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| PrepError::Format(format!("shape {:?} is too large", self.shape)))
    }

    fn descr(&self) -> String {
        let descr = self.dtype.descr();
        if self.dtype.size_of() == 1 {
            return descr.to_string();
        }
        let order = match self.endianness {
            Endianness::Little => '<',
            Endianness::Big => '>',
        };
        format!("{}{}", order, &descr[1..])
    }

    fn shape_literal(&self) -> String {
        match self.shape.as_slice() {
            [] => "()".to_string(),
            [d] => format!("({},)", d),
            dims => {
                let dims: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
                format!("({})", dims.join(", "))
            }
        }
    }

    /// Write the magic string, version, header length and header
    /// dictionary, padded so that the element data starts aligned.
    pub fn write<W: Write>(&self, mut dst: W) -> Result<()> {
        let dict = format!(
            "{{'descr': '{}', 'fortran_order': {}, 'shape': {}, }}",
            self.descr(),
            if self.fortran_order { "True" } else { "False" },
            self.shape_literal()
        );

        // version 1.0 has a 2-byte length prefix, version 2.0 a 4-byte one
        let mut prefix_len = MAGIC.len() + 2 + 2;
        let mut padded_len = padded(prefix_len + dict.len() + 1) - prefix_len;
        let major = if padded_len > usize::from(u16::MAX) {
            prefix_len = MAGIC.len() + 2 + 4;
            padded_len = padded(prefix_len + dict.len() + 1) - prefix_len;
            2u8
        } else {
            1u8
        };

        let mut header = dict.into_bytes();
        header.resize(padded_len - 1, b' ');
        header.push(b'\n');

        dst.write_all(MAGIC)?;
        dst.write_all(&[major, 0])?;
        if major == 1 {
            dst.write_all(&(header.len() as u16).to_le_bytes())?;
        } else {
            dst.write_all(&(header.len() as u32).to_le_bytes())?;
        }
        dst.write_all(&header)?;
        Ok(())
    }

    /// Read and validate the preamble and header dictionary, leaving `src`
    /// positioned at the start of the element data.
    pub fn read<R: Read>(mut src: R) -> Result<Self> {
        let mut magic = [0u8; 8];
        src.read_exact(&mut magic)?;
        if &magic[..6] != MAGIC {
            return Err(PrepError::Format("missing .npy magic string".to_string()));
        }
        let header_len = match magic[6] {
            1 => {
                let mut len = [0u8; 2];
                src.read_exact(&mut len)?;
                usize::from(u16::from_le_bytes(len))
            }
            2 | 3 => {
                let mut len = [0u8; 4];
                src.read_exact(&mut len)?;
                u32::from_le_bytes(len) as usize
            }
            v => {
                return Err(PrepError::Format(format!(
                    "unsupported .npy format version {}.{}",
                    v, magic[7]
                )))
            }
        };
        if header_len > MAX_HEADER_LEN {
            return Err(PrepError::Format(format!(
                "header of {} bytes is too large",
                header_len
            )));
        }
        let mut raw = vec![0u8; header_len];
        src.read_exact(&mut raw)?;
        let text = String::from_utf8(raw)
            .map_err(|_| PrepError::Format("header is not valid text".to_string()))?;
        Self::parse(&text)
    }

    /// Parse a header dictionary such as
    /// `{'descr': '<f4', 'fortran_order': False, 'shape': (3, 4), }`.
    pub fn parse(text: &str) -> Result<Self> {
        let descr = quoted(dict_value(text, "descr")?)?;
        let (dtype, endianness) = DType::from_descr(descr)?;

        let order = dict_value(text, "fortran_order")?;
        let fortran_order = if order.starts_with("True") {
            true
        } else if order.starts_with("False") {
            false
        } else {
            return Err(PrepError::Format("invalid fortran_order value".to_string()));
        };

        let shape = dict_value(text, "shape")?;
        let end = shape
            .find(')')
            .filter(|_| shape.starts_with('('))
            .ok_or_else(|| PrepError::Format("invalid shape value".to_string()))?;
        let shape = shape[1..end]
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| {
                d.trim_end_matches('L')
                    .parse::<usize>()
                    .map_err(|_| PrepError::Format(format!("invalid dimension `{}`", d)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(NpyHeader {
            dtype,
            endianness,
            fortran_order,
            shape,
        })
    }
}

fn padded(len: usize) -> usize {
    (len + HEADER_ALIGN - 1) / HEADER_ALIGN * HEADER_ALIGN
}

/// Locate `key` in a header dictionary and return the text following its
/// colon, with leading whitespace removed.
fn dict_value<'a>(text: &'a str, key: &str) -> Result<&'a str> {
    for quote in &['\'', '"'] {
        let needle = format!("{}{}{}", quote, key, quote);
        if let Some(pos) = text.find(&needle) {
            let rest = text[pos + needle.len()..].trim_start();
            if let Some(rest) = rest.strip_prefix(':') {
                return Ok(rest.trim_start());
            }
        }
    }
    Err(PrepError::Format(format!("header is missing key `{}`", key)))
}

/// Extract the contents of a quoted string at the start of `text`.
fn quoted(text: &str) -> Result<&str> {
    let quote = text
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| PrepError::Format("only simple type descriptors are supported".to_string()))?;
    let inner = &text[1..];
    inner
        .find(quote)
        .map(|end| &inner[..end])
        .ok_or_else(|| PrepError::Format("unterminated string in header".to_string()))
}
