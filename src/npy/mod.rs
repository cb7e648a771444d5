//! Serialization of arrays in the NumPy `.npy` layout.
//!
//! A `.npy` buffer holds a magic string, a version, a small textual header
//! describing the element type (`descr`), memory order and shape, and the
//! raw element data. Only plain numeric and boolean element types are
//! supported here; object arrays are never read.
//!
//! Arrays are always written in little endian, row major order, with
//! version 1.0 of the layout whenever the header fits. Reading accepts
//! either byte order, either memory order and versions 1.0 to 3.0.
//!
//! Named collections of arrays are stored as `.npz` bundles, see the
//! [`bundle`](bundle/index.html) module.
use crate::error::{PrepError, Result};
use crate::util::byte_order_from_char;
use byteordered::{ByteOrdered, Endian, Endianness};
use half::f16;
use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use std::io::{Read, Write};

pub mod bundle;
mod header;

pub use self::bundle::Bundle;
pub use self::header::NpyHeader;

/// The magic string at the start of every `.npy` buffer.
pub const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Element types which can be stored in a `.npy` buffer.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum DType {
    /// `|b1`
    Bool,
    /// `|u1`
    Uint8,
    /// `<i2`
    Int16,
    /// `<u2`
    Uint16,
    /// `<i4`
    Int32,
    /// `<i8`
    Int64,
    /// `<f2`
    Float16,
    /// `<f4`
    Float32,
    /// `<f8`
    Float64,
}

impl DType {
    /// The NumPy name of this element type.
    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::Uint8 => "uint8",
            DType::Int16 => "int16",
            DType::Uint16 => "uint16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Float16 => "float16",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }

    /// The size of a single element in bytes.
    pub fn size_of(self) -> usize {
        match self {
            DType::Bool | DType::Uint8 => 1,
            DType::Int16 | DType::Uint16 | DType::Float16 => 2,
            DType::Int32 | DType::Float32 => 4,
            DType::Int64 | DType::Float64 => 8,
        }
    }

    /// The little endian type descriptor written to the header.
    pub fn descr(self) -> &'static str {
        match self {
            DType::Bool => "|b1",
            DType::Uint8 => "|u1",
            DType::Int16 => "<i2",
            DType::Uint16 => "<u2",
            DType::Int32 => "<i4",
            DType::Int64 => "<i8",
            DType::Float16 => "<f2",
            DType::Float32 => "<f4",
            DType::Float64 => "<f8",
        }
    }

    /// Parse a type descriptor into an element type and its byte order.
    pub fn from_descr(descr: &str) -> Result<(DType, Endianness)> {
        let mut chars = descr.chars();
        let order = chars
            .next()
            .ok_or_else(|| PrepError::Format("empty type descriptor".to_string()))?;
        let endianness = byte_order_from_char(order)?;
        let dtype = match chars.as_str() {
            "b1" => DType::Bool,
            "u1" => DType::Uint8,
            "i2" => DType::Int16,
            "u2" => DType::Uint16,
            "i4" => DType::Int32,
            "i8" => DType::Int64,
            "f2" => DType::Float16,
            "f4" => DType::Float32,
            "f8" => DType::Float64,
            _ => {
                return Err(PrepError::Format(format!(
                    "unsupported type descriptor `{}`",
                    descr
                )))
            }
        };
        Ok((dtype, endianness))
    }
}

/// Interface for element types which can be serialized to and from `.npy`.
pub trait NpyElement: Copy + Sized + 'static {
    /// The element type tag.
    const DTYPE: DType;

    /// Write a single element with the given byte order.
    fn write_elem<W: Write, E: Endian>(self, dst: &mut ByteOrdered<W, E>) -> std::io::Result<()>;

    /// Read a single element with the given byte order.
    fn read_elem<R: Read, E: Endian>(src: &mut ByteOrdered<R, E>) -> std::io::Result<Self>;

    /// Wrap an array of this element type.
    fn into_npy(array: ArrayD<Self>) -> NpyArray;

    /// Unwrap an array of this element type.
    fn from_npy(array: NpyArray) -> Result<ArrayD<Self>>;
}

macro_rules! impl_npy_element {
    ($t:ty, $dtype:ident, $variant:ident, $write:ident, $read:ident) => {
        impl NpyElement for $t {
            const DTYPE: DType = DType::$dtype;

            fn write_elem<W: Write, E: Endian>(self, dst: &mut ByteOrdered<W, E>) -> std::io::Result<()> {
                dst.$write(self)
            }

            fn read_elem<R: Read, E: Endian>(src: &mut ByteOrdered<R, E>) -> std::io::Result<Self> {
                src.$read()
            }

            fn into_npy(array: ArrayD<Self>) -> NpyArray {
                NpyArray::$variant(array)
            }

            fn from_npy(array: NpyArray) -> Result<ArrayD<Self>> {
                match array {
                    NpyArray::$variant(a) => Ok(a),
                    other => Err(PrepError::Dtype(DType::$dtype.name(), other.dtype().name())),
                }
            }
        }
    };
}

impl_npy_element!(u8, Uint8, U8, write_u8, read_u8);
impl_npy_element!(i16, Int16, I16, write_i16, read_i16);
impl_npy_element!(u16, Uint16, U16, write_u16, read_u16);
impl_npy_element!(i32, Int32, I32, write_i32, read_i32);
impl_npy_element!(i64, Int64, I64, write_i64, read_i64);
impl_npy_element!(f32, Float32, F32, write_f32, read_f32);
impl_npy_element!(f64, Float64, F64, write_f64, read_f64);

impl NpyElement for bool {
    const DTYPE: DType = DType::Bool;

    fn write_elem<W: Write, E: Endian>(self, dst: &mut ByteOrdered<W, E>) -> std::io::Result<()> {
        dst.write_u8(self as u8)
    }

    fn read_elem<R: Read, E: Endian>(src: &mut ByteOrdered<R, E>) -> std::io::Result<Self> {
        Ok(src.read_u8()? != 0)
    }

    fn into_npy(array: ArrayD<Self>) -> NpyArray {
        NpyArray::Bool(array)
    }

    fn from_npy(array: NpyArray) -> Result<ArrayD<Self>> {
        match array {
            NpyArray::Bool(a) => Ok(a),
            other => Err(PrepError::Dtype(DType::Bool.name(), other.dtype().name())),
        }
    }
}

impl NpyElement for f16 {
    const DTYPE: DType = DType::Float16;

    fn write_elem<W: Write, E: Endian>(self, dst: &mut ByteOrdered<W, E>) -> std::io::Result<()> {
        dst.write_u16(self.to_bits())
    }

    fn read_elem<R: Read, E: Endian>(src: &mut ByteOrdered<R, E>) -> std::io::Result<Self> {
        Ok(f16::from_bits(src.read_u16()?))
    }

    fn into_npy(array: ArrayD<Self>) -> NpyArray {
        NpyArray::F16(array)
    }

    fn from_npy(array: NpyArray) -> Result<ArrayD<Self>> {
        match array {
            NpyArray::F16(a) => Ok(a),
            other => Err(PrepError::Dtype(DType::Float16.name(), other.dtype().name())),
        }
    }
}

/// An array of any supported element type and dimensionality.
#[derive(Debug, Clone, PartialEq)]
pub enum NpyArray {
    /// Boolean array.
    Bool(ArrayD<bool>),
    /// Unsigned 8-bit array.
    U8(ArrayD<u8>),
    /// Signed 16-bit array.
    I16(ArrayD<i16>),
    /// Unsigned 16-bit array.
    U16(ArrayD<u16>),
    /// Signed 32-bit array.
    I32(ArrayD<i32>),
    /// Signed 64-bit array.
    I64(ArrayD<i64>),
    /// Half precision array.
    F16(ArrayD<f16>),
    /// Single precision array.
    F32(ArrayD<f32>),
    /// Double precision array.
    F64(ArrayD<f64>),
}

macro_rules! dispatch {
    ($array:expr, $a:ident => $body:expr) => {
        match $array {
            NpyArray::Bool($a) => $body,
            NpyArray::U8($a) => $body,
            NpyArray::I16($a) => $body,
            NpyArray::U16($a) => $body,
            NpyArray::I32($a) => $body,
            NpyArray::I64($a) => $body,
            NpyArray::F16($a) => $body,
            NpyArray::F32($a) => $body,
            NpyArray::F64($a) => $body,
        }
    };
}

impl NpyArray {
    /// Create a 0-dimensional double precision array holding `value`.
    pub fn scalar(value: f64) -> Self {
        NpyArray::F64(ArrayD::from_elem(IxDyn(&[]), value))
    }

    /// The element type of this array.
    pub fn dtype(&self) -> DType {
        match self {
            NpyArray::Bool(_) => DType::Bool,
            NpyArray::U8(_) => DType::Uint8,
            NpyArray::I16(_) => DType::Int16,
            NpyArray::U16(_) => DType::Uint16,
            NpyArray::I32(_) => DType::Int32,
            NpyArray::I64(_) => DType::Int64,
            NpyArray::F16(_) => DType::Float16,
            NpyArray::F32(_) => DType::Float32,
            NpyArray::F64(_) => DType::Float64,
        }
    }

    /// The shape of this array.
    pub fn shape(&self) -> &[usize] {
        dispatch!(self, a => a.shape())
    }

    /// Number of elements in this array.
    pub fn len(&self) -> usize {
        dispatch!(self, a => a.len())
    }

    /// Whether this array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the element data in bytes.
    pub fn nbytes(&self) -> usize {
        self.len() * self.dtype().size_of()
    }

    /// Move the inner array out, failing if the element type is not `T`.
    pub fn into_array<T: NpyElement>(self) -> Result<ArrayD<T>> {
        T::from_npy(self)
    }

    /// Convert every element into double precision. 64-bit integers beyond
    /// 2^53 lose precision.
    pub fn to_f64(&self) -> ArrayD<f64> {
        match self {
            NpyArray::Bool(a) => a.mapv(|v| if v { 1. } else { 0. }),
            NpyArray::U8(a) => a.mapv(f64::from),
            NpyArray::I16(a) => a.mapv(f64::from),
            NpyArray::U16(a) => a.mapv(f64::from),
            NpyArray::I32(a) => a.mapv(f64::from),
            NpyArray::I64(a) => a.mapv(|v| v as f64),
            NpyArray::F16(a) => a.mapv(f64::from),
            NpyArray::F32(a) => a.mapv(f64::from),
            NpyArray::F64(a) => a.clone(),
        }
    }

    /// Retrieve the single value of a 0-dimensional (or single element)
    /// array as a double precision number.
    pub fn scalar_value(&self) -> Result<f64> {
        if self.len() != 1 {
            return Err(PrepError::Shape(format!(
                "expected a scalar, got array of shape {:?}",
                self.shape()
            )));
        }
        self.to_f64()
            .iter()
            .next()
            .copied()
            .ok_or_else(|| PrepError::Shape("empty scalar".to_string()))
    }
}

impl<T: NpyElement> From<ArrayD<T>> for NpyArray {
    fn from(array: ArrayD<T>) -> Self {
        T::into_npy(array)
    }
}

fn write_elements<T, W>(dst: W, array: &ArrayD<T>) -> Result<()>
where
    T: NpyElement,
    W: Write,
{
    let mut dst = ByteOrdered::le(dst);
    for &v in array.iter() {
        v.write_elem(&mut dst)?;
    }
    Ok(())
}

/// Write `array` in the `.npy` layout.
pub fn write_npy<W: Write>(mut dst: W, array: &NpyArray) -> Result<()> {
    let header = NpyHeader {
        dtype: array.dtype(),
        endianness: Endianness::Little,
        fortran_order: false,
        shape: array.shape().to_vec(),
    };
    header.write(&mut dst)?;
    dispatch!(array, a => write_elements(&mut dst, a))?;
    Ok(())
}

/// Serialize `array` into a new `.npy` buffer.
pub fn to_bytes(array: &NpyArray) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(array.nbytes() + 128);
    write_npy(&mut out, array)?;
    Ok(out)
}

fn read_elements<T, R>(src: R, header: &NpyHeader) -> Result<NpyArray>
where
    T: NpyElement,
    R: Read,
{
    let count = header.element_count()?;
    let mut src = ByteOrdered::runtime(src, header.endianness);
    // grows past this bound only as elements are actually read
    let mut data = Vec::with_capacity(count.min(1 << 24));
    for _ in 0..count {
        data.push(T::read_elem(&mut src)?);
    }
    let shape = IxDyn(&header.shape);
    let array = if header.fortran_order {
        ArrayD::from_shape_vec(shape.f(), data)
    } else {
        ArrayD::from_shape_vec(shape, data)
    }
    .map_err(|e| PrepError::Format(e.to_string()))?;
    Ok(T::into_npy(array))
}

/// Read an array in the `.npy` layout.
pub fn read_npy<R: Read>(mut src: R) -> Result<NpyArray> {
    let header = NpyHeader::read(&mut src)?;
    match header.dtype {
        DType::Bool => read_elements::<bool, _>(src, &header),
        DType::Uint8 => read_elements::<u8, _>(src, &header),
        DType::Int16 => read_elements::<i16, _>(src, &header),
        DType::Uint16 => read_elements::<u16, _>(src, &header),
        DType::Int32 => read_elements::<i32, _>(src, &header),
        DType::Int64 => read_elements::<i64, _>(src, &header),
        DType::Float16 => read_elements::<f16, _>(src, &header),
        DType::Float32 => read_elements::<f32, _>(src, &header),
        DType::Float64 => read_elements::<f64, _>(src, &header),
    }
}

/// Deserialize an array from a `.npy` buffer. Trailing bytes are rejected.
pub fn from_bytes(bytes: &[u8]) -> Result<NpyArray> {
    let mut src = bytes;
    let array = read_npy(&mut src)?;
    if !src.is_empty() {
        return Err(PrepError::Format(format!(
            "{} unexpected bytes after array data",
            src.len()
        )));
    }
    Ok(array)
}
