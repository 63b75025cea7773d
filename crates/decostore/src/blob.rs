//! Decoder blob codec using nom
//!
//! File format:
//! ```text
//! DMAT001\n
//! [4 bytes: version u32 little-endian]
//! [8 bytes: rows u64 little-endian]
//! [8 bytes: cols u64 little-endian]
//! ...rows * cols f64 values (little-endian, row-major)...
//! ```

use nom::{
    bytes::complete::tag,
    multi::count,
    number::complete::{le_f64, le_u32, le_u64},
    IResult,
};

use crate::error::{Error, Result};
use crate::matrix::Matrix;

/// Magic header for decoder blob files
pub const DMAT_MAGIC: &[u8] = b"DMAT001\n";

/// Newest blob format version this build reads and writes
pub const DMAT_VERSION: u32 = 1;

/// Decoder blob header
#[derive(Debug, Clone, PartialEq)]
pub struct BlobHeader {
    /// File format version
    pub version: u32,
    /// Number of matrix rows
    pub rows: u64,
    /// Number of matrix columns
    pub cols: u64,
}

fn parse_blob_header(input: &[u8]) -> IResult<&[u8], BlobHeader> {
    let (input, _) = tag(DMAT_MAGIC)(input)?;
    let (input, version) = le_u32(input)?;
    let (input, rows) = le_u64(input)?;
    let (input, cols) = le_u64(input)?;
    Ok((input, BlobHeader { version, rows, cols }))
}

/// Encode a matrix into the versioned blob format
pub fn encode_matrix(matrix: &Matrix) -> Vec<u8> {
    let mut out = Vec::with_capacity(DMAT_MAGIC.len() + 20 + matrix.len() * 8);
    out.extend_from_slice(DMAT_MAGIC);
    out.extend_from_slice(&DMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(matrix.rows() as u64).to_le_bytes());
    out.extend_from_slice(&(matrix.cols() as u64).to_le_bytes());
    out.extend_from_slice(&matrix.to_le_bytes());
    out
}

/// Decode a matrix from the versioned blob format
///
/// # Arguments
/// * `input` - Complete blob file contents
///
/// # Returns
/// * `Result<Matrix>` - Decoded matrix, or a codec error if the magic,
///   version, shape, or payload length do not line up
pub fn decode_matrix(input: &[u8]) -> Result<Matrix> {
    let (payload, header) = parse_blob_header(input)?;

    if header.version > DMAT_VERSION {
        return Err(Error::Version {
            found: header.version,
            supported: DMAT_VERSION,
        });
    }

    let values = (header.rows as usize)
        .checked_mul(header.cols as usize)
        .ok_or_else(|| {
            Error::Codec(format!("implausible shape {}x{}", header.rows, header.cols))
        })?;
    let expected = values.checked_mul(8).ok_or_else(|| {
        Error::Codec(format!("implausible shape {}x{}", header.rows, header.cols))
    })?;
    if payload.len() != expected {
        return Err(Error::Codec(format!(
            "payload is {} bytes but shape {}x{} needs {}",
            payload.len(),
            header.rows,
            header.cols,
            expected
        )));
    }

    let (_, data) = count(le_f64, values)(payload)?;
    Ok(Matrix::from_vec(header.rows as usize, header.cols as usize, data))
}
