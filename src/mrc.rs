//! Reader for MRC/MRCS electron-microscopy image containers
//!
//! Only the parts of the MRC2014 header needed to locate and decode the voxel
//! block are interpreted. Stacks are exposed as `(nz, ny, nx)` arrays.

use crate::structs::{CryoError, Result};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use std::fs;
use std::path::Path;

const HEADER_LEN: usize = 1024;
const NSYMBT_OFFSET: usize = 92;
const MAP_TAG_OFFSET: usize = 208;
const MACHST_OFFSET: usize = 212;

/// Voxel encodings we can decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MrcMode {
    Int8,
    Int16,
    Float32,
    Uint16,
}

impl MrcMode {
    fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(Self::Int8),
            1 => Ok(Self::Int16),
            2 => Ok(Self::Float32),
            6 => Ok(Self::Uint16),
            other => Err(CryoError::Mrc(format!("unsupported data mode {other}"))),
        }
    }

    #[must_use]
    pub const fn bytes_per_voxel(self) -> usize {
        match self {
            Self::Int8 => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Float32 => 4,
        }
    }
}

/// Decoded subset of the MRC header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MrcHeader {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub mode: MrcMode,
    /// Length of the extended header following the main header
    pub ext_header_len: usize,
    pub big_endian: bool,
}

impl MrcHeader {
    /// Parse the fixed 1024-byte header
    ///
    /// # Errors
    /// Returns error if the buffer is too short, a dimension is not positive,
    /// or the data mode is unsupported
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(CryoError::Mrc(format!(
                "file too short for header: {} bytes",
                bytes.len()
            )));
        }

        // Machine stamp 0x11 in the first byte marks big-endian data; anything
        // else (including an unset stamp) is read as little-endian
        let big_endian = bytes[MACHST_OFFSET] == 0x11;
        if &bytes[MAP_TAG_OFFSET..MAP_TAG_OFFSET + 4] != b"MAP " {
            tracing::debug!("MRC header has no MAP tag, reading permissively");
        }

        let nx = dimension(read_i32(bytes, 0, big_endian), "nx")?;
        let ny = dimension(read_i32(bytes, 4, big_endian), "ny")?;
        let nz = dimension(read_i32(bytes, 8, big_endian), "nz")?;
        let mode = MrcMode::from_code(read_i32(bytes, 12, big_endian))?;

        let nsymbt = read_i32(bytes, NSYMBT_OFFSET, big_endian);
        let ext_header_len = usize::try_from(nsymbt)
            .map_err(|_| CryoError::Mrc(format!("negative extended header length {nsymbt}")))?;

        Ok(Self {
            nx,
            ny,
            nz,
            mode,
            ext_header_len,
            big_endian,
        })
    }

    /// Byte offset of the first voxel
    #[must_use]
    pub const fn data_offset(&self) -> usize {
        HEADER_LEN + self.ext_header_len
    }

    /// Number of bytes in the voxel block; `None` if it overflows `usize`
    #[must_use]
    pub fn data_len(&self) -> Option<usize> {
        self.nx
            .checked_mul(self.ny)?
            .checked_mul(self.nz)?
            .checked_mul(self.mode.bytes_per_voxel())
    }
}

fn read_i32(bytes: &[u8], offset: usize, big_endian: bool) -> i32 {
    let raw = [
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ];
    if big_endian {
        i32::from_be_bytes(raw)
    } else {
        i32::from_le_bytes(raw)
    }
}

fn dimension(value: i32, name: &str) -> Result<usize> {
    usize::try_from(value)
        .ok()
        .filter(|&v| v > 0)
        .ok_or_else(|| CryoError::Mrc(format!("invalid dimension {name}={value}")))
}

/// A fully loaded image stack
#[derive(Debug, Clone)]
pub struct MrcStack {
    pub header: MrcHeader,
    data: Array3<f32>,
}

impl MrcStack {
    /// Read and decode an MRC file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not a valid MRC file
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
            .map_err(|e| CryoError::Mrc(format!("{}: {e}", path.display())))
    }

    /// Decode an in-memory MRC file
    ///
    /// # Errors
    /// Returns error if the header is invalid or the voxel block is truncated
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = MrcHeader::parse(bytes)?;
        let start = header.data_offset();
        let end = header
            .data_len()
            .and_then(|len| start.checked_add(len))
            .ok_or_else(|| CryoError::Mrc("header dimensions overflow".into()))?;
        if bytes.len() < end {
            return Err(CryoError::Mrc(format!(
                "truncated data block: expected {end} bytes, found {}",
                bytes.len()
            )));
        }

        let values = decode_voxels(&bytes[start..end], header.mode, header.big_endian);
        let data = Array3::from_shape_vec((header.nz, header.ny, header.nx), values)?;

        Ok(Self { header, data })
    }

    #[must_use]
    pub fn n_frames(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// View a single frame as `(ny, nx)`
    #[must_use]
    pub fn frame(&self, index: usize) -> Option<ArrayView2<'_, f32>> {
        (index < self.n_frames()).then(|| self.data.index_axis(Axis(0), index))
    }

    /// Split the stack into owned frames
    #[must_use]
    pub fn into_frames(self) -> Vec<Array2<f32>> {
        self.data
            .outer_iter()
            .map(|frame| frame.to_owned())
            .collect()
    }

    /// Take the only frame of a single-image file
    ///
    /// # Errors
    /// Returns error if the file holds more than one frame
    pub fn into_single_frame(self) -> Result<Array2<f32>> {
        if self.n_frames() != 1 {
            return Err(CryoError::Mrc(format!(
                "expected a single frame, found {}",
                self.n_frames()
            )));
        }
        Ok(self.data.index_axis(Axis(0), 0).to_owned())
    }
}

#[allow(clippy::cast_lossless, clippy::cast_precision_loss)]
fn decode_voxels(block: &[u8], mode: MrcMode, big_endian: bool) -> Vec<f32> {
    let width = mode.bytes_per_voxel();
    block
        .chunks_exact(width)
        .map(|c| match (mode, big_endian) {
            (MrcMode::Int8, _) => f32::from(i8::from_ne_bytes([c[0]])),
            (MrcMode::Int16, false) => f32::from(i16::from_le_bytes([c[0], c[1]])),
            (MrcMode::Int16, true) => f32::from(i16::from_be_bytes([c[0], c[1]])),
            (MrcMode::Uint16, false) => f32::from(u16::from_le_bytes([c[0], c[1]])),
            (MrcMode::Uint16, true) => f32::from(u16::from_be_bytes([c[0], c[1]])),
            (MrcMode::Float32, false) => f32::from_le_bytes([c[0], c[1], c[2], c[3]]),
            (MrcMode::Float32, true) => f32::from_be_bytes([c[0], c[1], c[2], c[3]]),
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Build a little-endian mode-2 MRC file holding `frames`
    pub(crate) fn mrc_bytes(frames: &[Array2<f32>], ext_header_len: usize) -> Vec<u8> {
        let (ny, nx) = frames[0].dim();
        let mut bytes = vec![0u8; HEADER_LEN];
        let put = |bytes: &mut Vec<u8>, offset: usize, v: i32| {
            bytes[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
        };
        put(&mut bytes, 0, i32::try_from(nx).expect("nx"));
        put(&mut bytes, 4, i32::try_from(ny).expect("ny"));
        put(&mut bytes, 8, i32::try_from(frames.len()).expect("nz"));
        put(&mut bytes, 12, 2);
        put(&mut bytes, NSYMBT_OFFSET, i32::try_from(ext_header_len).expect("nsymbt"));
        bytes[MAP_TAG_OFFSET..MAP_TAG_OFFSET + 4].copy_from_slice(b"MAP ");
        bytes[MACHST_OFFSET] = 0x44;
        bytes[MACHST_OFFSET + 1] = 0x44;
        bytes.extend(std::iter::repeat(0u8).take(ext_header_len));
        for frame in frames {
            for v in frame {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        bytes
    }

    pub(crate) fn write_mrc(frames: &[Array2<f32>], suffix: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .expect("create temp file");
        file.write_all(&mrc_bytes(frames, 0)).expect("write mrc");
        file
    }

    fn ramp(ny: usize, nx: usize, offset: f32) -> Array2<f32> {
        Array2::from_shape_fn((ny, nx), |(r, c)| offset + (r * nx + c) as f32)
    }

    #[test]
    fn test_decode_stack() {
        let frames = vec![ramp(3, 4, 0.0), ramp(3, 4, 100.0)];
        let stack = MrcStack::from_bytes(&mrc_bytes(&frames, 0)).expect("decode");

        assert_eq!(stack.header.nx, 4);
        assert_eq!(stack.header.ny, 3);
        assert_eq!(stack.n_frames(), 2);
        assert_eq!(stack.frame(1).expect("frame")[[2, 3]], 111.0);
        assert!(stack.frame(2).is_none());
    }

    #[test]
    fn test_extended_header_is_skipped() {
        let frames = vec![ramp(2, 2, 5.0)];
        let stack = MrcStack::from_bytes(&mrc_bytes(&frames, 96)).expect("decode");
        assert_eq!(stack.into_single_frame().expect("single"), frames[0]);
    }

    #[test]
    fn test_int16_mode() {
        let mut bytes = mrc_bytes(&[Array2::zeros((1, 2))], 0);
        bytes[12..16].copy_from_slice(&1i32.to_le_bytes());
        bytes.truncate(HEADER_LEN);
        bytes.extend_from_slice(&(-3i16).to_le_bytes());
        bytes.extend_from_slice(&7i16.to_le_bytes());

        let stack = MrcStack::from_bytes(&bytes).expect("decode");
        let frame = stack.into_single_frame().expect("single");
        assert_eq!(frame[[0, 0]], -3.0);
        assert_eq!(frame[[0, 1]], 7.0);
    }

    #[test]
    fn test_truncated_data_fails() {
        let mut bytes = mrc_bytes(&[ramp(4, 4, 0.0)], 0);
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(MrcStack::from_bytes(&bytes), Err(CryoError::Mrc(_))));
    }

    #[test]
    fn test_oversized_dimensions_fail() {
        let mut bytes = mrc_bytes(&[ramp(1, 1, 0.0)], 0);
        bytes.truncate(HEADER_LEN);
        for offset in [0, 4, 8] {
            bytes[offset..offset + 4].copy_from_slice(&i32::MAX.to_le_bytes());
        }
        let header = MrcHeader::parse(&bytes).expect("parse");
        assert_eq!(header.data_len(), None);
        assert!(matches!(MrcStack::from_bytes(&bytes), Err(CryoError::Mrc(_))));
    }

    #[test]
    fn test_unsupported_mode_fails() {
        let mut bytes = mrc_bytes(&[ramp(2, 2, 0.0)], 0);
        bytes[12..16].copy_from_slice(&4i32.to_le_bytes());
        assert!(MrcStack::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_multi_frame_is_not_single() {
        let stack = MrcStack::from_bytes(&mrc_bytes(&[ramp(2, 2, 0.0), ramp(2, 2, 1.0)], 0))
            .expect("decode");
        assert!(stack.into_single_frame().is_err());
    }

    #[test]
    fn test_open_from_disk() {
        let file = write_mrc(&[ramp(5, 6, 0.0)], ".mrc");
        let stack = MrcStack::open(file.path()).expect("open");
        assert_eq!(stack.into_frames()[0].dim(), (5, 6));
    }
}
