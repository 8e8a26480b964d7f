//! NIfTI-1 volume I/O (`.nii` and `.nii.gz`).
//!
//! Decodes single-file NIfTI-1 volumes into [`Volume`] values: the scalar
//! array (converted to f32, with scl slope/intercept applied) plus the
//! voxel-index to world affine. The affine is taken from the sform when
//! present, the qform otherwise, and falls back to a pixdim-scaled identity.
//!
//! Only 3-D volumes are accepted; trailing singleton dimensions are tolerated
//! since many tools write masks as 4-D with one timepoint.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use nalgebra::Matrix4;
use tracing::{debug, info, warn};

use crate::error::{SurfError, SurfResult};
use crate::types::Volume;

const HEADER_SIZE: usize = 348;
/// Data offset written by this crate: header + 4-byte extension flag.
const DATA_OFFSET: u64 = 352;

// NIfTI-1 datatype codes.
const DT_UINT8: i16 = 2;
const DT_INT16: i16 = 4;
const DT_INT32: i16 = 8;
const DT_FLOAT32: i16 = 16;
const DT_FLOAT64: i16 = 64;
const DT_INT8: i16 = 256;
const DT_UINT16: i16 = 512;
const DT_UINT32: i16 = 768;

fn bytes_per_voxel(datatype: i16) -> Option<usize> {
    match datatype {
        DT_UINT8 | DT_INT8 => Some(1),
        DT_INT16 | DT_UINT16 => Some(2),
        DT_INT32 | DT_UINT32 | DT_FLOAT32 => Some(4),
        DT_FLOAT64 => Some(8),
        _ => None,
    }
}

/// Load a NIfTI-1 volume, transparently decompressing `.gz` files.
pub fn load_volume(path: &Path) -> SurfResult<Volume> {
    let file = File::open(path).map_err(|e| SurfError::volume_read(path, e))?;
    let mut reader: Box<dyn Read> = if is_gzipped(path) {
        Box::new(MultiGzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut header = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut header)
        .map_err(|e| SurfError::volume_read(path, e))?;

    // sizeof_hdr doubles as the endianness probe.
    let volume = match LittleEndian::read_i32(&header[0..4]) {
        348 => parse_volume::<LittleEndian>(path, &header, &mut reader)?,
        _ if BigEndian::read_i32(&header[0..4]) == 348 => {
            parse_volume::<BigEndian>(path, &header, &mut reader)?
        }
        other => {
            return Err(SurfError::volume_parse(
                path,
                format!("not a NIfTI-1 file (sizeof_hdr = {})", other),
            ))
        }
    };

    if let Some((min, max)) = volume.min_max() {
        debug!(
            dims = ?volume.dims,
            min,
            max,
            "Loaded volume from {:?}",
            path
        );
    }

    Ok(volume)
}

fn is_gzipped(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

fn parse_volume<B: ByteOrder>(
    path: &Path,
    header: &[u8; HEADER_SIZE],
    reader: &mut dyn Read,
) -> SurfResult<Volume> {
    let magic = &header[344..348];
    if magic == b"ni1\0" {
        return Err(SurfError::volume_parse(
            path,
            "detached header/image pairs (.hdr/.img) are not supported",
        ));
    }
    if magic != b"n+1\0" {
        return Err(SurfError::volume_parse(path, "missing NIfTI-1 magic"));
    }

    let ndim = B::read_i16(&header[40..42]);
    if !(1..=7).contains(&ndim) {
        return Err(SurfError::volume_parse(
            path,
            format!("invalid dimension count {}", ndim),
        ));
    }
    let mut dim = [1usize; 7];
    for (i, d) in dim.iter_mut().enumerate().take(ndim as usize) {
        let v = B::read_i16(&header[42 + 2 * i..44 + 2 * i]);
        if v < 1 {
            return Err(SurfError::volume_parse(
                path,
                format!("invalid size {} for dimension {}", v, i + 1),
            ));
        }
        *d = v as usize;
    }
    if ndim < 3 || dim[3..].iter().any(|&d| d != 1) {
        return Err(SurfError::volume_parse(
            path,
            format!(
                "only 3-D volumes are supported, got shape {:?}",
                &dim[..ndim as usize]
            ),
        ));
    }
    let dims = [dim[0], dim[1], dim[2]];

    let datatype = B::read_i16(&header[70..72]);
    let voxel_bytes = bytes_per_voxel(datatype).ok_or(SurfError::UnsupportedDataType {
        path: path.to_path_buf(),
        code: datatype,
    })?;

    let vox_offset = B::read_f32(&header[108..112]);
    if vox_offset < HEADER_SIZE as f32 {
        return Err(SurfError::volume_parse(
            path,
            format!("invalid vox_offset {}", vox_offset),
        ));
    }
    // The stream may be gzip-compressed, so skip rather than seek.
    let skip = vox_offset as u64 - HEADER_SIZE as u64;
    io::copy(&mut (&mut *reader).take(skip), &mut io::sink())
        .map_err(|e| SurfError::volume_read(path, e))?;

    let count = dims[0] * dims[1] * dims[2];
    let mut raw = vec![0u8; count * voxel_bytes];
    reader
        .read_exact(&mut raw)
        .map_err(|e| SurfError::volume_read(path, e))?;

    let mut data = decode_scalars::<B>(datatype, &raw, count);

    let slope = B::read_f32(&header[112..116]);
    let inter = B::read_f32(&header[116..120]);
    if slope != 0.0 && (slope != 1.0 || inter != 0.0) {
        for v in &mut data {
            *v = *v * slope + inter;
        }
    }

    let affine = read_affine::<B>(path, header);

    Volume::new(dims, data, affine)
}

fn decode_scalars<B: ByteOrder>(datatype: i16, raw: &[u8], count: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(count);
    match datatype {
        DT_UINT8 => data.extend(raw.iter().map(|&v| v as f32)),
        DT_INT8 => data.extend(raw.iter().map(|&v| v as i8 as f32)),
        DT_INT16 => {
            data.extend(raw.chunks_exact(2).map(|c| B::read_i16(c) as f32));
        }
        DT_UINT16 => {
            data.extend(raw.chunks_exact(2).map(|c| B::read_u16(c) as f32));
        }
        DT_INT32 => {
            data.extend(raw.chunks_exact(4).map(|c| B::read_i32(c) as f32));
        }
        DT_UINT32 => {
            data.extend(raw.chunks_exact(4).map(|c| B::read_u32(c) as f32));
        }
        DT_FLOAT32 => {
            data.extend(raw.chunks_exact(4).map(B::read_f32));
        }
        DT_FLOAT64 => {
            data.extend(raw.chunks_exact(8).map(|c| B::read_f64(c) as f32));
        }
        _ => unreachable!("datatype checked by bytes_per_voxel"),
    }
    data
}

/// Pick the affine the way nibabel does: sform, then qform, then pixdim.
fn read_affine<B: ByteOrder>(path: &Path, header: &[u8; HEADER_SIZE]) -> Matrix4<f64> {
    let sform_code = B::read_i16(&header[254..256]);
    let qform_code = B::read_i16(&header[252..254]);

    if sform_code > 0 {
        let mut m = Matrix4::identity();
        for row in 0..3 {
            let base = 280 + row * 16;
            for col in 0..4 {
                m[(row, col)] = B::read_f32(&header[base + col * 4..base + col * 4 + 4]) as f64;
            }
        }
        return m;
    }

    let pixdim: Vec<f64> = (0..4)
        .map(|i| B::read_f32(&header[76 + i * 4..80 + i * 4]) as f64)
        .collect();

    if qform_code > 0 {
        let b = B::read_f32(&header[256..260]) as f64;
        let c = B::read_f32(&header[260..264]) as f64;
        let d = B::read_f32(&header[264..268]) as f64;
        let a = (1.0 - b * b - c * c - d * d).max(0.0).sqrt();
        let qfac = if pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let (sx, sy, sz) = (pixdim[1].abs(), pixdim[2].abs(), qfac * pixdim[3].abs());

        let mut m = Matrix4::identity();
        m[(0, 0)] = (a * a + b * b - c * c - d * d) * sx;
        m[(0, 1)] = 2.0 * (b * c - a * d) * sy;
        m[(0, 2)] = 2.0 * (b * d + a * c) * sz;
        m[(1, 0)] = 2.0 * (b * c + a * d) * sx;
        m[(1, 1)] = (a * a + c * c - b * b - d * d) * sy;
        m[(1, 2)] = 2.0 * (c * d - a * b) * sz;
        m[(2, 0)] = 2.0 * (b * d - a * c) * sx;
        m[(2, 1)] = 2.0 * (c * d + a * b) * sy;
        m[(2, 2)] = (a * a + d * d - b * b - c * c) * sz;
        m[(0, 3)] = B::read_f32(&header[268..272]) as f64;
        m[(1, 3)] = B::read_f32(&header[272..276]) as f64;
        m[(2, 3)] = B::read_f32(&header[276..280]) as f64;
        return m;
    }

    warn!(
        "Volume {:?} carries neither sform nor qform; using pixdim scaling only",
        path
    );
    let mut m = Matrix4::identity();
    for i in 0..3 {
        let p = pixdim[i + 1].abs();
        m[(i, i)] = if p > 0.0 { p } else { 1.0 };
    }
    m
}

/// Save a volume as single-file NIfTI-1 (float32, little-endian).
///
/// The affine is stored as the sform. Used by tests and tooling; the
/// extraction pipeline itself only reads volumes.
pub fn save_volume(volume: &Volume, path: &Path) -> SurfResult<()> {
    let mut header = [0u8; HEADER_SIZE];
    LittleEndian::write_i32(&mut header[0..4], 348);
    LittleEndian::write_i16(&mut header[40..42], 3);
    for (i, &d) in volume.dims.iter().enumerate() {
        LittleEndian::write_i16(&mut header[42 + 2 * i..44 + 2 * i], d as i16);
    }
    LittleEndian::write_i16(&mut header[70..72], DT_FLOAT32);
    LittleEndian::write_i16(&mut header[72..74], 32); // bitpix
    // pixdim from the affine's column lengths
    LittleEndian::write_f32(&mut header[76..80], 1.0);
    for i in 0..3 {
        let len = (volume.affine[(0, i)].powi(2)
            + volume.affine[(1, i)].powi(2)
            + volume.affine[(2, i)].powi(2))
        .sqrt();
        LittleEndian::write_f32(&mut header[80 + i * 4..84 + i * 4], len as f32);
    }
    LittleEndian::write_f32(&mut header[108..112], DATA_OFFSET as f32);
    LittleEndian::write_f32(&mut header[112..116], 1.0); // scl_slope
    LittleEndian::write_i16(&mut header[254..256], 1); // sform_code
    for row in 0..3 {
        let base = 280 + row * 16;
        for col in 0..4 {
            LittleEndian::write_f32(
                &mut header[base + col * 4..base + col * 4 + 4],
                volume.affine[(row, col)] as f32,
            );
        }
    }
    header[344..348].copy_from_slice(b"n+1\0");

    let file = File::create(path).map_err(|e| SurfError::io_write(path, e))?;
    let mut writer: Box<dyn Write> = if is_gzipped(path) {
        Box::new(GzEncoder::new(BufWriter::new(file), Compression::default()))
    } else {
        Box::new(BufWriter::new(file))
    };

    let write = |w: &mut dyn Write, buf: &[u8]| -> SurfResult<()> {
        w.write_all(buf).map_err(|e| SurfError::io_write(path, e))
    };
    write(&mut *writer, &header)?;
    write(&mut *writer, &[0u8; 4])?; // no extensions
    let mut buf = [0u8; 4];
    for &v in &volume.data {
        LittleEndian::write_f32(&mut buf, v);
        write(&mut *writer, &buf)?;
    }
    writer.flush().map_err(|e| SurfError::io_write(path, e))?;
    // Dropping the writer finishes the gzip stream when compressing.
    drop(writer);

    info!(dims = ?volume.dims, "Saved volume to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_volume() -> Volume {
        let dims = [3, 4, 5];
        let data: Vec<f32> = (0..60).map(|i| i as f32 * 0.5).collect();
        let mut affine = Matrix4::identity();
        affine[(0, 0)] = 2.0;
        affine[(1, 1)] = 2.0;
        affine[(2, 2)] = 2.0;
        affine[(0, 3)] = -10.0;
        affine[(1, 3)] = 5.5;
        affine[(2, 3)] = 0.25;
        Volume::new(dims, data, affine).unwrap()
    }

    #[test]
    fn test_roundtrip_nii() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vol.nii");
        let original = sample_volume();
        save_volume(&original, &path).unwrap();

        let loaded = load_volume(&path).unwrap();
        assert_eq!(loaded.dims, original.dims);
        assert_eq!(loaded.data, original.data);
        for row in 0..4 {
            for col in 0..4 {
                assert!((loaded.affine[(row, col)] - original.affine[(row, col)]).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_roundtrip_gzipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vol.nii.gz");
        let original = sample_volume();
        save_volume(&original, &path).unwrap();

        let loaded = load_volume(&path).unwrap();
        assert_eq!(loaded.dims, original.dims);
        assert_eq!(loaded.data, original.data);
    }

    #[test]
    fn test_uint8_with_scaling() {
        // Hand-built header: 2x2x1 uint8 volume with scl_slope/inter set.
        let mut header = [0u8; HEADER_SIZE];
        LittleEndian::write_i32(&mut header[0..4], 348);
        LittleEndian::write_i16(&mut header[40..42], 3);
        LittleEndian::write_i16(&mut header[42..44], 2);
        LittleEndian::write_i16(&mut header[44..46], 2);
        LittleEndian::write_i16(&mut header[46..48], 1);
        LittleEndian::write_i16(&mut header[70..72], DT_UINT8);
        LittleEndian::write_i16(&mut header[72..74], 8);
        LittleEndian::write_f32(&mut header[108..112], 352.0);
        LittleEndian::write_f32(&mut header[112..116], 2.0);
        LittleEndian::write_f32(&mut header[116..120], -1.0);
        header[344..348].copy_from_slice(b"n+1\0");

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mask.nii");
        let mut bytes = header.to_vec();
        bytes.extend_from_slice(&[0u8; 4]);
        bytes.extend_from_slice(&[0, 1, 2, 3]);
        std::fs::write(&path, bytes).unwrap();

        let vol = load_volume(&path).unwrap();
        assert_eq!(vol.dims, [2, 2, 1]);
        assert_eq!(vol.data, vec![-1.0, 1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.nii");
        std::fs::write(&path, vec![0u8; 1024]).unwrap();
        let err = load_volume(&path).unwrap_err();
        assert!(matches!(err, SurfError::VolumeParse { .. }));
    }

    #[test]
    fn test_rejects_unsupported_datatype() {
        let mut header = [0u8; HEADER_SIZE];
        LittleEndian::write_i32(&mut header[0..4], 348);
        LittleEndian::write_i16(&mut header[40..42], 3);
        for i in 0..3 {
            LittleEndian::write_i16(&mut header[42 + 2 * i..44 + 2 * i], 1);
        }
        LittleEndian::write_i16(&mut header[70..72], 128); // RGB24, unsupported
        LittleEndian::write_f32(&mut header[108..112], 352.0);
        header[344..348].copy_from_slice(b"n+1\0");

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rgb.nii");
        let mut bytes = header.to_vec();
        bytes.extend_from_slice(&[0u8; 4 + 3]);
        std::fs::write(&path, bytes).unwrap();

        let err = load_volume(&path).unwrap_err();
        assert!(matches!(err, SurfError::UnsupportedDataType { code: 128, .. }));
    }
}
