//! .pws snapshot file format reader/writer.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::snapshot::Snapshot;
use crate::types::{PlotwatchError, PlotwatchResult};

/// Magic bytes: "PWSN"
const PWS_MAGIC: u32 = 0x5057534E;

/// Current format version.
const FORMAT_VERSION: u16 = 1;

/// Header size in bytes.
const HEADER_SIZE: usize = 64;

/// Writer for .pws files.
pub struct SnapshotWriter;

/// Reader for .pws files.
pub struct SnapshotReader;

impl SnapshotWriter {
    /// Write a snapshot to a file, replacing any previous one.
    ///
    /// The bytes go to a sibling temp file first and are renamed over the
    /// target, so a crash mid-write leaves the previous snapshot intact.
    pub fn write_to_file(snapshot: &Snapshot, path: &Path) -> PlotwatchResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = temp_path(path);
        {
            let mut file = std::fs::File::create(&tmp)?;
            Self::write_to(snapshot, &mut file)?;
            file.sync_all()?;
        }
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }

        tracing::debug!(path = %path.display(), run_id = snapshot.run_id(), "Saved snapshot");
        Ok(())
    }

    /// Write a snapshot to any writer.
    pub fn write_to<W: Write>(snapshot: &Snapshot, writer: &mut W) -> PlotwatchResult<()> {
        let payload = serde_json::to_vec(snapshot)
            .map_err(|e| PlotwatchError::Storage(format!("Serialization failed: {e}")))?;

        let mut header = [0u8; HEADER_SIZE];
        write_u32(&mut header[0..4], PWS_MAGIC);
        write_u16(&mut header[4..6], FORMAT_VERSION);
        write_u16(&mut header[6..8], 0); // flags
        write_u64(&mut header[8..16], snapshot.count() as u64);
        write_u64(&mut header[16..24], snapshot.created_at().timestamp().max(0) as u64);
        write_u64(&mut header[24..32], payload.len() as u64);

        writer.write_all(&header)?;
        writer.write_all(&payload)?;

        Ok(())
    }
}

impl SnapshotReader {
    /// Read a snapshot from a file.
    pub fn read_from_file(path: &Path) -> PlotwatchResult<Snapshot> {
        let mut file = std::fs::File::open(path)?;
        Self::read_from(&mut file)
    }

    /// Read a snapshot from any reader.
    pub fn read_from<R: Read>(reader: &mut R) -> PlotwatchResult<Snapshot> {
        let mut header = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header)?;

        let magic = read_u32(&header[0..4]);
        if magic != PWS_MAGIC {
            return Err(PlotwatchError::Storage(format!(
                "Invalid magic: expected 0x{PWS_MAGIC:08X}, got 0x{magic:08X}"
            )));
        }

        let version = read_u16(&header[4..6]);
        if version != FORMAT_VERSION {
            return Err(PlotwatchError::Storage(format!(
                "Unsupported version: {version}"
            )));
        }

        let result_count = read_u64(&header[8..16]);
        let payload_len = read_u64(&header[24..32]);

        // The header length is untrusted: read at most that many bytes and
        // let the buffer grow with what is actually there.
        let mut payload = Vec::new();
        reader.take(payload_len).read_to_end(&mut payload)?;
        if payload.len() as u64 != payload_len {
            return Err(PlotwatchError::Storage(format!(
                "Truncated payload: header says {payload_len} bytes, found {}",
                payload.len()
            )));
        }

        let snapshot: Snapshot = serde_json::from_slice(&payload)
            .map_err(|e| PlotwatchError::Storage(format!("Deserialization failed: {e}")))?;

        if snapshot.count() as u64 != result_count {
            return Err(PlotwatchError::Storage(format!(
                "Header says {result_count} results, payload has {}",
                snapshot.count()
            )));
        }

        Ok(snapshot)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "snapshot.pws".into());
    name.push(format!(".tmp-{}", std::process::id()));
    path.with_file_name(name)
}

// Little-endian byte helpers
fn write_u16(buf: &mut [u8], val: u16) {
    buf[..2].copy_from_slice(&val.to_le_bytes());
}
fn write_u32(buf: &mut [u8], val: u32) {
    buf[..4].copy_from_slice(&val.to_le_bytes());
}
fn write_u64(buf: &mut [u8], val: u64) {
    buf[..8].copy_from_slice(&val.to_le_bytes());
}
fn read_u16(buf: &[u8]) -> u16 {
    u16::from_le_bytes([buf[0], buf[1]])
}
fn read_u32(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}
fn read_u64(buf: &[u8]) -> u64 {
    u64::from_le_bytes([buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineConfig, RunSummary};
    use crate::testing::sample_result;

    fn snapshot(results: usize) -> Snapshot {
        let results = (0..results)
            .map(|i| sample_result(&format!("r{i}"), "p1"))
            .collect();
        Snapshot::new(
            "run-test".to_string(),
            PipelineConfig::default(),
            RunSummary::default(),
            results,
        )
    }

    #[test]
    fn test_roundtrip_with_results() {
        let snap = snapshot(2);
        let mut buf = Vec::new();
        SnapshotWriter::write_to(&snap, &mut buf).unwrap();

        let loaded = SnapshotReader::read_from(&mut &buf[..]).unwrap();
        assert_eq!(loaded, snap);
    }

    #[test]
    fn test_invalid_magic() {
        let buf = [0u8; HEADER_SIZE + 10];
        let result = SnapshotReader::read_from(&mut &buf[..]);
        assert!(matches!(result, Err(PlotwatchError::Storage(_))));
    }

    #[test]
    fn test_truncated_payload() {
        let mut buf = Vec::new();
        SnapshotWriter::write_to(&snapshot(1), &mut buf).unwrap();
        buf.truncate(buf.len() - 5);
        assert!(matches!(
            SnapshotReader::read_from(&mut &buf[..]),
            Err(PlotwatchError::Storage(_))
        ));
    }

    #[test]
    fn test_oversized_payload_length() {
        let mut buf = Vec::new();
        SnapshotWriter::write_to(&snapshot(0), &mut buf).unwrap();
        write_u64(&mut buf[24..32], u64::MAX);

        let err = SnapshotReader::read_from(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, PlotwatchError::Storage(_)));
        assert!(err.to_string().contains("Truncated payload"));
    }

    #[test]
    fn test_short_header_is_io_error() {
        let buf = [0u8; 10];
        assert!(matches!(
            SnapshotReader::read_from(&mut &buf[..]),
            Err(PlotwatchError::Io(_))
        ));
    }

    #[test]
    fn test_roundtrip_non_finite_values() {
        let mut result = sample_result("r0", "p1");
        result.baseline.ndvi = f64::NAN;
        result.delta.ndvi = f64::NAN;
        result.target.ndwi = f64::INFINITY;
        result.delta.ndwi = f64::NEG_INFINITY;
        let snap = Snapshot::new(
            "run-nan".to_string(),
            PipelineConfig::default(),
            RunSummary::default(),
            vec![result],
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.pws");
        SnapshotWriter::write_to_file(&snap, &path).unwrap();
        let loaded = SnapshotReader::read_from_file(&path).unwrap();

        let r = &loaded.results()[0];
        assert!(r.baseline.ndvi.is_nan());
        assert!(r.delta.ndvi.is_nan());
        assert_eq!(r.target.ndwi, f64::INFINITY);
        assert_eq!(r.delta.ndwi, f64::NEG_INFINITY);
        assert_eq!(r.delta.ndbi, snap.results()[0].delta.ndbi);
        assert_eq!(r.vegetation, snap.results()[0].vegetation);
    }

    #[test]
    fn test_file_replace_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snapshot.pws");

        SnapshotWriter::write_to_file(&snapshot(3), &path).unwrap();
        SnapshotWriter::write_to_file(&snapshot(1), &path).unwrap();

        let loaded = SnapshotReader::read_from_file(&path).unwrap();
        assert_eq!(loaded.count(), 1);

        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .flatten()
            .collect();
        assert_eq!(entries.len(), 1);
    }
}
