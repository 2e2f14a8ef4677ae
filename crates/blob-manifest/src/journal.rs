use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use blob_types::{BlobPath, Entry};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ManifestError, ManifestResult};

/// One manifest mutation as persisted in the journal.
///
/// On-disk format:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized JournalRecord)]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalRecord {
    /// Install or replace the entry for `entry.path`.
    Put(Entry),
    /// Drop the entry for `path`.
    Remove { path: BlobPath },
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

struct JournalWriter {
    file: File,
    /// Current end of the valid data.
    offset: u64,
}

/// Append-only, crash-recoverable log of manifest mutations.
///
/// Each append is a single framed record; a record that was torn by a crash
/// fails its length or CRC check on recovery and is dropped. Replaying the
/// surviving records in order rebuilds the manifest.
pub struct ManifestJournal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    /// `fsync` after every append.
    sync_writes: bool,
}

impl ManifestJournal {
    /// Open (or create) the journal file at `path`.
    pub fn open(path: &Path, sync_writes: bool) -> ManifestResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let offset = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(JournalWriter { file, offset }),
            sync_writes,
        })
    }

    /// Append one record. Returns the byte offset it was written at.
    ///
    /// The record is durable when this returns (with `sync_writes`). If the
    /// write fails partway the file is cut back to the previous end so later
    /// appends stay readable.
    pub fn append(&self, record: &JournalRecord) -> ManifestResult<u64> {
        let frame = encode(record)?;

        let mut w = self.writer.lock().expect("journal mutex poisoned");
        let record_offset = w.offset;

        let written = w.file.write_all(&frame).and_then(|()| {
            if self.sync_writes {
                w.file.sync_data()
            } else {
                Ok(())
            }
        });
        if let Err(e) = written {
            if let Err(trim) = w.file.set_len(record_offset) {
                warn!(offset = record_offset, error = %trim, "failed to trim torn journal record");
            }
            return Err(e.into());
        }

        w.offset += frame.len() as u64;
        debug!(offset = record_offset, len = frame.len(), "journal append");
        Ok(record_offset)
    }

    /// Read back every intact record, in append order.
    ///
    /// Records failing the CRC check are skipped; an impossible length or a
    /// truncated tail ends recovery.
    pub fn recover(&self) -> ManifestResult<Vec<JournalRecord>> {
        let file = File::open(&self.path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE as u64 <= file_len {
            let mut header = [0u8; HEADER_SIZE];
            reader.read_exact(&mut header)?;

            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 || offset + HEADER_SIZE as u64 + length as u64 > file_len {
                warn!(offset, length, file_len, "invalid journal record length; stopping recovery");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!(offset, "truncated journal record; stopping recovery");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
            offset += HEADER_SIZE as u64 + length as u64;

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(offset, expected = expected_crc, actual = actual_crc, "CRC mismatch; skipping record");
                continue;
            }

            match bincode::deserialize::<JournalRecord>(&payload) {
                Ok(record) => records.push(record),
                Err(e) => warn!(offset, error = %e, "failed to decode journal record; skipping"),
            }
        }

        debug!(recovered = records.len(), "journal recovery complete");
        Ok(records)
    }

    /// Rewrite the journal as one `Put` per live entry.
    ///
    /// The new file is written beside the old one and renamed over it, so a
    /// crash mid-compaction leaves the previous journal intact.
    pub fn compact<'a>(&self, entries: impl IntoIterator<Item = &'a Entry>) -> ManifestResult<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut w = self.writer.lock().expect("journal mutex poisoned");

        let mut tmp = tempfile::Builder::new()
            .prefix(".journal-")
            .tempfile_in(dir)?;
        let mut count = 0usize;
        {
            let mut out = BufWriter::new(tmp.as_file_mut());
            for entry in entries {
                out.write_all(&encode(&JournalRecord::Put(entry.clone()))?)?;
                count += 1;
            }
            out.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        if self.sync_writes {
            File::open(dir)?.sync_all()?;
        }

        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        w.offset = file.metadata()?.len();
        w.file = file;

        debug!(entries = count, size = w.offset, "journal compacted");
        Ok(())
    }

    /// Current end of the journal in bytes.
    pub fn offset(&self) -> u64 {
        self.writer.lock().expect("journal mutex poisoned").offset
    }

    /// Path to the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn encode(record: &JournalRecord) -> ManifestResult<Vec<u8>> {
    let payload =
        bincode::serialize(record).map_err(|e| ManifestError::Serialization(e.to_string()))?;
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}
