use super::types::{FsyncMode, Result, StorageConfig, StorageError, WALEntry};
use crate::core::MutationRecord;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info, warn};

/// Bytes of framing before each entry: size (u64) + checksum (u32)
const ENTRY_HEADER_SIZE: u64 = 12;

/// Largest payload an entry can hold: a maximal key and value plus encoding overhead
const MAX_ENTRY_SIZE: u64 = 2 * crate::protocol::MAX_BULK_SIZE as u64 + 1024;

/// Result of reading one framed entry
enum ReadOutcome {
    Entry(WALEntry, u64),
    /// Clean end of file
    End,
    /// Partial entry at the end of the file
    Torn,
}

/// Append-only log of mutation records.
///
/// Entry format:
/// - size (u64, big endian)
/// - crc32 of the payload (u32, big endian)
/// - payload (bincode-encoded [`WALEntry`])
pub struct WriteAheadLog {
    file: BufWriter<File>,
    path: PathBuf,
    next_offset: u64,
    fsync_mode: FsyncMode,
    fsync_interval: Duration,
    last_fsync: Instant,
}

impl WriteAheadLog {
    /// Create or open a WAL file.
    ///
    /// Scans existing entries to find the next offset and cuts off a torn
    /// trailing entry left by a crash mid-write.
    pub async fn open(path: impl AsRef<Path>, config: &StorageConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .await?;

        let (next_offset, valid_len) = Self::scan(&path).await?;
        let file_len = file.metadata().await?.len();
        if valid_len < file_len {
            warn!(
                "Truncating torn WAL tail at {:?}: {} -> {} bytes",
                path, file_len, valid_len
            );
            file.set_len(valid_len).await?;
        }

        info!("WAL opened at {:?}, next offset: {}", path, next_offset);

        Ok(Self {
            file: BufWriter::new(file),
            path,
            next_offset,
            fsync_mode: config.fsync_mode,
            fsync_interval: Duration::from_millis(config.fsync_interval_ms),
            last_fsync: Instant::now(),
        })
    }

    /// Returns (next offset, length of the valid prefix)
    async fn scan(path: &Path) -> Result<(u64, u64)> {
        let mut reader = BufReader::new(File::open(path).await?);
        let mut next_offset = 0u64;
        let mut valid_len = 0u64;

        loop {
            match Self::read_entry(&mut reader).await? {
                ReadOutcome::Entry(entry, size) => {
                    next_offset = next_offset.max(entry.offset + 1);
                    valid_len += size;
                }
                ReadOutcome::End => break,
                ReadOutcome::Torn => {
                    warn!("Incomplete WAL entry detected at byte {}", valid_len);
                    break;
                }
            }
        }

        Ok((next_offset, valid_len))
    }

    async fn read_entry(reader: &mut BufReader<File>) -> Result<ReadOutcome> {
        let size = match reader.read_u64().await {
            Ok(s) => s,
            // A partial size field also lands here; `scan` catches it by length
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(ReadOutcome::End);
            }
            Err(e) => return Err(e.into()),
        };

        let expected = match reader.read_u32().await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(ReadOutcome::Torn);
            }
            Err(e) => return Err(e.into()),
        };

        if size > MAX_ENTRY_SIZE {
            return Err(StorageError::WALCorrupted {
                offset: 0,
                reason: format!("entry size {} exceeds {}", size, MAX_ENTRY_SIZE),
            });
        }

        let mut data = vec![0u8; size as usize];
        if let Err(e) = reader.read_exact(&mut data).await {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                return Ok(ReadOutcome::Torn);
            }
            return Err(e.into());
        }

        let actual = crc32fast::hash(&data);
        if actual != expected {
            return Err(StorageError::ChecksumMismatch { expected, actual });
        }

        let (entry, _): (WALEntry, usize) =
            bincode::serde::decode_from_slice(&data, bincode::config::standard()).map_err(
                |e| StorageError::WALCorrupted {
                    offset: 0,
                    reason: e.to_string(),
                },
            )?;

        Ok(ReadOutcome::Entry(entry, ENTRY_HEADER_SIZE + size))
    }

    /// Replay every entry with `offset >= from_offset`
    pub async fn replay(&self, from_offset: u64) -> Result<Vec<WALEntry>> {
        let mut reader = BufReader::new(File::open(&self.path).await?);
        let mut entries = Vec::new();

        debug!("Replaying WAL from offset {}", from_offset);

        loop {
            match Self::read_entry(&mut reader).await? {
                ReadOutcome::Entry(entry, _) => {
                    if entry.offset >= from_offset {
                        entries.push(entry);
                    }
                }
                ReadOutcome::End | ReadOutcome::Torn => break,
            }
        }

        info!("Replayed {} WAL entries", entries.len());
        Ok(entries)
    }

    /// Append a record, returning its offset
    pub async fn append(&mut self, record: MutationRecord) -> Result<u64> {
        let offset = self.next_offset;
        let entry = WALEntry {
            offset,
            timestamp: current_timestamp(),
            record,
        };

        let data = bincode::serde::encode_to_vec(&entry, bincode::config::standard())?;
        Self::write_entry(&mut self.file, &data).await?;
        self.next_offset += 1;

        debug!("WAL append: offset={}, size={}", offset, data.len());

        match self.fsync_mode {
            FsyncMode::Always => self.flush().await?,
            FsyncMode::Periodic => {
                if self.last_fsync.elapsed() >= self.fsync_interval {
                    self.flush().await?;
                    self.last_fsync = Instant::now();
                } else {
                    self.file.flush().await?;
                }
            }
            FsyncMode::Never => self.file.flush().await?,
        }

        Ok(offset)
    }

    async fn write_entry(file: &mut BufWriter<File>, data: &[u8]) -> Result<()> {
        file.write_u64(data.len() as u64).await?;
        file.write_u32(crc32fast::hash(data)).await?;
        file.write_all(data).await?;
        Ok(())
    }

    /// Replace the log with `records`, renumbered from zero.
    ///
    /// Written to a sibling file first and renamed over the log.
    pub async fn rewrite(&mut self, records: Vec<MutationRecord>) -> Result<()> {
        let count = records.len();
        info!("Rewriting WAL {:?} with {} records", self.path, count);

        self.file.flush().await?;

        let new_path = self.path.with_extension("wal.new");
        let new_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&new_path)
            .await?;
        let mut writer = BufWriter::new(new_file);

        let timestamp = current_timestamp();
        for (offset, record) in records.into_iter().enumerate() {
            let entry = WALEntry {
                offset: offset as u64,
                timestamp,
                record,
            };
            let data = bincode::serde::encode_to_vec(&entry, bincode::config::standard())?;
            Self::write_entry(&mut writer, &data).await?;
        }

        writer.flush().await?;
        writer.get_ref().sync_all().await?;
        drop(writer);

        tokio::fs::rename(&new_path, &self.path).await?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        self.file = BufWriter::new(file);
        self.next_offset = count as u64;

        info!("WAL rewritten successfully");
        Ok(())
    }

    /// Flush pending writes and fsync
    pub async fn flush(&mut self) -> Result<()> {
        self.file.flush().await?;
        self.file.get_ref().sync_all().await?;
        Ok(())
    }

    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config() -> StorageConfig {
        StorageConfig {
            fsync_mode: FsyncMode::Always,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_append_and_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.wal");

        let mut wal = WriteAheadLog::open(&path, &config()).await.unwrap();
        for i in 0..5 {
            let offset = wal
                .append(MutationRecord::put(format!("key_{}", i), "v"))
                .await
                .unwrap();
            assert_eq!(offset, i);
        }
        wal.append(MutationRecord::delete("key_0")).await.unwrap();

        let entries = wal.replay(0).await.unwrap();
        assert_eq!(entries.len(), 6);
        assert_eq!(entries[5].record, MutationRecord::delete("key_0"));

        let tail = wal.replay(4).await.unwrap();
        assert_eq!(tail.len(), 2);
    }

    #[tokio::test]
    async fn test_reopen_continues_offsets() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.wal");

        {
            let mut wal = WriteAheadLog::open(&path, &config()).await.unwrap();
            wal.append(MutationRecord::put("a", "1")).await.unwrap();
            wal.append(MutationRecord::put("b", "2")).await.unwrap();
        }

        let mut wal = WriteAheadLog::open(&path, &config()).await.unwrap();
        assert_eq!(wal.next_offset(), 2);
        assert_eq!(wal.append(MutationRecord::put("c", "3")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.wal");

        {
            let mut wal = WriteAheadLog::open(&path, &config()).await.unwrap();
            wal.append(MutationRecord::put("a", "1")).await.unwrap();
        }
        let good_len = std::fs::metadata(&path).unwrap().len();

        // Simulate a crash halfway through the next entry
        {
            use std::io::Write;
            let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0, 0, 0, 0, 0, 0, 0, 40, 1, 2]).unwrap();
        }

        let mut wal = WriteAheadLog::open(&path, &config()).await.unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);

        wal.append(MutationRecord::put("b", "2")).await.unwrap();
        let entries = wal.replay(0).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].offset, 1);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.wal");

        {
            let mut wal = WriteAheadLog::open(&path, &config()).await.unwrap();
            wal.append(MutationRecord::put("a", "1")).await.unwrap();
        }

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        let result = WriteAheadLog::open(&path, &config()).await;
        assert!(matches!(
            result,
            Err(StorageError::ChecksumMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_corrupt_size_field_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.wal");

        {
            let mut wal = WriteAheadLog::open(&path, &config()).await.unwrap();
            wal.append(MutationRecord::put("a", "1")).await.unwrap();
        }

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0] = 0xff;
        std::fs::write(&path, bytes).unwrap();

        let result = WriteAheadLog::open(&path, &config()).await;
        assert!(matches!(result, Err(StorageError::WALCorrupted { .. })));
    }

    #[tokio::test]
    async fn test_rewrite_replaces_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.wal");

        let mut wal = WriteAheadLog::open(&path, &config()).await.unwrap();
        for i in 0..10 {
            wal.append(MutationRecord::put("same", format!("v{}", i)))
                .await
                .unwrap();
        }

        wal.rewrite(vec![MutationRecord::put("same", "v9")])
            .await
            .unwrap();
        assert_eq!(wal.next_offset(), 1);

        let entries = wal.replay(0).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].record.value, bytes::Bytes::from("v9"));
    }
}
