//! Append-only record framing for the metadata log.
//!
//! Each record is `len (u32 LE) + crc32 (u32 LE) + payload`; the checksum
//! covers only the payload. Header fields get explicit validation during
//! decode.

use std::path::Path;

use tokio::{fs, io::AsyncWriteExt};

use super::VersionError;

const RECORD_HEADER_SIZE: usize = 8;

/// Appends framed records to a metadata-log file.
#[derive(Debug)]
pub struct Writer {
    file: fs::File,
}

impl Writer {
    /// Create the log file, truncating any previous content.
    pub async fn create(path: &Path) -> Result<Self, VersionError> {
        Ok(Self {
            file: fs::File::create(path).await?,
        })
    }

    /// Append one framed record.
    pub async fn append(&mut self, payload: &[u8]) -> Result<(), VersionError> {
        let mut frame = Vec::with_capacity(RECORD_HEADER_SIZE + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
        frame.extend_from_slice(payload);
        self.file.write_all(&frame).await?;
        Ok(())
    }

    /// Flush and fsync.
    ///
    /// Recovery resolves the current pointer and must find a fully written
    /// log behind it, so the log is made durable before the pointer names
    /// it.
    pub async fn sync(&mut self) -> Result<(), VersionError> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(())
    }
}

/// Reads every record of a metadata log.
#[derive(Debug)]
pub struct Reader {
    raw: Vec<u8>,
    offset: usize,
}

impl Reader {
    /// Load the log file into memory for replay.
    pub async fn open(path: &Path) -> Result<Self, VersionError> {
        Ok(Self {
            raw: fs::read(path).await?,
            offset: 0,
        })
    }

    /// Next record payload, or `None` at end of log.
    pub fn next_record(&mut self) -> Result<Option<&[u8]>, VersionError> {
        if self.offset == self.raw.len() {
            return Ok(None);
        }
        if self.raw.len() - self.offset < RECORD_HEADER_SIZE {
            return Err(VersionError::Corrupt("record header truncated"));
        }
        let header = &self.raw[self.offset..self.offset + RECORD_HEADER_SIZE];
        let len = u32::from_le_bytes(header[..4].try_into().expect("4 bytes")) as usize;
        let crc = u32::from_le_bytes(header[4..].try_into().expect("4 bytes"));
        let start = self.offset + RECORD_HEADER_SIZE;
        if self.raw.len() - start < len {
            return Err(VersionError::Corrupt("record body truncated"));
        }
        let payload = &self.raw[start..start + len];
        if crc32fast::hash(payload) != crc {
            return Err(VersionError::Corrupt("record checksum mismatch"));
        }
        self.offset = start + len;
        Ok(Some(payload))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn write_and_replay_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("MANIFEST-000001");

        let mut writer = Writer::create(&path).await.unwrap();
        writer.append(b"first record").await.unwrap();
        writer.append(b"second").await.unwrap();
        writer.sync().await.unwrap();

        let mut reader = Reader::open(&path).await.unwrap();
        assert_eq!(reader.next_record().unwrap(), Some(&b"first record"[..]));
        assert_eq!(reader.next_record().unwrap(), Some(&b"second"[..]));
        assert_eq!(reader.next_record().unwrap(), None);
    }

    #[tokio::test]
    async fn flipped_payload_byte_fails_checksum() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("MANIFEST-000001");

        let mut writer = Writer::create(&path).await.unwrap();
        writer.append(b"record payload").await.unwrap();
        writer.sync().await.unwrap();

        let mut raw = tokio::fs::read(&path).await.unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        tokio::fs::write(&path, &raw).await.unwrap();

        let mut reader = Reader::open(&path).await.unwrap();
        assert!(matches!(
            reader.next_record(),
            Err(VersionError::Corrupt("record checksum mismatch"))
        ));
    }

    #[tokio::test]
    async fn truncated_log_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("MANIFEST-000001");

        let mut writer = Writer::create(&path).await.unwrap();
        writer.append(b"record payload").await.unwrap();
        writer.sync().await.unwrap();

        let raw = tokio::fs::read(&path).await.unwrap();
        tokio::fs::write(&path, &raw[..raw.len() - 3]).await.unwrap();

        let mut reader = Reader::open(&path).await.unwrap();
        assert!(matches!(
            reader.next_record(),
            Err(VersionError::Corrupt("record body truncated"))
        ));
    }
}
