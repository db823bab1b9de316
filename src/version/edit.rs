//! Metadata-log edit records and their binary codec.
//!
//! Each record payload is a batch of tagged edits: one tag byte, then
//! little-endian integers and length-prefixed byte strings.

use super::VersionError;
use crate::protocol::FileMeta;

/// One metadata-log operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionEdit {
    /// First file number the job may allocate.
    NextFileNumber(u64),
    /// Last sequence number visible to the job.
    LastSequence(u64),
    /// Declare the job's single column family.
    ColumnFamily {
        /// Family identifier.
        id: u32,
        /// Family name.
        name: String,
    },
    /// Place one file on a level of the declared family.
    AddFile {
        /// Level the file lives on.
        level: u32,
        /// Full file descriptor.
        file: FileMeta,
    },
}

const TAG_NEXT_FILE_NUMBER: u8 = 1;
const TAG_LAST_SEQUENCE: u8 = 2;
const TAG_COLUMN_FAMILY: u8 = 3;
const TAG_ADD_FILE: u8 = 4;

impl VersionEdit {
    /// Serialize into the record payload buffer.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            VersionEdit::NextFileNumber(number) => {
                buf.push(TAG_NEXT_FILE_NUMBER);
                buf.extend_from_slice(&number.to_le_bytes());
            }
            VersionEdit::LastSequence(sequence) => {
                buf.push(TAG_LAST_SEQUENCE);
                buf.extend_from_slice(&sequence.to_le_bytes());
            }
            VersionEdit::ColumnFamily { id, name } => {
                buf.push(TAG_COLUMN_FAMILY);
                buf.extend_from_slice(&id.to_le_bytes());
                put_bytes(buf, name.as_bytes());
            }
            VersionEdit::AddFile { level, file } => {
                buf.push(TAG_ADD_FILE);
                buf.extend_from_slice(&level.to_le_bytes());
                buf.extend_from_slice(&file.number.to_le_bytes());
                buf.extend_from_slice(&file.file_size.to_le_bytes());
                put_bytes(buf, &file.smallest_key);
                put_bytes(buf, &file.largest_key);
                buf.extend_from_slice(&file.smallest_seqno.to_le_bytes());
                buf.extend_from_slice(&file.largest_seqno.to_le_bytes());
            }
        }
    }

    /// Parse one edit from the payload, returning the remaining bytes.
    pub fn decode_from(bytes: &[u8]) -> Result<(Self, &[u8]), VersionError> {
        let (tag, bytes) = take_u8(bytes)?;
        Ok(match tag {
            TAG_NEXT_FILE_NUMBER => {
                let (number, rest) = take_u64(bytes)?;
                (VersionEdit::NextFileNumber(number), rest)
            }
            TAG_LAST_SEQUENCE => {
                let (sequence, rest) = take_u64(bytes)?;
                (VersionEdit::LastSequence(sequence), rest)
            }
            TAG_COLUMN_FAMILY => {
                let (id, rest) = take_u32(bytes)?;
                let (name, rest) = take_bytes(rest)?;
                let name = String::from_utf8(name)
                    .map_err(|_| VersionError::Corrupt("column family name is not utf-8"))?;
                (VersionEdit::ColumnFamily { id, name }, rest)
            }
            TAG_ADD_FILE => {
                let (level, rest) = take_u32(bytes)?;
                let (number, rest) = take_u64(rest)?;
                let (file_size, rest) = take_u64(rest)?;
                let (smallest_key, rest) = take_bytes(rest)?;
                let (largest_key, rest) = take_bytes(rest)?;
                let (smallest_seqno, rest) = take_u64(rest)?;
                let (largest_seqno, rest) = take_u64(rest)?;
                (
                    VersionEdit::AddFile {
                        level,
                        file: FileMeta {
                            number,
                            file_size,
                            smallest_key,
                            largest_key,
                            smallest_seqno,
                            largest_seqno,
                        },
                    },
                    rest,
                )
            }
            _ => return Err(VersionError::Corrupt("unknown edit tag")),
        })
    }

    /// Decode a full record payload into its edit batch.
    pub fn decode_batch(mut bytes: &[u8]) -> Result<Vec<Self>, VersionError> {
        let mut edits = Vec::new();
        while !bytes.is_empty() {
            let (edit, rest) = Self::decode_from(bytes)?;
            edits.push(edit);
            bytes = rest;
        }
        Ok(edits)
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn take(bytes: &[u8], n: usize) -> Result<(&[u8], &[u8]), VersionError> {
    if bytes.len() < n {
        return Err(VersionError::Corrupt("edit payload truncated"));
    }
    Ok(bytes.split_at(n))
}

fn take_u8(bytes: &[u8]) -> Result<(u8, &[u8]), VersionError> {
    let (head, rest) = take(bytes, 1)?;
    Ok((head[0], rest))
}

fn take_u32(bytes: &[u8]) -> Result<(u32, &[u8]), VersionError> {
    let (head, rest) = take(bytes, 4)?;
    Ok((u32::from_le_bytes(head.try_into().expect("4 bytes")), rest))
}

fn take_u64(bytes: &[u8]) -> Result<(u64, &[u8]), VersionError> {
    let (head, rest) = take(bytes, 8)?;
    Ok((u64::from_le_bytes(head.try_into().expect("8 bytes")), rest))
}

fn take_bytes(bytes: &[u8]) -> Result<(Vec<u8>, &[u8]), VersionError> {
    let (len, rest) = take_u32(bytes)?;
    let (body, rest) = take(rest, len as usize)?;
    Ok((body.to_vec(), rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::sample_file;

    #[test]
    fn encode_and_decode_batch() {
        let edits = vec![
            VersionEdit::NextFileNumber(42),
            VersionEdit::LastSequence(9000),
            VersionEdit::ColumnFamily {
                id: 4,
                name: "default".to_string(),
            },
            VersionEdit::AddFile {
                level: 0,
                file: sample_file(11),
            },
            VersionEdit::AddFile {
                level: 3,
                file: sample_file(12),
            },
        ];

        let mut payload = Vec::new();
        for edit in &edits {
            edit.encode_into(&mut payload);
        }

        let decoded = VersionEdit::decode_batch(&payload).unwrap();
        assert_eq!(decoded, edits);
    }

    #[test]
    fn truncated_payload_is_corrupt() {
        let mut payload = Vec::new();
        VersionEdit::NextFileNumber(1).encode_into(&mut payload);
        payload.truncate(payload.len() - 1);
        assert!(matches!(
            VersionEdit::decode_batch(&payload),
            Err(VersionError::Corrupt(_))
        ));
    }

    #[test]
    fn unknown_tag_is_corrupt() {
        assert!(matches!(
            VersionEdit::decode_batch(&[0xee]),
            Err(VersionError::Corrupt("unknown edit tag"))
        ));
    }
}
