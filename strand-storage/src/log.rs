//! Log file I/O for the append-only store
//!
//! The file is a sequence of length-delimited `LogRecord` messages.
//! LogRecord = { hash: blake3(fragment_bytes), fragment_bytes: LogFragment }

use crate::error::StoreError;
use prost::Message;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use strand_model::proto::{LogFragment, LogRecord};

/// Largest fragment accepted when reading.
pub const MAX_FRAGMENT_SIZE: usize = 64 * 1024 * 1024;

/// Append one fragment and sync it to disk.
pub fn append_fragment(file: &mut File, fragment: &LogFragment) -> Result<(), StoreError> {
    let fragment_bytes = fragment.encode_to_vec();
    if fragment_bytes.len() > MAX_FRAGMENT_SIZE {
        return Err(StoreError::FragmentTooLarge(fragment_bytes.len()));
    }

    let hash: [u8; 32] = blake3::hash(&fragment_bytes).into();
    let record = LogRecord {
        hash: hash.to_vec(),
        fragment_bytes,
    };

    let buf = record.encode_length_delimited_to_vec();
    file.write_all(&buf)?;
    file.flush()?;
    file.sync_all()?;
    Ok(())
}

/// Iterator over the fragments of a log file.
pub struct LogReader<R> {
    reader: BufReader<R>,
    position: u64,
}

impl<R: Read> LogReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            position: 0,
        }
    }

    /// Byte offset just past the last record read successfully.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl<R: Read> Iterator for LogReader<R> {
    type Item = Result<LogFragment, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        match read_one_record(&mut self.reader) {
            Ok(Some((fragment, consumed))) => {
                self.position += consumed;
                Some(Ok(fragment))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Read a single record, verifying its hash, along with the number of
/// bytes it took up. `Ok(None)` at a clean end of file.
fn read_one_record<R: Read>(reader: &mut R) -> Result<Option<(LogFragment, u64)>, StoreError> {
    let Some((record_bytes, prefix_len)) = read_length_delimited_bytes(reader)? else {
        return Ok(None);
    };
    let consumed = (prefix_len + record_bytes.len()) as u64;

    let record = LogRecord::decode(&record_bytes[..])?;

    let computed_hash: [u8; 32] = blake3::hash(&record.fragment_bytes).into();
    if record.hash.as_slice() != computed_hash.as_slice() {
        return Err(StoreError::HashMismatch);
    }

    Ok(Some((LogFragment::decode(&record.fragment_bytes[..])?, consumed)))
}

/// Payload of one length-delimited message and the size of its prefix.
fn read_length_delimited_bytes<R: Read>(reader: &mut R) -> Result<Option<(Vec<u8>, usize)>, StoreError> {
    // Varint length prefix
    let mut prefix_buf = Vec::with_capacity(10);
    let mut byte = [0u8; 1];

    loop {
        match reader.read_exact(&mut byte) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof && prefix_buf.is_empty() => {
                return Ok(None)
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(StoreError::UnexpectedEof),
            Err(e) => return Err(e.into()),
        }
        prefix_buf.push(byte[0]);

        if byte[0] & 0x80 == 0 {
            break;
        }
        if prefix_buf.len() >= 10 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "varint too long").into());
        }
    }

    let len = prost::decode_length_delimiter(&prefix_buf[..])?;
    if len > MAX_FRAGMENT_SIZE {
        return Err(StoreError::FragmentTooLarge(len));
    }

    let mut data_buf = vec![0u8; len];
    reader.read_exact(&mut data_buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            StoreError::UnexpectedEof
        } else {
            e.into()
        }
    })?;

    Ok(Some((data_buf, prefix_buf.len())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::{Seek, SeekFrom};
    use strand_model::proto::ClaimedChain;

    fn fragment(n: u8) -> LogFragment {
        LogFragment {
            bundles: vec![vec![n; 3]],
            claims: vec![ClaimedChain { medallion: n as i64, chain_start: 10 }],
        }
    }

    fn open(path: &std::path::Path) -> File {
        OpenOptions::new().create(true).append(true).read(true).open(path).unwrap()
    }

    #[test]
    fn test_append_and_read_fragments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strand.log");
        let mut file = open(&path);
        for n in 1..=3 {
            append_fragment(&mut file, &fragment(n)).unwrap();
        }

        let fragments: Vec<_> = LogReader::new(File::open(&path).unwrap())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(fragments, vec![fragment(1), fragment(2), fragment(3)]);
    }

    #[test]
    fn test_empty_file_has_no_fragments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strand.log");
        open(&path);
        assert_eq!(LogReader::new(File::open(&path).unwrap()).count(), 0);
    }

    #[test]
    fn test_corrupted_fragment_fails_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strand.log");
        let mut file = open(&path);
        append_fragment(&mut file, &fragment(7)).unwrap();

        // Flip the last byte, which lies inside the fragment payload.
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        std::fs::write(&path, &bytes).unwrap();

        let mut reader = LogReader::new(File::open(&path).unwrap());
        assert!(matches!(reader.next(), Some(Err(StoreError::HashMismatch))));
    }

    #[test]
    fn test_truncated_log_is_unexpected_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strand.log");
        let mut file = open(&path);
        append_fragment(&mut file, &fragment(1)).unwrap();
        append_fragment(&mut file, &fragment(2)).unwrap();

        let len = file.seek(SeekFrom::End(0)).unwrap();
        file.set_len(len - 4).unwrap();

        let mut reader = LogReader::new(File::open(&path).unwrap());
        assert!(reader.next().unwrap().is_ok());
        let first_end = reader.position();
        assert!(first_end > 0 && first_end < len - 4);
        assert!(matches!(reader.next(), Some(Err(StoreError::UnexpectedEof))));
        assert_eq!(reader.position(), first_end);
    }

    #[test]
    fn test_position_tracks_record_ends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strand.log");
        let mut file = open(&path);
        append_fragment(&mut file, &fragment(1)).unwrap();
        let after_one = std::fs::metadata(&path).unwrap().len();
        append_fragment(&mut file, &fragment(2)).unwrap();
        let after_two = std::fs::metadata(&path).unwrap().len();

        let mut reader = LogReader::new(File::open(&path).unwrap());
        assert_eq!(reader.position(), 0);
        reader.next().unwrap().unwrap();
        assert_eq!(reader.position(), after_one);
        reader.next().unwrap().unwrap();
        assert_eq!(reader.position(), after_two);
        assert!(reader.next().is_none());
    }
}
