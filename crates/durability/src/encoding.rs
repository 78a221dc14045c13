//! Record encoding with CRC32 checksums
//!
//! ```text
//! +------------+------------+---------------------+
//! | len u32 BE | crc32 u32  | bincode(LogRecord)  |
//! +------------+------------+---------------------+
//! ```
//!
//! The checksum covers the payload only. A record that fails to decode
//! marks the end of the valid log.

use crate::record::LogRecord;
use byteorder::{BigEndian, ByteOrder};
use std::fmt;

/// Size of the record header
pub const RECORD_HEADER_SIZE: usize = 8;

/// Why a record could not be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeFailure {
    /// Not enough bytes for the header or payload
    Truncated,
    /// Checksum does not match
    ChecksumMismatch {
        /// Checksum stored in the header
        expected: u32,
        /// Checksum of the payload read
        actual: u32,
    },
    /// Payload is not a valid record
    Malformed(String),
}

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeFailure::Truncated => write!(f, "truncated record"),
            DecodeFailure::ChecksumMismatch { expected, actual } => write!(
                f,
                "checksum mismatch: expected {:#010x}, got {:#010x}",
                expected, actual
            ),
            DecodeFailure::Malformed(msg) => write!(f, "malformed record: {}", msg),
        }
    }
}

/// Encode a record into its on-disk form
pub fn encode_record(record: &LogRecord) -> Result<Vec<u8>, String> {
    let payload = bincode::serialize(record).map_err(|e| e.to_string())?;
    let len = u32::try_from(payload.len()).map_err(|_| "record too large".to_string())?;

    let mut buf = vec![0u8; RECORD_HEADER_SIZE + payload.len()];
    BigEndian::write_u32(&mut buf[0..4], len);
    BigEndian::write_u32(&mut buf[4..8], crc32fast::hash(&payload));
    buf[RECORD_HEADER_SIZE..].copy_from_slice(&payload);
    Ok(buf)
}

/// Decode the record at the start of `buf`
///
/// Returns the record and the number of bytes consumed.
pub fn decode_record(buf: &[u8]) -> Result<(LogRecord, usize), DecodeFailure> {
    if buf.len() < RECORD_HEADER_SIZE {
        return Err(DecodeFailure::Truncated);
    }
    let len = BigEndian::read_u32(&buf[0..4]) as usize;
    let expected = BigEndian::read_u32(&buf[4..8]);
    let end = RECORD_HEADER_SIZE + len;
    if buf.len() < end {
        return Err(DecodeFailure::Truncated);
    }

    let payload = &buf[RECORD_HEADER_SIZE..end];
    let actual = crc32fast::hash(payload);
    if actual != expected {
        return Err(DecodeFailure::ChecksumMismatch { expected, actual });
    }

    let record = bincode::deserialize(payload).map_err(|e| DecodeFailure::Malformed(e.to_string()))?;
    Ok((record, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtranx_core::{ClientId, NodeAddr, TxnId, Version};

    fn commit_record() -> LogRecord {
        LogRecord::Commit {
            txn_id: TxnId::new(ClientId::new(), 1),
            version: Version::new(12),
            participants: vec![NodeAddr::from("a:1"), NodeAddr::from("b:1")],
        }
    }

    #[test]
    fn test_encode_decode() {
        let record = commit_record();
        let buf = encode_record(&record).unwrap();
        let (decoded, used) = decode_record(&buf).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(used, buf.len());
    }

    #[test]
    fn test_truncated_record() {
        let buf = encode_record(&commit_record()).unwrap();
        assert_eq!(decode_record(&buf[..4]), Err(DecodeFailure::Truncated));
        assert_eq!(
            decode_record(&buf[..buf.len() - 1]),
            Err(DecodeFailure::Truncated)
        );
    }

    #[test]
    fn test_corrupted_payload_detected() {
        let mut buf = encode_record(&commit_record()).unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        assert!(matches!(
            decode_record(&buf),
            Err(DecodeFailure::ChecksumMismatch { .. })
        ));
    }

    proptest::proptest! {
        #[test]
        fn prop_torn_tail_keeps_whole_records(seqs in proptest::collection::vec(1u64..1000, 1..8), cut in 0usize..64) {
            let client = ClientId::from_bytes([7u8; 16]);
            let mut buf = Vec::new();
            for seq in &seqs {
                buf.extend(encode_record(&LogRecord::End { txn_id: TxnId::new(client, *seq) }).unwrap());
            }
            buf.truncate(buf.len().saturating_sub(cut));

            let mut offset = 0;
            let mut decoded = Vec::new();
            while let Ok((record, used)) = decode_record(&buf[offset..]) {
                decoded.push(record.txn_id().seq);
                offset += used;
            }
            proptest::prop_assert!(decoded.len() <= seqs.len());
            proptest::prop_assert_eq!(&decoded[..], &seqs[..decoded.len()]);
            if cut == 0 {
                proptest::prop_assert_eq!(decoded.len(), seqs.len());
            }
        }
    }
}
