//! Frame encoding
//!
//! `magic u32 | len u32 | payload`, big-endian header. The magic catches
//! peers speaking another protocol (or a desynchronized stream) on the
//! first frame instead of letting bincode decode garbage.

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{self, Read, Write};
use thiserror::Error;

/// "DTRX"
pub const FRAME_MAGIC: u32 = 0x4454_5258;

/// Header size: magic + length
pub const HEADER_SIZE: usize = 8;

/// Largest accepted payload (16 MiB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Framing errors
#[derive(Debug, Error)]
pub enum WireError {
    /// Underlying socket error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the connection at a frame boundary
    #[error("connection closed")]
    Closed,

    /// The frame does not start with [`FRAME_MAGIC`]
    #[error("bad frame magic {0:#010x}")]
    BadMagic(u32),

    /// The announced payload exceeds [`MAX_FRAME_SIZE`]
    #[error("frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Announced size
        size: usize,
        /// Limit
        max: usize,
    },

    /// Payload could not be encoded
    #[error("encode error: {0}")]
    Encode(String),

    /// Payload could not be decoded
    #[error("decode error: {0}")]
    Decode(String),
}

impl WireError {
    /// Check if the error came from a socket timeout
    pub fn is_timeout(&self) -> bool {
        match self {
            WireError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Encode `message` into one frame and write it
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), WireError> {
    let payload = bincode::serialize(message).map_err(|e| WireError::Encode(e.to_string()))?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let mut buf = vec![0u8; HEADER_SIZE + payload.len()];
    BigEndian::write_u32(&mut buf[0..4], FRAME_MAGIC);
    BigEndian::write_u32(&mut buf[4..8], payload.len() as u32);
    buf[HEADER_SIZE..].copy_from_slice(&payload);

    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame and decode its payload
///
/// End of stream before the first header byte is [`WireError::Closed`];
/// end of stream anywhere else is an I/O error.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T, WireError> {
    let mut first = [0u8; 1];
    loop {
        match reader.read(&mut first) {
            Ok(0) => return Err(WireError::Closed),
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(WireError::Io(e)),
        }
    }

    let mut rest = [0u8; 3];
    reader.read_exact(&mut rest)?;
    let magic = u32::from_be_bytes([first[0], rest[0], rest[1], rest[2]]);
    if magic != FRAME_MAGIC {
        return Err(WireError::BadMagic(magic));
    }

    let len = reader.read_u32::<BigEndian>()? as usize;
    if len > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    bincode::deserialize(&payload).map_err(|e| WireError::Decode(e.to_string()))
}
