//! Message framing
//!
//! Protocol:
//!   Request:  [UTF-8 body] "\n\n"
//!   Response: [UTF-8 body] "\n\n"
//!
//! The terminator is not escaped, so a body can never contain it.

use std::io::{self, ErrorKind, Read, Write};

/// Two consecutive line feeds end every message.
pub const TERMINATOR: &[u8] = b"\n\n";

/// Bytes requested from the transport per read.
pub const CHUNK_SIZE: usize = 1024;

/// Result of reading one message from a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Terminator seen; body with the terminator stripped.
    Complete(Vec<u8>),
    /// Peer closed, the idle timeout fired, or the size limit was hit before
    /// a terminator arrived. Holds whatever was buffered, unstripped.
    Incomplete(Vec<u8>),
}

impl Frame {
    /// Body of a complete message, `None` otherwise.
    pub fn into_message(self) -> Option<Vec<u8>> {
        match self {
            Frame::Complete(body) => Some(body),
            Frame::Incomplete(_) => None,
        }
    }
}

/// Read until the buffer ends with [`TERMINATOR`].
///
/// The idle timeout is the reader's own business (`set_read_timeout` on a
/// socket): a read that times out ends the message as [`Frame::Incomplete`].
/// Transport errors other than timeouts and interrupts are returned as-is.
pub fn read_message<R: Read>(reader: &mut R, max_len: usize) -> io::Result<Frame> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; CHUNK_SIZE];

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => return Ok(Frame::Incomplete(buf)),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if is_timeout(&e) => return Ok(Frame::Incomplete(buf)),
            Err(e) => return Err(e),
        };

        buf.extend_from_slice(&chunk[..n]);

        if buf.ends_with(TERMINATOR) {
            buf.truncate(buf.len() - TERMINATOR.len());
            return Ok(Frame::Complete(buf));
        }

        if buf.len() > max_len {
            return Ok(Frame::Incomplete(buf));
        }
    }
}

/// Write one message followed by the terminator.
pub fn write_message<W: Write>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    writer.write_all(data)?;
    writer.write_all(TERMINATOR)?;
    writer.flush()?;
    Ok(())
}

// Unix reports an expired SO_RCVTIMEO as WouldBlock, Windows as TimedOut.
fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
