//! Fixed-width command code encoding.
//!
//! Codes travel as 4-byte native-endian `i32`s. Both ends always share a
//! host, so no byte-order conversion is performed.

use std::io::{self, Read, Write};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Encoded size of one command code.
pub const CODE_LEN: usize = std::mem::size_of::<i32>();

/// Errors while exchanging command codes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The peer closed the connection before a full code arrived.
    #[error("Connection closed before a complete command code was received")]
    Eof,

    /// Underlying socket failure.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for ProtocolError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ProtocolError::Eof
        } else {
            ProtocolError::Io(e)
        }
    }
}

/// Reads one command code from a blocking stream.
pub fn read_code<R: Read>(reader: &mut R) -> Result<i32, ProtocolError> {
    let mut buf = [0u8; CODE_LEN];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_ne_bytes(buf))
}

/// Writes one command code to a blocking stream.
pub fn write_code<W: Write>(writer: &mut W, code: i32) -> Result<(), ProtocolError> {
    writer.write_all(&code.to_ne_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Reads one command code from an async stream.
pub async fn read_code_async<R: AsyncRead + Unpin>(reader: &mut R) -> Result<i32, ProtocolError> {
    let mut buf = [0u8; CODE_LEN];
    reader.read_exact(&mut buf).await?;
    Ok(i32::from_ne_bytes(buf))
}

/// Writes one command code to an async stream.
pub async fn write_code_async<W: AsyncWrite + Unpin>(
    writer: &mut W,
    code: i32,
) -> Result<(), ProtocolError> {
    writer.write_all(&code.to_ne_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
