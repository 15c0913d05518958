//! Length-delimited framing over a byte stream.
//!
//! ```text
//! [ length (4, big-endian u32) | body (length bytes) ]
//! ```
//!
//! The body is an opaque [`EncryptedFrame`](crate::crypto::EncryptedFrame);
//! this layer never looks inside it.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::{TransportError, TransportResult};
use crate::core::FRAME_HEADER_SIZE;

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, body: &[u8], max_len: usize) -> TransportResult<()>
where
    W: AsyncWrite + Unpin,
{
    if body.len() > max_len {
        return Err(TransportError::FrameTooLarge {
            len: body.len(),
            max: max_len,
        });
    }

    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(body);

    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// A clean end of stream before the first header byte is
/// [`TransportError::ConnectionClosed`]; an end of stream inside a frame is an
/// I/O error.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> TransportResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    let first = reader.read(&mut header).await?;
    if first == 0 {
        return Err(TransportError::ConnectionClosed);
    }
    reader.read_exact(&mut header[first..]).await?;

    let len = u32::from_be_bytes(header) as usize;
    if len > max_len {
        return Err(TransportError::FrameTooLarge { len, max: max_len });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}
