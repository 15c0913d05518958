//! Framed, encrypted request/reply link over one stream.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use super::error::{TransportError, TransportResult};
use super::frame::{read_frame, write_frame};
use crate::core::MAX_FRAME_SIZE;
use crate::crypto::Codec;

/// A stream that carries length-delimited encrypted frames.
///
/// Owns the underlying socket: dropping the link closes it, which is how a
/// pending read is cancelled.
#[derive(Debug)]
pub struct FramedLink<S> {
    stream: S,
    codec: Codec,
    max_frame_size: usize,
}

impl<S> FramedLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a connected stream.
    pub fn new(stream: S, codec: Codec) -> Self {
        Self {
            stream,
            codec,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Override the frame size limit.
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Send raw frame bytes.
    pub async fn send_frame(&mut self, frame: &[u8]) -> TransportResult<()> {
        write_frame(&mut self.stream, frame, self.max_frame_size).await
    }

    /// Receive raw frame bytes.
    pub async fn recv_frame(&mut self) -> TransportResult<Vec<u8>> {
        read_frame(&mut self.stream, self.max_frame_size).await
    }

    /// Encrypt and send a text payload.
    pub async fn send_text(&mut self, text: &str) -> TransportResult<()> {
        let frame = self.codec.encrypt(text)?;
        self.send_frame(frame.as_bytes()).await
    }

    /// Receive and decrypt one text payload.
    pub async fn recv_text(&mut self) -> TransportResult<String> {
        let frame = self.recv_frame().await?;
        Ok(self.codec.decrypt(&frame)?)
    }

    /// One request/reply exchange: send `text`, then wait at most `timeout`
    /// for the peer's reply.
    pub async fn request(&mut self, text: &str, timeout: Duration) -> TransportResult<String> {
        self.send_text(text).await?;
        tokio::time::timeout(timeout, self.recv_text())
            .await
            .map_err(|_| TransportError::ReplyTimeout(timeout))?
    }

    /// Access the codec.
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Get a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Unwrap the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl FramedLink<TcpStream> {
    /// Connect to `addr` (anything `TcpStream::connect` resolves), bounded by `timeout`.
    pub async fn connect(addr: &str, codec: Codec, timeout: Duration) -> TransportResult<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connect to {addr} timed out after {timeout:?}"),
                ))
            })??;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, codec))
    }

    /// Remote address of the link.
    pub fn peer_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CodecError, KEY_SIZE};
    use crate::crypto::PresharedKey;

    fn codec(byte: u8) -> Codec {
        Codec::new(PresharedKey::from_bytes([byte; KEY_SIZE]))
    }

    #[tokio::test]
    async fn test_request_reply() {
        let (a, b) = tokio::io::duplex(4096);
        let mut client = FramedLink::new(a, codec(7));
        let mut server = FramedLink::new(b, codec(7));

        let peer = tokio::spawn(async move {
            let text = server.recv_text().await.unwrap();
            server.send_text(&format!("ack:{text}")).await.unwrap();
        });

        let reply = client.request("hello", Duration::from_secs(5)).await.unwrap();
        assert_eq!(reply, "ack:hello");
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let (a, _b) = tokio::io::duplex(4096);
        let mut client = FramedLink::new(a, codec(7));

        let result = client.request("hello", Duration::from_millis(50)).await;
        assert!(matches!(result, Err(TransportError::ReplyTimeout(_))));
    }

    #[tokio::test]
    async fn test_reply_under_wrong_key_is_codec_error() {
        let (a, b) = tokio::io::duplex(4096);
        let mut client = FramedLink::new(a, codec(7));
        let mut rogue = FramedLink::new(b, codec(8));

        rogue.send_text("received").await.unwrap();
        let result = client.recv_text().await;
        assert!(matches!(
            result,
            Err(TransportError::Codec(CodecError::AuthenticationFailed))
        ));
    }

    #[tokio::test]
    async fn test_connect_over_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut link = FramedLink::new(stream, codec(9));
            let text = link.recv_text().await.unwrap();
            link.send_text(&text.to_uppercase()).await.unwrap();
        });

        let mut link = FramedLink::connect(&addr.to_string(), codec(9), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(link.peer_addr().unwrap(), addr);
        assert_eq!(
            link.request("ping", Duration::from_secs(5)).await.unwrap(),
            "PING"
        );
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused_is_not_reset() {
        // Grab a free port, then close it so nothing is listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result =
            FramedLink::connect(&addr.to_string(), codec(9), Duration::from_secs(5)).await;
        let err = result.unwrap_err();
        assert!(!err.is_reset(), "{err}");
    }
}
