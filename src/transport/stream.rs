//! The stream adapter: ordered bytes over discrete chat messages.
//!
//! One [`MessageStream`] is bound to one chat room and one codec. Writes are
//! chunked, encrypted and sent as individual messages; reads drain the room's
//! event feed, decrypting each message and buffering whatever does not fit the
//! caller's buffer. Ordering is exactly the order the feed delivers events in.
//!
//! Delivery of already-sent chunks when a later chunk fails is unknown; the
//! chat provider offers no transactional send. Callers treat a write error as
//! a broken stream.

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::sync::CancellationToken;

use crate::chat::{EventReceiver, MessageSender};
use crate::codec::{Codec, MessageType};
use crate::error::{Error, Result};
use crate::MAX_CHUNK_LEN;

/// Buffer size of the in-process duplex pipe behind [`MessageStream::into_io`].
const IO_BRIDGE_CAPACITY: usize = 64 * 1024;

/// An ordered byte stream carried by one chat room.
pub struct MessageStream<S: MessageSender> {
    read: StreamReadHalf,
    write: StreamWriteHalf<S>,
}

/// Consumer side of a split stream.
pub struct StreamReadHalf {
    codec: Arc<Mutex<Codec>>,
    events: EventReceiver,
    leftover: BytesMut,
    cancel: CancellationToken,
}

/// Producer side of a split stream.
pub struct StreamWriteHalf<S: MessageSender> {
    room_id: String,
    sender: Arc<S>,
    codec: Arc<Mutex<Codec>>,
    cancel: CancellationToken,
}

impl<S: MessageSender + 'static> MessageStream<S> {
    /// Bind a stream to a room, a codec, and the room's event feed.
    ///
    /// The token is this stream's own lifetime; callers hand in a
    /// `child_token()` of whatever scope owns the session.
    pub fn new(
        room_id: impl Into<String>,
        sender: Arc<S>,
        codec: Codec,
        events: EventReceiver,
        cancel: CancellationToken,
    ) -> Self {
        let codec = Arc::new(Mutex::new(codec));
        Self {
            read: StreamReadHalf {
                codec: codec.clone(),
                events,
                leftover: BytesMut::new(),
                cancel: cancel.clone(),
            },
            write: StreamWriteHalf {
                room_id: room_id.into(),
                sender,
                codec,
                cancel,
            },
        }
    }

    /// See [`StreamReadHalf::read`].
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<(usize, bool)> {
        self.read.read(buf).await
    }

    /// See [`StreamWriteHalf::write`].
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.write.write(data).await
    }

    /// See [`StreamWriteHalf::send_handshake`].
    pub async fn send_handshake(&self) -> Result<()> {
        self.write.send_handshake().await
    }

    /// Shut the stream down. Idempotent; subsequent reads and writes fail
    /// with [`Error::Closed`].
    pub fn close(&self) {
        self.write.close();
    }

    /// Split into independently-owned halves sharing the codec and lifetime.
    pub fn split(self) -> (StreamReadHalf, StreamWriteHalf<S>) {
        (self.read, self.write)
    }

    /// Bridge the stream to a standard `AsyncRead + AsyncWrite` object.
    ///
    /// Two pump tasks copy bytes between the halves and an in-process duplex
    /// pipe; the returned end is what the multiplexer wraps. Either pump
    /// failing cancels the stream's token.
    pub fn into_io(self) -> DuplexStream {
        let (near, far) = tokio::io::duplex(IO_BRIDGE_CAPACITY);
        let (mut from_io, mut to_io) = tokio::io::split(near);
        let (mut read_half, write_half) = self.split();

        tokio::spawn(async move {
            let mut buf = [0u8; MAX_CHUNK_LEN];
            loop {
                let n = match from_io.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        tracing::debug!("outbound pump: local read failed: {e}");
                        break;
                    }
                };
                if let Err(e) = write_half.write(&buf[..n]).await {
                    tracing::warn!("outbound pump: message send failed: {e}");
                    break;
                }
            }
            write_half.close();
        });

        tokio::spawn(async move {
            let mut buf = [0u8; MAX_CHUNK_LEN];
            loop {
                match read_half.read(&mut buf).await {
                    Ok((0, true)) => break,
                    Ok((0, false)) => continue,
                    Ok((n, _)) => {
                        if let Err(e) = to_io.write_all(&buf[..n]).await {
                            tracing::debug!("inbound pump: local write failed: {e}");
                            break;
                        }
                    }
                    Err(Error::Closed) => break,
                    Err(e) => {
                        tracing::warn!("inbound pump: stream read failed: {e}");
                        break;
                    }
                }
            }
            read_half.cancel.cancel();
            let _ = to_io.shutdown().await;
        });

        far
    }
}

impl StreamReadHalf {
    /// Read the next bytes from the stream into `buf`.
    ///
    /// Returns `(n, eof)`. Buffered leftovers are served without blocking;
    /// otherwise this awaits the next feed event. A handshake frame installs
    /// the peer key on the shared codec and yields `(0, false)`; a closed
    /// feed yields `(0, true)`; cancellation yields [`Error::Closed`].
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<(usize, bool)> {
        if self.cancel.is_cancelled() {
            return Err(Error::Closed);
        }
        if !self.leftover.is_empty() {
            let n = self.leftover.len().min(buf.len());
            buf[..n].copy_from_slice(&self.leftover[..n]);
            self.leftover.advance(n);
            return Ok((n, false));
        }

        let event = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Closed),
            event = self.events.recv() => event,
        };
        let event = match event {
            Some(Ok(event)) => event,
            Some(Err(e)) => return Err(e),
            None => return Ok((0, true)),
        };

        let (plaintext, ty) = self.codec.lock().unpack(&event.text)?;
        match ty {
            MessageType::PublicKeyExchange => {
                self.codec.lock().set_peer_public_key(&plaintext)?;
                tracing::debug!(room = %event.room_id, "peer public key installed");
                Ok((0, false))
            }
            MessageType::Data => {
                let n = plaintext.len().min(buf.len());
                buf[..n].copy_from_slice(&plaintext[..n]);
                if n < plaintext.len() {
                    self.leftover.extend_from_slice(&plaintext[n..]);
                }
                Ok((n, false))
            }
        }
    }
}

impl<S: MessageSender> StreamWriteHalf<S> {
    /// Write `data` to the stream, chunking at [`MAX_CHUNK_LEN`].
    ///
    /// Chunks are sent strictly in order; the first failed send aborts the
    /// write with that error.
    pub async fn write(&self, data: &[u8]) -> Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(Error::Closed);
        }
        for chunk in data.chunks(MAX_CHUNK_LEN) {
            let packed = self.codec.lock().pack(MessageType::Data, chunk)?;
            self.sender.send_message(&self.room_id, &packed).await?;
        }
        Ok(data.len())
    }

    /// Send the handshake frame announcing the local public key.
    pub async fn send_handshake(&self) -> Result<()> {
        let frame = self.codec.lock().handshake_frame();
        self.sender.send_message(&self.room_id, &frame).await
    }

    /// Cancel the stream's token.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}
