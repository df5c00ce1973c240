//! The multiplexer boundary.
//!
//! `yamux` owns framing and flow control over the single carried byte
//! stream; this module only drives its `Connection` and exposes the two
//! shapes the tunnel needs: an open-stream handle on the client, a feed of
//! accepted streams on the server. The drivers poll the connection
//! continuously so in-flight logical streams never stall behind accept or
//! open traffic.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Accepted-stream queue depth; the accept loop drains it immediately, the
/// depth only absorbs scheduling jitter.
const ACCEPT_QUEUE: usize = 64;

type OpenReply = oneshot::Sender<Result<yamux::Stream>>;

/// Clonable handle for opening logical streams on a client-mode connection.
#[derive(Clone)]
pub struct MuxClient {
    cmd_tx: mpsc::Sender<OpenReply>,
}

impl MuxClient {
    /// Open a new logical stream over the carried connection.
    pub async fn open_stream(&self) -> Result<yamux::Stream> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(reply_tx)
            .await
            .map_err(|_| Error::Closed)?;
        reply_rx.await.map_err(|_| Error::Closed)?
    }
}

/// Start a client-mode multiplexer over `io` and return its open handle.
///
/// The driver task runs until the connection dies or `cancel` fires.
pub fn connect<T>(io: T, cancel: CancellationToken) -> MuxClient
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let connection = yamux::Connection::new(io, yamux::Config::default(), yamux::Mode::Client);
    let (cmd_tx, cmd_rx) = mpsc::channel(ACCEPT_QUEUE);
    tokio::spawn(drive_client(connection, cmd_rx, cancel));
    MuxClient { cmd_tx }
}

/// Start a server-mode multiplexer over `io` and return the feed of
/// streams the remote side opens.
pub fn accept_streams<T>(io: T, cancel: CancellationToken) -> mpsc::Receiver<yamux::Stream>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let connection = yamux::Connection::new(io, yamux::Config::default(), yamux::Mode::Server);
    let (tx, rx) = mpsc::channel(ACCEPT_QUEUE);
    tokio::spawn(drive_server(connection, tx, cancel));
    rx
}

async fn drive_client<T>(
    mut connection: yamux::Connection<T>,
    mut cmd_rx: mpsc::Receiver<OpenReply>,
    cancel: CancellationToken,
) where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut cancelled = Box::pin(cancel.cancelled_owned());
    let mut pending: VecDeque<OpenReply> = VecDeque::new();
    let mut handles_gone = false;

    std::future::poll_fn(|cx: &mut Context<'_>| {
        if Pin::new(&mut cancelled).poll(cx).is_ready() {
            return Poll::Ready(());
        }

        if !handles_gone {
            while let Poll::Ready(cmd) = cmd_rx.poll_recv(cx) {
                match cmd {
                    Some(reply) => pending.push_back(reply),
                    None => {
                        // Every handle dropped; keep driving existing
                        // streams until cancellation.
                        handles_gone = true;
                        break;
                    }
                }
            }
        }

        while let Some(reply) = pending.pop_front() {
            match connection.poll_new_outbound(cx) {
                Poll::Ready(Ok(stream)) => {
                    let _ = reply.send(Ok(stream));
                }
                Poll::Ready(Err(e)) => {
                    let _ = reply.send(Err(Error::Mux(e.to_string())));
                    for stale in pending.drain(..) {
                        let _ = stale.send(Err(Error::Closed));
                    }
                    return Poll::Ready(());
                }
                Poll::Pending => {
                    pending.push_front(reply);
                    break;
                }
            }
        }

        loop {
            match connection.poll_next_inbound(cx) {
                Poll::Ready(Some(Ok(stream))) => {
                    // The server never opens streams toward the client.
                    tracing::debug!("dropping unexpected inbound logical stream");
                    drop(stream);
                }
                Poll::Ready(Some(Err(e))) => {
                    tracing::warn!("multiplexer connection failed: {e}");
                    return Poll::Ready(());
                }
                Poll::Ready(None) => {
                    tracing::debug!("multiplexer connection closed");
                    return Poll::Ready(());
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    })
    .await;
}

async fn drive_server<T>(
    mut connection: yamux::Connection<T>,
    tx: mpsc::Sender<yamux::Stream>,
    cancel: CancellationToken,
) where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut cancelled = Box::pin(cancel.cancelled_owned());

    std::future::poll_fn(|cx: &mut Context<'_>| {
        if Pin::new(&mut cancelled).poll(cx).is_ready() {
            return Poll::Ready(());
        }

        loop {
            match connection.poll_next_inbound(cx) {
                Poll::Ready(Some(Ok(stream))) => match tx.try_send(stream) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!("accept queue full, dropping logical stream");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => return Poll::Ready(()),
                },
                Poll::Ready(Some(Err(e))) => {
                    tracing::warn!("multiplexer connection failed: {e}");
                    return Poll::Ready(());
                }
                Poll::Ready(None) => {
                    tracing::debug!("multiplexer connection closed");
                    return Poll::Ready(());
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio_util::compat::TokioAsyncReadCompatExt;

    fn linked_pipes() -> (
        impl AsyncRead + AsyncWrite + Unpin + Send + 'static,
        impl AsyncRead + AsyncWrite + Unpin + Send + 'static,
    ) {
        let (a, b) = tokio::io::duplex(256 * 1024);
        (a.compat(), b.compat())
    }

    #[tokio::test]
    async fn test_open_and_accept_logical_stream() {
        let (client_io, server_io) = linked_pipes();
        let cancel = CancellationToken::new();

        let client = connect(client_io, cancel.clone());
        let mut accepted = accept_streams(server_io, cancel.clone());

        let mut outbound = client.open_stream().await.unwrap();
        outbound.write_all(b"hello mux").await.unwrap();
        outbound.flush().await.unwrap();

        let mut inbound = accepted.recv().await.unwrap();
        let mut buf = [0u8; 9];
        inbound.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello mux");

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_many_concurrent_streams() {
        let (client_io, server_io) = linked_pipes();
        let cancel = CancellationToken::new();

        let client = connect(client_io, cancel.clone());
        let mut accepted = accept_streams(server_io, cancel.clone());

        // Server echoes on every accepted stream.
        tokio::spawn(async move {
            while let Some(mut stream) = accepted.recv().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 16];
                    if stream.read_exact(&mut buf).await.is_ok() {
                        let _ = stream.write_all(&buf).await;
                    }
                });
            }
        });

        let mut tasks = Vec::new();
        for i in 0..8u8 {
            let client = client.clone();
            tasks.push(tokio::spawn(async move {
                let mut stream = client.open_stream().await.unwrap();
                let msg = [i; 16];
                stream.write_all(&msg).await.unwrap();
                let mut echo = [0u8; 16];
                stream.read_exact(&mut echo).await.unwrap();
                assert_eq!(echo, msg);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_open_after_cancel_fails() {
        let (client_io, _server_io) = linked_pipes();
        let cancel = CancellationToken::new();
        let client = connect(client_io, cancel.clone());

        cancel.cancel();
        // The driver exits; the command channel closes with it.
        loop {
            match client.open_stream().await {
                Err(Error::Closed) => break,
                Err(other) => panic!("unexpected error: {other}"),
                Ok(_) => tokio::task::yield_now().await,
            }
        }
    }
}
