//! End-to-end tunnel scenario over an in-memory chat service.
//!
//! Two endpoints share a pair of channels standing in for the provider:
//! whatever one side "sends" arrives as an event on the other side's feed.
//! Everything above the HTTP layer runs for real: codec, stream adapter,
//! and the server-side session demultiplexer.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sideband::chat::{ChatEvent, EventSender, MessageSender};
use sideband::codec::Codec;
use sideband::crypto::KeyPair;
use sideband::server::SessionDemux;
use sideband::transport::MessageStream;
use sideband::Result;

/// Delivers "sent" messages straight into the other side's event feed.
struct LoopbackSender {
    far_side: EventSender,
}

#[async_trait]
impl MessageSender for LoopbackSender {
    async fn send_message(&self, room_id: &str, text: &str) -> Result<()> {
        self.far_side
            .send(Ok(ChatEvent {
                room_id: room_id.to_owned(),
                text: text.to_owned(),
            }))
            .await
            .map_err(|_| sideband::Error::Closed)
    }
}

#[tokio::test]
async fn test_ping_pong_through_room_42() {
    let client_keys = KeyPair::generate();
    let server_keys = KeyPair::generate();
    let cancel = CancellationToken::new();

    // The in-memory "provider": each side's sends feed the other's poll.
    let (to_client, client_feed) = mpsc::channel(8);
    let (to_server, mut server_feed) = mpsc::channel(8);

    // Client endpoint: knows the server key ahead of time, like the real
    // config does.
    let client_codec = Codec::new(&client_keys)
        .for_peer(server_keys.public().as_bytes())
        .unwrap();
    let mut client_stream = MessageStream::new(
        "42",
        Arc::new(LoopbackSender {
            far_side: to_server,
        }),
        client_codec,
        client_feed,
        cancel.child_token(),
    );

    // Server endpoint: learns the client key from the handshake frame.
    let mut demux = SessionDemux::new(
        Arc::new(LoopbackSender {
            far_side: to_client,
        }),
        &server_keys,
        cancel.child_token(),
    );

    let server = tokio::spawn(async move {
        // First event must establish the session.
        let event = server_feed.recv().await.unwrap().unwrap();
        let (room, mut stream) = demux
            .dispatch(event)
            .await
            .expect("handshake should create the session");
        assert_eq!(room, "42");

        // Route follow-up traffic, answering each ping with a pong.
        tokio::spawn(async move {
            while let Some(event) = server_feed.recv().await {
                demux.dispatch(event.unwrap()).await;
            }
        });

        let mut buf = [0u8; 64];
        loop {
            let (n, eof) = stream.read(&mut buf).await.unwrap();
            assert!(!eof, "client closed before pinging");
            if n == 0 {
                continue;
            }
            assert_eq!(&buf[..n], b"ping");
            stream.write(b"pong").await.unwrap();
            break;
        }
    });

    client_stream.send_handshake().await.unwrap();
    client_stream.write(b"ping").await.unwrap();

    let mut buf = [0u8; 64];
    loop {
        let (n, eof) = client_stream.read(&mut buf).await.unwrap();
        assert!(!eof);
        if n > 0 {
            assert_eq!(&buf[..n], b"pong");
            break;
        }
    }

    server.await.unwrap();
    cancel.cancel();
}

#[tokio::test]
async fn test_two_rooms_are_independent_sessions() {
    let server_keys = KeyPair::generate();
    let cancel = CancellationToken::new();
    let (to_client, _client_feed) = mpsc::channel(8);

    let mut demux = SessionDemux::new(
        Arc::new(LoopbackSender {
            far_side: to_client,
        }),
        &server_keys,
        cancel.child_token(),
    );

    let mut streams = Vec::new();
    for room in ["alpha", "beta"] {
        let keys = KeyPair::generate();
        let codec = Codec::new(&keys)
            .for_peer(server_keys.public().as_bytes())
            .unwrap();
        let event = ChatEvent {
            room_id: room.into(),
            text: codec.handshake_frame(),
        };
        let (created_room, stream) = demux.dispatch(event).await.unwrap();
        assert_eq!(created_room, room);
        streams.push((codec, stream));
    }
    assert_eq!(demux.session_count(), 2);

    // Traffic for one room only ever reaches that room's stream.
    let (alpha_codec, alpha_stream) = &mut streams[0];
    let event = ChatEvent {
        room_id: "alpha".into(),
        text: alpha_codec
            .pack(sideband::codec::MessageType::Data, b"only alpha")
            .unwrap(),
    };
    assert!(demux.dispatch(event).await.is_none());

    let mut buf = [0u8; 32];
    let (n, _) = alpha_stream.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"only alpha");
}
