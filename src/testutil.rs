//! In-memory transport for channel and controller tests.
//!
//! `FakeConnector::open` hands the server half of each connection to the
//! test through [`FakeServer::next_conn`], so a test plays the broker by hand.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use frames::{Command, Frame};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

use crate::channel::{ChannelEvent, Connector, Inbound, TransportError, TransportLink};
use crate::config::ChannelConfig;
use crate::credential::{Credential, SessionCredentials};

pub const WAIT: Duration = Duration::from_secs(30);

pub fn test_config() -> ChannelConfig {
    ChannelConfig::new("ws://broker.test:8080/ws")
}

pub fn credentials(token: &str) -> Arc<SessionCredentials> {
    Arc::new(SessionCredentials::with_token(token))
}

/// Server side of one opened fake transport.
pub struct FakeServerConn {
    pub endpoint: String,
    pub credential: Credential,
    to_client: mpsc::UnboundedSender<Inbound>,
    from_client: mpsc::UnboundedReceiver<Frame>,
}

impl FakeServerConn {
    pub async fn next_frame(&mut self) -> Frame {
        timeout(WAIT, self.from_client.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("client closed the transport")
    }

    /// Next frame, or `None` once the client has dropped its writer.
    pub async fn try_next_frame(&mut self) -> Option<Frame> {
        timeout(WAIT, self.from_client.recv()).await.expect("timed out waiting for client frame")
    }

    /// A frame already queued by the client, without waiting.
    pub fn queued_frame(&mut self) -> Option<Frame> {
        self.from_client.try_recv().ok()
    }

    /// Read `CONNECT` and acknowledge it. Returns the `CONNECT` frame.
    pub async fn accept(&mut self) -> Frame {
        let connect = self.next_frame().await;
        assert_eq!(connect.command, Command::Connect);
        self.push(Frame::connected("1.2"));
        connect
    }

    pub fn push(&self, frame: Frame) {
        let _ = self.to_client.send(Inbound::Frame(frame));
    }

    pub fn push_malformed(&self, detail: &str) {
        let _ = self.to_client.send(Inbound::Malformed(detail.to_owned()));
    }

    /// Drop the server half, which the client sees as transport closure.
    pub fn close(self) {}
}

/// Test-side handle paired with a [`FakeConnector`].
pub struct FakeServer {
    conns: mpsc::UnboundedReceiver<FakeServerConn>,
    opens: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
}

impl FakeServer {
    pub async fn next_conn(&mut self) -> FakeServerConn {
        timeout(WAIT, self.conns.recv())
            .await
            .expect("timed out waiting for transport open")
            .expect("connector dropped")
    }

    /// Make the next `n` opens fail outright.
    pub fn fail_next_opens(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Total `open` calls, failed ones included.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

pub struct FakeConnector {
    conns: mpsc::UnboundedSender<FakeServerConn>,
    opens: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn pair() -> (Arc<Self>, FakeServer) {
        let (conns_tx, conns_rx) = mpsc::unbounded_channel();
        let opens = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));
        let connector = Self { conns: conns_tx, opens: Arc::clone(&opens), failures: Arc::clone(&failures) };
        (Arc::new(connector), FakeServer { conns: conns_rx, opens, failures })
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(&self, endpoint: &str, credential: &Credential) -> Result<TransportLink, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Unavailable("fake open failure".to_owned()));
        }

        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();
        let conn = FakeServerConn {
            endpoint: endpoint.to_owned(),
            credential: credential.clone(),
            to_client,
            from_client,
        };
        self.conns
            .send(conn)
            .map_err(|_| TransportError::Unavailable("fake server gone".to_owned()))?;
        Ok(TransportLink { outbound, inbound })
    }
}

pub async fn next_event(events: &mut broadcast::Receiver<ChannelEvent>) -> ChannelEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for channel event")
        .expect("event channel closed")
}

/// Skip events until `pred` matches; returns the match.
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<ChannelEvent>,
    pred: impl Fn(&ChannelEvent) -> bool,
) -> ChannelEvent {
    loop {
        let event = next_event(events).await;
        if pred(&event) {
            return event;
        }
    }
}

/// Let spawned tasks drain their queues.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
