//! TCP implementation of [`DuplexChannel`].
//!
//! One connection = one `Framed<TcpStream, WireCodec>` split into a
//! shared sink and a reader task, plus a heartbeat task keeping idle
//! links alive. Link loss from either task is reported once through
//! the event receiver returned by `connect`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::config::TransportHint;
use crate::error::StreamError;
use crate::frame::WirePayload;
use crate::transport::channel::{ChannelEvent, ChannelTarget, DuplexChannel};
use crate::wire::{Hello, MessageKind, Reject, Welcome, WireCodec, WireMessage};

type WireSink = SplitSink<Framed<TcpStream, WireCodec>, WireMessage>;
type WireStream = SplitStream<Framed<TcpStream, WireCodec>>;

/// Bound on the graceful goodbye during `close`.
const GOODBYE_TIMEOUT: Duration = Duration::from_secs(1);

/// Depth of the per-connection event channel.
const EVENT_BUFFER: usize = 64;

/// Client identification sent in the handshake.
pub fn client_name() -> String {
    format!("framecast/{}", env!("CARGO_PKG_VERSION"))
}

/// Live state of one established connection.
struct Link {
    sink: Arc<Mutex<WireSink>>,
    reader: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
}

/// Event channel over plain TCP.
pub struct TcpChannel {
    heartbeat_interval: Duration,
    link: Option<Link>,
    session_id: Option<String>,
}

impl TcpChannel {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            heartbeat_interval,
            link: None,
            session_id: None,
        }
    }

    /// Id assigned by the server during the last successful handshake.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    async fn handshake(
        framed: &mut Framed<TcpStream, WireCodec>,
        target: &ChannelTarget,
    ) -> Result<Welcome, StreamError> {
        let hello = Hello {
            channel: target.channel.clone(),
            client: client_name(),
            low_latency: target.hint == TransportHint::LowLatency,
        };
        framed.send(WireMessage::hello(&hello)?).await?;

        loop {
            let msg = framed
                .next()
                .await
                .ok_or_else(|| StreamError::Connection("closed during handshake".into()))??;
            match msg.kind() {
                MessageKind::Welcome => return msg.body::<Welcome>(),
                MessageKind::Reject => {
                    let reject: Reject = msg.body()?;
                    return Err(StreamError::Connection(format!(
                        "channel {} rejected: {}",
                        target.channel, reject.reason
                    )));
                }
                MessageKind::Heartbeat => continue,
                other => {
                    return Err(StreamError::Protocol(format!(
                        "unexpected {other} during handshake"
                    )));
                }
            }
        }
    }
}

#[async_trait]
impl DuplexChannel for TcpChannel {
    async fn connect(
        &mut self,
        target: &ChannelTarget,
    ) -> Result<mpsc::Receiver<ChannelEvent>, StreamError> {
        self.close().await;

        let addr = target.endpoint.to_string();
        debug!("connecting to {addr}");
        let stream = TcpStream::connect(&addr).await?;
        stream.set_nodelay(target.hint == TransportHint::LowLatency)?;

        let mut framed = Framed::new(stream, WireCodec);
        let welcome = Self::handshake(&mut framed, target).await?;
        info!(
            "connected to {addr}{} (session {})",
            target.channel, welcome.session_id
        );
        self.session_id = Some(welcome.session_id);

        let (sink, stream) = framed.split();
        let sink = Arc::new(Mutex::new(sink));
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let lost = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn(read_loop(stream, events_tx.clone(), Arc::clone(&lost)));
        let heartbeat = tokio::spawn(heartbeat_loop(
            Arc::clone(&sink),
            self.heartbeat_interval,
            events_tx,
            lost,
        ));

        self.link = Some(Link {
            sink,
            reader,
            heartbeat,
        });
        Ok(events_rx)
    }

    async fn send(&mut self, tag: &str, payload: WirePayload) -> Result<(), StreamError> {
        let link = self
            .link
            .as_ref()
            .ok_or_else(|| StreamError::Transmit("not connected".into()))?;
        let msg = WireMessage::event(tag, payload)?;
        link.sink
            .lock()
            .await
            .send(msg)
            .await
            .map_err(|e| StreamError::Transmit(e.to_string()))
    }

    async fn close(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };
        link.reader.abort();
        link.heartbeat.abort();

        let mut sink = link.sink.lock().await;
        let goodbye = async {
            sink.send(WireMessage::goodbye()).await?;
            sink.close().await
        };
        match tokio::time::timeout(GOODBYE_TIMEOUT, goodbye).await {
            Ok(Ok(())) => debug!("link closed gracefully"),
            Ok(Err(e)) => debug!("link close error: {e}"),
            Err(_) => debug!("link close timed out"),
        }
    }
}

/// Report link loss once per connection.
async fn report_lost(events: &mpsc::Sender<ChannelEvent>, lost: &AtomicBool, reason: String) {
    if !lost.swap(true, Ordering::SeqCst) {
        let _ = events.send(ChannelEvent::Disconnected { reason }).await;
    }
}

async fn read_loop(
    mut stream: WireStream,
    events: mpsc::Sender<ChannelEvent>,
    lost: Arc<AtomicBool>,
) {
    let reason = loop {
        match stream.next().await {
            None => break "connection closed by peer".to_string(),
            Some(Err(e)) => break format!("read error: {e}"),
            Some(Ok(msg)) => match msg.kind() {
                MessageKind::Event => {
                    let tag = msg.tag().to_string();
                    let event = ChannelEvent::Message {
                        tag,
                        payload: msg.into_wire_payload(),
                    };
                    if events.send(event).await.is_err() {
                        // Receiver dropped, nobody is listening.
                        return;
                    }
                }
                MessageKind::Goodbye => break "peer said goodbye".to_string(),
                MessageKind::Heartbeat => {}
                other => warn!("ignoring unexpected {other} message"),
            },
        }
    };
    report_lost(&events, &lost, reason).await;
}

async fn heartbeat_loop(
    sink: Arc<Mutex<WireSink>>,
    period: Duration,
    events: mpsc::Sender<ChannelEvent>,
    lost: Arc<AtomicBool>,
) {
    if period.is_zero() {
        return;
    }
    let mut interval = tokio::time::interval(period);
    // First tick fires immediately.
    interval.tick().await;
    loop {
        interval.tick().await;
        let result = sink.lock().await.send(WireMessage::heartbeat()).await;
        if let Err(e) = result {
            report_lost(&events, &lost, format!("heartbeat failed: {e}")).await;
            break;
        }
    }
}
