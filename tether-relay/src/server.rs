//! WebSocket transport for the relay.
//!
//! Each socket becomes one endpoint. Clients send `send` frames; frames to
//! `0` go to the relay core, frames to another endpoint are delivered only
//! between the two ends of a pairing.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use log::{debug, info, trace, warn};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use warp::ws::{Message, WebSocket};
use warp::Filter;

use tether_proto::relay::RelayMessage;
use tether_proto::{CloseReason, Eid, SubChannel};

use crate::config::RelayConfig;
use crate::pairing::ConnectParams;
use crate::transport::Transport;
use crate::Relay;

pub type Tx = mpsc::UnboundedSender<Message>;

/// How long a closing connection gets to flush its last frames.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

struct Connection {
    tx: Tx,
    shutdown: Arc<Notify>,
}

/// Live sockets by endpoint id. This is the [`Transport`] the relay core talks to.
#[derive(Default)]
pub struct Connections {
    conns: DashMap<Eid, Connection>,
}

impl Connections {
    fn insert(&self, eid: Eid, tx: Tx, shutdown: Arc<Notify>) {
        self.conns.insert(eid, Connection { tx, shutdown });
    }

    fn remove(&self, eid: Eid) {
        self.conns.remove(&eid);
    }
}

impl Transport for Connections {
    fn forward_as_sender(&self, payload: Vec<u8>, recipient: Eid, sender: Eid, sub_channel: SubChannel) {
        let Some(conn) = self.conns.get(&recipient) else {
            debug!("dropping message {sender} -> {recipient}: recipient is gone");
            return;
        };
        let msg = RelayMessage::Deliver {
            from: sender,
            sub_channel,
            payload,
        };
        if conn.tx.send(Message::text(msg.to_json())).is_err() {
            debug!("dropping message {sender} -> {recipient}: writer has stopped");
        }
    }

    fn force_close(&self, reason: CloseReason, eid: Eid) {
        // Removing the entry first means nothing else gets queued behind the close frame.
        let Some((_, conn)) = self.conns.remove(&eid) else {
            return;
        };
        let notice = RelayMessage::Close {
            code: reason.code(),
            reason: reason.to_string(),
        };
        let _ = conn.tx.send(Message::text(notice.to_json()));
        let _ = conn.tx.send(Message::close_with(reason.code(), reason.as_str()));
        conn.shutdown.notify_one();
        debug!("force-closing {eid}: {reason}");
    }
}

pub struct State {
    pub relay: Relay,
    pub connections: Arc<Connections>,
    next_eid: AtomicU64,
    heartbeat_interval: Duration,
}

impl State {
    pub fn new(config: &RelayConfig) -> Arc<Self> {
        let connections = Arc::new(Connections::default());
        Arc::new(Self {
            relay: Relay::new(connections.clone()),
            connections,
            // 0 is the relay itself.
            next_eid: AtomicU64::new(1),
            heartbeat_interval: config.heartbeat_interval,
        })
    }

    fn allocate_eid(&self) -> Eid {
        Eid(self.next_eid.fetch_add(1, Ordering::Relaxed))
    }

    /// Normal routing for a `send` frame.
    fn route(&self, from: Eid, to: Eid, sub_channel: SubChannel, payload: Vec<u8>) {
        if to.is_relay() {
            // Rejections are closed by the relay itself.
            let _ = self.relay.on_message(payload, from, to, sub_channel);
            return;
        }
        if !self.relay.is_paired(from, to) {
            warn!("dropping message {from} -> {to}: endpoints are not paired");
            return;
        }
        trace!("routing {} byte(s) {from} -> {to} sub_channel={sub_channel}", payload.len());
        self.connections
            .forward_as_sender(payload, to, from, sub_channel);
    }
}

/// All HTTP and WebSocket routes of the relay.
pub fn routes(
    state: Arc<State>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let with_state = warp::any().map(move || state.clone());

    let hello = warp::path::end().map(|| "Tether Relay is Active");
    let healthz = warp::path!("healthz").map(|| "ok");

    let devices = warp::path!("devices")
        .and(warp::get())
        .and(with_state.clone())
        .map(|state: Arc<State>| warp::reply::json(&state.relay.snapshot()));

    // /ws?role=device&info=... or /ws?target=<device eid>
    let ws = warp::path!("ws")
        .and(warp::ws())
        .and(warp::query::<ConnectParams>())
        .and(warp::addr::remote())
        .and(with_state)
        .map(
            |ws: warp::ws::Ws,
             params: ConnectParams,
             remote: Option<SocketAddr>,
             state: Arc<State>| {
                ws.on_upgrade(move |socket| endpoint(socket, params, remote, state))
            },
        );

    hello
        .or(healthz)
        .or(devices)
        .or(ws)
        .with(warp::cors().allow_any_origin())
        .with(warp::log("tether_relay"))
}

fn spawn_writer(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::UnboundedReceiver<Message>,
    heartbeat_interval: Duration,
) -> JoinHandle<()> {
    tokio::task::spawn(async move {
        let mut ticker = interval(heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                msg = out_rx.recv() => {
                    let Some(msg) = msg else { break };
                    let closing = msg.is_close();
                    if ws_tx.send(msg).await.is_err() || closing {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if ws_tx.send(Message::ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Serve one endpoint from upgrade to teardown.
pub async fn endpoint(
    ws: WebSocket,
    params: ConnectParams,
    remote: Option<SocketAddr>,
    state: Arc<State>,
) {
    let eid = state.allocate_eid();
    let (ws_tx, mut ws_rx) = ws.split();
    let (out_tx, out_rx) = mpsc::unbounded_channel::<Message>();
    let shutdown = Arc::new(Notify::new());

    // The connection must be reachable before the relay replays anything into it.
    state.connections.insert(eid, out_tx.clone(), shutdown.clone());
    let mut writer = spawn_writer(ws_tx, out_rx, state.heartbeat_interval);

    if let Ok(role) = params.classify() {
        let _ = out_tx.send(Message::text(
            RelayMessage::Welcome { eid, role }.to_json(),
        ));
    }

    match state.relay.on_connect(eid, &params, remote) {
        Ok(role) => {
            info!("endpoint {eid} connected as {role:?} from {remote:?}");
            read_loop(eid, &mut ws_rx, &out_tx, &shutdown, &state).await;
        }
        Err(err) => debug!("endpoint {eid} refused: {err}"),
    }

    // Connection ended: tear down the pairing, then let the writer flush.
    let outcome = state.relay.on_disconnect(eid);
    state.connections.remove(eid);
    drop(out_tx);
    if timeout(FLUSH_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }
    info!("endpoint {eid} disconnected ({outcome:?})");
}

async fn read_loop(
    eid: Eid,
    ws_rx: &mut futures::stream::SplitStream<WebSocket>,
    out_tx: &Tx,
    shutdown: &Notify,
    state: &State,
) {
    loop {
        let result = tokio::select! {
            _ = shutdown.notified() => break,
            next = ws_rx.next() => match next {
                Some(result) => result,
                None => break,
            },
        };
        let msg = match result {
            Ok(m) => m,
            Err(e) => {
                debug!("endpoint {eid} read error: {e}");
                break;
            }
        };
        if msg.is_close() {
            break;
        }
        if !(msg.is_text() || msg.is_binary()) {
            continue;
        }

        let parsed: RelayMessage = match serde_json::from_slice(msg.as_bytes()) {
            Ok(m) => m,
            Err(e) => {
                let _ = out_tx.send(Message::text(
                    RelayMessage::Control {
                        code: 400,
                        message: format!("malformed frame: {e}"),
                    }
                    .to_json(),
                ));
                continue;
            }
        };

        match parsed {
            RelayMessage::Send {
                to,
                sub_channel,
                payload,
            } => state.route(eid, to, sub_channel, payload),
            other => {
                let _ = out_tx.send(Message::text(
                    RelayMessage::Control {
                        code: 400,
                        message: "expected send".to_string(),
                    }
                    .to_json(),
                ));
                debug!("endpoint {eid} sent unexpected {other:?}");
            }
        }
    }
}
