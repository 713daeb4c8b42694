//! Driver for Sony Bravia sets over the "Simple IP control" TCP service.
//!
//! This is a full request/response pipeline over a reconnecting
//! connection.  Three tasks cooperate per driver instance:
//!
//! ```text
//! do_op ──► request channel ──► dispatcher ──► TCP write half
//!                                   │ push reply slot (before writing)
//!                                   ▼
//!                          per-command FIFO queues
//!                                   ▲ pop on answer
//! event loop ◄── state updates ── reader ◄──── TCP read half
//!   (supervisor)
//! ```
//!
//! - The **dispatcher** owns the outbound half.  It enqueues the caller's
//!   reply slot on the command's FIFO, writes the frame, and holds the line
//!   until that request is answered (or its deadline passes) before taking
//!   the next one.  Answers carry no sequence number, so FIFO order per
//!   command identifier is the only correlation signal.
//! - The **reader** owns the inbound half.  Answers complete the oldest
//!   pending slot for their command; answers and notifications alike feed
//!   the state cache and the internal event stream.
//! - The **supervisor** owns the connection.  It dispatches resync events
//!   to the registered handlers and, on any transport error, tears both
//!   tasks down, fails the still-queued reply slots, and reconnects.
//!   Requests waiting in the bounded channel survive a reconnect.

mod queue;

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use tv_core::protocol::bravia::{self, BraviaRequest, FrameKind};
use tv_core::{Attribute, Op, State, StateUpdate};

use self::queue::{QueueEntry, ReplySlot, ResponseQueues};
use super::{DriverError, Transport, Tv, TvModel};

const REQUEST_CHANNEL_CAPACITY: usize = 1000;
const EVENT_CHANNEL_CAPACITY: usize = 1000;

// ── Configuration ─────────────────────────────────────────────────────────────

/// Configuration for one Bravia set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BraviaConfig {
    /// Hostname or IP address of the set.
    pub address: String,
    /// Control service port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Deadline for a single request to be answered.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Pause between reconnect attempts.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

fn default_port() -> u16 {
    bravia::PORT
}

fn default_request_timeout() -> u64 {
    5
}

fn default_reconnect_delay() -> u64 {
    5
}

impl Default for BraviaConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }
}

impl BraviaConfig {
    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

/// Factory registered under `"bravia"`.
pub struct BraviaModel;

impl TvModel for BraviaModel {
    fn name(&self) -> &'static str {
        "bravia"
    }

    // The driver owns its connection; a caller-supplied transport is ignored.
    fn initialize(
        &self,
        _transport: Option<Transport>,
        config: &toml::Value,
    ) -> Result<Box<dyn Tv>, DriverError> {
        let config: BraviaConfig = config
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| DriverError::bad_config(self.name(), e.to_string()))?;
        if config.address.is_empty() {
            return Err(DriverError::bad_config(self.name(), "address is required"));
        }
        Ok(Box::new(BraviaDriver::new(config)))
    }

    fn default_config(&self) -> toml::Value {
        toml::Value::try_from(BraviaConfig::default())
            .unwrap_or_else(|_| toml::Value::Table(toml::map::Map::new()))
    }
}

// ── Driver handle ─────────────────────────────────────────────────────────────

struct PendingRequest {
    request: BraviaRequest,
    reply: oneshot::Sender<Result<(), DriverError>>,
}

#[derive(Default)]
struct CachedState {
    state: State,
    mac_address: Option<[u8; 6]>,
}

/// A resync rule: given a parsed state change, which follow-up requests to
/// submit.  Handlers go through the normal request channel so the
/// dispatcher stays the single writer.
type Handler = Box<dyn Fn(&StateUpdate) -> Vec<BraviaRequest> + Send + Sync>;

/// One Bravia set.  Cheap to share behind an `Arc`; dropping the last
/// handle shuts the background tasks down.
pub struct BraviaDriver {
    req_tx: mpsc::Sender<PendingRequest>,
    cache: Arc<StdMutex<CachedState>>,
    shutdown: watch::Sender<bool>,
}

impl BraviaDriver {
    /// Spawns the supervisor for `config`.  Must be called within a tokio
    /// runtime.
    pub fn new(config: BraviaConfig) -> Self {
        let (req_tx, req_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let cache = Arc::new(StdMutex::new(CachedState::default()));

        let supervisor = Supervisor {
            config,
            cache: Arc::clone(&cache),
            req_tx: req_tx.clone(),
            req_rx: Arc::new(Mutex::new(req_rx)),
            shutdown: shutdown_rx,
            handlers: default_handlers(),
        };
        tokio::spawn(supervisor.run());

        Self {
            req_tx,
            cache,
            shutdown: shutdown_tx,
        }
    }

    /// Asks the supervisor to stop.  Pending and queued requests resolve
    /// with [`DriverError::Cancelled`].
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// The device MAC address, once the set has reported it.
    pub fn mac_address(&self) -> Option<[u8; 6]> {
        lock_cache(&self.cache).mac_address
    }

    async fn submit(&self, request: BraviaRequest) -> Result<(), DriverError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.req_tx
            .send(PendingRequest {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| DriverError::Closed)?;
        reply_rx.await.map_err(|_| DriverError::Closed)?
    }
}

impl Drop for BraviaDriver {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

#[async_trait]
impl Tv for BraviaDriver {
    async fn do_op(&self, op: &Op) -> Result<(), DriverError> {
        let request = bravia::request_for(op).ok_or_else(|| DriverError::unsupported(op))?;
        self.submit(request).await
    }

    fn state(&self) -> Result<State, DriverError> {
        Ok(lock_cache(&self.cache).state.clone())
    }
}

fn lock_cache(cache: &StdMutex<CachedState>) -> std::sync::MutexGuard<'_, CachedState> {
    match cache.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock_queues(queues: &StdMutex<ResponseQueues>) -> std::sync::MutexGuard<'_, ResponseQueues> {
    match queues.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// The built-in resync rules:
///
/// - power coming on leaves mute, screen, and input unknown, so all three
///   are re-queried;
/// - unmuting reveals the audible volume, so it is re-queried.
fn default_handlers() -> Vec<(Attribute, Handler)> {
    vec![
        (
            Attribute::Power,
            Box::new(|update| match update {
                StateUpdate::Power(true) => vec![
                    BraviaRequest::enquiry(bravia::CMD_MUTE),
                    BraviaRequest::enquiry(bravia::CMD_SCREEN_MUTE),
                    BraviaRequest::enquiry(bravia::CMD_INPUT),
                ],
                _ => Vec::new(),
            }),
        ),
        (
            Attribute::Mute,
            Box::new(|update| match update {
                StateUpdate::Mute(false) => vec![BraviaRequest::enquiry(bravia::CMD_VOLUME)],
                _ => Vec::new(),
            }),
        ),
    ]
}

// ── Supervisor ────────────────────────────────────────────────────────────────

struct Supervisor {
    config: BraviaConfig,
    cache: Arc<StdMutex<CachedState>>,
    req_tx: mpsc::Sender<PendingRequest>,
    req_rx: Arc<Mutex<mpsc::Receiver<PendingRequest>>>,
    shutdown: watch::Receiver<bool>,
    handlers: Vec<(Attribute, Handler)>,
}

impl Supervisor {
    async fn run(self) {
        // Cloned out of self so select arms can poll it while handler
        // bodies borrow the rest of the supervisor.
        let mut shutdown = self.shutdown.clone();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let stream = tokio::select! {
                _ = shutdown.changed() => break,
                result = TcpStream::connect((self.config.address.as_str(), self.config.port)) => {
                    match result {
                        Ok(stream) => stream,
                        Err(e) => {
                            warn!(address = %self.config.address, "connect failed: {e}");
                            if self.sleep_or_shutdown(&mut shutdown).await {
                                break;
                            }
                            continue;
                        }
                    }
                }
            };
            info!(address = %self.config.address, port = self.config.port, "connected");

            let (read_half, write_half) = stream.into_split();
            let queues = Arc::new(StdMutex::new(ResponseQueues::default()));
            let (error_tx, mut error_rx) = mpsc::channel::<DriverError>(2);
            let (event_tx, mut event_rx) = mpsc::channel::<StateUpdate>(EVENT_CHANNEL_CAPACITY);

            let reader = tokio::spawn(read_loop(
                read_half,
                Arc::clone(&queues),
                Arc::clone(&self.cache),
                event_tx,
                error_tx.clone(),
            ));
            let dispatcher = tokio::spawn(dispatch_loop(
                Arc::clone(&self.req_rx),
                write_half,
                Arc::clone(&queues),
                self.config.request_timeout(),
                error_tx,
            ));

            // Learn who we are talking to, then where its power state is.
            self.enqueue(BraviaRequest::enquiry_with(bravia::CMD_MAC_ADDRESS, "eth0"));
            self.enqueue(BraviaRequest::enquiry(bravia::CMD_POWER));

            let mut shutting_down = false;
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        shutting_down = true;
                        break;
                    }
                    maybe_err = error_rx.recv() => {
                        if let Some(e) = maybe_err {
                            warn!(address = %self.config.address, "connection failed: {e}");
                        }
                        break;
                    }
                    maybe_event = event_rx.recv() => {
                        match maybe_event {
                            Some(update) => self.dispatch_event(&update),
                            None => break,
                        }
                    }
                }
            }

            reader.abort();
            dispatcher.abort();

            // Reply slots do not carry across connections.
            for slot in lock_queues(&queues).drain() {
                slot.complete(Err(if shutting_down {
                    DriverError::Cancelled
                } else {
                    DriverError::ConnectionLost
                }));
            }

            if shutting_down {
                break;
            }
            if self.sleep_or_shutdown(&mut shutdown).await {
                break;
            }
        }

        self.drain_pending().await;
        debug!(address = %self.config.address, "supervisor stopped");
    }

    /// Sleeps out the reconnect delay.  Returns true when shutdown was
    /// requested meanwhile.
    async fn sleep_or_shutdown(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = shutdown.changed() => true,
            _ = sleep(self.config.reconnect_delay()) => false,
        }
    }

    /// Fails everything still waiting in the request channel.
    async fn drain_pending(&self) {
        let mut rx = self.req_rx.lock().await;
        rx.close();
        while let Some(pending) = rx.recv().await {
            let _ = pending.reply.send(Err(DriverError::Cancelled));
        }
    }

    /// Submits an internally-generated request.  Best effort: if the
    /// request channel is saturated the enquiry is dropped rather than
    /// blocking the event loop.
    fn enqueue(&self, request: BraviaRequest) {
        let (reply_tx, _reply_rx) = oneshot::channel();
        if let Err(mpsc::error::TrySendError::Full(_)) = self.req_tx.try_send(PendingRequest {
            request,
            reply: reply_tx,
        }) {
            warn!("request channel saturated; dropping internal enquiry");
        }
    }

    fn dispatch_event(&self, update: &StateUpdate) {
        let Some(attribute) = update.attribute() else {
            return;
        };
        for (attr, handler) in &self.handlers {
            if *attr == attribute {
                for request in handler(update) {
                    self.enqueue(request);
                }
            }
        }
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Reads frames line by line, correlates answers, and feeds the state
/// cache and event stream.  Malformed lines are dropped; this loop never
/// gives up on a parse failure, only on transport failure.
async fn read_loop(
    read_half: OwnedReadHalf,
    queues: Arc<StdMutex<ResponseQueues>>,
    cache: Arc<StdMutex<CachedState>>,
    event_tx: mpsc::Sender<StateUpdate>,
    error_tx: mpsc::Sender<DriverError>,
) {
    let mut reader = BufReader::new(read_half);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(0x0A, &mut line).await {
            Ok(0) => {
                let _ = error_tx.send(DriverError::ConnectionLost).await;
                return;
            }
            Ok(_) => {}
            Err(e) => {
                let _ = error_tx.send(DriverError::Io(e)).await;
                return;
            }
        }

        let Some(frame) = bravia::parse_frame(&line) else {
            continue;
        };

        // Device metadata and state first, so a caller woken by the answer
        // observes the effect of that answer.
        let update = if frame.is_error() {
            None
        } else {
            bravia::decode_value(&frame.command, &frame.value)
        };
        if let Some(update) = &update {
            let mut cache = lock_cache(&cache);
            if let StateUpdate::MacAddress(mac) = update {
                cache.mac_address = Some(*mac);
            }
            cache.state.apply(update);
        }

        if frame.kind == FrameKind::Answer {
            match lock_queues(&queues).pop(&frame.command) {
                Some(QueueEntry::Live(slot)) => {
                    if frame.is_error() {
                        slot.complete(Err(DriverError::Device("invalid command".to_string())));
                    } else {
                        slot.complete(Ok(()));
                    }
                }
                Some(QueueEntry::Poisoned) => {
                    debug!(command = %frame.command, "discarding answer for an expired request");
                }
                None => {
                    debug!(command = %frame.command, "unsolicited answer");
                }
            }
        }

        if let Some(update) = update {
            if event_tx.send(update).await.is_err() {
                return;
            }
        }
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// Drains the request channel onto the connection, one request at a time.
///
/// The reply slot is queued *before* the write so an answer can never race
/// past its request.  The line is held until the request is answered or
/// its deadline passes; expired requests leave a poison marker behind so
/// the late answer is not matched to the next caller.
async fn dispatch_loop(
    req_rx: Arc<Mutex<mpsc::Receiver<PendingRequest>>>,
    mut write_half: OwnedWriteHalf,
    queues: Arc<StdMutex<ResponseQueues>>,
    request_timeout: Duration,
    error_tx: mpsc::Sender<DriverError>,
) {
    let mut rx = req_rx.lock().await;
    while let Some(pending) = rx.recv().await {
        let id = pending.request.id().to_string();
        let bytes = pending.request.serialize();

        let (done_tx, done_rx) = oneshot::channel();
        lock_queues(&queues).push(
            &id,
            ReplySlot {
                reply: pending.reply,
                done: done_tx,
            },
        );

        if let Err(e) = write_half.write_all(&bytes).await {
            // The slot just queued fails with the connection.
            let _ = error_tx.send(DriverError::Io(e)).await;
            return;
        }

        match tokio::time::timeout(request_timeout, done_rx).await {
            Ok(_) => {}
            Err(_) => {
                if let Some(slot) = lock_queues(&queues).poison_newest(&id) {
                    debug!(command = %id, "request deadline expired");
                    slot.complete(Err(DriverError::Timeout));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = BraviaConfig {
            address: "10.0.0.5".to_string(),
            ..BraviaConfig::default()
        };
        assert_eq!(config.port, 20060);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_deserializes_with_address_only() {
        let config: BraviaConfig = toml::from_str("address = \"10.0.0.5\"").unwrap();
        assert_eq!(config.address, "10.0.0.5");
        assert_eq!(config.port, 20060);
    }

    #[tokio::test]
    async fn test_factory_requires_an_address() {
        let model = BraviaModel;
        let config: toml::Value = toml::from_str("address = \"\"").unwrap();
        let err = model.initialize(None, &config).err().expect("expected error");
        assert!(matches!(err, DriverError::BadConfig { model, .. } if model == "bravia"));
    }

    #[test]
    fn test_power_on_resync_enquires_mute_screen_input_in_order() {
        let handlers = default_handlers();
        let (_, handler) = handlers
            .iter()
            .find(|(attr, _)| *attr == Attribute::Power)
            .expect("power handler must be registered");

        let requests = handler(&StateUpdate::Power(true));
        assert_eq!(
            requests,
            vec![
                BraviaRequest::enquiry(bravia::CMD_MUTE),
                BraviaRequest::enquiry(bravia::CMD_SCREEN_MUTE),
                BraviaRequest::enquiry(bravia::CMD_INPUT),
            ]
        );
    }

    #[test]
    fn test_power_off_triggers_no_resync() {
        let handlers = default_handlers();
        let (_, handler) = handlers
            .iter()
            .find(|(attr, _)| *attr == Attribute::Power)
            .expect("power handler must be registered");
        assert!(handler(&StateUpdate::Power(false)).is_empty());
    }

    #[test]
    fn test_unmute_resync_enquires_volume() {
        let handlers = default_handlers();
        let (_, handler) = handlers
            .iter()
            .find(|(attr, _)| *attr == Attribute::Mute)
            .expect("mute handler must be registered");

        assert_eq!(
            handler(&StateUpdate::Mute(false)),
            vec![BraviaRequest::enquiry(bravia::CMD_VOLUME)]
        );
        assert!(handler(&StateUpdate::Mute(true)).is_empty());
    }
}
