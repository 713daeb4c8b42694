//! Driver for LG sets controlled over a serial line.
//!
//! The write path is fire-and-forget: there is no per-command correlation
//! in this protocol, so [`Tv::do_op`] resolves as soon as the frame is on
//! the wire.  A background task consumes the set's asynchronous reply
//! lines; acknowledgements are logged and malformed frames are skipped.
//! The reply stream is advisory only: it does not feed a state cache, and
//! `state()` reports unsupported.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use tv_core::protocol::lg;
use tv_core::{Op, State};

use super::{DriverError, Transport, Tv, TvModel};

/// Configuration for one LG set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LgConfig {
    /// Address of this set on a shared serial bus.
    #[serde(default = "default_set_id")]
    pub set_id: u8,
}

fn default_set_id() -> u8 {
    1
}

impl Default for LgConfig {
    fn default() -> Self {
        Self {
            set_id: default_set_id(),
        }
    }
}

/// Factory registered under `"lg"`.
pub struct LgModel;

impl TvModel for LgModel {
    fn name(&self) -> &'static str {
        "lg"
    }

    fn initialize(
        &self,
        transport: Option<Transport>,
        config: &toml::Value,
    ) -> Result<Box<dyn Tv>, DriverError> {
        let config: LgConfig = config
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| DriverError::bad_config(self.name(), e.to_string()))?;
        let transport = transport
            .ok_or_else(|| DriverError::bad_config(self.name(), "a serial transport is required"))?;
        Ok(Box::new(LgDriver::new(config, transport)))
    }

    fn default_config(&self) -> toml::Value {
        toml::Value::try_from(LgConfig::default())
            .unwrap_or_else(|_| toml::Value::Table(toml::map::Map::new()))
    }
}

/// One LG set on one transport.
pub struct LgDriver {
    set_id: u8,
    writer: Mutex<WriteHalf<Transport>>,
    reader: JoinHandle<()>,
}

impl LgDriver {
    pub fn new(config: LgConfig, transport: Transport) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);
        let reader = tokio::spawn(read_loop(read_half));
        Self {
            set_id: config.set_id,
            writer: Mutex::new(write_half),
            reader,
        }
    }
}

impl Drop for LgDriver {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Consumes reply lines until the transport fails.
///
/// Reply frames end with the letter `x`.  Whatever does not parse is
/// dropped without comment; the set repeats nothing and the control flow
/// never depends on these acknowledgements.
async fn read_loop(read_half: ReadHalf<Transport>) {
    let mut reader = BufReader::new(read_half);
    let mut frame = Vec::new();
    loop {
        frame.clear();
        match reader.read_until(b'x', &mut frame).await {
            Ok(0) => {
                debug!("lg reply stream closed");
                return;
            }
            Ok(_) => {
                if let Some(reply) = lg::parse_reply(&frame) {
                    debug!(
                        sub_command = %(reply.sub_command as char),
                        set_id = reply.set_id,
                        status = %reply.status,
                        "lg acknowledgement"
                    );
                }
            }
            Err(e) => {
                error!("lg reply stream failed: {e}");
                return;
            }
        }
    }
}

#[async_trait]
impl Tv for LgDriver {
    async fn do_op(&self, op: &Op) -> Result<(), DriverError> {
        let frame = lg::frame_for(op).ok_or_else(|| DriverError::unsupported(op))?;
        let bytes = frame.serialize(self.set_id);
        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    fn state(&self) -> Result<State, DriverError> {
        Err(DriverError::Unsupported("state query".to_string()))
    }
}
