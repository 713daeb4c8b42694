//! Driver abstraction: the [`Tv`] trait every model implements, the error
//! vocabulary drivers speak, and the registry that maps a model name to its
//! factory.
//!
//! The registry is populated once during process initialization and is
//! read-only afterwards, so lookups need no locking.  Clients hold driver
//! handles explicitly; there is no ambient "current device".

pub mod bravia;
pub mod lg;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::SerialPortBuilderExt;

use tv_core::{Op, State};

// ── Transports ────────────────────────────────────────────────────────────────

/// A bidirectional byte stream a driver can be bound to.  Serial lines and
/// TCP sockets both qualify; drivers treat the stream as opaque.
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> TransportStream for T {}

pub type Transport = Box<dyn TransportStream>;

/// Opens a serial port as a driver transport.
///
/// # Errors
///
/// Returns [`DriverError::Io`] when the port cannot be opened.
pub fn open_serial(path: &str, baud: u32) -> Result<Transport, DriverError> {
    let stream = tokio_serial::new(path, baud)
        .open_native_async()
        .map_err(|e| DriverError::Io(std::io::Error::other(e)))?;
    Ok(Box::new(stream))
}

/// Opens a TCP connection as a driver transport, for sets attached through
/// a serial-device server.
///
/// # Errors
///
/// Returns [`DriverError::Io`] when the connection fails.
pub async fn open_tcp(addr: &str) -> Result<Transport, DriverError> {
    let stream = tokio::net::TcpStream::connect(addr).await?;
    Ok(Box::new(stream))
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors surfaced by driver construction and operation dispatch.
#[derive(Debug, Error)]
pub enum DriverError {
    /// No factory is registered under this model name.
    #[error("unknown model {0:?}")]
    UnknownModel(String),

    /// The model-specific configuration did not match the driver's schema.
    #[error("invalid configuration for model {model}: {reason}")]
    BadConfig { model: String, reason: String },

    /// The driver cannot realize this attribute/operator combination.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// An I/O failure on the underlying byte stream.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection failed while the request was outstanding.
    #[error("connection lost before the device answered")]
    ConnectionLost,

    /// The device rejected the command.
    #[error("device error: {0}")]
    Device(String),

    /// The device did not answer within the request deadline.
    #[error("request timed out")]
    Timeout,

    /// The driver is shutting down; the request was not delivered.
    #[error("driver is shutting down")]
    Cancelled,

    /// The driver's background tasks are gone.
    #[error("driver task is gone")]
    Closed,
}

impl DriverError {
    pub fn unsupported(op: &Op) -> Self {
        DriverError::Unsupported(format!("{} {}", op.attribute, op.operator))
    }

    pub fn bad_config(model: &str, reason: impl Into<String>) -> Self {
        DriverError::BadConfig {
            model: model.to_string(),
            reason: reason.into(),
        }
    }
}

// ── Driver interface ──────────────────────────────────────────────────────────

/// A handle to one television.
#[async_trait]
pub trait Tv: Send + Sync {
    /// Performs one operation, resolving once the driver knows its outcome.
    ///
    /// For correlated protocols that means the device's answer arrived; for
    /// fire-and-forget protocols it means the write completed.
    ///
    /// # Errors
    ///
    /// [`DriverError::Unsupported`] when the model cannot express the
    /// operation, otherwise transport or device failures.
    async fn do_op(&self, op: &Op) -> Result<(), DriverError>;

    /// Returns a copy of the cached device state.
    ///
    /// # Errors
    ///
    /// [`DriverError::Unsupported`] for models without a state mirror.
    fn state(&self) -> Result<State, DriverError>;
}

/// Factory for one television model.
pub trait TvModel: Send + Sync {
    /// The lowercase registry name.
    fn name(&self) -> &'static str;

    /// Builds a driver bound to `transport` and the model-specific
    /// configuration table.  Models that own their connection (Bravia)
    /// ignore the transport.
    ///
    /// Must be called within a tokio runtime; drivers spawn their
    /// background tasks here.
    ///
    /// # Errors
    ///
    /// [`DriverError::BadConfig`] when the configuration does not
    /// deserialize into the model's schema or a required transport is
    /// missing.
    fn initialize(
        &self,
        transport: Option<Transport>,
        config: &toml::Value,
    ) -> Result<Box<dyn Tv>, DriverError>;

    /// The model's default configuration table.
    fn default_config(&self) -> toml::Value;
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Mapping from model name to driver factory.
#[derive(Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<dyn TvModel>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in model registered.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(lg::LgModel));
        registry.register(Arc::new(bravia::BraviaModel));
        registry
    }

    pub fn register(&mut self, model: Arc<dyn TvModel>) {
        self.models.insert(model.name().to_string(), model);
    }

    fn get(&self, name: &str) -> Result<&Arc<dyn TvModel>, DriverError> {
        self.models
            .get(name)
            .ok_or_else(|| DriverError::UnknownModel(name.to_string()))
    }

    /// Instantiates a driver for `name`.
    ///
    /// # Errors
    ///
    /// [`DriverError::UnknownModel`] on a registry miss; otherwise whatever
    /// the factory reports.
    pub fn new_driver(
        &self,
        name: &str,
        transport: Option<Transport>,
        config: &toml::Value,
    ) -> Result<Box<dyn Tv>, DriverError> {
        self.get(name)?.initialize(transport, config)
    }

    /// Returns the default configuration table for `name`.
    ///
    /// # Errors
    ///
    /// [`DriverError::UnknownModel`] on a registry miss.
    pub fn new_config(&self, name: &str) -> Result<toml::Value, DriverError> {
        Ok(self.get(name)?.default_config())
    }
}

/// The process-wide registry, initialized on first use and read-only after.
pub fn registry() -> &'static ModelRegistry {
    static REGISTRY: OnceLock<ModelRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ModelRegistry::builtin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_knows_both_models() {
        let registry = ModelRegistry::builtin();
        assert!(registry.new_config("lg").is_ok());
        assert!(registry.new_config("bravia").is_ok());
    }

    #[test]
    fn test_unknown_model_is_reported_by_name() {
        let registry = ModelRegistry::builtin();
        let err = registry.new_config("plasma9000").unwrap_err();
        assert!(matches!(err, DriverError::UnknownModel(name) if name == "plasma9000"));
    }

    #[test]
    fn test_process_registry_is_stable_across_calls() {
        let a: *const ModelRegistry = registry();
        let b: *const ModelRegistry = registry();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_new_driver_surfaces_factory_config_errors() {
        let registry = ModelRegistry::builtin();
        // The bravia factory requires an address.
        let empty = toml::Value::Table(toml::map::Map::new());
        let err = registry
            .new_driver("bravia", None, &empty)
            .err()
            .expect("expected error");
        assert!(matches!(err, DriverError::BadConfig { model, .. } if model == "bravia"));
    }

    #[test]
    fn test_unsupported_error_names_the_operation() {
        let op = Op::toggle(tv_core::Attribute::Power);
        let err = DriverError::unsupported(&op);
        assert_eq!(err.to_string(), "unsupported operation: power toggle");
    }
}
