//! # tv-core
//!
//! Shared library for the tvd control plane: the model-agnostic operation
//! vocabulary and the wire codecs for the supported television families.
//!
//! This crate has no dependencies on sockets, serial ports, or the async
//! runtime.  Everything here is pure data transformation, which keeps the
//! codecs fully unit-testable and lets the drivers in the daemon crate stay
//! small.
//!
//! - **`domain`** – The vocabulary clients speak: attributes, operators,
//!   typed operation values, channels, input selections, and the cached
//!   device state drivers maintain.
//!
//! - **`protocol`** – One sub-module per television family.  Each maps a
//!   domain [`Op`] to the vendor's wire bytes and parses inbound frames back
//!   into typed state updates.

pub mod domain;
pub mod protocol;

pub use domain::channel::{Antenna, Channel, ChannelParseError, Tune};
pub use domain::ops::{
    clamp_level, Attribute, Connection, InputNumber, Op, Operator, State, StateUpdate, Value,
};
