//! # tvd
//!
//! Daemon crate for the television control plane.  The pure codecs live in
//! `tv-core`; this crate owns everything that touches the outside world:
//!
//! - **`driver`** – The [`driver::Tv`] trait, the model registry, and the
//!   two concrete drivers (LG over a serial line, Sony Bravia over TCP).
//! - **`config`** – TOML configuration for the daemon and its devices.
//! - **`http`** – The thin axum adapter that turns HTTP requests into
//!   operations against a named driver.

pub mod config;
pub mod driver;
pub mod http;
