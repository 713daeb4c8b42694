//! Wire codecs, one sub-module per television family.
//!
//! Each codec is a pure mapping in both directions: a domain [`crate::Op`]
//! to the vendor's frame bytes, and inbound frame bytes back to typed
//! values.  Neither side performs I/O; the drivers in the daemon crate own
//! the transports and call into these functions.

pub mod bravia;
pub mod lg;
