//! Adapter implementations of the port traits.
//!
//! `live` talks to the real clock and disk; `memory` keeps everything in
//! process so engine behaviour can be tested deterministically.

pub mod live;
pub mod memory;
