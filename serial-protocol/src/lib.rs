//! Binary Acquisition Protocol
//!
//! # Description
//! This crate implements the device side of a small binary protocol used by a host to configure
//! an ultrasound scanner and to stream raw A-scan samples into it over a point-to-point serial
//! link. Commands are single opcode bytes, see [Opcode]; payloads have no framing and rely on
//! word counts both sides agree on.
//!
//! # Design
//! The [Session] owns the protocol state and the receive buffer for streamed samples. Everything
//! else it needs (the link, a millisecond clock, the configuration it stages into and the
//! indicators it drives) is provided through the [Platform] trait.
//!
//! Waits for payload data are bounded by [PAYLOAD_TIMEOUT]; the session never blocks longer than
//! that on a single command.
//!
//! A separate [LinkMonitor] tracks presence of the programming (S1) and data (S2) endpoints.
#![no_std]

mod link;
pub use link::*;
mod session;
pub use session::*;
mod wire;
pub use wire::*;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// Millisecond timestamp.
pub type Instant = fugit::TimerInstantU32<1000>;

/// Millisecond duration.
pub type Duration = fugit::TimerDurationU32<1000>;

/// Upper bound on the wait for a SETUP or STREAM payload.
pub const PAYLOAD_TIMEOUT: Duration = Duration::from_ticks(1000);

/// Monotonic millisecond time source.
pub trait Clock {
    fn now(&mut self) -> Instant;
}
