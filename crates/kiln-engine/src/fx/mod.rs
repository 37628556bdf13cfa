//! Shared send-effect buses: reverb, delay and drive.
//!
//! Each bus takes the mono sum of every voice's send tap for one
//! frame and returns its stereo wet contribution to the pre-master
//! bus. Dry signal never passes through a bus.

mod delay;
mod drive;
mod reverb;

pub use delay::DelayBus;
pub use drive::DriveBus;
pub use reverb::ReverbBus;
