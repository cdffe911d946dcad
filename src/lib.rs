//! Backend-independent core of a real-time audio I/O layer.
//!
//! Backends describe their devices as interleaved host-format endpoints and
//! call [`hw::Stream::run_period`] once per hardware period. The stream
//! converts to and from planar [`Sample`] blocks, reblocks to the requested
//! buffer size and invokes the application callback.

pub mod channels;
pub mod config;
pub mod error;
pub mod hw;
pub mod logging;
pub mod session;

/// Canonical sample: nominal full scale is `[-1.0, 1.0]`.
pub type Sample = f64;

pub use channels::{ChannelRange, ChannelRangeSet, Placement};
pub use config::AudioStreamConfiguration;
pub use error::{ErrorCode, PadError, Result, Severity};
pub use hw::{
    AudioCallback, Device, DeviceClock, EndpointSpec, HostSampleFormat, Io, MonotonicClock,
    SampleCodec, Stream, StreamOptions, StreamSetup, StreamStatus,
};
pub use session::{DeviceRegistry, Session};
