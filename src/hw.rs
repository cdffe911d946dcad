pub mod codec;
pub mod control;
pub mod convert;
pub mod exchange;
pub mod latency;
pub mod options;
pub mod planar;
pub mod ports;
pub mod ring;
pub mod sync;
pub mod traits;
pub mod transpose;

pub use codec::{HostSampleFormat, SampleCodec};
pub use control::{ControlGroup, StreamControl, StreamStatus, TransitionLock};
pub use exchange::{EndpointSpec, Io, PeriodReport, Stream, StreamSetup, StreamStats};
pub use options::StreamOptions;
pub use planar::{Planar, PlanarMut};
pub use ring::RingBuffer;
pub use sync::{MonotonicClock, NoClock};
pub use traits::{AudioCallback, Device, DeviceClock};
pub use transpose::TransposePlan;
