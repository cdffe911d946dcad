use super::exchange::{EndpointSpec, Io};

/// Something a [`crate::session::Session`] can open a stream on.
///
/// Backends describe their endpoints in host terms; everything after that
/// goes through the generic exchange code.
pub trait Device: Send + Sync {
    fn name(&self) -> &str;
    fn input_endpoints(&self) -> Vec<EndpointSpec>;
    fn output_endpoints(&self) -> Vec<EndpointSpec>;
    fn default_sample_rate(&self) -> f64;

    fn supports_sample_rate(&self, _sample_rate: f64) -> bool {
        true
    }

    fn input_channels(&self) -> usize {
        self.input_endpoints()
            .iter()
            .map(|e| e.first_channel + e.channels)
            .max()
            .unwrap_or(0)
    }

    fn output_channels(&self) -> usize {
        self.output_endpoints()
            .iter()
            .map(|e| e.first_channel + e.channels)
            .max()
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for dyn Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// Source of device time in microseconds, used when the backend hands
/// `run_period` no timestamp of its own.
pub trait DeviceClock: Send {
    fn now_micros(&self) -> Option<i64>;
}

/// Application processing, invoked once per block.
pub trait AudioCallback: Send {
    fn process(&mut self, io: &mut Io<'_>);
}

impl<F> AudioCallback for F
where
    F: FnMut(&mut Io<'_>) + Send,
{
    fn process(&mut self, io: &mut Io<'_>) {
        self(io)
    }
}
