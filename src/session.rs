//! Device registry and stream factory.
//!
//! A [`Session`] owns the devices that backends register with it and a
//! transition lock shared by every stream it opens, so suspending or closing
//! the whole session moves all of its streams in lockstep.

use crate::config::AudioStreamConfiguration;
use crate::error::{ErrorCode, PadError, Result};
use crate::hw::control::{ControlGroup, TransitionLock, transition_lock};
use crate::hw::exchange::{Stream, StreamSetup};
use crate::hw::options::StreamOptions;
use crate::hw::traits::{AudioCallback, Device, DeviceClock};
use std::sync::Arc;
use tracing::info;

#[derive(Default)]
pub struct DeviceRegistry {
    devices: Vec<Arc<dyn Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `device`, replacing a device registered under the same name.
    pub fn register(&mut self, device: Arc<dyn Device>) {
        self.devices.retain(|d| d.name() != device.name());
        self.devices.push(device);
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Device>> {
        let pos = self.devices.iter().position(|d| d.name() == name)?;
        Some(self.devices.remove(pos))
    }

    pub fn devices(&self) -> &[Arc<dyn Device>] {
        &self.devices
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Device>> {
        self.devices.iter().find(|d| d.name() == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

pub struct Session {
    registry: DeviceRegistry,
    options: StreamOptions,
    lock: TransitionLock,
    streams: ControlGroup,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_options(StreamOptions::default().with_env())
    }

    pub fn with_options(options: StreamOptions) -> Self {
        let lock = transition_lock();
        Self {
            registry: DeviceRegistry::new(),
            options,
            streams: ControlGroup::new(lock.clone()),
            lock,
        }
    }

    pub fn register(&mut self, device: Arc<dyn Device>) {
        info!("registered device {}", device.name());
        self.registry.register(device);
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn devices(&self) -> &[Arc<dyn Device>] {
        self.registry.devices()
    }

    pub fn find(&self, name: &str) -> Result<Arc<dyn Device>> {
        self.registry.find(name).ok_or_else(|| {
            PadError::soft(ErrorCode::DeviceNotFound, format!("no device named {name:?}"))
        })
    }

    /// First device with outputs, else the first device.
    pub fn default_device(&self) -> Result<Arc<dyn Device>> {
        let devices = self.registry.devices();
        devices
            .iter()
            .find(|d| d.output_channels() > 0)
            .or_else(|| devices.first())
            .cloned()
            .ok_or_else(|| PadError::soft(ErrorCode::DeviceNotFound, "no devices registered"))
    }

    pub fn transition_lock(&self) -> TransitionLock {
        self.lock.clone()
    }

    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    /// Open a stream on the named device.
    pub fn open_stream(
        &self,
        device: &str,
        config: &AudioStreamConfiguration,
        callback: impl AudioCallback + 'static,
        clock: impl DeviceClock + 'static,
    ) -> Result<Stream> {
        let device = self.find(device)?;
        let rate = config.get_sample_rate();
        if !device.supports_sample_rate(rate) {
            return Err(PadError::soft(
                ErrorCode::UnsupportedSampleRate,
                format!("{} does not run at {rate} Hz", device.name()),
            ));
        }
        let setup = StreamSetup {
            config: config.clone(),
            options: self.options,
            inputs: device.input_endpoints(),
            outputs: device.output_endpoints(),
        };
        let stream = Stream::open_with_lock(setup, callback, clock, self.lock.clone())?;
        self.streams.add(stream.control());
        Ok(stream)
    }

    pub fn suspend_all(&self) -> Result<()> {
        self.streams.suspend_all()
    }

    pub fn resume_all(&self) -> Result<()> {
        self.streams.resume_all()
    }

    pub fn close_all(&self) {
        self.streams.close_all();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close_all();
    }
}
