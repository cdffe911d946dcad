use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SCALAR_TRANSPOSE_ENV: &str = "PAD_SCALAR_TRANSPOSE";
pub const NPERIODS_ENV: &str = "PAD_NPERIODS";
pub const SYNC_MODE_ENV: &str = "PAD_SYNC_MODE";
pub const PROFILE_ENV: &str = "PAD_PROFILE";

/// Engine-side knobs that adapters do not get from the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    pub nperiods: usize,
    pub sync_mode: bool,
    pub input_latency_frames: usize,
    pub output_latency_frames: usize,
    /// Largest hardware period handled in one pass; longer periods are split.
    pub max_period_frames: usize,
    /// Rounded up to a power of two.
    pub ring_capacity_frames: usize,
    pub scalar_transpose: bool,
    /// Log a period timing summary once per second.
    pub profile: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            nperiods: 1,
            sync_mode: true,
            input_latency_frames: 0,
            output_latency_frames: 0,
            max_period_frames: 4096,
            ring_capacity_frames: 16384,
            scalar_transpose: cfg!(feature = "scalar"),
            profile: false,
        }
    }
}

impl StreamOptions {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Apply `PAD_*` environment overrides on top of `self`.
    pub fn with_env(mut self) -> Self {
        if env_flag(SCALAR_TRANSPOSE_ENV) {
            self.scalar_transpose = true;
        }
        if let Some(n) = env_usize(NPERIODS_ENV) {
            self.nperiods = n.max(1);
        }
        if let Ok(v) = std::env::var(SYNC_MODE_ENV) {
            self.sync_mode = parse_flag(&v);
        }
        if env_flag(PROFILE_ENV) {
            self.profile = true;
        }
        self
    }

    pub fn ring_capacity(&self, period_frames: usize, block_frames: usize) -> usize {
        let needed = period_frames
            .saturating_add(block_frames)
            .saturating_mul(2)
            .max(self.ring_capacity_frames)
            .max(1);
        needed.next_power_of_two()
    }
}

fn parse_flag(v: &str) -> bool {
    let s = v.trim().to_ascii_lowercase();
    s == "1" || s == "true" || s == "yes" || s == "on"
}

pub fn env_flag(key: &str) -> bool {
    std::env::var(key).ok().map(|v| parse_flag(&v)).unwrap_or(false)
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let opts = StreamOptions::from_toml_str("nperiods = 3\noutput_latency_frames = 64").unwrap();
        assert_eq!(opts.nperiods, 3);
        assert_eq!(opts.output_latency_frames, 64);
        assert_eq!(opts.max_period_frames, StreamOptions::default().max_period_frames);
    }

    #[test]
    fn bad_toml_is_config_error() {
        let err = StreamOptions::from_toml_str("nperiods = \"many\"").unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Config);
    }

    #[test]
    fn ring_capacity_is_power_of_two_and_large_enough() {
        let opts = StreamOptions {
            ring_capacity_frames: 1000,
            ..StreamOptions::default()
        };
        assert_eq!(opts.ring_capacity(256, 256), 1024);
        assert_eq!(opts.ring_capacity(4000, 512), 16384);
    }

    #[test]
    fn flag_parsing() {
        assert!(parse_flag(" Yes "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("off"));
    }
}
