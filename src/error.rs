use thiserror::Error;

pub type Result<T> = std::result::Result<T, PadError>;

/// How much of the session survives an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// The operation failed; the device and session remain usable.
    Soft,
    /// The device or session can no longer be trusted.
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ChannelRangeInvalid,
    UnsupportedSampleRate,
    UnsupportedSampleFormat,
    InvalidBufferSize,
    BufferMismatch,
    InvalidState,
    DeviceNotFound,
    DeviceMalfunction,
    HardwareIo,
    Config,
}

#[derive(Debug, Clone, Error)]
#[error("{code:?} ({severity:?}): {message}")]
pub struct PadError {
    pub severity: Severity,
    pub code: ErrorCode,
    pub message: String,
}

impl PadError {
    pub fn soft(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Soft,
            code,
            message: message.into(),
        }
    }

    pub fn hard(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Hard,
            code,
            message: message.into(),
        }
    }

    pub fn is_hard(&self) -> bool {
        self.severity == Severity::Hard
    }
}

impl From<toml::de::Error> for PadError {
    fn from(err: toml::de::Error) -> Self {
        PadError::soft(ErrorCode::Config, err.to_string())
    }
}

impl From<std::io::Error> for PadError {
    fn from(err: std::io::Error) -> Self {
        PadError::soft(ErrorCode::Config, err.to_string())
    }
}
