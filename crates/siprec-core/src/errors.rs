//! Error types for the siprec-core library
//!
//! Each collaborator seam has its own error enum. The orchestrator funnels
//! everything into [`CallError`], whose [`ErrorClass`] decides whether a
//! failure aborts the call or is only logged.

use std::time::Duration;
use thiserror::Error;

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, CallError>;

/// Result type for media-server operations
pub type MediaResult<T> = std::result::Result<T, MediaError>;

/// Result type for signaling operations
pub type SignalingResult<T> = std::result::Result<T, SignalingError>;

/// Errors raised while parsing or reshaping session descriptions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdpError {
    /// The description had no lines at all
    #[error("Empty session description")]
    Empty,

    /// A line did not have the `<type>=<value>` shape
    #[error("Invalid SDP line: {line}")]
    InvalidLine { line: String },

    /// A structural fragment required for splicing is absent
    #[error("Session description is missing its {fragment}")]
    MissingFragment { fragment: &'static str },

    /// Wrong number of media sections for the operation
    #[error("Expected {expected} media section(s), found {found}")]
    MediaSectionCount { expected: usize, found: usize },
}

/// Errors raised while building the recording metadata document
#[derive(Error, Debug, Clone)]
pub enum MetadataError {
    #[error("XML write failed: {0}")]
    Xml(String),

    #[error("Metadata document is not valid UTF-8")]
    Encoding,
}

/// Errors surfaced by the media-server control seam
#[derive(Error, Debug, Clone)]
pub enum MediaError {
    #[error("Media server connection failed: {0}")]
    Connection(String),

    #[error("Failed to allocate {role} endpoint: {reason}")]
    EndpointAllocation { role: String, reason: String },

    #[error("Conference operation failed: {0}")]
    Conference(String),

    #[error("Failed to join {role} endpoint to conference: {reason}")]
    Join { role: String, reason: String },

    #[error("Conference command '{command}' failed: {reason}")]
    Command { command: String, reason: String },

    #[error("SDP negotiation failed: {0}")]
    Negotiation(String),

    #[error("Media task aborted: {0}")]
    Aborted(String),
}

/// Errors surfaced by the SIP signaling seam
#[derive(Error, Debug, Clone)]
pub enum SignalingError {
    /// The far end answered with a non-success final response
    #[error("Request failed with {status} {reason}")]
    Status { status: u16, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    /// A dialog came up without a session description
    #[error("Dialog established without a remote session description")]
    MissingAnswer,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid SIP URI: {0}")]
    InvalidUri(String),
}

impl SignalingError {
    /// Final status code carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            SignalingError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Authentication challenges are retried by the caller, not failures
    pub fn is_challenge(&self) -> bool {
        matches!(self.status(), Some(401) | Some(407))
    }
}

/// Errors from the best-effort recording leg
#[derive(Error, Debug, Clone)]
pub enum RecordingError {
    #[error("Recording offer could not be built: {0}")]
    Sdp(#[from] SdpError),

    #[error("Recording metadata could not be built: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Recording dialog failed: {0}")]
    Signaling(#[from] SignalingError),

    #[error("Recording endpoint negotiation failed: {0}")]
    Media(#[from] MediaError),

    #[error("Call ended before the recording leg was established")]
    Cancelled,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

/// Failure classes of a call attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Media connection or topology build failed
    Setup,
    /// The destination asked for credentials
    Challenge,
    /// Any other failure establishing the primary call
    Bridging,
    /// The recording leg failed; the call continues
    Recording,
    /// Unexpected SDP or XML shape
    MalformedData,
    /// The call ended while setup was still in progress
    Cancelled,
}

/// Errors produced while orchestrating a recorded call
#[derive(Error, Debug, Clone)]
pub enum CallError {
    #[error("Media server connection failed: {0}")]
    MediaConnect(MediaError),

    #[error("Media topology build failed: {0}")]
    Topology(MediaError),

    #[error("Inbound offer is malformed: {0}")]
    MalformedOffer(SdpError),

    #[error("Bridging failed: {0}")]
    Bridge(SignalingError),

    #[error("Outgoing endpoint re-negotiation failed: {0}")]
    Renegotiation(MediaError),

    #[error("Recording leg failed: {0}")]
    Recording(#[from] RecordingError),

    #[error("Call setup did not complete within {0:?}")]
    SetupTimeout(Duration),

    #[error("Call ended during setup")]
    Cancelled,
}

impl CallError {
    /// Classify the failure
    pub fn class(&self) -> ErrorClass {
        match self {
            CallError::MediaConnect(_) | CallError::Topology(_) | CallError::SetupTimeout(_) => {
                ErrorClass::Setup
            }
            CallError::MalformedOffer(_) => ErrorClass::MalformedData,
            CallError::Bridge(e) if e.is_challenge() => ErrorClass::Challenge,
            CallError::Bridge(SignalingError::Cancelled) => ErrorClass::Cancelled,
            CallError::Bridge(_) | CallError::Renegotiation(_) => ErrorClass::Bridging,
            CallError::Recording(_) => ErrorClass::Recording,
            CallError::Cancelled => ErrorClass::Cancelled,
        }
    }

    /// Fatal failures are reported to the caller with a failure response.
    /// Challenges and recording failures are not.
    pub fn is_fatal(&self) -> bool {
        !matches!(self.class(), ErrorClass::Recording | ErrorClass::Challenge)
    }

    pub fn is_challenge(&self) -> bool {
        self.class() == ErrorClass::Challenge
    }
}
