//! # RVoIP SIPREC Core
//!
//! Call-recording B2BUA orchestration. An inbound call is bridged to its
//! original destination through a media-server conference while both
//! directions of audio are forked to a SIPREC recording server.
//!
//! ## Architecture
//!
//! - `sdp`: structured session descriptions and the recording offer splicer
//! - `siprec`: RFC 7865 metadata and the `multipart/mixed` offer body
//! - `media`: media-server seam and the four-endpoint conference topology
//! - `signaling`: SIP signaling seam, URIs and name-addr values
//! - `orchestrator`: per-call session state, setup sequence, hangup
//!   supervision and cleanup
//! - `ingress`: classification of inbound requests
//! - `config`, `logging`, `errors`: configuration, tracing setup and error
//!   types
//!
//! The SIP stack and the media-server control protocol plug in through the
//! [`SignalingLayer`] and [`MediaServer`] traits.

pub mod config;
pub mod errors;
pub mod ingress;
pub mod logging;
pub mod media;
pub mod orchestrator;
pub mod sdp;
pub mod signaling;
pub mod siprec;

// Re-export key types
pub use config::RecorderConfig;
pub use errors::{CallError, ErrorClass, Result};
pub use ingress::{IngressDecision, IngressFilter};
pub use logging::{call_span, setup_logging};
pub use media::{Conference, Endpoint, EndpointRole, MediaConnection, MediaServer};
pub use orchestrator::{ActiveCall, CallEnd, CallOrchestrator, CallSession, RecordingStatus};
pub use signaling::{Dialog, InboundCall, InviteResponder, SignalingLayer};
