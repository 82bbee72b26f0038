//! SIPREC payload construction
//!
//! [`RecordingMetadata`] renders the RFC 7865 XML document and
//! [`MultipartBody`] wraps it together with the spliced offer into the body
//! of the recording INVITE.

pub mod metadata;
pub mod multipart;

pub use metadata::{Participant, RecordingMetadata, METADATA_CONTENT_TYPE, RECORDING_NS};
pub use multipart::{normalize_crlf, BodyPart, MultipartBody, RECORDING_DISPOSITION};
