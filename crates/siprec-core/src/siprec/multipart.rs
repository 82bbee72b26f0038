//! `multipart/mixed` body for the recording INVITE

use std::fmt;

use crate::signaling::SDP_CONTENT_TYPE;

use super::metadata::METADATA_CONTENT_TYPE;

/// Disposition of the metadata part
pub const RECORDING_DISPOSITION: &str = "recording-session";

/// Rewrite every line ending as CRLF without doubling existing ones
pub fn normalize_crlf(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}

/// One part of a multipart body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyPart {
    pub content_type: String,
    pub disposition: Option<String>,
    pub body: String,
}

impl BodyPart {
    pub fn new(content_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            disposition: None,
            body: body.into(),
        }
    }

    pub fn with_disposition(mut self, disposition: impl Into<String>) -> Self {
        self.disposition = Some(disposition.into());
        self
    }
}

/// A `multipart/mixed` body. Serializes with CRLF line endings throughout
/// and ends with the closing delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartBody {
    boundary: String,
    parts: Vec<BodyPart>,
}

impl MultipartBody {
    pub fn new(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    pub fn part(mut self, part: BodyPart) -> Self {
        self.parts.push(part);
        self
    }

    /// The SIPREC offer: spliced SDP first, metadata second
    pub fn recording(boundary: impl Into<String>, sdp: &str, metadata_xml: &str) -> Self {
        Self::new(boundary)
            .part(BodyPart::new(SDP_CONTENT_TYPE, sdp))
            .part(
                BodyPart::new(METADATA_CONTENT_TYPE, metadata_xml)
                    .with_disposition(RECORDING_DISPOSITION),
            )
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn parts(&self) -> &[BodyPart] {
        &self.parts
    }

    /// Value for the Content-Type header
    pub fn content_type(&self) -> String {
        format!("multipart/mixed;boundary={}", self.boundary)
    }
}

impl fmt::Display for MultipartBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            write!(f, "--{}\r\n", self.boundary)?;
            if let Some(disposition) = &part.disposition {
                write!(f, "Content-Disposition: {}\r\n", disposition)?;
            }
            write!(f, "Content-Type: {}\r\n\r\n", part.content_type)?;
            // The CRLF before each boundary line is part of the delimiter
            f.write_str(&normalize_crlf(&part.body))?;
            f.write_str("\r\n")?;
        }
        write!(f, "--{}--", self.boundary)
    }
}
