//! Session description handling
//!
//! A session description is kept as an ordered list of typed lines split
//! into the session-level block and one block per `m=` section. Lines that
//! are not touched keep their exact order and value; serialization always
//! uses CRLF line endings.

pub mod parser;
pub mod splice;

use std::fmt;

pub use parser::{parse_sdp_line, parse_session_description};
pub use splice::{split_recording_answer, splice_recording_offer};

/// Line type of a connection (`c=`) line
pub const CONNECTION: char = 'c';
/// Line type of a timing (`t=`) line
pub const TIMING: char = 't';
/// Line type of an attribute (`a=`) line
pub const ATTRIBUTE: char = 'a';
/// Line type of a media (`m=`) line
pub const MEDIA: char = 'm';

/// A single `<type>=<value>` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpLine {
    pub kind: char,
    pub value: String,
}

impl SdpLine {
    pub fn new(kind: char, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn is_attribute(&self, value: &str) -> bool {
        self.kind == ATTRIBUTE && self.value == value
    }

    /// Attribute name, with the four direction attributes sharing one name
    pub fn attribute_name(&self) -> Option<&str> {
        if self.kind != ATTRIBUTE {
            return None;
        }
        let name = self.value.split(':').next().unwrap_or_default();
        match name {
            "sendrecv" | "sendonly" | "recvonly" | "inactive" => Some("direction"),
            _ => Some(name),
        }
    }
}

impl fmt::Display for SdpLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind, self.value)
    }
}

/// One `m=` line and every line up to the next `m=`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSection {
    lines: Vec<SdpLine>,
}

impl MediaSection {
    fn new(media_line: SdpLine) -> Self {
        Self {
            lines: vec![media_line],
        }
    }

    /// The `m=` line value
    pub fn media_line(&self) -> &str {
        &self.lines[0].value
    }

    pub fn lines(&self) -> &[SdpLine] {
        &self.lines
    }

    /// Value of the first line of the given type
    pub fn value(&self, kind: char) -> Option<&str> {
        self.lines
            .iter()
            .find(|line| line.kind == kind)
            .map(|line| line.value.as_str())
    }

    pub fn has_attributes(&self) -> bool {
        self.lines.iter().any(|line| line.kind == ATTRIBUTE)
    }

    /// Append an attribute unless one of the same name is already present
    pub fn inherit_attribute(&mut self, line: &SdpLine) -> bool {
        let Some(name) = line.attribute_name() else {
            return false;
        };
        if self.lines.iter().any(|l| l.attribute_name() == Some(name)) {
            return false;
        }
        self.lines.push(line.clone());
        true
    }

    /// Insert a media-level connection line in its RFC 8866 position,
    /// directly after the `m=` line and any `i=` lines.
    pub fn insert_connection(&mut self, value: impl Into<String>) {
        let position = 1 + self.lines[1..]
            .iter()
            .take_while(|line| line.kind == 'i')
            .count();
        self.lines.insert(position, SdpLine::new(CONNECTION, value));
    }
}

/// A parsed session description
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDescription {
    session: Vec<SdpLine>,
    media: Vec<MediaSection>,
}

impl SessionDescription {
    /// Assemble a description from a session block and media sections
    pub fn from_parts(session: Vec<SdpLine>, media: Vec<MediaSection>) -> Self {
        Self { session, media }
    }

    /// Append a line, opening a new media section on `m=`
    pub fn push(&mut self, line: SdpLine) {
        if line.kind == MEDIA {
            self.media.push(MediaSection::new(line));
        } else if let Some(section) = self.media.last_mut() {
            section.lines.push(line);
        } else {
            self.session.push(line);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.session.is_empty() && self.media.is_empty()
    }

    pub fn session_lines(&self) -> &[SdpLine] {
        &self.session
    }

    pub fn media(&self) -> &[MediaSection] {
        &self.media
    }

    pub fn media_count(&self) -> usize {
        self.media.len()
    }

    pub fn into_parts(self) -> (Vec<SdpLine>, Vec<MediaSection>) {
        (self.session, self.media)
    }

    /// Value of the first session-level line of the given type
    pub fn session_value(&self, kind: char) -> Option<&str> {
        self.session
            .iter()
            .find(|line| line.kind == kind)
            .map(|line| line.value.as_str())
    }

    /// Whether a connection line exists at session or media level
    pub fn has_connection(&self) -> bool {
        self.session_value(CONNECTION).is_some()
            || self.media.iter().any(|m| m.value(CONNECTION).is_some())
    }

    /// Force the timing line to `0 0`. Returns false if there is none.
    pub fn set_timing_permanent(&mut self) -> bool {
        match self.session.iter_mut().find(|line| line.kind == TIMING) {
            Some(line) => {
                line.value = "0 0".to_string();
                true
            }
            None => false,
        }
    }

    /// Rewrite every attribute line equal to `from` into `to`, at any level.
    /// Returns the number of lines rewritten.
    pub fn rewrite_attribute(&mut self, from: &str, to: &str) -> usize {
        let mut rewritten = 0;
        let lines = self
            .session
            .iter_mut()
            .chain(self.media.iter_mut().flat_map(|m| m.lines.iter_mut()));
        for line in lines {
            if line.is_attribute(from) {
                line.value = to.to_string();
                rewritten += 1;
            }
        }
        rewritten
    }

    /// Iterate every line in document order
    pub fn lines(&self) -> impl Iterator<Item = &SdpLine> {
        self.session
            .iter()
            .chain(self.media.iter().flat_map(|m| m.lines.iter()))
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines() {
            write!(f, "{}\r\n", line)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for SessionDescription {
    type Err = crate::errors::SdpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_session_description(s)
    }
}
