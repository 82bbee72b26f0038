//! Recording metadata (RFC 7865) generation
//!
//! One recording session, two participants (caller and callee), one stream
//! per direction. The caller sends the first stream and receives the second;
//! the callee the reverse. Identifiers are base64-encoded v4 UUIDs, fresh
//! for every call.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use uuid::Uuid;

use crate::errors::MetadataError;
use crate::signaling::NameAddr;

/// Namespace of the recording metadata schema
pub const RECORDING_NS: &str = "urn:ietf:params:xml:ns:recording:1";

/// Content type of the metadata body part
pub const METADATA_CONTENT_TYPE: &str = "application/rs-metadata+xml";

fn fresh_id() -> String {
    STANDARD.encode(Uuid::new_v4().as_bytes())
}

/// A recorded party
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Address of record, `sip:[user@]host`
    pub aor: String,
    pub name: Option<String>,
}

impl Participant {
    pub fn new(aor: impl Into<String>, name: Option<String>) -> Self {
        Self {
            aor: aor.into(),
            name,
        }
    }

    pub fn from_name_addr(addr: &NameAddr) -> Self {
        Self {
            aor: addr.uri.aor(),
            name: addr.display_name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct ParticipantEntry {
    id: String,
    stream_id: String,
    label: &'static str,
    participant: Participant,
}

/// Metadata document for one recording session
#[derive(Debug, Clone)]
pub struct RecordingMetadata {
    session_id: String,
    sip_session_id: String,
    start_time: DateTime<Utc>,
    caller: ParticipantEntry,
    callee: ParticipantEntry,
}

impl RecordingMetadata {
    /// Metadata for the call with the given SIP Call-ID, starting now
    pub fn new(sip_call_id: impl Into<String>, caller: Participant, callee: Participant) -> Self {
        Self {
            session_id: fresh_id(),
            sip_session_id: sip_call_id.into(),
            start_time: Utc::now(),
            caller: ParticipantEntry {
                id: fresh_id(),
                stream_id: fresh_id(),
                label: "1",
                participant: caller,
            },
            callee: ParticipantEntry {
                id: fresh_id(),
                stream_id: fresh_id(),
                label: "2",
                participant: callee,
            },
        }
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn participant_ids(&self) -> (&str, &str) {
        (&self.caller.id, &self.callee.id)
    }

    pub fn stream_ids(&self) -> (&str, &str) {
        (&self.caller.stream_id, &self.callee.stream_id)
    }

    /// Render the XML document
    pub fn to_xml(&self) -> Result<String, MetadataError> {
        let mut xml = XmlWriter::new();
        let now = self.start_time.to_rfc3339_opts(SecondsFormat::Secs, true);

        xml.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        xml.start("recording", &[("xmlns", RECORDING_NS)])?;
        xml.text_element("datamode", "complete")?;

        xml.start("session", &[("session_id", &self.session_id)])?;
        xml.text_element("sipSessionID", &self.sip_session_id)?;
        xml.text_element("start-time", &now)?;
        xml.end("session")?;

        for entry in [&self.caller, &self.callee] {
            xml.start("participant", &[("participant_id", &entry.id)])?;
            xml.start("nameID", &[("aor", &entry.participant.aor)])?;
            if let Some(name) = &entry.participant.name {
                xml.text_element("name", name)?;
            }
            xml.end("nameID")?;
            xml.end("participant")?;

            xml.start(
                "participantsessionassoc",
                &[("participant_id", &entry.id), ("session_id", &self.session_id)],
            )?;
            xml.text_element("associate-time", &now)?;
            xml.end("participantsessionassoc")?;

            xml.start(
                "stream",
                &[("stream_id", &entry.stream_id), ("session_id", &self.session_id)],
            )?;
            xml.text_element("label", entry.label)?;
            xml.end("stream")?;
        }

        for (entry, peer) in [(&self.caller, &self.callee), (&self.callee, &self.caller)] {
            xml.start("participantstreamassoc", &[("participant_id", &entry.id)])?;
            xml.text_element("send", &entry.stream_id)?;
            xml.text_element("recv", &peer.stream_id)?;
            xml.end("participantstreamassoc")?;
        }

        xml.end("recording")?;
        xml.finish()
    }
}

/// Thin wrapper mapping quick-xml write errors
struct XmlWriter {
    writer: Writer<Vec<u8>>,
}

impl XmlWriter {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), MetadataError> {
        self.writer
            .write_event(event)
            .map_err(|e| MetadataError::Xml(e.to_string()))
    }

    fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), MetadataError> {
        let mut element = BytesStart::new(name);
        for attribute in attributes {
            element.push_attribute(*attribute);
        }
        self.event(Event::Start(element))
    }

    fn end(&mut self, name: &str) -> Result<(), MetadataError> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<(), MetadataError> {
        self.start(name, &[])?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn finish(self) -> Result<String, MetadataError> {
        String::from_utf8(self.writer.into_inner()).map_err(|_| MetadataError::Encoding)
    }
}
