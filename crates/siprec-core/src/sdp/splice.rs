//! Splicing of the two recording endpoints' descriptions
//!
//! The recording offer carries both forked streams in one description: the
//! session block of the caller-side endpoint, a permanent `t=0 0` timing
//! line, and the caller-side then callee-side media sections. Recording
//! endpoints only ever send, so `a=sendrecv` becomes `a=sendonly`.
//!
//! The recording server answers with one description holding two media
//! sections; [`split_recording_answer`] turns that back into one
//! single-stream description per recording endpoint.

use tracing::debug;

use super::{
    parse_session_description, MediaSection, SdpLine, SessionDescription, ATTRIBUTE, CONNECTION,
};
use crate::errors::SdpError;

const SENDRECV: &str = "sendrecv";
const SENDONLY: &str = "sendonly";

/// The structural pieces of a single-stream endpoint description
struct StreamFragments {
    session: Vec<SdpLine>,
    media: MediaSection,
}

impl StreamFragments {
    fn extract(sdp: &str) -> Result<Self, SdpError> {
        let description = parse_session_description(sdp)?;

        if description.session_value('v').is_none() || description.session_value('o').is_none() {
            return Err(SdpError::MissingFragment {
                fragment: "session header",
            });
        }
        if !description.has_connection() {
            return Err(SdpError::MissingFragment {
                fragment: "connection line",
            });
        }
        if description.session_value(super::TIMING).is_none() {
            return Err(SdpError::MissingFragment {
                fragment: "timing line",
            });
        }
        match description.media_count() {
            0 => {
                return Err(SdpError::MissingFragment {
                    fragment: "media block",
                })
            }
            1 => {}
            found => {
                return Err(SdpError::MediaSectionCount { expected: 1, found });
            }
        }

        let (session, mut media) = description.into_parts();
        let media = media.remove(0);
        if !media.has_attributes() {
            return Err(SdpError::MissingFragment {
                fragment: "attributes block",
            });
        }
        Ok(Self { session, media })
    }

    fn session_connection(&self) -> Option<&str> {
        self.session
            .iter()
            .find(|line| line.kind == CONNECTION)
            .map(|line| line.value.as_str())
    }
}

/// Merge the caller-side and callee-side recording endpoint descriptions
/// into the single two-stream offer sent to the recording server.
pub fn splice_recording_offer(caller_sdp: &str, callee_sdp: &str) -> Result<String, SdpError> {
    let caller = StreamFragments::extract(caller_sdp)?;
    let callee = StreamFragments::extract(callee_sdp)?;

    let session_connection = caller.session_connection().map(str::to_string);
    let callee_connection = callee.session_connection().map(str::to_string);
    let mut callee_media = callee.media;

    // Only the caller's session block survives; callee session attributes
    // move into the callee media block where it has no value of its own.
    for line in callee.session.iter().filter(|l| l.kind == ATTRIBUTE) {
        if !caller.session.contains(line) {
            callee_media.inherit_attribute(line);
        }
    }

    // The callee block inherits the caller's session-level connection unless
    // it names its own address.
    if callee_media.value(CONNECTION).is_none() && callee_connection != session_connection {
        if let Some(connection) = callee_connection {
            callee_media.insert_connection(connection);
        }
    }

    let mut combined =
        SessionDescription::from_parts(caller.session, vec![caller.media, callee_media]);
    combined.set_timing_permanent();
    let rewritten = combined.rewrite_attribute(SENDRECV, SENDONLY);
    debug!(rewritten, "spliced recording offer");

    Ok(combined.to_string())
}

/// Split the recording server's two-stream answer into one description per
/// recording endpoint, caller-side first.
pub fn split_recording_answer(answer: &str) -> Result<(String, String), SdpError> {
    let description = parse_session_description(answer)?;
    if description.media_count() != 2 {
        return Err(SdpError::MediaSectionCount {
            expected: 2,
            found: description.media_count(),
        });
    }

    let (session, mut media) = description.into_parts();
    let second = media.pop();
    let first = media.pop();
    match (first, second) {
        (Some(first), Some(second)) => {
            let caller = SessionDescription::from_parts(session.clone(), vec![first]);
            let callee = SessionDescription::from_parts(session, vec![second]);
            Ok((caller.to_string(), callee.to_string()))
        }
        _ => Err(SdpError::MediaSectionCount {
            expected: 2,
            found: 0,
        }),
    }
}
