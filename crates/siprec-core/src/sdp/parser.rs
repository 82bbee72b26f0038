//! SDP line parsing
//!
//! Each SDP line has the format `<type>=<value>` where type is a single
//! character. Values are kept verbatim; only the line terminator (CRLF or a
//! bare LF) is consumed.

use nom::{
    IResult,
    character::complete::{char, line_ending, not_line_ending, satisfy},
    combinator::opt,
    sequence::separated_pair,
};

use super::{SdpLine, SessionDescription};
use crate::errors::SdpError;

/// Parse one SDP line into its type character and value
///
/// ```
/// use rvoip_siprec_core::sdp::parse_sdp_line;
///
/// let (rest, (kind, value)) = parse_sdp_line("a=rtpmap:0 PCMU/8000\r\nm=audio").unwrap();
/// assert_eq!(kind, 'a');
/// assert_eq!(value, "rtpmap:0 PCMU/8000");
/// assert_eq!(rest, "m=audio");
/// ```
pub fn parse_sdp_line(input: &str) -> IResult<&str, (char, &str)> {
    let (input, (kind, value)) = separated_pair(
        satisfy(|c| c.is_ascii_alphabetic()),
        char('='),
        not_line_ending,
    )(input)?;
    let (input, _) = opt(line_ending)(input)?;
    Ok((input, (kind, value)))
}

/// Parse a complete session description
///
/// Blank lines are skipped. Any other line that is not `<type>=<value>`
/// fails the whole parse.
pub fn parse_session_description(text: &str) -> Result<SessionDescription, SdpError> {
    let mut description = SessionDescription::default();
    let mut rest = text;

    loop {
        rest = rest.trim_start_matches(['\r', '\n']);
        if rest.is_empty() {
            break;
        }
        match parse_sdp_line(rest) {
            Ok((next, (kind, value))) => {
                description.push(SdpLine::new(kind, value));
                rest = next;
            }
            Err(_) => {
                let line = rest.lines().next().unwrap_or_default();
                return Err(SdpError::InvalidLine {
                    line: line.to_string(),
                });
            }
        }
    }

    if description.is_empty() {
        return Err(SdpError::Empty);
    }
    Ok(description)
}
