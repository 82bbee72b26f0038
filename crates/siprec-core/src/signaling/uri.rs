//! SIP URI and name-addr parsing
//!
//! Only what the recorder needs: scheme, user, host and port of a URI, and
//! the display name plus URI of a From/To header value.

use std::fmt;
use std::str::FromStr;

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{is_not, tag_no_case, take_while, take_while1},
    character::complete::{anychar, char, digit1, multispace0, multispace1, one_of},
    combinator::{all_consuming, map, map_res, opt, recognize, rest, value},
    multi::{fold_many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
};

use crate::errors::SignalingError;

/// Default SIP port, used when a URI names none
pub const DEFAULT_SIP_PORT: u16 = 5060;

/// URI scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Sip,
    Sips,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Sip => "sip",
            Scheme::Sips => "sips",
        }
    }
}

/// A parsed `sip:` or `sips:` URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipUri {
    pub scheme: Scheme,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    /// URI parameters and headers, verbatim (including the leading `;` or `?`)
    pub params: String,
}

impl SipUri {
    /// Port, falling back to 5060
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SIP_PORT)
    }

    /// Address of record: `sip:[user@]host`, port and parameters dropped
    pub fn aor(&self) -> String {
        match &self.user {
            Some(user) => format!("{}:{}@{}", self.scheme.as_str(), user, self.host),
            None => format!("{}:{}", self.scheme.as_str(), self.host),
        }
    }
}

impl FromStr for SipUri {
    type Err = SignalingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        all_consuming(sip_uri)(s.trim())
            .map(|(_, uri)| uri)
            .map_err(|_| SignalingError::InvalidUri(s.to_string()))
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme.as_str())?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        write!(f, "{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        write!(f, "{}", self.params)
    }
}

/// A From/To header value: optional display name, URI, header parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameAddr {
    pub display_name: Option<String>,
    pub uri: SipUri,
    /// Header parameters such as `;tag=...`, verbatim
    pub params: String,
}

impl FromStr for NameAddr {
    type Err = SignalingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        all_consuming(alt((name_addr, addr_spec)))(s.trim())
            .map(|(_, addr)| addr)
            .map_err(|_| SignalingError::InvalidUri(s.to_string()))
    }
}

impl fmt::Display for NameAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.display_name {
            write!(f, "\"{}\" ", name.replace('"', "\\\""))?;
        }
        write!(f, "<{}>{}", self.uri, self.params)
    }
}

fn is_user_char(c: char) -> bool {
    !matches!(c, ':' | '@' | '<' | '>' | '"') && !c.is_whitespace()
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-.!%*_+`'~".contains(c)
}

fn scheme(input: &str) -> IResult<&str, Scheme> {
    alt((
        value(Scheme::Sips, tag_no_case("sips:")),
        value(Scheme::Sip, tag_no_case("sip:")),
    ))(input)
}

// userinfo = user [ ":" password ] "@"; the password is dropped
fn userinfo(input: &str) -> IResult<&str, &str> {
    terminated(
        take_while1(is_user_char),
        pair(
            opt(preceded(char(':'), take_while(is_user_char))),
            char('@'),
        ),
    )(input)
}

/// `hostname`, IPv4 address or bracketed IPv6 reference
pub(crate) fn host(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(delimited(
            char('['),
            take_while1(|c: char| c.is_ascii_hexdigit() || c == ':' || c == '.'),
            char(']'),
        )),
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '.'),
    ))(input)
}

pub(crate) fn port(input: &str) -> IResult<&str, u16> {
    map_res(digit1, str::parse::<u16>)(input)
}

// The URI up to, not including, its parameters
fn uri_base(input: &str) -> IResult<&str, SipUri> {
    map(
        tuple((
            scheme,
            opt(userinfo),
            host,
            opt(preceded(char(':'), port)),
        )),
        |(scheme, user, host, port)| SipUri {
            scheme,
            user: user.map(str::to_string),
            host: host.to_string(),
            port,
            params: String::new(),
        },
    )(input)
}

fn sip_uri(input: &str) -> IResult<&str, SipUri> {
    let (input, mut uri) = uri_base(input)?;
    let (input, params) = recognize(opt(pair(
        one_of(";?"),
        take_while(|c: char| c != '>' && !c.is_whitespace()),
    )))(input)?;
    uri.params = params.to_string();
    Ok((input, uri))
}

// quoted-string with backslash escapes removed
fn quoted_string(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        fold_many0(
            alt((is_not("\\\""), preceded(char('\\'), recognize(anychar)))),
            String::new,
            |mut acc, part| {
                acc.push_str(part);
                acc
            },
        ),
        char('"'),
    )(input)
}

fn display_name(input: &str) -> IResult<&str, String> {
    alt((
        quoted_string,
        map(
            recognize(separated_list1(multispace1, take_while1(is_token_char))),
            str::to_string,
        ),
    ))(input)
}

// Header parameters such as `;tag=...`, kept verbatim
fn header_params(input: &str) -> IResult<&str, &str> {
    preceded(multispace0, recognize(opt(pair(char(';'), rest))))(input)
}

fn name_addr(input: &str) -> IResult<&str, NameAddr> {
    map(
        tuple((
            opt(terminated(display_name, multispace0)),
            delimited(char('<'), sip_uri, char('>')),
            header_params,
        )),
        |(display_name, uri, params)| NameAddr {
            display_name: display_name.filter(|name| !name.is_empty()),
            uri,
            params: params.to_string(),
        },
    )(input)
}

// Without angle brackets every `;` parameter belongs to the header
fn addr_spec(input: &str) -> IResult<&str, NameAddr> {
    map(pair(uri_base, header_params), |(uri, params)| NameAddr {
        display_name: None,
        uri,
        params: params.to_string(),
    })(input)
}
