//! Media-server seam
//!
//! The media server is driven through four handles: a control
//! [`MediaConnection`], the [`Endpoint`]s allocated on it, and the
//! [`Conference`] mixing them. Implementations wrap the actual control
//! protocol; this crate only sequences the operations.

pub mod topology;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::MediaServerConfig;
use crate::errors::MediaResult;

pub use topology::{
    allocate_endpoints, ConferenceMembers, MediaTopology, RecordingEndpoints, TopologyController,
};

/// Header tagging each endpoint with its role
pub const LEG_HEADER: &str = "X-leg";

/// Role of an endpoint within a recorded call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointRole {
    /// Faces the caller
    Incoming,
    /// Faces the callee
    Outgoing,
    /// Carries the caller's audio to the recorder
    SiprecCaller,
    /// Carries the callee's audio to the recorder
    SiprecCallee,
}

impl EndpointRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointRole::Incoming => "incoming",
            EndpointRole::Outgoing => "outgoing",
            EndpointRole::SiprecCaller => "siprecCaller",
            EndpointRole::SiprecCallee => "siprecCallee",
        }
    }
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allocation request for one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    pub role: EndpointRole,
    /// Remote offer to answer, if the endpoint answers an existing offer
    pub remote_sdp: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl EndpointSpec {
    pub fn new(role: EndpointRole) -> Self {
        Self {
            role,
            remote_sdp: None,
            headers: vec![(LEG_HEADER.to_string(), role.as_str().to_string())],
        }
    }

    pub fn with_remote_sdp(mut self, sdp: impl Into<String>) -> Self {
        self.remote_sdp = Some(sdp.into());
        self
    }
}

/// Flags applied when an endpoint joins a conference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinFlags {
    /// Member contributes no audio to the mix
    pub mute: bool,
}

impl JoinFlags {
    pub fn muted() -> Self {
        Self { mute: true }
    }
}

/// Conference member identifier assigned on join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberId(pub u32);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Routing directive between two conference members
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelateDirective {
    /// The member does not hear the other
    NoHear,
    /// The other does not hear the member
    NoSpeak,
    /// Remove any relationship
    Clear,
}

impl RelateDirective {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelateDirective::NoHear => "nohear",
            RelateDirective::NoSpeak => "nospeak",
            RelateDirective::Clear => "clear",
        }
    }
}

/// Entry point to the media server
#[async_trait]
pub trait MediaServer: Send + Sync {
    /// Open a control connection dedicated to one call
    async fn connect(&self, config: &MediaServerConfig) -> MediaResult<Arc<dyn MediaConnection>>;
}

/// Control connection owned by one call
#[async_trait]
pub trait MediaConnection: Send + Sync {
    async fn create_endpoint(&self, spec: EndpointSpec) -> MediaResult<Arc<dyn Endpoint>>;

    async fn create_conference(&self) -> MediaResult<Arc<dyn Conference>>;

    async fn disconnect(&self) -> MediaResult<()>;
}

/// A media termination negotiating one session description
#[async_trait]
pub trait Endpoint: Send + Sync {
    fn id(&self) -> String;

    /// Session description generated by the media server
    fn local_sdp(&self) -> String;

    async fn join(&self, conference: &dyn Conference, flags: JoinFlags) -> MediaResult<MemberId>;

    /// Apply a new remote session description
    async fn modify(&self, remote_sdp: &str) -> MediaResult<()>;

    async fn destroy(&self) -> MediaResult<()>;
}

/// A mixing resource
#[async_trait]
pub trait Conference: Send + Sync {
    fn name(&self) -> &str;

    /// Apply a routing directive between two members, returning the
    /// server's response text
    async fn relate(
        &self,
        member: MemberId,
        other: MemberId,
        directive: RelateDirective,
    ) -> MediaResult<String>;

    async fn destroy(&self) -> MediaResult<()>;
}
