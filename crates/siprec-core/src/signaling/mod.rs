//! Signaling seam
//!
//! The SIP transaction and dialog layer lives outside this crate. The
//! orchestrator reaches it through [`SignalingLayer`], which bridges an
//! inbound INVITE back-to-back and originates the recording dialog, and
//! through the [`Dialog`] and [`InviteResponder`] handles it returns.

pub mod uri;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::SignalingResult;

pub use uri::{NameAddr, Scheme, SipUri, DEFAULT_SIP_PORT};

/// Headers copied from the caller's request onto the outbound INVITE
pub const PROXY_REQUEST_HEADERS: &[&str] = &["Proxy-Authorization"];

/// Headers copied from the callee's responses back to the caller
pub const PROXY_RESPONSE_HEADERS: &[&str] = &["Proxy-Authenticate", "Allow-Events", "Allow"];

/// Content type of a session description body
pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Standard reason phrase for the status codes this crate sends
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        405 => "Method Not Allowed",
        480 => "Temporarily Unavailable",
        503 => "Service Unavailable",
        _ => "",
    }
}

/// An inbound INVITE to be recorded
#[derive(Debug, Clone)]
pub struct InboundCall {
    pub call_id: String,
    pub request_uri: SipUri,
    pub from: NameAddr,
    pub to: NameAddr,
    /// The caller's offer, absent for a late-offer INVITE
    pub sdp: Option<String>,
    pub source_address: Option<SocketAddr>,
    pub headers: Vec<(String, String)>,
}

impl InboundCall {
    /// Build an inbound call from raw header values
    pub fn new(
        call_id: impl Into<String>,
        request_uri: &str,
        from: &str,
        to: &str,
    ) -> SignalingResult<Self> {
        Ok(Self {
            call_id: call_id.into(),
            request_uri: request_uri.parse()?,
            from: from.parse()?,
            to: to.parse()?,
            sdp: None,
            source_address: None,
            headers: Vec::new(),
        })
    }

    pub fn with_sdp(mut self, sdp: impl Into<String>) -> Self {
        self.sdp = Some(sdp.into());
        self
    }

    pub fn with_source(mut self, source: SocketAddr) -> Self {
        self.source_address = Some(source);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header value with the given name, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A provisional response relayed while the callee is being reached
#[derive(Debug, Clone)]
pub struct ProvisionalResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Option<String>,
}

impl ProvisionalResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: None,
        }
    }

    pub fn with_sdp(mut self, sdp: impl Into<String>) -> Self {
        self.content_type = Some(SDP_CONTENT_TYPE.to_string());
        self.body = Some(sdp.into());
        self
    }

    /// The early session description, if this is a 18x carrying SDP
    pub fn early_sdp(&self) -> Option<&str> {
        if !(180..200).contains(&self.status) {
            return None;
        }
        let is_sdp = self
            .content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|ct| ct.trim().eq_ignore_ascii_case(SDP_CONTENT_TYPE));
        if !is_sdp {
            return None;
        }
        self.body.as_deref().filter(|body| !body.trim().is_empty())
    }
}

/// Parameters of the back-to-back bridge
#[derive(Debug, Clone)]
pub struct B2buaRequest {
    pub destination: String,
    /// Answer returned to the caller
    pub caller_answer_sdp: String,
    /// Offer sent to the callee
    pub callee_offer_sdp: String,
    pub proxy_request_headers: Vec<String>,
    pub proxy_response_headers: Vec<String>,
}

impl B2buaRequest {
    /// Bridge request with the standard header allow-lists
    pub fn new(
        destination: impl Into<String>,
        caller_answer_sdp: impl Into<String>,
        callee_offer_sdp: impl Into<String>,
    ) -> Self {
        Self {
            destination: destination.into(),
            caller_answer_sdp: caller_answer_sdp.into(),
            callee_offer_sdp: callee_offer_sdp.into(),
            proxy_request_headers: PROXY_REQUEST_HEADERS.iter().map(|h| h.to_string()).collect(),
            proxy_response_headers: PROXY_RESPONSE_HEADERS.iter().map(|h| h.to_string()).collect(),
        }
    }
}

/// The two dialogs of an established bridge
#[derive(Clone)]
pub struct B2buaLegs {
    /// Caller-facing dialog
    pub uas: Arc<dyn Dialog>,
    /// Callee-facing dialog
    pub uac: Arc<dyn Dialog>,
}

/// An outbound INVITE originated by the recorder
#[derive(Debug, Clone)]
pub struct UacRequest {
    pub destination: String,
    pub local_sdp: String,
    pub headers: Vec<(String, String)>,
}

impl UacRequest {
    pub fn new(destination: impl Into<String>, local_sdp: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            local_sdp: local_sdp.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// An established SIP dialog
#[async_trait]
pub trait Dialog: Send + Sync {
    fn id(&self) -> String;

    /// Session description received from the far end
    fn remote_sdp(&self) -> Option<String>;

    /// Tear the dialog down (BYE)
    async fn destroy(&self) -> SignalingResult<()>;

    /// Completes once the far end has ended the dialog.
    /// Must be safe to call again after completion.
    async fn terminated(&self);
}

/// Server transaction of the inbound INVITE
#[async_trait]
pub trait InviteResponder: Send + Sync {
    fn final_response_sent(&self) -> bool;

    async fn send_response(&self, status: u16, reason: &str) -> SignalingResult<()>;
}

/// Operations of the SIP signaling layer
#[async_trait]
pub trait SignalingLayer: Send + Sync {
    /// Bridge the inbound call to its destination. Responses to the caller
    /// are sent by the signaling layer; every provisional response from the
    /// callee is copied to `provisional` as it arrives.
    async fn create_b2bua(
        &self,
        call: &InboundCall,
        responder: Arc<dyn InviteResponder>,
        request: B2buaRequest,
        provisional: mpsc::UnboundedSender<ProvisionalResponse>,
    ) -> SignalingResult<B2buaLegs>;

    /// Originate a new dialog
    async fn create_uac(&self, request: UacRequest) -> SignalingResult<Arc<dyn Dialog>>;
}
