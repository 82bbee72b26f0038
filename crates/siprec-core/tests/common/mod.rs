//! Scripted media-server and signaling doubles shared by the integration
//! tests. Every operation is appended to a shared event log so tests can
//! assert on ordering.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use rvoip_siprec_core::config::{MediaServerConfig, RecorderConfig};
use rvoip_siprec_core::errors::{MediaError, MediaResult, SignalingError, SignalingResult};
use rvoip_siprec_core::media::{
    Conference, Endpoint, EndpointRole, EndpointSpec, JoinFlags, MediaConnection, MediaServer,
    MemberId, RelateDirective,
};
use rvoip_siprec_core::signaling::{
    B2buaLegs, B2buaRequest, Dialog, InboundCall, InviteResponder, ProvisionalResponse,
    SignalingLayer, UacRequest,
};
use rvoip_siprec_core::CallOrchestrator;

pub const CALLER_OFFER: &str = "v=0\r\n\
    o=alice 2890844526 2890844526 IN IP4 192.0.2.10\r\n\
    s=-\r\n\
    c=IN IP4 192.0.2.10\r\n\
    t=0 0\r\n\
    m=audio 49170 RTP/AVP 0\r\n\
    a=rtpmap:0 PCMU/8000\r\n";

pub const CALLEE_EARLY: &str = "v=0\r\n\
    o=bob 2808844564 2808844564 IN IP4 192.0.2.20\r\n\
    s=-\r\n\
    c=IN IP4 192.0.2.20\r\n\
    t=0 0\r\n\
    m=audio 50000 RTP/AVP 0\r\n\
    a=rtpmap:0 PCMU/8000\r\n";

pub const CALLEE_FINAL: &str = "v=0\r\n\
    o=bob 2808844564 2808844565 IN IP4 192.0.2.21\r\n\
    s=-\r\n\
    c=IN IP4 192.0.2.21\r\n\
    t=0 0\r\n\
    m=audio 50002 RTP/AVP 0\r\n\
    a=rtpmap:0 PCMU/8000\r\n";

/// First stream of the recording server's answer
pub const RECORDER_S1: &str = "v=0\r\n\
    o=SRS 1 1 IN IP4 198.51.100.9\r\n\
    s=SRS\r\n\
    c=IN IP4 198.51.100.9\r\n\
    t=0 0\r\n\
    m=audio 30000 RTP/AVP 0\r\n\
    a=recvonly\r\n";

/// Second stream of the recording server's answer
pub const RECORDER_S2: &str = "v=0\r\n\
    o=SRS 1 1 IN IP4 198.51.100.9\r\n\
    s=SRS\r\n\
    c=IN IP4 198.51.100.9\r\n\
    t=0 0\r\n\
    m=audio 30002 RTP/AVP 0\r\n\
    a=recvonly\r\n";

pub const RECORDER_ANSWER: &str = "v=0\r\n\
    o=SRS 1 1 IN IP4 198.51.100.9\r\n\
    s=SRS\r\n\
    c=IN IP4 198.51.100.9\r\n\
    t=0 0\r\n\
    m=audio 30000 RTP/AVP 0\r\n\
    a=recvonly\r\n\
    m=audio 30002 RTP/AVP 0\r\n\
    a=recvonly\r\n";

/// Local description the mock media server generates for an endpoint
pub fn endpoint_sdp(role: EndpointRole) -> String {
    let port = match role {
        EndpointRole::Incoming => 20000,
        EndpointRole::SiprecCaller => 20002,
        EndpointRole::SiprecCallee => 20004,
        EndpointRole::Outgoing => 20006,
    };
    format!(
        "v=0\r\n\
         o=FreeSWITCH 1700000000 1700000001 IN IP4 10.0.0.5\r\n\
         s=FreeSWITCH\r\n\
         c=IN IP4 10.0.0.5\r\n\
         t=1700000000 0\r\n\
         m=audio {port} RTP/AVP 0 101\r\n\
         a=rtpmap:0 PCMU/8000\r\n\
         a=rtpmap:101 telephone-event/8000\r\n\
         a=sendrecv\r\n\
         a=ptime:20\r\n"
    )
}

/// Ordered record of every operation performed on the doubles
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().iter().filter(|e| e.as_str() == event).count()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.count(event) > 0
    }

    /// Index of the first occurrence of `event`
    pub fn position(&self, event: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == event)
    }

    /// Index of the last occurrence of `event`
    pub fn last_position(&self, event: &str) -> Option<usize> {
        self.0.lock().iter().rposition(|e| e == event)
    }
}

// ---------------------------------------------------------------------------
// Media server
// ---------------------------------------------------------------------------

/// Failure injection and timing for the media server double
#[derive(Clone, Default)]
pub struct MediaScript {
    pub fail_connect: bool,
    pub fail_endpoint: Option<EndpointRole>,
    pub fail_conference: bool,
    pub fail_join: Option<EndpointRole>,
    pub fail_relate: bool,
    pub fail_modify: Option<EndpointRole>,
    pub modify_delay: Duration,
}

pub struct MediaState {
    pub log: EventLog,
    pub script: MediaScript,
    members: Mutex<HashMap<u32, EndpointRole>>,
    next_member: AtomicU32,
    applied: Mutex<Vec<(EndpointRole, String)>>,
    in_flight: Mutex<HashMap<EndpointRole, usize>>,
    max_in_flight: Mutex<HashMap<EndpointRole, usize>>,
}

impl MediaState {
    /// Descriptions passed to `modify` on the endpoint, in order
    pub fn applied(&self, role: EndpointRole) -> Vec<String> {
        self.applied
            .lock()
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, sdp)| sdp.clone())
            .collect()
    }

    /// Most concurrent `modify` calls seen on the endpoint
    pub fn max_in_flight(&self, role: EndpointRole) -> usize {
        self.max_in_flight.lock().get(&role).copied().unwrap_or(0)
    }

    fn role_of(&self, member: MemberId) -> String {
        self.members
            .lock()
            .get(&member.0)
            .map(|r| r.to_string())
            .unwrap_or_else(|| format!("member{}", member))
    }
}

pub struct MockMediaServer {
    pub state: Arc<MediaState>,
}

impl MockMediaServer {
    pub fn new(log: EventLog, script: MediaScript) -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(MediaState {
                log,
                script,
                members: Mutex::new(HashMap::new()),
                next_member: AtomicU32::new(0),
                applied: Mutex::new(Vec::new()),
                in_flight: Mutex::new(HashMap::new()),
                max_in_flight: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn connection(&self) -> Arc<MockConnection> {
        Arc::new(MockConnection {
            state: self.state.clone(),
        })
    }
}

#[async_trait]
impl MediaServer for MockMediaServer {
    async fn connect(&self, config: &MediaServerConfig) -> MediaResult<Arc<dyn MediaConnection>> {
        self.state.log.push("connect");
        if self.state.script.fail_connect {
            return Err(MediaError::Connection(format!(
                "{}:{} refused",
                config.address, config.port
            )));
        }
        Ok(self.connection())
    }
}

pub struct MockConnection {
    state: Arc<MediaState>,
}

#[async_trait]
impl MediaConnection for MockConnection {
    async fn create_endpoint(&self, spec: EndpointSpec) -> MediaResult<Arc<dyn Endpoint>> {
        self.state.log.push(format!("create_endpoint:{}", spec.role));
        if self.state.script.fail_endpoint == Some(spec.role) {
            return Err(MediaError::EndpointAllocation {
                role: spec.role.to_string(),
                reason: "no free ports".to_string(),
            });
        }
        Ok(Arc::new(MockEndpoint {
            state: self.state.clone(),
            role: spec.role,
            spec,
        }))
    }

    async fn create_conference(&self) -> MediaResult<Arc<dyn Conference>> {
        self.state.log.push("create_conference");
        if self.state.script.fail_conference {
            return Err(MediaError::Conference("conference limit reached".to_string()));
        }
        Ok(Arc::new(MockConference {
            state: self.state.clone(),
            name: "siprec-conf-1".to_string(),
        }))
    }

    async fn disconnect(&self) -> MediaResult<()> {
        self.state.log.push("disconnect");
        Ok(())
    }
}

pub struct MockEndpoint {
    state: Arc<MediaState>,
    role: EndpointRole,
    pub spec: EndpointSpec,
}

#[async_trait]
impl Endpoint for MockEndpoint {
    fn id(&self) -> String {
        format!("ep-{}", self.role)
    }

    fn local_sdp(&self) -> String {
        endpoint_sdp(self.role)
    }

    async fn join(&self, conference: &dyn Conference, flags: JoinFlags) -> MediaResult<MemberId> {
        let suffix = if flags.mute { ":muted" } else { "" };
        self.state.log.push(format!("join:{}{}", self.role, suffix));
        if self.state.script.fail_join == Some(self.role) {
            return Err(MediaError::Join {
                role: self.role.to_string(),
                reason: format!("{} rejected member", conference.name()),
            });
        }
        let member = self.state.next_member.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.members.lock().insert(member, self.role);
        Ok(MemberId(member))
    }

    async fn modify(&self, remote_sdp: &str) -> MediaResult<()> {
        {
            let mut in_flight = self.state.in_flight.lock();
            let current = in_flight.entry(self.role).or_insert(0);
            *current += 1;
            let mut max = self.state.max_in_flight.lock();
            let seen = max.entry(self.role).or_insert(0);
            *seen = (*seen).max(*current);
        }
        self.state.log.push(format!("modify_start:{}", self.role));

        tokio::time::sleep(self.state.script.modify_delay).await;

        self.state.log.push(format!("modify_end:{}", self.role));
        if let Some(current) = self.state.in_flight.lock().get_mut(&self.role) {
            *current -= 1;
        }

        if self.state.script.fail_modify == Some(self.role) {
            return Err(MediaError::Negotiation(format!("{} rejected answer", self.role)));
        }
        self.state
            .applied
            .lock()
            .push((self.role, remote_sdp.to_string()));
        Ok(())
    }

    async fn destroy(&self) -> MediaResult<()> {
        self.state.log.push(format!("destroy:{}", self.role));
        Ok(())
    }
}

pub struct MockConference {
    state: Arc<MediaState>,
    name: String,
}

#[async_trait]
impl Conference for MockConference {
    fn name(&self) -> &str {
        &self.name
    }

    async fn relate(
        &self,
        member: MemberId,
        other: MemberId,
        directive: RelateDirective,
    ) -> MediaResult<String> {
        let command = format!(
            "relate:{}:{}:{}",
            self.state.role_of(member),
            self.state.role_of(other),
            directive.as_str()
        );
        self.state.log.push(command.clone());
        if self.state.script.fail_relate {
            return Err(MediaError::Command {
                command,
                reason: "-ERR Member not found".to_string(),
            });
        }
        Ok("+OK\n".to_string())
    }

    async fn destroy(&self) -> MediaResult<()> {
        self.state.log.push("destroy:conference");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Signaling
// ---------------------------------------------------------------------------

/// A dialog that ends when hung up or destroyed
pub struct MockDialog {
    name: String,
    remote_sdp: Option<String>,
    log: EventLog,
    ended: CancellationToken,
    destroyed: AtomicUsize,
}

impl MockDialog {
    pub fn new(name: &str, remote_sdp: Option<String>, log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            remote_sdp,
            log,
            ended: CancellationToken::new(),
            destroyed: AtomicUsize::new(0),
        })
    }

    /// The far end sends BYE
    pub fn hangup(&self) {
        self.log.push(format!("hangup:{}", self.name));
        self.ended.cancel();
    }

    pub fn destroy_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dialog for MockDialog {
    fn id(&self) -> String {
        format!("dialog-{}", self.name)
    }

    fn remote_sdp(&self) -> Option<String> {
        self.remote_sdp.clone()
    }

    async fn destroy(&self) -> SignalingResult<()> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        self.log.push(format!("destroy:{}", self.name));
        self.ended.cancel();
        Ok(())
    }

    async fn terminated(&self) {
        self.ended.cancelled().await
    }
}

pub struct MockResponder {
    log: EventLog,
    final_sent: AtomicBool,
}

impl MockResponder {
    pub fn new(log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            log,
            final_sent: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl InviteResponder for MockResponder {
    fn final_response_sent(&self) -> bool {
        self.final_sent.load(Ordering::SeqCst)
    }

    async fn send_response(&self, status: u16, _reason: &str) -> SignalingResult<()> {
        self.log.push(format!("response:{}", status));
        if status >= 200 {
            self.final_sent.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Scripted behaviour of the signaling double
#[derive(Clone)]
pub struct SignalingScript {
    /// Provisional responses relayed before the final one, each after its delay
    pub provisionals: Vec<(Duration, ProvisionalResponse)>,
    /// Delay before the final response
    pub answer_delay: Duration,
    /// Callee's final answer, or the error the bridge fails with
    pub answer: Result<Option<String>, SignalingError>,
    /// Recording server's answer, or the error the recording INVITE fails with
    pub recorder_answer: Result<Option<String>, SignalingError>,
}

impl Default for SignalingScript {
    fn default() -> Self {
        Self {
            provisionals: Vec::new(),
            answer_delay: Duration::ZERO,
            answer: Ok(Some(CALLEE_FINAL.to_string())),
            recorder_answer: Ok(Some(RECORDER_ANSWER.to_string())),
        }
    }
}

pub struct MockSignaling {
    log: EventLog,
    script: SignalingScript,
    dialogs: Mutex<HashMap<String, Arc<MockDialog>>>,
    pub b2bua_requests: Mutex<Vec<B2buaRequest>>,
    pub uac_requests: Mutex<Vec<UacRequest>>,
}

impl MockSignaling {
    pub fn new(log: EventLog, script: SignalingScript) -> Arc<Self> {
        Arc::new(Self {
            log,
            script,
            dialogs: Mutex::new(HashMap::new()),
            b2bua_requests: Mutex::new(Vec::new()),
            uac_requests: Mutex::new(Vec::new()),
        })
    }

    pub fn dialog(&self, name: &str) -> Option<Arc<MockDialog>> {
        self.dialogs.lock().get(name).cloned()
    }

    fn open(&self, name: &str, remote_sdp: Option<String>) -> Arc<MockDialog> {
        let dialog = MockDialog::new(name, remote_sdp, self.log.clone());
        self.dialogs.lock().insert(name.to_string(), dialog.clone());
        dialog
    }
}

#[async_trait]
impl SignalingLayer for MockSignaling {
    async fn create_b2bua(
        &self,
        call: &InboundCall,
        responder: Arc<dyn InviteResponder>,
        request: B2buaRequest,
        provisional: mpsc::UnboundedSender<ProvisionalResponse>,
    ) -> SignalingResult<B2buaLegs> {
        self.log.push("b2bua");
        self.b2bua_requests.lock().push(request);

        for (delay, response) in &self.script.provisionals {
            tokio::time::sleep(*delay).await;
            self.log.push(format!("provisional:{}", response.status));
            let _ = provisional.send(response.clone());
        }
        tokio::time::sleep(self.script.answer_delay).await;

        match &self.script.answer {
            Ok(answer) => {
                responder.send_response(200, "OK").await?;
                let uas = self.open("uas", call.sdp.clone());
                let uac = self.open("uac", answer.clone());
                Ok(B2buaLegs { uas, uac })
            }
            Err(err) => {
                if let Some(status) = err.status() {
                    responder.send_response(status, "").await?;
                }
                Err(err.clone())
            }
        }
    }

    async fn create_uac(&self, request: UacRequest) -> SignalingResult<Arc<dyn Dialog>> {
        self.log.push("uac:siprec");
        self.uac_requests.lock().push(request);
        match &self.script.recorder_answer {
            Ok(answer) => Ok(self.open("siprec", answer.clone())),
            Err(err) => Err(err.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub fn test_config() -> RecorderConfig {
    let mut config = RecorderConfig::default();
    config.siprec.server = "sip:recorder@198.51.100.9".to_string();
    config.ingress.local_dns_names = vec!["sbc.example.com".to_string()];
    config.call.setup_timeout_secs = 5;
    config
}

pub fn inbound_call() -> InboundCall {
    InboundCall::new(
        "a84b4c76e66710@pc33.atlanta.example.com",
        "sip:bob@biloxi.example.com",
        "\"Alice\" <sip:alice@atlanta.example.com>;tag=1928301774",
        "<sip:bob@biloxi.example.com>",
    )
    .expect("valid inbound call")
    .with_sdp(CALLER_OFFER)
    .with_source("192.0.2.10:5060".parse().expect("valid address"))
}

pub struct Harness {
    pub log: EventLog,
    pub media: Arc<MockMediaServer>,
    pub signaling: Arc<MockSignaling>,
    pub responder: Arc<MockResponder>,
    pub orchestrator: CallOrchestrator,
}

impl Harness {
    pub fn new(media: MediaScript, signaling: SignalingScript) -> Self {
        Self::with_config(test_config(), media, signaling)
    }

    pub fn with_config(
        config: RecorderConfig,
        media: MediaScript,
        signaling: SignalingScript,
    ) -> Self {
        let log = EventLog::default();
        let media = MockMediaServer::new(log.clone(), media);
        let signaling = MockSignaling::new(log.clone(), signaling);
        let responder = MockResponder::new(log.clone());
        let orchestrator = CallOrchestrator::new(config, media.clone(), signaling.clone());
        Self {
            log,
            media,
            signaling,
            responder,
            orchestrator,
        }
    }

    pub fn media_state(&self) -> &MediaState {
        &self.media.state
    }

    /// Every media resource was released exactly once
    pub fn assert_released_once(&self) {
        for role in ["incoming", "outgoing", "siprecCaller", "siprecCallee"] {
            assert_eq!(
                self.log.count(&format!("destroy:{}", role)),
                1,
                "{} endpoint: {:?}",
                role,
                self.log.events()
            );
        }
        assert_eq!(self.log.count("destroy:conference"), 1, "{:?}", self.log.events());
        assert_eq!(self.log.count("disconnect"), 1, "{:?}", self.log.events());
    }
}
