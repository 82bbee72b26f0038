//! Call orchestration
//!
//! [`CallOrchestrator::handle_invite`] runs the whole sequence for one
//! recorded call:
//!
//! 1. connect to the media server
//! 2. build the four-endpoint topology
//! 3. bridge the call back-to-back, applying early media as it arrives
//! 4. reconcile the callee's final answer with the outgoing endpoint
//! 5. establish the recording leg (best effort)
//!
//! Steps 1 to 4 run under the session's cancellation token and the setup
//! timeout; a failure in any of them ends the attempt and releases
//! everything the session owns. Hangup supervision starts as soon as the
//! two primary legs exist.

pub mod lifecycle;
pub mod renegotiation;
pub mod session;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::config::RecorderConfig;
use crate::errors::{CallError, ErrorClass, RecordingError, Result, SignalingError};
use crate::ingress::{parse_local_hostports, IngressDecision, IngressFilter};
use crate::logging::call_span;
use crate::media::{MediaServer, MediaTopology, TopologyController};
use crate::sdp::{parse_session_description, splice_recording_offer, split_recording_answer};
use crate::signaling::{
    reason_phrase, B2buaLegs, B2buaRequest, InboundCall, InviteResponder, SignalingLayer,
    SipUri, UacRequest,
};
use crate::siprec::{MultipartBody, Participant, RecordingMetadata};

pub use lifecycle::{supervise, CallEnd};
pub use renegotiation::Renegotiation;
pub use session::{CallSession, Resource};

/// Status sent to the caller when setup fails
const SETUP_FAILURE_STATUS: u16 = 480;

/// Outcome of the recording leg
#[derive(Debug, Clone)]
pub enum RecordingStatus {
    Active,
    /// The call proceeds unrecorded
    Failed(RecordingError),
}

/// A bridged call
pub struct ActiveCall {
    session: Arc<CallSession>,
    recording: RecordingStatus,
    supervisor: JoinHandle<CallEnd>,
}

impl ActiveCall {
    pub fn call_id(&self) -> &str {
        self.session.call_id()
    }

    pub fn session(&self) -> &Arc<CallSession> {
        &self.session
    }

    pub fn recording(&self) -> &RecordingStatus {
        &self.recording
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.recording, RecordingStatus::Active)
    }

    /// Hang up both legs and release the call's resources
    pub fn terminate(&self) {
        self.session.cancel();
    }

    /// Wait until the call has ended and been cleaned up
    pub async fn wait(self) -> CallEnd {
        match self.supervisor.await {
            Ok(end) => end,
            Err(e) => {
                warn!("call supervisor failed: {}", e);
                self.session.cleanup().await;
                CallEnd::Local
            }
        }
    }
}

/// Drives recorded calls through the media server and signaling layer
pub struct CallOrchestrator {
    config: Arc<RecorderConfig>,
    media: Arc<dyn MediaServer>,
    signaling: Arc<dyn SignalingLayer>,
    sessions: Arc<DashMap<Uuid, Arc<CallSession>>>,
    ingress: parking_lot::RwLock<IngressFilter>,
}

impl CallOrchestrator {
    pub fn new(
        config: RecorderConfig,
        media: Arc<dyn MediaServer>,
        signaling: Arc<dyn SignalingLayer>,
    ) -> Self {
        let ingress = IngressFilter::from_config(&config.ingress);
        Self {
            config: Arc::new(config),
            media,
            signaling,
            sessions: Arc::new(DashMap::new()),
            ingress: parking_lot::RwLock::new(ingress),
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Number of calls currently being set up or in progress
    pub fn active_calls(&self) -> usize {
        self.sessions.len()
    }

    /// End every live call
    pub fn shutdown(&self) {
        info!("shutting down, ending {} call(s)", self.sessions.len());
        for entry in self.sessions.iter() {
            entry.value().cancel();
        }
    }

    /// Record the addresses the signaling server reported it listens on
    pub fn register_local_hostports(&self, announcement: &str) -> usize {
        let hostports = parse_local_hostports(announcement);
        let count = hostports.len();
        let mut ingress = self.ingress.write();
        ingress.add_local_hostports(hostports);
        info!(
            "signaling server listening on {}",
            ingress
                .local_hostports()
                .iter()
                .map(|hp| hp.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        count
    }

    /// Decide how an inbound request is handled
    pub fn classify(&self, method: &str, request_uri: &SipUri) -> IngressDecision {
        self.ingress.read().decide(method, request_uri)
    }

    /// Record an inbound call. Returns once the call is bridged (with or
    /// without its recording leg) or setup has failed.
    pub async fn handle_invite(
        &self,
        call: InboundCall,
        responder: Arc<dyn InviteResponder>,
    ) -> Result<ActiveCall> {
        let span = call_span(&call.call_id);
        self.run(call, responder).instrument(span).await
    }

    async fn run(
        &self,
        call: InboundCall,
        responder: Arc<dyn InviteResponder>,
    ) -> Result<ActiveCall> {
        match call.source_address {
            Some(source) => info!("received INVITE from {}", source),
            None => info!("received INVITE"),
        }

        let session = CallSession::new(call.call_id.clone());
        self.sessions.insert(session.id(), session.clone());

        let mut supervisor = None;
        let setup = self.establish(&session, &call, &responder, &mut supervisor);
        let outcome = guarded(&session, self.config.call.setup_timeout(), setup).await;

        let topology = match outcome {
            Ok(topology) => topology,
            Err(err) => {
                return Err(self.abort(&session, responder.as_ref(), err, supervisor).await);
            }
        };
        // establish arms the supervisor before it can succeed
        let Some(supervisor) = supervisor else {
            return Err(self.abort(&session, responder.as_ref(), CallError::Cancelled, None).await);
        };

        info!("successfully connected caller, now attempting siprec INVITE");
        let recording = match session
            .until_cancelled(self.start_recording(&session, &call, &topology))
            .await
        {
            Some(Ok(())) => {
                info!("successfully connected siprec");
                RecordingStatus::Active
            }
            Some(Err(e)) => {
                error!("Error connecting siprec INVITE: {}; call will continue", e);
                RecordingStatus::Failed(e)
            }
            None => RecordingStatus::Failed(RecordingError::Cancelled),
        };

        Ok(ActiveCall {
            session,
            recording,
            supervisor,
        })
    }

    /// Steps 1 to 4. The supervisor is armed as soon as the legs exist.
    async fn establish(
        &self,
        session: &Arc<CallSession>,
        call: &InboundCall,
        responder: &Arc<dyn InviteResponder>,
        supervisor: &mut Option<JoinHandle<CallEnd>>,
    ) -> Result<MediaTopology> {
        if let Some(offer) = call.sdp.as_deref() {
            parse_session_description(offer).map_err(CallError::MalformedOffer)?;
        }

        let connection = self
            .media
            .connect(&self.config.media_server)
            .await
            .map_err(CallError::MediaConnect)?;
        if !session.adopt(Resource::Connection(connection.clone())).await {
            return Err(CallError::Cancelled);
        }

        let topology = TopologyController::new(connection, session)
            .build(call.sdp.as_deref())
            .await
            .map_err(CallError::Topology)?;

        info!("outdialing {}", call.request_uri);
        let request = B2buaRequest::new(
            call.request_uri.to_string(),
            topology.endpoints.incoming.local_sdp(),
            topology.endpoints.outgoing.local_sdp(),
        );
        let mut renegotiation = Renegotiation::new(topology.endpoints.outgoing.clone());
        let legs = self
            .bridge(call, responder.clone(), request, &mut renegotiation)
            .await?;

        let sessions = self.sessions.clone();
        let id = session.id();
        *supervisor = Some(supervise(session.clone(), legs.clone(), move || {
            sessions.remove(&id);
        }));

        renegotiation
            .reconcile(legs.uac.remote_sdp().as_deref())
            .await
            .map_err(CallError::Renegotiation)?;

        Ok(topology)
    }

    /// Run the B2BUA exchange, feeding provisional responses to the
    /// re-negotiation tracker while waiting for the final answer
    async fn bridge(
        &self,
        call: &InboundCall,
        responder: Arc<dyn InviteResponder>,
        request: B2buaRequest,
        renegotiation: &mut Renegotiation,
    ) -> Result<B2buaLegs> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let bridge = self.signaling.create_b2bua(call, responder, request, tx);
        tokio::pin!(bridge);

        let result = loop {
            tokio::select! {
                biased;
                Some(response) = rx.recv() => renegotiation.on_provisional(&response),
                result = &mut bridge => break result,
            }
        };
        while let Ok(response) = rx.try_recv() {
            renegotiation.on_provisional(&response);
        }
        result.map_err(CallError::Bridge)
    }

    /// Step 5: offer the forked streams to the recording server
    async fn start_recording(
        &self,
        session: &CallSession,
        call: &InboundCall,
        topology: &MediaTopology,
    ) -> std::result::Result<(), RecordingError> {
        let endpoints = &topology.endpoints;
        let sdp = splice_recording_offer(
            &endpoints.siprec_caller.local_sdp(),
            &endpoints.siprec_callee.local_sdp(),
        )?;
        let metadata = RecordingMetadata::new(
            call.call_id.clone(),
            Participant::from_name_addr(&call.from),
            Participant::from_name_addr(&call.to),
        );
        let xml = metadata.to_xml()?;

        let boundary = format!(
            "{}-{}",
            self.config.siprec.boundary_prefix,
            Uuid::new_v4().simple()
        );
        let body = MultipartBody::recording(boundary, &sdp, &xml);
        debug!("siprec body: {}", body);

        let request = UacRequest::new(self.config.siprec.server.clone(), body.to_string())
            .with_header("Content-Type", body.content_type());
        let dialog = self.signaling.create_uac(request).await?;
        if !session.adopt(Resource::RecordingDialog(dialog.clone())).await {
            return Err(RecordingError::Cancelled);
        }

        let answer = dialog.remote_sdp().ok_or(SignalingError::MissingAnswer)?;
        let (caller_sdp, callee_sdp) = split_recording_answer(&answer)?;
        tokio::try_join!(
            endpoints.siprec_caller.modify(&caller_sdp),
            endpoints.siprec_callee.modify(&callee_sdp),
        )?;
        Ok(())
    }

    /// End a failed attempt: report it, answer the caller if nobody has,
    /// release the session and wait for the supervisor to finish
    ///
    /// A 401/407 challenge is not a call failure: it is logged at info and
    /// the challenge itself is the caller's answer, so no 480 follows. The
    /// session is still released, since a challenged attempt never reuses
    /// its conference and the caller's retry arrives as a fresh INVITE.
    async fn abort(
        &self,
        session: &Arc<CallSession>,
        responder: &dyn InviteResponder,
        err: CallError,
        supervisor: Option<JoinHandle<CallEnd>>,
    ) -> CallError {
        match err.class() {
            ErrorClass::Challenge => info!("INVITE challenged: {}", err),
            ErrorClass::Cancelled => info!("call ended during setup: {}", err),
            _ => error!("Error connecting call: {}", err),
        }

        if err.is_fatal() && !responder.final_response_sent() {
            let reason = reason_phrase(SETUP_FAILURE_STATUS);
            if let Err(e) = responder.send_response(SETUP_FAILURE_STATUS, reason).await {
                warn!("Failed to send {} to caller: {}", SETUP_FAILURE_STATUS, e);
            }
        }

        session.cleanup().await;
        if let Some(supervisor) = supervisor {
            if let Err(e) = supervisor.await {
                warn!("call supervisor failed: {}", e);
            }
        }
        self.sessions.remove(&session.id());
        err
    }
}

/// Run setup under the session's cancellation token and the optional
/// timeout
async fn guarded<F, T>(session: &CallSession, limit: Option<Duration>, setup: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let bounded = async {
        match limit {
            Some(limit) => tokio::time::timeout(limit, setup)
                .await
                .unwrap_or(Err(CallError::SetupTimeout(limit))),
            None => setup.await,
        }
    };
    session
        .until_cancelled(bounded)
        .await
        .unwrap_or(Err(CallError::Cancelled))
}
