//! Four-endpoint recording topology
//!
//! The caller-facing (`incoming`) and callee-facing (`outgoing`) endpoints
//! carry the call. Two muted endpoints feed the recorder, one direction
//! each: `siprecCaller` does not hear `outgoing`, `siprecCallee` does not
//! hear `incoming`, and being muted they never hear each other.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::{
    Conference, Endpoint, EndpointRole, EndpointSpec, JoinFlags, MediaConnection, MemberId,
    RelateDirective,
};
use crate::errors::{MediaError, MediaResult};
use crate::orchestrator::session::{CallSession, Resource};

/// The four endpoints of a recorded call
#[derive(Clone)]
pub struct RecordingEndpoints {
    pub incoming: Arc<dyn Endpoint>,
    pub outgoing: Arc<dyn Endpoint>,
    pub siprec_caller: Arc<dyn Endpoint>,
    pub siprec_callee: Arc<dyn Endpoint>,
}

impl RecordingEndpoints {
    pub fn get(&self, role: EndpointRole) -> &Arc<dyn Endpoint> {
        match role {
            EndpointRole::Incoming => &self.incoming,
            EndpointRole::Outgoing => &self.outgoing,
            EndpointRole::SiprecCaller => &self.siprec_caller,
            EndpointRole::SiprecCallee => &self.siprec_callee,
        }
    }

    /// Endpoints in allocation order
    pub fn iter(&self) -> impl Iterator<Item = (EndpointRole, &Arc<dyn Endpoint>)> {
        ALLOCATION_ORDER.into_iter().map(move |role| (role, self.get(role)))
    }
}

/// Member ids assigned on join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConferenceMembers {
    pub incoming: MemberId,
    pub outgoing: MemberId,
    pub siprec_caller: MemberId,
    pub siprec_callee: MemberId,
}

/// A fully joined and routed topology
#[derive(Clone)]
pub struct MediaTopology {
    pub endpoints: RecordingEndpoints,
    pub conference: Arc<dyn Conference>,
    pub members: ConferenceMembers,
}

const ALLOCATION_ORDER: [EndpointRole; 4] = [
    EndpointRole::Incoming,
    EndpointRole::SiprecCaller,
    EndpointRole::SiprecCallee,
    EndpointRole::Outgoing,
];

/// Allocate all four endpoints as one batch. The incoming endpoint answers
/// the caller's offer, when there is one. If any allocation fails the
/// others are destroyed and the first failure is returned.
pub async fn allocate_endpoints(
    connection: &dyn MediaConnection,
    offer: Option<&str>,
) -> MediaResult<RecordingEndpoints> {
    let requests = ALLOCATION_ORDER.map(|role| match (role, offer) {
        (EndpointRole::Incoming, Some(offer)) => EndpointSpec::new(role).with_remote_sdp(offer),
        _ => EndpointSpec::new(role),
    });

    let results = join_all(requests.into_iter().map(|spec| connection.create_endpoint(spec))).await;

    let mut allocated = Vec::with_capacity(results.len());
    let mut first_error = None;
    for (role, result) in ALLOCATION_ORDER.into_iter().zip(results) {
        match result {
            Ok(endpoint) => allocated.push(endpoint),
            Err(e) => {
                warn!("Failed to allocate {} endpoint: {}", role, e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    if let Some(err) = first_error {
        let releases = allocated.iter().map(|endpoint| async move {
            if let Err(e) = endpoint.destroy().await {
                warn!("Failed to destroy endpoint {}: {}", endpoint.id(), e);
            }
        });
        join_all(releases).await;
        return Err(err);
    }

    let mut allocated = allocated.into_iter();
    match (
        allocated.next(),
        allocated.next(),
        allocated.next(),
        allocated.next(),
    ) {
        (Some(incoming), Some(siprec_caller), Some(siprec_callee), Some(outgoing)) => {
            Ok(RecordingEndpoints {
                incoming,
                outgoing,
                siprec_caller,
                siprec_callee,
            })
        }
        _ => Err(MediaError::Aborted("endpoint batch incomplete".to_string())),
    }
}

/// Builds the topology for one call, handing every allocated resource to
/// the call session as soon as it exists
pub struct TopologyController<'a> {
    connection: Arc<dyn MediaConnection>,
    session: &'a CallSession,
}

impl<'a> TopologyController<'a> {
    pub fn new(connection: Arc<dyn MediaConnection>, session: &'a CallSession) -> Self {
        Self {
            connection,
            session,
        }
    }

    /// Allocate, join and route. Any failure aborts the build; resources
    /// already created stay with the session for cleanup.
    pub async fn build(&self, offer: Option<&str>) -> MediaResult<MediaTopology> {
        let endpoints = allocate_endpoints(self.connection.as_ref(), offer).await?;

        let mut retained = true;
        for (role, endpoint) in endpoints.iter() {
            retained &= self
                .session
                .adopt(Resource::Endpoint(role, endpoint.clone()))
                .await;
        }
        if !retained {
            return Err(MediaError::Aborted(
                "call ended while allocating endpoints".to_string(),
            ));
        }

        let conference = self.connection.create_conference().await?;
        if !self.session.adopt(Resource::Conference(conference.clone())).await {
            return Err(MediaError::Aborted(
                "call ended while creating conference".to_string(),
            ));
        }
        debug!("created conference {}", conference.name());

        let members = self.join_all_members(&endpoints, conference.as_ref()).await?;
        self.route(conference.as_ref(), &members).await?;

        Ok(MediaTopology {
            endpoints,
            conference,
            members,
        })
    }

    async fn join_all_members(
        &self,
        endpoints: &RecordingEndpoints,
        conference: &dyn Conference,
    ) -> MediaResult<ConferenceMembers> {
        let unmuted = JoinFlags::default();
        let incoming = join(endpoints, EndpointRole::Incoming, conference, unmuted).await?;
        let outgoing = join(endpoints, EndpointRole::Outgoing, conference, unmuted).await?;
        let muted = JoinFlags::muted();
        let siprec_caller = join(endpoints, EndpointRole::SiprecCaller, conference, muted).await?;
        let siprec_callee = join(endpoints, EndpointRole::SiprecCallee, conference, muted).await?;

        Ok(ConferenceMembers {
            incoming,
            outgoing,
            siprec_caller,
            siprec_callee,
        })
    }

    async fn route(
        &self,
        conference: &dyn Conference,
        members: &ConferenceMembers,
    ) -> MediaResult<()> {
        let response = conference
            .relate(members.siprec_caller, members.outgoing, RelateDirective::NoHear)
            .await?;
        info!("response to relate siprecCaller/outgoing: {}", response.trim());

        let response = conference
            .relate(members.siprec_callee, members.incoming, RelateDirective::NoHear)
            .await?;
        info!("response to relate siprecCallee/incoming: {}", response.trim());
        Ok(())
    }
}

async fn join(
    endpoints: &RecordingEndpoints,
    role: EndpointRole,
    conference: &dyn Conference,
    flags: JoinFlags,
) -> MediaResult<MemberId> {
    let member = endpoints.get(role).join(conference, flags).await?;
    info!("{} endpoint joined with member id {}", role, member);
    Ok(member)
}
