//! Per-call session state
//!
//! A [`CallSession`] owns every resource allocated for one call. Resources
//! are adopted as soon as they exist, so cleanup reaches them no matter
//! where setup stopped. Cleanup runs at most once; a resource adopted
//! afterwards is released on the spot.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::media::{Conference, Endpoint, EndpointRole, MediaConnection};
use crate::signaling::Dialog;

/// A resource owned by a call session
pub enum Resource {
    Connection(Arc<dyn MediaConnection>),
    Endpoint(EndpointRole, Arc<dyn Endpoint>),
    Conference(Arc<dyn Conference>),
    RecordingDialog(Arc<dyn Dialog>),
}

impl Resource {
    /// Release the resource, logging rather than returning failures
    pub async fn release(self) {
        match self {
            Resource::Connection(connection) => {
                if let Err(e) = connection.disconnect().await {
                    warn!("Failed to release media server connection: {}", e);
                }
            }
            Resource::Endpoint(role, endpoint) => {
                if let Err(e) = endpoint.destroy().await {
                    warn!("Failed to destroy {} endpoint: {}", role, e);
                }
            }
            Resource::Conference(conference) => {
                if let Err(e) = conference.destroy().await {
                    warn!("Failed to destroy conference {}: {}", conference.name(), e);
                }
            }
            Resource::RecordingDialog(dialog) => {
                if let Err(e) = dialog.destroy().await {
                    warn!("Failed to destroy recording dialog {}: {}", dialog.id(), e);
                }
            }
        }
    }
}

#[derive(Default)]
struct SessionResources {
    connection: Option<Arc<dyn MediaConnection>>,
    endpoints: Vec<(EndpointRole, Arc<dyn Endpoint>)>,
    conference: Option<Arc<dyn Conference>>,
    recording_dialog: Option<Arc<dyn Dialog>>,
    cleaned: bool,
}

/// State of one recorded call
pub struct CallSession {
    id: Uuid,
    call_id: String,
    state: Mutex<SessionResources>,
    cancel: CancellationToken,
}

impl CallSession {
    pub fn new(call_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            call_id: call_id.into(),
            state: Mutex::new(SessionResources::default()),
            cancel: CancellationToken::new(),
        })
    }

    /// Unique id of this call attempt
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn is_cleaned(&self) -> bool {
        self.state.lock().cleaned
    }

    /// Completes once the call is ending
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Ask the call to end. Setup steps and the lifecycle supervisor
    /// observe this and tear the call down.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Take ownership of a resource. Returns `false` if the session was
    /// already cleaned, in which case the resource has been released.
    pub async fn adopt(&self, resource: Resource) -> bool {
        let rejected = {
            let mut state = self.state.lock();
            if state.cleaned {
                Some(resource)
            } else {
                match resource {
                    Resource::Connection(c) => state.connection = Some(c),
                    Resource::Endpoint(role, e) => state.endpoints.push((role, e)),
                    Resource::Conference(c) => state.conference = Some(c),
                    Resource::RecordingDialog(d) => state.recording_dialog = Some(d),
                }
                None
            }
        };

        match rejected {
            Some(resource) => {
                debug!("session already cleaned, releasing late resource");
                resource.release().await;
                false
            }
            None => true,
        }
    }

    /// Run `fut` until it completes or the call is cancelled
    pub async fn until_cancelled<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            output = fut => Some(output),
        }
    }

    /// Release everything the session owns. Only the first call does any
    /// work; it returns `true`, later calls return `false`.
    pub async fn cleanup(&self) -> bool {
        let resources = {
            let mut state = self.state.lock();
            if state.cleaned {
                return false;
            }
            let resources = std::mem::take(&mut *state);
            state.cleaned = true;
            resources
        };
        self.cancel.cancel();
        info!("ending call, releasing media resources");

        let mut releases: Vec<Resource> = resources
            .endpoints
            .into_iter()
            .map(|(role, endpoint)| Resource::Endpoint(role, endpoint))
            .collect();
        releases.extend(resources.recording_dialog.map(Resource::RecordingDialog));
        releases.extend(resources.conference.map(Resource::Conference));
        join_all(releases.into_iter().map(Resource::release)).await;

        if let Some(connection) = resources.connection {
            Resource::Connection(connection).release().await;
        }
        true
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("id", &self.id)
            .field("call_id", &self.call_id)
            .field("cleaned", &self.is_cleaned())
            .finish()
    }
}
