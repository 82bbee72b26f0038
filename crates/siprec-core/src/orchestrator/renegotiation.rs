//! Re-negotiation of the callee-facing endpoint
//!
//! Early session descriptions from provisional responses are applied as
//! soon as they arrive. Each modify waits for the previous one, so the
//! endpoint never sees two negotiations at once.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument, Span};

use crate::errors::{MediaError, MediaResult};
use crate::media::Endpoint;
use crate::signaling::ProvisionalResponse;

/// Tracks the description applied to the outgoing endpoint and the modify
/// that may still be in flight
pub struct Renegotiation {
    endpoint: Arc<dyn Endpoint>,
    applied_sdp: Option<String>,
    pending: Option<JoinHandle<MediaResult<()>>>,
}

impl Renegotiation {
    pub fn new(endpoint: Arc<dyn Endpoint>) -> Self {
        Self {
            endpoint,
            applied_sdp: None,
            pending: None,
        }
    }

    /// Last description handed to the endpoint
    pub fn applied_sdp(&self) -> Option<&str> {
        self.applied_sdp.as_deref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Start applying the early description carried by a provisional
    /// response, if it has one that is new
    pub fn on_provisional(&mut self, response: &ProvisionalResponse) {
        let Some(sdp) = response.early_sdp() else {
            return;
        };
        if self.applied_sdp.as_deref() == Some(sdp) {
            debug!("{} repeats the applied early media description", response.status);
            return;
        }

        info!("early media in {} response, re-negotiating outgoing endpoint", response.status);
        let sdp = sdp.to_string();
        self.applied_sdp = Some(sdp.clone());

        let previous = self.pending.take();
        let endpoint = self.endpoint.clone();
        let task = async move {
            if let Some(previous) = previous {
                match previous.await {
                    Ok(Err(e)) => warn!("earlier re-negotiation failed: {}", e),
                    Err(e) => warn!("earlier re-negotiation task failed: {}", e),
                    Ok(Ok(())) => {}
                }
            }
            endpoint.modify(&sdp).await
        };
        self.pending = Some(tokio::spawn(task.instrument(Span::current())));
    }

    /// Wait for any early re-negotiation, then apply the final answer if
    /// it differs from what the endpoint already has
    pub async fn reconcile(&mut self, final_sdp: Option<&str>) -> MediaResult<()> {
        if let Some(pending) = self.pending.take() {
            let outcome = pending
                .await
                .map_err(|e| MediaError::Aborted(e.to_string()))?;
            if let Err(e) = outcome {
                warn!("early media re-negotiation failed: {}", e);
                self.applied_sdp = None;
            }
        }

        let Some(final_sdp) = final_sdp else {
            return Ok(());
        };
        if self.applied_sdp.as_deref() == Some(final_sdp) {
            return Ok(());
        }

        debug!("final answer differs from early media, re-negotiating outgoing endpoint");
        self.endpoint.modify(final_sdp).await?;
        self.applied_sdp = Some(final_sdp.to_string());
        Ok(())
    }
}

impl Drop for Renegotiation {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}
