//! Hangup propagation between the two primary legs

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument, Span};

use super::session::CallSession;
use crate::signaling::{B2buaLegs, Dialog};

/// Which side ended the call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEnd {
    CallerHangup,
    CalleeHangup,
    /// Torn down locally (setup failure, shutdown, explicit termination)
    Local,
}

/// Watch both legs from the moment they exist. Whichever ends first, the
/// other leg is torn down and the session cleaned up; `on_finished` runs
/// last.
pub fn supervise<F>(
    session: Arc<CallSession>,
    legs: B2buaLegs,
    on_finished: F,
) -> JoinHandle<CallEnd>
where
    F: FnOnce() + Send + 'static,
{
    let task = async move {
        let end = tokio::select! {
            _ = legs.uas.terminated() => CallEnd::CallerHangup,
            _ = legs.uac.terminated() => CallEnd::CalleeHangup,
            _ = session.cancelled() => CallEnd::Local,
        };

        match end {
            CallEnd::CallerHangup => {
                info!("caller hung up, ending call");
                destroy_leg(legs.uac.as_ref(), "callee").await;
            }
            CallEnd::CalleeHangup => {
                info!("callee hung up, ending call");
                destroy_leg(legs.uas.as_ref(), "caller").await;
            }
            CallEnd::Local => {
                destroy_leg(legs.uas.as_ref(), "caller").await;
                destroy_leg(legs.uac.as_ref(), "callee").await;
            }
        }

        session.cleanup().await;
        on_finished();
        end
    };
    tokio::spawn(task.instrument(Span::current()))
}

async fn destroy_leg(dialog: &dyn Dialog, side: &str) {
    if let Err(e) = dialog.destroy().await {
        warn!("Failed to destroy {} leg {}: {}", side, dialog.id(), e);
    }
}
