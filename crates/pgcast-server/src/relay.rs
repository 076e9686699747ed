//! Upstream-to-broadcaster pump.

use std::sync::Arc;

use futures::StreamExt;
use pgcast_listener::{NotificationStream, UpstreamError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::websocket::broadcast::{Broadcaster, Dispatch};

/// Feed every upstream event to the broadcaster, in upstream order.
///
/// Returns `Ok(())` when cancelled. A stream error, or the stream ending on
/// its own, is an upstream failure and is returned to the caller.
pub async fn run_relay(
    mut stream: NotificationStream,
    broadcaster: Arc<Broadcaster>,
    cancel: CancellationToken,
) -> Result<(), UpstreamError> {
    info!(channel = broadcaster.channel(), "relay started");
    let mut forwarded: u64 = 0;
    loop {
        let item = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!(forwarded, "relay stopped");
                return Ok(());
            }
            item = stream.next() => item,
        };
        match item {
            Some(Ok(event)) => {
                if let Dispatch::Delivered(_) = broadcaster.dispatch(&event) {
                    forwarded += 1;
                }
            }
            Some(Err(e)) => {
                error!(error = %e, forwarded, "upstream subscription failed");
                return Err(e);
            }
            None => {
                let e = UpstreamError::ConnectionLost("notification stream ended".into());
                error!(error = %e, forwarded, "upstream subscription failed");
                return Err(e);
            }
        }
    }
}
