use tokio::select;
use tokio_util::sync::CancellationToken;

/// Detects signals sent to the host process. The browser normally ends the
/// host by closing its stdin, but a signal-initiated stop must also close
/// out the running session, so both paths funnel into the same token.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => (),
    };
}
