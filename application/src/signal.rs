//! Cancellation signal composition
//!
//! Many short-lived per-call tokens are derived from longer-lived ones
//! (engine stop, dispatcher shutdown, per-call timeout). `combine` builds a
//! token that fires when any source fires, with forwarder tasks that exit as
//! soon as the combined token is cancelled, so nothing leaks across calls.

use tokio_util::sync::CancellationToken;

/// A token cancelled as soon as any of `sources` is cancelled.
///
/// Sources already cancelled at call time make the combined token start out
/// cancelled. Cancelling the returned token does not propagate back into the
/// sources.
pub fn combine<I>(sources: I) -> CancellationToken
where
    I: IntoIterator<Item = CancellationToken>,
{
    let combined = CancellationToken::new();
    for source in sources {
        if source.is_cancelled() {
            combined.cancel();
            break;
        }
        let combined = combined.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = source.cancelled() => combined.cancel(),
                _ = combined.cancelled() => {}
            }
        });
    }
    combined
}
