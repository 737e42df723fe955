use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{Error, Result};

/// Cancels the token on the first SIGINT or SIGTERM. The handlers are installed before this
/// returns, so a signal arriving right after is not lost.
pub(crate) fn cancel_on_signal(cancel_token: CancellationToken) -> Result<JoinHandle<()>> {
    let mut interrupt = install(SignalKind::interrupt(), "SIGINT")?;
    let mut terminate = install(SignalKind::terminate(), "SIGTERM")?;

    Ok(tokio::spawn(async move {
        let name = tokio::select! {
            _ = interrupt.recv() => "interrupt",
            _ = terminate.recv() => "terminated",
        };
        info!("Caught signal {name}: terminating");
        cancel_token.cancel();
    }))
}

fn install(kind: SignalKind, name: &str) -> Result<Signal> {
    signal(kind).map_err(|e| Error::Signal(format!("Failed to install {name} handler: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_token_stays_live_without_signal() {
        let cancel_token = CancellationToken::new();
        let handle = cancel_on_signal(cancel_token.clone()).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!cancel_token.is_cancelled());
        assert!(!handle.is_finished());
        handle.abort();
    }
}
