use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Install a two-phase shutdown handler for the worker supervisor.
///
/// The first SIGTERM or SIGINT cancels the returned token: workers observe
/// it at their poll boundary, finish the attempt in flight, and exit, so the
/// supervisor drains cleanly with exit code 0. A second signal skips the
/// drain and stops the process immediately — the in-flight job stays
/// `processing` on disk and is picked up by the next recovery sweep.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let drain = token.clone();

    tokio::spawn(async move {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
        tracing::info!("Shutdown signal received, draining workers after their current attempt");
        drain.cancel();

        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
        tracing::warn!("Second shutdown signal received, exiting without draining");
        std::process::exit(130);
    });

    token
}
