//! # OS termination signals.
//!
//! [`wait_for_termination`] completes when the process receives an interrupt
//! or termination signal; the process wires it to `bus.exit()` so every
//! registered task gets an orderly `stop`/`exit` pass.
//!
//! On Unix, SIGINT and SIGTERM are handled alongside the runtime's Ctrl-C
//! handler; elsewhere only Ctrl-C is available.

/// Waits for a termination signal.
///
/// Each call installs independent listeners. Returns `Ok(())` when any signal
/// arrives, or `Err` if listener registration fails.
#[cfg(unix)]
pub(crate) async fn wait_for_termination() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
    Ok(())
}

/// Waits for a termination signal (Ctrl-C only off Unix).
#[cfg(not(unix))]
pub(crate) async fn wait_for_termination() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
