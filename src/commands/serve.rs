//! `serve`: stream to every configured client until Ctrl-C.

use std::future::Future;
use std::io;
use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{load_config, CommandResult};
use lightstream::LightServer;

pub async fn run(path: &Path) -> CommandResult {
    let config = load_config(path)?;
    info!(config = %path.display(), fps = config.server.fps, "starting lightstream");

    let server = LightServer::new(config);
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), cancel.clone()));

    server.run(cancel).await;
    info!("stopped");
    Ok(())
}

/// Cancel `cancel` once `signal` fires. If the handler cannot be installed
/// the server keeps running and has to be stopped externally.
async fn cancel_on_signal<F>(signal: F, cancel: CancellationToken)
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("received Ctrl-C");
            cancel.cancel();
        }
        Err(e) => error!(error = %e, "cannot listen for Ctrl-C, serving until killed"),
    }
}
