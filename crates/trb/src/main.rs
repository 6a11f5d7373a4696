use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use trb_core::{
    config::{Config, Mode},
    session::remove_stale_session_files,
    utils::sweep_stale_workspaces,
};

#[tokio::main]
async fn main() -> Result<(), trb_core::Error> {
    trb_core::logging::init("trb")?;

    let cfg = Arc::new(Config::load()?);
    info!(
        mode = %cfg.mode,
        temp_dir = %cfg.temp_dir.display(),
        max_reupload_bytes = cfg.reupload_limit(),
        tz = cfg.timezone.as_deref().unwrap_or("-"),
        "starting rename bot"
    );

    match cfg.mode {
        Mode::Bot => {
            remove_stale_session_files(&cfg.work_dir);
        }
        Mode::User => {
            if let Some(session) = &cfg.session {
                session.stage()?;
            }
        }
    }

    match sweep_stale_workspaces(&cfg.temp_dir) {
        Ok(0) => {}
        Ok(n) => info!(removed = n, "removed leftover temp workspaces"),
        Err(e) => warn!("could not sweep temp dir: {e}"),
    }

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                shutdown.cancel();
            }
        });
    }

    let result = match cfg.mode {
        Mode::Bot => trb_telegram::run_polling(cfg, shutdown).await,
        Mode::User => trb_mtproto::run(cfg, shutdown).await,
    };
    result.map_err(|e| trb_core::Error::External(format!("bot stopped with an error: {e:#}")))?;

    info!("bye");
    Ok(())
}
