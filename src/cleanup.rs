use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, instrument};

use crate::lobby::LobbyService;
use crate::session::service::SessionService;
use crate::shared::AppError;

/// Starts the background task that periodically purges expired lobbies and sessions
///
/// Reads of lapsed entries already behave as if they were gone, this only
/// reclaims their memory.
#[instrument(skip(lobby_service, session_service))]
pub async fn start_cleanup_task(
    lobby_service: Arc<LobbyService>,
    session_service: Arc<SessionService>,
    cleanup_interval: Duration,
) {
    info!(
        cleanup_interval_secs = cleanup_interval.as_secs(),
        "Starting ephemeral store cleanup background task"
    );

    let mut ticker = interval(cleanup_interval);

    loop {
        ticker.tick().await;

        match purge_expired(&lobby_service, &session_service).await {
            Ok((0, 0)) => debug!("Nothing expired"),
            Ok((lobbies, sessions)) => {
                info!(lobbies, sessions, "Expired ephemeral entries purged");
            }
            Err(e) => {
                error!(error = %e, "Cleanup task failed");
            }
        }
    }
}

/// Runs one purge pass, returns how many lobby and session entries went away
pub async fn purge_expired(
    lobby_service: &LobbyService,
    session_service: &SessionService,
) -> Result<(u64, u64), AppError> {
    let lobbies = lobby_service.purge_expired().await?;
    let sessions = session_service.purge_expired().await?;
    Ok((lobbies, sessions))
}
