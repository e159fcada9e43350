//! Core services of threadbook and their HTTP surface.

pub mod error;
pub mod membership;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod threads;
pub mod tokens;
pub mod voice;

use std::sync::Arc;

use anyhow::{Context, anyhow};
use threadbook_db::Database;

pub use error::{CoreError, CoreResult, ErrorKind};
pub use membership::MembershipOracle;
pub use messages::MessageStore;
pub use routes::router;
pub use state::{AppState, AppStateInner};
pub use threads::ThreadDirectory;
pub use tokens::TokenService;
pub use voice::{VoiceBackend, VoiceRoomGate};

/// Run a blocking DB call off the async runtime.
pub(crate) async fn blocking<F, T>(db: &Arc<Database>, what: &'static str, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {}", e))?
        .context(what)
}
