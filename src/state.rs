use std::sync::Arc;

use tokio::sync::Notify;

use crate::audit::ActivityLog;
use crate::store::postgres::PgStore;

/// Shared application state passed to handlers.
pub struct AppState {
    pub db: PgStore,
    pub activity: ActivityLog,
    /// Nudges the dispatcher after intake; the pending campaign row is the
    /// durable queue entry.
    pub dispatch: Arc<Notify>,
    /// Key expected on admin routes, from config. Never read from the
    /// process environment at request time.
    pub admin_key: String,
}
