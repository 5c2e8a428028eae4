use std::sync::Arc;

use axum::extract::FromRef;
use libris_authz::StaffPolicy;
use libris_kernel::settings::Settings;
use sqlx::SqlitePool;

use crate::session::SessionStore;

/// Shared handles given to every module router
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub sessions: Arc<dyn SessionStore>,
    /// Session slot holding the loan selection
    pub selection_slot: Arc<str>,
    pub staff: StaffPolicy,
}

impl AppState {
    pub fn new(db: SqlitePool, sessions: Arc<dyn SessionStore>, settings: &Settings) -> Self {
        Self {
            db,
            sessions,
            selection_slot: Arc::from(settings.session.selection_key.as_str()),
            staff: StaffPolicy::from_settings(&settings.auth),
        }
    }
}

impl FromRef<AppState> for StaffPolicy {
    fn from_ref(state: &AppState) -> Self {
        state.staff.clone()
    }
}
