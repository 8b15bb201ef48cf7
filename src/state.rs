//! Application state shared across handlers.
//!
//! The connection pool and upload store are injected here at startup and
//! reach handlers through axum's `State` extractor; nothing holds them as
//! process-wide globals.

use sqlx::PgPool;
use std::sync::Arc;

use crate::uploads::UploadStore;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pool: PgPool,
    uploads: UploadStore,
}

impl AppState {
    pub fn new(pool: PgPool, uploads: UploadStore) -> Self {
        Self {
            inner: Arc::new(AppStateInner { pool, uploads }),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    pub fn uploads(&self) -> &UploadStore {
        &self.inner.uploads
    }
}
