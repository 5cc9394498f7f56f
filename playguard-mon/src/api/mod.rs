//! Review API: read access to plays and decisions, override CRUD, and
//! on-demand reclassification

pub mod classify;
pub mod health;
pub mod overrides;
pub mod reviews;

use serde::Deserialize;

/// limit/offset pagination, clamped server-side
#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageParams {
    /// Effective (limit, offset): limit in 1..=1000, offset >= 0
    pub fn clamped(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(100).clamp(1, 1000);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

// ============================================================================
// Tests
// ============================================================================
