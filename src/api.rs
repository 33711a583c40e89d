//! HTTP API for the returns desk
//!
//! Widget actions, agent tool calls and transport notifications all land
//! on the same engine.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::db::Database;
use crate::engine::ProductionEngine;
use crate::tools::ToolRegistry;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ProductionEngine>,
    pub tools: Arc<ToolRegistry>,
    pub db: Database,
}

impl AppState {
    pub fn new(engine: ProductionEngine, db: Database) -> Self {
        Self {
            engine: Arc::new(engine),
            tools: Arc::new(ToolRegistry::standard()),
            db,
        }
    }
}
