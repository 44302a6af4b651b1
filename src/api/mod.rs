// =============================================================================
// API Module — HTTP + WebSocket surface over the shared view state
// =============================================================================

pub mod rest;
pub mod ws;

pub use rest::router;
