//! Lesson Forge · Lesson Generation Backend
//!
//! - Axum HTTP API around the generate → repair → validate → top-up pipeline
//! - OpenAI chat completions as the generator (via environment variables)
//! - In-memory per-topic record of words already taught
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   OPENAI_API_KEY      : enables lesson generation if present
//!   OPENAI_BASE_URL     : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL   : top-up batches, default "gpt-4o-mini"
//!   OPENAI_STRONG_MODEL : full lessons, default "gpt-4o"
//!   LESSON_CONFIG_PATH  : path to TOML config (prompts + default methodology)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod telemetry;
mod util;
mod error;
mod words;
mod domain;
mod config;
mod service;
mod repair;
mod legacy;
mod shape;
mod structure;
mod vocab;
mod topup;
mod pipeline;
mod state;
mod protocol;
mod logic;
mod openai;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let state = Arc::new(AppState::new());
  let app = build_router(state);

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "lesson_forge", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "lesson_forge", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "lesson_forge", error = %e, "Failed to listen for shutdown signal");
  }
}
