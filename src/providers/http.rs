//! Shared HTTP client construction for vendor clients, grounded in the
//! teacher's `tools::download::net::build_reqwest_client` pattern: a
//! blocking `reqwest::Client` with an explicit per-call timeout so a
//! misbehaving vendor endpoint cannot hang a worker thread indefinitely.

use std::time::Duration;

use anyhow::{Context, Result};

pub fn build_blocking_client(timeout: Duration, context_label: &'static str) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .with_context(|| format!("failed to build HTTP client for {context_label}"))
}
