// HttpClientFactory: builds the reqwest clients used to reach remote services.

use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;
use worker_sdk::WorkerPackage;

use crate::config_store::WorkerSettings;

/// Creates properly configured HTTP clients for the worker.
///
/// Proxy settings are left to reqwest, which honours `HTTP_PROXY`,
/// `HTTPS_PROXY` and `NO_PROXY` from the environment.
pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Create a client with the given request timeout.
    ///
    /// When `skip_tls_verify` is set, certificate verification is disabled
    /// (dangerous, intended for local rendering services only).
    pub fn create_client(timeout: Duration, skip_tls_verify: bool) -> Result<Client> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .user_agent(WorkerPackage::user_agent());

        if skip_tls_verify {
            tracing::warn!("TLS certificate verification is disabled for remote services");
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder.build().context("failed to build HTTP client")
    }

    /// Create a client from worker settings.
    pub fn from_settings(settings: &WorkerSettings) -> Result<Client> {
        Self::create_client(settings.http_timeout(), settings.skip_tls_verify)
    }
}
