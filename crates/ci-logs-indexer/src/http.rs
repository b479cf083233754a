// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client construction for the index backend.

use core::time::Duration;
use std::error::Error;
use tracing::error;

/// Builds a reqwest client with the given per-request timeout, routed through
/// `proxy_url` when one is configured.
pub fn build_client(
    proxy_url: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));
    if let Some(proxy) = proxy_url {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    Ok(builder.build()?)
}

/// Like [`build_client`], but falls back to a direct connection when the
/// proxy configuration is unusable.
pub fn get_client(proxy_url: Option<&str>, timeout: Duration) -> reqwest::Client {
    match build_client(proxy_url, timeout) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            build_client(None, timeout).unwrap_or_else(|inner| {
                error!(
                    "Failed to build HTTP client without proxy: {}, using reqwest defaults",
                    inner
                );
                reqwest::Client::new()
            })
        }
    }
}
