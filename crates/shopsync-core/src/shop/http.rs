//! reqwest-backed shop transport

use std::time::Duration;

use reqwest::{header, Client};
use serde_json::Value;

use super::{Method, ShopRequest, ShopResponse, ShopTransport};
use crate::error::{Error, Result, TransportError};
use crate::models::ShopConfig;
use crate::util::is_http_url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Talks to shops over HTTP, authenticating with the shop's webservice key
/// as the basic-auth user.
#[derive(Debug, Clone)]
pub struct HttpShopTransport {
    client: Client,
}

impl HttpShopTransport {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|error| Error::Config(format!("Failed to build HTTP client: {error}")))?;
        Ok(Self { client })
    }
}

impl ShopTransport for HttpShopTransport {
    async fn send(
        &self,
        shop: &ShopConfig,
        request: ShopRequest,
    ) -> std::result::Result<ShopResponse, TransportError> {
        if !is_http_url(&shop.base_url) {
            return Err(TransportError::Network(format!(
                "shop {} has an invalid base URL",
                shop.id
            )));
        }
        let url = format!("{}{}", shop.base_url.trim_end_matches('/'), request.path);

        let builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };
        let mut builder = builder
            .basic_auth(&shop.api_key, Some(""))
            .header(header::ACCEPT, "application/json")
            .header("Output-Format", "JSON");
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(shop_id = %shop.id, method = request.method.as_str(), %url, "Calling shop API");
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(ShopResponse { status, body })
    }
}
