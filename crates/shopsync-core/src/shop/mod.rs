//! Boundary to the external shop API.
//!
//! [`ShopTransport`] moves raw requests; [`ShopClient`] adds the product
//! endpoints and turns status codes into outcomes. A 404 is reported as an
//! absent entity, never as a transport failure.

mod http;
mod payload;
#[cfg(test)]
pub(crate) mod testing;

pub use http::HttpShopTransport;
pub use payload::{ExternalProduct, ProductPayload, ShopProductState};

use serde_json::Value;

use crate::error::{Result, TransportError};
use crate::models::{ApiVersion, ExternalId, ShopConfig};
use crate::util::compact_text;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShopRequest {
    pub method: Method,
    /// Path below the shop's base URL, starting with `/`
    pub path: String,
    pub body: Option<Value>,
}

impl ShopRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Put,
            path: path.into(),
            body: Some(body),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShopResponse {
    pub status: u16,
    pub body: Value,
}

impl ShopResponse {
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    pub const fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Non-2xx, non-404 responses as transport errors.
    fn into_error(self) -> TransportError {
        let body = match &self.body {
            Value::String(text) => compact_text(text),
            Value::Null => String::new(),
            other => compact_text(&other.to_string()),
        };
        match self.status {
            401 | 403 => TransportError::Auth(body),
            status => TransportError::Http { status, body },
        }
    }
}

/// Sends one request to one shop.
#[allow(async_fn_in_trait)]
pub trait ShopTransport {
    async fn send(
        &self,
        shop: &ShopConfig,
        request: ShopRequest,
    ) -> std::result::Result<ShopResponse, TransportError>;
}

/// Product endpoints of one shop, speaking that shop's API version.
pub struct ShopClient<'a, T> {
    transport: &'a T,
    shop: &'a ShopConfig,
}

impl<'a, T: ShopTransport> ShopClient<'a, T> {
    pub const fn new(transport: &'a T, shop: &'a ShopConfig) -> Self {
        Self { transport, shop }
    }

    const fn api_base(&self) -> &'static str {
        match self.shop.api_version {
            ApiVersion::V8 => "/api",
            ApiVersion::V9 => "/api/v1",
        }
    }

    fn product_path(&self, external_id: Option<ExternalId>) -> String {
        match external_id {
            Some(id) => format!("{}/products/{id}", self.api_base()),
            None => format!("{}/products", self.api_base()),
        }
    }

    /// Current shop state of a product; `None` when the shop answers 404.
    pub async fn fetch_product(&self, external_id: ExternalId) -> Result<Option<ShopProductState>> {
        let response = self
            .transport
            .send(self.shop, ShopRequest::get(self.product_path(Some(external_id))))
            .await?;

        if response.is_not_found() {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(response.into_error().into());
        }

        let product = ExternalProduct::parse(self.shop.api_version, &response.body)?;
        Ok(Some(product.into_state()))
    }

    /// Overwrite a product. Returns `false` when the shop answers 404.
    pub async fn update_product(
        &self,
        external_id: ExternalId,
        payload: &ProductPayload,
    ) -> Result<bool> {
        let body = ExternalProduct::render(self.shop.api_version, Some(external_id), payload);
        let response = self
            .transport
            .send(self.shop, ShopRequest::put(self.product_path(Some(external_id)), body))
            .await?;

        if response.is_not_found() {
            return Ok(false);
        }
        if !response.is_success() {
            return Err(response.into_error().into());
        }
        Ok(true)
    }

    /// Create a product and return the id the shop assigned.
    pub async fn create_product(&self, payload: &ProductPayload) -> Result<ExternalId> {
        let body = ExternalProduct::render(self.shop.api_version, None, payload);
        let response = self
            .transport
            .send(self.shop, ShopRequest::post(self.product_path(None), body))
            .await?;

        if !response.is_success() {
            return Err(response.into_error().into());
        }

        let created = ExternalProduct::parse(self.shop.api_version, &response.body)?.into_state();
        created.external_id.ok_or_else(|| {
            crate::error::Error::Payload(format!(
                "shop {} did not return an id for the created product",
                self.shop.id
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{shop, ScriptedTransport};
    use super::*;
    use crate::error::Error;
    use crate::models::ShopId;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_product_not_found_is_none() {
        let transport = ScriptedTransport::new();
        transport.respond(404, json!({"errors": [{"code": 404}]}));
        let shop = shop(ShopId::new(1));

        let client = ShopClient::new(&transport, &shop);
        assert_eq!(client.fetch_product(ExternalId::new(9)).await.unwrap(), None);
        assert_eq!(transport.requests()[0].path, "/api/products/9");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_server_error_is_transport_error() {
        let transport = ScriptedTransport::new();
        transport.respond(503, json!("maintenance"));
        let shop = shop(ShopId::new(1));

        let error = ShopClient::new(&transport, &shop)
            .fetch_product(ExternalId::new(9))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            Error::Transport(TransportError::Http { status: 503, .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unauthorized_is_auth_error() {
        let transport = ScriptedTransport::new();
        transport.respond(401, json!(null));
        let shop = shop(ShopId::new(1));

        let error = ShopClient::new(&transport, &shop)
            .fetch_product(ExternalId::new(9))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Transport(TransportError::Auth(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_v9_uses_versioned_base_path() {
        let transport = ScriptedTransport::new();
        transport.respond(201, json!({"product": {"id": 77}}));
        let mut shop = shop(ShopId::new(1));
        shop.api_version = ApiVersion::V9;

        let payload = ProductPayload::sample();
        let id = ShopClient::new(&transport, &shop)
            .create_product(&payload)
            .await
            .unwrap();

        assert_eq!(id, ExternalId::new(77));
        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.path, "/api/v1/products");
    }
}
