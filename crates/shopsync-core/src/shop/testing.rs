//! Scripted transport and fixtures for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::Value;

use super::{ShopRequest, ShopResponse, ShopTransport};
use crate::error::TransportError;
use crate::models::{
    ApiVersion, ExternalId, InternalId, ShopConfig, ShopId, TaxRulesGroups, WarehouseSelection,
};

pub fn shop(id: ShopId) -> ShopConfig {
    ShopConfig {
        id,
        name: format!("Shop {id}"),
        base_url: "https://shop.example.com".to_string(),
        api_key: "test-key".to_string(),
        api_version: ApiVersion::V8,
        tax_rules_groups: TaxRulesGroups {
            rate_23: Some(ExternalId::new(1)),
            rate_8: Some(ExternalId::new(2)),
            rate_5: Some(ExternalId::new(3)),
            rate_0: Some(ExternalId::new(4)),
        },
        default_price_group: InternalId::new(1),
        warehouses: WarehouseSelection::All,
        root_categories: vec![ExternalId::new(1), ExternalId::new(2)],
        schedule: None,
        active: true,
    }
}

/// Replays queued responses in order and records every request.
///
/// When the queue is empty every request gets `200 {}`.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<std::result::Result<ShopResponse, TransportError>>>,
    requests: Mutex<Vec<ShopRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, status: u16, body: Value) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(ShopResponse { status, body }));
    }

    pub fn fail(&self, error: TransportError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<ShopRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ShopTransport for ScriptedTransport {
    async fn send(
        &self,
        _shop: &ShopConfig,
        request: ShopRequest,
    ) -> std::result::Result<ShopResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(ShopResponse {
                    status: 200,
                    body: Value::Object(serde_json::Map::new()),
                })
            })
    }
}
