//! Get Order Tool
//!
//! Looks up a single order by id.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use agent_core::{
    Result as CoreResult, Tool, ToolSchema,
    tool::{ParameterSchema, string_argument},
};

use crate::store::OrderStore;

/// Tool for fetching one order
pub struct GetOrderTool {
    store: Arc<dyn OrderStore>,
}

impl GetOrderTool {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetOrderTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_order".into(),
            description: "Get an order by its id.".into(),
            parameters: vec![ParameterSchema::required_string("orderId", "Order id like A1001")],
        }
    }

    /// Returns the order, or `null` when no order has that id
    async fn execute(&self, arguments: &Value) -> CoreResult<Value> {
        let order_id = string_argument(arguments, "orderId");
        let order = self.store.find_by_id(&order_id).await?;
        tracing::debug!(order_id = %order_id, found = order.is_some(), "get_order");
        Ok(serde_json::to_value(order)?)
    }
}
