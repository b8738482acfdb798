//! List Orders Tool
//!
//! Lists a customer's orders by email address.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use agent_core::{
    Result as CoreResult, Tool, ToolSchema,
    tool::{ParameterSchema, string_argument},
};

use crate::store::OrderStore;

/// Tool for listing orders by customer email
pub struct ListOrdersByEmailTool {
    store: Arc<dyn OrderStore>,
}

impl ListOrdersByEmailTool {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListOrdersByEmailTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "list_orders_by_email".into(),
            description: "List recent orders for a customer email.".into(),
            parameters: vec![ParameterSchema::required_string("email", "Customer email")],
        }
    }

    async fn execute(&self, arguments: &Value) -> CoreResult<Value> {
        let email = string_argument(arguments, "email");
        let orders = self.store.find_by_email(&email).await?;
        tracing::debug!(count = orders.len(), "list_orders_by_email");
        Ok(serde_json::to_value(orders)?)
    }
}
