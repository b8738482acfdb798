//! # order-support
//!
//! Order lookup tools and the structured support answer for an order
//! support assistant.
//!
//! ## Tools
//!
//! ```text
//! ┌──────────────────────┬──────────────┬──────────────────────────────┐
//! │ Tool                 │ Argument     │ Returns                      │
//! ├──────────────────────┼──────────────┼──────────────────────────────┤
//! │ get_order            │ orderId      │ Order, or null               │
//! │ list_orders_by_email │ email        │ Order[] (possibly empty)     │
//! └──────────────────────┴──────────────┴──────────────────────────────┘
//! ```
//!
//! Both tools are read-only and share one `OrderStore`.

pub mod error;
pub mod model;
pub mod store;
pub mod svckit;

use std::sync::Arc;

use agent_core::ToolRegistry;

pub use error::{OrderError, Result};
pub use model::{Order, OrderStatus, OrderSummary, SupportResponse};
pub use store::{MemoryOrderStore, OrderStore};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::{GetOrderTool, ListOrdersByEmailTool};
}

/// Registry holding both lookup tools over one store
pub fn registry(store: Arc<dyn OrderStore>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(tools::GetOrderTool::new(Arc::clone(&store)));
    registry.register(tools::ListOrdersByEmailTool::new(store));
    registry
}

/// Developer prompt for the order support agent
pub const SUPPORT_PROMPT: &str = "You are an order support assistant.\n\
- Use tools to retrieve order data.\n\
- Never invent order status.\n\
- If you don't have enough info, ask one clarifying question.\n";

/// Developer prompt for answers streamed without tools
pub const DIRECT_PROMPT: &str = "You are an order support assistant.\n\
- You cannot look up orders in this conversation.\n\
- Never invent order status.\n\
- If the question needs order data, ask one clarifying question.\n";
