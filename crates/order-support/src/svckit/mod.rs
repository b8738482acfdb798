//! Service Kit - Agent Tools
//!
//! Order lookup tools that implement `agent_core::Tool`.

mod get_order;
mod list_orders;

pub use get_order::GetOrderTool;
pub use list_orders::ListOrdersByEmailTool;
