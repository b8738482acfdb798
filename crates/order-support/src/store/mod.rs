//! Order Store
//!
//! Abstraction over where orders come from. The agent only ever reads.

mod memory;

pub use memory::MemoryOrderStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::Order;

/// Order lookup backend (Strategy pattern)
///
/// Implement this for a database or an upstream order API.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Exact, case-sensitive id match
    async fn find_by_id(&self, order_id: &str) -> Result<Option<Order>>;

    /// Case-insensitive email match, in store order
    async fn find_by_email(&self, email: &str) -> Result<Vec<Order>>;

    /// Store name for logs and health output
    fn name(&self) -> &str;
}
