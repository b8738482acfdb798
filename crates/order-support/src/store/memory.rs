//! In-Memory Order Store
//!
//! Fixed reference data, loaded once and never mutated.

use async_trait::async_trait;
use std::collections::HashSet;

use super::OrderStore;
use crate::error::{OrderError, Result};
use crate::model::{Order, OrderStatus};

/// Order store backed by a `Vec`
#[derive(Clone, Debug, Default)]
pub struct MemoryOrderStore {
    orders: Vec<Order>,
}

impl MemoryOrderStore {
    /// Build from a list of orders; ids must be unique
    pub fn new(orders: Vec<Order>) -> Result<Self> {
        let mut seen = HashSet::new();
        for order in &orders {
            if !seen.insert(order.id.clone()) {
                return Err(OrderError::DuplicateOrder(order.id.clone()));
            }
        }
        Ok(Self { orders })
    }

    /// Load a JSON array of orders
    pub fn from_json(json: &str) -> Result<Self> {
        Self::new(serde_json::from_str(json)?)
    }

    /// The demo dataset
    pub fn seeded() -> Self {
        Self {
            orders: vec![
                Order::new("A1001", "nick@bosar.agency", OrderStatus::Shipped)
                    .with_eta_days(3)
                    .with_tracking_number("TRK-111"),
                Order::new("A1002", "nick@bosar.agency", OrderStatus::Processing).with_eta_days(7),
                Order::new("B2001", "bohdan@bosar.agency", OrderStatus::Delivered),
            ],
        }
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn find_by_id(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.orders.iter().find(|o| o.id == order_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Vec<Order>> {
        let needle = email.to_lowercase();
        Ok(self
            .orders
            .iter()
            .filter(|o| o.email.to_lowercase() == needle)
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "MemoryOrderStore"
    }
}
