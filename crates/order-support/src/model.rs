//! Domain Models
//!
//! Orders as the lookup tools see them, and the structured answer the
//! finalizer asks the model for.

use agent_core::{AgentError, StructuredOutput};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Fulfilment state of an order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Processing,
    Shipped,
    Delivered,
    Canceled,
}

impl OrderStatus {
    pub const ALL: [Self; 4] = [Self::Processing, Self::Shipped, Self::Delivered, Self::Canceled];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Canceled => "canceled",
        }
    }
}

/// A customer order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Order id (e.g., "A1001"), matched case-sensitively
    pub id: String,

    /// Customer email, matched case-insensitively
    pub email: String,

    pub status: OrderStatus,

    /// Days until delivery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_days: Option<u32>,

    /// Carrier tracking number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
}

impl Order {
    pub fn new(id: impl Into<String>, email: impl Into<String>, status: OrderStatus) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            status,
            eta_days: None,
            tracking_number: None,
        }
    }

    #[must_use]
    pub const fn with_eta_days(mut self, days: u32) -> Self {
        self.eta_days = Some(days);
        self
    }

    #[must_use]
    pub fn with_tracking_number(mut self, tracking: impl Into<String>) -> Self {
        self.tracking_number = Some(tracking.into());
        self
    }
}

/// The order as quoted back to the customer; never carries the email
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: String,
    pub status: OrderStatus,
    pub eta_days: Option<u32>,
    pub tracking_number: Option<String>,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.clone(),
            status: order.status,
            eta_days: order.eta_days,
            tracking_number: order.tracking_number.clone(),
        }
    }
}

/// Upper bound on suggested next steps
pub const MAX_NEXT_STEPS: usize = 5;

/// Structured support answer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportResponse {
    /// Customer-facing answer
    pub answer: String,

    /// The order the answer is about, if one was found
    pub order: Option<OrderSummary>,

    /// Suggested follow-ups (at most five)
    pub next_steps: Vec<String>,

    /// Whether the assistant needs more input before it can answer
    pub needs_more_info: bool,

    /// Present exactly when `needs_more_info` is set
    pub clarifying_question: Option<String>,
}

const FINALIZE_INSTRUCTION: &str = "Now produce the final answer as a SupportResponse JSON object.\n\
- Base order details only on tool outputs above; use null for order if none was found.\n\
- Give at most 5 next steps.\n\
- If you need more information, set needsMoreInfo to true and ask exactly one clarifyingQuestion; otherwise set clarifyingQuestion to null.\n";

impl StructuredOutput for SupportResponse {
    const NAME: &'static str = "support_response";

    fn schema() -> Value {
        let statuses: Vec<&str> = OrderStatus::ALL.iter().map(|s| s.as_str()).collect();

        // Strict mode: every property is listed as required, optional ones are nullable
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "answer": { "type": "string" },
                "order": {
                    "anyOf": [
                        {
                            "type": "object",
                            "additionalProperties": false,
                            "properties": {
                                "id": { "type": "string" },
                                "status": { "type": "string", "enum": statuses },
                                "etaDays": { "type": ["integer", "null"], "minimum": 0 },
                                "trackingNumber": { "type": ["string", "null"] }
                            },
                            "required": ["id", "status", "etaDays", "trackingNumber"]
                        },
                        { "type": "null" }
                    ]
                },
                "nextSteps": {
                    "type": "array",
                    "items": { "type": "string" },
                    "maxItems": MAX_NEXT_STEPS
                },
                "needsMoreInfo": { "type": "boolean" },
                "clarifyingQuestion": { "type": ["string", "null"] }
            },
            "required": ["answer", "order", "nextSteps", "needsMoreInfo", "clarifyingQuestion"]
        })
    }

    fn instruction() -> &'static str {
        FINALIZE_INSTRUCTION
    }

    fn validate(&self) -> agent_core::Result<()> {
        if self.next_steps.len() > MAX_NEXT_STEPS {
            return Err(AgentError::StructuredOutput(format!(
                "nextSteps has {} items, at most {MAX_NEXT_STEPS} allowed",
                self.next_steps.len()
            )));
        }
        if self.needs_more_info != self.clarifying_question.is_some() {
            return Err(AgentError::StructuredOutput(
                "clarifyingQuestion must be set exactly when needsMoreInfo is true".into(),
            ));
        }
        Ok(())
    }
}
