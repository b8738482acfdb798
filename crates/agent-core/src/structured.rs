//! Structured Output
//!
//! Types the finalizer can ask the model to produce. The schema is sent as a
//! strict JSON-schema text format; the parsed value is validated locally
//! before it is handed back.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;
use crate::provider::TextFormat;

/// A schema-constrained model result
pub trait StructuredOutput: DeserializeOwned + Serialize + Send {
    /// Schema name reported to the provider
    const NAME: &'static str;

    /// JSON Schema for the result
    fn schema() -> Value;

    /// Developer instruction appended before the finalizing call
    fn instruction() -> &'static str;

    /// Checks the schema cannot express
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Text format for the finalizing request
    fn text_format() -> TextFormat {
        TextFormat {
            name: Self::NAME.into(),
            schema: Self::schema(),
            strict: true,
        }
    }
}
