use super::{ReportRenderer, unsupported};
use crate::error::Result;
use crate::types::{Message, ReportDetails, ReportFormat};

/// Serializes the reported messages as a JSON array in thread order
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonRenderer;

impl ReportRenderer for JsonRenderer {
    fn supports(&self, format: ReportFormat) -> bool {
        format == ReportFormat::Json
    }

    fn render(&self, details: &ReportDetails, format: ReportFormat) -> Result<Vec<u8>> {
        if !self.supports(format) {
            return Err(unsupported(format, "JSON"));
        }
        let messages: Vec<&Message> = details.messages().collect();
        Ok(serde_json::to_vec(&messages)?)
    }
}
