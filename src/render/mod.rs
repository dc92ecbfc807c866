//! Report rendering
//!
//! A [`ReportRenderer`] turns [`ReportDetails`] into the bytes of one document
//! format. HTML and PDF renderers are supplied by the host application; plain
//! text ([`TxtRenderer`]) and JSON ([`JsonRenderer`]) are built in.
//!
//! [`RendererRegistry`] dispatches on the requested format and is itself a
//! renderer, so the report pipeline only ever holds one.

mod json;
mod txt;

pub use json::JsonRenderer;
pub use txt::TxtRenderer;

use crate::error::{Error, Result};
use crate::types::{ReportDetails, ReportFormat};
use std::sync::Arc;

/// Produces report documents
pub trait ReportRenderer: Send + Sync {
    /// Whether this renderer can produce `format`
    fn supports(&self, format: ReportFormat) -> bool;

    /// Render `details` as a `format` document
    ///
    /// # Errors
    ///
    /// Returns [`Error::Render`] if the format is unsupported or rendering fails.
    fn render(&self, details: &ReportDetails, format: ReportFormat) -> Result<Vec<u8>>;
}

/// Format-keyed collection of renderers
///
/// Later registrations take precedence, so a host can override a built-in.
#[derive(Clone, Default)]
pub struct RendererRegistry {
    renderers: Vec<Arc<dyn ReportRenderer>>,
}

impl RendererRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the TXT and JSON renderers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TxtRenderer));
        registry.register(Arc::new(JsonRenderer));
        registry
    }

    /// Add a renderer
    pub fn register(&mut self, renderer: Arc<dyn ReportRenderer>) {
        self.renderers.push(renderer);
    }

    /// Renderer responsible for `format`, if any
    pub fn renderer_for(&self, format: ReportFormat) -> Option<&Arc<dyn ReportRenderer>> {
        self.renderers.iter().rev().find(|r| r.supports(format))
    }
}

impl ReportRenderer for RendererRegistry {
    fn supports(&self, format: ReportFormat) -> bool {
        self.renderer_for(format).is_some()
    }

    fn render(&self, details: &ReportDetails, format: ReportFormat) -> Result<Vec<u8>> {
        let renderer = self
            .renderer_for(format)
            .ok_or_else(|| Error::Render(format!("no renderer registered for {format} reports")))?;
        renderer.render(details, format)
    }
}

impl std::fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererRegistry")
            .field("renderers", &self.renderers.len())
            .finish()
    }
}

fn unsupported(format: ReportFormat, renderer: &str) -> Error {
    Error::Render(format!("{renderer} renderer cannot produce {format} reports"))
}
