pub mod export;
pub mod pii;
pub mod render;
pub mod templates;

pub use export::Deadline;
pub use pii::{PiiDetector, PiiEntity, RegexPiiDetector};
pub use render::{DocumentRenderer, SignaturePacketRenderer, SignaturePlaceholder};
pub use templates::{Clause, ClauseLibrary, TemplateSource};

use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;

/// Non-LLM capabilities shared by the stages.
///
/// Each capability sits behind a trait so tests and alternative front ends
/// can swap an implementation without touching the pipeline.
#[derive(Clone)]
pub struct Toolkit {
    pub templates: Arc<dyn TemplateSource>,
    pub pii: Arc<dyn PiiDetector>,
    pub renderer: Arc<dyn DocumentRenderer>,
    /// Destination for calendar, text and signature exports
    pub export_dir: PathBuf,
    /// Clauses retrieved per template search
    pub search_k: usize,
}

impl Toolkit {
    /// Default capabilities: clause files from `templates.clause_dir`, the
    /// regex PII detector and the text signature packet.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let library = ClauseLibrary::load(&config.templates.clause_dir)?;
        debug!("Toolkit ready with {} clauses", library.len());

        Ok(Self {
            templates: Arc::new(library),
            pii: Arc::new(RegexPiiDetector::new()?),
            renderer: Arc::new(SignaturePacketRenderer),
            export_dir: config.core.export_dir.clone(),
            search_k: config.templates.search_k,
        })
    }

    pub fn with_templates(mut self, templates: Arc<dyn TemplateSource>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_pii_detector(mut self, pii: Arc<dyn PiiDetector>) -> Self {
        self.pii = pii;
        self
    }

    pub fn search_templates(&self, query: &str) -> Vec<String> {
        self.templates.search(query, self.search_k)
    }
}
