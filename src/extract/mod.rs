// src/extract/mod.rs
//! Turning raw documents into [`TrendItem`] candidates.

pub mod openai;

pub use openai::OpenAiExtractor;

use async_trait::async_trait;

use crate::collect::RawDocument;
use crate::error::ExtractionError;
use crate::model::TrendItem;

/// Black-box extraction. A failure means "skip this document".
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, doc: &RawDocument) -> Result<TrendItem, ExtractionError>;
    fn name(&self) -> &'static str;
}
