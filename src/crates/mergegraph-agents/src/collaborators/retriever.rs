//! In-process retrieval
//!
//! [`KeywordRetriever`] splits documents into overlapping character windows,
//! ranks them by query-term overlap and hands the best fragments, in document
//! order, to the language model as context.

use super::{
    ChatMessage, Chunk, CollaboratorResult, IndexHandle, LanguageModel, RetrievalResult, Retriever,
};
use crate::config::PipelineConfig;
use crate::error::CollaboratorError;
use crate::prompts::render_template;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt::Write;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_TEMPLATE: &str = "Answer the question using only the context below.\n\nContext:\n{context}\n\nQuestion: {query_text}";

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "its", "are", "was", "were", "into", "what",
    "which", "their", "about", "have", "has", "how", "key", "any", "all", "you", "your",
];

pub struct KeywordRetriever {
    llm: Arc<dyn LanguageModel>,
    chunk_size: usize,
    chunk_overlap: usize,
    top_k: usize,
    template: String,
    system: Option<String>,
}

impl KeywordRetriever {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            llm,
            chunk_size: 1000,
            chunk_overlap: 100,
            top_k: 4,
            template: DEFAULT_TEMPLATE.to_string(),
            system: None,
        }
    }

    pub fn from_config(llm: Arc<dyn LanguageModel>, config: &PipelineConfig) -> Self {
        Self::new(llm).with_chunking(config.chunk_size, config.chunk_overlap).with_top_k(config.top_k)
    }

    /// Window size and overlap in characters; overlap is clamped below size
    pub fn with_chunking(mut self, size: usize, overlap: usize) -> Self {
        self.chunk_size = size.max(1);
        self.chunk_overlap = overlap.min(self.chunk_size - 1);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Answer template with `{context}` and `{query_text}` placeholders
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    fn chunk(&self, doc_id: usize, text: &str) -> Vec<Chunk> {
        let windows = split_windows(text, self.chunk_size, self.chunk_overlap);
        let total = windows.len();
        windows
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                doc_id,
                index,
                total,
                text,
            })
            .collect()
    }

    /// Best `top_k` chunks for `query`, returned in document order
    fn select<'a>(&self, query: &str, index: &'a IndexHandle) -> Vec<&'a Chunk> {
        let terms = terms(query);
        let mut scored: Vec<(usize, &Chunk)> = index
            .chunks()
            .iter()
            .map(|chunk| (score(&terms, &chunk.text), chunk))
            .collect();

        // Stable sort keeps document order among equal scores
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        let mut selected: Vec<&Chunk> = scored.into_iter().take(self.top_k).map(|(_, c)| c).collect();
        selected.sort_by_key(|c| (c.doc_id, c.index));
        selected
    }
}

impl std::fmt::Debug for KeywordRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordRetriever")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Retriever for KeywordRetriever {
    async fn build(&self, source_text: &str) -> CollaboratorResult<IndexHandle> {
        let chunks = self.chunk(0, source_text);
        debug!(chunks = chunks.len(), "Built retrieval index");
        Ok(IndexHandle::new(chunks, 1))
    }

    async fn query(&self, text: &str, index: &IndexHandle) -> CollaboratorResult<RetrievalResult> {
        if index.is_empty() {
            return Err(CollaboratorError::Retrieval("index contains no documents".to_string()));
        }

        let selected = self.select(text, index);
        let mut context = String::new();
        for chunk in &selected {
            let _ = writeln!(
                context,
                "[Document {} - Chunk {}/{}] {}\n",
                chunk.doc_id,
                chunk.index + 1,
                chunk.total,
                chunk.text
            );
        }

        let prompt = render_template(&self.template, &[("context", context.trim_end()), ("query_text", text)]);
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.push(ChatMessage::user(prompt));

        let response = self.llm.invoke(&messages).await?;
        Ok(RetrievalResult {
            result_text: response.text,
            source_fragments: selected.into_iter().map(|c| c.text.clone()).collect(),
        })
    }

    async fn extend(&self, index: &IndexHandle, new_text: &str) -> CollaboratorResult<IndexHandle> {
        if new_text.trim().is_empty() {
            return Ok(index.clone());
        }
        let doc_id = index.documents();
        let mut chunks = index.chunks().to_vec();
        chunks.extend(self.chunk(doc_id, new_text));
        Ok(IndexHandle::new(chunks, doc_id + 1))
    }
}

/// Overlapping windows of `size` characters, advancing by `size - overlap`
fn split_windows(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.iter().all(|c| c.is_whitespace()) {
        return Vec::new();
    }
    let step = size.saturating_sub(overlap).max(1);
    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    windows
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|t| t.len() > 2 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn score(terms: &HashSet<String>, text: &str) -> usize {
    let lower = text.to_lowercase();
    terms.iter().map(|t| lower.matches(t.as_str()).count()).sum()
}
