//! Web search collaborators

use super::{CollaboratorResult, WebSearch};
use crate::config::{get_env, SearchSettings};
use crate::error::CollaboratorError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::time::Duration;
use tracing::warn;

/// Tavily search API client
///
/// Transport and HTTP failures are returned inline as result text rather than
/// as errors, so a failed search shows up in the research notes instead of
/// aborting the pass.
#[derive(Clone)]
pub struct TavilySearch {
    settings: SearchSettings,
    api_key: String,
    client: Client,
}

impl TavilySearch {
    pub fn from_settings(settings: SearchSettings) -> CollaboratorResult<Self> {
        let api_key = get_env(&settings.api_key_env)
            .ok()
            .flatten()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| CollaboratorError::ApiKeyNotFound(settings.api_key_env.clone()))?;
        Self::new(settings, api_key)
    }

    pub fn new(settings: SearchSettings, api_key: impl Into<String>) -> CollaboratorResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            settings,
            api_key: api_key.into(),
            client,
        })
    }

    async fn request(&self, query: &str) -> CollaboratorResult<SearchResponse> {
        let url = format!("{}/search", self.settings.base_url.trim_end_matches('/'));
        let body = SearchRequest {
            api_key: &self.api_key,
            query,
            max_results: self.settings.max_results,
            search_depth: &self.settings.search_depth,
        };

        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Search(format!("API error {}: {}", status, error_text)));
        }
        response
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))
    }
}

impl std::fmt::Debug for TavilySearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilySearch")
            .field("base_url", &self.settings.base_url)
            .field("max_results", &self.settings.max_results)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl WebSearch for TavilySearch {
    async fn search(&self, query: &str) -> CollaboratorResult<String> {
        match self.request(query).await {
            Ok(response) => Ok(format_results(&response)),
            Err(e) => {
                warn!(query, error = %e, "Web search failed");
                Ok(format!("Error performing search for '{}': {}", query, e))
            }
        }
    }
}

fn format_results(response: &SearchResponse) -> String {
    let mut out = String::new();
    if let Some(answer) = response.answer.as_deref().filter(|a| !a.is_empty()) {
        let _ = writeln!(out, "Answer: {}\n", answer);
    }
    for result in &response.results {
        let _ = writeln!(out, "Title: {}\nURL: {}\nContent: {}\n", result.title, result.url, result.content);
    }
    out.trim_end().to_string()
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

/// Search stand-in for offline runs; echoes the query
#[derive(Debug, Clone, Default)]
pub struct OfflineSearch;

#[async_trait]
impl WebSearch for OfflineSearch {
    async fn search(&self, query: &str) -> CollaboratorResult<String> {
        Ok(format!("Title: Offline result\nURL: offline://search\nContent: No live results for '{}'.", query))
    }
}
