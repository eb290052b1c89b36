//! Backend selection by free-text query.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

use crate::utils::errors::McpResult;

/// Ranked lookup of backend ids for a natural-language query
#[async_trait]
pub trait DiscoveryIndex: Send + Sync {
    /// Most relevant first, at most `limit` ids.
    async fn query(&self, text: &str, limit: usize) -> McpResult<Vec<String>>;

    async fn upsert(&self, id: &str, metadata: Value, document: &str) -> McpResult<()>;

    async fn delete(&self, ids: &[String]) -> McpResult<()>;

    async fn list_ids(&self) -> McpResult<BTreeSet<String>>;
}

#[derive(Debug, Clone)]
struct Entry {
    metadata: Value,
    tokens: BTreeSet<String>,
    document: String,
}

/// Token-overlap index held in memory
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(&self, id: &str) -> Option<Value> {
        self.entries.read().get(id).map(|e| e.metadata.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[async_trait]
impl DiscoveryIndex for InMemoryIndex {
    async fn query(&self, text: &str, limit: usize) -> McpResult<Vec<String>> {
        let needle = text.to_lowercase();
        let query_tokens = tokenize(text);
        if query_tokens.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let entries = self.entries.read();
        let mut scored: Vec<(usize, &String)> = entries
            .iter()
            .filter_map(|(id, entry)| {
                let mut score = entry.tokens.intersection(&query_tokens).count() * 2;
                if entry.document.to_lowercase().contains(&needle) {
                    score += 1;
                }
                (score > 0).then_some((score, id))
            })
            .collect();

        // Highest score first, ties broken by id for a stable order
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, id)| id.clone())
            .collect())
    }

    async fn upsert(&self, id: &str, metadata: Value, document: &str) -> McpResult<()> {
        self.entries.write().insert(
            id.to_string(),
            Entry {
                metadata,
                tokens: tokenize(document),
                document: document.to_string(),
            },
        );
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> McpResult<()> {
        let mut entries = self.entries.write();
        for id in ids {
            entries.remove(id);
        }
        Ok(())
    }

    async fn list_ids(&self) -> McpResult<BTreeSet<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::assert_ok;

    async fn seeded() -> InMemoryIndex {
        let index = InMemoryIndex::new();
        index
            .upsert("github", json!({"protocol": "stdio"}), "github Issues and pull requests git")
            .await
            .unwrap();
        index
            .upsert("files", json!({}), "files Read and write local files")
            .await
            .unwrap();
        index
            .upsert("weather", json!({}), "weather Forecasts")
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn test_query_ranks_by_overlap() {
        let index = seeded().await;
        let hits = index.query("open pull requests on github", 5).await.unwrap();
        assert_eq!(hits.first().map(String::as_str), Some("github"));
        assert!(!hits.contains(&"weather".to_string()));
    }

    #[tokio::test]
    async fn test_query_respects_limit() {
        let index = seeded().await;
        let hits = index.query("files github weather", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(index.query("", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_delete_removes() {
        let index = seeded().await;
        assert_ok!(
            index
                .upsert("weather", json!({"v": 2}), "weather Radar maps")
                .await
        );
        assert_eq!(index.metadata("weather"), Some(json!({"v": 2})));
        assert!(index.query("forecasts", 5).await.unwrap().is_empty());

        assert_ok!(index.delete(&["weather".to_string()]).await);
        let ids = assert_ok!(index.list_ids().await);
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains("weather"));
    }
}
