// aethera-core/src/application/memory.rs
//
// Report memory store: section texts with embeddings, cosine
// retrieval for RAG context, and an append-only feedback log. The store
// supplies examples to the narrative generator, never facts.

use crate::error::AetheraError;
use crate::infrastructure::embedding::{EmbeddingProvider, cosine_score};
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::fs::{ensure_dir, save_json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSection {
    pub report_id: String,
    pub section_id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Computed lazily on first retrieval when absent at write time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f64>>,
    pub embedding_dim: usize,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SectionInput {
    pub section_id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    pub embedding: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarSection {
    pub report_id: String,
    pub section_id: String,
    /// Cosine similarity in [0, 1]; 1 = identical direction.
    pub score: f64,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub report_id: String,
    pub reviewer: String,
    pub rating: i32,
    pub text: String,
    pub recorded_at: DateTime<Utc>,
}

pub struct ReportMemory {
    sections_path: PathBuf,
    feedback_path: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    state: Mutex<Vec<StoredSection>>,
}

impl ReportMemory {
    pub fn open(
        root: PathBuf,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, AetheraError> {
        ensure_dir(&root)?;
        let sections_path = root.join("sections.json");
        let state: Vec<StoredSection> = if sections_path.exists() {
            serde_json::from_str(&fs::read_to_string(&sections_path)?)
                .map_err(InfrastructureError::JsonError)?
        } else {
            Vec::new()
        };
        Ok(Self {
            sections_path,
            feedback_path: root.join("feedback.jsonl"),
            embedder,
            state: Mutex::new(state),
        })
    }

    /// Store or replace sections by `(report_id, section_id)`. Provided
    /// embeddings must match the deployment dimension.
    #[instrument(skip(self, sections))]
    pub async fn upsert(
        &self,
        report_id: &str,
        sections: Vec<SectionInput>,
    ) -> Result<(), AetheraError> {
        let dim = self.embedder.dimension();
        for section in &sections {
            if let Some(embedding) = &section.embedding {
                if embedding.len() != dim {
                    return Err(AetheraError::Infrastructure(InfrastructureError::Embedding(
                        format!(
                            "embedding dimension {} does not match deployment dimension {dim}",
                            embedding.len()
                        ),
                    )));
                }
            }
        }

        let mut state = self.state.lock().await;
        for section in sections {
            state.retain(|s| {
                !(s.report_id == report_id && s.section_id == section.section_id)
            });
            state.push(StoredSection {
                report_id: report_id.to_string(),
                section_id: section.section_id,
                text: section.text,
                metadata: section.metadata,
                embedding: section.embedding,
                embedding_dim: dim,
                stored_at: Utc::now(),
            });
        }
        save_json(&self.sections_path, &*state)?;
        info!(report_id, total = state.len(), "report sections stored");
        Ok(())
    }

    /// Top-k nearest sections by cosine similarity, optionally filtered by
    /// metadata equality, thresholded at `min_score`.
    pub async fn find_similar(
        &self,
        query_text: &str,
        k: usize,
        filter: &BTreeMap<String, String>,
        min_score: f64,
    ) -> Result<Vec<SimilarSection>, AetheraError> {
        let query = self.embedder.embed(query_text).await?;
        if query.len() != self.embedder.dimension() {
            return Err(AetheraError::Infrastructure(InfrastructureError::Embedding(
                "provider returned a vector of the wrong dimension".into(),
            )));
        }

        // Lazy embedding of sections stored without one.
        let pending: Vec<(usize, String)> = {
            let state = self.state.lock().await;
            state
                .iter()
                .enumerate()
                .filter(|(_, s)| s.embedding.is_none())
                .map(|(i, s)| (i, s.text.clone()))
                .collect()
        };
        if !pending.is_empty() {
            let texts: Vec<String> = pending.iter().map(|(_, t)| t.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;
            let mut state = self.state.lock().await;
            for ((idx, _), embedding) in pending.into_iter().zip(embeddings) {
                if let Some(section) = state.get_mut(idx) {
                    section.embedding = Some(embedding);
                }
            }
            save_json(&self.sections_path, &*state)?;
        }

        let state = self.state.lock().await;
        let mut scored: Vec<SimilarSection> = state
            .iter()
            .filter(|s| {
                filter
                    .iter()
                    .all(|(key, value)| s.metadata.get(key) == Some(value))
            })
            .filter_map(|s| {
                let embedding = s.embedding.as_ref()?;
                if embedding.len() != query.len() {
                    return None; // legacy dimension, never comparable
                }
                let score = cosine_score(&query, embedding);
                (score >= min_score).then(|| SimilarSection {
                    report_id: s.report_id.clone(),
                    section_id: s.section_id.clone(),
                    score,
                    text: s.text.clone(),
                    metadata: s.metadata.clone(),
                })
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Append-only reviewer feedback log.
    pub async fn record_feedback(
        &self,
        report_id: &str,
        reviewer: &str,
        rating: i32,
        text: &str,
    ) -> Result<(), AetheraError> {
        let record = FeedbackRecord {
            report_id: report_id.to_string(),
            reviewer: reviewer.to_string(),
            rating,
            text: text.to_string(),
            recorded_at: Utc::now(),
        };
        let mut line =
            serde_json::to_string(&record).map_err(InfrastructureError::JsonError)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.feedback_path)
            .map_err(InfrastructureError::Io)?;
        file.write_all(line.as_bytes()).map_err(InfrastructureError::Io)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::infrastructure::embedding::HashingEmbedder;
    use anyhow::Result;
    use tempfile::tempdir;

    fn memory(root: &std::path::Path) -> ReportMemory {
        ReportMemory::open(
            root.to_path_buf(),
            Arc::new(HashingEmbedder::new(128).unwrap()),
        )
        .unwrap()
    }

    fn section(id: &str, text: &str, country: &str) -> SectionInput {
        let mut metadata = BTreeMap::new();
        metadata.insert("country".to_string(), country.to_string());
        SectionInput {
            section_id: id.to_string(),
            text: text.to_string(),
            metadata,
            embedding: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_lazy_retrieval() -> Result<()> {
        let dir = tempdir()?;
        let memory = memory(dir.path());

        memory
            .upsert(
                "rep-1",
                vec![
                    section("s1", "solar farm impact on Natura 2000 protected habitats", "ITA"),
                    section("s2", "noise assessment for the wind turbine corridor", "GRC"),
                ],
            )
            .await?;

        let hits = memory
            .find_similar(
                "impact of a solar farm on protected habitats",
                3,
                &BTreeMap::new(),
                0.1,
            )
            .await?;
        assert!(!hits.is_empty());
        assert_eq!(hits[0].section_id, "s1");
        assert!(hits[0].score >= hits.last().unwrap().score);
        Ok(())
    }

    #[tokio::test]
    async fn test_metadata_filter_restricts_results() -> Result<()> {
        let dir = tempdir()?;
        let memory = memory(dir.path());
        memory
            .upsert(
                "rep-1",
                vec![
                    section("s1", "protected habitats overlap analysis", "ITA"),
                    section("s2", "protected habitats overlap analysis", "GRC"),
                ],
            )
            .await?;

        let mut filter = BTreeMap::new();
        filter.insert("country".to_string(), "GRC".to_string());
        let hits = memory
            .find_similar("protected habitats overlap", 5, &filter, 0.0)
            .await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].section_id, "s2");
        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_wrong_dim_rejected() -> Result<()> {
        let dir = tempdir()?;
        let memory = memory(dir.path());

        memory.upsert("rep-1", vec![section("s1", "first text", "ITA")]).await?;
        memory.upsert("rep-1", vec![section("s1", "second text", "ITA")]).await?;
        let hits = memory
            .find_similar("second text", 5, &BTreeMap::new(), 0.0)
            .await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "second text");

        let bad = SectionInput {
            embedding: Some(vec![0.5; 7]),
            ..section("s9", "bad dim", "ITA")
        };
        assert!(memory.upsert("rep-1", vec![bad]).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_feedback_is_append_only() -> Result<()> {
        let dir = tempdir()?;
        let memory = memory(dir.path());
        memory.record_feedback("rep-1", "reviewer-a", 4, "solid draft").await?;
        memory.record_feedback("rep-1", "reviewer-b", 2, "weak legal section").await?;

        let raw = std::fs::read_to_string(dir.path().join("feedback.jsonl"))?;
        assert_eq!(raw.lines().count(), 2);
        Ok(())
    }
}
