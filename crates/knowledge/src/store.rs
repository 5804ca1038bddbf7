//! Partitioned in-memory knowledge base.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use pipeline::{
    KnowledgeDocument, KnowledgeError, KnowledgeRetriever, KnowledgeWriter, PartitionName,
    RetrievalError, Snippet,
};
use tokio::sync::RwLock;
use tracing::debug;

/// Terms shorter than this are ignored when ranking.
const MIN_TERM_LEN: usize = 3;

/// Knowledge base holding documents per partition in memory.
///
/// Ranking is term overlap: the fraction of distinct query terms that also
/// appear in a document's title or content. Documents sharing no term with
/// the query are not returned.
///
/// Partitions must be declared (up front, by seeding, or by a write-back)
/// before they can be queried; querying an undeclared partition is a
/// [`RetrievalError::UnknownPartition`].
#[derive(Debug, Default)]
pub struct InMemoryKnowledgeBase {
    partitions: RwLock<HashMap<PartitionName, Vec<KnowledgeDocument>>>,
}

impl InMemoryKnowledgeBase {
    /// Creates a knowledge base with the given partitions declared and empty.
    pub fn new(partitions: impl IntoIterator<Item = PartitionName>) -> Self {
        Self {
            partitions: RwLock::new(
                partitions
                    .into_iter()
                    .map(|name| (name, Vec::new()))
                    .collect(),
            ),
        }
    }

    /// Replaces the whole content of one partition.
    pub async fn replace_partition(
        &self,
        partition: PartitionName,
        documents: Vec<KnowledgeDocument>,
    ) {
        debug!(partition = %partition, documents = documents.len(), "Partition replaced");
        self.partitions.write().await.insert(partition, documents);
    }

    pub async fn document_count(&self, partition: &PartitionName) -> usize {
        self.partitions
            .read()
            .await
            .get(partition)
            .map_or(0, Vec::len)
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TERM_LEN)
        .map(str::to_lowercase)
        .collect()
}

fn score(query_terms: &HashSet<String>, document: &KnowledgeDocument) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let mut document_terms = terms(&document.title);
    document_terms.extend(terms(&document.content));
    let shared = query_terms.intersection(&document_terms).count();
    shared as f64 / query_terms.len() as f64
}

#[async_trait]
impl KnowledgeRetriever for InMemoryKnowledgeBase {
    async fn retrieve(
        &self,
        query: &str,
        partition: &PartitionName,
        top_k: usize,
    ) -> Result<Vec<Snippet>, RetrievalError> {
        let partitions = self.partitions.read().await;
        let documents = partitions
            .get(partition)
            .ok_or_else(|| RetrievalError::UnknownPartition {
                partition: partition.to_string(),
            })?;

        let query_terms = terms(query);
        let mut ranked: Vec<Snippet> = documents
            .iter()
            .filter_map(|document| {
                let relevance_score = score(&query_terms, document);
                (relevance_score > 0.0).then(|| Snippet {
                    id: document.id.clone(),
                    content: format!("{}\n\n{}", document.title, document.content),
                    relevance_score,
                })
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.relevance_score
                .total_cmp(&a.relevance_score)
                .then_with(|| a.id.cmp(&b.id))
        });
        ranked.truncate(top_k);
        Ok(ranked)
    }
}

#[async_trait]
impl KnowledgeWriter for InMemoryKnowledgeBase {
    async fn append(
        &self,
        partition: &PartitionName,
        document: KnowledgeDocument,
    ) -> Result<(), KnowledgeError> {
        let mut partitions = self.partitions.write().await;
        let documents = partitions.entry(partition.clone()).or_default();
        if documents.iter().any(|d| d.id == document.id) {
            return Err(KnowledgeError::Rejected {
                id: document.id.to_string(),
                message: format!("already present in partition '{partition}'"),
            });
        }
        documents.push(document);
        Ok(())
    }
}
