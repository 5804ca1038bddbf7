//! Loads knowledge partitions from a directory tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    KnowledgeDocument, KnowledgeError, KnowledgeSeeder, PartitionName, SeedReport, SnippetId,
    TextSanitizer,
};
use tracing::{debug, info, warn};

use crate::sanitizer::RegexSanitizer;
use crate::store::InMemoryKnowledgeBase;

/// [`KnowledgeSeeder`] reading `<root>/<partition>/*.md`.
///
/// Each sub-directory of `root` is one partition and each Markdown file in
/// it one document. The document id is `<partition>/<file stem>`; the title
/// is the first `# ` heading, or the file stem when there is none. A reseed
/// replaces every partition found on disk and leaves other partitions (such
/// as in-memory write-backs) untouched.
///
/// Titles and contents pass through the sanitizer before they reach the
/// store, the same as stage write-backs.
pub struct DirectorySeeder {
    root: PathBuf,
    base: Arc<InMemoryKnowledgeBase>,
    sanitizer: Arc<dyn TextSanitizer>,
}

impl DirectorySeeder {
    pub fn new(root: impl Into<PathBuf>, base: Arc<InMemoryKnowledgeBase>) -> Self {
        Self {
            root: root.into(),
            base,
            sanitizer: Arc::new(RegexSanitizer::new()),
        }
    }

    /// Replaces the default [`RegexSanitizer`].
    pub fn with_sanitizer(mut self, sanitizer: Arc<dyn TextSanitizer>) -> Self {
        self.sanitizer = sanitizer;
        self
    }
}

fn io_error(path: &Path, error: std::io::Error) -> KnowledgeError {
    KnowledgeError::Io {
        message: format!("{}: {error}", path.display()),
    }
}

fn title_of(content: &str, stem: &str) -> String {
    content
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| stem.to_string())
}

async fn load_partition(
    dir: &Path,
    partition: &PartitionName,
    sanitizer: &dyn TextSanitizer,
) -> Result<Vec<KnowledgeDocument>, KnowledgeError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| io_error(dir, e))?;
    let mut documents = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(dir, e))? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(error) => {
                warn!(path = %path.display(), %error, "Skipping unreadable knowledge document");
                continue;
            }
        };
        let Some(id) = SnippetId::new(format!("{partition}/{stem}")) else {
            continue;
        };
        documents.push(KnowledgeDocument {
            id,
            title: sanitizer.sanitize(&title_of(&content, stem)),
            content: sanitizer.sanitize(&content),
            tags: Vec::new(),
        });
    }
    documents.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(documents)
}

#[async_trait]
impl KnowledgeSeeder for DirectorySeeder {
    async fn reseed(&self) -> Result<SeedReport, KnowledgeError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| io_error(&self.root, e))?;

        let mut report = SeedReport::default();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.root, e))?
        {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(|e| io_error(&path, e))?;
            if !file_type.is_dir() {
                continue;
            }
            let Some(partition) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(PartitionName::new)
            else {
                continue;
            };
            let documents = load_partition(&path, &partition, self.sanitizer.as_ref()).await?;
            debug!(partition = %partition, documents = documents.len(), "Partition loaded");
            report.documents_loaded += documents.len();
            report.partitions.push(partition.clone());
            self.base.replace_partition(partition, documents).await;
        }
        report.partitions.sort();

        info!(
            root = %self.root.display(),
            documents = report.documents_loaded,
            partitions = report.partitions.len(),
            "Knowledge seeded from directory"
        );
        Ok(report)
    }
}
