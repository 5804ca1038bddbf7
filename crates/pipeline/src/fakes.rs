//! In-memory fakes for the port traits (testing only)
//!
//! Provides scripted and recording implementations that satisfy the trait
//! contracts without any external dependencies, so the schema guard, trust
//! gate, and orchestrator can be exercised deterministically.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::{ConfigError, GeneratorError, KnowledgeError, RetrievalError};
use crate::ports::*;
use crate::{PartitionName, RoleConfig, Stage, TechSpec};

// ---------------------------------------------------------------------------
// ScriptedGenerator
// ---------------------------------------------------------------------------

/// One recorded generator invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorCall {
    pub system_context: String,
    pub prompt: String,
}

/// Generator that replays a fixed queue of responses in call order and
/// records every call.
///
/// When the queue runs dry (or the fake was built with [`Self::failing`]) the
/// call fails with [`GeneratorError::Transport`].
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<GeneratorCall>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A generator whose every call fails.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<GeneratorCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Calls whose system context contains `marker` (e.g. a role prompt).
    pub fn calls_matching(&self, marker: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.system_context.contains(marker))
            .count()
    }

    /// Responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, system_context: &str, prompt: &str) -> Result<String, GeneratorError> {
        self.calls.lock().unwrap().push(GeneratorCall {
            system_context: system_context.to_string(),
            prompt: prompt.to_string(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| GeneratorError::Transport {
                message: "scripted generator has no response left".into(),
            })
    }
}

// ---------------------------------------------------------------------------
// StaticRetriever
// ---------------------------------------------------------------------------

/// Retriever serving fixed snippets per partition. Unknown partitions return
/// an empty list.
#[derive(Debug, Default)]
pub struct StaticRetriever {
    partitions: HashMap<PartitionName, Vec<Snippet>>,
    queries: Mutex<Vec<(String, PartitionName)>>,
}

impl StaticRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partition(mut self, partition: PartitionName, snippets: Vec<Snippet>) -> Self {
        self.partitions.insert(partition, snippets);
        self
    }

    /// Every `(query, partition)` pair seen so far.
    pub fn queries(&self) -> Vec<(String, PartitionName)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl KnowledgeRetriever for StaticRetriever {
    async fn retrieve(
        &self,
        query: &str,
        partition: &PartitionName,
        top_k: usize,
    ) -> Result<Vec<Snippet>, RetrievalError> {
        self.queries
            .lock()
            .unwrap()
            .push((query.to_string(), partition.clone()));
        Ok(self
            .partitions
            .get(partition)
            .map(|s| s.iter().take(top_k).cloned().collect())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MemoryWriter / CountingSeeder / FixedRoleLoader
// ---------------------------------------------------------------------------

/// Knowledge writer that records every appended document.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    appended: Mutex<Vec<(PartitionName, KnowledgeDocument)>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn appended(&self) -> Vec<(PartitionName, KnowledgeDocument)> {
        self.appended.lock().unwrap().clone()
    }
}

#[async_trait]
impl KnowledgeWriter for MemoryWriter {
    async fn append(
        &self,
        partition: &PartitionName,
        document: KnowledgeDocument,
    ) -> Result<(), KnowledgeError> {
        self.appended
            .lock()
            .unwrap()
            .push((partition.clone(), document));
        Ok(())
    }
}

/// Seeder that counts invocations and optionally fails.
#[derive(Debug, Default)]
pub struct CountingSeeder {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingSeeder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KnowledgeSeeder for CountingSeeder {
    async fn reseed(&self) -> Result<SeedReport, KnowledgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(KnowledgeError::Io {
                message: "seed source unavailable".into(),
            });
        }
        Ok(SeedReport::default())
    }
}

/// Role loader returning a fixed config (or a blank-prompt error) and
/// counting loads.
#[derive(Debug)]
pub struct FixedRoleLoader {
    roles: Option<RoleConfig>,
    loads: AtomicUsize,
}

impl FixedRoleLoader {
    pub fn new(roles: RoleConfig) -> Self {
        Self {
            roles: Some(roles),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            roles: None,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoleConfigLoader for FixedRoleLoader {
    async fn load(&self) -> Result<RoleConfig, ConfigError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.roles.clone().ok_or_else(|| ConfigError::EmptyPrompt {
            role: "architect".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// One recorded progress marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkEvent {
    pub stage: Stage,
    pub event: String,
    pub attributes: Vec<(String, String)>,
}

/// Observability sink that records every emitted marker.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Stages entered, in order.
    pub fn stages_entered(&self) -> Vec<Stage> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event == "entered")
            .map(|e| e.stage)
            .collect()
    }
}

impl ObservabilitySink for RecordingSink {
    fn emit(&self, stage: Stage, event: &str, attributes: &[(&str, String)]) {
        self.events.lock().unwrap().push(SinkEvent {
            stage,
            event: event.to_string(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        });
    }
}

// ---------------------------------------------------------------------------
// ScriptedApprover
// ---------------------------------------------------------------------------

/// Approver that always approves (returning the spec unchanged) or always
/// rejects, recording each checkpoint it was asked about.
#[derive(Debug)]
pub struct ScriptedApprover {
    approve: bool,
    checkpoints: Mutex<Vec<ApprovalCheckpoint>>,
}

impl ScriptedApprover {
    pub fn approving() -> Self {
        Self {
            approve: true,
            checkpoints: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            approve: false,
            checkpoints: Mutex::new(Vec::new()),
        }
    }

    pub fn checkpoints(&self) -> Vec<ApprovalCheckpoint> {
        self.checkpoints.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.checkpoints.lock().unwrap().len()
    }
}

#[async_trait]
impl SpecApprover for ScriptedApprover {
    async fn approve(
        &self,
        spec: &TechSpec,
        checkpoint: &ApprovalCheckpoint,
    ) -> Result<TechSpec, ApprovalRejection> {
        self.checkpoints.lock().unwrap().push(checkpoint.clone());
        if self.approve {
            Ok(spec.clone())
        } else {
            Err(ApprovalRejection::new("operator declined"))
        }
    }
}
