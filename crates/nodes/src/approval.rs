//! Closure-backed approval hook.

use std::future::Future;

use async_trait::async_trait;
use pipeline::{ApprovalCheckpoint, ApprovalRejection, SpecApprover, TechSpec};

/// Adapts an async closure into a [`SpecApprover`].
///
/// The closure receives owned copies of the spec and checkpoint and resolves
/// to the approved spec or a rejection, so any async predicate (an operator
/// prompt, a webhook round-trip) can serve as the approval gate.
pub struct FnApprover<F> {
    approve: F,
}

impl<F> FnApprover<F> {
    pub fn new(approve: F) -> Self {
        Self { approve }
    }
}

#[async_trait]
impl<F, Fut> SpecApprover for FnApprover<F>
where
    F: Fn(TechSpec, ApprovalCheckpoint) -> Fut + Send + Sync,
    Fut: Future<Output = Result<TechSpec, ApprovalRejection>> + Send,
{
    async fn approve(
        &self,
        spec: &TechSpec,
        checkpoint: &ApprovalCheckpoint,
    ) -> Result<TechSpec, ApprovalRejection> {
        (self.approve)(spec.clone(), checkpoint.clone()).await
    }
}
