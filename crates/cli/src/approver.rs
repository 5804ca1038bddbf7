//! Interactive approval on the controlling terminal.

use async_trait::async_trait;
use pipeline::{ApprovalCheckpoint, ApprovalRejection, SpecApprover, TechSpec};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// [`SpecApprover`] that shows the spec on stderr and reads a `y`/`n` answer
/// from stdin. Anything other than `y` or `yes` rejects.
#[derive(Debug, Default)]
pub struct StdinApprover;

fn render(spec: &TechSpec, checkpoint: &ApprovalCheckpoint) -> String {
    let mut text = match checkpoint {
        ApprovalCheckpoint::BeforeExecution => {
            "\n=== Approve specification before execution ===\n".to_string()
        }
        ApprovalCheckpoint::TrustGateFallback { reason } => format!(
            "\n=== Trust gate refused autonomous merge ===\nReason: {reason}\n"
        ),
    };
    text.push_str(&format!("Title: {}\n", spec.title));
    for (i, criterion) in spec.acceptance_criteria.iter().enumerate() {
        text.push_str(&format!("  {}. {criterion}\n", i + 1));
    }
    text.push_str("Approve? [y/N] ");
    text
}

fn is_approval(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[async_trait]
impl SpecApprover for StdinApprover {
    async fn approve(
        &self,
        spec: &TechSpec,
        checkpoint: &ApprovalCheckpoint,
    ) -> Result<TechSpec, ApprovalRejection> {
        let mut stderr = tokio::io::stderr();
        stderr
            .write_all(render(spec, checkpoint).as_bytes())
            .await
            .map_err(|e| ApprovalRejection::new(format!("could not prompt operator: {e}")))?;
        stderr
            .flush()
            .await
            .map_err(|e| ApprovalRejection::new(format!("could not prompt operator: {e}")))?;

        let mut answer = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut answer)
            .await
            .map_err(|e| ApprovalRejection::new(format!("could not read answer: {e}")))?;

        if is_approval(&answer) {
            Ok(spec.clone())
        } else {
            Err(ApprovalRejection::new("operator declined"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_yes_approves() {
        assert!(is_approval("y\n"));
        assert!(is_approval(" YES "));
        assert!(!is_approval("\n"));
        assert!(!is_approval("no"));
    }
}
