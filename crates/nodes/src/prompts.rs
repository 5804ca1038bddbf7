//! Prompt rendering for the stage transforms.
//!
//! Prompts are assembled from titled sections so every stage presents its
//! inputs, retrieved reference material, and the expected JSON shape the
//! same way.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use pipeline::{Contract, Finding, Snippet, TechSpec, VerificationOutcome};

/// Characters of command output quoted per verification step.
const VERIFICATION_OUTPUT_LIMIT: usize = 1_500;

/// Builds a task prompt: instruction, titled sections, then the response
/// shape required by contract `T`.
pub(crate) fn task<T: Contract>(instruction: &str, sections: &[(&str, String)]) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "{instruction}\n");
    for (title, body) in sections {
        let _ = writeln!(prompt, "## {title}\n{body}\n");
    }
    let _ = write!(
        prompt,
        "Respond with only a JSON object matching the {} contract:\n{}",
        T::NAME,
        T::shape_hint()
    );
    prompt
}

pub(crate) fn snippets(snippets: &[Snippet]) -> String {
    if snippets.is_empty() {
        return "(no reference material found)".to_string();
    }
    let mut out = String::new();
    for snippet in snippets {
        let _ = writeln!(
            out,
            "### {} (relevance {:.2})\n{}\n",
            snippet.id,
            snippet.relevance_score,
            snippet.content.trim()
        );
    }
    out
}

pub(crate) fn spec(spec: &TechSpec) -> String {
    let mut out = format!("Title: {}\nBrief: {}\n\nAcceptance criteria:\n", spec.title, spec.brief);
    for (i, criterion) in spec.acceptance_criteria.iter().enumerate() {
        let _ = writeln!(out, "{}. {criterion}", i + 1);
    }
    if !spec.affected_paths.is_empty() {
        let paths: Vec<&str> = spec.affected_paths.iter().map(String::as_str).collect();
        let _ = writeln!(out, "\nAffected paths: {}", paths.join(", "));
    }
    if !spec.referenced_adrs.is_empty() {
        let adrs: Vec<&str> = spec.referenced_adrs.iter().map(String::as_str).collect();
        let _ = writeln!(out, "Referenced ADRs: {}", adrs.join(", "));
    }
    if let Some(notes) = &spec.notes {
        let _ = writeln!(out, "\nNotes: {notes}");
    }
    out
}

pub(crate) fn files(files: &BTreeMap<String, String>) -> String {
    if files.is_empty() {
        return "(no files)".to_string();
    }
    let mut out = String::new();
    for (path, content) in files {
        let _ = writeln!(out, "### {path}\n```\n{content}\n```\n");
    }
    out
}

pub(crate) fn findings(findings: &[Finding]) -> String {
    if findings.is_empty() {
        return "(no findings)".to_string();
    }
    let mut out = String::new();
    for finding in findings {
        let _ = write!(out, "- {finding}");
        if let Some(suggestion) = &finding.suggestion {
            let _ = write!(out, " (suggestion: {suggestion})");
        }
        out.push('\n');
    }
    out
}

pub(crate) fn verification(outcomes: &[VerificationOutcome]) -> String {
    if outcomes.is_empty() {
        return "(verification steps were not run)".to_string();
    }
    let mut out = String::new();
    for outcome in outcomes {
        let status = if outcome.success { "passed" } else { "FAILED" };
        let code = outcome
            .exit_code
            .map_or_else(|| "none".to_string(), |c| c.to_string());
        let _ = writeln!(out, "- `{}`: {status} (exit code {code})", outcome.command);
        if !outcome.success {
            let output: String = outcome.output.chars().take(VERIFICATION_OUTPUT_LIMIT).collect();
            let _ = writeln!(out, "```\n{}\n```", output.trim_end());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{SnippetId, SpecPayload};

    #[test]
    fn task_ends_with_contract_shape() {
        let prompt = task::<SpecPayload>("Plan it.", &[("Brief", "Add a hello endpoint".into())]);
        assert!(prompt.starts_with("Plan it."));
        assert!(prompt.contains("## Brief\nAdd a hello endpoint"));
        assert!(prompt.ends_with(SpecPayload::shape_hint()));
    }

    #[test]
    fn snippets_render_id_and_score() {
        let rendered = snippets(&[Snippet {
            id: SnippetId::new("adr-7").unwrap(),
            content: " Use axum for HTTP. ".into(),
            relevance_score: 0.876,
        }]);
        assert!(rendered.contains("### adr-7 (relevance 0.88)\nUse axum for HTTP."));
    }

    #[test]
    fn failed_verification_quotes_output() {
        let rendered = verification(&[VerificationOutcome {
            command: "cargo test".into(),
            success: false,
            output: "test hello ... FAILED\n".into(),
            exit_code: Some(101),
        }]);
        assert!(rendered.contains("`cargo test`: FAILED (exit code 101)"));
        assert!(rendered.contains("test hello ... FAILED"));
    }
}
