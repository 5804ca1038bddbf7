//! Default observability sink.

use pipeline::{ObservabilitySink, Stage};
use tracing::info;

/// Forwards progress markers to `tracing` under the `flywheel::progress`
/// target, where the subscriber configured by the binary picks them up.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn emit(&self, stage: Stage, event: &str, attributes: &[(&str, String)]) {
        let rendered = attributes
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" ");
        info!(
            target: "flywheel::progress",
            stage = %stage,
            event,
            attributes = %rendered,
            "Pipeline progress"
        );
    }
}
