//! Run reports
//!
//! Per-node realization state, kept so a caller can reconcile on retry
//! after a partial or cancelled run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Realization state of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum NodeState {
    /// Not attempted (yet)
    Pending,
    /// Remote resource exists and outputs are resolved
    Realized,
    /// The provider or input resolution failed
    #[serde(rename_all = "camelCase")]
    Failed { reason: String },
    /// Not attempted because a dependency failed
    #[serde(rename_all = "camelCase")]
    SkippedDueToDependencyFailure { failed_dependency: String },
}

impl NodeState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::SkippedDueToDependencyFailure { .. })
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Pending => "◯",
            Self::Realized => "✓",
            Self::Failed { .. } => "✗",
            Self::SkippedDueToDependencyFailure { .. } => "⊘",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Realized => "realized",
            Self::Failed { .. } => "failed",
            Self::SkippedDueToDependencyFailure { .. } => "skipped",
        }
    }
}

/// Outcome for one node
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeReport {
    pub name: String,
    pub kind: String,
    #[serde(flatten)]
    pub state: NodeState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl NodeReport {
    pub(crate) fn set_duration(&mut self, d: Duration) {
        self.duration_ms = Some(d.as_millis() as u64);
    }

    /// Format duration for display
    pub fn duration_display(&self) -> String {
        match self.duration_ms {
            None => "-".to_string(),
            Some(ms) if ms < 1000 => format!("{}ms", ms),
            Some(ms) if ms < 60_000 => format!("{}s", ms / 1000),
            Some(ms) => format!("{}m{}s", ms / 60_000, (ms / 1000) % 60),
        }
    }

    /// One line for the terminal summary
    pub fn summary_line(&self) -> String {
        let base = format!(
            "{} {:<20} {:<20} {}",
            self.state.icon(),
            self.name,
            self.kind,
            self.state.label()
        );
        match &self.state {
            NodeState::Realized => format!("{} ({})", base, self.duration_display()),
            NodeState::Failed { reason } => format!("{} - {}", base, reason),
            NodeState::SkippedDueToDependencyFailure { failed_dependency } => {
                format!("{} - {} failed", base, failed_dependency)
            }
            NodeState::Pending => base,
        }
    }
}

/// Aggregated result of one realization run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    /// Nodes in declaration order
    pub nodes: Vec<NodeReport>,
    /// Names of realized nodes, in the order they completed
    pub realization_order: Vec<String>,
    /// Exports whose value is known
    pub exports: BTreeMap<String, Value>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn node(&self, name: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn state(&self, name: &str) -> Option<&NodeState> {
        self.node(name).map(|n| &n.state)
    }

    pub fn failures(&self) -> Vec<&NodeReport> {
        self.nodes.iter().filter(|n| n.state.is_failure()).collect()
    }

    pub fn count(&self, label: &str) -> usize {
        self.nodes.iter().filter(|n| n.state.label() == label).count()
    }

    /// Every node realized and nothing left pending
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.nodes.iter().all(|n| n.state == NodeState::Realized)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} realized, {} failed, {} skipped, {} pending{}",
            self.count("realized"),
            self.count("failed"),
            self.count("skipped"),
            self.count("pending"),
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}
