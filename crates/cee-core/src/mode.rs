//! Processing modes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of processing modes a request can be routed to.
///
/// `Unknown` is a real member of the set, not an error: it is what the
/// classifier returns when nothing matches confidently, and it never has a
/// registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Market sizing, go-to-market and business strategy questions.
    StrategicMarket,
    /// Evaluation of an output against evidence.
    ResearchEvaluate,
    /// Monte Carlo style scenario simulation.
    SimulationRun,
    /// Policy and compliance checks.
    GovernanceCheck,
    /// No confident match.
    Unknown,
}

impl Mode {
    /// Every mode that can have an agent (excludes `Unknown`).
    pub const ROUTABLE: [Mode; 4] = [
        Mode::StrategicMarket,
        Mode::ResearchEvaluate,
        Mode::SimulationRun,
        Mode::GovernanceCheck,
    ];

    /// Wire name (`snake_case`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StrategicMarket => "strategic_market",
            Self::ResearchEvaluate => "research_evaluate",
            Self::SimulationRun => "simulation_run",
            Self::GovernanceCheck => "governance_check",
            Self::Unknown => "unknown",
        }
    }

    /// Lenient parse: any name outside the set maps to `Unknown`.
    ///
    /// Accepts `snake_case`, `kebab-case` and any letter case.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        Self::ROUTABLE
            .into_iter()
            .find(|m| m.as_str() == normalized)
            .unwrap_or(Self::Unknown)
    }

    /// Whether this mode can ever have an agent.
    #[must_use]
    pub fn is_routable(self) -> bool {
        self != Self::Unknown
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
