//! Intent classification.
//!
//! [`KeywordClassifier`] scores every routable mode by weighted keyword hits
//! and only commits to a mode that clears `min_score` and strictly beats the
//! runner-up. Anything else is [`Mode::Unknown`].

use std::collections::HashMap;

use cee_core::Mode;
use cee_core::text::truncate_str;
use cee_settings::ClassifierSettings;

/// Maps request text to a processing mode. Must never panic.
pub trait IntentClassifier: Send + Sync {
    /// Classify `text`. Deterministic for the same input and classifier state.
    fn classify(&self, text: &str) -> Mode;
}

const STRONG: u32 = 2;
const WEAK: u32 = 1;

const DEFAULT_KEYWORDS: &[(Mode, &[&str], u32)] = &[
    (
        Mode::StrategicMarket,
        &[
            "market", "markets", "startup", "startups", "launch", "fintech", "competitor",
            "competitors", "gtm", "smb", "smbs", "expansion", "enter", "entry",
        ],
        STRONG,
    ),
    (
        Mode::StrategicMarket,
        &[
            "strategy", "strategic", "targeting", "target", "segment", "customers",
            "opportunity", "industry", "business", "product",
        ],
        WEAK,
    ),
    (
        Mode::ResearchEvaluate,
        &[
            "evaluate", "evaluation", "assess", "assessment", "research", "evidence",
            "validate", "verify", "fact", "hallucination",
        ],
        STRONG,
    ),
    (
        Mode::ResearchEvaluate,
        &[
            "review", "study", "paper", "accuracy", "quality", "claims", "benchmark",
            "sources", "output",
        ],
        WEAK,
    ),
    (
        Mode::SimulationRun,
        &[
            "simulate", "simulation", "simulations", "monte", "carlo", "forecast",
            "scenario", "scenarios", "trials",
        ],
        STRONG,
    ),
    (
        Mode::SimulationRun,
        &["projection", "projections", "revenue", "sensitivity", "model", "estimate"],
        WEAK,
    ),
    (
        Mode::GovernanceCheck,
        &[
            "governance", "compliance", "compliant", "regulation", "regulatory", "gdpr",
            "policy", "policies", "privacy", "pii",
        ],
        STRONG,
    ),
    (
        Mode::GovernanceCheck,
        &["audit", "risk", "legal", "ethics", "approval", "controls"],
        WEAK,
    ),
];

/// Weighted keyword classifier.
#[derive(Clone, Debug)]
pub struct KeywordClassifier {
    keywords: HashMap<String, Vec<(Mode, u32)>>,
    min_score: u32,
    max_scan_bytes: usize,
}

impl KeywordClassifier {
    /// Build with the default vocabulary.
    pub fn new(settings: &ClassifierSettings) -> Self {
        let mut classifier = Self {
            keywords: HashMap::new(),
            min_score: settings.min_score.max(1),
            max_scan_bytes: settings.max_scan_bytes,
        };
        for (mode, words, weight) in DEFAULT_KEYWORDS {
            for word in *words {
                classifier.add_keyword(*mode, word, *weight);
            }
        }
        classifier
    }

    /// Add (or reinforce) a keyword for a routable mode. `unknown` is ignored.
    pub fn add_keyword(&mut self, mode: Mode, word: &str, weight: u32) {
        if !mode.is_routable() || weight == 0 {
            return;
        }
        let entry = self.keywords.entry(word.to_lowercase()).or_default();
        match entry.iter_mut().find(|(m, _)| *m == mode) {
            Some((_, w)) => *w = w.saturating_add(weight),
            None => entry.push((mode, weight)),
        }
    }

    /// Score every routable mode for `text`, in `Mode::ROUTABLE` order.
    pub fn scores(&self, text: &str) -> [(Mode, u32); 4] {
        let mut scores = Mode::ROUTABLE.map(|m| (m, 0u32));
        let scanned = truncate_str(text, self.max_scan_bytes);
        for token in scanned
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            if let Some(hits) = self.keywords.get(&token) {
                for (mode, weight) in hits {
                    if let Some(slot) = scores.iter_mut().find(|(m, _)| m == mode) {
                        slot.1 = slot.1.saturating_add(*weight);
                    }
                }
            }
        }
        scores
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(&ClassifierSettings::default())
    }
}

impl IntentClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Mode {
        let mut scores = self.scores(text);
        scores.sort_by(|a, b| b.1.cmp(&a.1));
        let (best, best_score) = scores[0];
        let runner_up = scores[1].1;
        if best_score >= self.min_score && best_score > runner_up {
            best
        } else {
            Mode::Unknown
        }
    }
}
