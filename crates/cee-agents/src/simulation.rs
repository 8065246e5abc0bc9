//! Monte Carlo revenue simulation.
//!
//! Each trial draws `price`, `users`, and `conv` independently and uniformly
//! from their configured ranges and records `price * users * conv`.

use async_trait::async_trait;
use cee_runtime::{AgentError, AgentHandler, JobContext};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use crate::params::{object_or_empty, optional_u64};

/// Trials when the payload does not say.
pub const DEFAULT_TRIALS: u64 = 200;
/// Upper bound on trials per job.
pub const MAX_TRIALS: u64 = 100_000;

const VARIABLES: [&str; 3] = ["price", "users", "conv"];
const CANCEL_CHECK_INTERVAL: u64 = 4_096;

/// Closed interval a variable is drawn from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Range {
    /// Lower bound.
    pub low: f64,
    /// Upper bound.
    pub high: f64,
}

impl Range {
    fn fixed(value: f64) -> Self {
        Self {
            low: value,
            high: value,
        }
    }

    /// Accepts a number, `[low, high]`, or `{"min": .., "max": ..}`.
    fn parse(name: &str, value: &Value) -> Result<Self, AgentError> {
        let invalid = || {
            AgentError::InvalidInput(format!(
                "`inputs.{name}` must be a number, [low, high], or {{\"min\", \"max\"}}"
            ))
        };
        let range = match value {
            Value::Number(n) => Self::fixed(n.as_f64().ok_or_else(invalid)?),
            Value::Array(pair) if pair.len() == 2 => Self {
                low: pair[0].as_f64().ok_or_else(invalid)?,
                high: pair[1].as_f64().ok_or_else(invalid)?,
            },
            Value::Object(bounds) => Self {
                low: bounds.get("min").and_then(Value::as_f64).ok_or_else(invalid)?,
                high: bounds.get("max").and_then(Value::as_f64).ok_or_else(invalid)?,
            },
            _ => return Err(invalid()),
        };
        if range.low > range.high {
            return Err(AgentError::InvalidInput(format!(
                "`inputs.{name}`: low {} exceeds high {}",
                range.low, range.high
            )));
        }
        Ok(range)
    }

    fn sample(self, rng: &mut StdRng) -> f64 {
        if self.low == self.high {
            self.low
        } else {
            rng.random_range(self.low..=self.high)
        }
    }
}

/// Summary statistics over all trials.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Summary {
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    /// Smallest outcome.
    pub min: f64,
    /// Largest outcome.
    pub max: f64,
    /// 5th percentile.
    pub p5: f64,
    /// Median.
    pub p50: f64,
    /// 95th percentile.
    pub p95: f64,
}

/// Nearest-rank percentile over sorted samples.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((pct / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// Summarize outcomes. Sorts `samples` in place.
pub fn summarize(samples: &mut [f64]) -> Summary {
    if samples.is_empty() {
        return Summary {
            mean: 0.0,
            std_dev: 0.0,
            min: 0.0,
            max: 0.0,
            p5: 0.0,
            p50: 0.0,
            p95: 0.0,
        };
    }
    samples.sort_by(f64::total_cmp);
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    Summary {
        mean,
        std_dev: variance.sqrt(),
        min: samples[0],
        max: samples[samples.len() - 1],
        p5: percentile(samples, 5.0),
        p50: percentile(samples, 50.0),
        p95: percentile(samples, 95.0),
    }
}

/// Runs `price * users * conv` trials.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimulationEngine;

impl SimulationEngine {
    /// Create the engine.
    pub fn new() -> Self {
        Self
    }

    fn ranges(inputs: &Map<String, Value>) -> Result<(Vec<(&'static str, Range)>, Vec<&'static str>), AgentError> {
        let mut ranges = Vec::with_capacity(VARIABLES.len());
        let mut missing = Vec::new();
        for name in VARIABLES {
            match inputs.get(name) {
                None | Some(Value::Null) => {
                    missing.push(name);
                    ranges.push((name, Range::fixed(0.0)));
                }
                Some(v) => ranges.push((name, Range::parse(name, v)?)),
            }
        }
        Ok((ranges, missing))
    }
}

#[async_trait]
impl AgentHandler for SimulationEngine {
    #[instrument(skip_all, fields(job_id = %ctx.job_id))]
    async fn execute(&self, payload: Value, ctx: JobContext) -> Result<Value, AgentError> {
        let inputs = object_or_empty(&payload, "inputs")?;
        let trials = optional_u64(&payload, "trials")?.unwrap_or(DEFAULT_TRIALS);
        if trials == 0 || trials > MAX_TRIALS {
            return Err(AgentError::InvalidInput(format!(
                "`trials` must be between 1 and {MAX_TRIALS}"
            )));
        }
        let seed = optional_u64(&payload, "seed")?;
        let (ranges, missing) = Self::ranges(&inputs)?;

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut samples = Vec::with_capacity(trials as usize);
        for trial in 0..trials {
            if trial % CANCEL_CHECK_INTERVAL == 0 && ctx.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            let outcome = ranges
                .iter()
                .map(|(_, range)| range.sample(&mut rng))
                .product::<f64>();
            samples.push(outcome);
        }
        let summary = summarize(&mut samples);
        debug!(trials, mean = summary.mean, "simulation finished");

        Ok(json!({
            "model": "price * users * conv",
            "trials": trials,
            "seed": seed,
            "inputs": ranges.iter().map(|(name, r)| (name.to_string(), json!(r))).collect::<Map<_, _>>(),
            "missing": missing,
            "summary": summary,
        }))
    }
}
