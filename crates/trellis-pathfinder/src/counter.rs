//! Per-stage filter counters

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use serde::Serialize;

/// How many candidates entered and survived one stage, and the time spent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Counter {
    pub name: String,
    #[serde(rename = "in")]
    pub input: usize,
    #[serde(rename = "out")]
    pub output: usize,
    pub elapsed: Duration,
}

impl Counter {
    pub fn new(name: &str) -> Self {
        Counter {
            name: name.to_string(),
            input: 0,
            output: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Run one stage check and record the outcome.
    pub fn exec(&mut self, check: impl FnOnce() -> bool) -> bool {
        let start = Instant::now();
        self.input += 1;
        let passed = check();
        if passed {
            self.output += 1;
        }
        self.elapsed += start.elapsed();
        passed
    }

    pub fn filtered(&self) -> usize {
        self.input - self.output
    }
}

/// Fixed-width table of counters, one row per stage.
pub fn render_counters(counters: &[Counter]) -> String {
    let width = counters
        .iter()
        .map(|c| c.name.len())
        .max()
        .unwrap_or(0)
        .max("stage".len());
    let mut out = format!("{:<width$} | {:>10} | {:>10} | {:>10}", "stage", "in", "out", "ms");
    for c in counters {
        let _ = write!(
            out,
            "\n{:<width$} | {:>10} | {:>10} | {:>10.3}",
            c.name,
            c.input,
            c.output,
            c.elapsed.as_secs_f64() * 1000.0
        );
    }
    out
}
