use serde::{Deserialize, Serialize};

use crate::observe::RunOutcome;
use crate::Error;

/// Accepted drift, in frames, between an expected and an observed frame
/// counter delta. The counter may tick once before or after an input
/// window depending on where the page's ready fence landed.
pub const COUNTER_TOLERANCE: u32 = 1;

/// Address window the program counter must lie in while game code runs.
pub const ROM_WINDOW: (u32, u32) = (0xC000, 0xFFFF);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionRecord {
    pub name: String,
    pub passed: bool,
    pub details: String,
}

impl AssertionRecord {
    pub fn new<N: Into<String>, D: Into<String>>(name: N, passed: bool, details: D) -> Self {
        Self {
            name: name.into(),
            passed,
            details: details.into(),
        }
    }

    pub fn fatal(error: &Error) -> Self {
        Self::new("Fatal error", false, error.to_string())
    }
}

pub fn exact(observed: u32, expected: u32) -> bool {
    observed == expected
}

pub fn in_range(observed: u32, low: u32, high: u32) -> bool {
    low <= observed && observed <= high
}

pub fn increased(before: u32, after: u32) -> bool {
    after > before
}

pub fn decreased(before: u32, after: u32) -> bool {
    after < before
}

/// Forward distance from `before` to `after` on a counter that wraps at
/// `modulus`.
pub fn wrapping_delta(before: u32, after: u32, modulus: u32) -> u32 {
    let before = before % modulus;
    let after = after % modulus;
    (after + modulus - before) % modulus
}

/// True when `delta` is within [`COUNTER_TOLERANCE`] of `expected`, measured
/// around the counter's modulus.
pub fn tolerant_delta(delta: u32, expected: u32, modulus: u32) -> bool {
    let distance = wrapping_delta(expected, delta, modulus);
    distance <= COUNTER_TOLERANCE || modulus - distance <= COUNTER_TOLERANCE
}

fn hex(v: u32) -> String {
    if v > 0xff {
        format!("${v:04X}")
    } else {
        format!("${v:02X}")
    }
}

fn reading(v: Option<u32>) -> String {
    v.map(|v| format!("{} ({v})", hex(v)))
        .unwrap_or_else(|| "undefined".into())
}

/// Ordered collection of assertion records for one session.
#[derive(Debug, Clone, Default)]
pub struct Assertions {
    records: Vec<AssertionRecord>,
}

impl Assertions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[AssertionRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<AssertionRecord> {
        self.records
    }

    pub fn check<N: Into<String>, D: Into<String>>(
        &mut self,
        name: N,
        passed: bool,
        details: D,
    ) -> bool {
        self.records
            .push(AssertionRecord::new(name, passed, details));
        passed
    }

    fn missing(&mut self, name: &str, what: &str) -> bool {
        self.check(name, false, format!("{what} not captured"))
    }

    pub fn present(&mut self, name: &str, values: &[(&str, Option<u32>)]) -> bool {
        let passed = values.iter().all(|(_, v)| v.is_some());
        let details = values
            .iter()
            .map(|(k, v)| format!("{k}={}", reading(*v)))
            .collect::<Vec<_>>()
            .join(", ");
        self.check(name, passed, details)
    }

    pub fn exact(&mut self, name: &str, key: &str, observed: Option<u32>, expected: u32) -> bool {
        let Some(observed) = observed else {
            return self.missing(name, key);
        };
        let passed = exact(observed, expected);
        self.check(
            name,
            passed,
            format!("{key}: {} (expected {})", reading(Some(observed)), hex(expected)),
        )
    }

    pub fn nonzero(&mut self, name: &str, key: &str, observed: Option<u32>) -> bool {
        let Some(observed) = observed else {
            return self.missing(name, key);
        };
        self.check(
            name,
            observed != 0,
            format!("{key}: {}", reading(Some(observed))),
        )
    }

    pub fn in_range(
        &mut self,
        name: &str,
        key: &str,
        observed: Option<u32>,
        (low, high): (u32, u32),
    ) -> bool {
        let Some(observed) = observed else {
            return self.missing(name, key);
        };
        let passed = in_range(observed, low, high);
        let verdict = if passed { "in" } else { "out of" };
        self.check(
            name,
            passed,
            format!(
                "{key} {} {verdict} range {}..={}",
                hex(observed),
                hex(low),
                hex(high)
            ),
        )
    }

    pub fn increased(
        &mut self,
        name: &str,
        key: &str,
        before: Option<u32>,
        after: Option<u32>,
    ) -> bool {
        let (Some(before), Some(after)) = (before, after) else {
            return self.missing(name, key);
        };
        let delta = after as i64 - before as i64;
        self.check(
            name,
            increased(before, after),
            format!("{key} changed from {before} to {after} (delta: {delta:+})"),
        )
    }

    pub fn decreased(
        &mut self,
        name: &str,
        key: &str,
        before: Option<u32>,
        after: Option<u32>,
    ) -> bool {
        let (Some(before), Some(after)) = (before, after) else {
            return self.missing(name, key);
        };
        let delta = after as i64 - before as i64;
        self.check(
            name,
            decreased(before, after),
            format!("{key} changed from {before} to {after} (delta: {delta:+})"),
        )
    }

    pub fn counter_delta(
        &mut self,
        name: &str,
        key: &str,
        before: Option<u32>,
        after: Option<u32>,
        expected: u32,
        modulus: u32,
    ) -> bool {
        let (Some(before), Some(after)) = (before, after) else {
            return self.missing(name, key);
        };
        let delta = wrapping_delta(before, after, modulus);
        self.check(
            name,
            tolerant_delta(delta, expected, modulus),
            format!(
                "{key}: {before} -> {after} (delta: +{delta}, expected {expected}±{COUNTER_TOLERANCE})"
            ),
        )
    }

    pub fn changed(
        &mut self,
        name: &str,
        key: &str,
        before: &[Option<u32>],
        after: &[Option<u32>],
    ) -> bool {
        if before.is_empty()
            || before.len() != after.len()
            || before.iter().chain(after).any(Option::is_none)
        {
            return self.missing(name, key);
        }

        let changed: Vec<usize> = before
            .iter()
            .zip(after)
            .enumerate()
            .filter(|(_, (b, a))| b != a)
            .map(|(i, _)| i)
            .collect();

        let details = if changed.is_empty() {
            format!("{key} unchanged")
        } else {
            let idx = changed
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            format!("{key} changed at [{idx}]")
        };
        self.check(name, !changed.is_empty(), details)
    }

    /// Passes when a fault checked run stepped every requested frame.
    pub fn run_clean(&mut self, name: &str, label: &str, run: Option<&RunOutcome>) -> bool {
        let Some(run) = run else {
            return self.missing(name, label);
        };
        let details = match &run.fault {
            Some(fault) => Error::EngineRuntimeFault {
                frame: fault.frame,
                message: fault.message.clone(),
            }
            .to_string(),
            None if run.is_clean() => format!("{} frames OK", run.completed),
            None => format!("{}/{} frames", run.completed, run.requested),
        };
        self.check(name, run.is_clean(), details)
    }

    pub fn all_passed(&self) -> bool {
        !self.records.is_empty() && self.records.iter().all(|r| r.passed)
    }
}
