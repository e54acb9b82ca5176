use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;

/// A single reading taken by a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Mem { key: &'static str, addr: u16 },
    Table { key: &'static str, addr: u16, len: u16 },
    Pc,
}

impl Probe {
    pub const fn mem(key: &'static str, addr: u16) -> Self {
        Probe::Mem { key, addr }
    }

    pub const fn table(key: &'static str, addr: u16, len: u16) -> Self {
        Probe::Table { key, addr, len }
    }

    /// Observation keys this probe produces, paired with the address read.
    /// `None` addresses read the program counter.
    pub fn keys(&self) -> Vec<(String, Option<u16>)> {
        match *self {
            Probe::Mem { key, addr } => vec![(key.to_string(), Some(addr))],
            Probe::Table { key, addr, len } => (0..len)
                .map(|i| (table_key(key, i), Some(addr.wrapping_add(i))))
                .collect(),
            Probe::Pc => vec![("pc".to_string(), None)],
        }
    }
}

pub fn table_key(key: &str, index: u16) -> String {
    format!("{key}[{index}]")
}

/// Values captured at one point of a script. Keys whose reading was
/// undefined in the page are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<String, Option<u32>>);

impl Snapshot {
    pub fn get(&self, key: &str) -> Option<u32> {
        self.0.get(key).copied().flatten()
    }

    pub fn table(&self, key: &str, len: u16) -> Vec<Option<u32>> {
        (0..len).map(|i| self.get(&table_key(key, i))).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<u32>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, u32)> for Snapshot {
    fn from_iter<T: IntoIterator<Item = (K, u32)>>(iter: T) -> Self {
        Snapshot(iter.into_iter().map(|(k, v)| (k.into(), Some(v))).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameFault {
    pub frame: u32,
    pub message: String,
}

/// Result of stepping frames one at a time with per-frame fault capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub requested: u32,
    pub completed: u32,
    #[serde(default)]
    pub fault: Option<FrameFault>,
}

impl RunOutcome {
    pub fn clean(frames: u32) -> Self {
        Self {
            requested: frames,
            completed: frames,
            fault: None,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.fault.is_none() && self.completed == self.requested
    }
}

/// A fault that escaped every step guard and aborted the rest of the script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptFault {
    pub step: String,
    /// Frames completed before the fault, which is the index of the frame
    /// that threw when the fault came from stepping.
    #[serde(default)]
    pub frame: Option<u32>,
    pub message: String,
}

/// Everything an interaction script reports back from the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationSet {
    #[serde(default)]
    pub loaded: bool,
    #[serde(default)]
    pub load_fault: Option<String>,
    #[serde(default)]
    pub fault: Option<ScriptFault>,
    #[serde(default)]
    pub frames: u64,
    #[serde(default)]
    pub snapshots: BTreeMap<String, Snapshot>,
    #[serde(default)]
    pub runs: BTreeMap<String, RunOutcome>,
}

impl ObservationSet {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn snapshot(&self, label: &str) -> Option<&Snapshot> {
        self.snapshots.get(label)
    }

    /// Reads `key` from the snapshot labelled `label`.
    pub fn value(&self, label: &str, key: &str) -> Option<u32> {
        self.snapshot(label).and_then(|s| s.get(key))
    }

    pub fn run(&self, label: &str) -> Option<&RunOutcome> {
        self.runs.get(label)
    }
}
