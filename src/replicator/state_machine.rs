use crate::error::{GaggleError, Result};
use crate::types::RoleView;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Ready,
}

/// The replicated value. This is exactly what goes into a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RoleState {
    pub state: String,
}

/// Point-in-time capture of [`RoleState`], already encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSnapshot {
    data: Vec<u8>,
}

impl RoleSnapshot {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn decode(&self) -> Result<RoleState> {
        serde_json::from_slice(&self.data).map_err(|e| GaggleError::Decode(e.to_string()))
    }
}

/// Replicated role label plus the locally observed display label.
///
/// Only committed entries and snapshot restores touch `value`. The display
/// label is written by the role endpoint and never leaves this node.
#[derive(Debug)]
pub struct RoleMachine {
    value: RoleState,
    display: String,
    phase: Phase,
}

impl RoleMachine {
    pub fn new() -> Self {
        Self {
            value: RoleState::default(),
            display: String::new(),
            phase: Phase::Uninitialized,
        }
    }

    /// Last write wins: the entry payload replaces the whole label.
    pub fn apply(&mut self, entry: &[u8]) {
        self.value.state = String::from_utf8_lossy(entry).into_owned();
        self.phase = Phase::Ready;
    }

    pub fn snapshot(&self) -> Result<RoleSnapshot> {
        let data =
            serde_json::to_vec(&self.value).map_err(|e| GaggleError::Encode(e.to_string()))?;
        Ok(RoleSnapshot { data })
    }

    /// On failure the current state is left untouched.
    pub fn restore(&mut self, data: &[u8]) -> Result<()> {
        let value: RoleState =
            serde_json::from_slice(data).map_err(|e| GaggleError::Decode(e.to_string()))?;
        self.value = value;
        self.phase = Phase::Ready;
        Ok(())
    }

    /// Records `label` as the local display value and encodes the response body.
    pub fn render(&mut self, label: &str) -> Result<String> {
        self.display = label.to_string();
        serde_json::to_string(&RoleView {
            state: self.display.clone(),
        })
        .map_err(|e| GaggleError::Encode(e.to_string()))
    }

    pub fn role_label(&self) -> &str {
        &self.value.state
    }

    pub fn display_label(&self) -> &str {
        &self.display
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }
}

impl Default for RoleMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe handle to the [`RoleMachine`].
///
/// Every read and write goes through one mutex and no guard is held across
/// an await point.
#[derive(Clone)]
pub struct SharedState {
    inner: Arc<Mutex<RoleMachine>>,
    outstanding: Arc<Mutex<usize>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RoleMachine::new())),
            outstanding: Arc::new(Mutex::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RoleMachine> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn apply(&self, entry: &[u8]) {
        self.lock().apply(entry);
    }

    pub fn snapshot(&self) -> Result<RoleSnapshot> {
        let snapshot = self.lock().snapshot()?;
        *self
            .outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(snapshot)
    }

    pub fn restore(&self, data: &[u8]) -> Result<()> {
        self.lock().restore(data)
    }

    pub fn release(&self, snapshot: RoleSnapshot) {
        let mut outstanding = self
            .outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *outstanding = outstanding.saturating_sub(1);
        debug!("Released snapshot of {} bytes", snapshot.data.len());
    }

    pub fn outstanding_snapshots(&self) -> usize {
        *self
            .outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn render(&self, label: &str) -> Result<String> {
        self.lock().render(label)
    }

    /// `None` until the first entry is applied or a snapshot restored.
    pub fn replicated_label(&self) -> Option<String> {
        let machine = self.lock();
        match machine.phase() {
            Phase::Uninitialized => None,
            Phase::Ready => Some(machine.role_label().to_string()),
        }
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase()
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
