use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{HistoryError, HistoryResult};

pub const DEFAULT_MAX_SIZE: usize = 100;
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Add,
    Remove,
    Update,
    BulkAdd,
    BulkRemove,
    BulkUpdate,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Update => "update",
            Self::BulkAdd => "bulk_add",
            Self::BulkRemove => "bulk_remove",
            Self::BulkUpdate => "bulk_update",
        }
    }

    pub fn is_add_type(&self) -> bool {
        matches!(self, Self::Add | Self::BulkAdd)
    }
}

/// A reversible operation described as data.
///
/// `payload` is handed to the kind's apply function on execute and redo,
/// `prior_state` to its invert function on undo.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    pub description: String,
    pub payload: Value,
    pub prior_state: Value,
}

impl Action {
    pub fn new(kind: ActionKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            payload: Value::Null,
            prior_state: Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_prior_state(mut self, prior_state: Value) -> Self {
        self.prior_state = prior_state;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub kind: ActionKind,
    pub description: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub prior_state: Value,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn summary(&self) -> HistorySummary {
        HistorySummary {
            kind: self.kind,
            description: self.description.clone(),
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub kind: ActionKind,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Display-only marker; restoring to a savepoint is not supported.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Savepoint {
    pub name: String,
    pub undo_depth: usize,
    pub redo_depth: usize,
    pub last_description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryExport {
    pub applied_entries: Vec<HistoryEntry>,
    pub exported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEvent {
    Executed {
        entry_id: Uuid,
        kind: ActionKind,
    },
    Undone {
        entry_id: Uuid,
        kind: ActionKind,
    },
    Redone {
        entry_id: Uuid,
        kind: ActionKind,
    },
    Truncated {
        entry_id: Uuid,
        kind: ActionKind,
        description: String,
        total_truncated: u64,
    },
}

pub type ApplyFn<T> = fn(&mut T, &Value) -> anyhow::Result<Value>;
pub type InvertFn<T> = fn(&mut T, &Value) -> anyhow::Result<()>;

pub struct ActionHandlers<T> {
    pub apply: ApplyFn<T>,
    pub invert: InvertFn<T>,
}

impl<T> Clone for ActionHandlers<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ActionHandlers<T> {}

pub struct ActionTable<T> {
    handlers: HashMap<ActionKind, ActionHandlers<T>>,
}

impl<T> Default for ActionTable<T> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<T> ActionTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: ActionKind, apply: ApplyFn<T>, invert: InvertFn<T>) -> Self {
        self.handlers.insert(kind, ActionHandlers { apply, invert });
        self
    }

    pub fn get(&self, kind: ActionKind) -> Option<ActionHandlers<T>> {
        self.handlers.get(&kind).copied()
    }

    pub fn contains(&self, kind: ActionKind) -> bool {
        self.handlers.contains_key(&kind)
    }
}

/// Linear undo/redo log over a target of type `T`.
pub struct CommandHistory<T> {
    table: ActionTable<T>,
    applied: VecDeque<HistoryEntry>,
    undone: Vec<HistoryEntry>,
    max_size: usize,
    savepoints: Vec<Savepoint>,
    truncated: u64,
    events: broadcast::Sender<HistoryEvent>,
}

impl<T> CommandHistory<T> {
    pub fn new(table: ActionTable<T>) -> Self {
        Self::with_max_size(table, DEFAULT_MAX_SIZE)
    }

    pub fn with_max_size(table: ActionTable<T>, max_size: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            table,
            applied: VecDeque::new(),
            undone: Vec::new(),
            max_size: max_size.max(1),
            savepoints: Vec::new(),
            truncated: 0,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.events.subscribe()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn truncated_count(&self) -> u64 {
        self.truncated
    }

    pub fn execute(&mut self, target: &mut T, action: Action) -> HistoryResult<Value> {
        let handlers = self.handlers(action.kind)?;
        let result = (handlers.apply)(target, &action.payload).map_err(|cause| {
            HistoryError::Action {
                kind: action.kind,
                cause,
            }
        })?;

        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            kind: action.kind,
            description: action.description,
            payload: action.payload,
            prior_state: action.prior_state,
            timestamp: Utc::now(),
        };

        debug!(
            entry_id = %entry.id,
            kind = entry.kind.as_str(),
            description = %entry.description,
            "Action executed"
        );
        self.publish(HistoryEvent::Executed {
            entry_id: entry.id,
            kind: entry.kind,
        });

        self.applied.push_back(entry);
        self.trim();

        if !self.undone.is_empty() {
            debug!(discarded = self.undone.len(), "Redo history invalidated");
            self.undone.clear();
        }

        Ok(result)
    }

    pub fn undo(&mut self, target: &mut T) -> HistoryResult<bool> {
        let Some(kind) = self.applied.back().map(|entry| entry.kind) else {
            return Ok(false);
        };
        let handlers = self.handlers(kind)?;
        let Some(entry) = self.applied.pop_back() else {
            return Ok(false);
        };

        let outcome = (handlers.invert)(target, &entry.prior_state);
        debug!(entry_id = %entry.id, kind = kind.as_str(), ok = outcome.is_ok(), "Action undone");
        self.publish(HistoryEvent::Undone {
            entry_id: entry.id,
            kind,
        });
        self.undone.push(entry);

        outcome.map_err(|cause| HistoryError::Action { kind, cause })?;
        Ok(true)
    }

    pub fn redo(&mut self, target: &mut T) -> HistoryResult<bool> {
        let Some(kind) = self.undone.last().map(|entry| entry.kind) else {
            return Ok(false);
        };
        let handlers = self.handlers(kind)?;
        let Some(entry) = self.undone.pop() else {
            return Ok(false);
        };

        let outcome = (handlers.apply)(target, &entry.payload);
        debug!(entry_id = %entry.id, kind = kind.as_str(), ok = outcome.is_ok(), "Action redone");
        self.publish(HistoryEvent::Redone {
            entry_id: entry.id,
            kind,
        });
        self.applied.push_back(entry);

        outcome.map_err(|cause| HistoryError::Action { kind, cause })?;
        Ok(true)
    }

    pub fn undo_multiple(&mut self, target: &mut T, count: usize) -> HistoryResult<usize> {
        let mut performed = 0;
        while performed < count && self.undo(target)? {
            performed += 1;
        }
        Ok(performed)
    }

    pub fn redo_multiple(&mut self, target: &mut T, count: usize) -> HistoryResult<usize> {
        let mut performed = 0;
        while performed < count && self.redo(target)? {
            performed += 1;
        }
        Ok(performed)
    }

    pub fn can_undo(&self) -> bool {
        !self.applied.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.undone.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.applied.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.undone.len()
    }

    pub fn get_undo_history(&self, limit: usize) -> Vec<HistorySummary> {
        self.applied
            .iter()
            .rev()
            .take(limit)
            .map(HistoryEntry::summary)
            .collect()
    }

    pub fn get_redo_history(&self, limit: usize) -> Vec<HistorySummary> {
        self.undone
            .iter()
            .rev()
            .take(limit)
            .map(HistoryEntry::summary)
            .collect()
    }

    /// Folds runs of consecutive add-type entries of the same kind into one
    /// entry, concatenating payloads and prior states. Returns entries removed.
    pub fn compress(&mut self) -> usize {
        let before = self.applied.len();
        let entries = std::mem::take(&mut self.applied);
        let mut merged: VecDeque<HistoryEntry> = VecDeque::with_capacity(before);
        let mut run = 0usize;

        for entry in entries {
            if let Some(last) = merged.back_mut() {
                if last.kind == entry.kind && entry.kind.is_add_type() {
                    run += 1;
                    merge_entry(last, entry, run);
                    continue;
                }
            }
            run = 1;
            merged.push_back(entry);
        }

        self.applied = merged;
        let removed = before - self.applied.len();
        if removed > 0 {
            info!(removed, remaining = self.applied.len(), "History compressed");
        }
        removed
    }

    pub fn create_savepoint(&mut self, name: impl Into<String>) -> Savepoint {
        let savepoint = Savepoint {
            name: name.into(),
            undo_depth: self.applied.len(),
            redo_depth: self.undone.len(),
            last_description: self.applied.back().map(|entry| entry.description.clone()),
            created_at: Utc::now(),
        };
        self.savepoints.push(savepoint.clone());
        savepoint
    }

    pub fn savepoints(&self) -> &[Savepoint] {
        &self.savepoints
    }

    pub fn export_history(&self) -> HistoryExport {
        HistoryExport {
            applied_entries: self.applied.iter().cloned().collect(),
            exported_at: Utc::now(),
        }
    }

    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.export_history())
    }

    pub fn import_history(&mut self, export: HistoryExport) -> usize {
        let mut entries: VecDeque<HistoryEntry> = export.applied_entries.into();
        let overflow = entries.len().saturating_sub(self.max_size);
        if overflow > 0 {
            entries.drain(..overflow);
            warn!(
                dropped = overflow,
                max_size = self.max_size,
                "Imported history exceeds max size, oldest entries dropped"
            );
        }

        self.applied = entries;
        self.undone.clear();
        info!(
            entries = self.applied.len(),
            exported_at = %export.exported_at,
            "History imported"
        );
        self.applied.len()
    }

    pub fn import_json(&mut self, raw: &str) -> HistoryResult<usize> {
        let export: HistoryExport = serde_json::from_str(raw).inspect_err(|err| {
            warn!("Rejected history import: {err}");
        })?;
        Ok(self.import_history(export))
    }

    pub fn clear(&mut self) {
        self.applied.clear();
        self.undone.clear();
        self.savepoints.clear();
    }

    pub fn clear_undo(&mut self) {
        self.applied.clear();
    }

    pub fn clear_redo(&mut self) {
        self.undone.clear();
    }

    fn handlers(&self, kind: ActionKind) -> HistoryResult<ActionHandlers<T>> {
        self.table
            .get(kind)
            .ok_or(HistoryError::UnregisteredAction(kind))
    }

    fn trim(&mut self) {
        while self.applied.len() > self.max_size {
            let Some(evicted) = self.applied.pop_front() else {
                break;
            };
            self.truncated += 1;
            warn!(
                entry_id = %evicted.id,
                kind = evicted.kind.as_str(),
                description = %evicted.description,
                max_size = self.max_size,
                "History full, oldest entry can no longer be undone"
            );
            self.publish(HistoryEvent::Truncated {
                entry_id: evicted.id,
                kind: evicted.kind,
                description: evicted.description,
                total_truncated: self.truncated,
            });
        }
    }

    fn publish(&self, event: HistoryEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

fn merge_entry(into: &mut HistoryEntry, next: HistoryEntry, run: usize) {
    into.payload = concat_values(std::mem::take(&mut into.payload), next.payload);
    into.prior_state = concat_values(std::mem::take(&mut into.prior_state), next.prior_state);
    into.timestamp = next.timestamp;
    into.description = format!("{} ({run} merged)", next.description);
}

pub fn concat_values(left: Value, right: Value) -> Value {
    let mut items = into_items(left);
    items.extend(into_items(right));
    Value::Array(items)
}

fn into_items(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Context};
    use proptest::prelude::*;
    use serde_json::json;

    #[derive(Debug, Default)]
    struct Ledger {
        items: Vec<String>,
        undo_calls: Vec<Value>,
    }

    fn strings(value: &Value) -> anyhow::Result<Vec<String>> {
        match value {
            Value::String(item) => Ok(vec![item.clone()]),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string).context("expected string"))
                .collect(),
            other => bail!("unexpected payload {other}"),
        }
    }

    fn add_items(ledger: &mut Ledger, payload: &Value) -> anyhow::Result<Value> {
        ledger.items.extend(strings(payload)?);
        Ok(json!(ledger.items.len()))
    }

    fn remove_items(ledger: &mut Ledger, prior: &Value) -> anyhow::Result<()> {
        ledger.undo_calls.push(prior.clone());
        for item in strings(prior)? {
            if let Some(pos) = ledger.items.iter().rposition(|i| *i == item) {
                ledger.items.remove(pos);
            }
        }
        Ok(())
    }

    fn reject_apply(_: &mut Ledger, _: &Value) -> anyhow::Result<Value> {
        bail!("apply rejected")
    }

    fn reject_invert(_: &mut Ledger, _: &Value) -> anyhow::Result<()> {
        bail!("invert rejected")
    }

    fn table() -> ActionTable<Ledger> {
        ActionTable::new()
            .register(ActionKind::Add, add_items, remove_items)
            .register(ActionKind::BulkAdd, add_items, remove_items)
            .register(ActionKind::Update, add_items, reject_invert)
            .register(ActionKind::BulkRemove, reject_apply, remove_items)
    }

    fn add(item: &str) -> Action {
        Action::new(ActionKind::Add, format!("add {item}"))
            .with_payload(json!(item))
            .with_prior_state(json!(item))
    }

    #[test]
    fn execute_then_undo_invokes_inverse_once() {
        let mut ledger = Ledger::default();
        let mut history = CommandHistory::new(table());

        let result = history.execute(&mut ledger, add("r1")).expect("execute");
        assert_eq!(result, json!(1));
        assert!(history.undo(&mut ledger).expect("undo"));

        assert!(!history.can_undo());
        assert!(history.can_redo());
        assert_eq!(ledger.undo_calls, vec![json!("r1")]);
        assert!(ledger.items.is_empty());
    }

    #[test]
    fn overflow_evicts_oldest_and_notifies() {
        let mut ledger = Ledger::default();
        let mut history = CommandHistory::with_max_size(table(), 2);
        let mut events = history.subscribe();

        for item in ["one", "two", "three"] {
            history.execute(&mut ledger, add(item)).expect("execute");
        }

        let descriptions: Vec<_> = history
            .get_undo_history(10)
            .into_iter()
            .map(|s| s.description)
            .collect();
        assert_eq!(descriptions, vec!["add three", "add two"]);
        assert_eq!(history.truncated_count(), 1);

        let mut truncated = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let HistoryEvent::Truncated {
                description,
                total_truncated,
                ..
            } = event
            {
                truncated.push((description, total_truncated));
            }
        }
        assert_eq!(truncated, vec![("add one".to_string(), 1)]);
    }

    #[test]
    fn new_action_discards_redo() {
        let mut ledger = Ledger::default();
        let mut history = CommandHistory::new(table());
        history.execute(&mut ledger, add("a")).expect("execute");
        history.execute(&mut ledger, add("b")).expect("execute");
        history.undo(&mut ledger).expect("undo");
        assert!(history.can_redo());

        history.execute(&mut ledger, add("c")).expect("execute");
        assert!(!history.can_redo());
        assert_eq!(ledger.items, vec!["a", "c"]);
    }

    #[test]
    fn redo_reapplies_forward_payload() {
        let mut ledger = Ledger::default();
        let mut history = CommandHistory::new(table());
        history.execute(&mut ledger, add("a")).expect("execute");
        history.undo(&mut ledger).expect("undo");

        assert!(history.redo(&mut ledger).expect("redo"));
        assert_eq!(ledger.items, vec!["a"]);
        assert!(history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn empty_stacks_report_unavailable() {
        let mut ledger = Ledger::default();
        let mut history = CommandHistory::new(table());
        assert!(!history.undo(&mut ledger).expect("undo"));
        assert!(!history.redo(&mut ledger).expect("redo"));
        assert_eq!(history.undo_multiple(&mut ledger, 3).expect("undo many"), 0);
    }

    #[test]
    fn bulk_undo_and_redo_stop_when_exhausted() {
        let mut ledger = Ledger::default();
        let mut history = CommandHistory::new(table());
        for item in ["a", "b", "c"] {
            history.execute(&mut ledger, add(item)).expect("execute");
        }

        assert_eq!(history.undo_multiple(&mut ledger, 2).expect("undo"), 2);
        assert_eq!(ledger.items, vec!["a"]);
        assert_eq!(history.undo_multiple(&mut ledger, 5).expect("undo"), 1);
        assert_eq!(history.redo_multiple(&mut ledger, 10).expect("redo"), 3);
        assert_eq!(ledger.items, vec!["a", "b", "c"]);

        let redo_view = history.get_redo_history(10);
        assert!(redo_view.is_empty());
    }

    #[test]
    fn redo_history_is_most_recent_first() {
        let mut ledger = Ledger::default();
        let mut history = CommandHistory::new(table());
        for item in ["a", "b", "c"] {
            history.execute(&mut ledger, add(item)).expect("execute");
        }
        history.undo_multiple(&mut ledger, 3).expect("undo");

        let view: Vec<_> = history
            .get_redo_history(2)
            .into_iter()
            .map(|s| s.description)
            .collect();
        assert_eq!(view, vec!["add a", "add b"]);
    }

    #[test]
    fn compress_merges_consecutive_adds_only() {
        let mut ledger = Ledger::default();
        let mut history = CommandHistory::new(table());
        history.execute(&mut ledger, add("a")).expect("execute");
        history.execute(&mut ledger, add("b")).expect("execute");
        history
            .execute(
                &mut ledger,
                Action::new(ActionKind::Update, "update x").with_payload(json!("x")),
            )
            .expect("execute");
        history.execute(&mut ledger, add("c")).expect("execute");
        history.execute(&mut ledger, add("d")).expect("execute");
        history.execute(&mut ledger, add("e")).expect("execute");

        assert_eq!(history.compress(), 3);
        assert_eq!(history.undo_depth(), 3);
        let top = &history.get_undo_history(1)[0];
        assert_eq!(top.description, "add e (3 merged)");

        history.undo(&mut ledger).expect("undo");
        assert_eq!(ledger.items, vec!["a", "b", "x"]);
        assert_eq!(ledger.undo_calls, vec![json!(["c", "d", "e"])]);
        assert_eq!(history.compress(), 0);
    }

    #[test]
    fn export_import_round_trip() {
        let mut ledger = Ledger::default();
        let mut history = CommandHistory::new(table());
        for item in ["a", "b", "c"] {
            history.execute(&mut ledger, add(item)).expect("execute");
        }
        history.undo(&mut ledger).expect("undo");
        let original = history.get_undo_history(usize::MAX);

        let raw = history.export_json().expect("export");
        let mut restored = CommandHistory::new(table());
        assert_eq!(restored.import_json(&raw).expect("import"), 2);
        assert_eq!(restored.get_undo_history(usize::MAX), original);
        assert!(!restored.can_redo());

        history.import_history(history.export_history());
        assert!(!history.can_redo());
        assert_eq!(history.get_undo_history(usize::MAX), original);

        assert!(restored.undo(&mut ledger).expect("undo imported"));
        assert_eq!(ledger.items, vec!["a"]);
    }

    #[test]
    fn import_keeps_newest_entries_within_limit() {
        let mut ledger = Ledger::default();
        let mut source = CommandHistory::new(table());
        for item in ["a", "b", "c"] {
            source.execute(&mut ledger, add(item)).expect("execute");
        }

        let mut small = CommandHistory::with_max_size(table(), 2);
        assert_eq!(small.import_history(source.export_history()), 2);
        let view: Vec<_> = small
            .get_undo_history(10)
            .into_iter()
            .map(|s| s.description)
            .collect();
        assert_eq!(view, vec!["add c", "add b"]);
    }

    #[test]
    fn malformed_import_is_rejected_without_side_effects() {
        let mut ledger = Ledger::default();
        let mut history = CommandHistory::new(table());
        history.execute(&mut ledger, add("a")).expect("execute");

        let err = history.import_json("{\"appliedEntries\": 7}").unwrap_err();
        assert!(matches!(err, HistoryError::Import(_)));
        assert_eq!(history.undo_depth(), 1);
    }

    #[test]
    fn savepoint_is_display_metadata() {
        let mut ledger = Ledger::default();
        let mut history = CommandHistory::new(table());
        let empty = history.create_savepoint("start");
        assert_eq!(empty.undo_depth, 0);
        assert_eq!(empty.last_description, None);

        history.execute(&mut ledger, add("a")).expect("execute");
        history.execute(&mut ledger, add("b")).expect("execute");
        history.undo(&mut ledger).expect("undo");
        let mark = history.create_savepoint("after import");

        assert_eq!(mark.undo_depth, 1);
        assert_eq!(mark.redo_depth, 1);
        assert_eq!(mark.last_description.as_deref(), Some("add a"));
        assert_eq!(history.savepoints().len(), 2);
        assert_eq!(ledger.items, vec!["a"]);
    }

    #[test]
    fn failed_apply_records_nothing() {
        let mut ledger = Ledger::default();
        let mut history = CommandHistory::new(table());
        history.execute(&mut ledger, add("a")).expect("execute");
        history.undo(&mut ledger).expect("undo");

        let err = history
            .execute(&mut ledger, Action::new(ActionKind::BulkRemove, "purge"))
            .unwrap_err();
        assert!(matches!(
            err,
            HistoryError::Action {
                kind: ActionKind::BulkRemove,
                ..
            }
        ));
        assert!(!history.can_undo());
        assert!(history.can_redo());
    }

    #[test]
    fn failed_inverse_still_moves_entry() {
        let mut ledger = Ledger::default();
        let mut history = CommandHistory::new(table());
        history
            .execute(
                &mut ledger,
                Action::new(ActionKind::Update, "update x").with_payload(json!("x")),
            )
            .expect("execute");

        assert!(history.undo(&mut ledger).is_err());
        assert!(!history.can_undo());
        assert_eq!(history.redo_depth(), 1);
    }

    #[test]
    fn unregistered_kind_is_rejected() {
        let mut ledger = Ledger::default();
        let mut history = CommandHistory::new(table());
        let err = history
            .execute(&mut ledger, Action::new(ActionKind::BulkUpdate, "noop"))
            .unwrap_err();
        assert!(matches!(
            err,
            HistoryError::UnregisteredAction(ActionKind::BulkUpdate)
        ));
        assert!(!history.can_undo());
    }

    #[test]
    fn clear_variants_reset_their_stacks() {
        let mut ledger = Ledger::default();
        let mut history = CommandHistory::new(table());
        for item in ["a", "b"] {
            history.execute(&mut ledger, add(item)).expect("execute");
        }
        history.undo(&mut ledger).expect("undo");

        history.clear_redo();
        assert!(!history.can_redo());
        assert!(history.can_undo());
        history.clear_undo();
        assert!(!history.can_undo());

        history.execute(&mut ledger, add("c")).expect("execute");
        history.create_savepoint("mark");
        history.clear();
        assert!(!history.can_undo());
        assert!(history.savepoints().is_empty());
    }

    #[test]
    fn max_size_is_at_least_one() {
        let history = CommandHistory::with_max_size(table(), 0);
        assert_eq!(history.max_size(), 1);
    }

    proptest! {
        #[test]
        fn undo_redo_symmetry(count in 1usize..30) {
            let mut ledger = Ledger::default();
            let mut history = CommandHistory::new(table());
            for n in 0..count {
                history.execute(&mut ledger, add(&format!("item{n}"))).expect("execute");
            }

            for _ in 0..count {
                prop_assert!(history.undo(&mut ledger).expect("undo"));
            }
            prop_assert!(!history.can_undo());
            prop_assert_eq!(history.redo_depth(), count);
            prop_assert!(ledger.items.is_empty());

            for _ in 0..count {
                prop_assert!(history.redo(&mut ledger).expect("redo"));
            }
            prop_assert!(!history.can_redo());
            prop_assert_eq!(history.undo_depth(), count);
            prop_assert_eq!(ledger.items.len(), count);
        }
    }
}
