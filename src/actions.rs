use std::collections::{HashMap, HashSet};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::{
    history::{Action, ActionKind, ActionTable},
    models::{normalize_key, Record},
    search_index::SearchIndex,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordChange {
    key: String,
    record: Record,
}

/// Key occurrence counts of the index as a batch of updates would leave them.
struct KeyLedger<'a> {
    index: &'a SearchIndex,
    delta: HashMap<String, isize>,
}

impl<'a> KeyLedger<'a> {
    fn new(index: &'a SearchIndex) -> Self {
        Self {
            index,
            delta: HashMap::new(),
        }
    }

    fn count(&self, key: &str) -> isize {
        let base = isize::try_from(self.index.key_count(key)).unwrap_or(isize::MAX);
        base + self.delta.get(key).copied().unwrap_or(0)
    }

    /// Moves one occurrence of `from` to the key of `record`. A forward update
    /// may not land on a key another record already holds.
    fn try_rename(&mut self, from: &str, record: &Record, forward: bool) -> Result<()> {
        let from = normalize_key(from).context("update without a source key")?;
        if self.count(&from) <= 0 {
            bail!("no record with key `{from}`");
        }
        let Some(to) = record.normalized_key() else {
            bail!("update of `{from}` drops the record key");
        };
        if forward && to != from && self.count(&to) > 0 {
            bail!("key `{to}` already belongs to another record");
        }
        *self.delta.entry(from).or_insert(0) -= 1;
        *self.delta.entry(to).or_insert(0) += 1;
        Ok(())
    }
}

pub fn record_action_table() -> ActionTable<SearchIndex> {
    ActionTable::new()
        .register(ActionKind::Add, apply_add, invert_add)
        .register(ActionKind::BulkAdd, apply_add, invert_add)
        .register(ActionKind::Remove, apply_remove, invert_remove)
        .register(ActionKind::BulkRemove, apply_remove, invert_remove)
        .register(ActionKind::Update, apply_update, invert_update)
        .register(ActionKind::BulkUpdate, apply_update, invert_update)
}

pub fn add_action(record: &Record) -> Option<Action> {
    let key = record.normalized_key()?;
    Some(
        Action::new(ActionKind::Add, format!("Add {key}"))
            .with_payload(serde_json::to_value(record).ok()?)
            .with_prior_state(json!(key)),
    )
}

pub fn bulk_add_action(records: &[Record]) -> Option<Action> {
    let keyed: Vec<&Record> = records
        .iter()
        .filter(|record| record.normalized_key().is_some())
        .collect();
    if keyed.len() < records.len() {
        debug!(
            dropped = records.len() - keyed.len(),
            "Records without key left out of bulk add"
        );
    }
    if keyed.is_empty() {
        return None;
    }

    let keys: Vec<String> = keyed.iter().filter_map(|r| r.normalized_key()).collect();
    Some(
        Action::new(ActionKind::BulkAdd, format!("Add {} records", keyed.len()))
            .with_payload(serde_json::to_value(&keyed).ok()?)
            .with_prior_state(json!(keys)),
    )
}

pub fn remove_action(index: &SearchIndex, key: &str) -> Option<Action> {
    let key = normalize_key(key)?;
    let record = index.find_by_key(&key)?;
    Some(
        Action::new(ActionKind::Remove, format!("Remove {key}"))
            .with_payload(json!(key))
            .with_prior_state(serde_json::to_value(record).ok()?),
    )
}

pub fn bulk_remove_action<S: AsRef<str>>(index: &SearchIndex, keys: &[S]) -> Option<Action> {
    let mut seen = HashSet::new();
    let mut present = Vec::new();
    let mut removed = Vec::new();
    for key in keys.iter().filter_map(|k| normalize_key(k.as_ref())) {
        if !seen.insert(key.clone()) {
            continue;
        }
        let Some(record) = index.find_by_key(&key) else {
            continue;
        };
        removed.push(serde_json::to_value(record).ok()?);
        present.push(key);
    }
    if present.is_empty() {
        return None;
    }

    Some(
        Action::new(ActionKind::BulkRemove, format!("Remove {} records", present.len()))
            .with_payload(json!(present))
            .with_prior_state(Value::Array(removed)),
    )
}

pub fn update_action(index: &SearchIndex, key: &str, record: Record) -> Option<Action> {
    let key = normalize_key(key)?;
    let previous = index.find_by_key(&key)?.clone();
    let new_key = record.normalized_key()?;
    if let Err(err) = KeyLedger::new(index).try_rename(&key, &record, true) {
        debug!(key = %key, error = %err, "Update not recorded");
        return None;
    }
    let forward = RecordChange {
        key: key.clone(),
        record,
    };
    let backward = RecordChange {
        key: new_key,
        record: previous,
    };
    Some(
        Action::new(ActionKind::Update, format!("Update {key}"))
            .with_payload(serde_json::to_value(&forward).ok()?)
            .with_prior_state(serde_json::to_value(&backward).ok()?),
    )
}

pub fn bulk_update_action(index: &SearchIndex, changes: Vec<(String, Record)>) -> Option<Action> {
    let mut ledger = KeyLedger::new(index);
    let mut seen = HashSet::new();
    let mut forward = Vec::new();
    let mut backward = Vec::new();
    for (key, record) in changes {
        let Some(key) = normalize_key(&key) else {
            continue;
        };
        if !seen.insert(key.clone()) {
            debug!(key = %key, "Repeated key left out of bulk update");
            continue;
        }
        let (Some(previous), Some(new_key)) = (index.find_by_key(&key), record.normalized_key())
        else {
            continue;
        };
        if let Err(err) = ledger.try_rename(&key, &record, true) {
            debug!(key = %key, error = %err, "Change left out of bulk update");
            continue;
        }
        backward.push(RecordChange {
            key: new_key,
            record: previous.clone(),
        });
        forward.push(RecordChange { key, record });
    }
    if forward.is_empty() {
        return None;
    }
    backward.reverse();

    Some(
        Action::new(ActionKind::BulkUpdate, format!("Update {} records", forward.len()))
            .with_payload(serde_json::to_value(&forward).ok()?)
            .with_prior_state(serde_json::to_value(&backward).ok()?),
    )
}

fn apply_add(index: &mut SearchIndex, payload: &Value) -> Result<Value> {
    let records = records_from(payload)?;
    let added = records.len();
    for record in records {
        index.add_record(record);
    }
    Ok(json!({ "added": added }))
}

fn invert_add(index: &mut SearchIndex, prior_state: &Value) -> Result<()> {
    for key in keys_from(prior_state)?.iter().rev() {
        if index.remove_by_key(key).is_none() {
            debug!(key = %key, "Record already gone while undoing add");
        }
    }
    Ok(())
}

fn apply_remove(index: &mut SearchIndex, payload: &Value) -> Result<Value> {
    let keys = keys_from(payload)?;
    if let Some(missing) = keys.iter().find(|key| !index.has_key(key)) {
        bail!("no record with key `{missing}`");
    }

    let removed = keys
        .iter()
        .filter_map(|key| index.remove_by_key(key))
        .map(|record| serde_json::to_value(record).context("serialize removed record"))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::Array(removed))
}

fn invert_remove(index: &mut SearchIndex, prior_state: &Value) -> Result<()> {
    for record in records_from(prior_state)? {
        index.add_record(record);
    }
    Ok(())
}

fn apply_update(index: &mut SearchIndex, payload: &Value) -> Result<Value> {
    apply_changes(index, payload, true)
}

fn invert_update(index: &mut SearchIndex, prior_state: &Value) -> Result<()> {
    apply_changes(index, prior_state, false).map(|_| ())
}

fn apply_changes(index: &mut SearchIndex, payload: &Value, forward: bool) -> Result<Value> {
    let changes = changes_from(payload)?;
    let mut ledger = KeyLedger::new(index);
    for change in &changes {
        ledger.try_rename(&change.key, &change.record, forward)?;
    }

    let mut previous = Vec::with_capacity(changes.len());
    for change in changes {
        let Some(prior) = index.update_by_key(&change.key, change.record) else {
            bail!("no record with key `{}`", change.key);
        };
        previous.push(serde_json::to_value(prior).context("serialize previous record")?);
    }
    Ok(Value::Array(previous))
}

fn records_from(value: &Value) -> Result<Vec<Record>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| Record::deserialize(item).context("invalid record in payload"))
            .collect(),
        Value::Object(_) => Ok(vec![
            Record::deserialize(value).context("invalid record payload")?
        ]),
        other => bail!("expected a record or list of records, got {other}"),
    }
}

fn keys_from(value: &Value) -> Result<Vec<String>> {
    match value {
        Value::String(key) => Ok(vec![key.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(ToString::to_string)
                    .context("expected a key string")
            })
            .collect(),
        other => bail!("expected a key or list of keys, got {other}"),
    }
}

fn changes_from(value: &Value) -> Result<Vec<RecordChange>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| RecordChange::deserialize(item).context("invalid record change"))
            .collect(),
        Value::Object(_) => Ok(vec![
            RecordChange::deserialize(value).context("invalid record change")?
        ]),
        other => bail!("expected a record change, got {other}"),
    }
}
