use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::models::{
    normalize_key, DuplicateKey, FilterCriteria, GroupCount, GroupRisk, IndexStats, Record,
    RecordStatus, RiskLevel,
};

const SCORE_KEY_EXACT: u32 = 100;
const SCORE_KEY_PREFIX: u32 = 50;
const SCORE_KEY_CONTAINS: u32 = 25;
const SCORE_GROUP_CONTAINS: u32 = 10;

#[derive(Debug, Clone, Default)]
struct IndexedRow {
    key: Option<String>,
    group: Option<String>,
    search_text: String,
}

impl IndexedRow {
    fn matches(&self, needle: &str) -> bool {
        self.key.as_deref().is_some_and(|k| k.contains(needle))
            || self.group.as_deref().is_some_and(|g| g.contains(needle))
            || self.search_text.contains(needle)
    }

    fn rank(&self, needle: &str) -> u32 {
        let mut score = match self.key.as_deref() {
            Some(key) if key == needle => SCORE_KEY_EXACT,
            Some(key) if key.starts_with(needle) => SCORE_KEY_PREFIX,
            Some(key) if key.contains(needle) => SCORE_KEY_CONTAINS,
            _ => 0,
        };
        if self.group.as_deref().is_some_and(|g| g.contains(needle)) {
            score += SCORE_GROUP_CONTAINS;
        }
        score
    }
}

/// Multi-index lookup structure over an owned, ordered record set.
///
/// Records live in a single arena and every derived index stores positions
/// into it, so set algebra between queries works on `usize` handles.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    records: Vec<Record>,
    rows: Vec<IndexedRow>,
    position_by_key: HashMap<String, usize>,
    positions_by_group: HashMap<String, Vec<usize>>,
    positions_by_status: [Vec<usize>; 3],
    positions_by_tag: HashMap<String, Vec<usize>>,
    key_occurrences: HashMap<String, usize>,
    skipped_missing_key: usize,
    skipped_missing_group: usize,
    last_updated: Option<DateTime<Utc>>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build_index(&mut self, records: Vec<Record>) {
        self.records = records;
        self.build_runtime_maps();
        info!(
            records = self.records.len(),
            groups = self.positions_by_group.len(),
            tags = self.positions_by_tag.len(),
            skipped_missing_key = self.skipped_missing_key,
            skipped_missing_group = self.skipped_missing_group,
            "Search index built"
        );
    }

    pub fn rebuild_index(&mut self) {
        self.build_runtime_maps();
        debug!(records = self.records.len(), "Search index rebuilt");
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn add_record(&mut self, record: Record) -> usize {
        let idx = self.records.len();
        self.records.push(record);
        self.index_position(idx);
        self.touch();
        idx
    }

    pub fn remove_by_key(&mut self, key: &str) -> Option<Record> {
        let idx = self.position_of(key)?;
        let removed = self.records.remove(idx);
        self.rebuild_index();
        Some(removed)
    }

    pub fn update_by_key(&mut self, key: &str, record: Record) -> Option<Record> {
        let idx = self.position_of(key)?;
        let previous = std::mem::replace(&mut self.records[idx], record);
        self.rebuild_index();
        Some(previous)
    }

    pub fn find_by_key(&self, key: &str) -> Option<&Record> {
        self.position_of(key).map(|idx| &self.records[idx])
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.position_of(key).is_some()
    }

    /// Number of records carrying `key`, duplicates included.
    pub fn key_count(&self, key: &str) -> usize {
        normalize_key(key)
            .and_then(|k| self.key_occurrences.get(&k).copied())
            .unwrap_or(0)
    }

    pub fn find_by_group(&self, group: &str) -> Vec<&Record> {
        normalize_key(group)
            .and_then(|g| self.positions_by_group.get(&g))
            .map(|positions| self.collect(positions.iter().copied()))
            .unwrap_or_default()
    }

    pub fn filter_by_status(&self, status: RecordStatus) -> Vec<&Record> {
        self.collect(self.positions_by_status[status.slot()].iter().copied())
    }

    pub fn filter_by_statuses(&self, statuses: &[RecordStatus]) -> Vec<&Record> {
        self.collect(self.status_positions(statuses))
    }

    pub fn filter_by_tag(&self, tag: &str) -> Vec<&Record> {
        normalize_key(tag)
            .and_then(|t| self.positions_by_tag.get(&t))
            .map(|positions| self.collect(positions.iter().copied()))
            .unwrap_or_default()
    }

    /// AND across criteria dimensions, OR within a dimension.
    pub fn apply_filters(&self, criteria: &FilterCriteria) -> Vec<&Record> {
        if criteria.is_empty() {
            return self.records.iter().collect();
        }

        let mut selected: Option<BTreeSet<usize>> = None;

        if !criteria.statuses.is_empty() {
            narrow(&mut selected, self.status_positions(&criteria.statuses));
        }

        if let Some(group) = criteria.group.as_deref().and_then(normalize_key) {
            let positions: BTreeSet<usize> = self
                .positions_by_group
                .get(&group)
                .map(|p| p.iter().copied().collect())
                .unwrap_or_default();
            narrow(&mut selected, positions);
        }

        let tags: Vec<String> = criteria.tags.iter().filter_map(|t| normalize_key(t)).collect();
        if !tags.is_empty() {
            let positions: BTreeSet<usize> = tags
                .iter()
                .filter_map(|t| self.positions_by_tag.get(t))
                .flatten()
                .copied()
                .collect();
            narrow(&mut selected, positions);
        }

        if let Some(text) = criteria.text.as_deref().and_then(normalize_key) {
            narrow(&mut selected, self.matching_positions(&text).collect());
        }

        match selected {
            Some(positions) => self.collect(positions),
            None => self.records.iter().collect(),
        }
    }

    pub fn search(&self, query: &str) -> Vec<&Record> {
        let Some(needle) = normalize_key(query) else {
            return self.records.iter().collect();
        };
        self.collect(self.matching_positions(&needle))
    }

    pub fn search_with_ranking(&self, query: &str) -> Vec<&Record> {
        let Some(needle) = normalize_key(query) else {
            return Vec::new();
        };

        let mut scored: Vec<(u32, usize)> = self
            .rows
            .iter()
            .enumerate()
            .map(|(idx, row)| (row.rank(&needle), idx))
            .filter(|(score, _)| *score > 0)
            .collect();
        // sort_by is stable, so equal scores keep insertion order
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        self.collect(scored.into_iter().map(|(_, idx)| idx))
    }

    pub fn get_stats(&self) -> IndexStats {
        IndexStats {
            total: self.records.len(),
            blocked: self.positions_by_status[RecordStatus::Blocked.slot()].len(),
            allowed: self.positions_by_status[RecordStatus::Allowed.slot()].len(),
            new: self.positions_by_status[RecordStatus::New.slot()].len(),
            unique_groups: self.positions_by_group.len(),
            unique_tags: self.positions_by_tag.len(),
            last_updated: self.last_updated,
            skipped_missing_key: self.skipped_missing_key,
            skipped_missing_group: self.skipped_missing_group,
        }
    }

    pub fn get_top_groups(&self, limit: usize) -> Vec<GroupCount> {
        let mut groups: Vec<GroupCount> = self
            .positions_by_group
            .iter()
            .map(|(group, positions)| GroupCount {
                group: group.clone(),
                total_count: positions.len(),
                blocked_count: self.count_blocked(positions),
            })
            .collect();

        groups.sort_by(|a, b| {
            b.total_count
                .cmp(&a.total_count)
                .then_with(|| a.group.cmp(&b.group))
        });
        groups.truncate(limit);
        groups
    }

    pub fn get_group_risk(&self, group: &str) -> GroupRisk {
        let normalized = normalize_key(group);
        let positions = normalized
            .as_ref()
            .and_then(|g| self.positions_by_group.get(g))
            .map(Vec::as_slice)
            .unwrap_or_default();

        let total_count = positions.len();
        let blocked_count = self.count_blocked(positions);
        let blocked_ratio = if total_count == 0 {
            0.0
        } else {
            (blocked_count as f64 / total_count as f64 * 10_000.0).round() / 100.0
        };

        GroupRisk {
            group: normalized.unwrap_or_else(|| group.trim().to_string()),
            total_count,
            blocked_count,
            blocked_ratio,
            risk_level: RiskLevel::from_percent(blocked_ratio),
            risk_score: blocked_ratio.round() as u32,
        }
    }

    pub fn get_duplicate_keys(&self) -> Vec<DuplicateKey> {
        let mut duplicates: Vec<DuplicateKey> = self
            .key_occurrences
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(key, count)| DuplicateKey {
                key: key.clone(),
                count: *count,
            })
            .collect();
        duplicates.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
        duplicates
    }

    pub fn get_by_date_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&Record> {
        self.records
            .iter()
            .filter(|record| {
                record
                    .created_at
                    .is_some_and(|created| created >= start && created <= end)
            })
            .collect()
    }

    fn build_runtime_maps(&mut self) {
        self.rows.clear();
        self.position_by_key.clear();
        self.positions_by_group.clear();
        self.positions_by_tag.clear();
        self.key_occurrences.clear();
        for positions in &mut self.positions_by_status {
            positions.clear();
        }
        self.skipped_missing_key = 0;
        self.skipped_missing_group = 0;

        for idx in 0..self.records.len() {
            self.index_position(idx);
        }
        self.touch();
    }

    fn index_position(&mut self, idx: usize) {
        let record = &self.records[idx];
        let key = record.normalized_key();
        let group = record.normalized_group();

        match &key {
            Some(key) => {
                self.position_by_key.insert(key.clone(), idx);
                *self.key_occurrences.entry(key.clone()).or_insert(0) += 1;
            }
            None => {
                self.skipped_missing_key += 1;
                debug!(position = idx, "Record without key skipped by key index");
            }
        }

        match &group {
            Some(group) => self
                .positions_by_group
                .entry(group.clone())
                .or_default()
                .push(idx),
            None => {
                self.skipped_missing_group += 1;
                debug!(position = idx, "Record without group skipped by group index");
            }
        }

        self.positions_by_status[record.effective_status().slot()].push(idx);

        let mut seen = HashSet::new();
        for tag in record.tags.iter().filter_map(|t| normalize_key(t)) {
            if seen.insert(tag.clone()) {
                self.positions_by_tag.entry(tag).or_default().push(idx);
            }
        }

        let search_text = serde_json::to_string(record)
            .map(|s| s.to_lowercase())
            .unwrap_or_default();

        debug_assert_eq!(self.rows.len(), idx);
        self.rows.push(IndexedRow {
            key,
            group,
            search_text,
        });
    }

    fn touch(&mut self) {
        let now = Utc::now();
        self.last_updated = Some(match self.last_updated {
            Some(previous) if previous > now => previous,
            _ => now,
        });
    }

    fn position_of(&self, key: &str) -> Option<usize> {
        normalize_key(key).and_then(|k| self.position_by_key.get(&k).copied())
    }

    fn status_positions(&self, statuses: &[RecordStatus]) -> BTreeSet<usize> {
        statuses
            .iter()
            .flat_map(|status| self.positions_by_status[status.slot()].iter().copied())
            .collect()
    }

    fn matching_positions<'a>(&'a self, needle: &'a str) -> impl Iterator<Item = usize> + 'a {
        self.rows
            .iter()
            .enumerate()
            .filter(move |(_, row)| row.matches(needle))
            .map(|(idx, _)| idx)
    }

    fn count_blocked(&self, positions: &[usize]) -> usize {
        positions
            .iter()
            .filter(|idx| self.records[**idx].effective_status() == RecordStatus::Blocked)
            .count()
    }

    fn collect(&self, positions: impl IntoIterator<Item = usize>) -> Vec<&Record> {
        positions.into_iter().map(|idx| &self.records[idx]).collect()
    }
}

fn narrow(selected: &mut Option<BTreeSet<usize>>, next: BTreeSet<usize>) {
    *selected = Some(match selected.take() {
        Some(current) => current.intersection(&next).copied().collect(),
        None => next,
    });
}
