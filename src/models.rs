use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Blocked,
    Allowed,
    New,
}

impl RecordStatus {
    pub const ALL: [RecordStatus; 3] = [Self::Blocked, Self::Allowed, Self::New];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::Allowed => "allowed",
            Self::New => "new",
        }
    }

    pub fn slot(&self) -> usize {
        match self {
            Self::Blocked => 0,
            Self::Allowed => 1,
            Self::New => 2,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RecordStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record {
    pub fn new(email: impl Into<String>, domain: impl Into<String>, status: RecordStatus) -> Self {
        Self {
            email: Some(email.into()),
            domain: Some(domain.into()),
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn effective_status(&self) -> RecordStatus {
        self.status.unwrap_or(RecordStatus::New)
    }

    pub fn normalized_key(&self) -> Option<String> {
        self.email.as_deref().and_then(normalize_key)
    }

    pub fn normalized_group(&self) -> Option<String> {
        self.domain.as_deref().and_then(normalize_key)
    }
}

pub fn normalize_key(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    #[serde(default)]
    pub statuses: Vec<RecordStatus>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
            && blank(self.group.as_deref())
            && blank(self.text.as_deref())
            && self.tags.iter().all(|t| t.trim().is_empty())
    }
}

fn blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub total: usize,
    pub blocked: usize,
    pub allowed: usize,
    pub new: usize,
    pub unique_groups: usize,
    pub unique_tags: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub skipped_missing_key: usize,
    pub skipped_missing_group: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupCount {
    pub group: String,
    pub total_count: usize,
    pub blocked_count: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_percent(blocked_percent: f64) -> Self {
        if blocked_percent >= 80.0 {
            Self::High
        } else if blocked_percent >= 50.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupRisk {
    pub group: String,
    pub total_count: usize,
    pub blocked_count: usize,
    pub blocked_ratio: f64,
    pub risk_level: RiskLevel,
    pub risk_score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateKey {
    pub key: String,
    pub count: usize,
}
