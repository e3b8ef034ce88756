use chrono::{DateTime, FixedOffset, TimeDelta};
use serde::{Deserialize, Deserializer, Serialize};

use super::time::parse_jira_timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "accountId")]
    pub account_id: String,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(rename = "emailAddress")]
    pub email_address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub fields: IssueFields,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueFields {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub parent: Option<ParentIssue>,
    #[serde(default)]
    pub components: Option<Vec<Component>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentIssue {
    pub id: String,
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
}

impl Issue {
    /// Id used for colouring: the parent's when there is one, so subtasks share a hue
    pub fn colour_id(&self) -> &str {
        self.fields
            .parent
            .as_ref()
            .map(|p| p.id.as_str())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub issues: Vec<Issue>,
}

/// A worklog as returned by `GET /rest/api/3/issue/{key}/worklog`
#[derive(Debug, Clone, Deserialize)]
pub struct WorklogRecord {
    pub id: String,
    pub author: Option<User>,
    #[serde(rename = "timeSpentSeconds")]
    pub time_spent_seconds: i64,
    #[serde(deserialize_with = "deserialize_started")]
    pub started: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorklogResponse {
    #[serde(default)]
    pub worklogs: Vec<WorklogRecord>,
}

fn deserialize_started<'de, D>(deserializer: D) -> Result<DateTime<FixedOffset>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_jira_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid worklog timestamp: {}", raw)))
}

/// A worklog joined with its issue, ready to be laid out on the week grid.
///
/// `column` and `columns` are assigned by the day layout and only affect rendering.
#[derive(Debug, Clone)]
pub struct Worklog {
    pub id: String,
    pub started: DateTime<FixedOffset>,
    pub time_spent_seconds: i64,
    pub issue: Issue,
    pub column: usize,
    pub columns: usize,
}

impl Worklog {
    pub fn new(record: WorklogRecord, issue: Issue) -> Self {
        Self {
            id: record.id,
            started: record.started,
            time_spent_seconds: record.time_spent_seconds,
            issue,
            column: 0,
            columns: 1,
        }
    }

    /// End instant; a duration chrono cannot represent ends where it started
    pub fn ended(&self) -> DateTime<FixedOffset> {
        TimeDelta::try_seconds(self.time_spent_seconds)
            .and_then(|spent| self.started.checked_add_signed(spent))
            .unwrap_or(self.started)
    }
}

/// Format seconds as "Xh Ym" string
pub fn format_duration(seconds: i64) -> String {
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;

    if hours > 0 && mins > 0 {
        format!("{}h {}m", hours, mins)
    } else if hours > 0 {
        format!("{}h", hours)
    } else if mins > 0 {
        format!("{}m", mins)
    } else {
        "0m".to_string()
    }
}
