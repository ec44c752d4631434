use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Low
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Inprogress,
    Completed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Once,
    Daily,
    Weekly,
    Monthly,
}

impl Default for Frequency {
    fn default() -> Self {
        Frequency::Once
    }
}

/// Closed set of audit-log actions. The rename tags are the wire contract;
/// clients filter on the literal strings.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum LogAction {
    #[serde(rename = "created")]
    Created,
    #[serde(rename = "updated")]
    Updated,
    #[serde(rename = "edited")]
    Edited,
    #[serde(rename = "deleted")]
    Deleted,
    #[serde(rename = "Task request sent")]
    RequestSent,
    #[serde(rename = "Task assigned")]
    Assigned,
    #[serde(rename = "Task accepted")]
    Accepted,
    #[serde(rename = "Task Rejected")]
    Rejected,
}

impl LogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogAction::Created => "created",
            LogAction::Updated => "updated",
            LogAction::Edited => "edited",
            LogAction::Deleted => "deleted",
            LogAction::RequestSent => "Task request sent",
            LogAction::Assigned => "Task assigned",
            LogAction::Accepted => "Task accepted",
            LogAction::Rejected => "Task Rejected",
        }
    }
}

/// One immutable audit-trail entry. Appended on every transition, never
/// reordered or removed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LogEntry {
    pub action: LogAction,
    /// User id of the actor.
    pub by: String,
    /// Secondary party, when the action targets another user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(action: LogAction, by: &str) -> Self {
        LogEntry {
            action,
            by: by.to_string(),
            to: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_target(action: LogAction, by: &str, to: &str) -> Self {
        LogEntry {
            action,
            by: by.to_string(),
            to: Some(to.to_string()),
            timestamp: Utc::now(),
        }
    }
}

/// A task owned by exactly one user. Soft-deleted by appending a `deleted`
/// log entry; the document is never physically removed.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PersonalTask {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub due_time: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub frequency: Frequency,
    pub user_id: String,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersonalTask {
    /// A task is active until its trail contains a `deleted` entry.
    pub fn is_active(&self) -> bool {
        !self.logs.iter().any(|l| l.action == LogAction::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_action_wire_tags_are_literal() {
        assert_eq!(
            serde_json::to_string(&LogAction::Rejected).unwrap(),
            "\"Task Rejected\""
        );
        assert_eq!(
            serde_json::to_string(&LogAction::RequestSent).unwrap(),
            "\"Task request sent\""
        );
        assert_eq!(serde_json::to_string(&LogAction::Deleted).unwrap(), "\"deleted\"");
        let round: LogAction = serde_json::from_str("\"Task accepted\"").unwrap();
        assert_eq!(round, LogAction::Accepted);
    }

    #[test]
    fn deleted_log_entry_deactivates_task() {
        let mut task = PersonalTask {
            id: "t1".into(),
            title: "laundry".into(),
            description: None,
            due_date: None,
            due_time: None,
            priority: Priority::default(),
            status: TaskStatus::default(),
            frequency: Frequency::default(),
            user_id: "u1".into(),
            logs: vec![LogEntry::new(LogAction::Created, "u1")],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(task.is_active());
        task.logs.push(LogEntry::new(LogAction::Deleted, "u1"));
        assert!(!task.is_active());
    }
}
