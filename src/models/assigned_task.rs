use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::{Frequency, LogEntry, Priority, TaskStatus};
use super::user::UserRef;

/// Lifecycle of a task shared between two users. `Requested` is initial;
/// `Assigned` and `Rejected` are resolution terminals reachable only from
/// `Requested`; `Deleted` is a soft-delete overlay reachable from any state.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssignStatus {
    Requested,
    Assigned,
    Rejected,
    Deleted,
}

impl AssignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignStatus::Requested => "requested",
            AssignStatus::Assigned => "assigned",
            AssignStatus::Rejected => "rejected",
            AssignStatus::Deleted => "deleted",
        }
    }
}

/// A task sent from one user to another. Never physically removed; delete is
/// a status value plus a log entry, same convention as `PersonalTask`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AssignedTask {
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
    pub sent_by: UserRef,
    pub send_to: UserRef,
    pub assign_status: AssignStatus,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssignedTask {
    /// Username of the party that did not perform the action, i.e. the one
    /// who should be notified about it.
    pub fn counterparty_of(&self, actor_user_id: &str) -> &str {
        if self.sent_by.user_id == actor_user_id {
            &self.send_to.username
        } else {
            &self.sent_by.username
        }
    }
}
