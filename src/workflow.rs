// Assignment lifecycle rules. Every transition is validated against the
// guard table here and applied as a single conditional document update, so
// two racing transitions on the same task can never both observe the same
// source state.

use mongodb::bson::{doc, Document};

use crate::error::ApiError;
use crate::models::{AssignStatus, LogAction, User};

/// Actions that move an assigned task through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignAction {
    Accept,
    Reject,
    Edit,
    Delete,
}

impl AssignAction {
    /// Guard table: the source states an action is valid from. `None` is the
    /// wildcard: edit and delete stay usable at any state (editing a
    /// completed task's fields relies on this), while accept/reject are
    /// strictly guarded.
    pub fn allowed_from(&self) -> Option<&'static [AssignStatus]> {
        match self {
            AssignAction::Accept | AssignAction::Reject => Some(&[AssignStatus::Requested]),
            AssignAction::Edit | AssignAction::Delete => None,
        }
    }

    /// Resulting status, if the action forces one. Edit leaves the status
    /// alone unless the caller's patch sets it explicitly.
    pub fn target(&self) -> Option<AssignStatus> {
        match self {
            AssignAction::Accept => Some(AssignStatus::Assigned),
            AssignAction::Reject => Some(AssignStatus::Rejected),
            AssignAction::Delete => Some(AssignStatus::Deleted),
            AssignAction::Edit => None,
        }
    }

    pub fn log_action(&self) -> LogAction {
        match self {
            AssignAction::Accept => LogAction::Accepted,
            AssignAction::Reject => LogAction::Rejected,
            AssignAction::Edit => LogAction::Edited,
            AssignAction::Delete => LogAction::Deleted,
        }
    }

    /// Validates the action against the current status, per the guard table.
    pub fn check(&self, current: AssignStatus) -> Result<(), ApiError> {
        match self.allowed_from() {
            Some(allowed) if !allowed.contains(&current) => Err(ApiError::InvalidState(format!(
                "cannot {:?} a task in state '{}'",
                self,
                current.as_str()
            ))),
            _ => Ok(()),
        }
    }

    /// The compare-and-swap filter for the store update: matches the task id
    /// and, for guarded actions, only the allowed source states. A racing
    /// transition that already moved the task makes the update match nothing.
    pub fn guard_filter(&self, task_id: &str) -> Document {
        let mut filter = doc! { "_id": task_id };
        if let Some(allowed) = self.allowed_from() {
            let states: Vec<&str> = allowed.iter().map(|s| s.as_str()).collect();
            filter.insert("assign_status", doc! { "$in": states });
        }
        filter
    }
}

/// Fast-path rule at creation: if the receiver already lists the sender as a
/// collaborator, the handshake is skipped and the task starts assigned.
pub fn is_collaborator(receiver: &User, sender_username: &str) -> bool {
    receiver.collaborators.iter().any(|c| c == sender_username)
}

/// Initial status and matching log action for a freshly created assignment.
pub fn initial_status(receiver: &User, sender_username: &str) -> (AssignStatus, LogAction) {
    if is_collaborator(receiver, sender_username) {
        (AssignStatus::Assigned, LogAction::Assigned)
    } else {
        (AssignStatus::Requested, LogAction::RequestSent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(username: &str, collaborators: &[&str]) -> User {
        User {
            id: format!("u-{}", username),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password: "hash".to_string(),
            collaborators: collaborators.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn accept_and_reject_require_requested() {
        for action in [AssignAction::Accept, AssignAction::Reject] {
            assert!(action.check(AssignStatus::Requested).is_ok());
            for state in [
                AssignStatus::Assigned,
                AssignStatus::Rejected,
                AssignStatus::Deleted,
            ] {
                match action.check(state) {
                    Err(ApiError::InvalidState(_)) => {}
                    other => panic!("expected InvalidState for {:?} from {:?}, got {:?}", action, state, other.is_ok()),
                }
            }
        }
    }

    #[test]
    fn edit_and_delete_are_valid_from_any_state() {
        for action in [AssignAction::Edit, AssignAction::Delete] {
            for state in [
                AssignStatus::Requested,
                AssignStatus::Assigned,
                AssignStatus::Rejected,
                AssignStatus::Deleted,
            ] {
                assert!(action.check(state).is_ok());
            }
        }
    }

    #[test]
    fn targets_and_log_actions_line_up() {
        assert_eq!(AssignAction::Accept.target(), Some(AssignStatus::Assigned));
        assert_eq!(AssignAction::Reject.target(), Some(AssignStatus::Rejected));
        assert_eq!(AssignAction::Delete.target(), Some(AssignStatus::Deleted));
        assert_eq!(AssignAction::Edit.target(), None);
        assert_eq!(AssignAction::Accept.log_action(), LogAction::Accepted);
        assert_eq!(AssignAction::Reject.log_action(), LogAction::Rejected);
    }

    #[test]
    fn guard_filter_pins_source_state_for_guarded_actions() {
        let filter = AssignAction::Accept.guard_filter("t1");
        assert_eq!(
            filter,
            doc! { "_id": "t1", "assign_status": { "$in": ["requested"] } }
        );
        // Wildcard actions match on id alone.
        let filter = AssignAction::Delete.guard_filter("t1");
        assert_eq!(filter, doc! { "_id": "t1" });
    }

    #[test]
    fn collaborator_fast_path_skips_handshake() {
        let receiver = user("bob", &["alice"]);
        let (status, log) = initial_status(&receiver, "alice");
        assert_eq!(status, AssignStatus::Assigned);
        assert_eq!(log, LogAction::Assigned);
    }

    #[test]
    fn strangers_start_in_requested() {
        let receiver = user("bob", &[]);
        let (status, log) = initial_status(&receiver, "alice");
        assert_eq!(status, AssignStatus::Requested);
        assert_eq!(log, LogAction::RequestSent);
    }

    #[test]
    fn collaborator_check_is_directional() {
        // Only the receiver's list matters; the sender's own list does not.
        let receiver = user("bob", &[]);
        assert!(!is_collaborator(&receiver, "alice"));
        let receiver = user("bob", &["alice"]);
        assert!(is_collaborator(&receiver, "alice"));
    }
}
