use serde::{Deserialize, Serialize};

/// A registered account. `collaborators` is a directed adjacency list of
/// usernames: acceptance adds the receiver to the sender's list only, so a
/// fresh link is one-directional until the receiver sends something back.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub collaborators: Vec<String>,
}

/// Denormalized counterparty snapshot embedded in an assigned task, so room
/// addressing and log attribution need no extra user lookup.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserRef {
    pub user_id: String,
    pub username: String,
}

impl User {
    pub fn to_ref(&self) -> UserRef {
        UserRef {
            user_id: self.id.clone(),
            username: self.username.clone(),
        }
    }
}
