//! Online-user roster.
//!
//! Fed wholesale from the relay's `login_success` / `user_joined` /
//! `user_left` snapshots. Call placement consults it to refuse dialing a
//! peer who is not reachable through the relay.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct PresenceDirectory {
    online: Arc<RwLock<HashSet<String>>>,
}

impl PresenceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster with a fresh server snapshot.
    pub async fn set_roster(&self, users: impl IntoIterator<Item = String>) {
        let mut online = self.online.write().await;
        online.clear();
        online.extend(users);
    }

    pub async fn is_online(&self, username: &str) -> bool {
        self.online.read().await.contains(username)
    }

    pub async fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.online.read().await.iter().cloned().collect();
        users.sort();
        users
    }

    pub async fn online_count(&self) -> usize {
        self.online.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roster_is_replaced_not_merged() {
        let directory = PresenceDirectory::new();
        directory
            .set_roster(["ana".to_string(), "bo".to_string()])
            .await;
        assert!(directory.is_online("ana").await);

        directory.set_roster(["bo".to_string()]).await;
        assert!(!directory.is_online("ana").await);
        assert!(directory.is_online("bo").await);
        assert_eq!(directory.online_count().await, 1);
    }
}
