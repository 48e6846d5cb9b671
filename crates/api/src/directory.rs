//! Workspace existence checks.
//!
//! Workspace CRUD is owned by a separate service; the jobs API only needs to
//! know whether a workspace id is real before accepting work for it.

use std::collections::HashSet;
use std::sync::RwLock;

use codehive_core::WorkspaceId;

pub trait WorkspaceDirectory: Send + Sync {
    fn contains(&self, workspace_id: WorkspaceId) -> bool;
}

/// Directory backed by a seeded in-memory set.
#[derive(Debug, Default)]
pub struct InMemoryWorkspaceDirectory {
    ids: RwLock<HashSet<WorkspaceId>>,
}

impl InMemoryWorkspaceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a comma-separated id list (the `WORKSPACE_IDS` env var).
    /// Entries that do not parse as integers are skipped with a warning.
    pub fn from_env_list(list: &str) -> Self {
        let directory = Self::new();
        for entry in list.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            match entry.parse::<WorkspaceId>() {
                Ok(id) => directory.register(id),
                Err(_) => tracing::warn!(entry, "skipping unparseable workspace id"),
            }
        }
        directory
    }

    pub fn register(&self, workspace_id: WorkspaceId) {
        self.ids.write().unwrap().insert(workspace_id);
    }
}

impl WorkspaceDirectory for InMemoryWorkspaceDirectory {
    fn contains(&self, workspace_id: WorkspaceId) -> bool {
        self.ids.read().unwrap().contains(&workspace_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_list_parses_and_skips_garbage() {
        let dir = InMemoryWorkspaceDirectory::from_env_list("1, 42,,nope, 7");
        assert!(dir.contains(WorkspaceId::new(1)));
        assert!(dir.contains(WorkspaceId::new(42)));
        assert!(dir.contains(WorkspaceId::new(7)));
        assert!(!dir.contains(WorkspaceId::new(99)));
    }
}
