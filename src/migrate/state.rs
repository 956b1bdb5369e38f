//! Lighthouse to GitLab ID maps built up during a migration.

use std::collections::HashMap;

use super::gitlab::{GitLabMilestone, GitLabProject, GitLabUser, Group};

/// Everything created or matched so far, keyed by Lighthouse identity.
///
/// Lookups of ID 0 or an empty name always miss.
#[derive(Debug, Clone, Default)]
pub struct MigrationState {
    users: HashMap<u64, GitLabUser>,
    users_by_name: HashMap<String, GitLabUser>,
    projects: HashMap<u64, GitLabProject>,
    milestones: HashMap<u64, GitLabMilestone>,
    groups: HashMap<String, Group>,
}

impl MigrationState {
    /// Start from the users mapping file, `{"<lh id>": {gitlab user}}`.
    pub fn with_user_mapping(mapping: HashMap<u64, GitLabUser>) -> Self {
        Self {
            users: mapping,
            ..Default::default()
        }
    }

    pub fn user(&self, lh_id: u64) -> Option<&GitLabUser> {
        if lh_id == 0 {
            return None;
        }
        self.users.get(&lh_id)
    }

    pub fn user_by_name(&self, lh_name: &str) -> Option<&GitLabUser> {
        if lh_name.is_empty() {
            return None;
        }
        self.users_by_name.get(lh_name)
    }

    /// Record the GitLab account standing in for a Lighthouse user.
    pub fn map_user(&mut self, lh_id: u64, lh_name: &str, user: GitLabUser) {
        self.users_by_name.insert(lh_name.to_string(), user.clone());
        self.users.insert(lh_id, user);
    }

    /// GitLab ID to impersonate for a Lighthouse user ID, if known.
    pub fn sudo_for(&self, lh_id: u64) -> Option<u64> {
        self.user(lh_id).map(|u| u.id).filter(|&id| id != 0)
    }

    /// GitLab ID to impersonate for a Lighthouse user name, if known.
    pub fn sudo_for_name(&self, lh_name: &str) -> Option<u64> {
        self.user_by_name(lh_name).map(|u| u.id).filter(|&id| id != 0)
    }

    pub fn project(&self, lh_id: u64) -> Option<&GitLabProject> {
        if lh_id == 0 {
            return None;
        }
        self.projects.get(&lh_id)
    }

    pub fn map_project(&mut self, lh_id: u64, project: GitLabProject) {
        self.projects.insert(lh_id, project);
    }

    pub fn milestone(&self, lh_id: u64) -> Option<&GitLabMilestone> {
        if lh_id == 0 {
            return None;
        }
        self.milestones.get(&lh_id)
    }

    pub fn map_milestone(&mut self, lh_id: u64, milestone: GitLabMilestone) {
        self.milestones.insert(lh_id, milestone);
    }

    /// Group that a project with this (sanitized) name belongs in.
    pub fn group_for(&self, project_name: &str) -> Option<&Group> {
        self.groups.get(project_name)
    }

    pub fn map_group(&mut self, project_name: String, group: Group) {
        self.groups.insert(project_name, group);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gitlab_user(id: u64, username: &str) -> GitLabUser {
        GitLabUser {
            id,
            username: username.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_ids_never_match() {
        let mut state = MigrationState::default();
        state.map_user(0, "", gitlab_user(3, "ghost"));
        state.map_milestone(0, GitLabMilestone::default());
        assert!(state.user(0).is_none());
        assert!(state.user_by_name("").is_none());
        assert!(state.milestone(0).is_none());
    }

    #[test]
    fn test_mapping_file_users_without_id_are_not_impersonated() {
        let mut mapping = HashMap::new();
        mapping.insert(7, gitlab_user(0, "ada"));
        let mut state = MigrationState::with_user_mapping(mapping);

        assert_eq!(state.user(7).map(|u| u.username.as_str()), Some("ada"));
        assert_eq!(state.sudo_for(7), None);

        state.map_user(7, "Ada Lovelace", gitlab_user(21, "ada"));
        assert_eq!(state.sudo_for(7), Some(21));
        assert_eq!(state.sudo_for_name("Ada Lovelace"), Some(21));
    }
}
