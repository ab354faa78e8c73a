//! Read-only directory of known users.
//!
//! Identity is established upstream; this directory only maps user ids to
//! their public profile so the activity feed and board user list can show
//! names. It is populated once at startup from configuration.

use std::collections::HashMap;

use taskboard_proto::action::UserProfile;

/// Errors raised while building the directory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// Two profiles share an id.
    #[error("duplicate user id: {0}")]
    DuplicateId(String),
    /// Two profiles share a username.
    #[error("duplicate username: {0}")]
    DuplicateUsername(String),
    /// Two profiles share an email address.
    #[error("duplicate email: {0}")]
    DuplicateEmail(String),
}

/// Map of user id to public profile.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: HashMap<String, UserProfile>,
}

impl UserDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a directory, rejecting duplicate ids, usernames or emails.
    ///
    /// # Errors
    ///
    /// Returns the first [`DirectoryError`] encountered.
    pub fn from_profiles(
        profiles: impl IntoIterator<Item = UserProfile>,
    ) -> Result<Self, DirectoryError> {
        let mut directory = Self::new();
        for profile in profiles {
            directory.insert(profile)?;
        }
        Ok(directory)
    }

    /// Adds a profile.
    ///
    /// # Errors
    ///
    /// Returns a [`DirectoryError`] if the id, username or email is taken.
    pub fn insert(&mut self, profile: UserProfile) -> Result<(), DirectoryError> {
        if self.users.contains_key(&profile.id) {
            return Err(DirectoryError::DuplicateId(profile.id));
        }
        if self.users.values().any(|u| u.username == profile.username) {
            return Err(DirectoryError::DuplicateUsername(profile.username));
        }
        if self.users.values().any(|u| u.email == profile.email) {
            return Err(DirectoryError::DuplicateEmail(profile.email));
        }
        self.users.insert(profile.id.clone(), profile);
        Ok(())
    }

    /// Returns the profile for a user id.
    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<&UserProfile> {
        self.users.get(user_id)
    }

    /// Returns the username for a user id.
    #[must_use]
    pub fn username(&self, user_id: &str) -> Option<String> {
        self.get(user_id).map(|u| u.username.clone())
    }

    /// Returns the known profiles for `ids`, keeping the input order and
    /// skipping unknown ids.
    #[must_use]
    pub fn profiles_for(&self, ids: &[String]) -> Vec<UserProfile> {
        ids.iter().filter_map(|id| self.get(id).cloned()).collect()
    }

    /// Returns the number of known users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Returns `true` if the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
