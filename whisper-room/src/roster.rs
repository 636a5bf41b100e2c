//! The authoritative name registry for the room.

use thiserror::Error;

use crate::session::SessionHandle;

/// Longest accepted name, counted in characters before trimming.
pub const MAX_NAME_CHARS: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    #[error("name is empty")]
    EmptyName,
    #[error("name '{0}' is already in use")]
    NameTaken(String),
    #[error("session already has a name")]
    AlreadyRegistered,
}

/// Cuts a candidate down to its first [`MAX_NAME_CHARS`] characters and then
/// trims surrounding whitespace.
pub fn normalize_name(candidate: &str) -> String {
    let truncated: String = candidate.chars().take(MAX_NAME_CHARS).collect();
    truncated.trim().to_string()
}

#[derive(Debug)]
struct Member {
    name: String,
    handle: SessionHandle,
}

/// Named sessions in join order.
///
/// Rosters stay small, so a vector gives both lookup and the insertion
/// order needed for presence listings.
#[derive(Debug, Default)]
pub struct Roster {
    members: Vec<Member>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `name` unless it is empty or taken. Callers serialize access
    /// through the room lock, which makes the check-and-insert atomic.
    pub fn try_register(&mut self, name: &str, handle: SessionHandle) -> Result<(), RegisterError> {
        if name.is_empty() {
            return Err(RegisterError::EmptyName);
        }
        if self.contains(name) {
            return Err(RegisterError::NameTaken(name.to_string()));
        }
        self.members.push(Member {
            name: name.to_string(),
            handle,
        });
        Ok(())
    }

    /// Removes `name` if present. Returns whether anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|member| member.name != name);
        self.members.len() != before
    }

    pub fn list_names(&self) -> Vec<String> {
        self.members
            .iter()
            .map(|member| member.name.clone())
            .collect()
    }

    pub fn lookup(&self, name: &str) -> Option<&SessionHandle> {
        self.members
            .iter()
            .find(|member| member.name == name)
            .map(|member| &member.handle)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Name registered to the given session, if any.
    #[cfg(test)]
    pub fn name_of(&self, id: crate::session::SessionId) -> Option<&str> {
        self.members
            .iter()
            .find(|member| member.handle.id() == id)
            .map(|member| member.name.as_str())
    }

    pub fn handles(&self) -> impl Iterator<Item = &SessionHandle> {
        self.members.iter().map(|member| &member.handle)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::detached;

    #[test]
    fn normalize_truncates_before_trimming() {
        assert_eq!(normalize_name("alice"), "alice");
        assert_eq!(normalize_name("  bob  "), "bob");
        assert_eq!(normalize_name("abcdefghijk"), "abcdefgh");
        // The ninth character onwards is discarded before the trim runs.
        assert_eq!(normalize_name("       x"), "x");
        assert_eq!(normalize_name("        x"), "");
        assert_eq!(normalize_name("   "), "");
        assert_eq!(normalize_name("ééééééééé"), "éééééééé");
    }

    #[test]
    fn rejects_duplicate_and_empty_names() {
        let mut roster = Roster::new();
        let (alice, _a) = detached(1);
        let (other, _b) = detached(2);

        roster
            .try_register("alice", alice.handle().clone())
            .expect("first registration");
        assert_eq!(
            roster.try_register("alice", other.handle().clone()),
            Err(RegisterError::NameTaken("alice".into()))
        );
        assert_eq!(
            roster.try_register("", other.handle().clone()),
            Err(RegisterError::EmptyName)
        );

        assert_eq!(roster.list_names(), vec!["alice".to_string()]);
        let found = roster.lookup("alice").map(SessionHandle::id);
        assert_eq!(found, Some(alice.id()));
    }

    #[test]
    fn names_listed_in_join_order() {
        let mut roster = Roster::new();
        for (raw, name) in [(1, "zed"), (2, "amy"), (3, "mo")] {
            let (session, _rx) = detached(raw);
            roster
                .try_register(name, session.handle().clone())
                .expect("register");
        }
        assert_eq!(roster.list_names(), vec!["zed", "amy", "mo"]);

        assert!(roster.remove("amy"));
        assert_eq!(roster.list_names(), vec!["zed", "mo"]);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut roster = Roster::new();
        let (session, _rx) = detached(1);
        roster
            .try_register("alice", session.handle().clone())
            .expect("register");

        assert!(roster.remove("alice"));
        assert!(!roster.remove("alice"));
        assert!(roster.is_empty());
        assert!(roster.lookup("alice").is_none());
    }

    #[test]
    fn freed_name_can_be_claimed_again() {
        let mut roster = Roster::new();
        let (first, _a) = detached(1);
        let (second, _b) = detached(2);

        roster
            .try_register("bob", first.handle().clone())
            .expect("first");
        roster.remove("bob");
        roster
            .try_register("bob", second.handle().clone())
            .expect("second");

        assert_eq!(roster.name_of(second.id()), Some("bob"));
        assert_eq!(roster.name_of(first.id()), None);
        assert_eq!(roster.len(), 1);
    }
}
