use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::{ProtocolVersion, Session};
use crate::error::{poisoned, CoordinatorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionSort {
    Newest,
    Oldest,
    PeerName,
}

const SESSION_SORTS: &[(&str, SessionSort)] = &[
    ("newest", SessionSort::Newest),
    ("oldest", SessionSort::Oldest),
    ("peer-name", SessionSort::PeerName),
];

impl SessionSort {
    pub const DEFAULT: SessionSort = SessionSort::Newest;

    pub fn from_id(id: &str) -> Option<Self> {
        SESSION_SORTS
            .iter()
            .find(|(key, _)| *key == id)
            .map(|(_, sort)| *sort)
    }

    pub fn id(self) -> &'static str {
        SESSION_SORTS
            .iter()
            .find(|(_, sort)| *sort == self)
            .map(|(key, _)| *key)
            .unwrap_or("newest")
    }
}

/// Active sessions keyed by topic. Only the coordinator mutates entries.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionRegistry {
    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Session>>, CoordinatorError> {
        self.sessions.read().map_err(|e| poisoned("session registry", e))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Session>>, CoordinatorError> {
        self.sessions
            .write()
            .map_err(|e| poisoned("session registry", e))
    }

    pub(crate) fn insert(&self, session: Session) -> Result<(), CoordinatorError> {
        let mut g = self.write()?;
        if g.contains_key(&session.topic) {
            return Err(CoordinatorError::DuplicateTopic(session.topic));
        }
        g.insert(session.topic.clone(), session);
        Ok(())
    }

    pub(crate) fn remove(&self, topic: &str) -> Result<Option<Session>, CoordinatorError> {
        Ok(self.write()?.remove(topic))
    }

    pub(crate) fn replace(&self, session: Session) -> Result<(), CoordinatorError> {
        let mut g = self.write()?;
        match g.get_mut(&session.topic) {
            Some(slot) => {
                *slot = session;
                Ok(())
            }
            None => Err(CoordinatorError::SessionNotFound(session.topic)),
        }
    }

    pub fn find(&self, topic: &str) -> Result<Option<Session>, CoordinatorError> {
        Ok(self.read()?.get(topic).cloned())
    }

    pub fn contains(&self, topic: &str) -> Result<bool, CoordinatorError> {
        Ok(self.read()?.contains_key(topic))
    }

    pub fn len(&self) -> Result<usize, CoordinatorError> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, CoordinatorError> {
        Ok(self.read()?.is_empty())
    }

    pub fn all(&self) -> Result<Vec<Session>, CoordinatorError> {
        Ok(self.read()?.values().cloned().collect())
    }

    pub fn all_for_version(
        &self,
        version: ProtocolVersion,
    ) -> Result<Vec<Session>, CoordinatorError> {
        Ok(self
            .read()?
            .values()
            .filter(|s| s.protocol_version == version)
            .cloned()
            .collect())
    }

    pub fn list_sorted(&self, sort: SessionSort) -> Result<Vec<Session>, CoordinatorError> {
        let mut sessions = self.all()?;
        match sort {
            SessionSort::Newest => sessions.sort_by(|a, b| {
                b.approved_at_ms
                    .cmp(&a.approved_at_ms)
                    .then_with(|| a.topic.cmp(&b.topic))
            }),
            SessionSort::Oldest => sessions.sort_by(|a, b| {
                a.approved_at_ms
                    .cmp(&b.approved_at_ms)
                    .then_with(|| a.topic.cmp(&b.topic))
            }),
            SessionSort::PeerName => sessions.sort_by(|a, b| {
                a.peer_name
                    .to_lowercase()
                    .cmp(&b.peer_name.to_lowercase())
                    .then_with(|| a.topic.cmp(&b.topic))
            }),
        }
        Ok(sessions)
    }
}
