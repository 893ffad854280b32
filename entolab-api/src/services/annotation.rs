//! Annotation sessions
//!
//! A session holds the in-progress draft for one upload: the current box
//! set plus a bounded undo/redo history. Sessions live in memory only;
//! nothing touches the database until the draft is committed. Opening a
//! new session for an upload discards any stale one the same user left
//! behind.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use entolab_common::History;
use uuid::Uuid;

use super::reconcile::DraftDetection;

/// One open annotation session
pub struct AnnotationSession {
    pub guid: Uuid,
    pub user_guid: Uuid,
    pub case_guid: Uuid,
    pub upload_guid: Uuid,
    pub draft: Vec<DraftDetection>,
    history: History<Vec<DraftDetection>>,
    pub opened_at: DateTime<Utc>,
}

impl AnnotationSession {
    fn new(
        user_guid: Uuid,
        case_guid: Uuid,
        upload_guid: Uuid,
        baseline: Vec<DraftDetection>,
    ) -> Self {
        Self {
            guid: Uuid::new_v4(),
            user_guid,
            case_guid,
            upload_guid,
            draft: baseline,
            history: History::default(),
            opened_at: Utc::now(),
        }
    }

    /// Replace the whole draft, pushing the previous state onto the undo
    /// stack. Identical drafts are ignored so repeated saves of the same
    /// state do not pollute history.
    pub fn replace_draft(&mut self, draft: Vec<DraftDetection>) {
        if draft == self.draft {
            return;
        }
        let previous = std::mem::replace(&mut self.draft, draft);
        self.history.record(previous);
    }

    /// Step back one edit. Returns false at the bottom of the stack.
    pub fn undo(&mut self) -> bool {
        match self.history.undo(self.draft.clone()) {
            Some(previous) => {
                self.draft = previous;
                true
            }
            None => false,
        }
    }

    /// Re-apply the most recently undone edit
    pub fn redo(&mut self) -> bool {
        match self.history.redo(self.draft.clone()) {
            Some(next) => {
                self.draft = next;
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }
}

/// All open sessions, keyed by session id
#[derive(Default)]
pub struct SessionStore {
    sessions: HashMap<Uuid, AnnotationSession>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session seeded from the stored baseline. Any existing
    /// session the same user holds on the same upload is discarded.
    pub fn open(
        &mut self,
        user_guid: Uuid,
        case_guid: Uuid,
        upload_guid: Uuid,
        baseline: Vec<DraftDetection>,
    ) -> &AnnotationSession {
        self.sessions
            .retain(|_, s| !(s.user_guid == user_guid && s.upload_guid == upload_guid));

        let session = AnnotationSession::new(user_guid, case_guid, upload_guid, baseline);
        let guid = session.guid;
        self.sessions.insert(guid, session);
        &self.sessions[&guid]
    }

    /// Look up a session, enforcing that it belongs to the caller.
    /// Foreign and unknown ids are indistinguishable.
    pub fn get(&self, guid: Uuid, user_guid: Uuid) -> Option<&AnnotationSession> {
        self.sessions
            .get(&guid)
            .filter(|s| s.user_guid == user_guid)
    }

    pub fn get_mut(&mut self, guid: Uuid, user_guid: Uuid) -> Option<&mut AnnotationSession> {
        self.sessions
            .get_mut(&guid)
            .filter(|s| s.user_guid == user_guid)
    }

    /// Remove a session (commit or abandon)
    pub fn remove(&mut self, guid: Uuid, user_guid: Uuid) -> Option<AnnotationSession> {
        if self
            .sessions
            .get(&guid)
            .map(|s| s.user_guid == user_guid)
            .unwrap_or(false)
        {
            self.sessions.remove(&guid)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entolab_common::pmi::LifeStage;

    fn boxed(x: f64, stage: LifeStage) -> DraftDetection {
        DraftDetection {
            guid: None,
            x,
            y: 0.1,
            width: 0.2,
            height: 0.2,
            life_stage: stage,
            species: None,
        }
    }

    #[test]
    fn test_replace_then_undo_redo() {
        let mut store = SessionStore::new();
        let user = Uuid::new_v4();
        let guid = store.open(user, Uuid::new_v4(), Uuid::new_v4(), vec![]).guid;

        let session = store.get_mut(guid, user).unwrap();
        session.replace_draft(vec![boxed(0.1, LifeStage::Egg)]);
        session.replace_draft(vec![boxed(0.1, LifeStage::Egg), boxed(0.5, LifeStage::Pupa)]);
        assert_eq!(session.draft.len(), 2);

        assert!(session.undo());
        assert_eq!(session.draft.len(), 1);
        assert!(session.undo());
        assert!(session.draft.is_empty());
        assert!(!session.undo());

        assert!(session.redo());
        assert_eq!(session.draft.len(), 1);
        assert!(session.redo());
        assert_eq!(session.draft.len(), 2);
        assert!(!session.redo());
    }

    #[test]
    fn test_identical_draft_not_recorded() {
        let mut store = SessionStore::new();
        let user = Uuid::new_v4();
        let guid = store.open(user, Uuid::new_v4(), Uuid::new_v4(), vec![]).guid;

        let session = store.get_mut(guid, user).unwrap();
        session.replace_draft(vec![]);
        assert!(!session.can_undo());
    }

    #[test]
    fn test_reopen_replaces_stale_session() {
        let mut store = SessionStore::new();
        let user = Uuid::new_v4();
        let case = Uuid::new_v4();
        let upload = Uuid::new_v4();

        let first = store.open(user, case, upload, vec![]).guid;
        let second = store.open(user, case, upload, vec![]).guid;
        assert_ne!(first, second);
        assert_eq!(store.len(), 1);
        assert!(store.get_mut(first, user).is_none());
        assert!(store.get_mut(second, user).is_some());
    }

    #[test]
    fn test_foreign_session_invisible() {
        let mut store = SessionStore::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let guid = store.open(owner, Uuid::new_v4(), Uuid::new_v4(), vec![]).guid;

        assert!(store.get_mut(guid, other).is_none());
        assert!(store.remove(guid, other).is_none());
        assert_eq!(store.len(), 1);
        assert!(store.remove(guid, owner).is_some());
        assert!(store.is_empty());
    }
}
