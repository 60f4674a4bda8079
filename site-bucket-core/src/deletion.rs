//! Session-scoped confirmation policy for deleting remote files that no longer
//! exist locally.
//!
//! A [`DeletionSession`] lives for exactly one run. While it is `Undecided` every
//! candidate is put to the [`DecisionSource`]; a "delete all" or "keep all" answer
//! is sticky and silences further prompts.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::contract::{DecisionSource, DeletionChoice};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeletionDecision {
    #[default]
    #[serde(alias = "prompt")]
    Undecided,
    DeleteAll,
    KeepAll,
}

#[derive(Debug)]
pub struct DeletionSession {
    decision: DeletionDecision,
}

impl DeletionSession {
    /// Start a session; `initial` is `Undecided` unless the caller overrides it.
    pub fn new(initial: DeletionDecision) -> Self {
        Self { decision: initial }
    }

    pub fn decision(&self) -> DeletionDecision {
        self.decision
    }

    /// Decide whether `candidate` should be removed from the bucket.
    ///
    /// A failing decision source ends prompting for the rest of the run and keeps
    /// the candidate; nothing is deleted without an explicit answer.
    pub async fn should_delete<D>(&mut self, candidate: &str, source: &D) -> bool
    where
        D: DecisionSource + ?Sized,
    {
        match self.decision {
            DeletionDecision::DeleteAll => return true,
            DeletionDecision::KeepAll => return false,
            DeletionDecision::Undecided => {}
        }

        match source.choose(candidate).await {
            Ok(DeletionChoice::DeleteOne) => {
                debug!(key = %candidate, "[DELETE] Delete this one");
                true
            }
            Ok(DeletionChoice::KeepOne) => {
                debug!(key = %candidate, "[DELETE] Keep this one");
                false
            }
            Ok(DeletionChoice::DeleteAll) => {
                info!(key = %candidate, "[DELETE] Deleting all remaining candidates");
                self.decision = DeletionDecision::DeleteAll;
                true
            }
            Ok(DeletionChoice::KeepAll) => {
                info!(key = %candidate, "[DELETE] Keeping all remaining candidates");
                self.decision = DeletionDecision::KeepAll;
                false
            }
            Err(e) => {
                warn!(key = %candidate, error = %e, "[DELETE] No decision available, keeping remaining files");
                self.decision = DeletionDecision::KeepAll;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{DecisionError, MockDecisionSource};

    #[tokio::test]
    async fn one_off_answers_leave_session_undecided() {
        let mut source = MockDecisionSource::new();
        let mut answers = vec![DeletionChoice::KeepOne, DeletionChoice::DeleteOne].into_iter();
        source
            .expect_choose()
            .times(2)
            .returning(move |_| Ok(answers.next().unwrap()));

        let mut session = DeletionSession::new(DeletionDecision::Undecided);
        assert!(!session.should_delete("a.html", &source).await);
        assert_eq!(session.decision(), DeletionDecision::Undecided);
        assert!(session.should_delete("b.html", &source).await);
        assert_eq!(session.decision(), DeletionDecision::Undecided);
    }

    #[tokio::test]
    async fn delete_all_is_sticky() {
        let mut source = MockDecisionSource::new();
        source
            .expect_choose()
            .times(1)
            .returning(|_| Ok(DeletionChoice::DeleteAll));

        let mut session = DeletionSession::new(DeletionDecision::Undecided);
        for key in ["a.html", "b.html", "c.html"] {
            assert!(session.should_delete(key, &source).await);
        }
        assert_eq!(session.decision(), DeletionDecision::DeleteAll);
    }

    #[tokio::test]
    async fn keep_all_is_sticky_after_earlier_one_off_answers() {
        let mut source = MockDecisionSource::new();
        let mut answers = vec![DeletionChoice::DeleteOne, DeletionChoice::KeepAll].into_iter();
        source
            .expect_choose()
            .times(2)
            .returning(move |_| Ok(answers.next().unwrap()));

        let mut session = DeletionSession::new(DeletionDecision::Undecided);
        assert!(session.should_delete("a.html", &source).await);
        assert!(!session.should_delete("b.html", &source).await);
        assert!(!session.should_delete("c.html", &source).await);
        assert!(!session.should_delete("d.html", &source).await);
    }

    #[tokio::test]
    async fn overridden_session_never_prompts() {
        let mut source = MockDecisionSource::new();
        source.expect_choose().never();

        let mut deleting = DeletionSession::new(DeletionDecision::DeleteAll);
        assert!(deleting.should_delete("a.html", &source).await);

        let mut keeping = DeletionSession::new(DeletionDecision::KeepAll);
        assert!(!keeping.should_delete("a.html", &source).await);
    }

    #[tokio::test]
    async fn closed_source_keeps_everything() {
        let mut source = MockDecisionSource::new();
        source
            .expect_choose()
            .times(1)
            .returning(|_| Err(DecisionError::Closed));

        let mut session = DeletionSession::new(DeletionDecision::Undecided);
        assert!(!session.should_delete("a.html", &source).await);
        assert!(!session.should_delete("b.html", &source).await);
        assert_eq!(session.decision(), DeletionDecision::KeepAll);
    }
}
