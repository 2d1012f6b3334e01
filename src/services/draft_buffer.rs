//! Debounced commits of draft ratings for one member's voting session.
//!
//! Every entry has its own timer. A newer edit of the same entry supersedes the pending
//! one, and the commit always sends the latest draft at the moment it fires. Commits that
//! were already dispatched are never cancelled, and an entry has at most one commit in
//! flight: a draft that becomes due meanwhile is sent once the running commit settles.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use futures::future::{BoxFuture, join_all};
use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tracing::{debug, warn};

use crate::{
    error::ServiceError,
    state::{aggregate::Score, catalog::EntryId},
};

/// Where committed drafts go.
pub trait RatingSink: Send + Sync + 'static {
    /// Persist `score` as the member's rating of `entry_id`.
    fn commit_rating(&self, entry_id: String, score: Score) -> BoxFuture<'static, Result<(), ServiceError>>;
}

/// Indicator shown next to an entry while its draft is being saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavingStatus {
    /// Nothing to show.
    Idle,
    /// A commit is in flight.
    Saving,
    /// The last commit succeeded; cleared after a short display window.
    Saved,
    /// The last commit failed and the draft awaits a retry.
    Error,
}

/// A saving indicator change pushed to the session owner.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub entry_id: EntryId,
    pub status: SavingStatus,
    /// Unsaved draft, reported with errors so the client can offer a retry.
    pub draft: Option<Score>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Pending,
    Committing,
    Error,
}

struct EntryDraft {
    score: Score,
    generation: u64,
    phase: Phase,
    status: SavingStatus,
    timer: Option<JoinHandle<()>>,
    in_flight: bool,
    /// A newer draft came due while a commit was in flight.
    queued: bool,
}

impl EntryDraft {
    fn new(score: Score) -> Self {
        Self {
            score,
            generation: 0,
            phase: Phase::Idle,
            status: SavingStatus::Idle,
            timer: None,
            in_flight: false,
            queued: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Timer(u64),
    Flush,
    Retry,
}

struct Inner<S> {
    sink: S,
    debounce: Duration,
    saved_display: Duration,
    entries: DashMap<EntryId, EntryDraft>,
    updates: mpsc::UnboundedSender<StatusUpdate>,
}

/// Draft ratings of one member for one (party, event).
pub struct DraftSession<S> {
    inner: Arc<Inner<S>>,
}

impl<S: RatingSink> DraftSession<S> {
    /// Open a session. Status changes are delivered on the returned receiver.
    pub fn new(
        sink: S,
        debounce: Duration,
        saved_display: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (updates, receiver) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            sink,
            debounce,
            saved_display,
            entries: DashMap::new(),
            updates,
        });
        (Self { inner }, receiver)
    }

    /// Seed drafts with already stored ratings without committing them.
    pub fn load_ballot(&self, ratings: impl IntoIterator<Item = (EntryId, Score)>) {
        for (entry_id, score) in ratings {
            self.inner
                .entries
                .entry(entry_id)
                .or_insert_with(|| EntryDraft::new(score));
        }
    }

    /// Record a new draft score and (re)start the entry's debounce timer.
    pub fn set_rating(&self, entry_id: &str, score: Score) {
        let mut entry = self
            .inner
            .entries
            .entry(entry_id.to_owned())
            .or_insert_with(|| EntryDraft::new(score));

        // The timer slot only ever holds a debounce that has not fired yet.
        if let Some(timer) = entry.timer.take() {
            timer.abort();
        }
        entry.score = score;
        entry.generation += 1;
        entry.phase = Phase::Pending;

        let generation = entry.generation;
        let inner = self.inner.clone();
        let owned_id = entry_id.to_owned();
        entry.timer = Some(tokio::spawn(async move {
            sleep(inner.debounce).await;
            inner.commit(owned_id, Trigger::Timer(generation)).await;
        }));
    }

    /// Commit every pending draft now and wait for the commits to finish.
    pub async fn flush_all(&self) {
        self.run_all(Phase::Pending, Trigger::Flush).await;
    }

    /// Commit again every draft whose last commit failed.
    pub async fn retry_failed(&self) {
        self.run_all(Phase::Error, Trigger::Retry).await;
    }

    /// Tear the session down, flushing pending drafts first.
    pub async fn close(self) {
        self.flush_all().await;
    }

    /// Latest draft score of an entry.
    pub fn draft(&self, entry_id: &str) -> Option<Score> {
        self.inner.entries.get(entry_id).map(|entry| entry.score)
    }

    /// Saving indicator currently shown for an entry.
    pub fn status(&self, entry_id: &str) -> SavingStatus {
        self.inner
            .entries
            .get(entry_id)
            .map(|entry| entry.status)
            .unwrap_or(SavingStatus::Idle)
    }

    async fn run_all(&self, phase: Phase, trigger: Trigger) {
        let targets: Vec<EntryId> = self
            .inner
            .entries
            .iter()
            .filter(|entry| entry.phase == phase)
            .map(|entry| entry.key().clone())
            .collect();

        join_all(
            targets
                .into_iter()
                .map(|entry_id| self.inner.clone().commit(entry_id, trigger)),
        )
        .await;
    }
}

impl<S: RatingSink> Inner<S> {
    /// Move an eligible entry to `Committing` and hand back what to send.
    fn claim(&self, entry_id: &str, trigger: Trigger) -> Option<(u64, Score)> {
        let mut entry = self.entries.get_mut(entry_id)?;
        let eligible = match trigger {
            Trigger::Timer(generation) => {
                entry.phase == Phase::Pending && entry.generation == generation
            }
            Trigger::Flush => entry.phase == Phase::Pending,
            Trigger::Retry => entry.phase == Phase::Error,
        };
        if !eligible {
            return None;
        }

        // A timer commits from inside its own task; aborting it there would cancel the commit.
        if let Some(timer) = entry.timer.take() {
            if !matches!(trigger, Trigger::Timer(_)) {
                timer.abort();
            }
        }
        if entry.in_flight {
            entry.queued = true;
            return None;
        }
        entry.in_flight = true;
        entry.phase = Phase::Committing;
        entry.status = SavingStatus::Saving;
        Some((entry.generation, entry.score))
    }

    async fn commit(self: Arc<Self>, entry_id: EntryId, mut trigger: Trigger) {
        loop {
            let Some((generation, score)) = self.claim(&entry_id, trigger) else {
                return;
            };
            self.emit(&entry_id, SavingStatus::Saving, None, None);

            let result = self.sink.commit_rating(entry_id.clone(), score).await;

            let settled = {
                let Some(mut entry) = self.entries.get_mut(&entry_id) else {
                    return;
                };
                entry.in_flight = false;
                if entry.generation != generation {
                    let requeue = std::mem::take(&mut entry.queued);
                    debug!(entry_id = %entry_id, requeue, "draft changed while committing");
                    if !requeue {
                        // the newer draft's own timer is still running
                        return;
                    }
                    None
                } else {
                    match &result {
                        Ok(()) => {
                            entry.phase = Phase::Idle;
                            entry.status = SavingStatus::Saved;
                        }
                        Err(_) => {
                            entry.phase = Phase::Error;
                            entry.status = SavingStatus::Error;
                        }
                    }
                    Some(entry.status)
                }
            };

            let Some(status) = settled else {
                trigger = Trigger::Flush;
                continue;
            };

            match result {
                Ok(()) => {
                    self.emit(&entry_id, status, None, None);
                    self.schedule_clear(entry_id, generation);
                }
                Err(err) => {
                    warn!(entry_id = %entry_id, error = %err, "failed to commit draft rating");
                    self.emit(&entry_id, status, Some(score), Some(err.to_string()));
                }
            }
            return;
        }
    }

    /// Drop the "saved" indicator after the display window unless the entry moved on.
    fn schedule_clear(self: Arc<Self>, entry_id: EntryId, generation: u64) {
        tokio::spawn(async move {
            sleep(self.saved_display).await;
            let cleared = match self.entries.get_mut(&entry_id) {
                Some(mut entry)
                    if entry.generation == generation && entry.status == SavingStatus::Saved =>
                {
                    entry.status = SavingStatus::Idle;
                    true
                }
                _ => false,
            };
            if cleared {
                self.emit(&entry_id, SavingStatus::Idle, None, None);
            }
        });
    }

    fn emit(&self, entry_id: &str, status: SavingStatus, draft: Option<Score>, message: Option<String>) {
        let _ = self.updates.send(StatusUpdate {
            entry_id: entry_id.to_owned(),
            status,
            draft,
            message,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    use tokio::time::advance;

    use super::*;

    const DEBOUNCE: Duration = Duration::from_millis(500);
    const SAVED_DISPLAY: Duration = Duration::from_millis(1_500);

    #[derive(Clone, Default)]
    struct RecordingSink {
        commits: Arc<Mutex<Vec<(String, u8)>>>,
        failing: Arc<AtomicBool>,
        calls: Arc<AtomicUsize>,
        first_call_delay: Option<Duration>,
    }

    impl RecordingSink {
        fn slow_first(delay: Duration) -> Self {
            Self {
                first_call_delay: Some(delay),
                ..Self::default()
            }
        }

        fn commits(&self) -> Vec<(String, u8)> {
            self.commits.lock().unwrap().clone()
        }
    }

    impl RatingSink for RecordingSink {
        fn commit_rating(
            &self,
            entry_id: String,
            score: Score,
        ) -> BoxFuture<'static, Result<(), ServiceError>> {
            let sink = self.clone();
            let first = sink.calls.fetch_add(1, Ordering::SeqCst) == 0;
            Box::pin(async move {
                if let (true, Some(delay)) = (first, sink.first_call_delay) {
                    sleep(delay).await;
                }
                if sink.failing.load(Ordering::SeqCst) {
                    return Err(ServiceError::Degraded);
                }
                sink.commits.lock().unwrap().push((entry_id, score.get()));
                Ok(())
            })
        }
    }

    fn score(value: i64) -> Score {
        Score::new(value).unwrap()
    }

    /// Let spawned tasks run up to their next timer.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_edits_coalesce_into_one_commit_with_the_latest_score() {
        let sink = RecordingSink::default();
        let (session, _updates) = DraftSession::new(sink.clone(), DEBOUNCE, SAVED_DISPLAY);

        session.set_rating("dt1-1", score(3));
        settle().await;
        advance(Duration::from_millis(200)).await;
        session.set_rating("dt1-1", score(6));
        settle().await;
        advance(Duration::from_millis(200)).await;
        session.set_rating("dt1-1", score(9));
        settle().await;
        assert!(sink.commits().is_empty());

        advance(DEBOUNCE).await;
        settle().await;

        assert_eq!(sink.commits(), vec![("dt1-1".to_string(), 9)]);
        assert_eq!(session.status("dt1-1"), SavingStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_have_independent_timers() {
        let sink = RecordingSink::default();
        let (session, _updates) = DraftSession::new(sink.clone(), DEBOUNCE, SAVED_DISPLAY);

        session.set_rating("dt1-1", score(5));
        settle().await;
        advance(Duration::from_millis(300)).await;
        session.set_rating("dt1-2", score(7));
        settle().await;
        advance(Duration::from_millis(250)).await;
        settle().await;

        assert_eq!(sink.commits(), vec![("dt1-1".to_string(), 5)]);

        advance(Duration::from_millis(300)).await;
        settle().await;
        assert_eq!(sink.commits().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_flushes_pending_drafts_immediately() {
        let sink = RecordingSink::default();
        let (session, _updates) = DraftSession::new(sink.clone(), DEBOUNCE, SAVED_DISPLAY);

        session.set_rating("dt1-1", score(4));
        session.set_rating("dt1-2", score(8));
        session.close().await;

        let mut commits = sink.commits();
        commits.sort();
        assert_eq!(
            commits,
            vec![("dt1-1".to_string(), 4), ("dt1-2".to_string(), 8)]
        );

        advance(DEBOUNCE * 2).await;
        settle().await;
        assert_eq!(sink.commits().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn status_goes_saving_saved_then_clears() {
        let sink = RecordingSink::default();
        let (session, mut updates) = DraftSession::new(sink, DEBOUNCE, SAVED_DISPLAY);

        session.set_rating("dt1-1", score(5));
        settle().await;
        advance(DEBOUNCE).await;
        settle().await;
        advance(SAVED_DISPLAY).await;
        settle().await;

        let mut statuses = Vec::new();
        while let Ok(update) = updates.try_recv() {
            statuses.push(update.status);
        }
        assert_eq!(
            statuses,
            vec![SavingStatus::Saving, SavingStatus::Saved, SavingStatus::Idle]
        );
        assert_eq!(session.status("dt1-1"), SavingStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_commits_keep_the_draft_for_retry() {
        let sink = RecordingSink::default();
        sink.failing.store(true, Ordering::SeqCst);
        let (session, mut updates) = DraftSession::new(sink.clone(), DEBOUNCE, SAVED_DISPLAY);

        session.set_rating("dt1-1", score(7));
        settle().await;
        advance(DEBOUNCE).await;
        settle().await;

        assert_eq!(session.status("dt1-1"), SavingStatus::Error);
        assert_eq!(session.draft("dt1-1"), Some(score(7)));
        let last = std::iter::from_fn(|| updates.try_recv().ok()).last().unwrap();
        assert_eq!(last.status, SavingStatus::Error);
        assert_eq!(last.draft, Some(score(7)));

        sink.failing.store(false, Ordering::SeqCst);
        session.retry_failed().await;

        assert_eq!(sink.commits(), vec![("dt1-1".to_string(), 7)]);
        assert_eq!(session.status("dt1-1"), SavingStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn edits_during_a_slow_commit_are_stored_after_it() {
        let sink = RecordingSink::slow_first(Duration::from_secs(2));
        let (session, mut updates) = DraftSession::new(sink.clone(), DEBOUNCE, SAVED_DISPLAY);

        session.set_rating("dt1-1", score(5));
        settle().await;
        advance(DEBOUNCE).await;
        settle().await;
        assert_eq!(session.status("dt1-1"), SavingStatus::Saving);

        session.set_rating("dt1-1", score(8));
        settle().await;
        advance(DEBOUNCE).await;
        settle().await;
        // the second draft is due but waits for the first commit
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);

        advance(Duration::from_secs(2)).await;
        settle().await;

        assert_eq!(
            sink.commits(),
            vec![("dt1-1".to_string(), 5), ("dt1-1".to_string(), 8)]
        );
        assert_eq!(session.draft("dt1-1"), Some(score(8)));
        assert_eq!(session.status("dt1-1"), SavingStatus::Saved);
        let saved: Vec<_> = std::iter::from_fn(|| updates.try_recv().ok())
            .filter(|update| update.status == SavingStatus::Saved)
            .collect();
        assert_eq!(saved.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn flushing_during_a_commit_sends_the_newer_draft_afterwards() {
        let sink = RecordingSink::slow_first(Duration::from_secs(1));
        let (session, _updates) = DraftSession::new(sink.clone(), DEBOUNCE, SAVED_DISPLAY);

        session.set_rating("dt1-1", score(2));
        settle().await;
        advance(DEBOUNCE).await;
        settle().await;
        session.set_rating("dt1-1", score(10));
        session.flush_all().await;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);

        advance(Duration::from_secs(1)).await;
        settle().await;

        assert_eq!(
            sink.commits(),
            vec![("dt1-1".to_string(), 2), ("dt1-1".to_string(), 10)]
        );
        assert_eq!(session.status("dt1-1"), SavingStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn loaded_ballots_are_not_recommitted() {
        let sink = RecordingSink::default();
        let (session, _updates) = DraftSession::new(sink.clone(), DEBOUNCE, SAVED_DISPLAY);

        session.load_ballot([("dt1-1".to_string(), score(6))]);
        session.flush_all().await;

        assert!(sink.commits().is_empty());
        assert_eq!(session.draft("dt1-1"), Some(score(6)));
    }
}
