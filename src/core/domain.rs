use std::cmp::Ordering;
use std::sync::Arc;

use keyed_priority_queue::KeyedPriorityQueue;
use parking_lot::Mutex;

use super::state::{JobId, PrioKey, Ticks};

// KeyedPriorityQueue is a max-heap, so flip PrioKey's order to keep the most
// urgent job on top
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReadyRank(PrioKey);

impl Ord for ReadyRank {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.cmp(&self.0)
    }
}

impl PartialOrd for ReadyRank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Earliest release on top
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReleaseRank {
    release: Ticks,
    job: JobId,
}

impl Ord for ReleaseRank {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .release
            .cmp(&self.release)
            .then_with(|| other.job.cmp(&self.job))
    }
}

impl PartialOrd for ReleaseRank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
pub struct ReleaseQueue {
    pending: KeyedPriorityQueue<JobId, ReleaseRank>,
}

impl ReleaseQueue {
    fn new() -> Self {
        Self {
            pending: KeyedPriorityQueue::new(),
        }
    }

    fn insert(&mut self, job: JobId, release: Ticks) {
        let old = self.pending.push(job, ReleaseRank { release, job });
        assert!(old.is_none(), "job {job:?} already waiting for release");
    }

    fn remove(&mut self, job: JobId) -> bool {
        self.pending.remove(&job).is_some()
    }

    fn contains(&self, job: JobId) -> bool {
        self.pending.get_priority(&job).is_some()
    }

    pub fn next_release(&self) -> Option<Ticks> {
        self.pending.peek().map(|(_, rank)| rank.release)
    }

    fn take_due(&mut self, now: Ticks) -> Vec<JobId> {
        let mut due = Vec::new();
        while self.next_release().is_some_and(|release| release <= now) {
            if let Some((job, _)) = self.pending.pop() {
                due.push(job);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ReleaseHandle {
    releases: Arc<Mutex<ReleaseQueue>>,
}

impl ReleaseHandle {
    pub fn next_release(&self) -> Option<Ticks> {
        self.releases.lock().next_release()
    }

    pub fn pending(&self) -> usize {
        self.releases.lock().len()
    }
}

#[derive(Debug)]
pub struct RtDomain {
    ready: KeyedPriorityQueue<JobId, ReadyRank>,
    releases: Arc<Mutex<ReleaseQueue>>,
}

impl RtDomain {
    pub fn new() -> Self {
        Self {
            ready: KeyedPriorityQueue::new(),
            releases: Arc::new(Mutex::new(ReleaseQueue::new())),
        }
    }

    pub fn release_handle(&self) -> ReleaseHandle {
        ReleaseHandle {
            releases: Arc::clone(&self.releases),
        }
    }

    pub fn peek_ready(&self) -> Option<(JobId, PrioKey)> {
        self.ready.peek().map(|(job, rank)| (*job, rank.0))
    }

    pub fn take_ready(&mut self) -> Option<JobId> {
        self.ready.pop().map(|(job, _)| job)
    }

    pub fn insert_ready(&mut self, job: JobId, prio: PrioKey) {
        let old = self.ready.push(job, ReadyRank(prio));
        assert!(old.is_none(), "job {job:?} inserted into the ready queue twice");
    }

    pub fn insert_pending(&mut self, job: JobId, release: Ticks) {
        self.releases.lock().insert(job, release);
    }

    pub fn remove(&mut self, job: JobId) -> bool {
        if self.ready.remove(&job).is_some() {
            return true;
        }
        self.releases.lock().remove(job)
    }

    pub fn take_due(&mut self, now: Ticks) -> Vec<JobId> {
        self.releases.lock().take_due(now)
    }

    pub fn merge_released(&mut self, batch: impl IntoIterator<Item = (JobId, PrioKey)>) {
        for (job, prio) in batch {
            self.insert_ready(job, prio);
        }
    }

    // True when the job is now the ready head. Pending jobs are untouched.
    pub fn decrease_key(&mut self, job: JobId, prio: PrioKey) -> bool {
        // Hold off release merges while the ready queue is reordered.
        let _releases = self.releases.lock();
        match self.ready.get_priority(&job).copied() {
            Some(ReadyRank(old)) => {
                debug_assert!(
                    !old.higher_than(&prio),
                    "decrease_key would lower the priority of {job:?}"
                );
                if self.ready.set_priority(&job, ReadyRank(prio)).is_err() {
                    return false;
                }
                self.ready.peek().is_some_and(|(head, _)| *head == job)
            }
            None => false,
        }
    }

    pub fn rekey(&mut self, job: JobId, prio: PrioKey) -> bool {
        let _releases = self.releases.lock();
        self.ready.set_priority(&job, ReadyRank(prio)).is_ok()
    }

    pub fn contains(&self, job: JobId) -> bool {
        self.is_ready(job) || self.is_pending(job)
    }

    pub fn is_ready(&self, job: JobId) -> bool {
        self.ready.get_priority(&job).is_some()
    }

    pub fn is_pending(&self, job: JobId) -> bool {
        self.releases.lock().contains(job)
    }

    pub fn ready_prio(&self, job: JobId) -> Option<PrioKey> {
        self.ready.get_priority(&job).map(|rank| rank.0)
    }

    pub fn ready_jobs(&self) -> impl Iterator<Item = (JobId, PrioKey)> + '_ {
        self.ready.iter().map(|(job, rank)| (*job, rank.0))
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub fn pending_len(&self) -> usize {
        self.releases.lock().len()
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }
}

impl Default for RtDomain {
    fn default() -> Self {
        Self::new()
    }
}
