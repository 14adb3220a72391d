use crate::types::Thread;
use std::collections::HashSet;

/// Merge the server thread list with locally created threads the server has
/// not persisted yet. Provisional threads survive only while their run is
/// active and the server does not list them. Provisional entries come first;
/// the first occurrence of an id wins.
///
/// Because a listed provisional is filtered out before merging, a provisional
/// copy never competes with the server's copy of the same thread. The dedupe
/// only collapses ids repeated within one input list.
pub fn merge(server: &[Thread], provisional: &[Thread], active: &HashSet<String>) -> Vec<Thread> {
    let server_ids: HashSet<&str> = server.iter().map(|t| t.thread_id.as_str()).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut merged = Vec::with_capacity(server.len() + provisional.len());

    let pending = provisional.iter().filter(|thread| {
        active.contains(&thread.thread_id) && !server_ids.contains(thread.thread_id.as_str())
    });
    for thread in pending.chain(server.iter()) {
        if seen.insert(thread.thread_id.as_str()) {
            merged.push(thread.clone());
        }
    }
    merged
}

/// Provisional threads plus the most recent merged view.
#[derive(Debug, Default)]
pub struct ThreadBook {
    provisional: Vec<Thread>,
    merged: Vec<Thread>,
}

impl ThreadBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show a thread immediately, before the server knows about it.
    pub fn add_provisional(&mut self, thread: Thread) {
        self.provisional.retain(|t| t.thread_id != thread.thread_id);
        self.merged.retain(|t| t.thread_id != thread.thread_id);
        self.merged.insert(0, thread.clone());
        self.provisional.insert(0, thread);
    }

    pub fn remove(&mut self, thread_id: &str) {
        self.provisional.retain(|t| t.thread_id != thread_id);
        self.merged.retain(|t| t.thread_id != thread_id);
    }

    /// Re-run the merge against a fresh server list. Provisional threads the
    /// server now lists, or whose run ended, are dropped for good.
    pub fn reconcile(&mut self, server: &[Thread], active: &HashSet<String>) -> &[Thread] {
        let server_ids: HashSet<&str> = server.iter().map(|t| t.thread_id.as_str()).collect();
        self.provisional.retain(|t| {
            active.contains(&t.thread_id) && !server_ids.contains(t.thread_id.as_str())
        });
        self.merged = merge(server, &self.provisional, active);
        &self.merged
    }

    pub fn threads(&self) -> &[Thread] {
        &self.merged
    }

    pub fn provisional(&self) -> &[Thread] {
        &self.provisional
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ThreadStatus;

    fn thread(id: &str, status: ThreadStatus) -> Thread {
        Thread {
            status,
            ..Thread::provisional(id, None)
        }
    }

    fn ids(threads: &[Thread]) -> Vec<&str> {
        threads.iter().map(|t| t.thread_id.as_str()).collect()
    }

    fn active(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_merge_keeps_only_active_unpersisted_provisionals() {
        let server = vec![thread("s1", ThreadStatus::Idle), thread("s2", ThreadStatus::Busy)];
        let provisional = vec![
            thread("p1", ThreadStatus::Busy),
            thread("p2", ThreadStatus::Busy),
            thread("s1", ThreadStatus::Busy),
        ];

        let merged = merge(&server, &provisional, &active(&["p1", "s1"]));
        assert_eq!(ids(&merged), vec!["p1", "s1", "s2"]);
        assert_eq!(merged[1].status, ThreadStatus::Idle);
    }

    #[test]
    fn test_merge_is_idempotent_and_dedupes() {
        let server = vec![
            thread("s1", ThreadStatus::Idle),
            thread("s1", ThreadStatus::Error),
        ];
        let provisional = vec![thread("p1", ThreadStatus::Busy), thread("p1", ThreadStatus::Busy)];
        let active = active(&["p1"]);

        let once = merge(&server, &provisional, &active);
        assert_eq!(ids(&once), vec!["p1", "s1"]);
        assert_eq!(once[1].status, ThreadStatus::Idle);
        assert_eq!(merge(&once, &provisional, &active), once);
    }

    #[test]
    fn test_merge_with_empty_inputs() {
        assert!(merge(&[], &[], &HashSet::new()).is_empty());
        let provisional = vec![thread("p1", ThreadStatus::Busy)];
        assert!(merge(&[], &provisional, &HashSet::new()).is_empty());
    }

    #[test]
    fn test_thread_book_drops_provisional_once_persisted() {
        let mut book = ThreadBook::new();
        book.add_provisional(Thread::provisional("p1", Some("ping".to_string())));
        assert_eq!(ids(book.threads()), vec!["p1"]);

        let running = active(&["p1"]);
        book.reconcile(&[thread("s1", ThreadStatus::Idle)], &running);
        assert_eq!(ids(book.threads()), vec!["p1", "s1"]);

        let persisted = vec![thread("p1", ThreadStatus::Idle), thread("s1", ThreadStatus::Idle)];
        book.reconcile(&persisted, &running);
        assert!(book.provisional().is_empty());
        assert_eq!(ids(book.threads()), vec!["p1", "s1"]);
        assert_eq!(book.threads()[0].status, ThreadStatus::Idle);

        book.remove("s1");
        assert_eq!(ids(book.threads()), vec!["p1"]);
    }
}
