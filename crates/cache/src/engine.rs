//! Background sync engine
//!
//! Runs one worker thread per started account. Each cycle drains the
//! account's offline action queue in FIFO order, then refreshes any cached
//! resource whose freshness cursor has aged past the TTL. Cycle errors are
//! logged and never tear down the worker; the next tick retries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use log::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::RemoteError;
use crate::manager::CacheManager;
use crate::models::{ActionKind, QueuedAction, Resource, SyncState};
use crate::remote::{
    EmailPatch, RemoteClient, TimeWindow, normalize_contact, normalize_email, normalize_event,
    normalize_folder,
};
use crate::storage::{ActionFate, EmailFilter, PartitionStore};

/// Days of history included in an event refresh window
const EVENT_WINDOW_PAST_DAYS: i64 = 7;
/// Days of future included in an event refresh window
const EVENT_WINDOW_FUTURE_DAYS: i64 = 30;

/// Why a blocked worker woke up
enum Wake {
    Tick,
    Shutdown,
}

#[derive(Default)]
struct SignalState {
    online: bool,
    shutdown: bool,
    /// Bumped on every explicit wake so sleepers can tell a new wake from
    /// the one they already consumed
    wake_epoch: u64,
}

/// Shared connectivity flag and wakeup channel for all workers
struct Signal {
    state: Mutex<SignalState>,
    condvar: Condvar,
}

impl Signal {
    fn new(online: bool) -> Self {
        Self {
            state: Mutex::new(SignalState {
                online,
                ..Default::default()
            }),
            condvar: Condvar::new(),
        }
    }

    fn is_online(&self) -> bool {
        self.state.lock().unwrap().online
    }

    fn is_shutdown(&self) -> bool {
        self.state.lock().unwrap().shutdown
    }

    fn set_online(&self, online: bool) {
        let mut state = self.state.lock().unwrap();
        let was_online = state.online;
        state.online = online;
        if online && !was_online {
            // Regaining connectivity kicks every worker immediately
            state.wake_epoch += 1;
            self.condvar.notify_all();
        }
    }

    fn wake_all(&self) {
        let mut state = self.state.lock().unwrap();
        state.wake_epoch += 1;
        self.condvar.notify_all();
    }

    fn shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        state.shutdown = true;
        self.condvar.notify_all();
    }

    /// Block until the interval elapses, an explicit wake arrives, or
    /// shutdown is requested
    fn wait_for_tick(&self, interval: Duration) -> Wake {
        let deadline = Instant::now() + interval;
        let mut state = self.state.lock().unwrap();
        let seen_epoch = state.wake_epoch;
        loop {
            if state.shutdown {
                return Wake::Shutdown;
            }
            if state.wake_epoch != seen_epoch {
                return Wake::Tick;
            }
            let now = Instant::now();
            if now >= deadline {
                return Wake::Tick;
            }
            let (next, _) = self.condvar.wait_timeout(state, deadline - now).unwrap();
            state = next;
        }
    }
}

/// Outcome of draining one account's offline queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub replayed: usize,
    pub dropped: usize,
    /// A retryable failure stopped the drain with actions still queued
    pub stalled: bool,
}

/// Outcome of one full sync cycle for an account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub drain: DrainStats,
    pub resources_refreshed: usize,
}

/// Drives periodic drain-and-refresh cycles for connected accounts
pub struct SyncEngine {
    manager: Arc<CacheManager>,
    remote: Arc<dyn RemoteClient>,
    config: CacheConfig,
    signal: Arc<Signal>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    /// Per-account drain serialization so a manual drain never interleaves
    /// with a worker's
    drain_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    stopped: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        manager: Arc<CacheManager>,
        remote: Arc<dyn RemoteClient>,
        config: CacheConfig,
    ) -> Self {
        Self {
            manager,
            remote,
            config,
            signal: Arc::new(Signal::new(true)),
            handles: Mutex::new(Vec::new()),
            drain_locks: Mutex::new(HashMap::new()),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn is_online(&self) -> bool {
        self.signal.is_online()
    }

    /// Flip the connectivity flag. Coming back online wakes every worker so
    /// queued actions replay without waiting out the interval.
    pub fn set_online(&self, online: bool) {
        info!("Connectivity changed: online={online}");
        self.signal.set_online(online);
    }

    /// Wake all workers for an immediate cycle
    pub fn sync_now(&self) {
        self.signal.wake_all();
    }

    /// Spawn the background worker for one account
    pub fn start_account(&self, account_id: &str) {
        let account_id = account_id.to_string();
        let manager = Arc::clone(&self.manager);
        let remote = Arc::clone(&self.remote);
        let config = self.config.clone();
        let signal = Arc::clone(&self.signal);
        let drain_lock = self.drain_lock(&account_id);

        let handle = std::thread::Builder::new()
            .name(format!("sync-{account_id}"))
            .spawn(move || {
                info!("Sync worker started for {account_id}");
                loop {
                    if signal.is_shutdown() {
                        break;
                    }
                    if signal.is_online() {
                        match run_cycle(
                            &manager,
                            remote.as_ref(),
                            &config,
                            &signal,
                            &account_id,
                            &drain_lock,
                        ) {
                            Ok(stats) => debug!(
                                "Cycle for {account_id}: {} replayed, {} dropped, {} refreshed",
                                stats.drain.replayed, stats.drain.dropped, stats.resources_refreshed
                            ),
                            Err(err) => warn!("Sync cycle failed for {account_id}: {err:#}"),
                        }
                    }
                    if let Wake::Shutdown = signal.wait_for_tick(config.sync_interval()) {
                        break;
                    }
                }
                info!("Sync worker stopped for {account_id}");
            })
            .expect("failed to spawn sync worker");

        self.handles.lock().unwrap().push(handle);
    }

    /// Run one synchronous cycle for an account on the calling thread
    pub fn sync_account(&self, account_id: &str) -> Result<CycleStats> {
        let drain_lock = self.drain_lock(account_id);
        run_cycle(
            &self.manager,
            self.remote.as_ref(),
            &self.config,
            &self.signal,
            account_id,
            &drain_lock,
        )
    }

    /// Drain one account's offline queue on the calling thread
    pub fn drain_account(&self, account_id: &str) -> Result<DrainStats> {
        let store = self.manager.partition(account_id)?;
        let drain_lock = self.drain_lock(account_id);
        let _guard = drain_lock.lock().unwrap();
        drain_queue(
            store.as_ref(),
            self.remote.as_ref(),
            &self.signal,
            self.config.max_action_attempts,
        )
    }

    /// Signal shutdown and join every worker. Idempotent; workers finish
    /// their in-flight queue item before exiting.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Stopping sync engine");
        self.signal.shutdown();
        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        for handle in handles {
            if handle.join().is_err() {
                warn!("Sync worker panicked during shutdown");
            }
        }
    }

    fn drain_lock(&self, account_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.drain_locks.lock().unwrap();
        Arc::clone(locks.entry(account_id.to_string()).or_default())
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_cycle(
    manager: &CacheManager,
    remote: &dyn RemoteClient,
    config: &CacheConfig,
    signal: &Signal,
    account_id: &str,
    drain_lock: &Mutex<()>,
) -> Result<CycleStats> {
    let store = manager.partition(account_id)?;

    let drain = {
        let _guard = drain_lock.lock().unwrap();
        drain_queue(store.as_ref(), remote, signal, config.max_action_attempts)?
    };

    // A stalled drain means the remote is unreachable; skip the refresh and
    // let the next tick try again.
    if drain.stalled || signal.is_shutdown() {
        return Ok(CycleStats {
            drain,
            resources_refreshed: 0,
        });
    }

    let resources_refreshed = refresh_resources(store.as_ref(), remote, config, account_id)?;

    Ok(CycleStats {
        drain,
        resources_refreshed,
    })
}

/// Replay queued actions head-first until the queue is empty, a retryable
/// failure stalls it, or shutdown is requested
fn drain_queue(
    store: &dyn PartitionStore,
    remote: &dyn RemoteClient,
    signal: &Signal,
    max_attempts: u32,
) -> Result<DrainStats> {
    let mut stats = DrainStats::default();

    while let Some(queued) = store.peek_action()? {
        if signal.is_shutdown() {
            stats.stalled = true;
            break;
        }

        match replay_action(remote, &queued) {
            Ok(()) => {
                store.ack_action(queued.id)?;
                stats.replayed += 1;
            }
            Err(err) if err.is_retryable() => {
                let fate = store.fail_action(queued.id, &err.to_string(), false, max_attempts)?;
                match fate {
                    ActionFate::Retained => {
                        // Head stays put; draining past it would reorder
                        debug!("Replay of action {} stalled: {err}", queued.id);
                        stats.stalled = true;
                        break;
                    }
                    ActionFate::Dropped => {
                        warn!(
                            "Dropping action {} after {} attempts: {err}",
                            queued.id,
                            queued.attempts + 1
                        );
                        stats.dropped += 1;
                    }
                }
            }
            Err(err) => {
                // Terminal rejection; retrying can never succeed
                store.fail_action(queued.id, &err.to_string(), true, max_attempts)?;
                warn!("Dropping rejected action {}: {err}", queued.id);
                stats.dropped += 1;
            }
        }
    }

    Ok(stats)
}

/// Apply one queued action against the remote provider
fn replay_action(remote: &dyn RemoteClient, queued: &QueuedAction) -> Result<(), RemoteError> {
    let target = &queued.action.target;
    let patch = match &queued.action.kind {
        ActionKind::MarkRead => EmailPatch {
            unread: Some(false),
            ..Default::default()
        },
        ActionKind::MarkUnread => EmailPatch {
            unread: Some(true),
            ..Default::default()
        },
        ActionKind::Star => EmailPatch {
            starred: Some(true),
            ..Default::default()
        },
        ActionKind::Unstar => EmailPatch {
            starred: Some(false),
            ..Default::default()
        },
        ActionKind::Move { destination } => EmailPatch {
            folder_id: Some(destination.clone()),
            ..Default::default()
        },
        ActionKind::Delete => return remote.delete_email(target),
    };
    remote.update_email(target, &patch)
}

/// Re-fetch every resource whose cursor has aged past the TTL
fn refresh_resources(
    store: &dyn PartitionStore,
    remote: &dyn RemoteClient,
    config: &CacheConfig,
    account_id: &str,
) -> Result<usize> {
    let mut state = store
        .get_sync_state()?
        .unwrap_or_else(|| SyncState::new(account_id));

    let mut attempted = 0;
    let mut refreshed = 0;
    for resource in Resource::ALL {
        if state.is_fresh(resource, config.cache_ttl_secs) {
            continue;
        }
        attempted += 1;
        match refresh_one(store, remote, config, &mut state, resource) {
            Ok(()) => refreshed += 1,
            Err(err) => {
                // Leave the cursor stale so the next cycle retries this
                // resource, but keep going with the rest.
                warn!("Refresh of {resource:?} failed for {account_id}: {err}");
            }
        }
    }

    // A cycle that attempted refreshes and landed none of them was not a
    // successful sync; leave last_sync_at where it was.
    if attempted == 0 || refreshed > 0 {
        state.mark_cycle_complete();
    }
    store.save_sync_state(state)?;
    Ok(refreshed)
}

fn refresh_one(
    store: &dyn PartitionStore,
    remote: &dyn RemoteClient,
    config: &CacheConfig,
    state: &mut SyncState,
    resource: Resource,
) -> Result<()> {
    match resource {
        Resource::Folders => {
            for folder in remote.fetch_folders()? {
                store.put_folder(normalize_folder(folder))?;
            }
            state.mark_refreshed(resource, None);
        }
        Resource::Emails => {
            let cursor = state.cursor(resource).remote_cursor.clone();
            let page = remote.fetch_emails(&EmailFilter::default(), cursor.as_deref())?;
            for email in page.items {
                store.put_email(normalize_email(email))?;
            }
            state.mark_refreshed(resource, page.next_cursor);
        }
        Resource::Events => {
            let window = TimeWindow {
                start: Utc::now() - chrono::Duration::days(EVENT_WINDOW_PAST_DAYS),
                end: Utc::now() + chrono::Duration::days(EVENT_WINDOW_FUTURE_DAYS),
            };
            for calendar_id in &config.calendars {
                let page = remote.fetch_events(calendar_id, &window, None)?;
                for event in page.items {
                    store.put_event(normalize_event(event))?;
                }
            }
            state.mark_refreshed(resource, None);
        }
        Resource::Contacts => {
            let cursor = state.cursor(resource).remote_cursor.clone();
            let page = remote.fetch_contacts(cursor.as_deref())?;
            for contact in page.items {
                store.put_contact(normalize_contact(contact))?;
            }
            state.mark_refreshed(resource, page.next_cursor);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmailId, EventId, OfflineAction};
    use crate::remote::{
        Page, RemoteContact, RemoteEmail, RemoteEvent, RemoteFolder, RemoteResult, StubRemote,
    };
    use std::sync::mpsc;

    /// Remote whose email mutations block inside the call until released,
    /// reporting entry on a channel
    struct GatedRemote {
        entered: mpsc::Sender<()>,
        gate: Arc<(Mutex<bool>, Condvar)>,
    }

    impl GatedRemote {
        fn new() -> (Self, mpsc::Receiver<()>, Arc<(Mutex<bool>, Condvar)>) {
            let (entered, entries) = mpsc::channel();
            let gate = Arc::new((Mutex::new(false), Condvar::new()));
            let remote = Self {
                entered,
                gate: Arc::clone(&gate),
            };
            (remote, entries, gate)
        }

        fn block_until_released(&self) {
            let _ = self.entered.send(());
            let (lock, condvar) = &*self.gate;
            let mut released = lock.lock().unwrap();
            while !*released {
                released = condvar.wait(released).unwrap();
            }
        }
    }

    impl RemoteClient for GatedRemote {
        fn fetch_folders(&self) -> RemoteResult<Vec<RemoteFolder>> {
            Ok(Vec::new())
        }

        fn fetch_emails(
            &self,
            _filter: &EmailFilter,
            _cursor: Option<&str>,
        ) -> RemoteResult<Page<RemoteEmail>> {
            Ok(Page::new(Vec::new(), None))
        }

        fn fetch_email(&self, id: &EmailId) -> RemoteResult<RemoteEmail> {
            Err(RemoteError::not_found(format!("no message {}", id.as_str())))
        }

        fn update_email(&self, _id: &EmailId, _patch: &EmailPatch) -> RemoteResult<()> {
            self.block_until_released();
            Ok(())
        }

        fn delete_email(&self, _id: &EmailId) -> RemoteResult<()> {
            self.block_until_released();
            Ok(())
        }

        fn fetch_events(
            &self,
            _calendar_id: &str,
            _window: &TimeWindow,
            _cursor: Option<&str>,
        ) -> RemoteResult<Page<RemoteEvent>> {
            Ok(Page::new(Vec::new(), None))
        }

        fn create_event(&self, event: &RemoteEvent) -> RemoteResult<RemoteEvent> {
            Ok(event.clone())
        }

        fn update_event(&self, event: &RemoteEvent) -> RemoteResult<RemoteEvent> {
            Ok(event.clone())
        }

        fn delete_event(&self, _calendar_id: &str, _id: &EventId) -> RemoteResult<()> {
            Ok(())
        }

        fn fetch_contacts(&self, _cursor: Option<&str>) -> RemoteResult<Page<RemoteContact>> {
            Ok(Page::new(Vec::new(), None))
        }
    }

    fn remote_email(id: &str) -> RemoteEmail {
        RemoteEmail {
            id: id.to_string(),
            thread_id: "t1".to_string(),
            folder_id: "INBOX".to_string(),
            subject: "Hello".to_string(),
            snippet: String::new(),
            from: "sender@example.com".to_string(),
            to: vec![],
            timestamp_ms: 1_700_000_000_000,
            unread: true,
            starred: false,
            has_attachments: false,
        }
    }

    fn engine_with(remote: StubRemote) -> SyncEngine {
        SyncEngine::new(
            Arc::new(CacheManager::in_memory()),
            Arc::new(remote),
            CacheConfig::default(),
        )
    }

    #[test]
    fn test_drain_replays_in_order_and_acks() {
        let engine = engine_with(StubRemote::with_emails(vec![remote_email("m1")]));
        let store = engine.manager.partition("acct").unwrap();
        store
            .enqueue_action(OfflineAction::new(ActionKind::MarkRead, EmailId::new("m1")))
            .unwrap();
        store
            .enqueue_action(OfflineAction::new(ActionKind::Star, EmailId::new("m1")))
            .unwrap();

        let stats = engine.drain_account("acct").unwrap();

        assert_eq!(stats.replayed, 2);
        assert_eq!(stats.dropped, 0);
        assert!(!stats.stalled);
        assert_eq!(store.queue_len().unwrap(), 0);
    }

    #[test]
    fn test_retryable_failure_stalls_drain() {
        let remote = StubRemote::new();
        remote.fail_with(RemoteError::connectivity("offline"));
        let engine = engine_with(remote);
        let store = engine.manager.partition("acct").unwrap();
        store
            .enqueue_action(OfflineAction::new(ActionKind::Star, EmailId::new("m1")))
            .unwrap();

        let stats = engine.drain_account("acct").unwrap();

        assert!(stats.stalled);
        assert_eq!(stats.replayed, 0);
        assert_eq!(store.queue_len().unwrap(), 1);
        let head = store.peek_action().unwrap().unwrap();
        assert_eq!(head.attempts, 1);
    }

    #[test]
    fn test_attempt_ceiling_drops_action() {
        let remote = StubRemote::new();
        remote.fail_with(RemoteError::connectivity("offline"));
        let engine = engine_with(remote);
        let store = engine.manager.partition("acct").unwrap();
        store
            .enqueue_action(OfflineAction::new(ActionKind::Star, EmailId::new("m1")))
            .unwrap();

        // Each drain stalls after one failed attempt; the third drops it.
        engine.drain_account("acct").unwrap();
        engine.drain_account("acct").unwrap();
        let stats = engine.drain_account("acct").unwrap();

        assert_eq!(stats.dropped, 1);
        assert_eq!(store.queue_len().unwrap(), 0);
    }

    #[test]
    fn test_terminal_rejection_drops_without_retry() {
        let remote = StubRemote::new();
        remote.fail_with(RemoteError::not_found("no such message"));
        let engine = engine_with(remote);
        let store = engine.manager.partition("acct").unwrap();
        store
            .enqueue_action(OfflineAction::new(ActionKind::Delete, EmailId::new("gone")))
            .unwrap();

        let stats = engine.drain_account("acct").unwrap();

        assert_eq!(stats.dropped, 1);
        assert!(!stats.stalled);
        assert_eq!(store.queue_len().unwrap(), 0);
    }

    #[test]
    fn test_cycle_refreshes_stale_resources() {
        let engine = engine_with(StubRemote::with_emails(vec![remote_email("m1")]));
        let store = engine.manager.partition("acct").unwrap();

        let stats = engine.sync_account("acct").unwrap();

        assert_eq!(stats.resources_refreshed, 4);
        assert_eq!(store.list_emails(&EmailFilter::default()).unwrap().len(), 1);
        let state = store.get_sync_state().unwrap().unwrap();
        assert!(state.last_sync_at.is_some());
        assert!(state.is_fresh(Resource::Emails, 300));
    }

    #[test]
    fn test_fresh_resources_are_skipped() {
        let engine = engine_with(StubRemote::with_emails(vec![remote_email("m1")]));
        engine.sync_account("acct").unwrap();
        let stats = engine.sync_account("acct").unwrap();
        assert_eq!(stats.resources_refreshed, 0);
    }

    #[test]
    fn test_stalled_drain_skips_refresh() {
        let remote = StubRemote::new();
        remote.fail_with(RemoteError::connectivity("offline"));
        let engine = engine_with(remote);
        let store = engine.manager.partition("acct").unwrap();
        store
            .enqueue_action(OfflineAction::new(ActionKind::Star, EmailId::new("m1")))
            .unwrap();

        let stats = engine.sync_account("acct").unwrap();

        assert!(stats.drain.stalled);
        assert_eq!(stats.resources_refreshed, 0);
    }

    #[test]
    fn test_wholly_failed_refresh_leaves_last_sync_unset() {
        let remote = StubRemote::new();
        remote.fail_with(RemoteError::connectivity("down"));
        let engine = engine_with(remote);
        let store = engine.manager.partition("acct").unwrap();

        let stats = engine.sync_account("acct").unwrap();

        assert_eq!(stats.resources_refreshed, 0);
        let state = store.get_sync_state().unwrap().unwrap();
        assert!(state.last_sync_at.is_none());
    }

    #[test]
    fn test_stop_mid_drain_halts_between_items() {
        let manager = Arc::new(CacheManager::in_memory());
        let store = manager.partition("acct").unwrap();
        for id in ["m1", "m2", "m3"] {
            store
                .enqueue_action(OfflineAction::new(ActionKind::MarkRead, EmailId::new(id)))
                .unwrap();
        }

        let (remote, entries, gate) = GatedRemote::new();
        let mut config = CacheConfig::default();
        config.sync_interval_secs = 3600;
        let engine = Arc::new(SyncEngine::new(Arc::clone(&manager), Arc::new(remote), config));

        engine.start_account("acct");

        // The first replay is now blocked inside the remote call
        entries
            .recv_timeout(Duration::from_secs(5))
            .expect("worker never reached the remote");

        let stop_done = Arc::new(AtomicBool::new(false));
        let stopper = Arc::clone(&engine);
        let done_flag = Arc::clone(&stop_done);
        let stop_thread = std::thread::spawn(move || {
            stopper.stop();
            done_flag.store(true, Ordering::SeqCst);
        });

        // stop() blocks until the worker exits, and the worker is still
        // inside its in-flight call
        std::thread::sleep(Duration::from_millis(100));
        assert!(!stop_done.load(Ordering::SeqCst));

        // Release the call; the worker finishes and acks the in-flight item,
        // then observes shutdown between items and exits
        let (lock, condvar) = &*gate;
        *lock.lock().unwrap() = true;
        condvar.notify_all();
        stop_thread.join().unwrap();
        assert!(stop_done.load(Ordering::SeqCst));

        // The remaining actions were left untouched, head intact
        assert_eq!(store.queue_len().unwrap(), 2);
        let head = store.peek_action().unwrap().unwrap();
        assert_eq!(head.action.target, EmailId::new("m2"));
        assert_eq!(head.attempts, 0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let engine = engine_with(StubRemote::new());
        engine.start_account("acct");
        engine.stop();
        engine.stop();
    }

    #[test]
    fn test_wait_for_tick_returns_on_shutdown() {
        let signal = Arc::new(Signal::new(true));
        let waiter = Arc::clone(&signal);
        let handle = std::thread::spawn(move || {
            matches!(waiter.wait_for_tick(Duration::from_secs(60)), Wake::Shutdown)
        });
        std::thread::sleep(Duration::from_millis(50));
        signal.shutdown();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_coming_online_wakes_waiters() {
        let signal = Arc::new(Signal::new(false));
        let waiter = Arc::clone(&signal);
        let handle = std::thread::spawn(move || {
            matches!(waiter.wait_for_tick(Duration::from_secs(60)), Wake::Tick)
        });
        std::thread::sleep(Duration::from_millis(50));
        signal.set_online(true);
        assert!(handle.join().unwrap());
    }
}
