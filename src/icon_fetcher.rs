use crate::error::Result;
use crate::icon_cache::SharedIconCache;
use crate::ids::SystemIconIndex;
use rayon::ThreadPool;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

/// Resolves a path to a system icon index. Called on worker threads and may
/// be slow.
pub trait IconResolver: Send + Sync + 'static {
    fn resolve_display_icon(&self, path: &str) -> Result<SystemIconIndex>;

    /// Runs once on each worker thread before it takes work.
    fn on_worker_start(&self) {}

    /// Runs once on each worker thread as it shuts down.
    fn on_worker_exit(&self) {}
}

/// Asks the UI thread to call [`IconFetcher::process_completions`].
pub trait UiWaker: Send + Sync + 'static {
    fn wake(&self);
}

/// Completion callback. Always invoked on the UI thread, never concurrently
/// with other UI work.
pub type IconCallback = Box<dyn FnOnce(SystemIconIndex)>;

struct PendingIconTask {
    path: String,
    callback: IconCallback,
}

struct Completion {
    task_id: u64,
    result: Result<SystemIconIndex>,
}

/// Resolves icons off the UI thread and marshals results back to it.
///
/// Callbacks stay on the UI thread in `pending`; workers only ever see the
/// path and a channel to report on. Requests for the same path are not
/// coalesced, every queued task produces its own callback.
pub struct IconFetcher {
    thread_pool: ThreadPool,
    resolver: Arc<dyn IconResolver>,
    waker: Arc<dyn UiWaker>,
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
    pending: RefCell<HashMap<u64, PendingIconTask>>,
    next_task_id: Cell<u64>,
    cache: SharedIconCache,
    default_folder_index: SystemIconIndex,
}

impl IconFetcher {
    pub fn new(
        resolver: Arc<dyn IconResolver>,
        waker: Arc<dyn UiWaker>,
        cache: SharedIconCache,
        default_folder_index: SystemIconIndex,
        num_threads: usize,
    ) -> Result<Self> {
        let start_resolver = Arc::clone(&resolver);
        let exit_resolver = Arc::clone(&resolver);
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(|i| format!("icon-fetcher-{}", i))
            .start_handler(move |_| start_resolver.on_worker_start())
            .exit_handler(move |_| exit_resolver.on_worker_exit())
            .build()?;

        let (sender, receiver) = mpsc::channel();

        Ok(Self {
            thread_pool,
            resolver,
            waker,
            sender,
            receiver,
            pending: RefCell::new(HashMap::new()),
            next_task_id: Cell::new(0),
            cache,
            default_folder_index,
        })
    }

    /// Queues resolution of `path` and returns immediately.
    ///
    /// `callback` receives the resolved index, or the default folder index if
    /// nothing could be resolved.
    pub fn queue_icon_task(&self, path: &str, callback: impl FnOnce(SystemIconIndex) + 'static) {
        let task_id = self.next_task_id.get();
        self.next_task_id.set(task_id + 1);

        self.pending.borrow_mut().insert(
            task_id,
            PendingIconTask {
                path: path.to_string(),
                callback: Box::new(callback),
            },
        );

        let resolver = Arc::clone(&self.resolver);
        let waker = Arc::clone(&self.waker);
        let sender = self.sender.clone();
        let path = path.to_string();

        tracing::trace!(target: "icon_fetcher", "Queued icon task {} for {}", task_id, path);

        self.thread_pool.spawn(move || {
            let result = resolver.resolve_display_icon(&path);

            // The fetcher may be gone by now, in which case nobody is listening
            if sender.send(Completion { task_id, result }).is_ok() {
                waker.wake();
            }
        });
    }

    /// Delivers every finished task to its callback. Call from the UI thread
    /// whenever the waker fires. Returns the number of callbacks invoked.
    pub fn process_completions(&self) -> usize {
        let mut delivered = 0;
        while let Ok(completion) = self.receiver.try_recv() {
            if self.complete(completion) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Blocks until at least one task finishes or `timeout` elapses, then
    /// delivers everything that is ready.
    pub fn wait_for_completions(&self, timeout: Duration) -> usize {
        if self.pending_count() == 0 {
            return 0;
        }

        match self.receiver.recv_timeout(timeout) {
            Ok(completion) => {
                let first = usize::from(self.complete(completion));
                first + self.process_completions()
            }
            Err(RecvTimeoutError::Timeout) => 0,
            Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    fn complete(&self, completion: Completion) -> bool {
        // Release the borrow before running the callback, it may queue more work
        let task = self.pending.borrow_mut().remove(&completion.task_id);
        let Some(task) = task else {
            return false;
        };

        let index = match completion.result {
            Ok(index) => {
                self.cache.borrow_mut().insert(&task.path, index);
                index
            }
            Err(e) => {
                tracing::debug!(target: "icon_fetcher", "Falling back to default icon for {}: {}", task.path, e);
                self.default_folder_index
            }
        };

        (task.callback)(index);
        true
    }
}

impl Drop for IconFetcher {
    fn drop(&mut self) {
        let undelivered = self.pending.get_mut().len();
        if undelivered > 0 {
            tracing::debug!(target: "icon_fetcher", "Dropping {} undelivered icon tasks", undelivered);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShellError;
    use crate::icon_cache::IconCache;
    use crate::test_support::{CountingWaker, GatedResolver};
    use std::rc::Rc;
    use std::time::Instant;

    const DEFAULT_FOLDER: SystemIconIndex = SystemIconIndex(3);
    const WAIT: Duration = Duration::from_secs(5);

    fn fetcher(resolver: &Arc<GatedResolver>, waker: &Arc<CountingWaker>) -> (IconFetcher, SharedIconCache) {
        let cache = IconCache::shared(None);
        let fetcher = IconFetcher::new(
            resolver.clone(),
            waker.clone(),
            cache.clone(),
            DEFAULT_FOLDER,
            4,
        )
        .unwrap();
        (fetcher, cache)
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + WAIT;
        while !done() {
            assert!(Instant::now() < deadline, "timed out");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_callback_runs_only_when_completions_are_processed() {
        let resolver = Arc::new(GatedResolver::new());
        let waker = Arc::new(CountingWaker::default());
        let (fetcher, cache) = fetcher(&resolver, &waker);

        let received = Rc::new(Cell::new(None));
        let sink = received.clone();
        fetcher.queue_icon_task("C:\\data", move |index| sink.set(Some(index)));
        assert_eq!(fetcher.pending_count(), 1);

        resolver.release("C:\\data", Ok(SystemIconIndex(40)));
        waker.wait_for(1, WAIT);
        assert_eq!(received.get(), None);

        assert_eq!(fetcher.process_completions(), 1);
        assert_eq!(received.get(), Some(SystemIconIndex(40)));
        assert_eq!(fetcher.pending_count(), 0);
        assert_eq!(cache.borrow().find_by_path("c:\\DATA"), Some(SystemIconIndex(40)));
    }

    #[test]
    fn test_failure_reports_default_folder_and_is_not_cached() {
        let resolver = Arc::new(GatedResolver::new());
        let waker = Arc::new(CountingWaker::default());
        let (fetcher, cache) = fetcher(&resolver, &waker);

        let received = Rc::new(Cell::new(None));
        let sink = received.clone();
        fetcher.queue_icon_task("C:\\gone", move |index| sink.set(Some(index)));
        resolver.release(
            "C:\\gone",
            Err(ShellError::UnresolvedIcon {
                path: "C:\\gone".to_string(),
            }),
        );

        assert_eq!(fetcher.wait_for_completions(WAIT), 1);
        assert_eq!(received.get(), Some(DEFAULT_FOLDER));
        assert!(cache.borrow().is_empty());
    }

    #[test]
    fn test_dropped_fetcher_discards_pending_callbacks() {
        let resolver = Arc::new(GatedResolver::new());
        let waker = Arc::new(CountingWaker::default());
        let (fetcher, cache) = fetcher(&resolver, &waker);

        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        fetcher.queue_icon_task("C:\\late", move |_| counter.set(counter.get() + 1));
        wait_until(|| resolver.request_count("C:\\late") == 1);

        drop(fetcher);
        // The undelivered callback went with the fetcher
        assert_eq!(Rc::strong_count(&calls), 1);

        resolver.release("C:\\late", Ok(SystemIconIndex(12)));
        // Workers hold the last other references until the pool has wound down
        wait_until(|| Arc::strong_count(&resolver) == 1);

        assert_eq!(waker.count(), 0);
        assert_eq!(calls.get(), 0);
        assert!(cache.borrow().is_empty());
    }

    #[test]
    fn test_same_path_is_not_coalesced() {
        let resolver = Arc::new(GatedResolver::new());
        let waker = Arc::new(CountingWaker::default());
        let (fetcher, _cache) = fetcher(&resolver, &waker);

        let calls = Rc::new(Cell::new(0));
        for _ in 0..2 {
            let calls = calls.clone();
            fetcher.queue_icon_task("C:\\twice", move |_| calls.set(calls.get() + 1));
        }
        resolver.release("C:\\twice", Ok(SystemIconIndex(8)));
        resolver.release("C:\\twice", Ok(SystemIconIndex(8)));

        waker.wait_for(2, WAIT);
        assert_eq!(fetcher.process_completions(), 2);
        assert_eq!(calls.get(), 2);
        assert_eq!(resolver.request_count("C:\\twice"), 2);
    }

    #[test]
    fn test_callback_may_queue_more_work() {
        let resolver = Arc::new(GatedResolver::new());
        let waker = Arc::new(CountingWaker::default());
        let (fetcher, _cache) = fetcher(&resolver, &waker);
        let fetcher = Rc::new(fetcher);

        let second = Rc::new(Cell::new(None));
        let inner_fetcher = Rc::downgrade(&fetcher);
        let sink = second.clone();
        fetcher.queue_icon_task("C:\\one", move |_| {
            if let Some(fetcher) = inner_fetcher.upgrade() {
                fetcher.queue_icon_task("C:\\two", move |index| sink.set(Some(index)));
            }
        });

        resolver.release("C:\\one", Ok(SystemIconIndex(10)));
        assert_eq!(fetcher.wait_for_completions(WAIT), 1);
        assert_eq!(fetcher.pending_count(), 1);

        resolver.release("C:\\two", Ok(SystemIconIndex(11)));
        assert_eq!(fetcher.wait_for_completions(WAIT), 1);
        assert_eq!(second.get(), Some(SystemIconIndex(11)));
    }

    #[test]
    fn test_wait_without_pending_work_returns_immediately() {
        let resolver = Arc::new(GatedResolver::new());
        let waker = Arc::new(CountingWaker::default());
        let (fetcher, _cache) = fetcher(&resolver, &waker);

        assert_eq!(fetcher.wait_for_completions(Duration::from_secs(60)), 0);
    }
}
