//! Catalog scanner threads (spec §4.10 / §2.10): background loops that
//! discover regions on disk for the root and meta tables and feed what they
//! find into the Transition Table and Catalog Tracking. Disk scanning
//! itself is out of scope (spec §1 names it an external collaborator); this
//! module provides the thread harness and the trait seam a real scanner
//! plugs into, following the park/unpark + condvar discipline
//! `scheduler::worker_monitor::WorkerMonitor` uses for GC worker threads.

use crate::catalog::CatalogTracker;
use crate::region::RegionInfo;
use crate::server::ServerName;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// What a real scanner implementation discovers about one catalog region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredRegion {
    pub info: RegionInfo,
    pub server: ServerName,
}

/// The external collaborator this module provides a thread harness for.
/// Root and meta scanning are identical in shape (walk a catalog table,
/// report what's found); they differ only in which table each instance
/// walks, so one trait covers both (spec §4.10).
pub trait CatalogScanner: Send + Sync {
    /// One scan pass. Returns every region discovered this pass.
    fn scan(&self) -> Vec<DiscoveredRegion>;
}

struct ScannerThread {
    parked: AtomicBool,
    closed: AtomicBool,
    wake: Condvar,
    wake_lock: Mutex<()>,
}

/// One background scanner loop, parked between passes and woken either by
/// its own interval timer or an explicit `wake()` call (e.g. after a forced
/// catalog reassignment), observing shutdown promptly per spec §5's
/// suspension-point requirements.
pub struct ScannerHandle {
    thread: Arc<ScannerThread>,
}

impl ScannerHandle {
    /// Spawns the scan loop. The caller is responsible for joining or
    /// detaching the returned `JoinHandle`; `ScannerHandle` only owns the
    /// shutdown/wake signaling, mirroring the separation between
    /// `WorkerGroup` (thread ownership) and `WorkerMonitor` (park/wake
    /// signaling) in the teacher crate.
    pub fn spawn(
        scanner: Arc<dyn CatalogScanner>,
        catalog: Arc<CatalogTracker>,
        poll_interval: Duration,
        on_discovered: impl Fn(&CatalogTracker, DiscoveredRegion) + Send + 'static,
    ) -> (Self, std::thread::JoinHandle<()>) {
        let thread = Arc::new(ScannerThread {
            parked: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            wake: Condvar::new(),
            wake_lock: Mutex::new(()),
        });
        let thread_ref = thread.clone();

        let join = std::thread::spawn(move || {
            while !thread_ref.closed.load(Ordering::SeqCst) {
                for discovered in scanner.scan() {
                    on_discovered(&catalog, discovered);
                }

                thread_ref.parked.store(true, Ordering::SeqCst);
                let guard = thread_ref.wake_lock.lock().unwrap();
                let _ = thread_ref.wake.wait_timeout(guard, poll_interval).unwrap();
                thread_ref.parked.store(false, Ordering::SeqCst);
            }
        });

        (ScannerHandle { thread }, join)
    }

    pub fn wake(&self) {
        let _guard = self.thread.wake_lock.lock().unwrap();
        self.thread.wake.notify_all();
    }

    pub fn is_parked(&self) -> bool {
        self.thread.parked.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        self.thread.closed.store(true, Ordering::SeqCst);
        self.wake();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::InMemoryCoordinationService;
    use std::sync::atomic::AtomicUsize;

    struct CountingScanner {
        calls: AtomicUsize,
    }

    impl CatalogScanner for CountingScanner {
        fn scan(&self) -> Vec<DiscoveredRegion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        }
    }

    #[test]
    fn wake_triggers_another_pass_promptly() {
        let scanner = Arc::new(CountingScanner {
            calls: AtomicUsize::new(0),
        });
        let catalog = Arc::new(CatalogTracker::new(Arc::new(InMemoryCoordinationService::new())));
        let (handle, join) = ScannerHandle::spawn(scanner.clone(), catalog, Duration::from_secs(60), |_, _| {});

        std::thread::sleep(Duration::from_millis(20));
        handle.wake();
        std::thread::sleep(Duration::from_millis(20));
        handle.shutdown();
        join.join().unwrap();

        assert!(scanner.calls.load(Ordering::SeqCst) >= 2);
    }
}
