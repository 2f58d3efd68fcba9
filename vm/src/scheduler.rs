use parking_lot::{Condvar, Mutex};
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::actors::Mailbox;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(pub usize);

/// Drains some messages from a mailbox. Returns `true` if the mailbox still
/// has work and must be queued again.
pub(crate) type DeliverFn = Arc<dyn Fn(&Arc<Mailbox>) -> bool + Send + Sync>;

struct Worker {
    id: WorkerId,
    local: Mutex<VecDeque<Arc<Mailbox>>>,
    has_work: Condvar,
    should_stop: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    fn new(id: WorkerId) -> Arc<Self> {
        Arc::new(Self {
            id,
            local: Mutex::new(VecDeque::new()),
            has_work: Condvar::new(),
            should_stop: AtomicBool::new(false),
            handle: Mutex::new(None),
        })
    }

    fn push(&self, mailbox: Arc<Mailbox>) {
        self.local.lock().push_back(mailbox);
        self.has_work.notify_one();
    }

    fn pop(&self) -> Option<Arc<Mailbox>> {
        self.local.lock().pop_front()
    }

    fn steal_back(&self) -> Option<Arc<Mailbox>> {
        self.local.lock().pop_back()
    }
}

/// Fixed pool of worker threads running actor mailboxes.
///
/// Ready mailboxes are spread round-robin over per-worker queues; an idle
/// worker steals from the back of its siblings' queues.
///
/// Every delivery runs under the world lock, so handlers of different actors
/// never execute at the same time. The workers only spread the waiting on
/// that lock.
pub(crate) struct Scheduler {
    workers: Arc<[Arc<Worker>]>,
    next: AtomicUsize,
}

impl Scheduler {
    pub fn new(count: usize) -> Self {
        let workers: Vec<_> = (0..count.max(1)).map(|i| Worker::new(WorkerId(i + 1))).collect();
        Self {
            workers: workers.into(),
            next: AtomicUsize::new(0),
        }
    }

    /// Spawn one thread per worker.
    pub fn start(&self, deliver: DeliverFn) -> std::io::Result<()> {
        for worker in self.workers.iter() {
            let me = Arc::clone(worker);
            let siblings = Arc::clone(&self.workers);
            let deliver = Arc::clone(&deliver);
            let handle = thread::Builder::new()
                .name(format!("sched-worker-{}", worker.id.0))
                .spawn(move || worker_loop(me, siblings, deliver))?;
            *worker.handle.lock() = Some(handle);
        }
        log::debug!("scheduler started {} workers", self.workers.len());
        Ok(())
    }

    /// Queue a ready mailbox.
    pub fn submit(&self, mailbox: Arc<Mailbox>) {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        self.workers[i].push(mailbox);
    }

    /// Stop and join every worker. Mailboxes still queued are abandoned.
    pub fn shutdown(&self) {
        for w in self.workers.iter() {
            w.should_stop.store(true, Ordering::Relaxed);
            w.has_work.notify_all();
        }
        for w in self.workers.iter() {
            if let Some(h) = w.handle.lock().take() {
                if h.join().is_err() {
                    log::warn!("worker {} panicked", w.id.0);
                }
            }
        }
    }
}

fn worker_loop(me: Arc<Worker>, siblings: Arc<[Arc<Worker>]>, deliver: DeliverFn) {
    log::debug!("worker {} running", me.id.0);
    loop {
        if me.should_stop.load(Ordering::Relaxed) {
            break;
        }

        let work = me.pop().or_else(|| try_steal(&me, &siblings));
        if let Some(mailbox) = work {
            if deliver(&mailbox) {
                me.push(mailbox);
            }
            continue;
        }

        let timeout = Duration::from_millis(10);
        let mut guard = me.local.lock();
        if guard.is_empty() && !me.should_stop.load(Ordering::Relaxed) {
            let _ = me.has_work.wait_for(&mut guard, timeout);
        }
    }
    log::debug!("worker {} stopped", me.id.0);
}

fn try_steal(me: &Arc<Worker>, siblings: &[Arc<Worker>]) -> Option<Arc<Mailbox>> {
    siblings
        .iter()
        .filter(|w| w.id != me.id)
        .find_map(|w| w.steal_back())
}

#[cfg(test)]
mod tests {
    use super::*;
    use object::ObjRef;
    use std::time::Instant;

    #[test]
    fn delivers_every_submission_and_shuts_down() {
        let scheduler = Scheduler::new(3);
        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&delivered);
        scheduler
            .start(Arc::new(move |_mailbox: &Arc<Mailbox>| {
                counter.fetch_add(1, Ordering::SeqCst);
                false
            }))
            .expect("spawn workers");

        for i in 0..20 {
            scheduler.submit(Arc::new(Mailbox::new(ObjRef::new(i, 0))));
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while delivered.load(Ordering::SeqCst) < 20 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        scheduler.shutdown();
        assert_eq!(delivered.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn requeues_until_drained() {
        let scheduler = Scheduler::new(1);
        let rounds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&rounds);
        scheduler
            .start(Arc::new(move |_mailbox: &Arc<Mailbox>| {
                counter.fetch_add(1, Ordering::SeqCst) < 4
            }))
            .expect("spawn workers");

        scheduler.submit(Arc::new(Mailbox::new(ObjRef::new(0, 0))));

        let deadline = Instant::now() + Duration::from_secs(5);
        while rounds.load(Ordering::SeqCst) < 5 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        thread::sleep(Duration::from_millis(20));
        scheduler.shutdown();
        assert_eq!(rounds.load(Ordering::SeqCst), 5);
    }
}
