//! Mailboxes and the registry binding actor instances to them.
//!
//! Lock order is always world, then registry, then a mailbox queue.

use heap::{Heap, RootProvider};
use object::{ObjRef, Value};
use parking_lot::{Condvar, Mutex};
use std::{collections::HashMap, collections::VecDeque, sync::Arc, time::Duration};

use crate::interpreter::ExecutionContext;

/// One asynchronous send waiting for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Interned handler name.
    pub selector: ObjRef,
    pub args: Vec<Value>,
}

#[derive(Debug, Default)]
struct Queue {
    messages: VecDeque<Message>,
    /// Set while the mailbox sits in the run queue or a worker is draining
    /// it. Keeps a mailbox to a single consumer.
    scheduled: bool,
}

/// Unbounded multi-producer, single-consumer queue of messages for one
/// instance, together with the execution context its handlers run in.
pub struct Mailbox {
    instance: ObjRef,
    queue: Mutex<Queue>,
    context: Mutex<ExecutionContext>,
}

impl Mailbox {
    pub fn new(instance: ObjRef) -> Self {
        Self {
            instance,
            queue: Mutex::new(Queue::default()),
            context: Mutex::new(ExecutionContext::new()),
        }
    }

    pub fn instance(&self) -> ObjRef {
        self.instance
    }

    /// Append a message. Returns `true` if the mailbox was idle and now
    /// has to be handed to the scheduler.
    pub fn push(&self, message: Message) -> bool {
        let mut queue = self.queue.lock();
        queue.messages.push_back(message);
        !std::mem::replace(&mut queue.scheduled, true)
    }

    /// Take the oldest message. An empty mailbox drops out of the schedule.
    pub fn pop(&self) -> Option<Message> {
        let mut queue = self.queue.lock();
        let message = queue.messages.pop_front();
        if message.is_none() {
            queue.scheduled = false;
        }
        message
    }

    pub fn len(&self) -> usize {
        self.queue.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_scheduled(&self) -> bool {
        self.queue.lock().scheduled
    }

    pub(crate) fn context(&self) -> &Mutex<ExecutionContext> {
        &self.context
    }

    /// Pending messages keep their receiver, selector and arguments alive.
    fn visit_pending(&self, visitor: &mut dyn FnMut(Value)) {
        let queue = self.queue.lock();
        if !queue.scheduled {
            return;
        }
        visitor(Value::Obj(self.instance));
        for message in &queue.messages {
            visitor(Value::Obj(message.selector));
            for &arg in &message.args {
                visitor(arg);
            }
        }
    }
}

struct Mailboxes {
    by_instance: HashMap<ObjRef, Arc<Mailbox>>,
    prune_at: usize,
}

/// Every mailbox that has ever received a message, plus the count of
/// messages not yet fully handled.
pub struct ActorRegistry {
    mailboxes: Mutex<Mailboxes>,
    pending: Mutex<usize>,
    idle: Condvar,
}

const MIN_PRUNE_AT: usize = 16;

impl ActorRegistry {
    pub fn new() -> Self {
        Self {
            mailboxes: Mutex::new(Mailboxes {
                by_instance: HashMap::new(),
                prune_at: MIN_PRUNE_AT,
            }),
            pending: Mutex::new(0),
            idle: Condvar::new(),
        }
    }

    /// The mailbox bound to `instance`, creating it on first use. Entries
    /// for instances the collector has freed are dropped here, amortised
    /// over registry growth.
    pub fn mailbox(&self, instance: ObjRef, heap: &Heap) -> Arc<Mailbox> {
        let mut mailboxes = self.mailboxes.lock();
        if let Some(mailbox) = mailboxes.by_instance.get(&instance) {
            return Arc::clone(mailbox);
        }
        if mailboxes.by_instance.len() >= mailboxes.prune_at {
            mailboxes
                .by_instance
                .retain(|&r, mailbox| heap.contains(r) || mailbox.is_scheduled());
            mailboxes.prune_at = (mailboxes.by_instance.len() * 2).max(MIN_PRUNE_AT);
            log::debug!("mailbox registry pruned to {}", mailboxes.by_instance.len());
        }
        let mailbox = Arc::new(Mailbox::new(instance));
        mailboxes.by_instance.insert(instance, Arc::clone(&mailbox));
        mailbox
    }

    /// Queue `message` for `instance`. Returns the mailbox if it must be
    /// submitted to the scheduler.
    pub fn enqueue(
        &self,
        instance: ObjRef,
        message: Message,
        heap: &Heap,
    ) -> Option<Arc<Mailbox>> {
        *self.pending.lock() += 1;
        let mailbox = self.mailbox(instance, heap);
        mailbox.push(message).then_some(mailbox)
    }

    /// Mark one message as fully handled.
    pub fn message_done(&self) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }

    /// Number of messages queued or currently running.
    pub fn pending(&self) -> usize {
        *self.pending.lock()
    }

    /// Block until every queued message has been handled.
    pub fn wait_idle(&self) {
        let mut pending = self.pending.lock();
        while *pending > 0 {
            self.idle.wait_for(&mut pending, Duration::from_millis(50));
        }
    }
}

impl Default for ActorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RootProvider for ActorRegistry {
    fn visit_roots(&self, visitor: &mut dyn FnMut(Value)) {
        for mailbox in self.mailboxes.lock().by_instance.values() {
            mailbox.visit_pending(visitor);
        }
    }
}
