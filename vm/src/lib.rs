pub mod actors;
pub mod builder;
pub mod compile;
pub mod demos;
mod format;
pub mod interpreter;
mod natives;
mod scheduler;
pub mod world;

use std::{
    io::{self, Write},
    sync::Arc,
};

use heap::{GcStats, Heap, HeapError, HeapSettings};
use object::{NativeFn, ObjRef, Value};
use parking_lot::Mutex;

use crate::{
    actors::{ActorRegistry, Mailbox},
    interpreter::{ExecutionContext, Interpreter},
    scheduler::Scheduler,
    world::World,
};

pub use crate::{
    builder::FunctionBuilder,
    compile::{CompileError, CompileSession, Compiler},
    format::format_value,
    interpreter::{ErrorKind, RuntimeError, TraceEntry},
};

/// Where `print` output and error reports go.
pub type Sink = Arc<Mutex<dyn Write + Send>>;

/// Messages one worker handles for a mailbox before giving others a turn.
const DELIVERY_BATCH: usize = 32;

pub struct VMCreateInfo {
    pub heap: HeapSettings,
    /// Threads delivering actor messages.
    pub workers: usize,
    /// Call frames per execution context.
    pub frames_max: usize,
    pub out: Sink,
    pub err: Sink,
}

impl Default for VMCreateInfo {
    fn default() -> Self {
        Self {
            heap: HeapSettings::default(),
            workers: 2,
            frames_max: 64,
            out: Arc::new(Mutex::new(io::stdout())),
            err: Arc::new(Mutex::new(io::stderr())),
        }
    }
}

impl VMCreateInfo {
    pub fn validate(&self) -> Result<(), &'static str> {
        self.heap.validate()?;
        if self.workers == 0 {
            return Err("workers must be > 0");
        }
        if self.frames_max == 0 {
            return Err("frames_max must be > 0");
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum InterpretResult {
    Ok,
    CompileError(Vec<CompileError>),
    RuntimeError(RuntimeError),
}

impl InterpretResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, InterpretResult::Ok)
    }
}

/// State shared between the host thread and the worker threads.
pub(crate) struct VMShared {
    world: Mutex<World>,
    actors: ActorRegistry,
    scheduler: Scheduler,
    out: Sink,
    err: Sink,
    frames_max: usize,
}

/// A runtime instance: one heap, one set of globals, a main execution
/// context for scripts and a worker pool for actor messages.
pub struct VM {
    shared: Arc<VMShared>,
    main: Mutex<ExecutionContext>,
}

impl VM {
    pub fn new(info: VMCreateInfo) -> Result<Self, &'static str> {
        info.validate()?;
        let heap = Heap::new(info.heap)?;
        let mut world = World::new(heap);
        let actors = ActorRegistry::new();
        natives::install(&mut world, &actors).map_err(|_| "failed to install natives")?;

        let shared = Arc::new(VMShared {
            world: Mutex::new(world),
            actors,
            scheduler: Scheduler::new(info.workers),
            out: info.out,
            err: info.err,
            frames_max: info.frames_max,
        });

        let worker_shared = Arc::clone(&shared);
        let started = shared
            .scheduler
            .start(Arc::new(move |mailbox: &Arc<Mailbox>| {
                deliver(&worker_shared, mailbox)
            }));
        if let Err(err) = started {
            log::warn!("spawning workers failed: {err}");
            shared.scheduler.shutdown();
            return Err("failed to spawn worker threads");
        }

        Ok(Self {
            shared,
            main: Mutex::new(ExecutionContext::new()),
        })
    }

    /// Compile with `compile` and run the resulting script on the main
    /// context. Errors are also reported on the error sink.
    pub fn interpret_with<F>(&self, compile: F) -> InterpretResult
    where
        F: FnOnce(&mut CompileSession<'_>) -> Result<ObjRef, Vec<CompileError>>,
    {
        let mut world = self.shared.world.lock();
        let mut main = self.main.lock();
        let scope = world.heap.open_scope();

        let compiled = {
            let (heap, world_roots) = world.split();
            let roots = (&world_roots, &(&*main, &self.shared.actors));
            let mut session = CompileSession::new(heap, &roots);
            compile(&mut session)
        };

        let result = match compiled {
            Ok(function) => {
                let run = Interpreter::new(&mut main, &mut world, &self.shared)
                    .interpret_function(function);
                match run {
                    Ok(()) => InterpretResult::Ok,
                    Err(err) => {
                        self.report(&err.to_string());
                        InterpretResult::RuntimeError(err)
                    }
                }
            }
            Err(errors) => {
                for error in &errors {
                    self.report(&error.to_string());
                }
                InterpretResult::CompileError(errors)
            }
        };

        world.heap.close_scope(scope);
        result
    }

    pub fn interpret_source(&self, source: &str, compiler: &mut dyn Compiler) -> InterpretResult {
        self.interpret_with(|session| compiler.compile(source, session))
    }

    /// Block until every sent message has been handled.
    pub fn wait_idle(&self) {
        self.shared.actors.wait_idle();
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.shared.world.lock().global(name)
    }

    /// The interned string for `chars`. The result is only kept alive by
    /// whatever references it.
    pub fn intern(&self, chars: &str) -> ObjRef {
        let mut world = self.shared.world.lock();
        let main = self.main.lock();
        let (heap, world_roots) = world.split();
        let roots = (&world_roots, &(&*main, &self.shared.actors));
        heap.with_scope(|heap| heap.intern(chars, &roots))
    }

    pub fn define_native(&self, name: &str, function: NativeFn) -> Result<(), HeapError> {
        let mut world = self.shared.world.lock();
        let main = self.main.lock();
        world.define_native(name, function, &(&*main, &self.shared.actors))
    }

    /// Run `f` with read access to the heap.
    pub fn inspect<R>(&self, f: impl FnOnce(&Heap) -> R) -> R {
        f(&self.shared.world.lock().heap)
    }

    pub fn display(&self, value: Value) -> String {
        format_value(&self.shared.world.lock().heap, value)
    }

    pub fn collect_garbage(&self) {
        let mut world = self.shared.world.lock();
        let main = self.main.lock();
        let (heap, world_roots) = world.split();
        heap.collect(&(&world_roots, &(&*main, &self.shared.actors)));
    }

    pub fn stats(&self) -> GcStats {
        self.shared.world.lock().heap.stats()
    }

    fn report(&self, text: &str) {
        let mut err = self.shared.err.lock();
        if let Err(e) = writeln!(err, "{text}") {
            log::warn!("error report failed: {e}");
        }
    }
}

impl Drop for VM {
    fn drop(&mut self) {
        self.shared.scheduler.shutdown();
    }
}

/// Handle up to [`DELIVERY_BATCH`] messages of one mailbox. Returns `true`
/// when the mailbox must be queued again.
fn deliver(shared: &VMShared, mailbox: &Arc<Mailbox>) -> bool {
    for _ in 0..DELIVERY_BATCH {
        let mut world = shared.world.lock();
        let Some(message) = mailbox.pop() else {
            return false;
        };
        let instance = mailbox.instance();
        log::debug!("deliver {message:?} to {instance:?}");

        let mut context = mailbox.context().lock();
        let result = Interpreter::new(&mut context, &mut world, shared).deliver(instance, message);
        if let Err(err) = result {
            let name = actor_name(&world.heap, instance);
            log::warn!("actor {name} failed: {}", err.kind);
            let mut out = shared.err.lock();
            if let Err(e) = writeln!(out, "[actor {name}] {err}") {
                log::warn!("error report failed: {e}");
            }
        }
        drop(context);
        drop(world);
        shared.actors.message_done();
    }
    // A full batch: the next round finds out whether anything is left.
    true
}

fn actor_name(heap: &Heap, instance: ObjRef) -> String {
    heap.instance(instance)
        .and_then(|i| heap.actor(i.actor))
        .and_then(|a| heap.string(a.name))
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| "?".to_string())
}
