use core::fmt;

use object::{
    Actor, BoundMessage, Closure, Function, Instance, Key, Native, ObjRef,
    Object, ObjectKind, Table, Upvalue, Value, VMString, hash_string,
};

/// Consumers implement this to provide GC roots.
///
/// Called when a collection starts to discover live roots from VM state
/// (value stacks, frames, open upvalues, globals, mailboxes). Objects never
/// move, so the visitor only needs to read each root.
pub trait RootProvider {
    fn visit_roots(&self, visitor: &mut dyn FnMut(Value));
}

/// A root provider with no roots of its own. Temporary roots held by the
/// heap itself are still honoured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRoots;

impl RootProvider for NoRoots {
    fn visit_roots(&self, _visitor: &mut dyn FnMut(Value)) {}
}

impl RootProvider for Vec<Value> {
    fn visit_roots(&self, visitor: &mut dyn FnMut(Value)) {
        for &value in self.iter() {
            visitor(value);
        }
    }
}

impl<A: RootProvider + ?Sized, B: RootProvider + ?Sized> RootProvider for (&A, &B) {
    fn visit_roots(&self, visitor: &mut dyn FnMut(Value)) {
        self.0.visit_roots(visitor);
        self.1.visit_roots(visitor);
    }
}

// ── Heap settings ─────────────────────────────────────────────────────

/// Collector tuning.
#[derive(Debug, Clone)]
pub struct HeapSettings {
    /// Collect on every growing allocation. For shaking out rooting bugs.
    pub stress_gc: bool,
    /// After a cycle the next one starts at `live bytes * grow_factor`.
    pub grow_factor: usize,
    /// Threshold for the first collection, in bytes.
    pub initial_threshold: usize,
    /// Lower bound for every later threshold, in bytes.
    pub min_threshold: usize,
}

impl Default for HeapSettings {
    fn default() -> Self {
        Self {
            stress_gc: false,
            grow_factor: 2,
            initial_threshold: 1024 * 1024, // 1 MB
            min_threshold: 0,
        }
    }
}

impl HeapSettings {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.grow_factor < 2 {
            return Err("grow_factor must be at least 2");
        }
        if self.initial_threshold == 0 {
            return Err("initial_threshold must be > 0");
        }
        Ok(())
    }
}

// ── Errors ────────────────────────────────────────────────────────────

/// A checked object access failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// The handle's slot was freed (and possibly reused) since it was issued.
    Dangling(ObjRef),
    WrongKind {
        expected: ObjectKind,
        found: ObjectKind,
    },
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::Dangling(r) => write!(f, "dangling object reference {r:?}"),
            HeapError::WrongKind { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
        }
    }
}

impl std::error::Error for HeapError {}

// ── Statistics ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub collections: u64,
    pub objects_freed: u64,
    pub bytes_freed: u64,
}

// ── Heap ──────────────────────────────────────────────────────────────

pub(crate) struct Slot {
    pub(crate) generation: u32,
    pub(crate) marked: bool,
    pub(crate) object: Option<Object>,
}

/// Marks the temporary-root depth to return to. See [`Heap::open_scope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct RootScope(usize);

/// Arena of heap objects addressed by generation-checked [`ObjRef`]s.
///
/// Every object handed out by [`alloc`](Heap::alloc) (and every string
/// returned by [`intern`](Heap::intern)) is pushed onto a temporary-root
/// stack before any collection can run, and stays there until the enclosing
/// [`RootScope`] is closed. Callers install the handle into its permanent
/// owner inside the scope.
pub struct Heap {
    pub(crate) slots: Vec<Slot>,
    pub(crate) free: Vec<u32>,
    /// Intern set. Not a root; cleaned by the collector before sweeping.
    pub(crate) strings: Table,
    pub(crate) scratch: Vec<Value>,
    pub(crate) gray: Vec<ObjRef>,
    pub(crate) bytes_allocated: usize,
    pub(crate) next_gc: usize,
    pub(crate) settings: HeapSettings,
    pub(crate) stats: GcStats,
}

impl Heap {
    pub fn new(settings: HeapSettings) -> Result<Self, &'static str> {
        settings.validate()?;
        Ok(Self {
            slots: Vec::new(),
            free: Vec::new(),
            strings: Table::new(),
            scratch: Vec::new(),
            gray: Vec::new(),
            bytes_allocated: 0,
            next_gc: settings.initial_threshold,
            settings,
            stats: GcStats::default(),
        })
    }

    pub fn settings(&self) -> &HeapSettings {
        &self.settings
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn next_gc(&self) -> usize {
        self.next_gc
    }

    pub fn stats(&self) -> GcStats {
        self.stats
    }

    pub fn live_objects(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Whether `r` still names a live object.
    pub fn contains(&self, r: ObjRef) -> bool {
        self.slot(r).is_some()
    }

    // ── temporary roots ────────────────────────────────────────────

    pub fn open_scope(&self) -> RootScope {
        RootScope(self.scratch.len())
    }

    /// Drop every temporary root pushed since `scope` was opened.
    pub fn close_scope(&mut self, scope: RootScope) {
        self.scratch.truncate(scope.0);
    }

    /// Run `f` in a fresh scope; its temporary roots are released on return.
    pub fn with_scope<T>(&mut self, f: impl FnOnce(&mut Heap) -> T) -> T {
        let scope = self.open_scope();
        let result = f(self);
        self.close_scope(scope);
        result
    }

    // ── allocation ─────────────────────────────────────────────────

    /// Move `object` into the heap. The returned handle is temporarily
    /// rooted, so a collection triggered here (or by a later allocation in
    /// the same scope) keeps it and everything it references.
    pub fn alloc(&mut self, object: Object, roots: &dyn RootProvider) -> ObjRef {
        let size = object.heap_size();
        let r = self.insert(object);
        self.scratch.push(Value::Obj(r));
        log::trace!("allocate {size} bytes for {r:?}");
        self.grow(size, roots);
        r
    }

    fn insert(&mut self, object: Object) -> ObjRef {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.marked = false;
                slot.object = Some(object);
                ObjRef::new(index, slot.generation)
            }
            None => {
                let index = u32::try_from(self.slots.len())
                    .unwrap_or_else(|_| panic!("heap arena exhausted"));
                self.slots.push(Slot {
                    generation: 0,
                    marked: false,
                    object: Some(object),
                });
                ObjRef::new(index, 0)
            }
        }
    }

    /// Account for `bytes` more live memory, collecting if the threshold is
    /// crossed (or always, under stress).
    fn grow(&mut self, bytes: usize, roots: &dyn RootProvider) {
        self.bytes_allocated += bytes;
        if self.settings.stress_gc || self.bytes_allocated > self.next_gc {
            self.collect(roots);
        }
    }

    /// Account for a change in an object's owned buffers. Shrinking never
    /// collects.
    fn resized(&mut self, before: usize, after: usize, roots: &dyn RootProvider) {
        if after > before {
            self.grow(after - before, roots);
        } else {
            self.bytes_allocated = self.bytes_allocated.saturating_sub(before - after);
        }
    }

    // ── strings ────────────────────────────────────────────────────

    /// Return the unique string object with these contents, creating it if
    /// needed.
    pub fn intern(&mut self, chars: &str, roots: &dyn RootProvider) -> ObjRef {
        let hash = hash_string(chars);
        if let Some(r) = self.find_interned(chars, hash) {
            self.scratch.push(Value::Obj(r));
            return r;
        }
        self.intern_new(VMString::new(chars), roots)
    }

    /// Like [`intern`](Self::intern) but takes ownership of the buffer.
    pub fn intern_owned(&mut self, chars: String, roots: &dyn RootProvider) -> ObjRef {
        let hash = hash_string(&chars);
        if let Some(r) = self.find_interned(&chars, hash) {
            self.scratch.push(Value::Obj(r));
            return r;
        }
        self.intern_new(VMString::new(chars), roots)
    }

    /// Interned concatenation of two strings.
    pub fn concat(
        &mut self,
        a: ObjRef,
        b: ObjRef,
        roots: &dyn RootProvider,
    ) -> Result<ObjRef, HeapError> {
        let (a, b) = (self.string(a)?, self.string(b)?);
        let mut chars = String::with_capacity(a.len() + b.len());
        chars.push_str(a.as_str());
        chars.push_str(b.as_str());
        Ok(self.intern_owned(chars, roots))
    }

    /// The interned string with these contents, if one exists. Never
    /// allocates.
    pub fn lookup(&self, chars: &str) -> Option<ObjRef> {
        self.find_interned(chars, hash_string(chars))
    }

    fn find_interned(&self, chars: &str, hash: u32) -> Option<ObjRef> {
        self.strings.find_string(chars, hash, |r| {
            match self.slot(r).and_then(|s| s.object.as_ref()) {
                Some(Object::String(s)) => Some(s.as_str()),
                _ => None,
            }
        })
    }

    fn intern_new(&mut self, string: VMString, roots: &dyn RootProvider) -> ObjRef {
        let hash = string.hash();
        let r = self.alloc(Object::String(string), roots);
        self.strings.set(Key { string: r, hash }, Value::Nil);
        r
    }

    /// The table key for an interned string.
    pub fn key(&self, r: ObjRef) -> Result<Key, HeapError> {
        Ok(Key {
            string: r,
            hash: self.string(r)?.hash(),
        })
    }

    /// Number of strings in the intern set.
    pub fn interned_count(&self) -> usize {
        self.strings.len()
    }

    // ── table mutation ─────────────────────────────────────────────

    /// Store an instance field. Returns `true` if the field is new.
    pub fn set_field(
        &mut self,
        instance: ObjRef,
        key: Key,
        value: Value,
        roots: &dyn RootProvider,
    ) -> Result<bool, HeapError> {
        let fields = &mut self.instance_mut(instance)?.fields;
        let before = fields.owned_bytes();
        let is_new = fields.set(key, value);
        let after = fields.owned_bytes();
        self.resized(before, after, roots);
        Ok(is_new)
    }

    /// Register a message handler on an actor template.
    pub fn set_handler(
        &mut self,
        actor: ObjRef,
        key: Key,
        closure: ObjRef,
        roots: &dyn RootProvider,
    ) -> Result<(), HeapError> {
        self.closure(closure)?;
        let handlers = &mut self.actor_mut(actor)?.handlers;
        let before = handlers.owned_bytes();
        handlers.set(key, Value::Obj(closure));
        let after = handlers.owned_bytes();
        self.resized(before, after, roots);
        Ok(())
    }

    // ── checked access ─────────────────────────────────────────────

    #[inline(always)]
    pub(crate) fn slot(&self, r: ObjRef) -> Option<&Slot> {
        self.slots
            .get(r.index())
            .filter(|s| s.generation == r.generation() && s.object.is_some())
    }

    #[inline(always)]
    pub fn get(&self, r: ObjRef) -> Result<&Object, HeapError> {
        self.slot(r)
            .and_then(|s| s.object.as_ref())
            .ok_or(HeapError::Dangling(r))
    }

    #[inline(always)]
    pub fn get_mut(&mut self, r: ObjRef) -> Result<&mut Object, HeapError> {
        self.slots
            .get_mut(r.index())
            .filter(|s| s.generation == r.generation())
            .and_then(|s| s.object.as_mut())
            .ok_or(HeapError::Dangling(r))
    }

    /// Kind of the object `value` refers to, if any.
    pub fn kind_of(&self, value: Value) -> Option<ObjectKind> {
        let r = value.as_obj()?;
        self.get(r).ok().map(Object::kind)
    }
}

macro_rules! accessors {
    ($($name:ident, $name_mut:ident => $variant:ident($ty:ty);)*) => {
        impl Heap {
            $(
                #[inline(always)]
                pub fn $name(&self, r: ObjRef) -> Result<&$ty, HeapError> {
                    match self.get(r)? {
                        Object::$variant(inner) => Ok(inner),
                        other => Err(HeapError::WrongKind {
                            expected: ObjectKind::$variant,
                            found: other.kind(),
                        }),
                    }
                }

                #[inline(always)]
                pub fn $name_mut(&mut self, r: ObjRef) -> Result<&mut $ty, HeapError> {
                    match self.get_mut(r)? {
                        Object::$variant(inner) => Ok(inner),
                        other => Err(HeapError::WrongKind {
                            expected: ObjectKind::$variant,
                            found: other.kind(),
                        }),
                    }
                }
            )*
        }
    };
}

accessors! {
    string, string_mut => String(VMString);
    function, function_mut => Function(Function);
    native, native_mut => Native(Native);
    closure, closure_mut => Closure(Closure);
    upvalue, upvalue_mut => Upvalue(Upvalue);
    actor, actor_mut => Actor(Actor);
    instance, instance_mut => Instance(Instance);
    bound_message, bound_message_mut => BoundMessage(BoundMessage);
}
