use heap::{Heap, HeapError, NoRoots, RootProvider};
use object::{Key, Native, NativeFn, ObjRef, Object, Table, Value};

/// Process-wide runtime state. Every execution context touches it only while
/// holding the world lock, which is what makes collection stop-the-world.
pub struct World {
    pub heap: Heap,
    pub globals: Table,
    /// Names bound with `val`. Values are unused.
    pub constants: Table,
    /// `"init"`, looked up on every constructor call.
    pub init_string: ObjRef,
}

/// The roots owned by the world itself.
pub(crate) struct WorldRoots<'a> {
    globals: &'a Table,
    constants: &'a Table,
    init_string: ObjRef,
}

impl RootProvider for WorldRoots<'_> {
    fn visit_roots(&self, visitor: &mut dyn FnMut(Value)) {
        visitor(Value::Obj(self.init_string));
        for table in [self.globals, self.constants] {
            for (key, value) in table.iter() {
                visitor(Value::Obj(key.string));
                visitor(value);
            }
        }
    }
}

impl World {
    pub fn new(mut heap: Heap) -> Self {
        let init_string = heap.with_scope(|heap| heap.intern("init", &NoRoots));
        Self {
            heap,
            globals: Table::new(),
            constants: Table::new(),
            init_string,
        }
    }

    /// Borrow the heap mutably together with the world's own roots.
    pub(crate) fn split(&mut self) -> (&mut Heap, WorldRoots<'_>) {
        let World {
            heap,
            globals,
            constants,
            init_string,
        } = self;
        let roots = WorldRoots {
            globals,
            constants,
            init_string: *init_string,
        };
        (heap, roots)
    }

    /// Bind a host function as a global.
    pub fn define_native(
        &mut self,
        name: &str,
        function: NativeFn,
        extra: &dyn RootProvider,
    ) -> Result<(), HeapError> {
        let scope = self.heap.open_scope();
        let result = self.bind_native(name, function, extra);
        self.heap.close_scope(scope);
        result
    }

    fn bind_native(
        &mut self,
        name: &str,
        function: NativeFn,
        extra: &dyn RootProvider,
    ) -> Result<(), HeapError> {
        let (heap, roots) = self.split();
        let roots = (&roots, extra);
        let name = heap.intern(name, &roots);
        let native = heap.alloc(Object::Native(Native { function }), &roots);
        let key = heap.key(name)?;
        self.globals.set(key, Value::Obj(native));
        Ok(())
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        let key = self.key_of(name)?;
        self.globals.get(key)
    }

    pub(crate) fn key_of(&self, name: &str) -> Option<Key> {
        let string = self.heap.lookup(name)?;
        self.heap.key(string).ok()
    }
}
