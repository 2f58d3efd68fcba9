mod heap;
mod gc;

pub use heap::*;

#[cfg(test)]
mod tests {
    use super::*;
    use object::{
        Actor, Closure, Function, Instance, ObjRef, Object, ObjectKind, Table,
        Upvalue, Value,
    };
    use std::sync::Arc;

    #[derive(Default)]
    struct TestRoots(Vec<Value>);

    impl RootProvider for TestRoots {
        fn visit_roots(&self, visitor: &mut dyn FnMut(Value)) {
            for &v in &self.0 {
                visitor(v);
            }
        }
    }

    fn create_test_heap() -> Heap {
        Heap::new(HeapSettings::default()).expect("valid settings")
    }

    fn stress_heap() -> Heap {
        Heap::new(HeapSettings {
            stress_gc: true,
            ..Default::default()
        })
        .expect("valid settings")
    }

    fn new_actor(heap: &mut Heap, name: &str) -> ObjRef {
        let name = heap.intern(name, &NoRoots);
        heap.alloc(
            Object::Actor(Actor {
                name,
                handlers: Table::new(),
            }),
            &NoRoots,
        )
    }

    fn new_instance(heap: &mut Heap, actor: ObjRef) -> ObjRef {
        heap.alloc(
            Object::Instance(Instance {
                actor,
                fields: Table::new(),
            }),
            &NoRoots,
        )
    }

    // ── Settings ───────────────────────────────────────────────────

    #[test]
    fn settings_validation() {
        assert!(HeapSettings::default().validate().is_ok());
        let bad = HeapSettings {
            grow_factor: 1,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        assert!(Heap::new(bad).is_err());
    }

    // ── Interning ──────────────────────────────────────────────────

    #[test]
    fn intern_returns_same_object() {
        let mut heap = create_test_heap();
        let a = heap.intern("ab", &NoRoots);
        let b = heap.intern("ab", &NoRoots);
        assert_eq!(a, b);
        assert_eq!(heap.interned_count(), 1);
    }

    #[test]
    fn concat_finds_existing_string() {
        let mut heap = create_test_heap();
        let ab = heap.intern("ab", &NoRoots);
        let a = heap.intern("a", &NoRoots);
        let b = heap.intern("b", &NoRoots);
        let joined = heap.concat(a, b, &NoRoots).expect("strings");
        assert_eq!(joined, ab);
    }

    #[test]
    fn concat_rejects_non_strings() {
        let mut heap = create_test_heap();
        let a = heap.intern("a", &NoRoots);
        let actor = new_actor(&mut heap, "A");
        assert_eq!(
            heap.concat(a, actor, &NoRoots),
            Err(HeapError::WrongKind {
                expected: ObjectKind::String,
                found: ObjectKind::Actor,
            })
        );
    }

    #[test]
    fn unreferenced_interned_strings_are_collected() {
        let mut heap = create_test_heap();
        let scope = heap.open_scope();
        let kept = heap.intern("kept", &NoRoots);
        let dropped = heap.intern("dropped", &NoRoots);
        heap.close_scope(scope);

        let roots = TestRoots(vec![Value::Obj(kept)]);
        heap.collect(&roots);

        assert!(heap.contains(kept));
        assert!(!heap.contains(dropped));
        assert_eq!(heap.interned_count(), 1);

        let again = heap.intern("dropped", &roots);
        assert_ne!(again, dropped);
        assert_eq!(heap.intern("kept", &roots), kept);
    }

    // ── Collection ─────────────────────────────────────────────────

    #[test]
    fn reachable_objects_survive_and_are_unmarked() {
        let mut heap = create_test_heap();
        let scope = heap.open_scope();
        let actor = new_actor(&mut heap, "Counter");
        let instance = new_instance(&mut heap, actor);
        let field = heap.intern("count", &NoRoots);
        let key = heap.key(field).expect("string");
        let payload = heap.intern("payload", &NoRoots);
        heap.set_field(instance, key, Value::Obj(payload), &NoRoots)
            .expect("instance");
        let garbage = new_instance(&mut heap, actor);
        heap.close_scope(scope);

        let roots = TestRoots(vec![Value::Obj(instance)]);
        heap.collect(&roots);

        for r in [instance, actor, field, payload] {
            assert!(heap.contains(r), "{r:?} should survive");
            assert!(!heap.is_marked(r));
        }
        assert!(!heap.contains(garbage));
        assert_eq!(heap.stats().collections, 1);
    }

    #[test]
    fn cycles_without_roots_are_collected() {
        let mut heap = create_test_heap();
        let scope = heap.open_scope();
        let actor = new_actor(&mut heap, "Node");
        let a = new_instance(&mut heap, actor);
        let b = new_instance(&mut heap, actor);
        let other = heap.intern("other", &NoRoots);
        let key = heap.key(other).expect("string");
        heap.set_field(a, key, Value::Obj(b), &NoRoots).expect("instance");
        heap.set_field(b, key, Value::Obj(a), &NoRoots).expect("instance");
        heap.close_scope(scope);

        heap.collect(&NoRoots);

        assert!(!heap.contains(a));
        assert!(!heap.contains(b));
        assert!(!heap.contains(actor));
        assert_eq!(heap.live_objects(), 0);
        assert_eq!(heap.bytes_allocated(), 0);
    }

    #[test]
    fn closure_keeps_function_and_closed_upvalues() {
        let mut heap = create_test_heap();
        let scope = heap.open_scope();
        let name = heap.intern("f", &NoRoots);
        let constant = heap.intern("constant", &NoRoots);
        let mut chunk = object::Chunk::new();
        chunk.add_constant(Value::Obj(constant));
        let function = heap.alloc(
            Object::Function(Function {
                arity: 0,
                upvalue_count: 1,
                chunk: Arc::new(chunk),
                name: Some(name),
            }),
            &NoRoots,
        );
        let captured = heap.intern("captured", &NoRoots);
        let upvalue = heap.alloc(
            Object::Upvalue(Upvalue::Closed(Value::Obj(captured))),
            &NoRoots,
        );
        let closure = heap.alloc(
            Object::Closure(Closure {
                function,
                upvalues: vec![upvalue],
            }),
            &NoRoots,
        );
        heap.close_scope(scope);

        heap.collect(&TestRoots(vec![Value::Obj(closure)]));

        for r in [closure, function, name, constant, upvalue, captured] {
            assert!(heap.contains(r), "{r:?} should survive");
        }
    }

    #[test]
    fn temporary_roots_survive_stress_collections() {
        let mut heap = stress_heap();
        let kept = heap.with_scope(|heap| {
            let actor = new_actor(heap, "A");
            // Every allocation below collects; `actor` must stay alive.
            let instance = new_instance(heap, actor);
            assert!(heap.contains(actor));
            assert!(heap.contains(instance));
            instance
        });

        heap.collect(&NoRoots);
        assert!(!heap.contains(kept));
        assert!(heap.stats().collections > 2);
    }

    #[test]
    fn freed_handles_never_resolve_to_new_objects() {
        let mut heap = create_test_heap();
        let scope = heap.open_scope();
        let old = heap.intern("old", &NoRoots);
        heap.close_scope(scope);
        heap.collect(&NoRoots);

        let new = heap.intern("new", &NoRoots);
        assert_eq!(new.index(), old.index());
        assert_ne!(new, old);
        assert_eq!(heap.string(old), Err(HeapError::Dangling(old)));
        assert_eq!(heap.string(new).map(|s| s.as_str()), Ok("new"));
    }

    #[test]
    fn kind_of_follows_live_handles() {
        let mut heap = create_test_heap();
        let scope = heap.open_scope();
        let name = heap.intern("name", &NoRoots);
        let actor = new_actor(&mut heap, "A");
        let instance = new_instance(&mut heap, actor);
        assert_eq!(heap.kind_of(Value::Obj(name)), Some(ObjectKind::String));
        assert_eq!(heap.kind_of(Value::Obj(actor)), Some(ObjectKind::Actor));
        assert_eq!(
            heap.kind_of(Value::Obj(instance)),
            Some(ObjectKind::Instance)
        );
        assert_eq!(heap.kind_of(Value::Number(1.0)), None);
        assert_eq!(heap.kind_of(Value::Nil), None);

        heap.close_scope(scope);
        heap.collect(&NoRoots);
        assert_eq!(heap.kind_of(Value::Obj(instance)), None);
    }

    #[test]
    fn threshold_doubles_live_bytes() {
        let mut heap = create_test_heap();
        let s = heap.intern("live", &NoRoots);
        heap.collect(&NoRoots);
        assert!(heap.contains(s));
        assert_eq!(heap.next_gc(), heap.bytes_allocated() * 2);
    }

    #[test]
    fn allocation_pressure_triggers_collection() {
        let mut heap = Heap::new(HeapSettings {
            initial_threshold: 4096,
            ..Default::default()
        })
        .expect("valid settings");
        for i in 0..1000 {
            heap.with_scope(|heap| heap.intern(&format!("s{i}"), &NoRoots));
        }
        assert!(heap.stats().collections > 0);
        assert!(heap.live_objects() < 1000);
    }
}
