mod common;

use bytecode::Op;
use common::Harness;
use heap::HeapSettings;
use object::{ObjRef, Value};
use vm::{CompileSession, FunctionBuilder};

fn end(mut f: FunctionBuilder, session: &mut CompileSession<'_>) -> ObjRef {
    f.op(Op::Nil);
    f.op(Op::Return);
    f.finish(session)
}

#[test]
fn demos_survive_stress_collection() {
    let h = Harness::stress();
    for name in ["arithmetic", "strings", "closures", "counter"] {
        h.demo(name);
    }
    assert_eq!(h.out(), "3\n2\n-3\nab\ntrue\n1\n2\n3\n");
    assert!(h.vm.stats().collections > 0);
}

#[test]
fn unreachable_cycle_is_collected() {
    let h = Harness::new();
    // actor Node {}  var a = Node(); var b = Node(); a.other = b; b.other = a;
    h.ok(|session| {
        let mut f = FunctionBuilder::script();
        let node = f.string(session, "Node");
        let a = f.string(session, "a");
        let b = f.string(session, "b");
        let other = f.string(session, "other");
        f.actor(node);
        f.define_global(node);
        for var in [a, b] {
            f.get_global(node);
            f.call(0);
            f.define_global(var);
        }
        for (from, to) in [(a, b), (b, a)] {
            f.get_global(from);
            f.get_global(to);
            f.set_property(other);
            f.op(Op::Pop);
        }
        end(f, session)
    });

    let a = h.vm.global("a").and_then(Value::as_obj).expect("a");
    let b = h.vm.global("b").and_then(Value::as_obj).expect("b");
    h.vm.collect_garbage();
    assert!(h.vm.inspect(|heap| heap.contains(a) && heap.contains(b)));

    h.ok(|session| {
        let mut f = FunctionBuilder::script();
        let a = f.string(session, "a");
        let b = f.string(session, "b");
        for var in [a, b] {
            f.op(Op::Nil);
            f.set_global(var);
            f.op(Op::Pop);
        }
        end(f, session)
    });
    h.vm.collect_garbage();
    assert!(h.vm.inspect(|heap| !heap.contains(a) && !heap.contains(b)));
    // The template is still a global.
    let node = h.vm.global("Node").and_then(Value::as_obj).expect("Node");
    assert!(h.vm.inspect(|heap| heap.contains(node)));
}

#[test]
fn unreferenced_strings_leave_the_intern_set() {
    let h = Harness::new();
    h.vm.intern("ephemeral");
    assert!(h.vm.inspect(|heap| heap.lookup("ephemeral").is_some()));
    h.vm.collect_garbage();
    assert!(h.vm.inspect(|heap| heap.lookup("ephemeral").is_none()));

    // Global names and string values stay interned.
    h.demo("strings");
    h.vm.collect_garbage();
    assert!(h.vm.inspect(|heap| heap.lookup("ab").is_some() && heap.lookup("s").is_some()));
    assert_eq!(h.vm.display(h.vm.global("s").expect("s")), "ab");
}

#[test]
fn allocation_pressure_triggers_collection() {
    let h = Harness::with(HeapSettings {
        initial_threshold: 4 * 1024,
        ..HeapSettings::default()
    });
    // var s = ""; for (var i = 0; i < 300; i = i + 1) s = s + "x" + "";
    h.ok(|session| {
        let mut f = FunctionBuilder::script();
        let s = f.string(session, "s");
        let empty = f.string(session, "");
        let x = f.string(session, "x");
        f.constant(empty);
        f.define_global(s);

        f.load(Value::Number(0.0));
        let top = f.current_offset();
        f.get_local(1);
        f.load(Value::Number(300.0));
        f.op(Op::Less);
        let exit = f.jump_if_false();
        f.op(Op::Pop);
        f.get_global(s);
        f.constant(x);
        f.op(Op::Add);
        f.set_global(s);
        f.op(Op::Pop);
        f.get_local(1);
        f.load(Value::Number(1.0));
        f.op(Op::Add);
        f.set_local(1);
        f.op(Op::Pop);
        f.jump_back(top);
        f.bind(exit);
        f.op(Op::Pop);
        f.op(Op::Pop);
        end(f, session)
    });

    let stats = h.vm.stats();
    assert!(stats.collections > 0);
    assert!(stats.objects_freed > 0);
    let s = h.vm.global("s").expect("s");
    assert_eq!(h.vm.display(s), "x".repeat(300));
}

#[test]
fn pending_messages_keep_arguments_alive() {
    let h = Harness::stress();
    h.ok(|session| {
        // keep(v) { this.v = v; }
        let keep = {
            let mut f = FunctionBuilder::new("keep", 1);
            let v = f.string(session, "v");
            f.get_local(0);
            f.get_local(1);
            f.set_property(v);
            f.op(Op::Pop);
            f.op(Op::Nil);
            f.op(Op::Return);
            f.finish(session)
        };
        let mut f = FunctionBuilder::script();
        let box_name = f.string(session, "Box");
        let keep_name = f.string(session, "keep");
        let bx = f.string(session, "bx");
        let left = f.string(session, "left");
        let right = f.string(session, "right");
        f.actor(box_name);
        let idx = f.function(keep);
        f.closure(idx, &[]);
        f.handler(keep_name);
        f.define_global(box_name);
        f.get_global(box_name);
        f.call(0);
        f.define_global(bx);
        // send bx.keep("left" + "right");  the argument exists nowhere else.
        f.get_global(bx);
        f.constant(left);
        f.constant(right);
        f.op(Op::Add);
        f.send(keep_name, 1);
        f.op(Op::Pop);
        // Allocate (and so collect) while the message is still queued.
        f.constant(left);
        f.constant(left);
        f.op(Op::Add);
        f.op(Op::Pop);
        end(f, session)
    });
    h.vm.collect_garbage();
    h.ok(|session| {
        let mut f = FunctionBuilder::script();
        let bx = f.string(session, "bx");
        let v = f.string(session, "v");
        f.get_global(bx);
        f.get_property(v);
        f.op(Op::Print);
        end(f, session)
    });
    assert_eq!(h.out(), "leftright\n");
}
