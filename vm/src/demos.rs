//! Built-in programs assembled directly as bytecode. The binary runs them;
//! the integration tests reuse them.

use bytecode::{Capture, Op};
use object::{ObjRef, Value};

use crate::{builder::FunctionBuilder, compile::CompileSession};

/// Produces one top-level script.
pub type Stage = fn(&mut CompileSession<'_>) -> ObjRef;

/// A named program. Stages run one after another on the same VM, with a
/// barrier on outstanding actor messages in between.
pub struct Demo {
    pub name: &'static str,
    pub about: &'static str,
    pub stages: &'static [Stage],
}

pub const DEMOS: &[Demo] = &[
    Demo {
        name: "arithmetic",
        about: "val x = 1 + 2; print x; print (x * 4 - 2) / 5; print -x;",
        stages: &[arithmetic],
    },
    Demo {
        name: "strings",
        about: "var s = \"a\" + \"b\"; print s; print s == \"ab\";",
        stages: &[strings],
    },
    Demo {
        name: "closures",
        about: "a counter closure over a captured local",
        stages: &[closures],
    },
    Demo {
        name: "counter",
        about: "an actor receiving three asynchronous inc messages",
        stages: &[counter_setup, counter_report],
    },
];

pub fn find(name: &str) -> Option<&'static Demo> {
    DEMOS.iter().find(|demo| demo.name == name)
}

fn arithmetic(session: &mut CompileSession<'_>) -> ObjRef {
    let mut f = FunctionBuilder::script();
    let x = f.string(session, "x");

    f.load(Value::Number(1.0));
    f.load(Value::Number(2.0));
    f.op(Op::Add);
    f.define_constant(x);

    f.set_line(2);
    f.get_global(x);
    f.op(Op::Print);

    f.set_line(3);
    f.get_global(x);
    f.load(Value::Number(4.0));
    f.op(Op::Multiply);
    f.load(Value::Number(2.0));
    f.op(Op::Subtract);
    f.load(Value::Number(5.0));
    f.op(Op::Divide);
    f.op(Op::Print);

    f.set_line(4);
    f.get_global(x);
    f.op(Op::Negate);
    f.op(Op::Print);

    f.op(Op::Nil);
    f.op(Op::Return);
    f.finish(session)
}

fn strings(session: &mut CompileSession<'_>) -> ObjRef {
    let mut f = FunctionBuilder::script();
    let s = f.string(session, "s");
    let a = f.string(session, "a");
    let b = f.string(session, "b");
    let ab = f.string(session, "ab");

    f.constant(a);
    f.constant(b);
    f.op(Op::Add);
    f.define_global(s);

    f.set_line(2);
    f.get_global(s);
    f.op(Op::Print);

    f.set_line(3);
    f.get_global(s);
    f.constant(ab);
    f.op(Op::Equal);
    f.op(Op::Print);

    f.op(Op::Nil);
    f.op(Op::Return);
    f.finish(session)
}

/// ```text
/// fun makeCounter() {
///   var count = 0;
///   fun counter() { count = count + 1; return count; }
///   return counter;
/// }
/// var c = makeCounter();
/// print c();
/// print c();
/// ```
fn closures(session: &mut CompileSession<'_>) -> ObjRef {
    let mut counter = FunctionBuilder::new("counter", 0).upvalues(1);
    counter.set_line(3);
    counter.get_upvalue(0);
    counter.load(Value::Number(1.0));
    counter.op(Op::Add);
    counter.set_upvalue(0);
    counter.op(Op::Pop);
    counter.get_upvalue(0);
    counter.op(Op::Return);
    let counter = counter.finish(session);

    let mut make = FunctionBuilder::new("makeCounter", 0);
    make.set_line(2);
    make.load(Value::Number(0.0));
    make.set_line(3);
    let idx = make.function(counter);
    make.closure(idx, &[Capture { is_local: true, index: 1 }]);
    make.set_line(4);
    make.get_local(2);
    make.op(Op::Return);
    let make = make.finish(session);

    let mut f = FunctionBuilder::script();
    let make_name = f.string(session, "makeCounter");
    let c = f.string(session, "c");
    let idx = f.function(make);
    f.closure(idx, &[]);
    f.define_global(make_name);

    f.set_line(6);
    f.get_global(make_name);
    f.call(0);
    f.define_global(c);

    for line in [7, 8] {
        f.set_line(line);
        f.get_global(c);
        f.call(0);
        f.op(Op::Print);
    }

    f.op(Op::Nil);
    f.op(Op::Return);
    f.finish(session)
}

/// ```text
/// actor Counter {
///   init() { this.count = 0; }
///   inc() { this.count = this.count + 1; }
/// }
/// var c = Counter();
/// send c.inc(); send c.inc(); send c.inc();
/// ```
fn counter_setup(session: &mut CompileSession<'_>) -> ObjRef {
    let mut init = FunctionBuilder::new("init", 0);
    let count = init.string(session, "count");
    init.set_line(2);
    init.get_local(0);
    init.load(Value::Number(0.0));
    init.set_property(count);
    init.op(Op::Pop);
    init.op(Op::Nil);
    init.op(Op::Return);
    let init = init.finish(session);

    let mut inc = FunctionBuilder::new("inc", 0);
    let count = inc.string(session, "count");
    inc.set_line(3);
    inc.get_local(0);
    inc.get_local(0);
    inc.get_property(count);
    inc.load(Value::Number(1.0));
    inc.op(Op::Add);
    inc.set_property(count);
    inc.op(Op::Pop);
    inc.op(Op::Nil);
    inc.op(Op::Return);
    let inc = inc.finish(session);

    let mut f = FunctionBuilder::script();
    let actor_name = f.string(session, "Counter");
    let init_name = f.string(session, "init");
    let inc_name = f.string(session, "inc");
    let c = f.string(session, "c");

    f.actor(actor_name);
    let idx = f.function(init);
    f.closure(idx, &[]);
    f.handler(init_name);
    let idx = f.function(inc);
    f.closure(idx, &[]);
    f.handler(inc_name);
    f.define_global(actor_name);

    f.set_line(5);
    f.get_global(actor_name);
    f.call(0);
    f.define_global(c);

    f.set_line(6);
    for _ in 0..3 {
        f.get_global(c);
        f.send(inc_name, 0);
        f.op(Op::Pop);
    }

    f.op(Op::Nil);
    f.op(Op::Return);
    f.finish(session)
}

/// `print c.count;`
fn counter_report(session: &mut CompileSession<'_>) -> ObjRef {
    let mut f = FunctionBuilder::script();
    let c = f.string(session, "c");
    let count = f.string(session, "count");
    f.get_global(c);
    f.get_property(count);
    f.op(Op::Print);
    f.op(Op::Nil);
    f.op(Op::Return);
    f.finish(session)
}
