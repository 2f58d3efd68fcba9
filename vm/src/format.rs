use heap::Heap;
use object::{ObjRef, Object, Value, format_number};

/// Render a value the way `print` shows it.
pub fn format_value(heap: &Heap, value: Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        Value::Obj(r) => format_object(heap, r),
    }
}

fn format_object(heap: &Heap, r: ObjRef) -> String {
    let Ok(object) = heap.get(r) else {
        return format!("<dangling {r:?}>");
    };
    match object {
        Object::String(s) => s.as_str().to_string(),
        Object::Function(f) => match f.name {
            Some(name) => format!("<fn {}>", string_or(heap, name, "?")),
            None => "<script>".to_string(),
        },
        Object::Native(_) => "<native fn>".to_string(),
        Object::Closure(c) => format_object(heap, c.function),
        Object::Upvalue(_) => "upvalue".to_string(),
        Object::Actor(a) => format!("<actor {}>", string_or(heap, a.name, "?")),
        Object::Instance(i) => match heap.actor(i.actor) {
            Ok(actor) => format!("<{} instance>", string_or(heap, actor.name, "?")),
            Err(_) => "<instance>".to_string(),
        },
        Object::BoundMessage(b) => format_object(heap, b.method),
    }
}

fn string_or<'h>(heap: &'h Heap, r: ObjRef, fallback: &'h str) -> &'h str {
    heap.string(r).map(|s| s.as_str()).unwrap_or(fallback)
}

/// Name of a function for stack traces: `Some("name")`, or `None` for the
/// top-level script.
pub(crate) fn function_name(heap: &Heap, function: ObjRef) -> Option<String> {
    let name = heap.function(function).ok()?.name?;
    Some(string_or(heap, name, "?").to_string())
}
