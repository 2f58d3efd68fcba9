mod handle;
mod value;
mod table;
mod objects;

pub use handle::ObjRef;
pub use value::{Value, format_number};
pub use table::{Key, Table, hash_string};
pub use objects::{
    Object, ObjectKind,
    VMString, Function, Native, NativeFn, Closure, Upvalue,
    Actor, Instance, BoundMessage,
    Chunk,
};
