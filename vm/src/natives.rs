use std::{sync::OnceLock, time::Instant};

use heap::{HeapError, RootProvider};
use object::Value;

use crate::world::World;

static STARTED: OnceLock<Instant> = OnceLock::new();

/// Bind the built-in natives as globals.
pub(crate) fn install(world: &mut World, roots: &dyn RootProvider) -> Result<(), HeapError> {
    STARTED.get_or_init(Instant::now);
    world.define_native("clock", clock, roots)?;
    Ok(())
}

fn clock(_args: &[Value]) -> Result<Value, String> {
    let started = STARTED.get_or_init(Instant::now);
    Ok(Value::Number(started.elapsed().as_secs_f64()))
}
