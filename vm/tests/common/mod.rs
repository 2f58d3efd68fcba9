#![allow(dead_code)]

use std::sync::Arc;

use heap::HeapSettings;
use object::ObjRef;
use parking_lot::Mutex;
use vm::{CompileSession, InterpretResult, RuntimeError, VM, VMCreateInfo, demos};

/// A VM whose output and error streams are captured in memory.
pub struct Harness {
    pub vm: VM,
    out: Arc<Mutex<Vec<u8>>>,
    err: Arc<Mutex<Vec<u8>>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(HeapSettings::default())
    }

    pub fn stress() -> Self {
        Self::with(HeapSettings {
            stress_gc: true,
            ..HeapSettings::default()
        })
    }

    pub fn with(heap: HeapSettings) -> Self {
        Self::with_info(heap, 64)
    }

    pub fn with_info(heap: HeapSettings, frames_max: usize) -> Self {
        let out = Arc::new(Mutex::new(Vec::new()));
        let err = Arc::new(Mutex::new(Vec::new()));
        let vm = VM::new(VMCreateInfo {
            heap,
            workers: 2,
            frames_max,
            out: out.clone(),
            err: err.clone(),
        })
        .expect("valid configuration");
        Self { vm, out, err }
    }

    pub fn run(&self, stage: impl FnOnce(&mut CompileSession<'_>) -> ObjRef) -> InterpretResult {
        self.vm.interpret_with(|session| Ok(stage(session)))
    }

    /// Run a stage that must succeed, then wait for its messages.
    pub fn ok(&self, stage: impl FnOnce(&mut CompileSession<'_>) -> ObjRef) {
        let result = self.run(stage);
        assert!(result.is_ok(), "unexpected {result:?}; stderr: {}", self.err());
        self.vm.wait_idle();
    }

    pub fn runtime_error(
        &self,
        stage: impl FnOnce(&mut CompileSession<'_>) -> ObjRef,
    ) -> RuntimeError {
        match self.run(stage) {
            InterpretResult::RuntimeError(err) => err,
            other => panic!("expected a runtime error, got {other:?}"),
        }
    }

    pub fn demo(&self, name: &str) {
        let demo = demos::find(name).expect("known demo");
        for &stage in demo.stages {
            self.ok(stage);
        }
    }

    pub fn out(&self) -> String {
        String::from_utf8_lossy(&self.out.lock()).into_owned()
    }

    pub fn err(&self) -> String {
        String::from_utf8_lossy(&self.err.lock()).into_owned()
    }
}
