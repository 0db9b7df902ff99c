use anyhow::Result;
use wasmtime::component::Linker;
use wasmtime::{Config, Engine};

use crate::sandbox::SandboxState;

/// Shared engine and linker.
///
/// Constructed once per [`ScriptHost`](crate::ScriptHost) and reused for
/// every module compile and instantiation. The engine is thread-safe; the
/// linker is pre-configured with the WASI host functions the sandbox
/// exposes.
pub struct RuntimeContext {
    pub engine: Engine,
    pub linker: Linker<SandboxState>,
}

impl RuntimeContext {
    pub fn new() -> Result<Self> {
        let mut config = Config::new();
        config.wasm_component_model(true);
        config.async_support(true);

        let engine = Engine::new(&config)?;
        let mut linker: Linker<SandboxState> = Linker::new(&engine);

        // Wire WASI p2 host functions (clocks, random, stdio, ...)
        wasmtime_wasi::p2::add_to_linker_async(&mut linker)?;

        tracing::debug!("runtime context ready (component model, async, WASI p2)");

        Ok(Self { engine, linker })
    }
}
