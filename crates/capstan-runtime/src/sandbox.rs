use wasmtime::component::ResourceTable;
use wasmtime_wasi::{WasiCtx, WasiCtxBuilder, WasiCtxView, WasiView};

/// WASI view backing the persistent runtime store.
///
/// Deny-default: no filesystem preopens and no host environment variables.
/// stdout/stderr are inherited so module prints reach the host console.
/// The argument vector modules observe is pinned to a single empty string,
/// regardless of the host's real argv.
pub struct SandboxState {
    ctx: WasiCtx,
    table: ResourceTable,
}

impl WasiView for SandboxState {
    fn ctx(&mut self) -> WasiCtxView<'_> {
        WasiCtxView {
            ctx: &mut self.ctx,
            table: &mut self.table,
        }
    }
}

impl SandboxState {
    pub fn new() -> Self {
        let ctx = WasiCtxBuilder::new()
            .args(&[""])
            .inherit_stdout()
            .inherit_stderr()
            .build();

        Self {
            ctx,
            table: ResourceTable::new(),
        }
    }
}

impl Default for SandboxState {
    fn default() -> Self {
        Self::new()
    }
}
