use thiserror::Error;

/// Failure outcomes of the bridge.
///
/// Every fallible operation returns one of these directly to its caller;
/// the host decides per outcome whether to abort, retry against a different
/// installation, or proceed degraded. The bridge never retries on its own.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// No candidate pack location exists. Returned by `initialize` before
    /// any runtime state is touched.
    #[error("no module pack found in any candidate location")]
    HomeNotFound,

    #[error("runtime startup failed: {0}")]
    Initialize(String),

    /// The installed pack reports a version outside the supported range.
    /// When `initialize` returns this, the runtime is left started.
    #[error("unsupported pack version: expected prefix '{expected}', found '{found}'")]
    VersionMismatch { expected: String, found: String },

    /// No module file with this name on the search path.
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("failed to load module '{module}': {reason}")]
    LoadModule { module: String, reason: String },

    /// The module was never loaded into the registry.
    #[error("module not loaded: {0}")]
    ModuleNotLoaded(String),

    /// The module has no export with this name, or it was never resolved
    /// with `load_function`.
    #[error("function not found: {module}.{function}")]
    FunctionNotFound { module: String, function: String },

    #[error("invocation of '{function}' failed: {reason}")]
    Invocation { function: String, reason: String },

    /// The working directory could not be appended to the module search
    /// path. The runtime is left started.
    #[error("cannot extend module search path: {0}")]
    SearchPath(String),

    /// The runtime was never successfully initialized.
    #[error("runtime not initialized")]
    NotInitialized,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
