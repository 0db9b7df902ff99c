use std::path::PathBuf;

use tokio::sync::Mutex;
use wasmtime::component::{Component, Val};
use wasmtime::{Engine, Store};

use crate::error::RuntimeError;
use crate::pack::{self, ModulePack, SUPPORTED_PACK_VERSION};
use crate::registry::ModuleRegistry;
use crate::runtime_context::RuntimeContext;
use crate::sandbox::SandboxState;

/// Factory for a built-in module: host code that constructs a component
/// instead of resolving one from the pack.
pub type ModuleFactory = fn(&Engine) -> anyhow::Result<Component>;

/// Success outcome of [`ScriptHost::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    /// The runtime was started by this call.
    Initialized,
    /// The runtime was already live; any supplied builtins were merged in.
    AlreadyInitialized,
}

/// Everything that exists only while the runtime is live.
struct Started {
    store: Store<SandboxState>,
    registry: ModuleRegistry,
    pack: ModulePack,
    pack_version: Option<String>,
    search_paths: Vec<PathBuf>,
}

/// The embedded script runtime.
///
/// `ScriptHost` owns the engine, the linker, and, once
/// [`initialize`](Self::initialize)d, the persistent store holding every
/// live module instance. It is the single point of contact between host
/// code and the execution layer: load modules by name, resolve their
/// exported functions, invoke them with marshalled arguments.
///
/// # Threading
///
/// `ScriptHost` is `Send + Sync` and is typically wrapped in an `Arc`. The
/// started state lives behind one async mutex: loads and calls serialize,
/// because runtime values are only meaningful while the store is held.
/// Teardown happens at most once, when [`shutdown`](Self::shutdown) is
/// called or the host is dropped.
pub struct ScriptHost {
    ctx: RuntimeContext,
    home_override: Option<PathBuf>,
    started: Mutex<Option<Started>>,
}

impl ScriptHost {
    /// Build the engine and linker. Cheap; nothing is discovered or
    /// started until [`initialize`](Self::initialize).
    ///
    /// `home_override` replaces the candidate probe with a single fixed
    /// pack location.
    pub fn new(home_override: Option<PathBuf>) -> anyhow::Result<Self> {
        Ok(Self {
            ctx: RuntimeContext::new()?,
            home_override,
            started: Mutex::new(None),
        })
    }

    /// Engine handle, for building [`ModuleFactory`] components.
    pub fn engine(&self) -> &Engine {
        &self.ctx.engine
    }

    /// Start the runtime, or merge `builtins` into it if it is already
    /// live.
    ///
    /// The startup sequence: probe the candidate locations for the module
    /// pack, create the store, install the builtins, verify the pack
    /// version, and append the working directory to the module search
    /// path. Every failure is a distinct [`RuntimeError`];
    /// [`RuntimeError::VersionMismatch`] and [`RuntimeError::SearchPath`]
    /// leave the runtime started, so the host may proceed degraded.
    pub async fn initialize(
        &self,
        builtins: &[(&str, ModuleFactory)],
    ) -> Result<InitStatus, RuntimeError> {
        let mut slot = self.started.lock().await;

        if let Some(started) = slot.as_mut() {
            // Late binding: install into the live runtime. A failing
            // factory skips its module rather than poisoning the runtime.
            for (name, factory) in builtins {
                if let Err(e) = install_builtin(&self.ctx, started, name, *factory).await {
                    tracing::warn!(module = name, "builtin skipped: {e}");
                }
            }
            return Ok(InitStatus::AlreadyInitialized);
        }

        let pack = match &self.home_override {
            Some(path) => ModulePack::discover(std::slice::from_ref(path)),
            None => ModulePack::discover(&ModulePack::candidates()),
        }
        .ok_or(RuntimeError::HomeNotFound)?;

        tracing::info!(home = %pack.root().display(), "starting runtime");

        let mut started = Started {
            store: Store::new(&self.ctx.engine, SandboxState::new()),
            registry: ModuleRegistry::default(),
            search_paths: vec![pack.root().to_path_buf()],
            pack_version: None,
            pack,
        };

        // Early binding: builtins are part of startup, so a failing
        // factory fails initialization outright.
        for (name, factory) in builtins {
            install_builtin(&self.ctx, &mut started, name, *factory)
                .await
                .map_err(|e| RuntimeError::Initialize(format!("builtin '{name}': {e}")))?;
        }

        let manifest = match started.pack.manifest() {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!("unreadable pack manifest: {e}");
                None
            }
        };
        started.pack_version = manifest.as_ref().map(|m| m.version.clone());

        // Version contract: a mismatch leaves the runtime started.
        match &manifest {
            Some(m) if !m.version.starts_with(SUPPORTED_PACK_VERSION) => {
                let found = m.version.clone();
                *slot = Some(started);
                tracing::warn!(
                    found,
                    expected = SUPPORTED_PACK_VERSION,
                    "pack version mismatch"
                );
                return Err(RuntimeError::VersionMismatch {
                    expected: SUPPORTED_PACK_VERSION.to_owned(),
                    found,
                });
            }
            Some(m) => {
                tracing::debug!(pack = %m.name, version = %m.version, "pack manifest verified");
            }
            None => {
                tracing::warn!("pack has no manifest, skipping version check");
            }
        }

        // Modules colocated with the host executable are importable by
        // simple name.
        match std::env::current_dir() {
            Ok(cwd) => started.search_paths.push(cwd),
            Err(e) => {
                *slot = Some(started);
                return Err(RuntimeError::SearchPath(e.to_string()));
            }
        }

        *slot = Some(started);
        tracing::info!("runtime started");
        Ok(InitStatus::Initialized)
    }

    /// Import a module by name.
    ///
    /// The name is resolved across the search path (`<dir>/<name>.wasm`,
    /// then `<dir>/<name>.wat`), compiled through the pack's precompiled
    /// cache, and instantiated into the runtime. Loading an already-loaded
    /// name replaces its entry; the registry is unchanged on failure.
    pub async fn load_module(&self, name: &str) -> Result<(), RuntimeError> {
        let mut slot = self.started.lock().await;
        let started = slot.as_mut().ok_or(RuntimeError::NotInitialized)?;

        let path = pack::resolve_module(&started.search_paths, name)
            .ok_or_else(|| RuntimeError::ModuleNotFound(name.to_owned()))?;
        let source = std::fs::read(&path)?;
        let component = started.pack.load_or_compile(name, &source, &self.ctx.engine)?;

        let instance = self
            .ctx
            .linker
            .instantiate_async(&mut started.store, &component)
            .await
            .map_err(|e| RuntimeError::LoadModule {
                module: name.to_owned(),
                reason: e.to_string(),
            })?;

        started.registry.insert_module(name, instance);
        tracing::info!(module = name, path = %path.display(), "module loaded");
        Ok(())
    }

    /// Construct a module from source bytes or text instead of a file on
    /// the search path.
    pub async fn load_module_from_source(
        &self,
        name: &str,
        source: impl AsRef<[u8]>,
    ) -> Result<(), RuntimeError> {
        let mut slot = self.started.lock().await;
        let started = slot.as_mut().ok_or(RuntimeError::NotInitialized)?;

        let component = Component::new(&self.ctx.engine, source.as_ref()).map_err(|e| {
            RuntimeError::LoadModule {
                module: name.to_owned(),
                reason: e.to_string(),
            }
        })?;
        let instance = self
            .ctx
            .linker
            .instantiate_async(&mut started.store, &component)
            .await
            .map_err(|e| RuntimeError::LoadModule {
                module: name.to_owned(),
                reason: e.to_string(),
            })?;

        started.registry.insert_module(name, instance);
        tracing::info!(module = name, "module loaded from source");
        Ok(())
    }

    /// Load every module file present in the pack directory, logging and
    /// skipping ones that fail. Returns how many loaded.
    pub async fn load_installed(&self) -> usize {
        let names = {
            let slot = self.started.lock().await;
            let Some(started) = slot.as_ref() else {
                return 0;
            };
            match started.pack.module_names() {
                Ok(names) => names,
                Err(e) => {
                    tracing::warn!("cannot list installed modules: {e}");
                    return 0;
                }
            }
        };

        let mut loaded = 0;
        for name in names {
            match self.load_module(&name).await {
                Ok(()) => loaded += 1,
                Err(e) => tracing::warn!(module = %name, "installed module skipped: {e}"),
            }
        }
        loaded
    }

    /// Resolve an exported function on a previously loaded module and
    /// record the handle for [`call_function`](Self::call_function).
    ///
    /// Resolving against an unloaded module is the deterministic
    /// [`RuntimeError::ModuleNotLoaded`]; a missing export is
    /// [`RuntimeError::FunctionNotFound`]. Repeat calls overwrite the
    /// stored handle.
    pub async fn load_function(&self, module: &str, function: &str) -> Result<(), RuntimeError> {
        let mut slot = self.started.lock().await;
        let started = slot.as_mut().ok_or(RuntimeError::NotInitialized)?;

        let instance = started.registry.instance(module)?;
        let func = instance
            .get_func(&mut started.store, function)
            .ok_or_else(|| RuntimeError::FunctionNotFound {
                module: module.to_owned(),
                function: function.to_owned(),
            })?;

        started.registry.insert_function(module, function, func)?;
        tracing::debug!(module, function, "function resolved");
        Ok(())
    }

    /// Invoke a previously resolved function with a positional argument
    /// slice (see [`dynamic_args!`](crate::dynamic_args)).
    ///
    /// Returns the raw runtime result (`None` for functions without one)
    /// for the caller to convert with
    /// [`from_dynamic`](crate::marshal::from_dynamic).
    pub async fn call_function(
        &self,
        module: &str,
        function: &str,
        args: &[Val],
    ) -> Result<Option<Val>, RuntimeError> {
        let mut slot = self.started.lock().await;
        let started = slot.as_mut().ok_or(RuntimeError::NotInitialized)?;

        let func = started.registry.function(module, function)?;

        tracing::debug!(module, function, argc = args.len(), "invoking function");

        let result_len = func.results(&started.store).len();
        let mut results = vec![Val::Bool(false); result_len]; // overwritten by the call

        func.call_async(&mut started.store, args, &mut results)
            .await
            .map_err(|e| RuntimeError::Invocation {
                function: format!("{module}.{function}"),
                reason: e.to_string(),
            })?;

        // Required after any call that returns results, before the store
        // can be used again.
        func.post_return_async(&mut started.store)
            .await
            .map_err(|e| RuntimeError::Invocation {
                function: format!("{module}.{function}"),
                reason: format!("post-return: {e}"),
            })?;

        Ok(results.into_iter().next())
    }

    /// True once `initialize` has succeeded, including the non-fatal
    /// outcomes that leave the runtime started.
    pub async fn is_initialized(&self) -> bool {
        self.started.lock().await.is_some()
    }

    pub async fn has_module(&self, module: &str) -> bool {
        self.started
            .lock()
            .await
            .as_ref()
            .is_some_and(|started| started.registry.has_module(module))
    }

    pub async fn has_function(&self, module: &str, function: &str) -> bool {
        self.started
            .lock()
            .await
            .as_ref()
            .is_some_and(|started| started.registry.has_function(module, function))
    }

    /// Names of all loaded modules, sorted.
    pub async fn module_names(&self) -> Vec<String> {
        self.started
            .lock()
            .await
            .as_ref()
            .map(|started| started.registry.module_names())
            .unwrap_or_default()
    }

    /// Version reported by the installed pack's manifest, if it had one.
    pub async fn pack_version(&self) -> Option<String> {
        self.started
            .lock()
            .await
            .as_ref()
            .and_then(|started| started.pack_version.clone())
    }

    /// Tear the runtime down: every instance and resolved function handle
    /// goes with the store. Returns whether there was a live runtime.
    /// Dropping the host has the same effect; either way teardown happens
    /// at most once.
    pub async fn shutdown(&self) -> bool {
        let dropped = self.started.lock().await.take().is_some();
        if dropped {
            tracing::info!("runtime shut down");
        }
        dropped
    }
}

/// Compile a builtin through its factory and instantiate it into the live
/// store under `name`.
async fn install_builtin(
    ctx: &RuntimeContext,
    started: &mut Started,
    name: &str,
    factory: ModuleFactory,
) -> anyhow::Result<()> {
    let component = factory(&ctx.engine)?;
    let instance = ctx
        .linker
        .instantiate_async(&mut started.store, &component)
        .await?;
    started.registry.insert_module(name, instance);
    tracing::info!(module = name, "builtin module installed");
    Ok(())
}
