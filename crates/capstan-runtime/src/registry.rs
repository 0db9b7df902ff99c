use std::collections::HashMap;

use wasmtime::component::{Func, Instance};

use crate::error::RuntimeError;

/// One instantiated module: the instance handle plus the functions
/// resolved from it so far. Handles live in the runtime store and are torn
/// down en masse with it; the registry never owns runtime memory.
pub(crate) struct ModuleEntry {
    instance: Instance,
    functions: HashMap<String, Func>,
}

/// Name → module index for everything instantiated into the runtime.
///
/// Stores opaque handles only; all lookups against missing names are
/// explicit errors rather than defaulted handles.
#[derive(Default)]
pub(crate) struct ModuleRegistry {
    modules: HashMap<String, ModuleEntry>,
}

impl ModuleRegistry {
    /// Insert a freshly instantiated module, replacing any previous entry
    /// of the same name. Re-import replaces the handle; the function map
    /// starts empty either way.
    pub fn insert_module(&mut self, name: &str, instance: Instance) {
        self.modules.insert(
            name.to_owned(),
            ModuleEntry {
                instance,
                functions: HashMap::new(),
            },
        );
    }

    pub fn instance(&self, module: &str) -> Result<Instance, RuntimeError> {
        self.modules
            .get(module)
            .map(|entry| entry.instance)
            .ok_or_else(|| RuntimeError::ModuleNotLoaded(module.to_owned()))
    }

    /// Record a resolved function handle under `module`, overwriting any
    /// previous resolution of the same name.
    pub fn insert_function(
        &mut self,
        module: &str,
        function: &str,
        func: Func,
    ) -> Result<(), RuntimeError> {
        let entry = self
            .modules
            .get_mut(module)
            .ok_or_else(|| RuntimeError::ModuleNotLoaded(module.to_owned()))?;
        entry.functions.insert(function.to_owned(), func);
        Ok(())
    }

    pub fn function(&self, module: &str, function: &str) -> Result<Func, RuntimeError> {
        let entry = self
            .modules
            .get(module)
            .ok_or_else(|| RuntimeError::ModuleNotLoaded(module.to_owned()))?;
        entry
            .functions
            .get(function)
            .copied()
            .ok_or_else(|| RuntimeError::FunctionNotFound {
                module: module.to_owned(),
                function: function.to_owned(),
            })
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    pub fn has_function(&self, module: &str, function: &str) -> bool {
        self.modules
            .get(module)
            .is_some_and(|entry| entry.functions.contains_key(function))
    }

    pub fn module_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.modules.keys().cloned().collect();
        names.sort();
        names
    }
}
