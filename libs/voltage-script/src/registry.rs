//! Script Registry
//!
//! Ordered collection of compiled scripts. Integration tokens address
//! scripts by position, so once any script has been compiled with a
//! reference into a registry, that registry is pinned and refuses to
//! reorder.

use crate::compiler::{compile_with_options, CompileOptions};
use crate::config::ScriptConfig;
use crate::error::{Result, ScriptError};
use crate::script::Script;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use tracing::{info, warn};

/// Ordered set of scripts with name lookup
#[derive(Debug, Default)]
pub struct ScriptRegistry {
    scripts: Vec<Script>,
    /// Set once a compiled script holds positions into this registry
    pinned: AtomicBool,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile integration scripts in order
    ///
    /// Each entry may reference integrations declared before it.
    pub fn compile_integrations(entries: &[ScriptConfig], options: &CompileOptions) -> Result<Self> {
        let mut registry = Self::new();
        for entry in entries {
            let script = compile_with_options(
                &registry,
                &entry.name,
                &entry.units,
                &entry.script,
                options,
            )?;
            registry.register(script);
        }
        info!("Compiled {} integration scripts", registry.len());
        Ok(registry)
    }

    /// Compile scripts against an existing integration registry
    pub fn compile_all(
        entries: &[ScriptConfig],
        integrations: &ScriptRegistry,
        options: &CompileOptions,
    ) -> Result<Self> {
        let scripts = entries
            .iter()
            .map(|entry| {
                compile_with_options(
                    integrations,
                    &entry.name,
                    &entry.units,
                    &entry.script,
                    options,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        info!("Compiled {} scripts", scripts.len());
        Ok(Self {
            scripts,
            ..Default::default()
        })
    }

    /// Append a script; its position is its integration index
    pub fn register(&mut self, script: Script) -> usize {
        self.scripts.push(script);
        self.scripts.len() - 1
    }

    /// First script with exactly this name
    pub fn lookup(&self, name: &str) -> Option<&Script> {
        self.scripts.iter().find(|s| s.name() == name)
    }

    /// Position of the first script with exactly this name
    pub fn position(&self, name: &str) -> Option<usize> {
        self.scripts.iter().position(|s| s.name() == name)
    }

    pub fn get(&self, index: usize) -> Option<&Script> {
        self.scripts.get(index)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Script> {
        self.scripts.iter()
    }

    /// Whether compiled scripts reference positions in this registry
    pub fn is_pinned(&self) -> bool {
        self.pinned.load(AtomicOrdering::Acquire)
    }

    pub(crate) fn pin(&self) {
        self.pinned.store(true, AtomicOrdering::Release);
    }

    /// Stable reorder; afterwards no adjacent pair compares `Greater`
    ///
    /// Fails on a pinned registry, leaving the order unchanged.
    pub fn reorder<F>(&mut self, compare: F) -> Result<()>
    where
        F: FnMut(&Script, &Script) -> Ordering,
    {
        if *self.pinned.get_mut() {
            warn!(len = self.scripts.len(), "Reorder refused on referenced registry");
            return Err(ScriptError::RegistryReferenced {
                len: self.scripts.len(),
            });
        }
        self.scripts.sort_by(compare);
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ScriptRegistry {
    type Item = &'a Script;
    type IntoIter = std::slice::Iter<'a, Script>;

    fn into_iter(self) -> Self::IntoIter {
        self.scripts.iter()
    }
}
