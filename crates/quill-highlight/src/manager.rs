//! Registry of highlighting definitions.
//!
//! The manager maps definition names and file extensions to definitions.
//! Definitions may be registered lazily; a lazy definition is compiled the
//! first time it is requested, and a definition that (indirectly) requests
//! itself while loading fails with [`DefinitionError::CyclicReference`].

use std::collections::HashMap;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::definition::{
    DefinitionResolver, DefinitionSpec, HighlightingDefinition, compile_definition, normalize_extension,
};
use crate::error::DefinitionError;

type Loader = Box<dyn FnOnce(&mut HighlightingManager) -> Result<HighlightingDefinition, DefinitionError> + Send>;

enum LoadState {
    NotLoaded(Loader),
    Loading,
    Loaded(Arc<HighlightingDefinition>),
    Failed(DefinitionError),
}

struct Entry {
    name: String,
    extensions: Vec<String>,
    state: LoadState,
}

/// Definitions by name and by file extension.
#[derive(Default)]
pub struct HighlightingManager {
    entries: Vec<Entry>,
    by_name: HashMap<String, usize>,
    by_extension: HashMap<String, usize>,
    search_paths: Vec<PathBuf>,
}

impl HighlightingManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a compiled definition under its own name and extensions.
    ///
    /// A later registration replaces an earlier one with the same name, and
    /// takes over any extension it claims. Extensions only the replaced entry
    /// claimed are released.
    pub fn register(&mut self, definition: HighlightingDefinition) -> Arc<HighlightingDefinition> {
        let definition = Arc::new(definition);
        let name = definition.name().to_string();
        let extensions = definition.extensions().to_vec();
        self.insert_entry(name, extensions, LoadState::Loaded(Arc::clone(&definition)));
        definition
    }

    /// Registers a definition that is built on first request.
    ///
    /// The loader receives the manager, so it can resolve the definitions it
    /// imports from.
    pub fn register_lazy<F>(&mut self, name: &str, extensions: &[&str], loader: F)
    where
        F: FnOnce(&mut HighlightingManager) -> Result<HighlightingDefinition, DefinitionError> + Send + 'static,
    {
        let extensions = extensions.iter().map(|ext| normalize_extension(ext)).collect();
        self.insert_entry(name.to_string(), extensions, LoadState::NotLoaded(Box::new(loader)));
    }

    /// Registers YAML source that is parsed and compiled on first request.
    pub fn register_yaml(&mut self, name: &str, extensions: &[&str], yaml: impl Into<String>) {
        let yaml = yaml.into();
        self.register_lazy(name, extensions, move |manager| manager.compile_yaml(&yaml));
    }

    /// Parses and compiles YAML now, resolving imports through this manager.
    pub fn load_from_str(&mut self, yaml: &str) -> Result<Arc<HighlightingDefinition>, DefinitionError> {
        let definition = self.compile_yaml(yaml)?;
        Ok(self.register(definition))
    }

    /// Adds a directory that relative paths passed to
    /// [`load_from_path`](Self::load_from_path) are looked up in.
    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    /// Reads, compiles and registers a YAML definition file.
    ///
    /// Relative paths are tried against each search path in order, then
    /// against the working directory.
    pub fn load_from_path(&mut self, path: impl AsRef<Path>) -> Result<Arc<HighlightingDefinition>, DefinitionError> {
        let path = self.locate(path.as_ref());
        let yaml = std::fs::read_to_string(&path).map_err(|error| DefinitionError::Io {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
        debug!(path = %path.display(), "loading highlighting definition file");
        self.load_from_str(&yaml)
    }

    /// The definition registered as `name`, loading it if necessary.
    ///
    /// A failed load is remembered; later requests return the same error.
    pub fn get_definition(&mut self, name: &str) -> Result<Arc<HighlightingDefinition>, DefinitionError> {
        let index = *self
            .by_name
            .get(name)
            .ok_or_else(|| DefinitionError::UnknownDefinition(name.to_string()))?;
        self.load(index)
    }

    /// The definition claiming extension `extension` (with or without the
    /// leading dot, any case).
    pub fn get_definition_by_extension(&mut self, extension: &str) -> Result<Arc<HighlightingDefinition>, DefinitionError> {
        let extension = normalize_extension(extension);
        let index = *self
            .by_extension
            .get(&extension)
            .ok_or(DefinitionError::UnknownDefinition(extension.clone()))?;
        self.load(index)
    }

    /// Names of all registered definitions, in order of first registration.
    pub fn definition_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    /// Returns `true` if `name` is registered and already compiled.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.by_name
            .get(name)
            .is_some_and(|&index| matches!(self.entries[index].state, LoadState::Loaded(_)))
    }

    fn insert_entry(&mut self, name: String, extensions: Vec<String>, state: LoadState) {
        let entry = Entry {
            name: name.clone(),
            extensions,
            state,
        };
        let index = match self.by_name.get(&name) {
            Some(&previous) => {
                debug!(definition = %name, previous, "replacing highlighting definition");
                self.by_extension.retain(|_, &mut claimed| claimed != previous);
                self.entries[previous] = entry;
                previous
            }
            None => {
                self.entries.push(entry);
                self.by_name.insert(name, self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        for extension in &self.entries[index].extensions {
            self.by_extension.insert(extension.clone(), index);
        }
    }

    fn load(&mut self, index: usize) -> Result<Arc<HighlightingDefinition>, DefinitionError> {
        match mem::replace(&mut self.entries[index].state, LoadState::Loading) {
            LoadState::Loaded(definition) => {
                self.entries[index].state = LoadState::Loaded(Arc::clone(&definition));
                Ok(definition)
            }
            LoadState::Failed(error) => {
                self.entries[index].state = LoadState::Failed(error.clone());
                Err(error)
            }
            LoadState::Loading => Err(DefinitionError::CyclicReference(self.entries[index].name.clone())),
            LoadState::NotLoaded(loader) => {
                let name = self.entries[index].name.clone();
                debug!(definition = %name, "loading highlighting definition");
                match loader(self) {
                    Ok(definition) => {
                        let definition = Arc::new(definition);
                        self.entries[index].state = LoadState::Loaded(Arc::clone(&definition));
                        Ok(definition)
                    }
                    Err(error) => {
                        warn!(definition = %name, %error, "failed to load highlighting definition");
                        self.entries[index].state = LoadState::Failed(error.clone());
                        Err(error)
                    }
                }
            }
        }
    }

    fn compile_yaml(&mut self, yaml: &str) -> Result<HighlightingDefinition, DefinitionError> {
        let spec = DefinitionSpec::from_yaml(yaml)?;
        compile_definition(&spec, self)
    }

    fn locate(&self, path: &Path) -> PathBuf {
        if path.is_relative() {
            for directory in &self.search_paths {
                let candidate = directory.join(path);
                if candidate.is_file() {
                    return candidate;
                }
            }
        }
        path.to_path_buf()
    }
}

impl DefinitionResolver for HighlightingManager {
    fn resolve_definition(&mut self, name: &str) -> Result<Arc<HighlightingDefinition>, DefinitionError> {
        self.get_definition(name)
    }
}

impl std::fmt::Debug for HighlightingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for entry in self.entries.iter() {
            let state = match entry.state {
                LoadState::NotLoaded(_) => "not loaded",
                LoadState::Loading => "loading",
                LoadState::Loaded(_) => "loaded",
                LoadState::Failed(_) => "failed",
            };
            map.entry(&entry.name, &(state, &entry.extensions));
        }
        map.finish()
    }
}
