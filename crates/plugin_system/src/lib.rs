//! Extension-module runtime with dynamic library loading.
//!
//! Behavior units are built independently as `cdylib`s and dropped into a
//! directory the server scans once at startup. Each module exposes a single
//! `create_plugin` entry point; the runtime invokes the returned plugin's
//! `start` exactly once, as its own task, behind a supervising wrapper that
//! turns a panic into a log line instead of a poisoned runtime.
//!
//! Load-time failure is fatal: the set of modules on disk is assumed to be
//! the complete, required behavior of the deployment. Runtime failure after
//! a successful start is logged and left alone (no restart).

use async_trait::async_trait;
use libloading::{Library, Symbol};
use playgrid_engine::Engine;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Errors raised while discovering or loading extension modules.
///
/// Every variant here is fatal to startup.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("failed to read plugin directory {path}: {reason}")]
    Directory { path: PathBuf, reason: String },

    #[error("failed to load plugin library {path}: {reason}")]
    Library { path: PathBuf, reason: String },

    #[error("plugin {path} has no usable create_plugin entry point: {reason}")]
    EntryPoint { path: PathBuf, reason: String },

    #[error("plugin {0} is already loaded")]
    Duplicate(String),
}

/// One independently built unit of behavior.
///
/// `start` is called exactly once with the engine handle; a typical module
/// subscribes to action topics and/or the entity-change stream inside it
/// and then loops on those subscriptions. Modules must mutate state only
/// through the engine's public API and must not hold long-lived locks.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    async fn start(self: Box<Self>, engine: Arc<Engine>) -> Result<(), String>;
}

/// Entry-point signature every module must export as `create_plugin`.
pub type CreatePluginFn = unsafe extern "C" fn() -> *mut dyn Plugin;

/// Exports the `create_plugin` entry point for a plugin type.
///
/// ```ignore
/// playgrid_plugin_system::declare_plugin!(MoverPlugin, MoverPlugin::new);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($plugin_type:ty, $constructor:path) => {
        #[no_mangle]
        pub extern "C" fn create_plugin() -> *mut dyn $crate::Plugin {
            let plugin: Box<dyn $crate::Plugin> = Box::new($constructor());
            Box::into_raw(plugin)
        }
    };
}

/// Book-keeping for one loaded module.
struct LoadedPlugin {
    name: String,
    version: String,
    path: PathBuf,
    // Kept alive for the process lifetime so the plugin's code is never
    // unmapped under its running task.
    _library: Library,
}

/// Loads extension modules and starts each as a supervised task.
pub struct PluginManager {
    engine: Arc<Engine>,
    plugin_directory: PathBuf,
    plugins: RwLock<Vec<LoadedPlugin>>,
}

impl PluginManager {
    pub fn new(engine: Arc<Engine>, plugin_directory: impl AsRef<Path>) -> Self {
        Self {
            engine,
            plugin_directory: plugin_directory.as_ref().to_path_buf(),
            plugins: RwLock::new(Vec::new()),
        }
    }

    /// Scans the plugin directory for loadable libraries.
    ///
    /// A missing directory is an error: deployments without modules should
    /// point at an empty directory, not a nonexistent one.
    pub async fn discover(&self) -> Result<Vec<PathBuf>, PluginError> {
        let mut entries = tokio::fs::read_dir(&self.plugin_directory)
            .await
            .map_err(|e| PluginError::Directory {
                path: self.plugin_directory.clone(),
                reason: e.to_string(),
            })?;

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| PluginError::Directory {
            path: self.plugin_directory.clone(),
            reason: e.to_string(),
        })? {
            let path = entry.path();
            let Some(extension) = path.extension() else {
                continue;
            };
            let ext = extension.to_string_lossy();
            if ext == "so" || ext == "dll" || ext == "dylib" {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Loads and starts every discovered module.
    ///
    /// Any single failure aborts the whole load and is fatal to startup.
    /// Returns the names of the started modules.
    pub async fn load_all(&self) -> Result<Vec<String>, PluginError> {
        let paths = self.discover().await?;
        let mut started = Vec::new();
        for path in paths {
            let name = self.load_module(&path).await?;
            started.push(name);
        }
        info!(
            count = started.len(),
            directory = %self.plugin_directory.display(),
            "extension modules started"
        );
        Ok(started)
    }

    /// Loads one library, creates its plugin and spawns the supervised
    /// start task.
    async fn load_module(&self, path: &Path) -> Result<String, PluginError> {
        let library = unsafe {
            Library::new(path).map_err(|e| PluginError::Library {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        };

        let create_plugin: Symbol<CreatePluginFn> = unsafe {
            library.get(b"create_plugin").map_err(|e| PluginError::EntryPoint {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        };

        let plugin_ptr = unsafe { create_plugin() };
        if plugin_ptr.is_null() {
            return Err(PluginError::EntryPoint {
                path: path.to_path_buf(),
                reason: "create_plugin returned a null pointer".to_string(),
            });
        }
        let plugin: Box<dyn Plugin> = unsafe { Box::from_raw(plugin_ptr) };

        let name = plugin.name().to_string();
        let version = plugin.version().to_string();
        {
            let plugins = self.plugins.read().await;
            if plugins.iter().any(|p| p.name == name) {
                return Err(PluginError::Duplicate(name));
            }
        }

        info!(plugin = %name, %version, path = %path.display(), "starting extension module");
        self.supervise(plugin, name.clone());

        let mut plugins = self.plugins.write().await;
        plugins.push(LoadedPlugin {
            name: name.clone(),
            version,
            path: path.to_path_buf(),
            _library: library,
        });
        Ok(name)
    }

    /// Runs the plugin's `start` in its own task and watches the join
    /// handle, so a panicking module becomes a log line rather than taking
    /// anything else down. No restart: runtime recovery is out of scope.
    fn supervise(&self, plugin: Box<dyn Plugin>, name: String) {
        let engine = self.engine.clone();
        let task = tokio::spawn(async move { plugin.start(engine).await });
        tokio::spawn(async move {
            match task.await {
                Ok(Ok(())) => info!(plugin = %name, "extension module finished"),
                Ok(Err(e)) => error!(plugin = %name, error = %e, "extension module failed"),
                Err(join_err) if join_err.is_panic() => {
                    error!(plugin = %name, "extension module panicked; not restarting")
                }
                Err(_) => warn!(plugin = %name, "extension module task cancelled"),
            }
        });
    }

    /// Names of the currently loaded modules.
    pub async fn plugin_names(&self) -> Vec<String> {
        let plugins = self.plugins.read().await;
        plugins.iter().map(|p| p.name.clone()).collect()
    }

    pub async fn plugin_count(&self) -> usize {
        let plugins = self.plugins.read().await;
        plugins.len()
    }

    /// Path a module was loaded from, if it is loaded.
    pub async fn plugin_path(&self, name: &str) -> Option<PathBuf> {
        let plugins = self.plugins.read().await;
        plugins.iter().find(|p| p.name == name).map(|p| p.path.clone())
    }
}
