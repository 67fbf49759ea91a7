use std::net::TcpListener;
use std::path::{Path, PathBuf};

pub const LAUNCH_SETTINGS_FILE_NAME: &str = "launchSettings.json";
pub const DEFAULT_SETTINGS_FOLDER: &str = "Properties";

/// Decides which default profiles a project must always have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectFlavor {
    /// Served through IIS Express / IIS.
    Web,
    /// Runs itself.
    #[default]
    Console,
    /// Not launchable on its own.
    Library,
}

#[derive(Debug, Clone)]
pub struct ProjectContext {
    root: PathBuf,
    name: String,
    flavor: ProjectFlavor,
    settings_folder: String,
}

impl ProjectContext {
    /// Project rooted at `root`; the name defaults to the directory name.
    pub fn new(root: impl Into<PathBuf>, flavor: ProjectFlavor) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "project".to_string());
        Self {
            root,
            name,
            flavor,
            settings_folder: DEFAULT_SETTINGS_FOLDER.to_string(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_settings_folder(mut self, folder: impl Into<String>) -> Self {
        self.settings_folder = folder.into();
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn flavor(&self) -> ProjectFlavor {
        self.flavor
    }

    #[must_use]
    pub fn settings_dir(&self) -> PathBuf {
        self.root.join(&self.settings_folder)
    }

    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.settings_dir().join(LAUNCH_SETTINGS_FILE_NAME)
    }
}

/// Source of TCP ports for newly generated application URLs.
pub trait PortAllocator: Send + Sync {
    fn next_free_port(&self) -> u16;
}

/// Asks the OS for an unused loopback port.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPortAllocator;

const FALLBACK_PORT: u16 = 5000;

impl PortAllocator for LocalPortAllocator {
    fn next_free_port(&self) -> u16 {
        match TcpListener::bind(("127.0.0.1", 0)).and_then(|l| l.local_addr()) {
            Ok(addr) => addr.port(),
            Err(err) => {
                log::warn!("port probe failed ({err}); using {FALLBACK_PORT}");
                FALLBACK_PORT
            }
        }
    }
}

/// Always hands out the same port.
#[derive(Debug, Clone, Copy)]
pub struct FixedPortAllocator(pub u16);

impl PortAllocator for FixedPortAllocator {
    fn next_free_port(&self) -> u16 {
        self.0
    }
}
