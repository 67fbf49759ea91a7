//! # Launch Settings
//!
//! Keeps the launch profiles of a project consistent across the settings
//! file, the build system and the defaults every project flavor needs.
//!
//! ## Pipeline
//!
//! ```text
//! launchSettings.json ──> watcher (debounced) ──┐
//!                                               ├──> Reconciler ──> SnapshotStore ──> subscribers
//! build metadata ───────────────────────────────┘         │
//!                                                         └──> deferred save (mtime checked)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use launch_settings::{LaunchSettingsProvider, ProjectContext, ProjectFlavor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let project = ProjectContext::new("/path/to/project", ProjectFlavor::Web);
//!     let provider = LaunchSettingsProvider::builder(project).build();
//!     provider.start().await?;
//!
//!     let snapshot = provider.snapshot_or_error().await?;
//!     for profile in snapshot.profiles() {
//!         println!("{} ({:?})", profile.name, profile.kind);
//!     }
//!     Ok(())
//! }
//! ```

mod build;
mod codec;
mod config;
mod error;
mod fs;
mod profile;
mod project;
mod provider;
mod reconciler;
mod sections;
mod server;
mod snapshot;
mod store;
mod watcher;
mod writer;

pub use build::{ActiveProfileSink, BuildCommand, BuildMetadata};
pub use codec::{decode, encode, to_document, DecodeWarning, DecodedDocument};
pub use config::ProviderConfig;
pub use error::{LaunchSettingsError, Result};
pub use fs::{FileStamp, FileSystem, MemoryFileSystem, OsFileSystem};
pub use profile::{
    is_valid_profile_name, profiles_are_equal, EnvironmentVariables, LaunchProfile, ProfileKind,
    ERROR_STRING_KEY, IIS_EXPRESS_PROFILE_NAME, NO_ACTION_PROFILE_NAME,
};
pub use project::{
    FixedPortAllocator, LocalPortAllocator, PortAllocator, ProjectContext, ProjectFlavor,
    DEFAULT_SETTINGS_FOLDER, LAUNCH_SETTINGS_FILE_NAME,
};
pub use provider::{LaunchSettingsProvider, ProviderBuilder, ProviderHealth, ReconcileReport};
pub use reconciler::{
    is_web_command, merge_build_commands, server_url_from_command_line, DiskState,
    ReconcileInput, ReconcileOutcome, Reconciler, DEFAULT_WEB_URL, DEVELOPMENT_ENVIRONMENT,
    ENVIRONMENT_VARIABLE, WEB_COMMAND_NAME,
};
pub use sections::{
    is_reserved_section, GlobalSetting, SectionHandler, SectionRegistry, TypedSection,
    PROFILES_SECTION,
};
pub use server::{
    server_settings_are_different, ServerBinding, ServerSettings, SERVER_SETTINGS_SECTION,
};
pub use snapshot::{
    global_settings_are_different, profiles_are_different, GlobalSettings, LaunchSettings,
    LaunchSettingsBuilder,
};
pub use store::{SnapshotStore, SnapshotSubscription};
pub use watcher::Debouncer;
pub use writer::{SaveOutcome, SaveTicket, SettingsWriter, SyncState};
