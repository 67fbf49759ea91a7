use crate::profile::{LaunchProfile, ProfileKind};
use crate::sections::GlobalSetting;
use crate::server::{server_settings_are_different, ServerSettings};
use std::collections::BTreeMap;

pub type GlobalSettings = BTreeMap<String, GlobalSetting>;

/// Immutable view of every profile, the active selection and the extension
/// sections. Changes are made through [`LaunchSettings::to_builder`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchSettings {
    profiles: Vec<LaunchProfile>,
    active_profile_name: Option<String>,
    global_settings: GlobalSettings,
    server_settings: Option<ServerSettings>,
}

impl LaunchSettings {
    #[must_use]
    pub fn new(
        profiles: Vec<LaunchProfile>,
        active_profile_name: Option<String>,
        global_settings: GlobalSettings,
        server_settings: Option<ServerSettings>,
    ) -> Self {
        Self {
            profiles,
            active_profile_name,
            global_settings,
            server_settings,
        }
    }

    /// Snapshot published when the settings could not be loaded at all.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        let placeholder = LaunchProfile::error_placeholder(message);
        let active = Some(placeholder.name.clone());
        Self::new(vec![placeholder], active, GlobalSettings::new(), None)
    }

    #[must_use]
    pub fn profiles(&self) -> &[LaunchProfile] {
        &self.profiles
    }

    #[must_use]
    pub fn profile(&self, name: &str) -> Option<&LaunchProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn active_profile_name(&self) -> Option<&str> {
        self.active_profile_name.as_deref()
    }

    /// The profile matching the active name, or the first profile when the
    /// name matches nothing. `None` only for an empty list.
    #[must_use]
    pub fn active_profile(&self) -> Option<&LaunchProfile> {
        self.active_profile_name
            .as_deref()
            .and_then(|name| self.profile(name))
            .or_else(|| self.profiles.first())
    }

    #[must_use]
    pub const fn global_settings(&self) -> &GlobalSettings {
        &self.global_settings
    }

    #[must_use]
    pub fn global_setting(&self, key: &str) -> Option<&GlobalSetting> {
        self.global_settings.get(key)
    }

    #[must_use]
    pub const fn server_settings(&self) -> Option<&ServerSettings> {
        self.server_settings.as_ref()
    }

    /// True for the single-entry snapshot published after a failed first load.
    #[must_use]
    pub fn is_error_placeholder(&self) -> bool {
        matches!(self.profiles.as_slice(), [only] if only.kind == ProfileKind::ErrorPlaceholder)
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        if !self.is_error_placeholder() {
            return None;
        }
        self.profiles.first().and_then(LaunchProfile::error_message)
    }

    /// Whether anything that is written to disk differs from `other`.
    #[must_use]
    pub fn content_differs(&self, other: &Self) -> bool {
        profiles_are_different(&self.profiles, &other.profiles)
            || server_settings_are_different(self.server_settings(), other.server_settings())
            || global_settings_are_different(&self.global_settings, &other.global_settings)
    }

    #[must_use]
    pub fn to_builder(&self) -> LaunchSettingsBuilder {
        LaunchSettingsBuilder {
            inner: self.clone(),
        }
    }
}

/// Order-insensitive comparison of two profile lists keyed by name.
#[must_use]
pub fn profiles_are_different(a: &[LaunchProfile], b: &[LaunchProfile]) -> bool {
    if a.len() != b.len() {
        return true;
    }
    let contained = |left: &[LaunchProfile], right: &[LaunchProfile]| {
        left.iter()
            .all(|p| right.iter().any(|q| q.name == p.name && p == q))
    };
    !(contained(a, b) && contained(b, a))
}

#[must_use]
pub fn global_settings_are_different(a: &GlobalSettings, b: &GlobalSettings) -> bool {
    if a.len() != b.len() {
        return true;
    }
    a.iter()
        .any(|(key, value)| b.get(key).map_or(true, |other| other.value() != value.value()))
}

/// Produces a new snapshot from an existing one plus edits.
#[derive(Debug, Clone)]
pub struct LaunchSettingsBuilder {
    inner: LaunchSettings,
}

impl LaunchSettingsBuilder {
    /// Replaces a same-named profile or adds a new one. With
    /// `insert_at_front` the profile always ends up first; otherwise it keeps
    /// the replaced profile's position, or is appended.
    #[must_use]
    pub fn add_or_update_profile(mut self, profile: LaunchProfile, insert_at_front: bool) -> Self {
        let existing = self
            .inner
            .profiles
            .iter()
            .position(|p| p.name == profile.name);
        match (existing, insert_at_front) {
            (Some(idx), true) => {
                self.inner.profiles.remove(idx);
                self.inner.profiles.insert(0, profile);
            }
            (Some(idx), false) => self.inner.profiles[idx] = profile,
            (None, true) => self.inner.profiles.insert(0, profile),
            (None, false) => self.inner.profiles.push(profile),
        }
        self
    }

    #[must_use]
    pub fn remove_profile(mut self, name: &str) -> Self {
        self.inner.profiles.retain(|p| p.name != name);
        self
    }

    #[must_use]
    pub fn profiles(mut self, profiles: Vec<LaunchProfile>) -> Self {
        self.inner.profiles = profiles;
        self
    }

    #[must_use]
    pub fn active_profile(mut self, name: Option<String>) -> Self {
        self.inner.active_profile_name = name;
        self
    }

    #[must_use]
    pub fn global_setting(mut self, key: impl Into<String>, setting: GlobalSetting) -> Self {
        self.inner.global_settings.insert(key.into(), setting);
        self
    }

    #[must_use]
    pub fn remove_global_setting(mut self, key: &str) -> Self {
        self.inner.global_settings.remove(key);
        self
    }

    #[must_use]
    pub fn server_settings(mut self, settings: Option<ServerSettings>) -> Self {
        self.inner.server_settings = settings;
        self
    }

    #[must_use]
    pub fn build(self) -> LaunchSettings {
        self.inner
    }
}
