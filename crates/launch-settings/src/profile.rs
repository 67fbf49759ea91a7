use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Name of the default web profile that fronts the IIS Express binding.
pub const IIS_EXPRESS_PROFILE_NAME: &str = "IIS Express";
/// Name of the synthetic profile used when nothing else is launchable.
pub const NO_ACTION_PROFILE_NAME: &str = "(no action)";
/// Key under `other_settings` carrying the load error of a placeholder profile.
pub const ERROR_STRING_KEY: &str = "ErrorString";

pub(crate) const IIS_EXPRESS_COMMAND: &str = "IISExpress";
pub(crate) const IIS_COMMAND: &str = "IIS";
pub(crate) const PROJECT_COMMAND: &str = "Project";
pub(crate) const EXECUTABLE_COMMAND: &str = "Executable";
pub(crate) const NO_ACTION_COMMAND: &str = "NoAction";
pub(crate) const ERROR_COMMAND: &str = "ErrorProfile";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProfileKind {
    Executable,
    Project,
    BuiltInCommand,
    CustomizedCommand,
    #[serde(rename = "IISExpress")]
    IisExpress,
    #[serde(rename = "IIS")]
    Iis,
    NoAction,
    ErrorPlaceholder,
}

impl ProfileKind {
    /// Kind implied by a `commandName` read from disk. Build-reported commands
    /// are indistinguishable from user commands on disk, so they come back as
    /// [`ProfileKind::CustomizedCommand`] until the build metadata claims them.
    #[must_use]
    pub fn from_command_name(command_name: Option<&str>) -> Self {
        match command_name.map(str::trim) {
            None | Some("") => Self::Executable,
            Some(IIS_EXPRESS_COMMAND) => Self::IisExpress,
            Some(IIS_COMMAND) => Self::Iis,
            Some(PROJECT_COMMAND) => Self::Project,
            Some(EXECUTABLE_COMMAND) => Self::Executable,
            Some(_) => Self::CustomizedCommand,
        }
    }

    #[must_use]
    pub const fn is_synthetic(self) -> bool {
        matches!(self, Self::NoAction | Self::ErrorPlaceholder)
    }

    /// Command name written for kinds whose command name is fixed.
    #[must_use]
    pub const fn canonical_command_name(self) -> Option<&'static str> {
        match self {
            Self::IisExpress => Some(IIS_EXPRESS_COMMAND),
            Self::Iis => Some(IIS_COMMAND),
            Self::Project => Some(PROJECT_COMMAND),
            Self::NoAction => Some(NO_ACTION_COMMAND),
            Self::ErrorPlaceholder => Some(ERROR_COMMAND),
            Self::Executable | Self::BuiltInCommand | Self::CustomizedCommand => None,
        }
    }
}

/// Environment block of a profile.
///
/// Keeps the order the variables were read or inserted in, so the file is
/// rewritten without reshuffling. Equality ignores order.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentVariables(Vec<(String, String)>);

impl EnvironmentVariables {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sets `key`, keeping its position when it already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(idx).1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl PartialEq for EnvironmentVariables {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl Eq for EnvironmentVariables {}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvironmentVariables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut vars = Self::new();
        for (k, v) in iter {
            vars.insert(k, v);
        }
        vars
    }
}

impl Serialize for EnvironmentVariables {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EnvironmentVariables {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EnvVisitor;

        impl<'de> Visitor<'de> for EnvVisitor {
            type Value = EnvironmentVariables;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut vars = EnvironmentVariables::new();
                while let Some((key, value)) = access.next_entry::<String, Option<String>>()? {
                    vars.insert(key, value.unwrap_or_default());
                }
                Ok(vars)
            }
        }

        deserializer.deserialize_map(EnvVisitor)
    }
}

/// One named run configuration.
///
/// Profiles are plain values: snapshots hand out shared references and any
/// edit happens on a clone that is then placed in a new snapshot.
#[derive(Debug, Clone)]
pub struct LaunchProfile {
    pub name: String,
    pub kind: ProfileKind,
    pub command_name: Option<String>,
    pub executable_path: Option<String>,
    pub command_line_args: Option<String>,
    pub working_directory: Option<String>,
    pub launch_browser: bool,
    pub launch_url: Option<String>,
    pub application_url: Option<String>,
    pub sdk_version: Option<String>,
    pub environment_variables: Option<EnvironmentVariables>,
    pub other_settings: Option<Map<String, Value>>,
}

impl LaunchProfile {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ProfileKind) -> Self {
        Self {
            name: name.into(),
            kind,
            command_name: kind.canonical_command_name().map(str::to_string),
            executable_path: None,
            command_line_args: None,
            working_directory: None,
            launch_browser: false,
            launch_url: None,
            application_url: None,
            sdk_version: None,
            environment_variables: None,
            other_settings: None,
        }
    }

    /// The synthetic entry published when there is nothing to launch.
    #[must_use]
    pub fn no_action() -> Self {
        Self::new(NO_ACTION_PROFILE_NAME, ProfileKind::NoAction)
    }

    /// The synthetic entry published when settings could not be loaded.
    #[must_use]
    pub fn error_placeholder(message: impl Into<String>) -> Self {
        let mut profile = Self::new(NO_ACTION_PROFILE_NAME, ProfileKind::ErrorPlaceholder);
        let mut other = Map::new();
        other.insert(ERROR_STRING_KEY.to_string(), Value::String(message.into()));
        profile.other_settings = Some(other);
        profile
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.other_settings
            .as_ref()?
            .get(ERROR_STRING_KEY)?
            .as_str()
    }

    /// Whether this profile carries anything worth writing to disk.
    ///
    /// Build-driven and default profiles are regenerated on every
    /// reconciliation, so they are only persisted once the user customized
    /// them.
    #[must_use]
    pub fn should_be_persisted(&self) -> bool {
        match self.kind {
            ProfileKind::NoAction | ProfileKind::ErrorPlaceholder => false,
            ProfileKind::BuiltInCommand | ProfileKind::IisExpress | ProfileKind::Project => {
                !self.is_uncustomized_default()
            }
            _ => true,
        }
    }

    fn is_uncustomized_default(&self) -> bool {
        let env_empty = self
            .environment_variables
            .as_ref()
            .map_or(true, EnvironmentVariables::is_empty);
        let other_empty = self.other_settings.as_ref().map_or(true, Map::is_empty);
        let untouched = env_empty
            && other_empty
            && is_blank(self.command_line_args.as_deref())
            && is_blank(self.working_directory.as_deref())
            && is_blank(self.launch_url.as_deref())
            && is_blank(self.sdk_version.as_deref())
            && is_blank(self.application_url.as_deref());
        if !untouched {
            return false;
        }
        match self.kind {
            ProfileKind::IisExpress => self.name == IIS_EXPRESS_PROFILE_NAME && self.launch_browser,
            ProfileKind::BuiltInCommand | ProfileKind::Project => !self.launch_browser,
            _ => false,
        }
    }

    /// Command name as it is written to disk.
    #[must_use]
    pub fn effective_command_name(&self) -> Option<&str> {
        if let Some(canonical) = self.kind.canonical_command_name() {
            return Some(canonical);
        }
        match self.kind {
            ProfileKind::BuiltInCommand | ProfileKind::CustomizedCommand => {
                Some(self.command_name.as_deref().unwrap_or(&self.name))
            }
            _ => self.command_name.as_deref(),
        }
    }
}

impl PartialEq for LaunchProfile {
    fn eq(&self, other: &Self) -> bool {
        profiles_are_equal(self, other, true)
    }
}

/// Ordinal per-field comparison. Environment blocks compare as maps, and an
/// absent block differs from an empty one.
#[must_use]
pub fn profiles_are_equal(a: &LaunchProfile, b: &LaunchProfile, include_kind: bool) -> bool {
    if include_kind && a.kind != b.kind {
        return false;
    }
    a.name == b.name
        && a.command_name == b.command_name
        && a.executable_path == b.executable_path
        && a.command_line_args == b.command_line_args
        && a.working_directory == b.working_directory
        && a.launch_browser == b.launch_browser
        && a.launch_url == b.launch_url
        && a.application_url == b.application_url
        && a.sdk_version == b.sdk_version
        && a.environment_variables == b.environment_variables
        && other_settings_equal(a.other_settings.as_ref(), b.other_settings.as_ref())
}

fn other_settings_equal(a: Option<&Map<String, Value>>, b: Option<&Map<String, Value>>) -> bool {
    match (a.filter(|m| !m.is_empty()), b.filter(|m| !m.is_empty())) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Profile names must contain something other than whitespace.
#[must_use]
pub fn is_valid_profile_name(name: &str) -> bool {
    !name.trim().is_empty()
}

pub(crate) fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}
