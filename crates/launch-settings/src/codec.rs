//! Conversion between snapshots and the `launchSettings.json` document.

use crate::profile::{is_valid_profile_name, EnvironmentVariables, LaunchProfile, ProfileKind};
use crate::sections::{is_reserved_section, SectionRegistry, PROFILES_SECTION};
use crate::server::{ServerSettings, SERVER_SETTINGS_SECTION};
use crate::snapshot::{GlobalSettings, LaunchSettings};
use crate::{LaunchSettingsError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// Problems with individual entries that do not abort a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeWarning {
    MissingProfileName,
    DuplicateProfile { name: String },
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingProfileName => {
                f.write_str("a profile without a name was found and ignored")
            }
            Self::DuplicateProfile { name } => write!(
                f,
                "profile '{name}' duplicates an earlier profile name (names are case-insensitive) and was ignored"
            ),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DecodedDocument {
    pub profiles: Vec<LaunchProfile>,
    pub server_settings: Option<ServerSettings>,
    pub global_settings: GlobalSettings,
    pub warnings: Vec<DecodeWarning>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    executable_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command_line_args: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    working_directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    launch_browser: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    launch_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    application_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sdk_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    environment_variables: Option<EnvironmentVariables>,
    #[serde(flatten)]
    other: Map<String, Value>,
}

impl ProfileData {
    fn from_profile(profile: &LaunchProfile) -> Self {
        Self {
            command_name: profile.effective_command_name().map(str::to_string),
            executable_path: profile.executable_path.clone(),
            command_line_args: profile.command_line_args.clone(),
            working_directory: profile.working_directory.clone(),
            launch_browser: profile.launch_browser.then_some(true),
            launch_url: profile.launch_url.clone(),
            application_url: profile.application_url.clone(),
            sdk_version: profile.sdk_version.clone(),
            environment_variables: profile.environment_variables.clone(),
            other: profile.other_settings.clone().unwrap_or_default(),
        }
    }

    fn into_profile(self, name: String) -> LaunchProfile {
        LaunchProfile {
            name,
            kind: ProfileKind::from_command_name(self.command_name.as_deref()),
            command_name: self.command_name,
            executable_path: self.executable_path,
            command_line_args: self.command_line_args,
            working_directory: self.working_directory,
            launch_browser: self.launch_browser.unwrap_or(false),
            launch_url: self.launch_url,
            application_url: self.application_url,
            sdk_version: self.sdk_version,
            environment_variables: self.environment_variables,
            other_settings: (!self.other.is_empty()).then_some(self.other),
        }
    }
}

/// Parses a settings document. Blank text is an empty document.
pub fn decode(raw: &str, registry: &SectionRegistry) -> Result<DecodedDocument> {
    let mut doc = DecodedDocument::default();
    if raw.trim().is_empty() {
        return Ok(doc);
    }

    let root: Value =
        serde_json::from_str(raw).map_err(|e| LaunchSettingsError::MalformedDocument {
            line: e.line(),
            column: e.column(),
            message: e.to_string(),
        })?;
    let Value::Object(root) = root else {
        return Err(LaunchSettingsError::schema(
            "<document>",
            "expected a JSON object at the top level",
        ));
    };

    for (section, value) in root {
        if value.is_null() && (is_reserved_section(&section) || registry.handles(&section)) {
            continue;
        }
        match section.as_str() {
            PROFILES_SECTION => decode_profiles(value, &mut doc)?,
            SERVER_SETTINGS_SECTION => {
                let settings: ServerSettings = serde_json::from_value(value)
                    .map_err(|e| LaunchSettingsError::schema(SERVER_SETTINGS_SECTION, e))?;
                doc.server_settings = Some(settings);
            }
            _ => {
                let setting = registry.classify(&section, value)?;
                doc.global_settings.insert(section, setting);
            }
        }
    }

    for warning in &doc.warnings {
        warn!("launch settings: {warning}");
    }
    Ok(doc)
}

fn decode_profiles(value: Value, doc: &mut DecodedDocument) -> Result<()> {
    let Value::Object(entries) = value else {
        return Err(LaunchSettingsError::schema(
            PROFILES_SECTION,
            "expected an object keyed by profile name",
        ));
    };

    let mut seen: HashSet<String> = HashSet::new();
    for (name, entry) in entries {
        if !is_valid_profile_name(&name) {
            doc.warnings.push(DecodeWarning::MissingProfileName);
            continue;
        }
        if !seen.insert(name.to_lowercase()) {
            doc.warnings.push(DecodeWarning::DuplicateProfile { name });
            continue;
        }
        if !entry.is_object() {
            return Err(LaunchSettingsError::schema(
                PROFILES_SECTION,
                format!("profile '{name}' must be an object"),
            ));
        }
        let data: ProfileData = serde_json::from_value(entry).map_err(|e| {
            LaunchSettingsError::schema(PROFILES_SECTION, format!("profile '{name}': {e}"))
        })?;
        doc.profiles.push(data.into_profile(name));
    }
    Ok(())
}

/// The JSON value that [`encode`] would write for these parts.
///
/// Profiles that carry nothing worth persisting are left out, as is an empty
/// server settings section.
pub fn to_document(
    profiles: &[LaunchProfile],
    server_settings: Option<&ServerSettings>,
    global_settings: &GlobalSettings,
    registry: &SectionRegistry,
) -> Result<Value> {
    let mut root = Map::new();

    if let Some(server) = server_settings.filter(|s| !s.is_empty()) {
        let value = serde_json::to_value(server)
            .map_err(|e| LaunchSettingsError::schema(SERVER_SETTINGS_SECTION, e))?;
        root.insert(SERVER_SETTINGS_SECTION.to_string(), value);
    }

    let mut entries = Map::new();
    for profile in profiles.iter().filter(|p| p.should_be_persisted()) {
        let value = serde_json::to_value(ProfileData::from_profile(profile))
            .map_err(|e| LaunchSettingsError::schema(PROFILES_SECTION, e))?;
        entries.insert(profile.name.clone(), value);
    }
    root.insert(PROFILES_SECTION.to_string(), Value::Object(entries));

    for (section, setting) in global_settings {
        root.insert(section.clone(), registry.to_raw(section, setting)?);
    }

    Ok(Value::Object(root))
}

/// Serializes a snapshot as indented JSON with defaults omitted.
pub fn encode(settings: &LaunchSettings, registry: &SectionRegistry) -> Result<String> {
    let document = to_document(
        settings.profiles(),
        settings.server_settings(),
        settings.global_settings(),
        registry,
    )?;
    serde_json::to_string_pretty(&document)
        .map_err(|e| LaunchSettingsError::Other(e.to_string()))
}
