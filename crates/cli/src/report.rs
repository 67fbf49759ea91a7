use launch_settings::{
    EnvironmentVariables, LaunchProfile, LaunchSettings, ProfileKind, ServerSettings,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// JSON view of a snapshot as printed on stdout.
#[derive(Debug, Serialize)]
pub struct SnapshotReport<'a> {
    pub settings_path: &'a Path,
    pub active_profile: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
    pub profiles: Vec<ProfileReport<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_settings: Option<&'a ServerSettings>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub global_settings: BTreeMap<&'a str, &'a Value>,
}

#[derive(Debug, Serialize)]
pub struct ProfileReport<'a> {
    pub name: &'a str,
    pub kind: ProfileKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_line_args: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<&'a str>,
    pub launch_browser: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_variables: Option<&'a EnvironmentVariables>,
    /// Whether the profile is written to the settings file.
    pub persisted: bool,
}

impl<'a> ProfileReport<'a> {
    fn new(profile: &'a LaunchProfile) -> Self {
        Self {
            name: &profile.name,
            kind: profile.kind,
            command_name: profile.effective_command_name(),
            executable_path: profile.executable_path.as_deref(),
            command_line_args: profile.command_line_args.as_deref(),
            working_directory: profile.working_directory.as_deref(),
            launch_browser: profile.launch_browser,
            launch_url: profile.launch_url.as_deref(),
            application_url: profile.application_url.as_deref(),
            environment_variables: profile.environment_variables.as_ref(),
            persisted: profile.should_be_persisted(),
        }
    }
}

impl<'a> SnapshotReport<'a> {
    pub fn new(settings_path: &'a Path, snapshot: &'a LaunchSettings) -> Self {
        Self {
            settings_path,
            active_profile: snapshot.active_profile().map(|p| p.name.as_str()),
            error: snapshot.error_message(),
            profiles: snapshot.profiles().iter().map(ProfileReport::new).collect(),
            server_settings: snapshot.server_settings(),
            global_settings: snapshot
                .global_settings()
                .iter()
                .map(|(key, setting)| (key.as_str(), setting.value()))
                .collect(),
        }
    }
}
