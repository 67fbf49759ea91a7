use serde::{Deserialize, Serialize};

/// Name of the top-level section holding [`ServerSettings`].
pub const SERVER_SETTINGS_SECTION: &str = "iisSettings";

/// Binding shared by every profile that runs under the same web server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerBinding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_url: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub ssl_port: u16,
}

impl ServerBinding {
    #[must_use]
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            application_url: Some(url.into()),
            ssl_port: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.application_url.as_deref().map_or(true, str::is_empty) && self.ssl_port == 0
    }
}

/// Authentication flags plus the IIS and IIS Express bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    #[serde(default)]
    pub windows_authentication: bool,
    #[serde(default = "default_anonymous")]
    pub anonymous_authentication: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iis: Option<ServerBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iis_express: Option<ServerBinding>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            windows_authentication: false,
            anonymous_authentication: true,
            iis: None,
            iis_express: None,
        }
    }
}

impl ServerSettings {
    /// True when writing the section would add nothing over the defaults.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.windows_authentication
            && self.anonymous_authentication
            && self.iis.as_ref().map_or(true, ServerBinding::is_empty)
            && self.iis_express.as_ref().map_or(true, ServerBinding::is_empty)
    }

    #[must_use]
    pub fn differ(&self, other: &Self) -> bool {
        self.windows_authentication != other.windows_authentication
            || self.anonymous_authentication != other.anonymous_authentication
            || bindings_differ(self.iis.as_ref(), other.iis.as_ref())
            || bindings_differ(self.iis_express.as_ref(), other.iis_express.as_ref())
    }
}

fn bindings_differ(a: Option<&ServerBinding>, b: Option<&ServerBinding>) -> bool {
    match (a.filter(|x| !x.is_empty()), b.filter(|x| !x.is_empty())) {
        (None, None) => false,
        (Some(a), Some(b)) => a != b,
        _ => true,
    }
}

/// Compares optional settings, treating an absent section like an empty one.
#[must_use]
pub fn server_settings_are_different(
    a: Option<&ServerSettings>,
    b: Option<&ServerSettings>,
) -> bool {
    match (a.filter(|s| !s.is_empty()), b.filter(|s| !s.is_empty())) {
        (None, None) => false,
        (Some(a), Some(b)) => a.differ(b),
        _ => true,
    }
}

const fn default_anonymous() -> bool {
    true
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(value: &u16) -> bool {
    *value == 0
}
