//! Extension sections: top-level JSON keys other than `profiles` and
//! `iisSettings`, owned by optional collaborators.

use crate::server::SERVER_SETTINGS_SECTION;
use crate::{LaunchSettingsError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

pub const PROFILES_SECTION: &str = "profiles";

/// A global setting as stored in a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum GlobalSetting {
    /// Validated by a registered handler.
    Known(Value),
    /// No handler claims the section; written back exactly as read.
    Opaque(Value),
}

impl GlobalSetting {
    #[must_use]
    pub const fn value(&self) -> &Value {
        match self {
            Self::Known(v) | Self::Opaque(v) => v,
        }
    }

    #[must_use]
    pub const fn is_opaque(&self) -> bool {
        matches!(self, Self::Opaque(_))
    }

    /// Deserializes the stored value into a typed section.
    pub fn typed<T: DeserializeOwned>(&self, section: &str) -> Result<T> {
        serde_json::from_value(self.value().clone())
            .map_err(|e| LaunchSettingsError::schema(section, e))
    }
}

/// Decoder/encoder for one named section.
pub trait SectionHandler: Send + Sync {
    fn decode(&self, section: &str, raw: Value) -> Result<Value>;

    fn encode(&self, _section: &str, value: &Value) -> Result<Value> {
        Ok(value.clone())
    }
}

/// Handler that round-trips the section through `T`, so unknown shapes fail
/// with a schema error and the written form is normalized.
pub struct TypedSection<T>(PhantomData<fn() -> T>);

impl<T> TypedSection<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for TypedSection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SectionHandler for TypedSection<T>
where
    T: DeserializeOwned + Serialize,
{
    fn decode(&self, section: &str, raw: Value) -> Result<Value> {
        let typed: T =
            serde_json::from_value(raw).map_err(|e| LaunchSettingsError::schema(section, e))?;
        serde_json::to_value(typed).map_err(|e| LaunchSettingsError::schema(section, e))
    }
}

#[derive(Clone, Default)]
pub struct SectionRegistry {
    handlers: HashMap<String, Arc<dyn SectionHandler>>,
}

impl fmt::Debug for SectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("SectionRegistry")
            .field("sections", &names)
            .finish()
    }
}

impl SectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        section: impl Into<String>,
        handler: Arc<dyn SectionHandler>,
    ) -> Result<()> {
        let section = section.into();
        if is_reserved_section(&section) {
            return Err(LaunchSettingsError::Other(format!(
                "section '{section}' is reserved"
            )));
        }
        self.handlers.insert(section, handler);
        Ok(())
    }

    pub fn register_typed<T>(&mut self, section: impl Into<String>) -> Result<()>
    where
        T: DeserializeOwned + Serialize + 'static,
    {
        self.register(section, Arc::new(TypedSection::<T>::new()))
    }

    #[must_use]
    pub fn handles(&self, section: &str) -> bool {
        self.handlers.contains_key(section)
    }

    /// Turns a raw section into a [`GlobalSetting`], validating it when a
    /// handler is registered.
    pub fn classify(&self, section: &str, raw: Value) -> Result<GlobalSetting> {
        match self.handlers.get(section) {
            Some(handler) => handler.decode(section, raw).map(GlobalSetting::Known),
            None => Ok(GlobalSetting::Opaque(raw)),
        }
    }

    pub fn to_raw(&self, section: &str, setting: &GlobalSetting) -> Result<Value> {
        match (setting, self.handlers.get(section)) {
            (GlobalSetting::Known(value), Some(handler)) => handler.encode(section, value),
            (GlobalSetting::Known(value) | GlobalSetting::Opaque(value), _) => Ok(value.clone()),
        }
    }
}

#[must_use]
pub fn is_reserved_section(section: &str) -> bool {
    section == PROFILES_SECTION || section == SERVER_SETTINGS_SECTION
}
