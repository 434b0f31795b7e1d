//! Provider configuration as supplied by the operator.

use crate::error::{IdentityError, IdentityResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// How a resolved identity is bound to a local user account.
///
/// The framework passes this through unchanged; account mapping happens
/// outside the provider core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingMethod {
    /// Create the local account on first login.
    #[default]
    Auto,
    /// Only bind to an existing local account.
    Lookup,
    /// Bind when an account exists, otherwise create one.
    Mixed,
}

impl std::fmt::Display for MappingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MappingMethod::Auto => write!(f, "auto"),
            MappingMethod::Lookup => write!(f, "lookup"),
            MappingMethod::Mixed => write!(f, "mixed"),
        }
    }
}

/// Open, string-keyed provider options decoded by the matching factory.
///
/// Serializing a `DynamicOptions` never emits secrets: every key whose name
/// contains `password` or `secret` (case-insensitive) is dropped, at any
/// nesting depth. Use [`DynamicOptions::as_map`] for the raw values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct DynamicOptions(Map<String, Value>);

impl DynamicOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Build options from a JSON object. Anything else is a configuration error.
    pub fn from_value(value: Value) -> IdentityResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(IdentityError::InvalidPayload(format!(
                "provider options must be an object, got {other}"
            ))),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode into a provider's typed configuration.
    ///
    /// Unknown keys are ignored; missing keys fall back to the target's
    /// serde defaults. Required-field validation is the factory's job.
    pub fn decode<T: DeserializeOwned>(&self, provider_type: &str) -> IdentityResult<T> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| IdentityError::invalid_config(provider_type, e.to_string()))
    }

    /// Copy of the options with every sensitive key removed.
    pub fn desensitized(&self) -> Map<String, Value> {
        desensitize_map(&self.0)
    }
}

impl Serialize for DynamicOptions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.desensitized().serialize(serializer)
    }
}

impl From<Map<String, Value>> for DynamicOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Whether a configuration key names a write-only secret.
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.contains("password") || key.contains("secret")
}

fn desensitize_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .filter(|(key, _)| !is_sensitive_key(key))
        .map(|(key, value)| (key.clone(), desensitize_value(value)))
        .collect()
}

fn desensitize_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(desensitize_map(map)),
        Value::Array(items) => Value::Array(items.iter().map(desensitize_value).collect()),
        other => other.clone(),
    }
}

/// One configured identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityProviderConfig {
    /// Unique among all configured providers.
    pub name: String,

    /// Key into the provider factory tables.
    #[serde(rename = "type")]
    pub provider_type: String,

    #[serde(default, alias = "mappingMethod")]
    pub mapping_method: MappingMethod,

    #[serde(default)]
    pub provider: DynamicOptions,
}

impl IdentityProviderConfig {
    pub fn new(name: impl Into<String>, provider_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider_type: provider_type.into(),
            mapping_method: MappingMethod::default(),
            provider: DynamicOptions::default(),
        }
    }

    pub fn with_mapping_method(mut self, mapping_method: MappingMethod) -> Self {
        self.mapping_method = mapping_method;
        self
    }

    pub fn with_options(mut self, options: DynamicOptions) -> Self {
        self.provider = options;
        self
    }
}

/// Fail with a descriptive configuration error when a required field is blank.
pub fn require_field(provider_type: &str, field: &str, value: &str) -> IdentityResult<()> {
    if value.trim().is_empty() {
        return Err(IdentityError::invalid_config(
            provider_type,
            format!("missing required field '{field}'"),
        ));
    }
    Ok(())
}
