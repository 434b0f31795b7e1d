use crate::PROVIDER_TYPE;
use iam_identity_core::{IdentityError, IdentityResult, require_field};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_filter() -> String {
    "(objectClass=person)".to_string()
}

fn default_login_attribute() -> String {
    "uid".to_string()
}

fn default_mail_attribute() -> String {
    "mail".to_string()
}

fn default_timeout_seconds() -> u64 {
    10
}

/// Options of an `ldap` provider instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// `host:port` of the directory server.
    pub host: String,

    /// Connect with `ldaps://`.
    #[serde(default)]
    pub use_ssl: bool,

    /// Upgrade a plain connection with StartTLS.
    #[serde(default)]
    pub start_tls: bool,

    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// Path to a PEM encoded CA certificate.
    #[serde(default)]
    pub root_ca: Option<String>,

    /// Inline PEM encoded CA certificate.
    #[serde(default)]
    pub root_ca_data: Option<String>,

    /// Lookup account. Anonymous search when empty.
    #[serde(default)]
    pub bind_dn: String,

    #[serde(default, skip_serializing)]
    pub bind_password: String,

    pub search_base: String,

    #[serde(default = "default_filter")]
    pub filter: String,

    #[serde(default = "default_login_attribute")]
    pub login_attribute: String,

    #[serde(default = "default_mail_attribute")]
    pub mail_attribute: String,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl LdapConfig {
    pub fn validate(&self) -> IdentityResult<()> {
        require_field(PROVIDER_TYPE, "host", &self.host)?;
        require_field(PROVIDER_TYPE, "search_base", &self.search_base)?;
        require_field(PROVIDER_TYPE, "login_attribute", &self.login_attribute)?;

        if self.use_ssl && self.start_tls {
            return Err(IdentityError::invalid_config(
                PROVIDER_TYPE,
                "use_ssl and start_tls are mutually exclusive",
            ));
        }
        if self.timeout_seconds == 0 {
            return Err(IdentityError::invalid_config(
                PROVIDER_TYPE,
                "timeout_seconds must be greater than 0",
            ));
        }
        if !self.filter.trim().is_empty() && !self.filter.trim().starts_with('(') {
            return Err(IdentityError::invalid_config(
                PROVIDER_TYPE,
                format!("filter must be parenthesized: {}", self.filter),
            ));
        }
        Ok(())
    }

    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}", scheme, self.host)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Filter selecting the entry for `username`, with the value escaped.
    pub fn user_filter(&self, username: &str) -> String {
        format!(
            "(&{}({}={}))",
            self.filter.trim(),
            self.login_attribute,
            ldap3::ldap_escape(username)
        )
    }

    /// Attributes requested from the user entry.
    pub fn attributes(&self) -> Vec<String> {
        let mut attributes = vec![self.login_attribute.clone()];
        if !self.mail_attribute.is_empty() && self.mail_attribute != self.login_attribute {
            attributes.push(self.mail_attribute.clone());
        }
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iam_identity_core::{DynamicOptions, is_sensitive_key};
    use serde_json::json;

    fn config() -> LdapConfig {
        DynamicOptions::from_value(json!({
            "host": "ldap.example.com:389",
            "search_base": "ou=people,dc=example,dc=com"
        }))
        .unwrap()
        .decode(PROVIDER_TYPE)
        .unwrap()
    }

    #[test]
    fn defaults_applied() {
        let config = config();
        assert_eq!(config.filter, "(objectClass=person)");
        assert_eq!(config.login_attribute, "uid");
        assert_eq!(config.mail_attribute, "mail");
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.url(), "ldap://ldap.example.com:389");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn ldaps_scheme() {
        let mut config = config();
        config.use_ssl = true;
        assert_eq!(config.url(), "ldaps://ldap.example.com:389");
    }

    #[test]
    fn ssl_and_start_tls_conflict() {
        let mut config = config();
        config.use_ssl = true;
        config.start_tls = true;
        assert!(matches!(
            config.validate(),
            Err(IdentityError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn missing_search_base_rejected() {
        let mut config = config();
        config.search_base = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn user_filter_escapes_value() {
        let config = config();
        assert_eq!(
            config.user_filter("alice"),
            "(&(objectClass=person)(uid=alice))"
        );
        assert_eq!(
            config.user_filter("*)(uid=*").to_lowercase(),
            "(&(objectclass=person)(uid=\\2a\\29\\28uid=\\2a))"
        );
    }

    #[test]
    fn serialized_config_omits_bind_password() {
        let config: LdapConfig = DynamicOptions::from_value(json!({
            "host": "ldap.example.com:389",
            "search_base": "ou=people,dc=example,dc=com",
            "bind_dn": "cn=reader,dc=example,dc=com",
            "bind_password": "hunter2"
        }))
        .unwrap()
        .decode(PROVIDER_TYPE)
        .unwrap();
        assert_eq!(config.bind_password, "hunter2");

        let value = serde_json::to_value(&config).unwrap();
        assert!(!value.to_string().contains("hunter2"));
        let out = value.as_object().unwrap();
        assert!(out.keys().all(|key| !is_sensitive_key(key)));
        assert_eq!(out["bind_dn"], "cn=reader,dc=example,dc=com");
        assert_eq!(out["login_attribute"], "uid");
    }
}
