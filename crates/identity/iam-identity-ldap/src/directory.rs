//! Directory access seam and its `ldap3` implementation.

use crate::config::LdapConfig;
use crate::error::{LdapError, LdapResult};
use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// LDAP result code for a rejected bind.
const INVALID_CREDENTIALS: u32 = 49;

/// One search result.
#[derive(Debug, Clone, Default)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attributes: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    /// First value of an attribute. Attribute names compare case-insensitively.
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }
}

/// Opens sessions against a directory server.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    async fn connect(&self, config: &LdapConfig) -> LdapResult<Box<dyn DirectorySession>>;
}

/// One connection to the directory.
#[async_trait]
pub trait DirectorySession: Send {
    /// Simple bind. A rejected password yields [`LdapError::InvalidCredentials`].
    async fn simple_bind(&mut self, dn: &str, password: &str) -> LdapResult<()>;

    /// Subtree search under `base`.
    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attributes: &[String],
    ) -> LdapResult<Vec<DirectoryEntry>>;

    async fn unbind(&mut self) -> LdapResult<()>;
}

/// Connects with `ldap3`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ldap3Connector;

#[async_trait]
impl DirectoryConnector for Ldap3Connector {
    async fn connect(&self, config: &LdapConfig) -> LdapResult<Box<dyn DirectorySession>> {
        let mut settings = LdapConnSettings::new()
            .set_conn_timeout(config.timeout())
            .set_starttls(config.start_tls)
            .set_no_tls_verify(config.insecure_skip_verify);
        if let Some(connector) = tls_connector(config)? {
            settings = settings.set_connector(connector);
        }

        let url = config.url();
        debug!("Connecting to {}", url);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &url).await?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!("LDAP connection driver error: {}", e);
            }
        });

        Ok(Box::new(Ldap3Session {
            ldap,
            timeout: config.timeout(),
        }))
    }
}

/// A custom connector is only needed when a private CA is configured.
fn tls_connector(config: &LdapConfig) -> LdapResult<Option<native_tls::TlsConnector>> {
    let pem = match (&config.root_ca_data, &config.root_ca) {
        (Some(data), _) if !data.trim().is_empty() => data.as_bytes().to_vec(),
        (_, Some(path)) if !path.trim().is_empty() => std::fs::read(path)?,
        _ => return Ok(None),
    };

    let certificate = native_tls::Certificate::from_pem(&pem)?;
    let connector = native_tls::TlsConnector::builder()
        .add_root_certificate(certificate)
        .danger_accept_invalid_certs(config.insecure_skip_verify)
        .build()?;
    Ok(Some(connector))
}

struct Ldap3Session {
    ldap: Ldap,
    timeout: Duration,
}

#[async_trait]
impl DirectorySession for Ldap3Session {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> LdapResult<()> {
        let result = self
            .ldap
            .with_timeout(self.timeout)
            .simple_bind(dn, password)
            .await?;

        match result.rc {
            0 => Ok(()),
            INVALID_CREDENTIALS => Err(LdapError::InvalidCredentials),
            code => Err(LdapError::BindFailed {
                code,
                message: result.text,
            }),
        }
    }

    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attributes: &[String],
    ) -> LdapResult<Vec<DirectoryEntry>> {
        let (entries, _result) = self
            .ldap
            .with_timeout(self.timeout)
            .search(base, Scope::Subtree, filter, attributes.to_vec())
            .await?
            .success()?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                let entry = SearchEntry::construct(entry);
                DirectoryEntry {
                    dn: entry.dn,
                    attributes: entry.attrs,
                }
            })
            .collect())
    }

    async fn unbind(&mut self) -> LdapResult<()> {
        Ok(self.ldap.unbind().await?)
    }
}
