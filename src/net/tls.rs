//! TLS material loading and transport configuration.
//!
//! Certificate and key are read and parsed when the server is constructed,
//! so missing or malformed material fails before any socket work. The
//! rustls configuration itself is built when the transport is about to bind.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;

use crate::config::{ServerConfig, TlsOptions};
use crate::error::{Result, TransportError};

/// Where credential material comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// PEM text given directly in the configuration.
    Inline(String),
    /// Path to a PEM file.
    File(PathBuf),
}

impl CredentialSource {
    /// Inline PEM is recognised by its `-----BEGIN` armor.
    pub fn parse(value: &str) -> Self {
        if value.trim_start().starts_with("-----BEGIN") {
            CredentialSource::Inline(value.to_string())
        } else {
            CredentialSource::File(PathBuf::from(value))
        }
    }

    pub fn read(&self) -> io::Result<Vec<u8>> {
        match self {
            CredentialSource::Inline(pem) => Ok(pem.as_bytes().to_vec()),
            CredentialSource::File(path) => std::fs::read(path),
        }
    }
}

/// Parsed-and-checked certificate chain and private key.
#[derive(Clone)]
pub struct TlsMaterial {
    cert_pem: Vec<u8>,
    key_pem: Vec<u8>,
    options: TlsOptions,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("cert_pem_len", &self.cert_pem.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl TlsMaterial {
    /// Load material for a `secure` server. Both certificate and key are required.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let (Some(cert), Some(key)) = (
            config.cert.as_deref().filter(|c| !c.is_empty()),
            config.key.as_deref().filter(|k| !k.is_empty()),
        ) else {
            return Err(TransportError::configuration("HTTPS requires certificate and key"));
        };

        let cert_pem = read_source("certificate", cert)?;
        let key_pem = read_source("private key", key)?;

        let certs = rustls_pemfile::certs(&mut &cert_pem[..])
            .collect::<io::Result<Vec<_>>>()
            .map_err(|e| TransportError::configuration(format!("invalid certificate PEM: {}", e)))?;
        if certs.is_empty() {
            return Err(TransportError::configuration("no certificate found in PEM material"));
        }

        match rustls_pemfile::private_key(&mut &key_pem[..]) {
            Ok(Some(_)) => {}
            Ok(None) => {
                return Err(TransportError::configuration("no private key found in PEM material"));
            }
            Err(e) => {
                return Err(TransportError::configuration(format!("invalid private key PEM: {}", e)));
            }
        }

        tracing::debug!(certificates = certs.len(), "TLS material loaded");

        Ok(Self {
            cert_pem,
            key_pem,
            options: config.tls.clone(),
        })
    }

    /// Build the rustls configuration, applying the forwarded options.
    pub async fn rustls_config(&self) -> io::Result<RustlsConfig> {
        let config = RustlsConfig::from_pem(self.cert_pem.clone(), self.key_pem.clone()).await?;

        if let Some(protocols) = &self.options.alpn_protocols {
            let mut inner = (*config.get_inner()).clone();
            inner.alpn_protocols = protocols.iter().map(|p| p.as_bytes().to_vec()).collect();
            config.reload_from_config(Arc::new(inner));
        }

        Ok(config)
    }
}

fn read_source(what: &str, value: &str) -> Result<Vec<u8>> {
    let source = CredentialSource::parse(value);
    source.read().map_err(|e| match &source {
        CredentialSource::File(path) => {
            TransportError::configuration(format!("cannot read {} file {:?}: {}", what, path, e))
        }
        CredentialSource::Inline(_) => TransportError::configuration(format!("cannot read {}: {}", what, e)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secure_config(cert: Option<&str>, key: Option<&str>) -> ServerConfig {
        ServerConfig {
            secure: true,
            cert: cert.map(str::to_string),
            key: key.map(str::to_string),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_source_detection() {
        assert_eq!(
            CredentialSource::parse("certs/server.pem"),
            CredentialSource::File(PathBuf::from("certs/server.pem"))
        );
        assert!(matches!(
            CredentialSource::parse("-----BEGIN CERTIFICATE-----\n"),
            CredentialSource::Inline(_)
        ));
    }

    #[test]
    fn test_missing_material() {
        let err = TlsMaterial::from_config(&secure_config(None, Some("key.pem"))).unwrap_err();
        assert!(matches!(err, TransportError::Configuration(_)));

        let err = TlsMaterial::from_config(&secure_config(Some("cert.pem"), Some(""))).unwrap_err();
        assert!(matches!(err, TransportError::Configuration(_)));
    }

    #[test]
    fn test_unreadable_file() {
        let err = TlsMaterial::from_config(&secure_config(
            Some("/nonexistent/cert.pem"),
            Some("/nonexistent/key.pem"),
        ))
        .unwrap_err();
        assert!(err.to_string().contains("certificate"));
    }

    #[test]
    fn test_generated_material() {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert = generated.serialize_pem().unwrap();
        let key = generated.serialize_private_key_pem();

        let material = TlsMaterial::from_config(&secure_config(Some(&cert), Some(&key))).unwrap();
        assert!(!material.cert_pem.is_empty());

        // certificate where the key should be
        let err = TlsMaterial::from_config(&secure_config(Some(&cert), Some(&cert))).unwrap_err();
        assert!(err.to_string().contains("private key"));
    }
}
