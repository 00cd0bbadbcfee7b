//! TLS configuration and certificate loading.

use std::path::{Path, PathBuf};

use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;

use crate::config::TlsConfig;

/// Failure to turn PEM files into a server TLS configuration.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("certificate file not found: {0:?}")]
    MissingCertificate(PathBuf),

    #[error("private key file not found: {0:?}")]
    MissingKey(PathBuf),

    #[error("invalid TLS material: {0}")]
    Invalid(#[from] std::io::Error),
}

/// Load TLS configuration from certificate and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, TlsError> {
    if !cert_path.exists() {
        return Err(TlsError::MissingCertificate(cert_path.to_path_buf()));
    }
    if !key_path.exists() {
        return Err(TlsError::MissingKey(key_path.to_path_buf()));
    }

    Ok(RustlsConfig::from_pem_file(cert_path, key_path).await?)
}

/// Load the listener's TLS material, if any is configured.
pub async fn from_config(tls: Option<&TlsConfig>) -> Result<Option<RustlsConfig>, TlsError> {
    match tls {
        Some(tls) => {
            let config =
                load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
            Ok(Some(config))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_files_are_reported() {
        let err = load_tls_config(Path::new("/no/cert.pem"), Path::new("/no/key.pem"))
            .await
            .unwrap_err();
        assert!(matches!(err, TlsError::MissingCertificate(_)));

        let cert = tempfile::NamedTempFile::new().unwrap();
        let err = load_tls_config(cert.path(), Path::new("/no/key.pem"))
            .await
            .unwrap_err();
        assert!(matches!(err, TlsError::MissingKey(_)));
    }

    #[tokio::test]
    async fn garbage_pem_is_invalid() {
        let cert = tempfile::NamedTempFile::new().unwrap();
        let key = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(cert.path(), "not a certificate").unwrap();
        std::fs::write(key.path(), "not a key").unwrap();

        let err = load_tls_config(cert.path(), key.path()).await.unwrap_err();
        assert!(matches!(err, TlsError::Invalid(_)));
    }

    #[tokio::test]
    async fn absent_config_means_plaintext() {
        assert!(from_config(None).await.unwrap().is_none());
    }
}
