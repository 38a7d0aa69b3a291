//! Client certificate allow list, persisted as a PEM file per account.
//!
//! Certificates compare by DER equality, not identity. The file is
//! rewritten in full on every change and deleted when the set becomes
//! empty; a missing file means an empty set. The subsystem can be turned
//! off in configuration, in which case accounts get [`DisabledCertStore`]
//! behind the same trait and the session logic stays oblivious.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;
use tokio_rustls::rustls::pki_types::CertificateDer;

#[derive(Debug, Error)]
pub enum CertStoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<CertStoreError> for crate::error::StoreError {
    fn from(e: CertStoreError) -> Self {
        match e {
            CertStoreError::Read { path, source } => Self::Read { path, source },
            CertStoreError::Write { path, source } => Self::Write { path, source },
        }
    }
}

/// Membership and mutation over an account's trusted certificates.
pub trait ClientCertStore: Send + Sync {
    /// Insert a certificate; duplicates (by DER equality) are ignored.
    /// Returns whether the set changed.
    fn add(&mut self, cert: CertificateDer<'static>) -> Result<bool, CertStoreError>;

    /// Remove a certificate by DER equality. Returns whether it was found.
    fn remove(&mut self, cert: &CertificateDer<'_>) -> Result<bool, CertStoreError>;

    /// Membership test used during certificate authentication.
    fn contains(&self, cert: &CertificateDer<'_>) -> bool;

    fn certificates(&self) -> &[CertificateDer<'static>];
}

/// PEM-file-backed certificate store.
pub struct PemCertStore {
    path: PathBuf,
    certs: Vec<CertificateDer<'static>>,
}

impl PemCertStore {
    /// Load the account's PEM file; absence means an empty set.
    pub fn load(path: impl Into<PathBuf>) -> Result<PemCertStore, CertStoreError> {
        let path = path.into();
        let certs = match fs::File::open(&path) {
            Ok(file) => {
                let mut reader = std::io::BufReader::new(file);
                rustls_pemfile::certs(&mut reader)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|source| CertStoreError::Read {
                        path: path.clone(),
                        source,
                    })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(CertStoreError::Read { path, source }),
        };

        Ok(PemCertStore { path, certs })
    }

    fn persist(&self) -> Result<(), CertStoreError> {
        if self.certs.is_empty() {
            match fs::remove_file(&self.path) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(source) => {
                    return Err(CertStoreError::Write {
                        path: self.path.clone(),
                        source,
                    });
                }
            }
        }

        let write_err = |source| CertStoreError::Write {
            path: self.path.clone(),
            source,
        };

        let mut file = fs::File::create(&self.path).map_err(write_err)?;
        for cert in &self.certs {
            writeln!(file, "-----BEGIN CERTIFICATE-----").map_err(write_err)?;
            let encoded = BASE64.encode(cert.as_ref());
            for chunk in encoded.as_bytes().chunks(64) {
                // Chunks come from an ASCII base64 string.
                file.write_all(chunk).map_err(write_err)?;
                writeln!(file).map_err(write_err)?;
            }
            writeln!(file, "-----END CERTIFICATE-----").map_err(write_err)?;
            writeln!(file).map_err(write_err)?;
        }
        Ok(())
    }
}

impl ClientCertStore for PemCertStore {
    fn add(&mut self, cert: CertificateDer<'static>) -> Result<bool, CertStoreError> {
        if self.certs.iter().any(|c| *c == cert) {
            return Ok(false);
        }
        self.certs.push(cert);
        self.persist()?;
        Ok(true)
    }

    fn remove(&mut self, cert: &CertificateDer<'_>) -> Result<bool, CertStoreError> {
        let Some(pos) = self.certs.iter().position(|c| c.as_ref() == cert.as_ref()) else {
            return Ok(false);
        };
        self.certs.remove(pos);
        self.persist()?;
        Ok(true)
    }

    fn contains(&self, cert: &CertificateDer<'_>) -> bool {
        self.certs.iter().any(|c| c.as_ref() == cert.as_ref())
    }

    fn certificates(&self) -> &[CertificateDer<'static>] {
        &self.certs
    }
}

/// No-op store used when the certificate subsystem is disabled.
pub struct DisabledCertStore;

impl ClientCertStore for DisabledCertStore {
    fn add(&mut self, _cert: CertificateDer<'static>) -> Result<bool, CertStoreError> {
        Ok(false)
    }

    fn remove(&mut self, _cert: &CertificateDer<'_>) -> Result<bool, CertStoreError> {
        Ok(false)
    }

    fn contains(&self, _cert: &CertificateDer<'_>) -> bool {
        false
    }

    fn certificates(&self) -> &[CertificateDer<'static>] {
        &[]
    }
}

/// Select the store implementation at config time.
pub fn open_store(
    enabled: bool,
    path: impl AsRef<Path>,
) -> Result<Box<dyn ClientCertStore>, CertStoreError> {
    if enabled {
        Ok(Box::new(PemCertStore::load(path.as_ref())?))
    } else {
        Ok(Box::new(DisabledCertStore))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn cert(bytes: &[u8]) -> CertificateDer<'static> {
        CertificateDer::from(bytes.to_vec())
    }

    #[test]
    fn missing_file_is_empty_set() {
        let dir = tempdir().unwrap();
        let store = PemCertStore::load(dir.path().join("user.pem")).unwrap();
        assert!(store.certificates().is_empty());
        assert!(!store.contains(&cert(b"\x30\x01\x02")));
    }

    #[test]
    fn add_is_unique_by_der_equality() {
        let dir = tempdir().unwrap();
        let mut store = PemCertStore::load(dir.path().join("user.pem")).unwrap();

        assert!(store.add(cert(b"\x30\x01\x02")).unwrap());
        assert!(!store.add(cert(b"\x30\x01\x02")).unwrap());
        assert_eq!(store.certificates().len(), 1);
        assert!(store.contains(&cert(b"\x30\x01\x02")));
    }

    #[test]
    fn persists_and_reloads_pem() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("user.pem");

        let mut store = PemCertStore::load(&path).unwrap();
        store.add(cert(b"\x30\x03\x01\x02\x03")).unwrap();
        store.add(cert(b"\x30\x02\x0a\x0b")).unwrap();
        drop(store);

        let store = PemCertStore::load(&path).unwrap();
        assert_eq!(store.certificates().len(), 2);
        assert!(store.contains(&cert(b"\x30\x02\x0a\x0b")));
    }

    #[test]
    fn file_is_deleted_when_set_becomes_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("user.pem");

        let mut store = PemCertStore::load(&path).unwrap();
        store.add(cert(b"\x30\x01\x02")).unwrap();
        assert!(path.exists());

        assert!(store.remove(&cert(b"\x30\x01\x02")).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn disabled_store_is_inert() {
        let mut store = DisabledCertStore;
        assert!(!store.add(cert(b"\x30\x01\x02")).unwrap());
        assert!(!store.contains(&cert(b"\x30\x01\x02")));
        assert!(store.certificates().is_empty());
    }
}
