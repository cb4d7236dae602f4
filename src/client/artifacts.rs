use std::ffi::OsString;
use std::path::{Path, PathBuf};

use ssh_key::{Certificate, PublicKey};

use crate::error::Error;

/// Files written by [`save_public_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFiles {
    pub public_key: PathBuf,
    pub certificate: PathBuf,
}

/// Writes `<prefix>.pub` and `<prefix>-cert.pub`, both in OpenSSH
/// single-line format.
///
/// # Errors
///
/// Returns [`Error::Io`] if either file cannot be written.
pub fn save_public_files(
    prefix: &Path,
    public_key: &PublicKey,
    certificate: &Certificate,
) -> Result<SavedFiles, Error> {
    let files = SavedFiles {
        public_key: with_suffix(prefix, ".pub"),
        certificate: with_suffix(prefix, "-cert.pub"),
    };

    std::fs::write(&files.public_key, format!("{}\n", public_key.to_openssh()?))?;
    std::fs::write(&files.certificate, format!("{}\n", certificate.to_openssh()?))?;

    tracing::debug!(
        public_key = %files.public_key.display(),
        certificate = %files.certificate.display(),
        "Saved public files"
    );
    Ok(files)
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut path = OsString::from(prefix.as_os_str());
    path.push(suffix);
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use ssh_key::certificate::{Builder, CertType};
    use ssh_key::rand_core::OsRng;

    use super::*;
    use crate::keys::generate_key;
    use crate::types::KeyType;

    fn sign_cert(public_key: &PublicKey) -> Certificate {
        let ca = generate_key(KeyType::Ed25519, 0).unwrap();
        let mut builder =
            Builder::new_with_random_nonce(&mut OsRng, public_key.key_data().clone(), 0, u64::MAX)
                .unwrap();
        builder.key_id("bob").unwrap();
        builder.cert_type(CertType::User).unwrap();
        builder.all_principals_valid().unwrap();
        builder.sign(&ca).unwrap()
    }

    #[test]
    fn test_with_suffix() {
        assert_eq!(
            with_suffix(Path::new("/home/a/.ssh/id_ca"), "-cert.pub"),
            PathBuf::from("/home/a/.ssh/id_ca-cert.pub")
        );
    }

    #[test]
    fn test_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let key = generate_key(KeyType::Ed25519, 0).unwrap();
        let cert = sign_cert(key.public_key());

        let files = save_public_files(&dir.path().join("id_test"), key.public_key(), &cert).unwrap();
        assert_eq!(files.public_key, dir.path().join("id_test.pub"));
        assert_eq!(files.certificate, dir.path().join("id_test-cert.pub"));

        let saved_key = std::fs::read_to_string(&files.public_key).unwrap();
        assert_eq!(&PublicKey::from_openssh(saved_key.trim()).unwrap(), key.public_key());
        let saved_cert = std::fs::read_to_string(&files.certificate).unwrap();
        assert_eq!(Certificate::from_openssh(saved_cert.trim()).unwrap(), cert);
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let key = generate_key(KeyType::Ed25519, 0).unwrap();
        let cert = sign_cert(key.public_key());
        let result = save_public_files(
            &dir.path().join("missing").join("id"),
            key.public_key(),
            &cert,
        );
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
