//! Credential loading: builds an OpenSSL client connector from either a
//! PEM certificate+key pair or a PKCS#12 bundle.

use std::fs;
use std::sync::Arc;

use openssl::pkcs12::Pkcs12;
use openssl::pkey::PKey;
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use openssl::x509::X509;

use crate::context::{Credentials, LogLevel};
use crate::error::{ApnsError, ApnsResult};

/// Anything that can receive a handshake log line. The production
/// `Context` implements this; tests can supply a stub.
pub trait HandshakeLog: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Build a client [`SslConnector`] from the credentials stored on a
/// [`crate::Context`]. `log_sink` receives INFO-level handshake state
/// transitions via OpenSSL's info callback, a closure capturing an `Arc`
/// rather than stashing a raw pointer in the TLS context's user-data
/// slot.
pub fn build_connector(
    credentials: &Credentials,
    log_sink: Arc<dyn HandshakeLog>,
) -> ApnsResult<SslConnector> {
    let mut builder = SslConnector::builder(SslMethod::tls_client())
        .map_err(|_| ApnsError::CouldNotInitializeSslConnection)?;
    builder.set_verify(SslVerifyMode::PEER);
    let _ = builder.set_default_verify_paths();

    match credentials {
        Credentials::Pkcs12 { path, password } => {
            let der = fs::read(path).map_err(|_| ApnsError::UnableToUseSpecifiedPkcs12)?;
            let pkcs12 =
                Pkcs12::from_der(&der).map_err(|_| ApnsError::UnableToUseSpecifiedPkcs12)?;
            let parsed = pkcs12
                .parse2(password)
                .map_err(|_| ApnsError::UnableToUseSpecifiedPkcs12)?;
            let cert = parsed.cert.ok_or(ApnsError::UnableToUseSpecifiedPkcs12)?;
            let pkey = parsed.pkey.ok_or(ApnsError::UnableToUseSpecifiedPkcs12)?;
            builder
                .set_certificate(&cert)
                .map_err(|_| ApnsError::UnableToUseSpecifiedPkcs12)?;
            builder
                .set_private_key(&pkey)
                .map_err(|_| ApnsError::UnableToUseSpecifiedPkcs12)?;
        }
        Credentials::Pem {
            cert_path,
            key_path,
            key_password,
        } => {
            let cert_pem =
                fs::read(cert_path).map_err(|_| ApnsError::UnableToUseSpecifiedCertificate)?;
            let cert = X509::from_pem(&cert_pem)
                .map_err(|_| ApnsError::UnableToUseSpecifiedCertificate)?;
            builder
                .set_certificate(&cert)
                .map_err(|_| ApnsError::UnableToUseSpecifiedCertificate)?;

            let key_pem =
                fs::read(key_path).map_err(|_| ApnsError::UnableToUseSpecifiedPrivateKey)?;
            let pkey = match key_password {
                Some(password) => {
                    PKey::private_key_from_pem_passphrase(&key_pem, password.as_bytes())
                        .map_err(|_| ApnsError::UnableToUseSpecifiedPrivateKey)?
                }
                None => PKey::private_key_from_pem(&key_pem)
                    .map_err(|_| ApnsError::UnableToUseSpecifiedPrivateKey)?,
            };
            builder
                .set_private_key(&pkey)
                .map_err(|_| ApnsError::UnableToUseSpecifiedPrivateKey)?;
            builder
                .check_private_key()
                .map_err(|_| ApnsError::UnableToUseSpecifiedPrivateKey)?;
        }
    }

    builder.set_info_callback(move |ssl, _where, _ret| {
        log_sink.log(
            LogLevel::INFO,
            &format!("TLS handshake state: {}", ssl.state_string_long()),
        );
    });

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LogLevel as CtxLogLevel;

    struct NullLog;
    impl HandshakeLog for NullLog {
        fn log(&self, _level: CtxLogLevel, _message: &str) {}
    }

    #[test]
    fn missing_pem_certificate_maps_to_unable_to_use_specified_certificate() {
        let creds = Credentials::Pem {
            cert_path: "/nonexistent/missing.pem".into(),
            key_path: "/nonexistent/missing-key.pem".into(),
            key_password: None,
        };
        let result = build_connector(&creds, Arc::new(NullLog));
        assert!(matches!(
            result,
            Err(ApnsError::UnableToUseSpecifiedCertificate)
        ));
    }

    #[test]
    fn missing_pkcs12_bundle_maps_to_unable_to_use_specified_pkcs12() {
        let creds = Credentials::Pkcs12 {
            path: "/nonexistent/missing.p12".into(),
            password: "secret".into(),
        };
        let result = build_connector(&creds, Arc::new(NullLog));
        assert!(matches!(result, Err(ApnsError::UnableToUseSpecifiedPkcs12)));
    }

    /// A self-signed cert+key pair generated fresh per test, the way the
    /// example pack's QUIC benchmarking tool builds ephemeral test
    /// certificates with `rcgen`.
    fn self_signed_pair() -> (X509, PKey<openssl::pkey::Private>) {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();
        let cert = X509::from_pem(generated.serialize_pem().unwrap().as_bytes()).unwrap();
        let pkey =
            PKey::private_key_from_pem(generated.serialize_private_key_pem().as_bytes()).unwrap();
        (cert, pkey)
    }

    #[test]
    fn well_formed_pem_credentials_load_successfully() {
        let (cert, pkey) = self_signed_pair();
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        fs::write(&cert_path, cert.to_pem().unwrap()).unwrap();
        fs::write(&key_path, pkey.private_key_to_pem_pkcs8().unwrap()).unwrap();

        let creds = Credentials::Pem {
            cert_path,
            key_path,
            key_password: None,
        };
        let result = build_connector(&creds, Arc::new(NullLog));
        assert!(result.is_ok());
    }

    #[test]
    fn password_protected_pem_key_loads_successfully() {
        let (cert, pkey) = self_signed_pair();
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        fs::write(&cert_path, cert.to_pem().unwrap()).unwrap();
        let encrypted = pkey
            .private_key_to_pem_pkcs8_passphrase(
                openssl::symm::Cipher::aes_128_cbc(),
                b"hunter2",
            )
            .unwrap();
        fs::write(&key_path, encrypted).unwrap();

        let creds = Credentials::Pem {
            cert_path,
            key_path,
            key_password: Some("hunter2".into()),
        };
        let result = build_connector(&creds, Arc::new(NullLog));
        assert!(result.is_ok());
    }

    #[test]
    fn wrong_pem_key_password_is_rejected() {
        let (cert, pkey) = self_signed_pair();
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        fs::write(&cert_path, cert.to_pem().unwrap()).unwrap();
        let encrypted = pkey
            .private_key_to_pem_pkcs8_passphrase(
                openssl::symm::Cipher::aes_128_cbc(),
                b"hunter2",
            )
            .unwrap();
        fs::write(&key_path, encrypted).unwrap();

        let creds = Credentials::Pem {
            cert_path,
            key_path,
            key_password: Some("wrong".into()),
        };
        let result = build_connector(&creds, Arc::new(NullLog));
        assert!(matches!(
            result,
            Err(ApnsError::UnableToUseSpecifiedPrivateKey)
        ));
    }

    #[test]
    fn well_formed_pkcs12_bundle_loads_successfully() {
        let (cert, pkey) = self_signed_pair();
        let pkcs12 = Pkcs12::builder()
            .name("apns-client-test")
            .pkey(&pkey)
            .cert(&cert)
            .build2("bundle-password")
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.p12");
        fs::write(&path, pkcs12.to_der().unwrap()).unwrap();

        let creds = Credentials::Pkcs12 {
            path,
            password: "bundle-password".into(),
        };
        let result = build_connector(&creds, Arc::new(NullLog));
        assert!(result.is_ok());
    }

    #[test]
    fn wrong_pkcs12_password_is_rejected() {
        let (cert, pkey) = self_signed_pair();
        let pkcs12 = Pkcs12::builder()
            .name("apns-client-test")
            .pkey(&pkey)
            .cert(&cert)
            .build2("bundle-password")
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.p12");
        fs::write(&path, pkcs12.to_der().unwrap()).unwrap();

        let creds = Credentials::Pkcs12 {
            path,
            password: "wrong-password".into(),
        };
        let result = build_connector(&creds, Arc::new(NullLog));
        assert!(matches!(result, Err(ApnsError::UnableToUseSpecifiedPkcs12)));
    }
}
