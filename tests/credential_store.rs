//! Loading sealed credential stores from disk.

use std::fs;

use busbridge::tls::{CredentialLoadError, StoreSettings, TlsContextBuilder, TlsSettings, seal_store};
use busbridge_testing::{STORE_PASSWORD, TlsFixture};
use rstest::{fixture, rstest};

#[fixture]
fn tls() -> TlsFixture { TlsFixture::generate().expect("failed to generate TLS fixture") }

#[rstest]
fn trust_and_key_stores_build_a_context(tls: TlsFixture) {
    let context = TlsContextBuilder::new(tls.client_settings())
        .build()
        .expect("context builds");
    assert_eq!(context.trust_anchor_count(), 1);
    assert!(context.presents_client_certificate());
}

#[rstest]
fn empty_key_store_means_no_client_certificate(tls: TlsFixture) {
    let settings = TlsSettings::new(tls.store("trust.pem", STORE_PASSWORD))
        .key_store(tls.store("empty.pem", STORE_PASSWORD));
    let context = TlsContextBuilder::new(settings).build().expect("context builds");
    assert!(!context.presents_client_certificate());
}

#[rstest]
#[case::trust_store("trust.pem", "client.pem")]
#[case::key_store("client.pem", "trust.pem")]
fn wrong_password_names_the_store(tls: TlsFixture, #[case] locked: &str, #[case] other: &str) {
    let (trust, key) = if locked == "trust.pem" {
        (tls.store(locked, "wrong"), tls.store(other, STORE_PASSWORD))
    } else {
        (tls.store(other, STORE_PASSWORD), tls.store(locked, "wrong"))
    };
    let err = TlsContextBuilder::new(TlsSettings::new(trust).key_store(key))
        .build()
        .expect_err("wrong password");
    let location = match err {
        CredentialLoadError::PasswordMismatch { location } => location,
        other => panic!("expected a password mismatch, got {other}"),
    };
    assert!(location.ends_with(locked), "{location} does not name {locked}");
}

#[rstest]
fn missing_store_is_a_read_error(tls: TlsFixture) {
    let settings = TlsSettings::new(tls.store("absent.pem", STORE_PASSWORD));
    let err = TlsContextBuilder::new(settings).build().expect_err("missing file");
    assert!(matches!(err, CredentialLoadError::Read { .. }));
}

#[rstest]
fn key_store_without_key_is_rejected(tls: TlsFixture) {
    let err = tls
        .store("trust.pem", STORE_PASSWORD)
        .load_identity()
        .expect_err("certificates without a key");
    assert!(matches!(err, CredentialLoadError::MissingPrivateKey { .. }));
}

#[rstest]
fn resealed_store_accepts_only_the_new_password(tls: TlsFixture) {
    let path = tls.path("trust.pem");
    let resealed = seal_store(&fs::read(&path).expect("read store"), "rotated");
    fs::write(&path, resealed).expect("write store");

    let store = StoreSettings::new(path.clone());
    assert!(store.clone().password("rotated").load_certificates().is_ok());
    assert!(matches!(
        store.password(STORE_PASSWORD).load_certificates(),
        Err(CredentialLoadError::PasswordMismatch { .. })
    ));
}
