//! Broker connections over mutually authenticated TLS.

use std::{sync::Arc, time::Duration};

use busbridge::{
    CorrelationRouter,
    Message,
    Route,
    broker::{BrokerClient, BrokerMessage, RemoteBroker},
    bus::{ChannelListener, InMemoryBus, LocalBus},
    tls::{CredentialLoadError, TlsContextBuilder, TlsContextCell, TlsSettings},
    transport::{BrokerUri, ConnectOptions, TransportError, TransportSelector},
};
use busbridge_testing::{STORE_PASSWORD, TestBroker, TestResult, TlsFixture, spawn_uppercase_responder};
use rstest::{fixture, rstest};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

#[fixture]
fn tls() -> TlsFixture { TlsFixture::generate().expect("failed to generate TLS fixture") }

fn selector(settings: TlsSettings) -> (Arc<TlsContextCell>, TransportSelector) {
    let cell = Arc::new(TlsContextCell::new(Arc::new(TlsContextBuilder::new(settings))));
    let options = ConnectOptions::default().timeout(Some(WAIT));
    (cell.clone(), TransportSelector::with_context_cell(cell, options))
}

#[rstest]
#[tokio::test]
async fn request_reply_over_mutual_tls(tls: TlsFixture) -> TestResult {
    let broker = TestBroker::spawn_tls(tls.server_config()?).await?;
    let uri: BrokerUri = broker.url().parse()?;
    assert!(uri.scheme().is_secure());

    let remote: Arc<dyn RemoteBroker> = broker.broker();
    spawn_uppercase_responder(remote, "orders", 1).await?;

    let (cell, selector) = selector(tls.client_settings());
    let client = BrokerClient::connect(&uri, &selector).await?;
    let context = cell.get_if_built().ok_or("context not built")?;
    assert!(context.presents_client_certificate());
    assert_eq!(context.trust_anchor_count(), 1);

    let bus = Arc::new(InMemoryBus::new());
    let _router = CorrelationRouter::new(bus.clone(), Arc::new(client))
        .install(Route::symmetric("orders")?)
        .await?;
    let (listener, mut replies) = ChannelListener::new();
    bus.register_listener("orders.REPLY", Arc::new(listener))?;

    bus.send("orders", Message::new("hello").with_response_id("abc-123"))
        .await?;
    let reply = timeout(WAIT, replies.recv()).await?.ok_or("no reply")?;
    assert_eq!(reply.payload_str(), Some("HELLO"));
    assert_eq!(reply.response_id(), Some("abc-123"));

    broker.stop().await;
    Ok(())
}

#[rstest]
#[tokio::test]
async fn wrong_trust_store_password_fails_before_dialling(tls: TlsFixture) -> TestResult {
    // Nothing listens here; a credential error must come first.
    let uri: BrokerUri = "ssl://127.0.0.1:9".parse()?;
    let settings = TlsSettings::new(tls.store("trust.pem", "not-the-password"))
        .key_store(tls.store("client.pem", STORE_PASSWORD));
    let (cell, selector) = selector(settings);

    let err = BrokerClient::connect(&uri, &selector)
        .await
        .expect_err("wrong password must fail");
    assert!(
        matches!(
            err,
            TransportError::Credentials(CredentialLoadError::PasswordMismatch { .. })
        ),
        "unexpected error: {err}"
    );
    assert!(cell.get_if_built().is_none());
    Ok(())
}

#[rstest]
#[tokio::test]
async fn untrusted_server_is_rejected(tls: TlsFixture) -> TestResult {
    let broker = TestBroker::spawn_tls(tls.server_config()?).await?;
    let stranger = TlsFixture::generate()?;

    let (_, selector) = selector(stranger.client_settings());
    let err = BrokerClient::connect(&broker.url().parse()?, &selector)
        .await
        .expect_err("handshake must fail");
    assert!(matches!(err, TransportError::Handshake { .. }), "unexpected error: {err}");
    Ok(())
}

#[rstest]
#[tokio::test]
async fn broker_requiring_client_auth_refuses_anonymous_clients(tls: TlsFixture) -> TestResult {
    let broker = TestBroker::spawn_tls(tls.server_config()?).await?;
    let settings = TlsSettings::new(tls.store("trust.pem", STORE_PASSWORD))
        .key_store(tls.store("empty.pem", STORE_PASSWORD));
    let (cell, selector) = selector(settings);

    // Under TLS 1.3 the server may only reject the missing certificate
    // after the client considers the handshake complete.
    let refused = match BrokerClient::connect(&broker.url().parse()?, &selector).await {
        Err(_) => true,
        Ok(client) => timeout(WAIT, client.send(BrokerMessage::new("orders", "hi")))
            .await?
            .is_err(),
    };
    assert!(refused);
    let context = cell.get_if_built().ok_or("context not built")?;
    assert!(!context.presents_client_certificate());
    Ok(())
}

#[tokio::test]
async fn plain_selector_cannot_reach_secure_uri() -> TestResult {
    let selector = TransportSelector::plain_only(ConnectOptions::default());
    let err = BrokerClient::connect(&"ssl://127.0.0.1:9".parse()?, &selector)
        .await
        .expect_err("no secure connector");
    assert!(matches!(err, TransportError::SecureUnavailable(_)));
    Ok(())
}
