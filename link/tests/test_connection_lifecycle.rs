//! Integration tests for the connect/disconnect state machine, driven through
//! a recording mock transport:
//!
//! - version negotiation gates the transport entirely when the engine is
//!   too old, and proceeds otherwise
//! - each auth mode takes its own preparation path
//! - disconnect is idempotent and an unsolicited drop resets the session

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use studio_link::{
    AuthMode, ConnectionConfig, ConnectionState, Credentials, DisconnectReason, EventHandlers,
    OpenOptions, Protocol, RecordField, StudioLinkClient, StudioLinkError,
};

mod common;

use common::{mock_client, root_config, Behaviour, Call, MockConnector, StaticVersionSource};

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

// ── version negotiation ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_old_engine_is_blocked_before_any_transport() {
    let (client, connector) =
        mock_client("surrealdb-1.2.3+20230801", Behaviour::default(), EventHandlers::new());

    let err = client.connect(&root_config()).await.unwrap_err();

    match err {
        StudioLinkError::UnsupportedVersion { version, minimum } => {
            assert_eq!(version, "1.2.3");
            assert_eq!(minimum, "1.3.0");
        },
        other => panic!("expected UnsupportedVersion, got {:?}", other),
    }
    assert_eq!(connector.created(), 0, "no transport may be opened");
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.version().is_none());
}

#[tokio::test]
async fn test_supported_engine_connects_and_records_version() {
    let (client, connector) = mock_client("1.4.0", Behaviour::default(), EventHandlers::new());

    client.connect(&root_config()).await.unwrap();

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.version().as_deref(), Some("1.4.0"));
    assert_eq!(client.protocol(), Some(Protocol::Ws));

    let calls = connector.last().calls();
    assert_eq!(calls[0], Call::Connect("ws://localhost:8000/rpc".to_string()));
    assert_eq!(
        calls[1],
        Call::Signin(Credentials::Root {
            username: "root".to_string(),
            password: "root".to_string(),
        })
    );
    assert_eq!(calls[2], Call::UseScope(OpenOptions::new("test", "test")));
}

#[tokio::test]
async fn test_unknown_version_does_not_block() {
    let connector = Arc::new(MockConnector::new(Behaviour::default()));
    let source = Arc::new(StaticVersionSource::failing());
    let client = StudioLinkClient::builder()
        .timeouts(common::test_timeouts())
        .connector(connector.clone())
        .version_source(source.clone())
        .minimum_version("1.3.0")
        .build()
        .unwrap();

    client.connect(&root_config()).await.unwrap();

    assert_eq!(source.fetches(), 1);
    assert!(client.is_connected());
    assert!(client.version().is_none());
}

// ── authentication ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_signin_token_is_kept() {
    let behaviour = Behaviour {
        signin_token: Some("jwt-abc".to_string()),
        ..Behaviour::default()
    };
    let (client, _connector) = mock_client("1.4.0", behaviour, EventHandlers::new());

    client.connect(&root_config()).await.unwrap();
    assert_eq!(client.access_token().as_deref(), Some("jwt-abc"));

    client.disconnect().await;
    assert!(client.access_token().is_none());
}

#[tokio::test]
async fn test_anonymous_connect_invalidates_instead_of_signin() {
    let (client, connector) = mock_client("1.4.0", Behaviour::default(), EventHandlers::new());
    let config = ConnectionConfig::new(Protocol::Ws, "localhost:8000");
    assert_eq!(config.auth_mode, AuthMode::None);

    client.connect(&config).await.unwrap();

    let transport = connector.last();
    assert_eq!(transport.count(|c| matches!(c, Call::Signin(_))), 0);
    assert_eq!(transport.count(|c| *c == Call::Invalidate), 1);
    assert_eq!(transport.count(|c| matches!(c, Call::UseScope(_))), 1);
    let calls = transport.calls();
    let invalidated = calls.iter().position(|c| *c == Call::Invalidate).unwrap();
    let scoped = calls.iter().position(|c| matches!(c, Call::UseScope(_))).unwrap();
    assert!(invalidated < scoped);
    assert!(client.access_token().is_none());
}

#[tokio::test]
async fn test_signin_does_not_invalidate() {
    let (client, connector) = mock_client("1.4.0", Behaviour::default(), EventHandlers::new());
    client.connect(&root_config()).await.unwrap();
    assert_eq!(connector.last().count(|c| *c == Call::Invalidate), 0);
}

#[tokio::test]
async fn test_token_mode_authenticates() {
    let (client, connector) = mock_client("1.4.0", Behaviour::default(), EventHandlers::new());
    let config = ConnectionConfig::new(Protocol::Ws, "localhost:8000").with_token("issued");

    client.connect(&config).await.unwrap();

    let transport = connector.last();
    assert_eq!(transport.count(|c| *c == Call::Authenticate("issued".to_string())), 1);
    assert_eq!(client.access_token().as_deref(), Some("issued"));
}

#[tokio::test]
async fn test_rejected_token_fails_with_token_invalid() {
    let behaviour = Behaviour {
        authenticate_error: Some("expired".to_string()),
        ..Behaviour::default()
    };
    let (client, connector) = mock_client("1.4.0", behaviour, EventHandlers::new());
    let config = ConnectionConfig::new(Protocol::Ws, "localhost:8000").with_token("stale");

    let err = client.connect(&config).await.unwrap_err();

    assert!(matches!(err, StudioLinkError::TokenInvalid));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(connector.last().count(|c| *c == Call::Close), 1);
}

#[tokio::test]
async fn test_failed_signup_fails_with_signup_failed() {
    let behaviour = Behaviour {
        signup_error: Some("access method rejected the record".to_string()),
        ..Behaviour::default()
    };
    let (client, connector) = mock_client("1.4.0", behaviour, EventHandlers::new());
    let config = ConnectionConfig::new(Protocol::Ws, "localhost:8000")
        .with_namespace("app")
        .with_database("main")
        .with_record_auth("account", vec![RecordField::new("email", "a@b.c")], true);

    let err = client.connect(&config).await.unwrap_err();

    assert!(matches!(err, StudioLinkError::SignupFailed));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    let transport = connector.last();
    assert_eq!(transport.count(|c| matches!(c, Call::Signup(_))), 1);
    assert_eq!(transport.count(|c| matches!(c, Call::Signin(_))), 0);
    assert_eq!(transport.count(|c| *c == Call::Close), 1);
}

#[tokio::test]
async fn test_missing_record_prompts_for_signup() {
    let prompts = counter();
    let prompts_clone = prompts.clone();
    let handlers = EventHandlers::new().on_signup_required(move || {
        prompts_clone.fetch_add(1, Ordering::SeqCst);
    });
    let behaviour = Behaviour {
        signin_error: Some("There was a problem: No record was returned".to_string()),
        ..Behaviour::default()
    };
    let (client, _connector) = mock_client("1.4.0", behaviour, handlers);
    let config = ConnectionConfig::new(Protocol::Ws, "localhost:8000")
        .with_record_auth("account", vec![], false);

    client.connect(&config).await.unwrap();

    assert_eq!(prompts.load(Ordering::SeqCst), 1);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_other_signin_failure_closes_transport() {
    let behaviour = Behaviour {
        signin_error: Some("There was a problem with authentication".to_string()),
        ..Behaviour::default()
    };
    let (client, connector) = mock_client("1.4.0", behaviour, EventHandlers::new());

    let err = client.connect(&root_config()).await.unwrap_err();

    assert!(matches!(err, StudioLinkError::ConnectionFailed(ref m) if m.contains("authentication")));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(connector.last().count(|c| *c == Call::Close), 1);
}

#[tokio::test]
async fn test_transport_open_failure() {
    let behaviour = Behaviour {
        connect_error: Some("connection refused".to_string()),
        ..Behaviour::default()
    };
    let (client, _connector) = mock_client("1.4.0", behaviour, EventHandlers::new());

    let err = client.connect(&root_config()).await.unwrap_err();

    assert!(matches!(err, StudioLinkError::ConnectionFailed(_)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_missing_configuration() {
    let (client, _connector) = mock_client("1.4.0", Behaviour::default(), EventHandlers::new());
    let err = client.connect_configured().await.unwrap_err();
    assert!(matches!(err, StudioLinkError::NoConnection));
}

// ── lifecycle ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_state_transitions_and_callbacks() {
    let states = Arc::new(Mutex::new(Vec::new()));
    let connects = counter();
    let syncs = counter();

    let states_clone = states.clone();
    let connects_clone = connects.clone();
    let syncs_clone = syncs.clone();
    let handlers = EventHandlers::new()
        .on_state_change(move |state| states_clone.lock().push(state))
        .on_connect(move || {
            connects_clone.fetch_add(1, Ordering::SeqCst);
        })
        .on_schema_sync(move || {
            syncs_clone.fetch_add(1, Ordering::SeqCst);
        });
    let (client, _connector) = mock_client("1.4.0", Behaviour::default(), handlers);

    client.connect(&root_config()).await.unwrap();
    client.disconnect().await;

    assert_eq!(
        *states.lock(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
        ]
    );
    assert_eq!(connects.load(Ordering::SeqCst), 1);
    assert_eq!(syncs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_disconnect_twice_closes_once() {
    let disconnects = counter();
    let disconnects_clone = disconnects.clone();
    let handlers = EventHandlers::new().on_disconnect(move |_| {
        disconnects_clone.fetch_add(1, Ordering::SeqCst);
    });
    let (client, connector) = mock_client("1.4.0", Behaviour::default(), handlers);
    client.connect(&root_config()).await.unwrap();

    client.disconnect().await;
    client.disconnect().await;

    assert_eq!(connector.last().count(|c| *c == Call::Close), 1);
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_reconnect_replaces_previous_transport() {
    let (client, connector) = mock_client("1.4.0", Behaviour::default(), EventHandlers::new());

    client.connect(&root_config()).await.unwrap();
    client.connect(&root_config()).await.unwrap();

    assert_eq!(connector.created(), 2);
    assert_eq!(connector.transport(0).count(|c| *c == Call::Close), 1);
    assert_eq!(connector.transport(1).count(|c| *c == Call::Close), 0);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_unsolicited_disconnect_resets_session() {
    let reasons = Arc::new(Mutex::new(Vec::new()));
    let reasons_clone = reasons.clone();
    let handlers =
        EventHandlers::new().on_disconnect(move |reason| reasons_clone.lock().push(reason));
    let (client, connector) = mock_client("1.4.0", Behaviour::default(), handlers);
    client.connect(&root_config()).await.unwrap();
    client
        .execute_user_query("tab", "LIVE SELECT * FROM person;", None)
        .await
        .unwrap();
    assert!(client.is_live("tab"));

    let mut state = client.subscribe_state();
    connector
        .last()
        .drop_connection(DisconnectReason::with_code("Connection reset", 1006));
    state
        .wait_for(|s| *s == ConnectionState::Disconnected)
        .await
        .unwrap();

    assert!(client.version().is_none());
    assert!(client.access_token().is_none());
    assert!(!client.is_live("tab"));
    assert!(client.live_subscriptions("tab").is_empty());
    assert!(common::eventually(|| reasons.lock().len() == 1).await);
    assert_eq!(reasons.lock()[0].code, Some(1006));

    let err = client.execute_query("SELECT 1", None).await.unwrap_err();
    assert!(matches!(err, StudioLinkError::NotConnected));
}

#[tokio::test]
async fn test_stale_disconnect_is_ignored() {
    let (client, connector) = mock_client("1.4.0", Behaviour::default(), EventHandlers::new());
    client.connect(&root_config()).await.unwrap();
    let first = connector.last();
    client.connect(&root_config()).await.unwrap();

    first.drop_connection(DisconnectReason::new("late event"));
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(client.is_connected());
    assert_eq!(client.version().as_deref(), Some("1.4.0"));
}

#[tokio::test]
async fn test_disconnect_during_setup_never_reports_connected() {
    let states = Arc::new(Mutex::new(Vec::new()));
    let connects = counter();
    let states_clone = states.clone();
    let connects_clone = connects.clone();
    let handlers = EventHandlers::new()
        .on_state_change(move |state| states_clone.lock().push(state))
        .on_connect(move || {
            connects_clone.fetch_add(1, Ordering::SeqCst);
        });
    let behaviour = Behaviour {
        drop_during_use: true,
        ..Behaviour::default()
    };
    let (client, _connector) = mock_client("1.4.0", behaviour, handlers);

    let err = client.connect(&root_config()).await.unwrap_err();

    assert!(matches!(
        err,
        StudioLinkError::ConnectionFailed(ref m) if m.contains("closed during setup")
    ));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.version().is_none());
    assert!(client.access_token().is_none());
    assert_eq!(connects.load(Ordering::SeqCst), 0);
    assert!(!states.lock().contains(&ConnectionState::Connected));

    let err = client.execute_query("SELECT 1", None).await.unwrap_err();
    assert!(matches!(err, StudioLinkError::NotConnected));
}
