mod support;

use std::{
    collections::HashMap,
    convert::Infallible,
    net::TcpListener,
    sync::{Arc, Mutex},
    time::Duration,
};

use pretty_assertions::assert_eq;
use radosgw_assume::{
    AuthError, BrowserAuthenticator, ErrorKind, FlowSettings, PkceChallenge, Silent, Verification,
    VerificationPrompt,
};
use support::*;
use url::Url;
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn query(url: &Url) -> HashMap<String, String> {
    url.query_pairs().into_owned().collect()
}

/// A prompt that plays the browser: it follows the redirect with `code` and the given `state`
/// (or the real one), and records the authorization URL and the callback status.
fn redirecting_prompt(
    params: impl Fn(&HashMap<String, String>) -> Vec<(String, String)> + Clone + Send + Sync + 'static,
) -> (
    impl VerificationPrompt<Error = Infallible>,
    Arc<Mutex<Option<Url>>>,
    Arc<Mutex<Option<u16>>>,
) {
    let seen_url = Arc::new(Mutex::new(None));
    let seen_status = Arc::new(Mutex::new(None));
    let prompt = {
        let seen_url = Arc::clone(&seen_url);
        let seen_status = Arc::clone(&seen_status);
        move |verification| async move {
            let Verification::Browser {
                authorization_url, ..
            } = verification
            else {
                panic!("expected browser verification");
            };
            let request = query(&authorization_url);
            *seen_url.lock().unwrap() = Some(authorization_url);

            let mut callback: Url = request["redirect_uri"].parse().unwrap();
            callback.query_pairs_mut().extend_pairs(params(&request));

            tokio::spawn(async move {
                let response = reqwest::get(callback).await.unwrap();
                *seen_status.lock().unwrap() = Some(response.status().as_u16());
            });
            Ok::<_, Infallible>(())
        }
    };
    (prompt, seen_url, seen_status)
}

fn matching_state(request: &HashMap<String, String>) -> Vec<(String, String)> {
    vec![
        ("code".to_string(), "c1".to_string()),
        ("state".to_string(), request["state"].clone()),
    ]
}

#[tokio::test]
async fn exchanges_code_with_pkce_verifier() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=c1"))
        .respond_with(token_granted("tok123"))
        .expect(1)
        .mount(&server)
        .await;

    let (prompt, seen_url, _) = redirecting_prompt(matching_state);
    let token = BrowserAuthenticator::new(http(), provider(&server), fast_settings())
        .authenticate(prompt, Arc::new(Silent))
        .await
        .unwrap();
    assert_eq!(token.secret(), "tok123");

    let authorization_url = seen_url.lock().unwrap().clone().unwrap();
    let request = query(&authorization_url);
    assert_eq!(
        authorization_url.path(),
        "/protocol/openid-connect/auth"
    );
    assert_eq!(request["client_id"], CLIENT_ID);
    assert_eq!(request["response_type"], "code");
    assert_eq!(request["scope"], SCOPE);
    assert_eq!(request["code_challenge_method"], "S256");
    assert_eq!(request["state"].len(), 32);
    assert!(request["redirect_uri"].starts_with("http://127.0.0.1:"));
    assert!(request["redirect_uri"].ends_with("/callback"));

    let requests = server.received_requests().await.unwrap();
    let exchange: HashMap<String, String> = url::form_urlencoded::parse(&requests[0].body)
        .into_owned()
        .collect();
    assert_eq!(exchange["redirect_uri"], request["redirect_uri"]);
    assert_eq!(
        PkceChallenge::from_verifier(exchange["code_verifier"].clone()).challenge(),
        request["code_challenge"]
    );
}

#[tokio::test]
async fn callback_page_reports_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_granted("tok123"))
        .mount(&server)
        .await;

    let (prompt, _, seen_status) = redirecting_prompt(matching_state);
    BrowserAuthenticator::new(http(), provider(&server), fast_settings())
        .authenticate(prompt, Arc::new(Silent))
        .await
        .unwrap();

    // the spawned browser request may still be reading the response
    for _ in 0..50 {
        if seen_status.lock().unwrap().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(*seen_status.lock().unwrap(), Some(200));
}

#[tokio::test]
async fn state_mismatch_is_rejected_without_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_granted("tok123"))
        .expect(0)
        .mount(&server)
        .await;

    let (prompt, _, _) = redirecting_prompt(|_| {
        vec![
            ("code".to_string(), "c1".to_string()),
            ("state".to_string(), "forged".to_string()),
        ]
    });
    let error = BrowserAuthenticator::new(http(), provider(&server), fast_settings())
        .authenticate(prompt, Arc::new(Silent))
        .await
        .unwrap_err();

    assert!(matches!(error, AuthError::StateMismatch));
    assert_eq!(error.kind(), ErrorKind::SecurityViolation);
}

#[tokio::test]
async fn provider_error_callback_is_translated() {
    let server = MockServer::start().await;

    let (prompt, _, _) = redirecting_prompt(|_| {
        vec![
            ("error".to_string(), "access_denied".to_string()),
            ("error_description".to_string(), "User cancelled".to_string()),
        ]
    });
    let error = BrowserAuthenticator::new(http(), provider(&server), fast_settings())
        .authenticate(prompt, Arc::new(Silent))
        .await
        .unwrap_err();

    match error {
        AuthError::Rejected(rejection) => {
            assert_eq!(rejection.code, "access_denied");
            assert_eq!(rejection.description.as_deref(), Some("User cancelled"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn falls_back_when_primary_port_is_busy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_granted("tok123"))
        .mount(&server)
        .await;

    let busy = TcpListener::bind("127.0.0.1:0").unwrap();
    let busy_port = busy.local_addr().unwrap().port();
    let settings = FlowSettings {
        callback_port: busy_port,
        callback_fallback_port: 0,
        ..fast_settings()
    };

    let (prompt, seen_url, _) = redirecting_prompt(matching_state);
    BrowserAuthenticator::new(http(), provider(&server), settings)
        .authenticate(prompt, Arc::new(Silent))
        .await
        .unwrap();

    let authorization_url = seen_url.lock().unwrap().clone().unwrap();
    let redirect: Url = query(&authorization_url)["redirect_uri"].parse().unwrap();
    assert_ne!(redirect.port(), Some(busy_port));
}

#[tokio::test]
async fn fails_when_both_ports_are_busy() {
    let server = MockServer::start().await;
    let first = TcpListener::bind("127.0.0.1:0").unwrap();
    let second = TcpListener::bind("127.0.0.1:0").unwrap();
    let primary = first.local_addr().unwrap().port();
    let fallback = second.local_addr().unwrap().port();

    let settings = FlowSettings {
        callback_port: primary,
        callback_fallback_port: fallback,
        ..fast_settings()
    };
    let (prompt, seen) = recording_prompt();
    let error = BrowserAuthenticator::new(http(), provider(&server), settings)
        .authenticate(prompt, Arc::new(Silent))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        AuthError::NoCallbackPortAvailable { primary: p, fallback: f } if p == primary && f == fallback
    ));
    assert!(error.to_string().contains("please free one of them"));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn times_out_without_callback() {
    let server = MockServer::start().await;
    let settings = FlowSettings {
        auth_timeout: Duration::from_millis(200),
        ..fast_settings()
    };
    let progress = Arc::new(RecordingProgress::default());
    let (prompt, seen) = recording_prompt();

    let error = BrowserAuthenticator::new(http(), provider(&server), settings)
        .authenticate(prompt, progress.clone())
        .await
        .unwrap_err();

    assert!(matches!(error, AuthError::TimedOut(_)));
    assert!(progress.finished());
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn rejected_code_exchange_is_translated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_error("invalid_grant"))
        .expect(1)
        .mount(&server)
        .await;

    let (prompt, _, _) = redirecting_prompt(matching_state);
    let error = BrowserAuthenticator::new(http(), provider(&server), fast_settings())
        .authenticate(prompt, Arc::new(Silent))
        .await
        .unwrap_err();

    assert!(
        matches!(error, AuthError::Rejected(ref rejection) if rejection.code == "invalid_grant"),
        "{error:?}"
    );
}

#[tokio::test]
async fn code_exchange_without_token_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let (prompt, _, _) = redirecting_prompt(matching_state);
    let error = BrowserAuthenticator::new(http(), provider(&server), fast_settings())
        .authenticate(prompt, Arc::new(Silent))
        .await
        .unwrap_err();

    assert!(matches!(error, AuthError::MissingAccessToken), "{error:?}");
    assert_eq!(error.kind(), ErrorKind::ProviderProtocol);
}

#[tokio::test]
async fn callback_port_is_released_after_timeout() {
    let server = MockServer::start().await;
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let settings = FlowSettings {
        auth_timeout: Duration::from_millis(200),
        callback_port: port,
        ..fast_settings()
    };
    let (prompt, seen) = recording_prompt();

    let error = BrowserAuthenticator::new(http(), provider(&server), settings)
        .authenticate(prompt, Arc::new(Silent))
        .await
        .unwrap_err();
    assert!(matches!(error, AuthError::TimedOut(_)));

    let authorization_url = match &seen.lock().unwrap()[0] {
        Verification::Browser {
            authorization_url, ..
        } => authorization_url.clone(),
        other => panic!("unexpected verification {other:?}"),
    };
    let redirect: Url = query(&authorization_url)["redirect_uri"].parse().unwrap();
    assert_eq!(redirect.port(), Some(port));

    TcpListener::bind(("127.0.0.1", port)).unwrap();
}
