#![allow(dead_code)]

use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use radosgw_assume::{FlowSettings, OidcProvider, Progress, Verification, VerificationPrompt};
use serde_json::json;
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const CLIENT_ID: &str = "radosgw";
pub const SCOPE: &str = "openid";

pub const DEVICE_PATH: &str = "/protocol/openid-connect/auth/device";
pub const TOKEN_PATH: &str = "/protocol/openid-connect/token";

/// Settings with timings short enough for tests and no browser launch.
pub fn fast_settings() -> FlowSettings {
    FlowSettings {
        auth_timeout: Duration::from_secs(5),
        progress_interval: Duration::from_millis(50),
        default_poll_interval: Duration::from_millis(20),
        slow_down_step: Duration::from_millis(100),
        callback_port: 0,
        callback_fallback_port: 0,
        launch_browser: false,
    }
}

pub fn provider(server: &MockServer) -> OidcProvider {
    OidcProvider::new(server.uri(), CLIENT_ID, SCOPE)
}

pub fn http() -> reqwest::Client {
    radosgw_assume::http_client(true).unwrap()
}

/// Respond to device registration with `d1`/`U1` and the given poll interval.
pub async fn mount_device_authorization(server: &MockServer, interval: u64) {
    Mock::given(method("POST"))
        .and(path(DEVICE_PATH))
        .and(body_string_contains("client_id=radosgw"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "d1",
            "user_code": "U1",
            "verification_uri": "https://idp.example.com/device",
            "verification_uri_complete": "https://idp.example.com/device?user_code=U1",
            "expires_in": 600,
            "interval": interval,
        })))
        .expect(1)
        .mount(server)
        .await;
}

pub fn token_error(code: &str) -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(json!({ "error": code }))
}

pub fn token_granted(token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": token,
        "token_type": "Bearer",
        "expires_in": 300,
    }))
}

/// Counts ticks and records whether waiting finished.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    ticks: AtomicUsize,
    finished: AtomicBool,
}

impl RecordingProgress {
    pub fn ticks(&self) -> usize {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

impl Progress for RecordingProgress {
    fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }
}

/// A prompt that records every verification it is given.
pub fn recording_prompt() -> (
    impl VerificationPrompt<Error = Infallible>,
    Arc<Mutex<Vec<Verification>>>,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let prompt = {
        let seen = Arc::clone(&seen);
        move |verification| async move {
            seen.lock().unwrap().push(verification);
            Ok::<_, Infallible>(())
        }
    };
    (prompt, seen)
}
