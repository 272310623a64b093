//! OAuth 2.0 authorization code grant with PKCE, using a loopback redirect.

use std::{io, net::Ipv4Addr, sync::Arc, time::Duration};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex},
    task::JoinHandle,
    time,
};
use tracing::{debug, warn};
use url::Url;

use crate::{
    heartbeat::{Heartbeat, Progress},
    oidc,
    secret::{CsrfState, PkceChallenge},
    AccessToken, AuthError, FlowSettings, OidcProvider, ProviderRejection, Verification,
    VerificationPrompt,
};

const CALLBACK_PATH: &str = "/callback";

// Open browser connections may hold a graceful shutdown open; past this the server is aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Obtains an identity token with the authorization code grant.
///
/// A short-lived HTTP listener on the loopback interface receives the provider's redirect. The
/// request carries a PKCE challenge and a CSRF `state` value, which is checked before the code is
/// exchanged.
pub struct BrowserAuthenticator {
    client: oidc::Client,
    settings: FlowSettings,
}

impl BrowserAuthenticator {
    /// Create an authenticator for `provider`, sending requests with `http`.
    #[must_use]
    pub fn new(http: reqwest::Client, provider: OidcProvider, settings: FlowSettings) -> Self {
        Self {
            client: oidc::Client::new(http, provider),
            settings,
        }
    }

    /// Run the flow to completion.
    ///
    /// The callback listener binds [`FlowSettings::callback_port`], falling back once to
    /// [`FlowSettings::callback_fallback_port`]. The authorization URL is opened in the user's
    /// browser when [`FlowSettings::launch_browser`] is set, and is always passed to `prompt`.
    /// The listener is shut down on every exit path.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if no port can be bound, the provider reports an error, the
    /// callback `state` does not match ([`AuthError::StateMismatch`]), the code exchange fails,
    /// or the deadline passes.
    pub async fn authenticate<V: VerificationPrompt>(
        &self,
        prompt: V,
        progress: Arc<dyn Progress>,
    ) -> Result<AccessToken, AuthError> {
        let listener = self.bind().await?;
        let port = listener
            .local_addr()
            .map_err(AuthError::CallbackServer)?
            .port();
        let redirect_uri = format!("http://{}:{port}{CALLBACK_PATH}", Ipv4Addr::LOCALHOST);

        let state = CsrfState::generate()?;
        let pkce = PkceChallenge::generate()?;
        let authorization_url = self.client.authorization_url(&redirect_uri, &state, &pkce)?;

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let server = CallbackServer::start(listener, outcome_tx);
        debug!(%redirect_uri, "callback server listening");

        let outcome = self
            .await_callback(prompt, progress, authorization_url, outcome_rx)
            .await;
        server.shutdown().await;

        match outcome? {
            CallbackOutcome::Error { code, description } => Err(ProviderRejection::new(
                code,
                description,
                &self.client.provider().translate_context(),
            )
            .into()),
            CallbackOutcome::Code {
                code,
                state: received_state,
            } => {
                if !state.matches(&received_state) {
                    warn!("callback state does not match the authorization request");
                    return Err(AuthError::StateMismatch);
                }
                self.client.exchange_code(&code, &redirect_uri, &pkce).await
            }
        }
    }

    async fn bind(&self) -> Result<TcpListener, AuthError> {
        let primary = self.settings.callback_port;
        let fallback = self.settings.callback_fallback_port;

        match TcpListener::bind((Ipv4Addr::LOCALHOST, primary)).await {
            Ok(listener) => Ok(listener),
            Err(error) => {
                debug!(port = primary, %error, "callback port busy, trying fallback");
                TcpListener::bind((Ipv4Addr::LOCALHOST, fallback))
                    .await
                    .map_err(|error| {
                        debug!(port = fallback, %error, "fallback callback port busy");
                        AuthError::NoCallbackPortAvailable { primary, fallback }
                    })
            }
        }
    }

    async fn await_callback<V: VerificationPrompt>(
        &self,
        prompt: V,
        progress: Arc<dyn Progress>,
        authorization_url: Url,
        outcome: oneshot::Receiver<CallbackOutcome>,
    ) -> Result<CallbackOutcome, AuthError> {
        let browser_opened = self.settings.launch_browser && open_browser(&authorization_url);

        prompt
            .prompt(Verification::Browser {
                authorization_url,
                browser_opened,
            })
            .await
            .map_err(AuthError::prompt)?;

        let heartbeat = Heartbeat::start(self.settings.progress_interval, progress);
        let received = time::timeout(self.settings.auth_timeout, outcome).await;
        heartbeat.stop().await;

        match received {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(AuthError::CallbackServer(io::Error::other(
                "callback server stopped before a callback was received",
            ))),
            Err(_) => Err(AuthError::TimedOut(self.settings.auth_timeout)),
        }
    }
}

fn open_browser(url: &Url) -> bool {
    match open::that_detached(url.as_str()) {
        Ok(()) => true,
        Err(error) => {
            warn!(%error, "could not open browser automatically");
            false
        }
    }
}

#[derive(Debug)]
enum CallbackOutcome {
    Code {
        code: String,
        state: String,
    },
    Error {
        code: String,
        description: Option<String>,
    },
}

type OutcomeSlot = Arc<Mutex<Option<oneshot::Sender<CallbackOutcome>>>>;

struct CallbackServer {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<io::Result<()>>,
}

impl CallbackServer {
    fn start(listener: TcpListener, outcome: oneshot::Sender<CallbackOutcome>) -> Self {
        let slot: OutcomeSlot = Arc::new(Mutex::new(Some(outcome)));
        let app = Router::new()
            .route(CALLBACK_PATH, get(handle_callback))
            .with_state(slot);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        Self {
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        match time::timeout(SHUTDOWN_GRACE, &mut self.task).await {
            Ok(Ok(Ok(()))) => debug!("callback server stopped"),
            Ok(Ok(Err(error))) => warn!(%error, "callback server failed"),
            Ok(Err(error)) => warn!(%error, "callback server task failed"),
            Err(_) => {
                self.task.abort();
                debug!("callback server did not drain in time, aborted");
            }
        }
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn handle_callback(
    State(slot): State<OutcomeSlot>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, Html<String>) {
    let non_empty = |value: Option<String>| value.filter(|value| !value.is_empty());

    if let Some(error) = non_empty(params.error) {
        let description = non_empty(params.error_description);
        let page = failure_page(&error, description.as_deref().unwrap_or(""));
        deliver(
            &slot,
            CallbackOutcome::Error {
                code: error,
                description,
            },
        )
        .await;
        return (StatusCode::BAD_REQUEST, Html(page));
    }

    match (non_empty(params.code), non_empty(params.state)) {
        (Some(code), Some(state)) => {
            deliver(&slot, CallbackOutcome::Code { code, state }).await;
            (StatusCode::OK, Html(success_page()))
        }
        _ => {
            debug!("ignoring callback without code and state");
            (
                StatusCode::BAD_REQUEST,
                Html(failure_page(
                    "invalid_callback",
                    "The callback did not include an authorization code.",
                )),
            )
        }
    }
}

async fn deliver(slot: &OutcomeSlot, outcome: CallbackOutcome) {
    match slot.lock().await.take() {
        Some(sender) => {
            if sender.send(outcome).is_err() {
                debug!("callback arrived after the flow stopped waiting");
            }
        }
        None => debug!("ignoring repeated callback"),
    }
}

const PAGE_STYLE: &str = "body { background-color: #eee; margin: 0; padding: 0; \
                          font-family: sans-serif; } .placeholder { margin: 2em; padding: 2em; \
                          background-color: #fff; border-radius: 1em; }";

fn page(title: &str, head: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"UTF-8\">\
         <title>{title}</title>{head}<style>{PAGE_STYLE}</style></head><body>\
         <div class=\"placeholder\"><h1>{title}</h1>{body}</div></body></html>"
    )
}

fn success_page() -> String {
    page(
        "Authentication Successful",
        "<script>setTimeout(function(){window.close()}, 3000);</script>",
        "<p>You have successfully authenticated with RadosGW. You can now close this window and \
         return to your terminal.</p>",
    )
}

fn failure_page(error: &str, description: &str) -> String {
    page(
        "Authentication Failed",
        "",
        &format!(
            "<p>Error: {}</p><p>Description: {}</p>\
             <p>You can close this window and try again.</p>",
            escape_html(error),
            escape_html(description),
        ),
    )
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}
