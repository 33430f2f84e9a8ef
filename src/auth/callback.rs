//! Local HTTP listener that receives the OAuth authorization redirect

use super::oauth::{AuthResult, OAuthError};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Path the authorization server redirects to
pub const CALLBACK_PATH: &str = "/callback";

const MAX_REQUEST_BYTES: usize = 8 * 1024;

/// How long one connection may take to send its request line
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// What a single inbound request means for the flow
#[derive(Debug, Clone, PartialEq, Eq)]
enum CallbackOutcome {
    /// Some other path (favicon etc.); keep waiting
    NotCallback,
    /// Valid code with matching state
    Code(String),
    /// Authorization server reported `error=`
    Denied(String),
    /// No `code` parameter
    MissingCode,
    /// `state` absent or different from the nonce
    StateMismatch,
}

/// Listener bound on the loopback interface for exactly one authorization callback.
///
/// `127.0.0.1:<port>` is always bound. `[::1]:<port>` is bound too when the
/// host allows it, so a redirect to `localhost` lands whichever family the
/// browser resolves first.
///
/// The sockets are owned by [`CallbackListener::wait_for_code`], so the port is
/// released on every exit path.
#[derive(Debug)]
pub struct CallbackListener {
    listener: TcpListener,
    listener_v6: Option<TcpListener>,
    port: u16,
}

impl CallbackListener {
    /// Bind the callback port. Port `0` picks a free port.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::CallbackServer`] if the IPv4 port cannot be bound.
    pub async fn bind(port: u16) -> AuthResult<Self> {
        let server_error = |e: std::io::Error| OAuthError::CallbackServer {
            port,
            message: e.to_string(),
        };
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .await
            .map_err(server_error)?;
        let port = listener.local_addr().map_err(server_error)?.port();

        let listener_v6 = match TcpListener::bind((Ipv6Addr::LOCALHOST, port)).await {
            Ok(listener) => Some(listener),
            Err(e) => {
                tracing::debug!(port, "IPv6 loopback unavailable for callback: {e}");
                None
            }
        };

        Ok(Self {
            listener,
            listener_v6,
            port,
        })
    }

    /// Bound port
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether `[::1]:<port>` is also listening
    #[must_use]
    pub fn has_ipv6(&self) -> bool {
        self.listener_v6.is_some()
    }

    async fn accept(&self) -> std::io::Result<(TcpStream, SocketAddr)> {
        match &self.listener_v6 {
            Some(v6) => tokio::select! {
                accepted = self.listener.accept() => accepted,
                accepted = v6.accept() => accepted,
            },
            None => self.listener.accept().await,
        }
    }

    /// Wait for the `/callback` request and return its authorization code.
    ///
    /// Each connection is served on its own task, so an idle or slow client
    /// cannot hold up the real redirect. Requests to other paths get a 404 and
    /// do not end the wait. The first request to `/callback` decides the
    /// outcome.
    ///
    /// # Errors
    ///
    /// - [`OAuthError::AccessDenied`] if the callback carries `error`
    /// - [`OAuthError::MissingCode`] / [`OAuthError::StateMismatch`] for invalid callbacks
    /// - [`OAuthError::CallbackTimeout`] if nothing valid arrives in time
    pub async fn wait_for_code(self, expected_state: &str, timeout: Duration) -> AuthResult<String> {
        let deadline = Instant::now() + timeout;
        let expected_state: Arc<str> = Arc::from(expected_state);
        let (outcome_tx, mut outcome_rx) = mpsc::channel(1);
        let mut connections = JoinSet::new();

        let result = loop {
            tokio::select! {
                accepted = self.accept() => match accepted {
                    Ok((socket, peer)) => {
                        connections.spawn(serve_connection(
                            socket,
                            peer,
                            Arc::clone(&expected_state),
                            outcome_tx.clone(),
                        ));
                    }
                    Err(e) => break Err(OAuthError::from(e)),
                },
                Some(outcome) = outcome_rx.recv() => break outcome,
                () = tokio::time::sleep_until(deadline) => {
                    break Err(OAuthError::CallbackTimeout {
                        seconds: timeout.as_secs(),
                    });
                }
            }
        };

        connections.abort_all();
        tracing::debug!(
            port = self.port,
            ok = result.is_ok(),
            "OAuth callback handled, closing listener"
        );
        result
    }
}

/// Serve one connection; report to `outcomes` only if it hit `/callback`
async fn serve_connection(
    mut socket: TcpStream,
    peer: SocketAddr,
    expected_state: Arc<str>,
    outcomes: mpsc::Sender<AuthResult<String>>,
) {
    let read = tokio::time::timeout(REQUEST_READ_TIMEOUT, read_request_target(&mut socket)).await;
    let target = match read {
        Ok(Ok(Some(target))) => target,
        Ok(Ok(None)) => {
            let _ = write_response(
                &mut socket,
                "400 Bad Request",
                &failure_page("Malformed request"),
            )
            .await;
            return;
        }
        Ok(Err(e)) => {
            tracing::debug!(%peer, "Dropping callback connection: {e}");
            return;
        }
        Err(_) => {
            tracing::debug!(%peer, "Dropping idle callback connection");
            return;
        }
    };

    let result = match evaluate_callback(&target, &expected_state) {
        CallbackOutcome::NotCallback => {
            let _ = write_response(&mut socket, "404 Not Found", "Not found").await;
            return;
        }
        CallbackOutcome::Code(code) => write_response(&mut socket, "200 OK", &success_page())
            .await
            .map(|()| code)
            .map_err(OAuthError::from),
        CallbackOutcome::Denied(reason) => {
            let _ = write_response(
                &mut socket,
                "200 OK",
                &failure_page("Authorization was denied. You can close this window."),
            )
            .await;
            Err(OAuthError::AccessDenied(reason))
        }
        CallbackOutcome::MissingCode => {
            let _ = write_response(
                &mut socket,
                "400 Bad Request",
                &failure_page("Missing authorization code"),
            )
            .await;
            Err(OAuthError::MissingCode)
        }
        CallbackOutcome::StateMismatch => {
            let _ = write_response(
                &mut socket,
                "400 Bad Request",
                &failure_page("State mismatch"),
            )
            .await;
            Err(OAuthError::StateMismatch)
        }
    };

    let _ = outcomes.send(result).await;
}

/// Read the request line and return its target (`/callback?code=..`)
async fn read_request_target(socket: &mut TcpStream) -> std::io::Result<Option<String>> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.windows(4).any(|w| w == b"\r\n\r\n") || buffer.len() >= MAX_REQUEST_BYTES {
            break;
        }
    }

    let request = String::from_utf8_lossy(&buffer);
    let mut parts = request.lines().next().unwrap_or_default().split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(_method), Some(target)) if target.starts_with('/') => Ok(Some(target.to_string())),
        _ => Ok(None),
    }
}

fn evaluate_callback(target: &str, expected_state: &str) -> CallbackOutcome {
    let Ok(url) = url::Url::parse(&format!("http://localhost{target}")) else {
        return CallbackOutcome::NotCallback;
    };
    if url.path() != CALLBACK_PATH {
        return CallbackOutcome::NotCallback;
    }

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return CallbackOutcome::Denied(error);
    }
    let Some(code) = code.filter(|c| !c.is_empty()) else {
        return CallbackOutcome::MissingCode;
    };
    if state.as_deref() != Some(expected_state) {
        return CallbackOutcome::StateMismatch;
    }
    CallbackOutcome::Code(code)
}

async fn write_response(socket: &mut TcpStream, status: &str, body: &str) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n{body}",
        body.len()
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

fn success_page() -> String {
    page(
        "#36B37E",
        "Authorization complete",
        "You can close this window and return to your terminal.",
    )
}

fn failure_page(message: &str) -> String {
    page("#DE350B", "Authorization failed", &html_escape(message))
}

fn page(accent: &str, title: &str, message: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>MCP Atlassian</title></head>\
         <body style=\"margin:0;display:flex;justify-content:center;align-items:center;min-height:100vh;\
         background:#f4f5f7;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif\">\
         <div style=\"text-align:center;background:#fff;padding:48px 64px;border-radius:12px;\
         box-shadow:0 2px 8px rgba(0,0,0,.08)\">\
         <h1 style=\"margin:0 0 8px;font-size:24px;color:{accent}\">{title}</h1>\
         <p style=\"margin:0;color:#6B778C;font-size:15px\">{message}</p>\
         </div></body></html>"
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
