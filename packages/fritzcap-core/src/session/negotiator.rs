//! The session negotiator: runs the two-step login exchange against the
//! device's web interface.

use std::time::Duration;

use serde::Deserialize;
use tokio::time::sleep;

use crate::session::{Challenge, LoginState, SessionError};

/// Route serving the login-state document on FRITZ!OS devices.
const LOGIN_SID_ROUTE: &str = "/login_sid.lua?version=2";

/// Sid the device returns when it rejects the credentials.
const REJECTED_SID: &str = "0000000000000000";

/// Default per-request timeout for both protocol exchanges.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Negotiates a web session with a FRITZ!Box-style device.
///
/// Each [`SessionNegotiator::acquire_session`] call runs the full
/// challenge-response exchange and is independent of prior calls; the
/// negotiator keeps no protocol state between attempts.
#[derive(Debug, Clone)]
pub struct SessionNegotiator {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

/// Subset of the `<SessionInfo>` document the protocol needs.
#[derive(Debug, Deserialize)]
struct SessionInfo {
    #[serde(rename = "SID")]
    sid: Option<String>,
    #[serde(rename = "Challenge")]
    challenge: Option<String>,
    #[serde(rename = "BlockTime")]
    block_time: Option<u64>,
}

impl SessionNegotiator {
    /// Create a negotiator for the device at `base_url` (scheme and host
    /// without a trailing path, e.g. `http://fritz.box`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-request timeout applied to both HTTP exchanges.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch the current login state (challenge and block time).
    pub async fn fetch_login_state(&self) -> Result<LoginState, SessionError> {
        let url = format!("{}{}", self.base_url, LOGIN_SID_ROUTE);

        let resp = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SessionError::StateFetch(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(SessionError::StateFetch(format!(
                "device returned status {}",
                resp.status()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| SessionError::StateFetch(e.to_string()))?;
        let info = parse_session_info(&body).map_err(SessionError::StateFetch)?;

        let challenge = info
            .challenge
            .ok_or_else(|| SessionError::StateFetch("missing Challenge element".into()))?;
        let block_time = info
            .block_time
            .ok_or_else(|| SessionError::StateFetch("missing BlockTime element".into()))?;

        let state = LoginState {
            challenge,
            block_time,
        };

        tracing::debug!(
            "Login state: block_time={}s, pbkdf2={}",
            state.block_time,
            state.is_pbkdf2()
        );

        Ok(state)
    }

    /// Run the full challenge-response exchange and return the session id.
    ///
    /// Fetches a fresh challenge, derives the response with the scheme the
    /// challenge selects, waits out a nonzero block time and submits the
    /// response. Dropping the future abandons the attempt; every attempt
    /// starts over from a fresh challenge.
    pub async fn acquire_session(
        &self,
        username: &str,
        password: &str,
    ) -> Result<String, SessionError> {
        let state = self.fetch_login_state().await?;

        let challenge = Challenge::parse(&state.challenge)?;
        let response = challenge.respond(password);

        // The device refuses logins submitted before the block time expires.
        if state.block_time > 0 {
            tracing::info!(
                "Device blocks logins for {} seconds, waiting...",
                state.block_time
            );
            sleep(Duration::from_secs(state.block_time)).await;
        }

        let sid = self.submit_response(username, &response).await?;
        if sid == REJECTED_SID {
            return Err(SessionError::AuthenticationRejected);
        }

        tracing::info!("Session established for user '{}'", username);
        Ok(sid)
    }

    /// Submit the challenge response and return the sid the device reports.
    async fn submit_response(
        &self,
        username: &str,
        response: &str,
    ) -> Result<String, SessionError> {
        let url = format!("{}{}", self.base_url, LOGIN_SID_ROUTE);

        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .form(&[("username", username), ("response", response)])
            .send()
            .await
            .map_err(|e| SessionError::LoginSubmit(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(SessionError::LoginSubmit(format!(
                "device returned status {}",
                resp.status()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| SessionError::LoginSubmit(e.to_string()))?;
        let info = parse_session_info(&body).map_err(SessionError::LoginSubmit)?;

        info.sid
            .ok_or_else(|| SessionError::LoginSubmit("missing SID element".into()))
    }
}

/// Parse a `<SessionInfo>` document, reporting the failure as plain text.
fn parse_session_info(body: &str) -> Result<SessionInfo, String> {
    quick_xml::de::from_str(body).map_err(|e| format!("invalid login-state document: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::Mutex;

    fn session_info(sid: &str, challenge: &str, block_time: u64) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <SessionInfo><SID>{sid}</SID><Challenge>{challenge}</Challenge>\
             <BlockTime>{block_time}</BlockTime><Rights></Rights></SessionInfo>"
        )
    }

    /// Canned-response device stub. Serves one response per accepted
    /// connection and records each request (start line, headers and body).
    struct StubDevice {
        base_url: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    async fn spawn_stub(responses: Vec<(u16, String)>) -> StubDevice {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;
                log.lock().await.push(request);

                let reply = format!(
                    "HTTP/1.1 {status} Stub\r\nContent-Type: text/xml\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
            }
        });

        StubDevice { base_url, requests }
    }

    /// Read one HTTP request: headers plus any Content-Length body.
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(header_end) = find_subslice(&buf, b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
                let content_length = headers
                    .lines()
                    .filter(|line| line.to_ascii_lowercase().starts_with("content-length:"))
                    .find_map(|line| line.split(':').nth(1))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    return String::from_utf8_lossy(&buf).to_string();
                }
            }
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return String::from_utf8_lossy(&buf).to_string();
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    #[tokio::test]
    async fn test_fetch_login_state() {
        let stub = spawn_stub(vec![(
            200,
            session_info("0000000000000000", "2$1$ab$1$cd", 30),
        )])
        .await;

        let state = SessionNegotiator::new(&stub.base_url)
            .fetch_login_state()
            .await
            .unwrap();

        assert_eq!(state.challenge, "2$1$ab$1$cd");
        assert_eq!(state.block_time, 30);
        assert!(state.is_pbkdf2());

        let requests = stub.requests.lock().await;
        assert!(requests[0].starts_with("GET /login_sid.lua?version=2 "));
    }

    #[tokio::test]
    async fn test_acquire_session_pbkdf2() {
        let stub = spawn_stub(vec![
            (
                200,
                session_info("0000000000000000", "2$10000$1234abcd$10000$ef567890", 0),
            ),
            (200, session_info("cafe1234beef5678", "2$1$ab$1$cd", 0)),
        ])
        .await;

        let sid = SessionNegotiator::new(&stub.base_url)
            .acquire_session("testuser", "secret")
            .await
            .unwrap();
        assert_eq!(sid, "cafe1234beef5678");

        let requests = stub.requests.lock().await;
        assert_eq!(requests.len(), 2);
        assert!(requests[1].starts_with("POST /login_sid.lua?version=2 "));
        assert!(
            requests[1]
                .to_ascii_lowercase()
                .contains("content-type: application/x-www-form-urlencoded")
        );
        // The '$' separator is form-encoded as %24
        assert!(requests[1].contains("username=testuser"));
        assert!(requests[1].contains(
            "response=ef567890%24269a382b9780209fcc5ec3d4ead33bada79b24c47dd1341fd1aa54b16f93820b"
        ));
    }

    #[tokio::test]
    async fn test_acquire_session_md5_waits_block_time() {
        let stub = spawn_stub(vec![
            (200, session_info("0000000000000000", "abcdef01", 2)),
            (200, session_info("0001020304050607", "abcdef01", 0)),
        ])
        .await;

        let started = Instant::now();
        let sid = SessionNegotiator::new(&stub.base_url)
            .acquire_session("admin", "pw")
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(sid, "0001020304050607");

        let requests = stub.requests.lock().await;
        assert!(requests[1].contains("response=abcdef01-8526dd752d1d226ad9d895a467e7147c"));
    }

    #[tokio::test]
    async fn test_zero_block_time_does_not_wait() {
        let stub = spawn_stub(vec![
            (200, session_info("0000000000000000", "abcdef01", 0)),
            (200, session_info("0001020304050607", "abcdef01", 0)),
        ])
        .await;

        let started = Instant::now();
        SessionNegotiator::new(&stub.base_url)
            .acquire_session("admin", "pw")
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let stub = spawn_stub(vec![
            (200, session_info("0000000000000000", "abcdef01", 0)),
            (200, session_info("0000000000000000", "abcdef01", 0)),
        ])
        .await;

        let err = SessionNegotiator::new(&stub.base_url)
            .acquire_session("admin", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::AuthenticationRejected));
    }

    #[tokio::test]
    async fn test_malformed_challenge_aborts_before_submit() {
        let stub = spawn_stub(vec![(
            200,
            session_info("0000000000000000", "2$10$zzzz$10$ef567890", 0),
        )])
        .await;

        let err = SessionNegotiator::new(&stub.base_url)
            .acquire_session("admin", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::ChallengeFormat(_)));

        // The response must never be submitted for a malformed challenge
        assert_eq!(stub.requests.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_incomplete_login_state_document() {
        let stub = spawn_stub(vec![(
            200,
            "<SessionInfo><SID>0000000000000000</SID></SessionInfo>".to_string(),
        )])
        .await;

        let err = SessionNegotiator::new(&stub.base_url)
            .fetch_login_state()
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::StateFetch(_)));
    }

    #[tokio::test]
    async fn test_unparsable_login_state_document() {
        let stub = spawn_stub(vec![(200, "not an xml document".to_string())]).await;

        let err = SessionNegotiator::new(&stub.base_url)
            .fetch_login_state()
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::StateFetch(_)));
    }

    #[tokio::test]
    async fn test_error_status_on_fetch() {
        let stub = spawn_stub(vec![(403, String::new())]).await;

        let err = SessionNegotiator::new(&stub.base_url)
            .fetch_login_state()
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::StateFetch(_)));
    }

    #[tokio::test]
    async fn test_missing_sid_on_submit() {
        let stub = spawn_stub(vec![
            (200, session_info("0000000000000000", "abcdef01", 0)),
            (
                200,
                "<SessionInfo><BlockTime>0</BlockTime></SessionInfo>".to_string(),
            ),
        ])
        .await;

        let err = SessionNegotiator::new(&stub.base_url)
            .acquire_session("admin", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::LoginSubmit(_)));
    }

    #[tokio::test]
    async fn test_unreachable_device() {
        // Bind and drop a listener to get a port with nothing behind it
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = SessionNegotiator::new(&base_url)
            .fetch_login_state()
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::StateFetch(_)));
    }
}
