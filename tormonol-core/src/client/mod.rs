//! Client side: drive the handshake over HTTP, then open the session socket
//!
//! ```no_run
//! # async fn demo(identity: tormonol_core::core_crypto::SigningIdentity) -> Result<(), Box<dyn std::error::Error>> {
//! use tormonol_core::client::{TerminalClient, TerminalEvent};
//! use tormonol_core::core_frame::Dimensions;
//!
//! let client = TerminalClient::new("http://127.0.0.1:8022", identity)?;
//! let mut terminal = client.connect(Dimensions { cols: 80, rows: 24 }).await?;
//! terminal.write("ls\n").await?;
//! while let Some(event) = terminal.next_event().await {
//!     if let TerminalEvent::Closed(reason) = event {
//!         println!("closed: {}", reason.reason_text());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod terminal;

use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, Instrument};
use url::Url;

use crate::core_crypto::SigningIdentity;
use crate::core_frame::{Dimensions, SecureChannel};
use crate::core_handshake::{Admission, InitiatorHandshake};
use crate::core_pty::{TransportEvent, WireOut};
use crate::server::TRACEPARENT;

pub use error::{ClientError, ClientResult};
pub use terminal::{RemoteTerminal, TerminalEvent};

const WIRE_BUFFER: usize = 64;

pub struct TerminalClient {
    http: reqwest::Client,
    base: Url,
    handshake: InitiatorHandshake,
}

impl TerminalClient {
    /// `base_url` is the server root, `http://` or `https://`.
    pub fn new(base_url: &str, identity: SigningIdentity) -> ClientResult<Self> {
        let base = Url::parse(base_url)?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme {}",
                base.scheme()
            )));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            handshake: InitiatorHandshake::new(identity),
        })
    }

    /// Run the handshake and open a session.
    pub async fn connect(&self, dimensions: Dimensions) -> ClientResult<RemoteTerminal> {
        let traceparent = new_traceparent();
        let span = tracing::info_span!("connect", traceparent = %traceparent);
        async {
            let admission = self.handshake(&traceparent).await?;
            self.open(admission, dimensions, &traceparent).await
        }
        .instrument(span)
        .await
    }

    /// Challenge, ticket and salt. The returned admission is good for one socket.
    pub async fn handshake(&self, traceparent: &str) -> ClientResult<Admission> {
        let nonce = self.post("challenge", String::new(), traceparent).await?;
        let ticket = self
            .post("ticket", self.handshake.ticket_body(&nonce)?, traceparent)
            .await?;
        let pending = self.handshake.accept_ticket(&ticket)?;
        let salt = self
            .post("salt", pending.salt_body().to_string(), traceparent)
            .await?;
        let admission = pending.accept_salt(&salt)?;
        debug!(session = %admission.id, "handshake complete");
        Ok(admission)
    }

    /// Open the session socket for an admission.
    pub async fn open(
        &self,
        admission: Admission,
        dimensions: Dimensions,
        traceparent: &str,
    ) -> ClientResult<RemoteTerminal> {
        let (id, token, keys) = admission.into_parts();
        let url = self.session_url(&id, &token, dimensions)?;

        let mut request = url.as_str().into_client_request()?;
        let header = HeaderValue::from_str(traceparent)
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        request.headers_mut().insert(TRACEPARENT, header);

        let (socket, _) = tokio_tungstenite::connect_async(request).await?;
        info!(session = %id, %dimensions, "session opened");

        let (mut sink, mut stream) = socket.split();
        let (wire_tx, mut wire_rx) = mpsc::channel::<WireOut>(WIRE_BUFFER);
        let (transport_tx, transport_rx) = mpsc::channel(WIRE_BUFFER);

        tokio::spawn(async move {
            while let Some(out) = wire_rx.recv().await {
                let (message, last) = match out {
                    WireOut::Frame(bytes) => (Message::Binary(bytes), false),
                    WireOut::Close { code, reason } => (
                        Message::Close(Some(CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        })),
                        true,
                    ),
                };
                if let Err(e) = sink.send(message).await {
                    debug!(error = %e, "socket write failed");
                    break;
                }
                if last {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            let closed = loop {
                match stream.next().await {
                    Some(Ok(Message::Binary(bytes))) => {
                        if transport_tx.send(TransportEvent::Frame(bytes)).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => TransportEvent::Closed {
                                code: Some(u16::from(frame.code)),
                                reason: frame.reason.into_owned(),
                            },
                            None => TransportEvent::Closed {
                                code: None,
                                reason: String::new(),
                            },
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        break TransportEvent::Closed {
                            code: None,
                            reason: e.to_string(),
                        }
                    }
                    None => {
                        break TransportEvent::Closed {
                            code: None,
                            reason: "stream ended".to_string(),
                        }
                    }
                }
            };
            let _ = transport_tx.send(closed).await;
        });

        let (channel, events) = SecureChannel::bind(keys, wire_tx.clone());
        Ok(RemoteTerminal::start(id, channel, events, transport_rx, wire_tx))
    }

    /// `ws[s]://host/sessions/{id}?token=..&dimensions=c,r`
    pub fn session_url(&self, id: &str, token: &str, dimensions: Dimensions) -> ClientResult<Url> {
        let mut url = self.endpoint(&["sessions", id])?;
        let scheme = if self.base.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::InvalidUrl(format!("cannot use {} scheme", scheme)))?;
        url.query_pairs_mut()
            .clear()
            .append_pair("token", token)
            .append_pair("dimensions", &dimensions.to_string());
        Ok(url)
    }

    fn endpoint(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn post(&self, step: &'static str, body: String, traceparent: &str) -> ClientResult<String> {
        let response = self
            .http
            .post(self.endpoint(&[step])?)
            .header(TRACEPARENT, traceparent)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Rejected {
                step,
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

/// Fresh W3C `traceparent` with random trace and span ids
pub fn new_traceparent() -> String {
    let mut rng = rand::thread_rng();
    let trace_id: u128 = rng.gen_range(1..=u128::MAX);
    let span_id: u64 = rng.gen_range(1..=u64::MAX);
    format!("00-{:032x}-{:016x}-01", trace_id, span_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> TerminalClient {
        TerminalClient::new(base, SigningIdentity::generate()).unwrap()
    }

    #[test]
    fn test_rejects_non_http_base() {
        assert!(TerminalClient::new("ftp://host", SigningIdentity::generate()).is_err());
        assert!(TerminalClient::new("not a url", SigningIdentity::generate()).is_err());
    }

    #[test]
    fn test_session_url_encodes_token_and_id() {
        let url = client("http://127.0.0.1:8022")
            .session_url("ab/c+d==", "x+y/z=", Dimensions { cols: 80, rows: 24 })
            .unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.path(), "/sessions/ab%2Fc+d==");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("token".to_string(), "x+y/z=".to_string()),
                ("dimensions".to_string(), "80,24".to_string()),
            ]
        );
    }

    #[test]
    fn test_session_url_keeps_prefix() {
        let url = client("https://example.com/term/")
            .session_url("id", "t", Dimensions { cols: 1, rows: 1 })
            .unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/term/sessions/id");
    }

    #[test]
    fn test_traceparent_format() {
        let value = new_traceparent();
        let parts: Vec<&str> = value.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "00");
        assert_eq!(parts[1].len(), 32);
        assert_eq!(parts[2].len(), 16);
        assert_eq!(parts[3], "01");
        assert_ne!(value, new_traceparent());
    }
}
