//! The external orchestrator that owns game logic.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::error::Error as StdError;
use std::io;

use super::command::{Command, CommandReceipt};
use super::error::{OrchestratorError, PermanentKind, TransientKind};
use crate::models::{Action, Character};

/// Something that can apply a [`Command`].
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn execute(&self, command: &Command) -> Result<CommandReceipt, OrchestratorError>;
}

#[async_trait]
impl<O: Orchestrator + ?Sized> Orchestrator for std::sync::Arc<O> {
    async fn execute(&self, command: &Command) -> Result<CommandReceipt, OrchestratorError> {
        (**self).execute(command).await
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    prompt: &'a str,
    characters: &'a [Character],
}

#[derive(Serialize)]
struct TurnBody<'a> {
    actions: &'a [Action],
}

/// Orchestrator reached over its JSON HTTP API.
#[derive(Debug, Clone)]
pub struct HttpOrchestrator {
    base_url: String,
    client: reqwest::Client,
}

impl HttpOrchestrator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Builds the URL for a path below the orchestrator base URL.
    fn url(&self, path: &str) -> String {
        let base = if self.base_url.starts_with("http://") || self.base_url.starts_with("https://")
        {
            self.base_url.clone()
        } else {
            format!("http://{}", self.base_url)
        };
        format!("{}{}", base.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Orchestrator for HttpOrchestrator {
    async fn execute(&self, command: &Command) -> Result<CommandReceipt, OrchestratorError> {
        let request = match command {
            Command::Create {
                game_id,
                prompt,
                characters,
            } => self.client.post(self.url("/games")).json(&CreateBody {
                id: game_id.as_deref(),
                prompt,
                characters,
            }),
            Command::Start { game_id } => self
                .client
                .post(self.url(&format!("/games/{}/start", game_id))),
            Command::SubmitTurn { game_id, actions } => self
                .client
                .post(self.url(&format!("/games/{}/turns", game_id)))
                .json(&TurnBody { actions }),
        };

        let response = request.send().await.map_err(|e| classify_request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        response
            .json::<CommandReceipt>()
            .await
            .map_err(|e| OrchestratorError::permanent(PermanentKind::Protocol, e.to_string()))
    }
}

/// Maps a non-success HTTP status to a classified error.
pub fn classify_status(status: StatusCode, body: String) -> OrchestratorError {
    let message = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body)
    };

    match status {
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            OrchestratorError::transient(TransientKind::Unavailable, message)
        }
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            OrchestratorError::permanent(PermanentKind::Validation, message)
        }
        StatusCode::NOT_FOUND => OrchestratorError::permanent(PermanentKind::NotFound, message),
        _ => OrchestratorError::permanent(PermanentKind::Rejected, message),
    }
}

/// Maps a transport error to a classified error.
fn classify_request_error(error: &reqwest::Error) -> OrchestratorError {
    let message = error.to_string();

    if error.is_timeout() {
        return OrchestratorError::transient(TransientKind::TimedOut, message);
    }
    if let Some(kind) = io_error_kind(error) {
        match kind {
            io::ErrorKind::ConnectionRefused => {
                return OrchestratorError::transient(TransientKind::ConnectionRefused, message)
            }
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => {
                return OrchestratorError::transient(TransientKind::ConnectionReset, message)
            }
            io::ErrorKind::TimedOut => {
                return OrchestratorError::transient(TransientKind::TimedOut, message)
            }
            _ => {}
        }
    }
    if error.is_connect() {
        return OrchestratorError::transient(TransientKind::ConnectionRefused, message);
    }

    OrchestratorError::permanent(PermanentKind::Protocol, message)
}

/// Walks the source chain looking for the underlying I/O error.
fn io_error_kind(error: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        current = err.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, String::new()).is_transient());
        assert!(classify_status(StatusCode::BAD_GATEWAY, String::new()).is_transient());
        assert!(classify_status(StatusCode::GATEWAY_TIMEOUT, String::new()).is_transient());

        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, "no such game".to_string()),
            OrchestratorError::permanent(PermanentKind::NotFound, "404 Not Found: no such game")
        );
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, String::new()),
            OrchestratorError::Permanent {
                kind: PermanentKind::Validation,
                ..
            }
        ));
        assert!(matches!(
            classify_status(StatusCode::CONFLICT, String::new()),
            OrchestratorError::Permanent {
                kind: PermanentKind::Rejected,
                ..
            }
        ));
    }

    #[test]
    fn test_io_error_kind_walks_chain() {
        #[derive(Debug)]
        struct Wrapper(io::Error);

        impl std::fmt::Display for Wrapper {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "wrapped")
            }
        }

        impl StdError for Wrapper {
            fn source(&self) -> Option<&(dyn StdError + 'static)> {
                Some(&self.0)
            }
        }

        let err = Wrapper(io::Error::from(io::ErrorKind::ConnectionReset));
        assert_eq!(io_error_kind(&err), Some(io::ErrorKind::ConnectionReset));
    }

    #[test]
    fn test_url() {
        let orchestrator = HttpOrchestrator::new("localhost:9000/");
        assert_eq!(orchestrator.url("/games"), "http://localhost:9000/games");

        let orchestrator = HttpOrchestrator::new("https://orchestrator.example.com");
        assert_eq!(
            orchestrator.url("/games/g1/start"),
            "https://orchestrator.example.com/games/g1/start"
        );
    }

    #[tokio::test]
    async fn test_refused_connection_is_transient() {
        // Bind then drop a listener to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let orchestrator = HttpOrchestrator::new(format!("http://{}", addr));
        let result = orchestrator.execute(&Command::start("g1")).await;

        assert!(result.unwrap_err().is_transient());
    }
}
