use solana_client::{
    client_error::{ClientError, ClientErrorKind},
    nonblocking::pubsub_client::PubsubClientError,
    rpc_request::RpcError,
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Network(String),
    #[error("{0}")]
    Rpc(String),
    #[error("transaction {0} not found")]
    NotFound(String),
}

impl TrackerError {
    /// Transport-level failures are worth another attempt, everything else is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, TrackerError::Network(_))
    }
}

impl From<ClientError> for TrackerError {
    fn from(error: ClientError) -> Self {
        match error.kind() {
            ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_) => {
                TrackerError::Network(error.to_string())
            }
            ClientErrorKind::RpcError(RpcError::RpcResponseError { message, .. }) => {
                TrackerError::Rpc(message.clone())
            }
            _ => TrackerError::Rpc(error.to_string()),
        }
    }
}

impl From<PubsubClientError> for TrackerError {
    fn from(error: PubsubClientError) -> Self {
        match error {
            PubsubClientError::SubscribeFailed { reason, .. } => TrackerError::Rpc(reason),
            other => TrackerError::Network(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() || error.is_status() {
            TrackerError::Rpc(error.to_string())
        } else {
            TrackerError::Network(error.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("network {0} requires an API key")]
    MissingApiKey(String),
    #[error("history limit must be a positive integer")]
    InvalidHistoryLimit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_error_displays_bare_message() {
        let error = TrackerError::Network("timeout".to_string());
        assert_eq!(error.to_string(), "timeout");
        assert!(error.is_transient());
    }

    #[test]
    fn rpc_errors_are_not_transient() {
        assert!(!TrackerError::Rpc("Invalid param".to_string()).is_transient());
        assert!(!TrackerError::Validation("invalid address".to_string()).is_transient());
    }

    #[test]
    fn rpc_response_error_keeps_server_message() {
        let error = ClientError::from(ClientErrorKind::RpcError(RpcError::RpcResponseError {
            code: -32602,
            message: "Invalid param: WrongSize".to_string(),
            data: solana_client::rpc_request::RpcResponseErrorData::Empty,
        }));
        assert_eq!(
            TrackerError::from(error),
            TrackerError::Rpc("Invalid param: WrongSize".to_string())
        );
    }

    #[test]
    fn io_failure_is_a_network_error() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout");
        let error = ClientError::from(ClientErrorKind::Io(io));
        assert!(matches!(TrackerError::from(error), TrackerError::Network(_)));
    }
}
