//! Error taxonomy shared by the engine, the voice transport and the resolver.

use thiserror::Error;

use crate::sources::ResolveError;

/// Errors a front end can receive from the playback core.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// The resolver found nothing, or could not extract a stream locator.
    #[error("could not resolve track: {0}")]
    ResolutionFailed(#[from] ResolveError),

    /// The bot lacks Connect/Speak in the target channel.
    #[error("missing permission to connect or speak in the voice channel")]
    Forbidden,

    /// Join/move was issued but the session never reported ready.
    #[error("voice handshake timed out (UDP may be blocked)")]
    HandshakeTimeout,

    #[error("voice connection failed: {0}")]
    ConnectionFailed(#[source] TransportError),

    /// Both the primary and the fallback stream refused to start.
    #[error("playback could not start for '{title}'")]
    PlaybackStartFailed { title: String },
}

impl From<TransportError> for PlayerError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Forbidden => PlayerError::Forbidden,
            TransportError::TimedOut => PlayerError::HandshakeTimeout,
            other => PlayerError::ConnectionFailed(other),
        }
    }
}

/// Failures reported by a [`VoiceTransport`](crate::audio::transport::VoiceTransport)
/// for session-level calls.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("permission denied")]
    Forbidden,

    #[error("no voice session for this guild")]
    NotConnected,

    /// Gateway or voice driver handshake did not finish in time.
    #[error("voice handshake timed out")]
    TimedOut,

    #[error("{0}")]
    Failed(String),
}

/// Why a stream could not be started.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("no voice session for this guild")]
    NotConnected,

    #[error("stream rejected: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_transport_error_maps_to_forbidden() {
        assert!(matches!(
            PlayerError::from(TransportError::Forbidden),
            PlayerError::Forbidden
        ));
    }

    #[test]
    fn transport_timeout_maps_to_handshake_timeout() {
        assert!(matches!(
            PlayerError::from(TransportError::TimedOut),
            PlayerError::HandshakeTimeout
        ));
    }

    #[test]
    fn other_transport_errors_are_wrapped() {
        let err = PlayerError::from(TransportError::Failed("gateway closed".into()));
        match err {
            PlayerError::ConnectionFailed(cause) => {
                assert_eq!(cause.to_string(), "gateway closed");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
