//! Erreurs du lecteur.

use thiserror::Error;
use upmupnp::ActionError;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("player I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Réponse `ACK [code@index] {commande} message`
    #[error("player refused {command}: {message} (code {code})")]
    Ack {
        code: i32,
        command: String,
        message: String,
    },

    /// Réponse inattendue du lecteur
    #[error("player protocol error: {0}")]
    Protocol(String),

    #[error("not connected to the player")]
    NotConnected,
}

impl PlayerError {
    pub fn protocol(message: impl Into<String>) -> Self {
        PlayerError::Protocol(message.into())
    }
}

/// Les échecs du lecteur remontent au point de contrôle en faute 501.
impl From<PlayerError> for ActionError {
    fn from(e: PlayerError) -> Self {
        ActionError::internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_errors_are_action_failed() {
        let e: ActionError = PlayerError::NotConnected.into();
        assert_eq!(e.code(), 501);
        let e: ActionError = PlayerError::Ack {
            code: 50,
            command: "play".into(),
            message: "No such song".into(),
        }
        .into();
        assert_eq!(e.code(), 501);
    }
}
