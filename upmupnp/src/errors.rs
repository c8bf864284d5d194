//! Erreurs renvoyées par les handlers d'actions UPnP.

use thiserror::Error;

use crate::soap::error_codes;

/// Résultat d'un handler d'action.
pub type ActionResult<T> = Result<T, ActionError>;

/// Taxonomie des fautes UPnP renvoyées aux points de contrôle.
///
/// Chaque variante porte un code numérique UPnP (voir [`ActionError::code`]).
/// Les codes spécifiques à un service (7xx pour AVTransport, 800/801 pour
/// OpenHome Playlist) passent par [`ActionError::Service`] et sont transmis tels quels.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("invalid service: {0}")]
    InvalidService(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("action failed: {0}")]
    InternalError(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("UPnP error {code}: {description}")]
    Service { code: u16, description: String },
}

impl ActionError {
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        ActionError::InvalidParameter(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ActionError::InternalError(msg.into())
    }

    pub fn service(code: u16, description: impl Into<String>) -> Self {
        ActionError::Service {
            code,
            description: description.into(),
        }
    }

    /// Code UPnP numérique placé dans `errorCode`.
    pub fn code(&self) -> u16 {
        match self {
            ActionError::InvalidService(_) | ActionError::InvalidAction(_) => {
                error_codes::INVALID_ACTION
            }
            ActionError::InvalidParameter(_) => error_codes::INVALID_ARGS,
            ActionError::InternalError(_) => error_codes::ACTION_FAILED,
            ActionError::OutOfMemory => error_codes::OUT_OF_MEMORY,
            ActionError::Service { code, .. } => *code,
        }
    }

    /// Texte placé dans `errorDescription`.
    pub fn description(&self) -> String {
        match self {
            ActionError::InvalidService(_) => "Invalid Service".to_string(),
            ActionError::InvalidAction(_) => "Invalid Action".to_string(),
            ActionError::InvalidParameter(_) => "Invalid Args".to_string(),
            ActionError::InternalError(_) => "Action Failed".to_string(),
            ActionError::OutOfMemory => "Out of Memory".to_string(),
            ActionError::Service { description, .. } => description.clone(),
        }
    }
}
