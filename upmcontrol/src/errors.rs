use thiserror::Error;
use upmdidl::DidlError;
use upmupnp::soap::SoapParseError;

#[derive(Error, Debug)]
pub enum ControlPointError {
    #[error("HTTP error: {0}")]
    Http(#[from] ureq::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{action} failed with HTTP status {status}")]
    HttpStatus { action: String, status: u16 },
    #[error("SOAP decoding error: {0}")]
    Soap(#[from] SoapParseError),
    #[error("UPnP error {code}: {description}")]
    UpnpFault { code: u16, description: String },
    #[error("Bad response: {0}")]
    BadResponse(String),
    #[error("Cannot build request for {0}")]
    OutOfMemory(String),
    #[error("Invalid device description: {0}")]
    Description(String),
    #[error("DIDL error: {0}")]
    Didl(#[from] DidlError),
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    #[error("{0} does not expose service {1}")]
    ServiceNotFound(String, String),
    #[error("Invalid device state: {0}")]
    InvalidState(String),
    #[error("Event subscription error: {0}")]
    Subscription(String),
}

impl ControlPointError {
    pub fn bad_response(message: impl Into<String>) -> Self {
        ControlPointError::BadResponse(message.into())
    }

    pub fn missing_return_value(action: &str, name: &str) -> Self {
        ControlPointError::BadResponse(format!("{}: missing {} in response", action, name))
    }

    pub fn bad_return_value(name: &str, value: &str) -> Self {
        ControlPointError::BadResponse(format!("invalid {} value: {}", name, value))
    }

    pub fn service_not_found(device: &str, service: &str) -> Self {
        ControlPointError::ServiceNotFound(device.to_string(), service.to_string())
    }

    /// Code d'erreur UPnP distant, s'il y en a un
    pub fn upnp_code(&self) -> Option<u16> {
        match self {
            ControlPointError::UpnpFault { code, .. } => Some(*code),
            _ => None,
        }
    }
}
