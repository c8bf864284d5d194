//! Moteur d'appel SOAP côté point de contrôle.
//!
//! Les arguments sont émis dans l'ordre fourni par l'appelant. La réponse est
//! décodée en table nom → texte à partir des enfants immédiats de l'élément
//! `<ActionResponse>`. L'absence d'une valeur attendue est une erreur
//! [`ControlPointError::BadResponse`], jamais une valeur par défaut.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, trace};
use upmupnp::soap::{build_soap_request, parse_bool, parse_soap_fault, parse_soap_response};
use ureq::Agent;

use crate::errors::ControlPointError;

/// Valeurs de retour d'une action
pub type ActionResult = HashMap<String, String>;

/// Exécute une action SOAP sur un service distant.
///
/// L'implémentation réseau est [`UreqInvoker`] ; les tests fournissent la leur.
pub trait ActionInvoker: Send + Sync {
    fn invoke(
        &self,
        control_url: &str,
        service_type: &str,
        action: &str,
        args: &[(&str, &str)],
    ) -> Result<ActionResult, ControlPointError>;
}

/// Client SOAP HTTP basé sur `ureq`
pub struct UreqInvoker {
    agent: Agent,
}

impl UreqInvoker {
    pub fn new(timeout: Duration) -> Self {
        // Les fautes SOAP arrivent avec un statut 500 : on veut lire le corps
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: config.into(),
        }
    }
}

impl Default for UreqInvoker {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl ActionInvoker for UreqInvoker {
    fn invoke(
        &self,
        control_url: &str,
        service_type: &str,
        action: &str,
        args: &[(&str, &str)],
    ) -> Result<ActionResult, ControlPointError> {
        let body = build_soap_request(service_type, action, args)
            .map_err(|e| ControlPointError::OutOfMemory(format!("{}: {}", action, e)))?;
        let soap_action = format!(r#""{}#{}""#, service_type, action);

        debug!(url = control_url, action, "invoking SOAP action");
        let mut response = self
            .agent
            .post(control_url)
            .header("Content-Type", r#"text/xml; charset="utf-8""#)
            .header("SOAPAction", &soap_action)
            .send(body)?;

        let status = response.status();
        let raw_body = response.body_mut().read_to_string()?;
        trace!(action, status = status.as_u16(), body = %raw_body, "SOAP response");

        if !status.is_success() {
            if let Some(fault) = parse_soap_fault(raw_body.as_bytes()) {
                return Err(ControlPointError::UpnpFault {
                    code: fault.code,
                    description: fault.description,
                });
            }
            return Err(ControlPointError::HttpStatus {
                action: action.to_string(),
                status: status.as_u16(),
            });
        }

        decode_action_response(action, &raw_body)
    }
}

/// Décode le corps d'une réponse SOAP pour l'action donnée.
pub fn decode_action_response(action: &str, body: &str) -> Result<ActionResult, ControlPointError> {
    if let Some(fault) = parse_soap_fault(body.as_bytes()) {
        return Err(ControlPointError::UpnpFault {
            code: fault.code,
            description: fault.description,
        });
    }

    let (name, values) = parse_soap_response(body.as_bytes())
        .map_err(|e| ControlPointError::bad_response(format!("{}: {}", action, e)))?;

    let expected = format!("{}Response", action);
    if name != expected {
        return Err(ControlPointError::bad_response(format!(
            "expected <{}>, got <{}>",
            expected, name
        )));
    }
    Ok(values)
}

/// Valeur texte obligatoire
pub fn required<'a>(
    values: &'a ActionResult,
    action: &str,
    name: &str,
) -> Result<&'a str, ControlPointError> {
    values
        .get(name)
        .map(|s| s.as_str())
        .ok_or_else(|| ControlPointError::missing_return_value(action, name))
}

pub fn required_i64(
    values: &ActionResult,
    action: &str,
    name: &str,
) -> Result<i64, ControlPointError> {
    let text = required(values, action, name)?;
    text.trim()
        .parse::<i64>()
        .map_err(|_| ControlPointError::bad_return_value(name, text))
}

pub fn required_u32(
    values: &ActionResult,
    action: &str,
    name: &str,
) -> Result<u32, ControlPointError> {
    let text = required(values, action, name)?;
    text.trim()
        .parse::<u32>()
        .map_err(|_| ControlPointError::bad_return_value(name, text))
}

pub fn required_bool(
    values: &ActionResult,
    action: &str,
    name: &str,
) -> Result<bool, ControlPointError> {
    let text = required(values, action, name)?;
    parse_bool(text).ok_or_else(|| ControlPointError::bad_return_value(name, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(inner: &str) -> String {
        format!(
            r#"<?xml version="1.0"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body>{}</s:Body></s:Envelope>"#,
            inner
        )
    }

    #[test]
    fn test_decode_response() {
        let body = envelope(
            r#"<u:GetVolumeResponse xmlns:u="urn:schemas-upnp-org:service:RenderingControl:1"><CurrentVolume>42</CurrentVolume></u:GetVolumeResponse>"#,
        );
        let values = decode_action_response("GetVolume", &body).unwrap();
        assert_eq!(required_u32(&values, "GetVolume", "CurrentVolume").unwrap(), 42);
        assert!(matches!(
            required(&values, "GetVolume", "Other"),
            Err(ControlPointError::BadResponse(_))
        ));
    }

    #[test]
    fn test_decode_wrong_response_name() {
        let body = envelope(r#"<u:StopResponse xmlns:u="urn:x"/>"#);
        assert!(matches!(
            decode_action_response("Play", &body),
            Err(ControlPointError::BadResponse(_))
        ));
    }

    #[test]
    fn test_decode_fault() {
        let body = envelope(
            r#"<s:Fault><faultcode>s:Client</faultcode><faultstring>UPnPError</faultstring><detail><UPnPError xmlns="urn:schemas-upnp-org:control-1-0"><errorCode>718</errorCode><errorDescription>Invalid InstanceID</errorDescription></UPnPError></detail></s:Fault>"#,
        );
        let err = decode_action_response("Play", &body).unwrap_err();
        assert_eq!(err.upnp_code(), Some(718));
    }

    #[test]
    fn test_required_bool() {
        let mut values = ActionResult::new();
        values.insert("CurrentMute".to_string(), "1".to_string());
        values.insert("Bad".to_string(), "maybe".to_string());
        assert!(required_bool(&values, "GetMute", "CurrentMute").unwrap());
        assert!(required_bool(&values, "GetMute", "Bad").is_err());
    }
}
