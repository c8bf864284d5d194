//! Décodage typé des arguments d'actions et tables de handlers.
//!
//! Un service déclare ses actions sous forme de [`ActionSpec`] : nom, arguments
//! d'entrée typés, noms des arguments de sortie dans l'ordre où ils doivent
//! être émis, et une fonction handler recevant explicitement le contexte du
//! device.

use std::cell::Cell;
use std::collections::HashMap;

use crate::errors::{ActionError, ActionResult};
use crate::soap::{parse_bool, parse_i32, parse_u32};

/// Type primitif d'un argument SOAP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    String,
    I4,
    Ui4,
    Boolean,
}

impl ArgKind {
    /// Nom du type UPnP (`dataType` des SCPD).
    pub fn upnp_type(&self) -> &'static str {
        match self {
            ArgKind::String => "string",
            ArgKind::I4 => "i4",
            ArgKind::Ui4 => "ui4",
            ArgKind::Boolean => "boolean",
        }
    }
}

/// Déclaration d'un argument d'entrée.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
}

impl ArgSpec {
    pub const fn string(name: &'static str) -> Self {
        Self { name, kind: ArgKind::String }
    }

    pub const fn i4(name: &'static str) -> Self {
        Self { name, kind: ArgKind::I4 }
    }

    pub const fn ui4(name: &'static str) -> Self {
        Self { name, kind: ArgKind::Ui4 }
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self { name, kind: ArgKind::Boolean }
    }
}

/// Valeur décodée d'un argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

/// Appel SOAP décodé, transmis au handler puis jeté.
#[derive(Debug)]
pub struct PendingAction {
    name: String,
    args: HashMap<String, ArgValue>,
    wake: Cell<bool>,
}

impl PendingAction {
    /// Décode les arguments déclarés depuis les valeurs brutes de la requête.
    ///
    /// Un argument absent ou mal formé donne `InvalidParameter` : le handler
    /// n'est alors jamais appelé.
    pub fn decode(
        name: &str,
        specs: &[ArgSpec],
        raw: &HashMap<String, String>,
    ) -> ActionResult<Self> {
        let mut args = HashMap::with_capacity(specs.len());
        for spec in specs {
            let text = raw.get(spec.name).ok_or_else(|| {
                ActionError::invalid_param(format!("{}: missing argument {}", name, spec.name))
            })?;
            let bad = || {
                ActionError::invalid_param(format!(
                    "{}: bad {} value for {}: [{}]",
                    name,
                    spec.kind.upnp_type(),
                    spec.name,
                    text
                ))
            };
            let value = match spec.kind {
                ArgKind::String => ArgValue::Str(text.clone()),
                ArgKind::I4 => ArgValue::Int(parse_i32(text).ok_or_else(bad)? as i64),
                ArgKind::Ui4 => ArgValue::Int(parse_u32(text).ok_or_else(bad)? as i64),
                ArgKind::Boolean => ArgValue::Bool(parse_bool(text).ok_or_else(bad)?),
            };
            args.insert(spec.name.to_string(), value);
        }
        Ok(Self {
            name: name.to_string(),
            args,
            wake: Cell::new(false),
        })
    }

    /// Construit un appel déjà décodé (tests, appels internes).
    pub fn from_values<I>(name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, ArgValue)>,
    {
        Self {
            name: name.to_string(),
            args: values
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            wake: Cell::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn missing(&self, arg: &str) -> ActionError {
        ActionError::invalid_param(format!("{}: no argument {}", self.name, arg))
    }

    pub fn string(&self, arg: &str) -> ActionResult<&str> {
        match self.args.get(arg) {
            Some(ArgValue::Str(s)) => Ok(s),
            _ => Err(self.missing(arg)),
        }
    }

    pub fn int(&self, arg: &str) -> ActionResult<i64> {
        match self.args.get(arg) {
            Some(ArgValue::Int(i)) => Ok(*i),
            _ => Err(self.missing(arg)),
        }
    }

    pub fn i32(&self, arg: &str) -> ActionResult<i32> {
        i32::try_from(self.int(arg)?).map_err(|_| self.missing(arg))
    }

    pub fn bool(&self, arg: &str) -> ActionResult<bool> {
        match self.args.get(arg) {
            Some(ArgValue::Bool(b)) => Ok(*b),
            _ => Err(self.missing(arg)),
        }
    }

    /// Demande un réveil de la boucle d'événements après l'action.
    pub fn wake(&self) {
        self.wake.set(true);
    }

    pub fn wake_requested(&self) -> bool {
        self.wake.get()
    }
}

/// Arguments de sortie d'une action, dans l'ordre d'ajout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoapOutgoing {
    args: Vec<(String, String)>,
}

impl SoapOutgoing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ajoute un argument (style builder).
    pub fn arg(mut self, name: &str, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: &str, value: impl Into<String>) {
        self.args.push((name.to_string(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Remet les arguments dans l'ordre déclaré ; les arguments non déclarés
    /// suivent dans leur ordre d'ajout.
    pub fn into_ordered(self, declared: &[&str]) -> Vec<(String, String)> {
        if declared.is_empty() {
            return self.args;
        }
        let mut rest = self.args;
        let mut out = Vec::with_capacity(rest.len());
        for name in declared {
            if let Some(pos) = rest.iter().position(|(n, _)| n == name) {
                out.push(rest.remove(pos));
            }
        }
        out.extend(rest);
        out
    }
}

/// Handler d'action : contexte du device explicite, appel décodé.
pub type ActionHandler<C> = fn(&mut C, &PendingAction) -> ActionResult<SoapOutgoing>;

/// Déclaration d'une action d'un service.
pub struct ActionSpec<C> {
    pub name: &'static str,
    pub args: &'static [ArgSpec],
    pub outs: &'static [&'static str],
    pub handler: ActionHandler<C>,
}

impl<C> ActionSpec<C> {
    pub const fn new(
        name: &'static str,
        args: &'static [ArgSpec],
        outs: &'static [&'static str],
        handler: ActionHandler<C>,
    ) -> Self {
        Self {
            name,
            args,
            outs,
            handler,
        }
    }
}

impl<C> Clone for ActionSpec<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for ActionSpec<C> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const SPECS: &[ArgSpec] = &[
        ArgSpec::ui4("InstanceID"),
        ArgSpec::i4("Value"),
        ArgSpec::boolean("Flag"),
        ArgSpec::string("Uri"),
    ];

    #[test]
    fn test_decode_all_kinds() {
        let call = PendingAction::decode(
            "Test",
            SPECS,
            &raw(&[("InstanceID", "0"), ("Value", "-3"), ("Flag", "true"), ("Uri", "u")]),
        )
        .unwrap();
        assert_eq!(call.int("InstanceID").unwrap(), 0);
        assert_eq!(call.i32("Value").unwrap(), -3);
        assert!(call.bool("Flag").unwrap());
        assert_eq!(call.string("Uri").unwrap(), "u");
        assert!(!call.wake_requested());
        call.wake();
        assert!(call.wake_requested());
    }

    #[test]
    fn test_decode_failures_are_invalid_parameter() {
        let bad_int = raw(&[("InstanceID", "0"), ("Value", "x"), ("Flag", "1"), ("Uri", "")]);
        let err = PendingAction::decode("Test", SPECS, &bad_int).unwrap_err();
        assert_eq!(err.code(), 402);

        let bad_bool = raw(&[("InstanceID", "0"), ("Value", "1"), ("Flag", "perhaps"), ("Uri", "")]);
        assert_eq!(PendingAction::decode("Test", SPECS, &bad_bool).unwrap_err().code(), 402);
        for word in ["nope", "10", "t"] {
            let bad_bool = raw(&[("InstanceID", "0"), ("Value", "1"), ("Flag", word), ("Uri", "")]);
            assert_eq!(PendingAction::decode("Test", SPECS, &bad_bool).unwrap_err().code(), 402, "{word}");
        }

        let negative_ui4 = raw(&[("InstanceID", "-1"), ("Value", "1"), ("Flag", "0"), ("Uri", "")]);
        assert_eq!(PendingAction::decode("Test", SPECS, &negative_ui4).unwrap_err().code(), 402);

        let missing = raw(&[("InstanceID", "0")]);
        assert_eq!(PendingAction::decode("Test", SPECS, &missing).unwrap_err().code(), 402);
    }

    #[test]
    fn test_outgoing_declared_order() {
        let out = SoapOutgoing::new()
            .arg("UpdateID", "1")
            .arg("Extra", "x")
            .arg("Result", "r")
            .arg("TotalMatches", "3")
            .arg("NumberReturned", "3");
        let ordered = out.into_ordered(&["Result", "NumberReturned", "TotalMatches", "UpdateID"]);
        let names: Vec<&str> = ordered.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["Result", "NumberReturned", "TotalMatches", "UpdateID", "Extra"]);
    }
}
