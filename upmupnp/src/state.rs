//! Variables d'état des services et calcul des changements.

use std::collections::BTreeMap;

/// Nom de variable → valeur encodée en chaîne.
///
/// Un `BTreeMap` garde un ordre d'émission stable dans les événements ;
/// l'ordre n'a pas de sens pour les points de contrôle.
pub type StateVariableMap = BTreeMap<String, String>;

/// Retourne les entrées de `current` absentes de `previous` ou dont la valeur
/// diffère.
///
/// Les variables disparues entre deux relevés ne sont pas signalées :
/// l'eventing UPnP n'a pas de notion de suppression de variable.
pub fn diff_state(previous: &StateVariableMap, current: &StateVariableMap) -> StateVariableMap {
    current
        .iter()
        .filter(|(name, value)| previous.get(*name) != Some(*value))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Construit une map depuis des couples `(&str, String)`.
pub fn state_map<I, K, V>(entries: I) -> StateVariableMap
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StateVariableMap {
        state_map([("Volume", "40"), ("Mute", "0"), ("TransportState", "Playing")])
    }

    #[test]
    fn test_diff_identical_is_empty() {
        let a = sample();
        assert!(diff_state(&a, &a).is_empty());
    }

    #[test]
    fn test_diff_from_empty_is_everything() {
        let b = sample();
        assert_eq!(diff_state(&StateVariableMap::new(), &b), b);
    }

    #[test]
    fn test_diff_reports_changed_and_new_only() {
        let a = sample();
        let mut b = a.clone();
        b.insert("Volume".into(), "41".into());
        b.insert("Shuffle".into(), "1".into());
        b.remove("Mute");

        let changed = diff_state(&a, &b);
        assert_eq!(changed, state_map([("Volume", "41"), ("Shuffle", "1")]));
    }
}
