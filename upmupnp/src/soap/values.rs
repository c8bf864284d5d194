//! Codage des valeurs primitives UPnP (booléens, entiers) et quotage XML.

/// Décode un booléen UPnP.
///
/// Mots acceptés, casse indifférente : `1`/`true`/`yes` et `0`/`false`/`no`.
/// Tout le reste est rejeté.
pub fn parse_bool(value: &str) -> Option<bool> {
    let value = value.trim();
    if ["1", "true", "yes"].iter().any(|t| value.eq_ignore_ascii_case(t)) {
        Some(true)
    } else if ["0", "false", "no"].iter().any(|f| value.eq_ignore_ascii_case(f)) {
        Some(false)
    } else {
        None
    }
}

/// Représentation d'un booléen sur le fil.
pub fn bool_to_wire(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

pub fn parse_i32(value: &str) -> Option<i32> {
    value.trim().parse::<i32>().ok()
}

pub fn parse_u32(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok()
}

/// Quote une valeur pour l'insérer dans un attribut ou un texte XML.
pub fn xml_quote(value: &str) -> String {
    quick_xml::escape::escape(value).into_owned()
}
