/// Durée UPnP `H:MM:SS` à partir de millisecondes (les millisecondes sont
/// tronquées).
pub fn upnp_duration(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Secondes d'une durée UPnP `[H+]:MM:SS[.F+]`. Renvoie `None` si la chaîne
/// n'a pas trois champs numériques.
pub fn upnp_duration_to_secs(value: &str) -> Option<u32> {
    let mut fields = value.trim().split(':');
    let hours: u32 = fields.next()?.trim().parse().ok()?;
    let minutes: u32 = fields.next()?.trim().parse().ok()?;
    let seconds = fields.next()?.trim();
    if fields.next().is_some() {
        return None;
    }
    // Fraction éventuelle ignorée
    let seconds: u32 = seconds.split('.').next()?.parse().ok()?;
    Some(hours * 3600 + minutes * 60 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upnp_duration() {
        assert_eq!(upnp_duration(0), "0:00:00");
        assert_eq!(upnp_duration(205_999), "0:03:25");
        assert_eq!(upnp_duration(3_723_000), "1:02:03");
        assert_eq!(upnp_duration(36_000_000), "10:00:00");
    }

    #[test]
    fn test_upnp_duration_to_secs() {
        assert_eq!(upnp_duration_to_secs("0:03:25"), Some(205));
        assert_eq!(upnp_duration_to_secs("01:02:03.500"), Some(3723));
        assert_eq!(upnp_duration_to_secs("NOT_IMPLEMENTED"), None);
        assert_eq!(upnp_duration_to_secs("3:25"), None);
        assert_eq!(upnp_duration_to_secs("1:2:3:4"), None);
    }
}
