//! Volume : conversions pourcentage / décibels et sourdine.
//!
//! Les valeurs en dB sont exprimées en 1/256 dB, comme dans
//! `GetVolumeDB`/`SetVolumeDB` de RenderingControl.

/// Valeur renvoyée pour un volume nul (-40 dB)
pub const MIN_VOLUME_DB: i32 = -10240;
pub const MAX_VOLUME_DB: i32 = 0;

/// Pourcentage (0..100) → 1/256 dB
pub fn percent_to_db(volume: i32) -> i32 {
    if volume <= 0 {
        return MIN_VOLUME_DB;
    }
    let ratio = f64::from(volume * volume) / 10000.0;
    (256.0 * 10.0 * ratio.log10()) as i32
}

/// 1/256 dB → pourcentage (0..100)
pub fn db_to_percent(db: i32) -> i32 {
    let db = db.clamp(MIN_VOLUME_DB, MAX_VOLUME_DB);
    let ratio = 10f64.powf(f64::from(db) / 256.0 / 10.0);
    ((ratio * 10000.0).sqrt().floor() as i32).clamp(0, 100)
}

/// Sourdine partagée par RenderingControl et OHVolume.
///
/// Couper mémorise le volume ; rétablir le restaure. Couper deux fois, ou
/// rétablir sans coupure préalable, ne change rien.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuteState {
    premute_volume: Option<i32>,
}

impl MuteState {
    pub fn is_muted(&self) -> bool {
        self.premute_volume.is_some()
    }

    /// Volume à appliquer pour couper, `None` si déjà coupé.
    pub fn mute(&mut self, current_volume: i32) -> Option<i32> {
        if self.premute_volume.is_some() {
            return None;
        }
        self.premute_volume = Some(current_volume);
        Some(0)
    }

    /// Volume à restaurer, `None` sans coupure en cours.
    pub fn unmute(&mut self) -> Option<i32> {
        self.premute_volume.take()
    }

    /// Un réglage explicite du volume annule la sourdine.
    pub fn volume_set(&mut self) {
        self.premute_volume = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_min_db() {
        assert_eq!(percent_to_db(0), -10240);
        assert_eq!(percent_to_db(100), 0);
        assert_eq!(db_to_percent(0), 100);
    }

    #[test]
    fn test_db_round_trip_within_one() {
        for v in 0..=100 {
            let back = db_to_percent(percent_to_db(v));
            assert!((back - v).abs() <= 1, "{} -> {} -> {}", v, percent_to_db(v), back);
        }
    }

    #[test]
    fn test_mute_twice_keeps_first_volume() {
        let mut mute = MuteState::default();
        assert_eq!(mute.mute(40), Some(0));
        assert_eq!(mute.mute(0), None);
        assert!(mute.is_muted());
        assert_eq!(mute.unmute(), Some(40));
        assert_eq!(mute.unmute(), None);
    }
}
