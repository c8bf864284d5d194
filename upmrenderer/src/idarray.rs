//! Tableaux d'identifiants OpenHome : entiers 32 bits big-endian
//! concaténés puis encodés en base64.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

pub fn encode_id_array(ids: &[u32]) -> String {
    let bytes: Vec<u8> = ids.iter().flat_map(|id| id.to_be_bytes()).collect();
    STANDARD.encode(bytes)
}

/// `None` si le texte n'est pas du base64 ou pas un multiple de 4 octets.
pub fn decode_id_array(text: &str) -> Option<Vec<u32>> {
    let bytes = STANDARD.decode(text.trim()).ok()?;
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_layout() {
        assert_eq!(encode_id_array(&[]), "");
        // 00 00 00 01 00 00 01 00
        assert_eq!(encode_id_array(&[1, 256]), "AAAAAQAAAQA=");
        assert_eq!(decode_id_array("AAAAAQAAAQA="), Some(vec![1, 256]));
    }

    #[test]
    fn test_bad_length_is_rejected() {
        assert_eq!(decode_id_array("AAAA"), None);
        assert_eq!(decode_id_array("!!"), None);
    }
}
