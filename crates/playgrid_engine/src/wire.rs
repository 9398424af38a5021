//! Binary wire codec.
//!
//! One message per transport frame, little-endian throughout.
//!
//! Client action (client -> server):
//!
//! ```text
//! u16 action | u16 key_len | key_len bytes of UTF-8 key
//! ```
//!
//! State record (server -> clients):
//!
//! ```text
//! u16 id_len | id bytes | u16 ip_len | ip bytes | f64 x | f64 y
//! ```
//!
//! Decode errors are non-fatal: the offending message is discarded and the
//! connection keeps reading. Encoding a store-produced record cannot fail.

use thiserror::Error;

/// A malformed or truncated wire message.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("truncated message: needed {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("string field is not valid utf-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("string field of {0} bytes exceeds the u16 length prefix")]
    FieldTooLong(usize),
}

/// One decoded client input message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAction {
    /// Numeric action code. Opaque route key, not validated beyond
    /// well-formedness.
    pub action: u16,
    /// Key identifier, e.g. the pressed key name.
    pub key: String,
}

/// One entity state record as broadcast to clients.
#[derive(Debug, Clone, PartialEq)]
pub struct StateRecord {
    pub id: String,
    pub ip: String,
    pub x: f64,
    pub y: f64,
}

fn read_u16(bytes: &[u8], at: usize) -> Result<u16, WireError> {
    let end = at + 2;
    if bytes.len() < end {
        return Err(WireError::Truncated {
            needed: end,
            got: bytes.len(),
        });
    }
    Ok(u16::from_le_bytes([bytes[at], bytes[at + 1]]))
}

fn read_string(bytes: &[u8], at: usize) -> Result<(String, usize), WireError> {
    let len = read_u16(bytes, at)? as usize;
    let start = at + 2;
    let end = start + len;
    if bytes.len() < end {
        return Err(WireError::Truncated {
            needed: end,
            got: bytes.len(),
        });
    }
    let s = String::from_utf8(bytes[start..end].to_vec())?;
    Ok((s, end))
}

fn write_string(buffer: &mut Vec<u8>, s: &str) -> Result<(), WireError> {
    let len = u16::try_from(s.len()).map_err(|_| WireError::FieldTooLong(s.len()))?;
    buffer.extend_from_slice(&len.to_le_bytes());
    buffer.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Decodes a client action frame.
pub fn decode_action(bytes: &[u8]) -> Result<ClientAction, WireError> {
    let action = read_u16(bytes, 0)?;
    let (key, _) = read_string(bytes, 2)?;
    Ok(ClientAction { action, key })
}

/// Encodes a client action frame. Used by test clients and tooling.
pub fn encode_action(action: &ClientAction) -> Result<Vec<u8>, WireError> {
    let mut buffer = Vec::with_capacity(4 + action.key.len());
    buffer.extend_from_slice(&action.action.to_le_bytes());
    write_string(&mut buffer, &action.key)?;
    Ok(buffer)
}

/// Encodes an entity state record for broadcast.
pub fn encode_state(record: &StateRecord) -> Result<Vec<u8>, WireError> {
    let mut buffer = Vec::with_capacity(4 + record.id.len() + record.ip.len() + 16);
    write_string(&mut buffer, &record.id)?;
    write_string(&mut buffer, &record.ip)?;
    buffer.extend_from_slice(&record.x.to_le_bytes());
    buffer.extend_from_slice(&record.y.to_le_bytes());
    Ok(buffer)
}

/// Decodes an entity state record. Used by clients and tests.
pub fn decode_state(bytes: &[u8]) -> Result<StateRecord, WireError> {
    let (id, at) = read_string(bytes, 0)?;
    let (ip, at) = read_string(bytes, at)?;
    let end = at + 16;
    if bytes.len() < end {
        return Err(WireError::Truncated {
            needed: end,
            got: bytes.len(),
        });
    }
    let x = f64::from_le_bytes(bytes[at..at + 8].try_into().unwrap());
    let y = f64::from_le_bytes(bytes[at + 8..end].try_into().unwrap());
    Ok(StateRecord { id, ip, x, y })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_client_action_frame() {
        // action = 1, key = "D"
        let bytes = [0x01, 0x00, 0x01, 0x00, b'D'];
        let decoded = decode_action(&bytes).unwrap();
        assert_eq!(decoded.action, 1);
        assert_eq!(decoded.key, "D");
    }

    #[test]
    fn encode_action_produces_the_expected_bytes() {
        let frame = encode_action(&ClientAction {
            action: 1,
            key: "W".to_string(),
        })
        .unwrap();
        assert_eq!(frame, vec![0x01, 0x00, 0x01, 0x00, b'W']);
    }

    #[test]
    fn truncated_action_is_a_decode_error() {
        let frame = encode_action(&ClientAction {
            action: 1,
            key: "left".to_string(),
        })
        .unwrap();
        for cut in 0..frame.len() {
            assert!(
                matches!(decode_action(&frame[..cut]), Err(WireError::Truncated { .. })),
                "cut at {cut} should be truncated"
            );
        }
    }

    #[test]
    fn invalid_utf8_key_is_a_decode_error() {
        let bytes = [0x01, 0x00, 0x02, 0x00, 0xFF, 0xFE];
        assert!(matches!(
            decode_action(&bytes),
            Err(WireError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn state_record_round_trips() {
        let record = StateRecord {
            id: "player_1".to_string(),
            ip: "203.0.113.9:4000".to_string(),
            x: 10.0,
            y: -2.5,
        };
        let bytes = encode_state(&record).unwrap();
        assert_eq!(decode_state(&bytes).unwrap(), record);
    }

    #[test]
    fn state_record_layout_is_stable() {
        let bytes = encode_state(&StateRecord {
            id: "p".to_string(),
            ip: String::new(),
            x: 1.0,
            y: 0.0,
        })
        .unwrap();
        let mut expected = vec![0x01, 0x00, b'p', 0x00, 0x00];
        expected.extend_from_slice(&1.0f64.to_le_bytes());
        expected.extend_from_slice(&0.0f64.to_le_bytes());
        assert_eq!(bytes, expected);
    }
}
