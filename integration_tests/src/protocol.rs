//! Host link decoding, independent of the firmware's serialiser.

use crc::{Crc, CRC_16_XMODEM};

/// Protocol version (must match firmware)
pub const PROTOCOL_VERSION: u8 = 1;

const CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Message IDs matching the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Notification = 0x20,
    Rejected = 0xFE,
}

impl TryFrom<u8> for MessageId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x20 => Ok(MessageId::Notification),
            0xFE => Ok(MessageId::Rejected),
            _ => Err(value),
        }
    }
}

/// One field of a forwarded notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub attribute_id: u8,
    /// `None` when the firmware flagged the payload as undecodable
    pub text: Option<String>,
}

/// Decoded link message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkMessage {
    Notification { uid: u32, flags: u8, fields: Vec<Field> },
    Rejected { uid: u32, error_code: u8 },
}

impl LinkMessage {
    pub fn summary(&self) -> String {
        match self {
            LinkMessage::Notification { uid, flags, fields } => {
                let fields: Vec<String> = fields
                    .iter()
                    .map(|f| match &f.text {
                        Some(text) => format!("{}={:?}", f.attribute_id, text),
                        None => format!("{}=<malformed>", f.attribute_id),
                    })
                    .collect();
                format!("notification uid={} flags={:#04x} {}", uid, flags, fields.join(" "))
            }
            LinkMessage::Rejected { uid, error_code } => {
                format!("rejected uid={} error={:#04x}", uid, error_code)
            }
        }
    }
}

/// COBS decode a frame (the trailing zero delimiter is accepted).
pub fn cobs_decode(data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut decoded = vec![0u8; data.len()];
    let len = corncobs::decode_buf(data, &mut decoded)
        .map_err(|e| anyhow::anyhow!("COBS decode error: {:?}", e))?;
    decoded.truncate(len);
    Ok(decoded)
}

/// Parse a COBS-encoded link frame.
/// Format: [version: u8][message_id: u8][length: u16 LE][payload][crc: u16 LE]
pub fn parse_frame(encoded: &[u8]) -> anyhow::Result<LinkMessage> {
    let data = cobs_decode(encoded)?;
    if data.len() < 6 {
        anyhow::bail!("Frame too short: {} bytes", data.len());
    }

    let version = data[0];
    let message_id = data[1];
    let length = u16::from_le_bytes([data[2], data[3]]) as usize;

    if data.len() != 4 + length + 2 {
        anyhow::bail!(
            "Frame length mismatch: expected {}, got {}",
            4 + length + 2,
            data.len()
        );
    }

    let payload = &data[4..4 + length];
    let received_crc = u16::from_le_bytes([data[4 + length], data[4 + length + 1]]);

    let calculated_crc = CRC.checksum(&data[..4 + length]);
    if calculated_crc != received_crc {
        anyhow::bail!(
            "CRC mismatch: expected {:04x}, got {:04x}",
            calculated_crc,
            received_crc
        );
    }

    if version != PROTOCOL_VERSION {
        anyhow::bail!(
            "Protocol version mismatch: expected {}, got {}",
            PROTOCOL_VERSION,
            version
        );
    }

    match MessageId::try_from(message_id).map_err(|v| anyhow::anyhow!("Unknown message ID: {:#04x}", v))? {
        MessageId::Notification => parse_notification(payload),
        MessageId::Rejected => {
            if payload.len() != 5 {
                anyhow::bail!("Rejected payload must be 5 bytes, got {}", payload.len());
            }
            Ok(LinkMessage::Rejected {
                uid: u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
                error_code: payload[4],
            })
        }
    }
}

/// `[uid: u32 LE][flags: u8]([attr_id][kind][len: u16 LE][bytes])*`
fn parse_notification(payload: &[u8]) -> anyhow::Result<LinkMessage> {
    if payload.len() < 5 {
        anyhow::bail!("Notification payload too short: {} bytes", payload.len());
    }

    let uid = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let flags = payload[4];

    let mut fields = Vec::new();
    let mut rest = &payload[5..];
    while !rest.is_empty() {
        if rest.len() < 4 {
            anyhow::bail!("Truncated field header: {} bytes", rest.len());
        }
        let attribute_id = rest[0];
        let kind = rest[1];
        let len = u16::from_le_bytes([rest[2], rest[3]]) as usize;
        rest = &rest[4..];

        if rest.len() < len {
            anyhow::bail!("Field {} truncated: expected {}, got {}", attribute_id, len, rest.len());
        }
        let (bytes, tail) = rest.split_at(len);
        rest = tail;

        let text = match kind {
            0x00 => Some(String::from_utf8(bytes.to_vec())?),
            0x01 => None,
            other => anyhow::bail!("Unknown field kind: {:#04x}", other),
        };
        fields.push(Field { attribute_id, text });
    }

    Ok(LinkMessage::Notification { uid, flags, fields })
}
