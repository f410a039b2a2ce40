//! Bank and record framing
//!
//! Byte layout only; nothing here knows what a bank means.
//!
//! ```text
//! bank:   [tag: u16 LE][len: u32 LE][len bytes]
//! record: [body_len: u32 LE][tag: u16 LE][flags: u8][fragment: 12 bytes if flagged][payload]
//! fragment: [trigger: u64 LE][index: u16 LE][count: u16 LE]
//! ```

use std::io::{self, Read, Write};

use rl_record::{Bank, FragmentInfo, RawRecord};

use crate::adapter::TransportError;

const BANK_HEADER_LEN: usize = 6;
const RECORD_HEADER_LEN: usize = 3;
const FRAGMENT_LEN: usize = 12;
const FLAG_FRAGMENT: u8 = 0x01;

/// Largest record body accepted when reading framed input
pub const MAX_RECORD_LEN: usize = 64 * 1024 * 1024;

/// Split a raw payload into its banks
pub fn decode_banks(payload: &[u8]) -> Result<Vec<Bank>, TransportError> {
    let mut banks = Vec::new();
    let mut offset = 0;

    while offset < payload.len() {
        let remaining = payload.len() - offset;
        if remaining < BANK_HEADER_LEN {
            return Err(TransportError::TrailingBytes {
                offset,
                len: remaining,
            });
        }

        let tag = u16::from_le_bytes([payload[offset], payload[offset + 1]]);
        let declared = u32::from_le_bytes([
            payload[offset + 2],
            payload[offset + 3],
            payload[offset + 4],
            payload[offset + 5],
        ]) as usize;

        let start = offset + BANK_HEADER_LEN;
        let available = payload.len() - start;
        if declared > available {
            return Err(TransportError::TruncatedBank {
                tag,
                offset,
                declared,
                available,
            });
        }

        let end = start + declared;
        banks.push(Bank::new(tag, payload[start..end].to_vec()));
        offset = end;
    }

    Ok(banks)
}

/// Inverse of [`decode_banks`]
pub fn encode_banks(banks: &[Bank]) -> Vec<u8> {
    let size = banks
        .iter()
        .map(|b| BANK_HEADER_LEN + b.data.len())
        .sum();
    let mut out = Vec::with_capacity(size);
    for bank in banks {
        out.extend_from_slice(&bank.tag.to_le_bytes());
        out.extend_from_slice(&(bank.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&bank.data);
    }
    out
}

/// Write one framed raw record
pub fn write_record<W: Write>(writer: &mut W, record: &RawRecord) -> io::Result<()> {
    let fragment_len = if record.fragment.is_some() {
        FRAGMENT_LEN
    } else {
        0
    };
    let body_len = RECORD_HEADER_LEN + fragment_len + record.payload.len();
    if body_len > MAX_RECORD_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("record body of {} bytes exceeds frame limit", body_len),
        ));
    }

    writer.write_all(&(body_len as u32).to_le_bytes())?;
    writer.write_all(&record.tag.to_le_bytes())?;
    match record.fragment {
        Some(fragment) => {
            writer.write_all(&[FLAG_FRAGMENT])?;
            writer.write_all(&fragment.trigger.to_le_bytes())?;
            writer.write_all(&fragment.index.to_le_bytes())?;
            writer.write_all(&fragment.count.to_le_bytes())?;
        }
        None => writer.write_all(&[0])?,
    }
    writer.write_all(&record.payload)
}

/// Read one framed raw record; `Ok(None)` on a clean end of input
pub fn read_record<R: Read>(reader: &mut R) -> Result<Option<RawRecord>, TransportError> {
    let mut len_buf = [0u8; 4];
    if !read_exact_or_eof(reader, &mut len_buf)? {
        return Ok(None);
    }

    let body_len = u32::from_le_bytes(len_buf) as usize;
    if !(RECORD_HEADER_LEN..=MAX_RECORD_LEN).contains(&body_len) {
        return Err(TransportError::BadFrameLength(body_len));
    }

    let mut body = vec![0u8; body_len];
    reader.read_exact(&mut body).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            TransportError::TruncatedFrame { declared: body_len }
        } else {
            TransportError::Io(e)
        }
    })?;

    decode_record_body(&body).map(Some)
}

fn decode_record_body(body: &[u8]) -> Result<RawRecord, TransportError> {
    let tag = u16::from_le_bytes([body[0], body[1]]);
    let flags = body[2];
    if flags & !FLAG_FRAGMENT != 0 {
        return Err(TransportError::UnknownFlags(flags));
    }

    let mut offset = RECORD_HEADER_LEN;
    let fragment = if flags & FLAG_FRAGMENT != 0 {
        let bytes = body
            .get(offset..offset + FRAGMENT_LEN)
            .ok_or(TransportError::TruncatedFrame {
                declared: body.len(),
            })?;
        offset += FRAGMENT_LEN;

        let mut trigger = [0u8; 8];
        trigger.copy_from_slice(&bytes[..8]);
        Some(FragmentInfo::new(
            u64::from_le_bytes(trigger),
            u16::from_le_bytes([bytes[8], bytes[9]]),
            u16::from_le_bytes([bytes[10], bytes[11]]),
        ))
    } else {
        None
    };

    Ok(RawRecord {
        tag,
        fragment,
        payload: body[offset..].to_vec(),
    })
}

fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool, TransportError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(TransportError::TruncatedFrame {
                    declared: buf.len(),
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransportError::Io(e)),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_decode_banks_in_order() {
        let banks = vec![
            Bank::from_words(0xC000, &[42]),
            Bank::new(3, vec![]),
            Bank::from_words(7, &[1, 2, 3]),
        ];
        let decoded = decode_banks(&encode_banks(&banks)).unwrap();
        assert_eq!(decoded, banks);
    }

    #[test]
    fn test_empty_payload_has_no_banks() {
        assert!(decode_banks(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_bank_is_rejected() {
        let mut payload = encode_banks(&[Bank::from_words(7, &[1, 2])]);
        payload.truncate(payload.len() - 1);

        match decode_banks(&payload) {
            Err(TransportError::TruncatedBank {
                tag,
                declared,
                available,
                ..
            }) => {
                assert_eq!(tag, 7);
                assert_eq!(declared, 8);
                assert_eq!(available, 7);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut payload = encode_banks(&[Bank::from_words(7, &[1])]);
        payload.extend_from_slice(&[0xFF, 0xFF]);

        assert!(matches!(
            decode_banks(&payload),
            Err(TransportError::TrailingBytes { offset: 10, len: 2 })
        ));
    }

    #[test]
    fn test_framed_records_stream() {
        let mut buf = Vec::new();
        write_record(&mut buf, &RawRecord::new(17, vec![1, 2, 3])).unwrap();
        write_record(
            &mut buf,
            &RawRecord::new(1, vec![9]).with_fragment(FragmentInfo::new(5, 1, 2)),
        )
        .unwrap();

        let mut cursor = Cursor::new(buf);
        let first = read_record(&mut cursor).unwrap().unwrap();
        assert_eq!(first, RawRecord::new(17, vec![1, 2, 3]));

        let second = read_record(&mut cursor).unwrap().unwrap();
        assert_eq!(second.fragment, Some(FragmentInfo::new(5, 1, 2)));
        assert_eq!(second.payload, vec![9]);

        assert!(read_record(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_truncated_frame_is_reported() {
        let mut buf = Vec::new();
        write_record(&mut buf, &RawRecord::new(1, vec![1, 2, 3, 4])).unwrap();
        buf.truncate(buf.len() - 2);

        assert!(matches!(
            read_record(&mut Cursor::new(buf)),
            Err(TransportError::TruncatedFrame { declared: 7 })
        ));
    }

    #[test]
    fn test_bad_frame_length() {
        let buf = 1u32.to_le_bytes().to_vec();
        assert!(matches!(
            read_record(&mut Cursor::new(buf)),
            Err(TransportError::BadFrameLength(1))
        ));
    }
}
