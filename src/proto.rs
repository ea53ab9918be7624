//! Wire message encoding/decoding.
//!
//! One datagram carries exactly one message. All multi-byte integers
//! are big-endian; strings are raw bytes without terminators. Decoding
//! is exact: a payload that is not precisely the declared layout is a
//! [`DecodeError`], and the dispatcher drops such datagrams without a
//! reply. The codec itself is pure and never renders a protocol
//! verdict; `BAD_REQUEST` is decided upstream.

use thiserror::Error;

use crate::ticket::TICKET_CODE_LEN;

/// Largest payload a single IPv4 UDP datagram can carry.
pub const MAX_DATAGRAM: usize = 65_507;

/// Width of a reservation cookie on the wire.
pub const COOKIE_LEN: usize = 48;

const TYPE_GET_EVENTS: u8 = 1;
const TYPE_EVENTS: u8 = 2;
const TYPE_GET_RESERVATION: u8 = 3;
const TYPE_RESERVATION: u8 = 4;
const TYPE_GET_TICKETS: u8 = 5;
const TYPE_TICKETS: u8 = 6;
const TYPE_BAD_REQUEST: u8 = 255;

const GET_RESERVATION_LEN: usize = 7;
const RESERVATION_LEN: usize = 67;
const GET_TICKETS_LEN: usize = 53;
const BAD_REQUEST_LEN: usize = 5;

/// One catalog entry inside an `EVENTS` reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventEntry {
    pub event_id: u32,
    pub ticket_count: u16,
    /// Raw description bytes, at most 255 on the wire.
    pub description: Vec<u8>,
}

impl EventEntry {
    /// Encoded size of this entry: id + count + length byte + bytes.
    pub fn wire_len(&self) -> usize {
        7 + self.description.len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    GetEvents,
    Events(Vec<EventEntry>),
    GetReservation {
        event_id: u32,
        ticket_count: u16,
    },
    Reservation {
        reservation_id: u32,
        event_id: u32,
        ticket_count: u16,
        cookie: [u8; COOKIE_LEN],
        expires_at: u64,
    },
    GetTickets {
        reservation_id: u32,
        cookie: [u8; COOKIE_LEN],
    },
    Tickets {
        reservation_id: u32,
        codes: Vec<[u8; TICKET_CODE_LEN]>,
    },
    BadRequest {
        id: u32,
    },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty datagram")]
    Empty,
    #[error("unknown message type {0:#04x}")]
    UnknownType(u8),
    #[error("wrong length {got} for message type {kind:#04x}")]
    WrongLength { kind: u8, got: usize },
}

pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    let (&kind, payload) = bytes.split_first().ok_or(DecodeError::Empty)?;
    let wrong_length = DecodeError::WrongLength {
        kind,
        got: bytes.len(),
    };

    match kind {
        TYPE_GET_EVENTS => {
            if !payload.is_empty() {
                return Err(wrong_length);
            }
            Ok(Message::GetEvents)
        }
        TYPE_EVENTS => {
            let mut offset = 0usize;
            let mut entries = Vec::new();
            while offset < payload.len() {
                let event_id = read_u32_be(payload, &mut offset).ok_or(wrong_length.clone())?;
                let ticket_count =
                    read_u16_be(payload, &mut offset).ok_or(wrong_length.clone())?;
                let len = read_u8(payload, &mut offset).ok_or(wrong_length.clone())? as usize;
                let description = take(payload, &mut offset, len)
                    .ok_or(wrong_length.clone())?
                    .to_vec();
                entries.push(EventEntry {
                    event_id,
                    ticket_count,
                    description,
                });
            }
            Ok(Message::Events(entries))
        }
        TYPE_GET_RESERVATION => {
            if bytes.len() != GET_RESERVATION_LEN {
                return Err(wrong_length);
            }
            let mut offset = 0usize;
            let event_id = read_u32_be(payload, &mut offset).ok_or(wrong_length.clone())?;
            let ticket_count = read_u16_be(payload, &mut offset).ok_or(wrong_length)?;
            Ok(Message::GetReservation {
                event_id,
                ticket_count,
            })
        }
        TYPE_RESERVATION => {
            if bytes.len() != RESERVATION_LEN {
                return Err(wrong_length);
            }
            let mut offset = 0usize;
            let reservation_id = read_u32_be(payload, &mut offset).ok_or(wrong_length.clone())?;
            let event_id = read_u32_be(payload, &mut offset).ok_or(wrong_length.clone())?;
            let ticket_count = read_u16_be(payload, &mut offset).ok_or(wrong_length.clone())?;
            let cookie =
                read_array::<COOKIE_LEN>(payload, &mut offset).ok_or(wrong_length.clone())?;
            let expires_at = read_u64_be(payload, &mut offset).ok_or(wrong_length)?;
            Ok(Message::Reservation {
                reservation_id,
                event_id,
                ticket_count,
                cookie,
                expires_at,
            })
        }
        TYPE_GET_TICKETS => {
            if bytes.len() != GET_TICKETS_LEN {
                return Err(wrong_length);
            }
            let mut offset = 0usize;
            let reservation_id = read_u32_be(payload, &mut offset).ok_or(wrong_length.clone())?;
            let cookie = read_array::<COOKIE_LEN>(payload, &mut offset).ok_or(wrong_length)?;
            Ok(Message::GetTickets {
                reservation_id,
                cookie,
            })
        }
        TYPE_TICKETS => {
            let mut offset = 0usize;
            let reservation_id = read_u32_be(payload, &mut offset).ok_or(wrong_length.clone())?;
            let ticket_count = read_u16_be(payload, &mut offset).ok_or(wrong_length.clone())?;
            if payload.len() - offset != ticket_count as usize * TICKET_CODE_LEN {
                return Err(wrong_length);
            }
            let mut codes = Vec::with_capacity(ticket_count as usize);
            for _ in 0..ticket_count {
                let code =
                    read_array::<TICKET_CODE_LEN>(payload, &mut offset).ok_or(wrong_length.clone())?;
                codes.push(code);
            }
            Ok(Message::Tickets {
                reservation_id,
                codes,
            })
        }
        TYPE_BAD_REQUEST => {
            if bytes.len() != BAD_REQUEST_LEN {
                return Err(wrong_length);
            }
            let mut offset = 0usize;
            let id = read_u32_be(payload, &mut offset).ok_or(wrong_length)?;
            Ok(Message::BadRequest { id })
        }
        other => Err(DecodeError::UnknownType(other)),
    }
}

pub fn encode(message: &Message) -> Vec<u8> {
    match message {
        Message::GetEvents => vec![TYPE_GET_EVENTS],
        Message::Events(entries) => {
            let body: usize = entries.iter().map(EventEntry::wire_len).sum();
            let mut buf = Vec::with_capacity(1 + body);
            buf.push(TYPE_EVENTS);
            for entry in entries {
                debug_assert!(entry.description.len() <= u8::MAX as usize);
                buf.extend_from_slice(&entry.event_id.to_be_bytes());
                buf.extend_from_slice(&entry.ticket_count.to_be_bytes());
                buf.push(entry.description.len() as u8);
                buf.extend_from_slice(&entry.description);
            }
            buf
        }
        Message::GetReservation {
            event_id,
            ticket_count,
        } => {
            let mut buf = Vec::with_capacity(GET_RESERVATION_LEN);
            buf.push(TYPE_GET_RESERVATION);
            buf.extend_from_slice(&event_id.to_be_bytes());
            buf.extend_from_slice(&ticket_count.to_be_bytes());
            buf
        }
        Message::Reservation {
            reservation_id,
            event_id,
            ticket_count,
            cookie,
            expires_at,
        } => {
            let mut buf = Vec::with_capacity(RESERVATION_LEN);
            buf.push(TYPE_RESERVATION);
            buf.extend_from_slice(&reservation_id.to_be_bytes());
            buf.extend_from_slice(&event_id.to_be_bytes());
            buf.extend_from_slice(&ticket_count.to_be_bytes());
            buf.extend_from_slice(cookie);
            buf.extend_from_slice(&expires_at.to_be_bytes());
            buf
        }
        Message::GetTickets {
            reservation_id,
            cookie,
        } => {
            let mut buf = Vec::with_capacity(GET_TICKETS_LEN);
            buf.push(TYPE_GET_TICKETS);
            buf.extend_from_slice(&reservation_id.to_be_bytes());
            buf.extend_from_slice(cookie);
            buf
        }
        Message::Tickets {
            reservation_id,
            codes,
        } => {
            debug_assert!(codes.len() <= u16::MAX as usize);
            let mut buf = Vec::with_capacity(7 + codes.len() * TICKET_CODE_LEN);
            buf.push(TYPE_TICKETS);
            buf.extend_from_slice(&reservation_id.to_be_bytes());
            buf.extend_from_slice(&(codes.len() as u16).to_be_bytes());
            for code in codes {
                buf.extend_from_slice(code);
            }
            buf
        }
        Message::BadRequest { id } => {
            let mut buf = Vec::with_capacity(BAD_REQUEST_LEN);
            buf.push(TYPE_BAD_REQUEST);
            buf.extend_from_slice(&id.to_be_bytes());
            buf
        }
    }
}

fn read_u8(bytes: &[u8], offset: &mut usize) -> Option<u8> {
    let slice = take(bytes, offset, 1)?;
    Some(slice[0])
}

fn read_u16_be(bytes: &[u8], offset: &mut usize) -> Option<u16> {
    let slice = take(bytes, offset, 2)?;
    Some(u16::from_be_bytes([slice[0], slice[1]]))
}

fn read_u32_be(bytes: &[u8], offset: &mut usize) -> Option<u32> {
    let slice = take(bytes, offset, 4)?;
    Some(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

fn read_u64_be(bytes: &[u8], offset: &mut usize) -> Option<u64> {
    let slice = take(bytes, offset, 8)?;
    Some(u64::from_be_bytes([
        slice[0], slice[1], slice[2], slice[3], slice[4], slice[5], slice[6], slice[7],
    ]))
}

fn read_array<const N: usize>(bytes: &[u8], offset: &mut usize) -> Option<[u8; N]> {
    let slice = take(bytes, offset, N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    Some(out)
}

fn take<'a>(bytes: &'a [u8], offset: &mut usize, len: usize) -> Option<&'a [u8]> {
    let end = offset.checked_add(len)?;
    if end > bytes.len() {
        return None;
    }
    let slice = &bytes[*offset..end];
    *offset = end;
    Some(slice)
}
