//! VICI wire format.
//!
//! ```text
//! packet  = length:u32be type:u8 [name_len:u8 name] [message]
//! message = element*
//! element = SECTION_START name_len:u8 name
//!         | SECTION_END
//!         | KEY_VALUE name_len:u8 name value_len:u16be value
//!         | LIST_START name_len:u8 name
//!         | LIST_ITEM value_len:u16be value
//!         | LIST_END
//! ```

use thiserror::Error;

/// Packets larger than this are rejected in both directions.
pub const MAX_PACKET_LEN: usize = 512 * 1024;

const SECTION_START: u8 = 1;
const SECTION_END: u8 = 2;
const KEY_VALUE: u8 = 3;
const LIST_START: u8 = 4;
const LIST_ITEM: u8 = 5;
const LIST_END: u8 = 6;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of data")]
    UnexpectedEnd,

    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),

    #[error("unexpected element type {0}")]
    UnexpectedElement(u8),

    #[error("section end without matching start")]
    UnbalancedSection,

    #[error("name of {0} bytes exceeds 255")]
    NameTooLong(usize),

    #[error("value of {0} bytes exceeds 65535")]
    ValueTooLong(usize),

    #[error("packet of {0} bytes exceeds the {MAX_PACKET_LEN} byte limit")]
    TooLarge(usize),

    #[error("name is not valid UTF-8")]
    InvalidName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    CmdRequest = 0,
    CmdResponse = 1,
    CmdUnknown = 2,
    EventRegister = 3,
    EventUnregister = 4,
    EventConfirm = 5,
    EventUnknown = 6,
    Event = 7,
}

impl PacketType {
    fn from_u8(value: u8) -> Result<Self, CodecError> {
        Ok(match value {
            0 => Self::CmdRequest,
            1 => Self::CmdResponse,
            2 => Self::CmdUnknown,
            3 => Self::EventRegister,
            4 => Self::EventUnregister,
            5 => Self::EventConfirm,
            6 => Self::EventUnknown,
            7 => Self::Event,
            other => return Err(CodecError::UnknownPacketType(other)),
        })
    }

    fn is_named(self) -> bool {
        matches!(
            self,
            Self::CmdRequest | Self::EventRegister | Self::EventUnregister | Self::Event
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Value(Vec<u8>),
    List(Vec<Vec<u8>>),
    Section(Message),
}

/// An ordered VICI message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    entries: Vec<(String, Element)>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl AsRef<[u8]>) -> Self {
        self.entries
            .push((key.into(), Element::Value(value.as_ref().to_vec())));
        self
    }

    pub fn with_list<I, V>(mut self, key: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: AsRef<[u8]>,
    {
        let items = items.into_iter().map(|v| v.as_ref().to_vec()).collect();
        self.entries.push((key.into(), Element::List(items)));
        self
    }

    pub fn with_section(mut self, key: impl Into<String>, section: Message) -> Self {
        self.entries.push((key.into(), Element::Section(section)));
        self
    }

    pub fn get(&self, key: &str) -> Option<&Element> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, e)| e)
    }

    /// A key's value as text.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Element::Value(v) => Some(String::from_utf8_lossy(v).into_owned()),
            _ => None,
        }
    }

    pub fn section(&self, key: &str) -> Option<&Message> {
        match self.get(key)? {
            Element::Section(s) => Some(s),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Element)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        for (key, element) in &self.entries {
            match element {
                Element::Value(value) => {
                    out.push(KEY_VALUE);
                    put_name(out, key)?;
                    put_value(out, value)?;
                }
                Element::List(items) => {
                    out.push(LIST_START);
                    put_name(out, key)?;
                    for item in items {
                        out.push(LIST_ITEM);
                        put_value(out, item)?;
                    }
                    out.push(LIST_END);
                }
                Element::Section(section) => {
                    out.push(SECTION_START);
                    put_name(out, key)?;
                    section.encode(out)?;
                    out.push(SECTION_END);
                }
            }
        }
        Ok(())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader { buf: bytes, pos: 0 };
        decode_section(&mut reader, false)
    }
}

fn put_name(out: &mut Vec<u8>, name: &str) -> Result<(), CodecError> {
    let len = u8::try_from(name.len()).map_err(|_| CodecError::NameTooLong(name.len()))?;
    out.push(len);
    out.extend_from_slice(name.as_bytes());
    Ok(())
}

fn put_value(out: &mut Vec<u8>, value: &[u8]) -> Result<(), CodecError> {
    let len = u16::try_from(value.len()).map_err(|_| CodecError::ValueTooLong(value.len()))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(value);
    Ok(())
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(n).ok_or(CodecError::UnexpectedEnd)?;
        let bytes = self.buf.get(self.pos..end).ok_or(CodecError::UnexpectedEnd)?;
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn name(&mut self) -> Result<String, CodecError> {
        let len = self.u8()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidName)
    }

    fn value(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.take(2)?;
        let len = u16::from_be_bytes([len[0], len[1]]) as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos.min(self.buf.len())..];
        self.pos = self.buf.len();
        rest
    }
}

fn decode_section(reader: &mut Reader<'_>, nested: bool) -> Result<Message, CodecError> {
    let mut message = Message::new();
    loop {
        if reader.is_empty() {
            return if nested {
                Err(CodecError::UnexpectedEnd)
            } else {
                Ok(message)
            };
        }

        match reader.u8()? {
            SECTION_START => {
                let name = reader.name()?;
                let section = decode_section(reader, true)?;
                message.entries.push((name, Element::Section(section)));
            }
            SECTION_END if nested => return Ok(message),
            SECTION_END => return Err(CodecError::UnbalancedSection),
            KEY_VALUE => {
                let name = reader.name()?;
                let value = reader.value()?;
                message.entries.push((name, Element::Value(value)));
            }
            LIST_START => {
                let name = reader.name()?;
                let mut items = Vec::new();
                loop {
                    match reader.u8()? {
                        LIST_ITEM => items.push(reader.value()?),
                        LIST_END => break,
                        other => return Err(CodecError::UnexpectedElement(other)),
                    }
                }
                message.entries.push((name, Element::List(items)));
            }
            other => return Err(CodecError::UnexpectedElement(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketType,
    pub name: Option<String>,
    pub message: Message,
}

impl Packet {
    pub fn request(command: &str, message: Message) -> Self {
        Self::named(PacketType::CmdRequest, command, message)
    }

    pub fn named(kind: PacketType, name: &str, message: Message) -> Self {
        Self {
            kind,
            name: Some(name.to_string()),
            message,
        }
    }

    pub fn unnamed(kind: PacketType, message: Message) -> Self {
        Self {
            kind,
            name: None,
            message,
        }
    }

    /// Encode with the length prefix.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut body = vec![self.kind as u8];
        if self.kind.is_named() {
            put_name(&mut body, self.name.as_deref().unwrap_or_default())?;
        }
        self.message.encode(&mut body)?;

        if body.len() > MAX_PACKET_LEN {
            return Err(CodecError::TooLarge(body.len()));
        }
        let mut out = Vec::with_capacity(body.len() + 4);
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decode a packet body (the bytes after the length prefix).
    pub fn decode(body: &[u8]) -> Result<Self, CodecError> {
        if body.len() > MAX_PACKET_LEN {
            return Err(CodecError::TooLarge(body.len()));
        }
        let mut reader = Reader { buf: body, pos: 0 };
        let kind = PacketType::from_u8(reader.u8()?)?;
        let name = if kind.is_named() {
            Some(reader.name()?)
        } else {
            None
        };
        let message = Message::decode(reader.rest())?;
        Ok(Self { kind, name, message })
    }
}
