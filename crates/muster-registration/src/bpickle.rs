//! bpickle: the compact serialization used by the management protocol.
//!
//! Grammar (one tag byte per value):
//!
//! ```text
//! n                 none
//! b0 | b1           bool
//! i<digits>;        integer
//! f<repr>;          float
//! s<len>:<bytes>    byte string
//! u<len>:<utf-8>    unicode string (len counts encoded bytes)
//! l<values>;        list
//! t<values>;        tuple
//! d<key><value>…;   dictionary, keys sorted on encode
//! ```
//!
//! Cloud user-data is delivered in this format, so decoding must treat any
//! input as hostile: truncation, unknown tags, bad lengths and trailing bytes
//! are all errors rather than panics.

use std::fmt;

/// Maximum nesting depth accepted by [`loads`].
pub const MAX_DEPTH: usize = 64;

/// A decoded bpickle value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Unicode(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Dict(Vec<(Value, Value)>),
}

impl Value {
    /// Build a dictionary with unicode keys.
    pub fn dict<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::Dict(
            entries
                .into_iter()
                .map(|(k, v)| (Self::Unicode(k.into()), v))
                .collect(),
        )
    }

    /// Build a list of unicode strings.
    pub fn str_list<S: Into<String>>(items: impl IntoIterator<Item = S>) -> Self {
        Self::List(items.into_iter().map(|s| Self::Unicode(s.into())).collect())
    }

    /// Text content of a unicode string, or of a byte string holding UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Unicode(s) => Some(s),
            Self::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Items of a list or tuple.
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) | Self::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a string key in a dictionary.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Dict(entries) => entries
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn is_dict(&self) -> bool {
        matches!(self, Self::Dict(_))
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bytes(_) => "bytes",
            Self::Unicode(_) => "unicode",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Unicode(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Unicode(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BpickleError {
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEnd { offset: usize },

    #[error("unknown type tag {tag:?} at offset {offset}")]
    UnknownTag { tag: char, offset: usize },

    #[error("invalid number at offset {offset}")]
    InvalidNumber { offset: usize },

    #[error("invalid utf-8 in unicode string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("trailing data at offset {offset}")]
    TrailingData { offset: usize },

    #[error("nesting deeper than {max} levels")]
    TooDeep { max: usize },
}

/// Decode a complete bpickle document.
pub fn loads(input: &[u8]) -> Result<Value, BpickleError> {
    let mut decoder = Decoder { input, pos: 0 };
    let value = decoder.value(0)?;
    if decoder.pos != input.len() {
        return Err(BpickleError::TrailingData {
            offset: decoder.pos,
        });
    }
    Ok(value)
}

/// Encode a value.
pub fn dumps(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode(value, &mut out);
    out
}

struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Decoder<'_> {
    fn next_byte(&mut self) -> Result<u8, BpickleError> {
        let byte = *self
            .input
            .get(self.pos)
            .ok_or(BpickleError::UnexpectedEnd { offset: self.pos })?;
        self.pos += 1;
        Ok(byte)
    }

    fn peek(&self) -> Result<u8, BpickleError> {
        self.input
            .get(self.pos)
            .copied()
            .ok_or(BpickleError::UnexpectedEnd { offset: self.pos })
    }

    /// Consume bytes up to (not including) `delim`, then skip the delimiter.
    fn until(&mut self, delim: u8) -> Result<&[u8], BpickleError> {
        let start = self.pos;
        let rest = &self.input[start..];
        let len = rest
            .iter()
            .position(|&b| b == delim)
            .ok_or(BpickleError::UnexpectedEnd {
                offset: self.input.len(),
            })?;
        self.pos = start + len + 1;
        Ok(&self.input[start..start + len])
    }

    fn number<T: std::str::FromStr>(&mut self, delim: u8) -> Result<T, BpickleError> {
        let offset = self.pos;
        let raw = self.until(delim)?;
        std::str::from_utf8(raw)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(BpickleError::InvalidNumber { offset })
    }

    fn sized(&mut self) -> Result<&[u8], BpickleError> {
        let len: usize = self.number(b':')?;
        let start = self.pos;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.input.len())
            .ok_or(BpickleError::UnexpectedEnd {
                offset: self.input.len(),
            })?;
        self.pos = end;
        Ok(&self.input[start..end])
    }

    fn value(&mut self, depth: usize) -> Result<Value, BpickleError> {
        if depth > MAX_DEPTH {
            return Err(BpickleError::TooDeep { max: MAX_DEPTH });
        }
        let offset = self.pos;
        match self.next_byte()? {
            b'n' => Ok(Value::None),
            b'b' => match self.next_byte()? {
                b'0' => Ok(Value::Bool(false)),
                b'1' => Ok(Value::Bool(true)),
                _ => Err(BpickleError::InvalidNumber { offset }),
            },
            b'i' => self.number(b';').map(Value::Int),
            b'f' => self.number(b';').map(Value::Float),
            b's' => self.sized().map(|b| Value::Bytes(b.to_vec())),
            b'u' => {
                let data_offset = self.pos;
                let raw = self.sized()?;
                String::from_utf8(raw.to_vec())
                    .map(Value::Unicode)
                    .map_err(|_| BpickleError::InvalidUtf8 {
                        offset: data_offset,
                    })
            }
            b'l' => self.sequence(depth).map(Value::List),
            b't' => self.sequence(depth).map(Value::Tuple),
            b'd' => {
                let mut entries = Vec::new();
                while self.peek()? != b';' {
                    let key = self.value(depth + 1)?;
                    let value = self.value(depth + 1)?;
                    entries.push((key, value));
                }
                self.pos += 1;
                Ok(Value::Dict(entries))
            }
            tag => Err(BpickleError::UnknownTag {
                tag: tag as char,
                offset,
            }),
        }
    }

    fn sequence(&mut self, depth: usize) -> Result<Vec<Value>, BpickleError> {
        let mut items = Vec::new();
        while self.peek()? != b';' {
            items.push(self.value(depth + 1)?);
        }
        self.pos += 1;
        Ok(items)
    }
}

fn encode(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::None => out.push(b'n'),
        Value::Bool(b) => out.extend_from_slice(if *b { b"b1" } else { b"b0" }),
        Value::Int(i) => out.extend_from_slice(format!("i{};", i).as_bytes()),
        Value::Float(x) => out.extend_from_slice(format!("f{:?};", x).as_bytes()),
        Value::Bytes(b) => {
            out.extend_from_slice(format!("s{}:", b.len()).as_bytes());
            out.extend_from_slice(b);
        }
        Value::Unicode(s) => {
            out.extend_from_slice(format!("u{}:", s.len()).as_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        Value::List(items) | Value::Tuple(items) => {
            out.push(if matches!(value, Value::List(_)) { b'l' } else { b't' });
            for item in items {
                encode(item, out);
            }
            out.push(b';');
        }
        Value::Dict(entries) => {
            let mut sorted: Vec<&(Value, Value)> = entries.iter().collect();
            sorted.sort_by_key(|(k, _)| sort_key(k));
            out.push(b'd');
            for (k, v) in sorted {
                encode(k, out);
                encode(v, out);
            }
            out.push(b';');
        }
    }
}

fn sort_key(key: &Value) -> Vec<u8> {
    match key {
        Value::Unicode(s) => s.as_bytes().to_vec(),
        Value::Bytes(b) => b.clone(),
        other => dumps(other),
    }
}
