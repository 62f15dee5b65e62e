//! One logical keyspace.
//!
//! A [Database] maps byte-string keys to tagged [Value]s. It interprets the
//! statement bytes of every command addressed to it and renders responses for
//! a line-oriented client. The manager treats both as opaque.
//!
//! Statements are byte-string tokens separated by single ASCII spaces.
//! Concurrency within one database is the database's own responsibility: the
//! keyspace lives behind its own reader/writer lock, and handles are cheap
//! clones sharing that lock.

use super::Error;
use bytes::{Buf, BufMut, Bytes};
use commonware_codec::{EncodeSize, Error as CodecError, Read, ReadExt, Write};
use commonware_runtime::RwLock;
use std::{
    collections::{btree_map::Entry, BTreeMap, VecDeque},
    sync::Arc,
};

/// Largest value a string write may produce.
const MAX_VALUE_SIZE: u64 = 512 * 1024 * 1024;

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const NOT_INTEGER: &str = "value is not an integer or out of range";
const NOT_BIT: &str = "bit is not an integer or out of range";
const NO_SUCH_KEY: &str = "no such key";
const WRONG_ARGUMENTS: &str = "wrong number of arguments";
const SAME_DATABASE: &str = "source and destination objects are the same";
const NO_SUCH_DATABASE: &str = "no such database";
const OVERFLOW: &str = "increment or decrement would overflow";
const TOO_LARGE: &str = "string exceeds maximum allowed size";

fn ok() -> Vec<u8> {
    b"OK".to_vec()
}

fn nil() -> Vec<u8> {
    b"(nil)".to_vec()
}

fn integer(value: i64) -> Vec<u8> {
    format!("(integer) {value}").into_bytes()
}

fn error(message: &str) -> Vec<u8> {
    format!("(error) {message}").into_bytes()
}

/// Renders a bulk value. Zero-length frames cannot travel the stream, so an
/// empty bulk is shown explicitly.
fn bulk(value: &[u8]) -> Vec<u8> {
    if value.is_empty() {
        return b"\"\"".to_vec();
    }
    value.to_vec()
}

/// Renders a 1-based list of items, one per line.
fn multi<I, T>(items: I) -> Vec<u8>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut lines = Vec::new();
    let mut index = 0usize;
    for item in items {
        index += 1;
        if index > 1 {
            lines.push(b'\n');
        }
        lines.extend_from_slice(format!("{index}) ").as_bytes());
        lines.extend_from_slice(item.as_ref());
    }
    if index == 0 {
        return b"(empty)".to_vec();
    }
    lines
}

fn tokens(statement: &[u8]) -> Vec<&[u8]> {
    statement
        .split(|byte| *byte == b' ')
        .filter(|token| !token.is_empty())
        .collect()
}

fn signed(token: &[u8]) -> Option<i64> {
    std::str::from_utf8(token).ok()?.parse().ok()
}

fn unsigned(token: &[u8]) -> Option<u64> {
    std::str::from_utf8(token).ok()?.parse().ok()
}

fn put_chunk(buf: &mut impl BufMut, chunk: &[u8]) {
    buf.put_u64_le(chunk.len() as u64);
    buf.put_slice(chunk);
}

fn read_u64_le(buf: &mut impl Buf) -> Result<u64, CodecError> {
    if buf.remaining() < 8 {
        return Err(CodecError::EndOfBuffer);
    }
    Ok(buf.get_u64_le())
}

fn read_chunk(buf: &mut impl Buf) -> Result<Bytes, CodecError> {
    let len = read_u64_le(buf)? as usize;
    if buf.remaining() < len {
        return Err(CodecError::EndOfBuffer);
    }
    Ok(buf.copy_to_bytes(len))
}

/// A tagged value held at a key.
///
/// The encoding (also returned verbatim by `DUMP`) is a `u8` tag followed by
/// the payload, every scalar little-endian:
///
/// ```text
/// 0 | Len (u64)   | Bytes                                  string
/// 1 | Count (u64) | FLen (u64) | Field | VLen (u64) | ...  hash
/// 2 | Count (u64) | Len (u64)  | Item  | ...               list
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    String(Bytes),
    Hash(BTreeMap<Bytes, Bytes>),
    List(VecDeque<Bytes>),
}

impl Value {
    /// Returns the name reported by `TYPE`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Hash(_) => "hash",
            Value::List(_) => "list",
        }
    }
}

impl Write for Value {
    fn write(&self, buf: &mut impl BufMut) {
        match self {
            Value::String(bytes) => {
                buf.put_u8(0);
                put_chunk(buf, bytes);
            }
            Value::Hash(fields) => {
                buf.put_u8(1);
                buf.put_u64_le(fields.len() as u64);
                for (field, value) in fields {
                    put_chunk(buf, field);
                    put_chunk(buf, value);
                }
            }
            Value::List(items) => {
                buf.put_u8(2);
                buf.put_u64_le(items.len() as u64);
                for item in items {
                    put_chunk(buf, item);
                }
            }
        }
    }
}

impl EncodeSize for Value {
    fn encode_size(&self) -> usize {
        1 + match self {
            Value::String(bytes) => 8 + bytes.len(),
            Value::Hash(fields) => {
                8 + fields
                    .iter()
                    .map(|(field, value)| 16 + field.len() + value.len())
                    .sum::<usize>()
            }
            Value::List(items) => 8 + items.iter().map(|item| 8 + item.len()).sum::<usize>(),
        }
    }
}

impl Read for Value {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &Self::Cfg) -> Result<Self, CodecError> {
        let tag = u8::read(buf)?;
        match tag {
            0 => Ok(Value::String(read_chunk(buf)?)),
            1 => {
                let count = read_u64_le(buf)?;
                let mut fields = BTreeMap::new();
                for _ in 0..count {
                    let field = read_chunk(buf)?;
                    let value = read_chunk(buf)?;
                    fields.insert(field, value);
                }
                Ok(Value::Hash(fields))
            }
            2 => {
                let count = read_u64_le(buf)?;
                let mut items = VecDeque::new();
                for _ in 0..count {
                    items.push_back(read_chunk(buf)?);
                }
                Ok(Value::List(items))
            }
            _ => Err(CodecError::InvalidEnum(tag)),
        }
    }
}

/// One logical keyspace, addressed by an 8-byte id.
#[derive(Clone)]
pub struct Database {
    id: u64,
    state: Arc<RwLock<BTreeMap<Bytes, Value>>>,
}

impl Database {
    /// Creates an empty database.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Reconstructs a database from a serialized body.
    pub fn restore(id: u64, body: &[u8]) -> Result<Self, Error> {
        let mut buf = body;
        let count = read_u64_le(&mut buf).map_err(|_| Error::Corrupt("database body header"))?;
        let mut state = BTreeMap::new();
        for _ in 0..count {
            let key = read_chunk(&mut buf).map_err(|_| Error::Corrupt("database body key"))?;
            let value =
                Value::read(&mut buf).map_err(|_| Error::Corrupt("database body value"))?;
            state.insert(key, value);
        }
        if buf.has_remaining() {
            return Err(Error::Corrupt("trailing bytes in database body"));
        }
        Ok(Self {
            id,
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// Returns the database id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Appends `u64 id || u64 body_size || body` to `buf`.
    ///
    /// Restoring the emitted body yields an observationally identical
    /// database.
    pub async fn serialize(&self, buf: &mut Vec<u8>) {
        let state = self.state.read().await;
        let mut body = Vec::new();
        body.put_u64_le(state.len() as u64);
        for (key, value) in state.iter() {
            put_chunk(&mut body, key);
            value.write(&mut body);
        }
        drop(state);
        buf.put_u64_le(self.id);
        put_chunk(buf, &body);
    }

    pub async fn set(&self, statement: &[u8]) -> Vec<u8> {
        let [key, value] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let mut state = self.state.write().await;
        state.insert(
            Bytes::copy_from_slice(key),
            Value::String(Bytes::copy_from_slice(value)),
        );
        ok()
    }

    pub async fn get(&self, statement: &[u8]) -> Vec<u8> {
        let [key] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let state = self.state.read().await;
        match state.get(key) {
            Some(Value::String(bytes)) => bulk(bytes),
            Some(_) => error(WRONG_TYPE),
            None => nil(),
        }
    }

    pub async fn set_nx(&self, statement: &[u8]) -> Vec<u8> {
        let [key, value] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let mut state = self.state.write().await;
        if state.contains_key(key) {
            return integer(0);
        }
        state.insert(
            Bytes::copy_from_slice(key),
            Value::String(Bytes::copy_from_slice(value)),
        );
        integer(1)
    }

    pub async fn get_range(&self, statement: &[u8]) -> Vec<u8> {
        let [key, start, end] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let (Some(start), Some(end)) = (signed(start), signed(end)) else {
            return error(NOT_INTEGER);
        };
        let state = self.state.read().await;
        let bytes = match state.get(key) {
            Some(Value::String(bytes)) => bytes,
            Some(_) => return error(WRONG_TYPE),
            None => return bulk(b""),
        };
        let len = bytes.len() as i64;
        let start = if start < 0 { start + len } else { start }.max(0);
        let end = if end < 0 { end + len } else { end }.min(len - 1);
        if len == 0 || start > end {
            return bulk(b"");
        }
        bulk(&bytes[start as usize..=end as usize])
    }

    pub async fn set_range(&self, statement: &[u8]) -> Vec<u8> {
        let [key, offset, value] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let Some(offset) = unsigned(offset) else {
            return error(NOT_INTEGER);
        };
        if offset.saturating_add(value.len() as u64) > MAX_VALUE_SIZE {
            return error(TOO_LARGE);
        }
        let offset = offset as usize;
        let mut state = self.state.write().await;
        let mut bytes = match state.get(key) {
            Some(Value::String(bytes)) => bytes.to_vec(),
            Some(_) => return error(WRONG_TYPE),
            None => Vec::new(),
        };
        if bytes.len() < offset + value.len() {
            bytes.resize(offset + value.len(), 0);
        }
        bytes[offset..offset + value.len()].copy_from_slice(value);
        let len = bytes.len();
        state.insert(Bytes::copy_from_slice(key), Value::String(bytes.into()));
        integer(len as i64)
    }

    pub async fn get_bit(&self, statement: &[u8]) -> Vec<u8> {
        let [key, offset] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let Some(offset) = unsigned(offset) else {
            return error(NOT_INTEGER);
        };
        let state = self.state.read().await;
        let bytes = match state.get(key) {
            Some(Value::String(bytes)) => bytes,
            Some(_) => return error(WRONG_TYPE),
            None => return integer(0),
        };
        let byte = (offset / 8) as usize;
        if byte >= bytes.len() {
            return integer(0);
        }
        let bit = 7 - (offset % 8) as u32;
        integer(((bytes[byte] >> bit) & 1) as i64)
    }

    pub async fn set_bit(&self, statement: &[u8]) -> Vec<u8> {
        let [key, offset, bit] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let Some(offset) = unsigned(offset) else {
            return error(NOT_INTEGER);
        };
        let bit = match bit {
            b"0" => 0u8,
            b"1" => 1u8,
            _ => return error(NOT_BIT),
        };
        if offset / 8 + 1 > MAX_VALUE_SIZE {
            return error(TOO_LARGE);
        }
        let byte = (offset / 8) as usize;
        let shift = 7 - (offset % 8) as u32;
        let mut state = self.state.write().await;
        let mut bytes = match state.get(key) {
            Some(Value::String(bytes)) => bytes.to_vec(),
            Some(_) => return error(WRONG_TYPE),
            None => Vec::new(),
        };
        if bytes.len() < byte + 1 {
            bytes.resize(byte + 1, 0);
        }
        let old = (bytes[byte] >> shift) & 1;
        if bit == 1 {
            bytes[byte] |= 1 << shift;
        } else {
            bytes[byte] &= !(1 << shift);
        }
        state.insert(Bytes::copy_from_slice(key), Value::String(bytes.into()));
        integer(old as i64)
    }

    pub async fn str_len(&self, statement: &[u8]) -> Vec<u8> {
        let [key] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let state = self.state.read().await;
        match state.get(key) {
            Some(Value::String(bytes)) => integer(bytes.len() as i64),
            Some(_) => error(WRONG_TYPE),
            None => integer(0),
        }
    }

    pub async fn m_get(&self, statement: &[u8]) -> Vec<u8> {
        let keys = tokens(statement);
        if keys.is_empty() {
            return error(WRONG_ARGUMENTS);
        }
        let state = self.state.read().await;
        let items: Vec<Vec<u8>> = keys
            .iter()
            .map(|key| match state.get(*key) {
                Some(Value::String(bytes)) => bulk(bytes),
                _ => nil(),
            })
            .collect();
        multi(items)
    }

    pub async fn m_set(&self, statement: &[u8]) -> Vec<u8> {
        let pairs = tokens(statement);
        if pairs.is_empty() || pairs.len() % 2 != 0 {
            return error(WRONG_ARGUMENTS);
        }
        let mut state = self.state.write().await;
        for pair in pairs.chunks(2) {
            state.insert(
                Bytes::copy_from_slice(pair[0]),
                Value::String(Bytes::copy_from_slice(pair[1])),
            );
        }
        ok()
    }

    pub async fn m_set_nx(&self, statement: &[u8]) -> Vec<u8> {
        let pairs = tokens(statement);
        if pairs.is_empty() || pairs.len() % 2 != 0 {
            return error(WRONG_ARGUMENTS);
        }
        let mut state = self.state.write().await;
        if pairs.chunks(2).any(|pair| state.contains_key(pair[0])) {
            return integer(0);
        }
        for pair in pairs.chunks(2) {
            state.insert(
                Bytes::copy_from_slice(pair[0]),
                Value::String(Bytes::copy_from_slice(pair[1])),
            );
        }
        integer(1)
    }

    pub async fn append(&self, statement: &[u8]) -> Vec<u8> {
        let [key, value] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let mut state = self.state.write().await;
        match state.entry(Bytes::copy_from_slice(key)) {
            Entry::Vacant(entry) => {
                let len = value.len();
                entry.insert(Value::String(Bytes::copy_from_slice(value)));
                integer(len as i64)
            }
            Entry::Occupied(mut entry) => match entry.get_mut() {
                Value::String(bytes) => {
                    let mut extended = bytes.to_vec();
                    extended.extend_from_slice(value);
                    let len = extended.len();
                    *bytes = extended.into();
                    integer(len as i64)
                }
                _ => error(WRONG_TYPE),
            },
        }
    }

    pub async fn incr(&self, statement: &[u8]) -> Vec<u8> {
        let [key] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        self.increment(key, 1).await
    }

    pub async fn decr(&self, statement: &[u8]) -> Vec<u8> {
        let [key] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        self.increment(key, -1).await
    }

    pub async fn incr_by(&self, statement: &[u8]) -> Vec<u8> {
        let [key, delta] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let Some(delta) = signed(delta) else {
            return error(NOT_INTEGER);
        };
        self.increment(key, delta).await
    }

    pub async fn decr_by(&self, statement: &[u8]) -> Vec<u8> {
        let [key, delta] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let Some(delta) = signed(delta) else {
            return error(NOT_INTEGER);
        };
        let Some(delta) = delta.checked_neg() else {
            return error(OVERFLOW);
        };
        self.increment(key, delta).await
    }

    async fn increment(&self, key: &[u8], delta: i64) -> Vec<u8> {
        let mut state = self.state.write().await;
        match state.entry(Bytes::copy_from_slice(key)) {
            Entry::Vacant(entry) => {
                entry.insert(Value::String(delta.to_string().into()));
                integer(delta)
            }
            Entry::Occupied(mut entry) => match entry.get_mut() {
                Value::String(bytes) => {
                    let Some(current) = signed(bytes) else {
                        return error(NOT_INTEGER);
                    };
                    let Some(next) = current.checked_add(delta) else {
                        return error(OVERFLOW);
                    };
                    *bytes = next.to_string().into();
                    integer(next)
                }
                _ => error(WRONG_TYPE),
            },
        }
    }

    pub async fn del(&self, statement: &[u8]) -> Vec<u8> {
        let keys = tokens(statement);
        if keys.is_empty() {
            return error(WRONG_ARGUMENTS);
        }
        let mut state = self.state.write().await;
        let removed = keys
            .iter()
            .filter(|key| state.remove(**key).is_some())
            .count();
        integer(removed as i64)
    }

    pub async fn exists(&self, statement: &[u8]) -> Vec<u8> {
        let keys = tokens(statement);
        if keys.is_empty() {
            return error(WRONG_ARGUMENTS);
        }
        let state = self.state.read().await;
        let present = keys.iter().filter(|key| state.contains_key(**key)).count();
        integer(present as i64)
    }

    pub async fn key_type(&self, statement: &[u8]) -> Vec<u8> {
        let [key] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let state = self.state.read().await;
        match state.get(key) {
            Some(value) => value.type_name().as_bytes().to_vec(),
            None => b"none".to_vec(),
        }
    }

    pub async fn rename(&self, statement: &[u8]) -> Vec<u8> {
        let [key, new_key] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let mut state = self.state.write().await;
        let Some(value) = state.remove(key) else {
            return error(NO_SUCH_KEY);
        };
        state.insert(Bytes::copy_from_slice(new_key), value);
        ok()
    }

    pub async fn rename_nx(&self, statement: &[u8]) -> Vec<u8> {
        let [key, new_key] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let mut state = self.state.write().await;
        if state.contains_key(new_key) {
            // Covers renaming a key onto itself
            return if state.contains_key(key) {
                integer(0)
            } else {
                error(NO_SUCH_KEY)
            };
        }
        let Some(value) = state.remove(key) else {
            return error(NO_SUCH_KEY);
        };
        state.insert(Bytes::copy_from_slice(new_key), value);
        integer(1)
    }

    pub async fn dump(&self, statement: &[u8]) -> Vec<u8> {
        let [key] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let state = self.state.read().await;
        match state.get(key) {
            Some(value) => {
                let mut buf = Vec::with_capacity(value.encode_size());
                value.write(&mut buf);
                buf
            }
            None => nil(),
        }
    }

    pub async fn h_set(&self, statement: &[u8]) -> Vec<u8> {
        let pairs = tokens(statement);
        if pairs.len() < 3 || pairs.len() % 2 != 1 {
            return error(WRONG_ARGUMENTS);
        }
        let mut state = self.state.write().await;
        let fields = match state
            .entry(Bytes::copy_from_slice(pairs[0]))
            .or_insert_with(|| Value::Hash(BTreeMap::new()))
        {
            Value::Hash(fields) => fields,
            _ => return error(WRONG_TYPE),
        };
        let mut added = 0;
        for pair in pairs[1..].chunks(2) {
            if fields
                .insert(
                    Bytes::copy_from_slice(pair[0]),
                    Bytes::copy_from_slice(pair[1]),
                )
                .is_none()
            {
                added += 1;
            }
        }
        integer(added)
    }

    pub async fn h_get(&self, statement: &[u8]) -> Vec<u8> {
        let [key, field] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let state = self.state.read().await;
        match state.get(key) {
            Some(Value::Hash(fields)) => match fields.get(field) {
                Some(value) => bulk(value),
                None => nil(),
            },
            Some(_) => error(WRONG_TYPE),
            None => nil(),
        }
    }

    pub async fn h_del(&self, statement: &[u8]) -> Vec<u8> {
        let args = tokens(statement);
        if args.len() < 2 {
            return error(WRONG_ARGUMENTS);
        }
        let mut state = self.state.write().await;
        let fields = match state.get_mut(args[0]) {
            Some(Value::Hash(fields)) => fields,
            Some(_) => return error(WRONG_TYPE),
            None => return integer(0),
        };
        let removed = args[1..]
            .iter()
            .filter(|field| fields.remove(**field).is_some())
            .count();
        if fields.is_empty() {
            state.remove(args[0]);
        }
        integer(removed as i64)
    }

    pub async fn h_exists(&self, statement: &[u8]) -> Vec<u8> {
        let [key, field] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let state = self.state.read().await;
        match state.get(key) {
            Some(Value::Hash(fields)) => integer(fields.contains_key(field) as i64),
            Some(_) => error(WRONG_TYPE),
            None => integer(0),
        }
    }

    pub async fn h_get_all(&self, statement: &[u8]) -> Vec<u8> {
        let [key] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let state = self.state.read().await;
        match state.get(key) {
            Some(Value::Hash(fields)) => multi(
                fields
                    .iter()
                    .flat_map(|(field, value)| [field.to_vec(), value.to_vec()]),
            ),
            Some(_) => error(WRONG_TYPE),
            None => multi(Vec::<Vec<u8>>::new()),
        }
    }

    pub async fn h_keys(&self, statement: &[u8]) -> Vec<u8> {
        let [key] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let state = self.state.read().await;
        match state.get(key) {
            Some(Value::Hash(fields)) => multi(fields.keys()),
            Some(_) => error(WRONG_TYPE),
            None => multi(Vec::<Vec<u8>>::new()),
        }
    }

    pub async fn h_vals(&self, statement: &[u8]) -> Vec<u8> {
        let [key] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let state = self.state.read().await;
        match state.get(key) {
            Some(Value::Hash(fields)) => multi(fields.values()),
            Some(_) => error(WRONG_TYPE),
            None => multi(Vec::<Vec<u8>>::new()),
        }
    }

    pub async fn h_len(&self, statement: &[u8]) -> Vec<u8> {
        let [key] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let state = self.state.read().await;
        match state.get(key) {
            Some(Value::Hash(fields)) => integer(fields.len() as i64),
            Some(_) => error(WRONG_TYPE),
            None => integer(0),
        }
    }

    pub async fn h_incr_by(&self, statement: &[u8]) -> Vec<u8> {
        let [key, field, delta] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let Some(delta) = signed(delta) else {
            return error(NOT_INTEGER);
        };
        let mut state = self.state.write().await;
        let fields = match state
            .entry(Bytes::copy_from_slice(key))
            .or_insert_with(|| Value::Hash(BTreeMap::new()))
        {
            Value::Hash(fields) => fields,
            _ => return error(WRONG_TYPE),
        };
        let current = match fields.get(field) {
            Some(value) => match signed(value) {
                Some(current) => current,
                None => return error(NOT_INTEGER),
            },
            None => 0,
        };
        let Some(next) = current.checked_add(delta) else {
            return error(OVERFLOW);
        };
        fields.insert(Bytes::copy_from_slice(field), next.to_string().into());
        integer(next)
    }

    pub async fn l_push(&self, statement: &[u8]) -> Vec<u8> {
        let args = tokens(statement);
        if args.len() < 2 {
            return error(WRONG_ARGUMENTS);
        }
        let mut state = self.state.write().await;
        let items = match state
            .entry(Bytes::copy_from_slice(args[0]))
            .or_insert_with(|| Value::List(VecDeque::new()))
        {
            Value::List(items) => items,
            _ => return error(WRONG_TYPE),
        };
        for value in &args[1..] {
            items.push_front(Bytes::copy_from_slice(value));
        }
        integer(items.len() as i64)
    }

    pub async fn l_push_x(&self, statement: &[u8]) -> Vec<u8> {
        let args = tokens(statement);
        if args.len() < 2 {
            return error(WRONG_ARGUMENTS);
        }
        let mut state = self.state.write().await;
        let items = match state.get_mut(args[0]) {
            Some(Value::List(items)) => items,
            Some(_) => return error(WRONG_TYPE),
            None => return integer(0),
        };
        for value in &args[1..] {
            items.push_front(Bytes::copy_from_slice(value));
        }
        integer(items.len() as i64)
    }

    pub async fn l_pop(&self, statement: &[u8]) -> Vec<u8> {
        let [key] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let mut state = self.state.write().await;
        let items = match state.get_mut(key) {
            Some(Value::List(items)) => items,
            Some(_) => return error(WRONG_TYPE),
            None => return nil(),
        };
        let popped = items.pop_front();
        if items.is_empty() {
            state.remove(key);
        }
        match popped {
            Some(item) => bulk(&item),
            None => nil(),
        }
    }

    pub async fn l_index(&self, statement: &[u8]) -> Vec<u8> {
        let [key, index] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let Some(index) = signed(index) else {
            return error(NOT_INTEGER);
        };
        let state = self.state.read().await;
        let items = match state.get(key) {
            Some(Value::List(items)) => items,
            Some(_) => return error(WRONG_TYPE),
            None => return nil(),
        };
        let len = items.len() as i64;
        let index = if index < 0 { index + len } else { index };
        if index < 0 || index >= len {
            return nil();
        }
        bulk(&items[index as usize])
    }

    pub async fn l_len(&self, statement: &[u8]) -> Vec<u8> {
        let [key] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let state = self.state.read().await;
        match state.get(key) {
            Some(Value::List(items)) => integer(items.len() as i64),
            Some(_) => error(WRONG_TYPE),
            None => integer(0),
        }
    }

    /// Moves a key into another database of the same bank.
    ///
    /// The caller holds the databases-map read lock for the duration of the
    /// call. Source and destination keyspaces are locked in ascending id
    /// order so concurrent cross-database moves cannot deadlock, and no
    /// reader observes the key in both databases.
    pub async fn move_key(
        &self,
        databases: &BTreeMap<u64, Database>,
        statement: &[u8],
    ) -> Vec<u8> {
        let [key, destination] = tokens(statement)[..] else {
            return error(WRONG_ARGUMENTS);
        };
        let Some(destination) = unsigned(destination) else {
            return error(NOT_INTEGER);
        };
        if destination == self.id {
            return error(SAME_DATABASE);
        }
        let Some(destination) = databases.get(&destination) else {
            return error(NO_SUCH_DATABASE);
        };
        let (mut source, mut target) = if self.id < destination.id {
            let source = self.state.write().await;
            let target = destination.state.write().await;
            (source, target)
        } else {
            let target = destination.state.write().await;
            let source = self.state.write().await;
            (source, target)
        };
        if target.contains_key(key) {
            return integer(0);
        }
        let Some(value) = source.remove(key) else {
            return integer(0);
        };
        target.insert(Bytes::copy_from_slice(key), value);
        integer(1)
    }
}
