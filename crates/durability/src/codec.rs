//! Counts snapshot wire codec
//!
//! Format (all integers big-endian):
//! - Transaction id (i64)
//! - Entry count (i32)
//! - For each entry, in key order:
//!   - Type tag (u8)
//!   - Key fields (i32 each; 1 for node, 3 for relationship, 2 for index keys)
//!   - Delta values (i64 each; 1 for node and relationship, 2 for index keys)
//!
//! `Empty` keys never appear on the wire: encoding one fails with
//! [`Error::EmptyKey`], and so does decoding its tag.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use smallvec::SmallVec;
use tally_core::{CountsSnapshot, Delta, Error, Result, StatKey, StatKeyType};

/// Serialize `snapshot` into `writer`
pub fn encode<W: Write>(snapshot: &CountsSnapshot, writer: &mut W) -> Result<()> {
    let count = i32::try_from(snapshot.len()).map_err(|_| {
        Error::InvalidOperation(format!(
            "snapshot has {} entries, more than the format can carry",
            snapshot.len()
        ))
    })?;
    let txn_id = i64::try_from(snapshot.txn_id()).map_err(|_| {
        Error::InvalidOperation(format!(
            "transaction id {} does not fit the format's signed 64-bit field",
            snapshot.txn_id()
        ))
    })?;

    writer.write_i64::<BigEndian>(txn_id)?;
    writer.write_i32::<BigEndian>(count)?;

    for (key, delta) in snapshot {
        key.check_delta(delta)?;
        writer.write_u8(key.key_type().tag())?;
        for field in key.fields() {
            writer.write_i32::<BigEndian>(field)?;
        }
        for &value in delta.as_slice() {
            writer.write_i64::<BigEndian>(value)?;
        }
    }

    Ok(())
}

/// Deserialize a snapshot from `reader`
///
/// Reads exactly one snapshot; bytes after it are left in the reader.
pub fn decode<R: Read>(reader: &mut R) -> Result<CountsSnapshot> {
    let txn_id = read_or_corrupt(reader.read_i64::<BigEndian>(), "transaction id")?;
    if txn_id < 0 {
        return Err(Error::Corruption(format!(
            "negative transaction id {}",
            txn_id
        )));
    }

    let count = read_or_corrupt(reader.read_i32::<BigEndian>(), "entry count")?;
    if count < 0 {
        return Err(Error::Corruption(format!("negative entry count {}", count)));
    }

    let mut entries = BTreeMap::new();
    for index in 0..count {
        let (key, delta) = decode_entry(reader, index)?;
        if entries.insert(key, delta).is_some() {
            return Err(Error::Corruption(format!("duplicate key {}", key)));
        }
    }

    Ok(CountsSnapshot::new(txn_id as u64, entries))
}

/// Serialize into a fresh buffer
pub fn encode_to_vec(snapshot: &CountsSnapshot) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(encoded_len(snapshot));
    encode(snapshot, &mut buf)?;
    Ok(buf)
}

/// Deserialize a buffer holding exactly one snapshot
pub fn decode_from_slice(bytes: &[u8]) -> Result<CountsSnapshot> {
    let mut cursor = io::Cursor::new(bytes);
    let snapshot = decode(&mut cursor)?;
    let consumed = cursor.position() as usize;
    if consumed != bytes.len() {
        return Err(Error::Corruption(format!(
            "{} trailing bytes after snapshot",
            bytes.len() - consumed
        )));
    }
    Ok(snapshot)
}

/// Exact size of `snapshot` on the wire
pub fn encoded_len(snapshot: &CountsSnapshot) -> usize {
    let header = 8 + 4;
    snapshot.iter().fold(header, |len, (key, delta)| {
        len + 1 + 4 * key.key_type().field_count() + 8 * delta.len()
    })
}

fn decode_entry<R: Read>(reader: &mut R, index: i32) -> Result<(StatKey, Delta)> {
    let tag = read_or_corrupt(reader.read_u8(), "type tag")?;
    let key_type = StatKeyType::from_tag(tag).ok_or(Error::UnknownTypeTag(tag))?;
    if key_type == StatKeyType::Empty {
        return Err(Error::EmptyKey);
    }

    let mut fields: SmallVec<[i32; 3]> = SmallVec::new();
    for _ in 0..key_type.field_count() {
        fields.push(read_or_corrupt(reader.read_i32::<BigEndian>(), "key field")?);
    }
    let key = StatKey::from_fields(key_type, &fields)?;

    let mut values: SmallVec<[i64; 2]> = SmallVec::new();
    for _ in 0..key_type.arity() {
        values.push(read_or_corrupt(
            reader.read_i64::<BigEndian>(),
            "delta value",
        )?);
    }

    let delta = Delta::new(values);
    key.check_delta(&delta).map_err(|e| {
        Error::Corruption(format!("entry {} ({}) is malformed: {}", index, key, e))
    })?;
    Ok((key, delta))
}

/// A short stream is corruption; any other I/O failure stays I/O
fn read_or_corrupt<T>(result: io::Result<T>, what: &str) -> Result<T> {
    result.map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            Error::Corruption(format!("stream truncated while reading {}", what))
        }
        _ => Error::Io(e),
    })
}
