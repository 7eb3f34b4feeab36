//! Deterministic, self-describing encoding of [`ProposalRecord`] — the
//! message handed to the consensus layer for every client write and handed
//! back on commit.
//!
//! Wire layout (all integers little-endian):
//!
//! ```text
//! node_id:    u32
//! commit_id:  u32
//! op:         u8
//! arg_count:  u32
//! args:       arg_count * (len: u32, bytes: [u8; len])
//! ```
//!
//! The op byte is not validated against a closed set during decode: an
//! unrecognized value still produces a well-formed record with
//! `Op::Unsupported(byte)`, so that a future op code added by a newer node
//! doesn't prevent an older node from decoding (and logging-and-dropping)
//! the entry. `MalformedRecord` is reserved for structurally broken input —
//! a truncated buffer or a length prefix that runs past the end.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// The operation carried by a [`ProposalRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Set,
    Del,
    /// An op byte this binary does not recognize. Preserved verbatim so the
    /// record still round-trips through `encode`/`decode`.
    Unsupported(u8),
}

impl Op {
    const SET: u8 = 0;
    const DEL: u8 = 1;

    fn to_byte(self) -> u8 {
        match self {
            Op::Set => Self::SET,
            Op::Del => Self::DEL,
            Op::Unsupported(b) => b,
        }
    }

    fn from_byte(b: u8) -> Self {
        match b {
            Self::SET => Op::Set,
            Self::DEL => Op::Del,
            other => Op::Unsupported(other),
        }
    }
}

/// One client write request, as proposed to (or delivered by) consensus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalRecord {
    pub node_id: u32,
    pub commit_id: u32,
    pub op: Op,
    pub args: Vec<Bytes>,
}

impl ProposalRecord {
    pub fn set(node_id: u32, commit_id: u32, key: Bytes, value: Bytes) -> Self {
        Self {
            node_id,
            commit_id,
            op: Op::Set,
            args: vec![key, value],
        }
    }

    pub fn del(node_id: u32, commit_id: u32, keys: Vec<Bytes>) -> Self {
        Self {
            node_id,
            commit_id,
            op: Op::Del,
            args: keys,
        }
    }
}

/// Encodes a [`ProposalRecord`] to its deterministic wire form.
pub fn encode(record: &ProposalRecord) -> Bytes {
    let mut out = BytesMut::with_capacity(4 + 4 + 1 + 4 + record.args.iter().map(|a| 4 + a.len()).sum::<usize>());
    out.put_u32_le(record.node_id);
    out.put_u32_le(record.commit_id);
    out.put_u8(record.op.to_byte());
    out.put_u32_le(record.args.len() as u32);
    for arg in &record.args {
        out.put_u32_le(arg.len() as u32);
        out.put_slice(arg);
    }
    out.freeze()
}

/// Decodes a buffer previously produced by [`encode`].
///
/// Fails with [`Error::MalformedRecord`] if the buffer is truncated, has a
/// length prefix that overruns the remaining bytes, or carries trailing
/// garbage after the last argument.
pub fn decode(mut input: &[u8]) -> Result<ProposalRecord> {
    let node_id = take_u32(&mut input)?;
    let commit_id = take_u32(&mut input)?;
    let op = Op::from_byte(take_u8(&mut input)?);
    let arg_count = take_u32(&mut input)?;

    let mut args = Vec::with_capacity(arg_count as usize);
    for _ in 0..arg_count {
        let len = take_u32(&mut input)? as usize;
        if input.remaining() < len {
            return Err(Error::MalformedRecord(
                "argument length exceeds remaining buffer".into(),
            ));
        }
        args.push(Bytes::copy_from_slice(&input[..len]));
        input.advance(len);
    }

    if input.has_remaining() {
        return Err(Error::MalformedRecord("trailing bytes after last argument".into()));
    }

    Ok(ProposalRecord {
        node_id,
        commit_id,
        op,
        args,
    })
}

fn take_u32(input: &mut &[u8]) -> Result<u32> {
    if input.remaining() < 4 {
        return Err(Error::MalformedRecord("buffer too short for u32 field".into()));
    }
    Ok(input.get_u32_le())
}

fn take_u8(input: &mut &[u8]) -> Result<u8> {
    if input.remaining() < 1 {
        return Err(Error::MalformedRecord("buffer too short for u8 field".into()));
    }
    Ok(input.get_u8())
}
