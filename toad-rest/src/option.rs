use std_alloc::collections::BTreeMap;
use std_alloc::vec;
use std_alloc::vec::Vec;

use toad_msg::{MessageParseError, OptNumber, OptValue, TryFromBytes};

use crate::Message;

pub(crate) type Opts = BTreeMap<OptNumber, Vec<OptValue<Vec<u8>>>>;

pub(crate) const OBSERVE: OptNumber = OptNumber(6);
pub(crate) const URI_PATH: OptNumber = OptNumber(11);
pub(crate) const CONTENT_FORMAT: OptNumber = OptNumber(12);
pub(crate) const BLOCK2: OptNumber = OptNumber(23);

/// Content-Format
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
  /// `text/plain; charset=utf-8`
  Text,
  /// `application/link-format`
  LinkFormat,
  /// `application/octet-stream`
  OctetStream,
  /// `application/json`
  Json,
  /// `application/cbor`
  Cbor,
  /// Another content format
  Other(u16),
}

impl ContentFormat {
  /// Convert this content format to the CoAP option value
  pub fn bytes(&self) -> Vec<u8> {
    uint_value(u32::from(u16::from(self)))
  }
}

impl<'a> From<&'a ContentFormat> for u16 {
  fn from(f: &'a ContentFormat) -> Self {
    use ContentFormat::*;
    match *f {
      | Text => 0,
      | LinkFormat => 40,
      | OctetStream => 42,
      | Json => 50,
      | Cbor => 60,
      | Other(n) => n,
    }
  }
}

pub(crate) fn first(opts: &Opts, n: OptNumber) -> Option<&[u8]> {
  opts.get(&n)
      .and_then(|values| values.first())
      .map(|OptValue(v)| v.as_slice())
}

pub(crate) fn all(opts: &Opts, n: OptNumber) -> impl Iterator<Item = &[u8]> {
  opts.get(&n)
      .into_iter()
      .flat_map(|values| values.iter().map(|OptValue(v)| v.as_slice()))
}

pub(crate) fn set(opts: &mut Opts, n: OptNumber, value: Vec<u8>) {
  opts.insert(n, vec![OptValue(value)]);
}

pub(crate) fn push(opts: &mut Opts, n: OptNumber, value: Vec<u8>) {
  opts.entry(n).or_default().push(OptValue(value));
}

/// Parse a message, keeping every instance of a repeated option.
///
/// `toad_msg` keeps one value per option number when it parses into a map,
/// so once the message is known to be well-formed the option block is
/// decoded again here.
pub(crate) fn parse_message(bytes: &[u8]) -> Result<Message, MessageParseError> {
  let mut msg = Message::try_from_bytes(bytes)?;

  let tkl = bytes.first().map(|b| usize::from(b & 0x0F)).unwrap_or_default();
  msg.opts = decode(bytes.get(4 + tkl..).unwrap_or_default());

  Ok(msg)
}

fn decode(mut bytes: &[u8]) -> Opts {
  let mut opts = Opts::default();
  let mut num = 0u32;

  while let Some((&head, rest)) = bytes.split_first() {
    if head == 0xFF {
      break;
    }

    let (delta, rest) = match extended(head >> 4, rest) {
      | Some(x) => x,
      | None => break,
    };
    let (len, rest) = match extended(head & 0x0F, rest) {
      | Some(x) => x,
      | None => break,
    };

    let len = len as usize;
    if rest.len() < len {
      break;
    }

    num += delta;
    push(&mut opts, OptNumber(num), rest[..len].to_vec());
    bytes = &rest[len..];
  }

  opts
}

/// Option delta or length, with the 13 / 14 extended forms
fn extended(nibble: u8, bytes: &[u8]) -> Option<(u32, &[u8])> {
  match (nibble, bytes) {
    | (13, [n, rest @ ..]) => Some((u32::from(*n) + 13, rest)),
    | (14, [a, b, rest @ ..]) => Some((u32::from(u16::from_be_bytes([*a, *b])) + 269, rest)),
    | (13..=15, _) => None,
    | (n, _) => Some((u32::from(n), bytes)),
  }
}

/// Minimal big-endian encoding of an unsigned option value
pub(crate) fn uint_value(n: u32) -> Vec<u8> {
  n.to_be_bytes().into_iter().skip_while(|b| *b == 0).collect()
}

pub(crate) fn uint_of(bytes: &[u8]) -> u32 {
  bytes.iter().fold(0u32, |n, b| (n << 8) | u32::from(*b))
}
