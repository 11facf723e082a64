use std_alloc::vec::Vec;

use toad_msg::to_bytes::MessageToBytesError;
use toad_msg::{Code, Id, Payload, Token, TryIntoBytes, Type};

use crate::block::Block;
use crate::option::{self, ContentFormat};
use crate::req::Request;
use crate::Message;

/// Response codes
pub mod code;

/// A CoAP response
///
/// ```
/// use toad_msg::Type;
/// use toad_rest::req::Request;
/// use toad_rest::resp::{code, Response};
///
/// let req = Request::get("hello");
/// let mut resp = Response::for_request(&req);
/// resp.set_payload("hello, world!".bytes());
///
/// // piggybacked on the ACK to the confirmable request
/// assert_eq!(resp.ty(), Type::Ack);
/// assert_eq!(resp.id(), req.id());
/// assert_eq!(resp.code(), code::CONTENT);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Response(Message);

impl Response {
  /// Create a response to a request.
  ///
  /// Confirmable requests are answered with a piggybacked ACK
  /// (same message id); other requests with a non-confirmable message
  /// whose id is assigned when it is sent. Either way the request token is echoed.
  ///
  /// The code defaults to `2.05 Content`.
  pub fn for_request(req: &Request) -> Self {
    let (ty, id) = match req.ty() {
      | Type::Con => (Type::Ack, req.id()),
      | _ => (Type::Non, Id(0)),
    };

    Self(Message { ty,
                   id,
                   ver: Default::default(),
                   code: code::CONTENT,
                   token: req.token(),
                   opts: Default::default(),
                   payload: Payload(Default::default()) })
  }

  /// Response code
  pub fn code(&self) -> Code {
    self.0.code
  }

  /// Change the response code
  pub fn set_code(&mut self, code: Code) {
    self.0.code = code;
  }

  /// The response body
  pub fn payload(&self) -> &[u8] {
    &self.0.payload.0
  }

  /// Replace the response body
  pub fn set_payload<Bytes: IntoIterator<Item = u8>>(&mut self, bytes: Bytes) {
    self.0.payload = Payload(bytes.into_iter().collect());
  }

  /// Append to the response body
  pub fn extend_payload(&mut self, bytes: &[u8]) {
    self.0.payload.0.extend_from_slice(bytes);
  }

  /// The Block2 option of this response, if the representation was split in blocks
  pub fn block2(&self) -> Option<Block> {
    option::first(&self.0.opts, option::BLOCK2).and_then(Block::from_option_value)
  }

  /// Mark this response as one block of a larger representation
  pub fn set_block2(&mut self, block: Block) {
    option::set(&mut self.0.opts,
                option::BLOCK2,
                block.to_option_value().into_iter().collect());
  }

  /// Set the Content-Format of the body
  pub fn set_content_format(&mut self, format: ContentFormat) {
    option::set(&mut self.0.opts, option::CONTENT_FORMAT, format.bytes());
  }

  /// The Observe option, if present
  pub fn observe(&self) -> Option<u32> {
    option::first(&self.0.opts, option::OBSERVE).map(option::uint_of)
  }

  /// Set the Observe sequence number
  pub fn set_observe(&mut self, seq: u32) {
    option::set(&mut self.0.opts, option::OBSERVE, option::uint_value(seq));
  }

  /// Message ID
  pub fn id(&self) -> Id {
    self.0.id
  }

  /// Updates the Message ID
  pub fn set_id(&mut self, id: Id) {
    self.0.id = id;
  }

  /// Token echoed from the request
  pub fn token(&self) -> Token {
    self.0.token
  }

  /// Message type
  pub fn ty(&self) -> Type {
    self.0.ty
  }

  /// Borrow the underlying message
  pub fn msg(&self) -> &Message {
    &self.0
  }

  /// Serialize the response
  pub fn to_bytes(&self) -> Result<Vec<u8>, MessageToBytesError> {
    self.0.clone().try_into_bytes::<Vec<u8>>()
  }
}

impl From<Message> for Response {
  fn from(msg: Message) -> Self {
    Self(msg)
  }
}

impl From<Response> for Message {
  fn from(resp: Response) -> Self {
    resp.0
  }
}
