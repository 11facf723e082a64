use std_alloc::string::String;
use std_alloc::vec::Vec;

use toad_msg::to_bytes::MessageToBytesError;
use toad_msg::{Code, Id, Payload, Token, TryIntoBytes, Type};

use crate::block::Block;
use crate::option;
use crate::Message;

/// Request methods
pub mod method;

#[doc(inline)]
pub use method::Method;

/// A CoAP request
///
/// ```
/// use toad_rest::req::{Method, Request};
///
/// let mut req = Request::get("sensors/temp");
/// req.set_payload("hi".bytes());
///
/// assert_eq!(req.method(), Some(Method::Get));
/// assert_eq!(req.path(), "sensors/temp");
/// assert_eq!(req.payload(), b"hi");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Request(Message);

impl Request {
  /// Create a confirmable request
  ///
  /// `path` is split on `/` into Uri-Path options; empty segments are dropped.
  pub fn new(method: Method, path: impl AsRef<str>) -> Self {
    let msg = Message { ty: Type::Con,
                        ver: Default::default(),
                        code: method.code(),
                        id: Id(0),
                        opts: Default::default(),
                        payload: Payload(Default::default()),
                        token: Token(Default::default()) };

    let mut req = Self(msg);
    path.as_ref()
        .split('/')
        .filter(|seg| !seg.is_empty())
        .for_each(|seg| option::push(&mut req.0.opts, option::URI_PATH, seg.as_bytes().to_vec()));
    req
  }

  /// Create a new GET request
  pub fn get(path: impl AsRef<str>) -> Self {
    Self::new(Method::Get, path)
  }

  /// Create a new POST request
  pub fn post(path: impl AsRef<str>) -> Self {
    Self::new(Method::Post, path)
  }

  /// Create a new PUT request
  pub fn put(path: impl AsRef<str>) -> Self {
    Self::new(Method::Put, path)
  }

  /// Create a new DELETE request
  pub fn delete(path: impl AsRef<str>) -> Self {
    Self::new(Method::Delete, path)
  }

  /// The request method, if it is one of GET, POST, PUT and DELETE
  pub fn method(&self) -> Option<Method> {
    Method::from_code(self.0.code)
  }

  /// The raw request code
  pub fn code(&self) -> Code {
    self.0.code
  }

  /// The request path; Uri-Path segments joined by `/`, without a leading `/`.
  ///
  /// Segments that are not valid utf8 are converted lossily.
  pub fn path(&self) -> String {
    let mut path = String::new();
    option::all(&self.0.opts, option::URI_PATH).enumerate()
                                               .for_each(|(ix, seg)| {
                                                 if ix > 0 {
                                                   path.push('/');
                                                 }
                                                 path.push_str(&String::from_utf8_lossy(seg));
                                               });
    path
  }

  /// The Block2 option, if the client asked for a specific block of the response
  pub fn block2(&self) -> Option<Block> {
    option::first(&self.0.opts, option::BLOCK2).and_then(Block::from_option_value)
  }

  /// Ask for a specific block of the response
  pub fn set_block2(&mut self, block: Block) {
    option::set(&mut self.0.opts,
                option::BLOCK2,
                block.to_option_value().into_iter().collect());
  }

  /// The Observe option, if present
  pub fn observe(&self) -> Option<u32> {
    option::first(&self.0.opts, option::OBSERVE).map(option::uint_of)
  }

  /// Set the Observe option (`0` registers, `1` deregisters)
  pub fn set_observe(&mut self, observe: u32) {
    option::set(&mut self.0.opts, option::OBSERVE, option::uint_value(observe));
  }

  /// The request body
  pub fn payload(&self) -> &[u8] {
    &self.0.payload.0
  }

  /// Replace the request body
  pub fn set_payload<Bytes: IntoIterator<Item = u8>>(&mut self, bytes: Bytes) {
    self.0.payload = Payload(bytes.into_iter().collect());
  }

  /// Message ID of this request
  pub fn id(&self) -> Id {
    self.0.id
  }

  /// Updates the Message ID for this request
  pub fn set_id(&mut self, id: Id) {
    self.0.id = id;
  }

  /// Token of this request
  pub fn token(&self) -> Token {
    self.0.token
  }

  /// Updates the token for this request
  pub fn set_token(&mut self, token: Token) {
    self.0.token = token;
  }

  /// Message type; confirmable unless changed
  pub fn ty(&self) -> Type {
    self.0.ty
  }

  /// Change the message type (e.g. to send a non-confirmable request)
  pub fn set_ty(&mut self, ty: Type) {
    self.0.ty = ty;
  }

  /// Borrow the underlying message
  pub fn msg(&self) -> &Message {
    &self.0
  }

  /// Serialize the request
  pub fn to_bytes(&self) -> Result<Vec<u8>, MessageToBytesError> {
    self.0.clone().try_into_bytes::<Vec<u8>>()
  }
}

impl From<Message> for Request {
  fn from(msg: Message) -> Self {
    Self(msg)
  }
}

impl From<Request> for Message {
  fn from(req: Request) -> Self {
    req.0
  }
}
