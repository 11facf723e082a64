use crate::block::Block;
use crate::req::Request;
use crate::resp::{code, Response};

/// Where a handler writes its answer
///
/// Besides the response itself, the reply knows how much of the
/// payload fits in one message ([`Reply::capacity`]) and, for
/// block-wise GETs, the byte offset into the full representation
/// the client asked for ([`Reply::offset`]).
#[derive(Debug)]
pub struct Reply<'r> {
  resp: &'r mut Response,
  capacity: u16,
  offset: u32,
}

impl<'r> Reply<'r> {
  /// Create a reply to `req` writing into `resp`, holding at most
  /// `chunk_size` bytes of payload (rounded to a valid block size).
  ///
  /// If the client asked for a smaller block size than that, the
  /// client's size wins. The offset always follows the block the client
  /// asked for, in the client's block size.
  pub fn new(req: &Request, resp: &'r mut Response, chunk_size: u16) -> Self {
    let chunk_size = Block::valid_size(chunk_size);

    let (capacity, offset) = match req.block2() {
      | Some(block) => (block.size().min(chunk_size), block.offset()),
      | None => (chunk_size, 0),
    };

    Self { resp,
           capacity,
           offset }
  }

  /// Byte offset into the full representation that the client asked for
  pub fn offset(&self) -> u32 {
    self.offset
  }

  /// Max number of payload bytes per message
  pub fn capacity(&self) -> u16 {
    self.capacity
  }

  /// Set the response code
  pub fn set_code(&mut self, code: toad_msg::Code) {
    self.resp.set_code(code);
  }

  /// Append bytes to the response payload
  pub fn write(&mut self, bytes: &[u8]) {
    self.resp.extend_payload(bytes);
  }

  /// Write the slice of `full` at [`Reply::offset`], setting the Block2 option
  /// when `full` does not fit in one message.
  ///
  /// Offsets past the end of `full` answer `4.02 Bad Option`.
  ///
  /// ```
  /// use toad_rest::block::Block;
  /// use toad_rest::req::Request;
  /// use toad_rest::resp::Response;
  /// use toad_rest::server::Reply;
  ///
  /// let mut req = Request::get("big");
  /// req.set_block2(Block::new(16, 1, false));
  ///
  /// let mut resp = Response::for_request(&req);
  /// Reply::new(&req, &mut resp, 64).write_chunk(&[7u8; 40]);
  ///
  /// assert_eq!(resp.payload(), &[7u8; 16]);
  /// assert_eq!(resp.block2(), Some(Block::new(16, 1, true)));
  /// ```
  pub fn write_chunk(&mut self, full: &[u8]) {
    let start = self.offset as usize;
    let size = self.capacity as usize;

    if start > 0 && start >= full.len() {
      log::debug!("block offset {} out of scope ({} bytes)", start, full.len());
      self.resp.set_code(code::BAD_OPTION);
      return;
    }

    let end = (start + size).min(full.len());
    self.resp.set_payload(full[start..end].iter().copied());

    if start > 0 || end < full.len() {
      let num = self.offset / u32::from(self.capacity);
      self.resp
          .set_block2(Block::new(self.capacity, num, end < full.len()));
    }
  }

  /// Borrow the response being built
  pub fn response(&mut self) -> &mut Response {
    self.resp
  }
}

/// Hook run after a successful request to an [observable](super::Flags::OBSERVABLE) resource
pub trait Observe {
  /// Register (or deregister) the client of `req` as an observer of `path`
  fn subscribe(&mut self, path: &str, req: &Request, resp: &mut Response);
}

/// No observers
impl Observe for () {
  fn subscribe(&mut self, _: &str, _: &Request, _: &mut Response) {}
}
