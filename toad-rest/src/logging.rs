use core::fmt::Write;

use tinyvec::ArrayVec;
use toad_writable::Writable;

use crate::endpoint::Endpoint;
use crate::resp::code;
use crate::Message;

pub(crate) type Summary = Writable<ArrayVec<[u8; 128]>>;

pub(crate) fn msg_summary(msg: &Message) -> Summary {
  let mut buf = Summary::default();
  let [c, dot, d1, d2] = code::to_human(msg.code);
  write!(buf,
         "{:?} {}{}{}{} id={} with {} byte payload",
         msg.ty,
         c,
         dot,
         d1,
         d2,
         msg.id.0,
         msg.payload.0.len()).ok();
  buf
}

pub(crate) fn endpoint(ep: &Endpoint) -> Summary {
  let mut buf = Summary::default();
  write!(buf, "{}", ep).ok();
  buf
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::req::Request;
  use crate::resp::Response;

  #[test]
  fn summarizes_without_alloc() {
    let resp = Response::for_request(&Request::get("a"));
    let msg: Message = resp.into();
    assert_eq!(msg_summary(&msg).as_str(),
               "Ack 2.05 id=0 with 0 byte payload");
  }

  #[test]
  fn endpoint_summary() {
    let ep = Endpoint::parse("coaps://[::1]:5684").unwrap();
    assert!(endpoint(&ep).as_str().starts_with("coaps://["));
  }
}
