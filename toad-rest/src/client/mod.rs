use crate::config::BlockTransfer;
use crate::endpoint::Endpoint;
use crate::req::Request;
use crate::resp::Response;

mod request;

#[doc(inline)]
pub use request::{BlockingRequest, Event, Exchange, Failure, State};

/// Errors encounterable by [`Client::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
  /// The request failed
  Request(Failure),
  /// The runtime failed while we were waiting for a response
  Runtime(E),
}

/// A blocking CoAP client.
///
/// Each call drives a [`BlockingRequest`] to completion, spinning on
/// the runtime with [`nb::block!`] between blocks.
#[derive(Debug)]
pub struct Client<'e, E> {
  exchange: &'e mut E,
  config: BlockTransfer,
}

impl<'e, E: Exchange> Client<'e, E> {
  /// Create a client sending through `exchange`
  pub fn new(exchange: &'e mut E, config: BlockTransfer) -> Self {
    Self { exchange, config }
  }

  /// GET `path` from `dest`, invoking `on_block` once per block of the response
  pub fn get<F>(&mut self, dest: Endpoint, path: &str, on_block: F) -> Result<(), Error<E::Error>>
    where F: FnMut(&Response)
  {
    self.send(dest, Request::get(path), on_block)
  }

  /// Send `req` to `dest`, invoking `on_block` once per block of the response
  pub fn send<F>(&mut self, dest: Endpoint, req: Request, mut on_block: F) -> Result<(), Error<E::Error>>
    where F: FnMut(&Response)
  {
    let mut blocking = BlockingRequest::new(req, dest, self.config);
    let mut state = blocking.resume(self.exchange, Event::Start, &mut on_block);

    loop {
      match state {
        | State::Done => break Ok(()),
        | State::Failed(f) => break Err(Error::Request(f)),
        | State::Idle => unreachable!(),
        | State::AwaitingResponse { mid } => {
          let resp = match nb::block!(self.exchange.poll_completion(mid)) {
            | Ok(resp) => resp,
            | Err(e) => {
              blocking.abandon(self.exchange);
              break Err(Error::Runtime(e));
            },
          };

          state = blocking.resume(self.exchange, Event::Completed(resp.as_ref()), &mut on_block);
        },
      }
    }
  }
}
