use toad_msg::Id;

use crate::block::Block;
use crate::config::BlockTransfer;
use crate::core::transaction::{AllocError, SendError};
use crate::endpoint::Endpoint;
use crate::req::Request;
use crate::resp::Response;
use crate::retry::Attempts;

/// The message layer, as seen by a [`BlockingRequest`]
pub trait Exchange {
  /// Errors the runtime may hit while polling
  type Error: core::fmt::Debug;

  /// Generate a message id not used by any live transaction
  fn next_mid(&mut self) -> Id;

  /// Reserve a transaction for a request with message id `mid` going to `dest`
  fn new_transaction(&mut self, mid: Id, dest: &Endpoint) -> Result<(), AllocError>;

  /// Serialize and send `req` as transaction `mid`
  fn send_transaction(&mut self, mid: Id, req: &Request) -> Result<(), SendError>;

  /// Drive the runtime once and, if transaction `mid` has completed, free it and
  /// yield its response (`None` if it completed without one).
  fn poll_completion(&mut self, mid: Id) -> nb::Result<Option<Response>, Self::Error>;

  /// Free transaction `mid` without waiting for it
  fn cancel(&mut self, mid: Id);
}

/// Why a [`BlockingRequest`] failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
  /// No transaction could be allocated for the request
  TransactionUnavailable(AllocError),
  /// The request could not be sent
  Send(SendError),
  /// The server never answered (or reset the exchange)
  NoResponse,
  /// Too many responses carried the wrong block number
  TooManyBlockErrors,
}

/// States of a [`BlockingRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
  /// Not started
  Idle,
  /// Waiting for transaction `mid` to complete
  AwaitingResponse {
    /// Message id of the outstanding block request
    mid: Id,
  },
  /// Every block was received
  Done,
  /// Gave up
  Failed(Failure),
}

impl State {
  /// Is this `Done` or `Failed`?
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Done | Self::Failed(_))
  }
}

/// Things that move a [`BlockingRequest`] forward
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
  /// Send the first request
  Start,
  /// The outstanding transaction completed, with or without a response
  Completed(Option<&'a Response>),
}

/// A request that fetches a (possibly block-wise) representation,
/// one transaction per block, tolerating a bounded number of
/// out-of-sequence blocks.
///
/// The machine only advances when [`BlockingRequest::resume`] is called;
/// it suspends (returns) right after sending each block request.
///
/// The `on_block` callback is invoked at most once per block number,
/// in increasing order.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockingRequest {
  request: Request,
  dest: Endpoint,
  block_num: u32,
  block_errors: Attempts,
  config: BlockTransfer,
  state: State,
}

impl BlockingRequest {
  /// Prepare to send `request` to `dest`
  pub fn new(request: Request, dest: Endpoint, config: BlockTransfer) -> Self {
    Self { request,
           dest,
           block_num: 0,
           block_errors: Attempts(0),
           config,
           state: State::Idle }
  }

  /// Current state
  pub fn state(&self) -> State {
    self.state
  }

  /// Number of the next block we expect
  pub fn block_num(&self) -> u32 {
    self.block_num
  }

  /// Number of out-of-sequence blocks received so far
  pub fn block_errors(&self) -> Attempts {
    self.block_errors
  }

  /// Feed an event to the state machine, yielding the new state.
  ///
  /// Events that make no sense in the current state (e.g. [`Event::Start`]
  /// while awaiting a response) are ignored.
  pub fn resume<E, F>(&mut self, exchange: &mut E, event: Event<'_>, mut on_block: F) -> State
    where E: Exchange,
          F: FnMut(&Response)
  {
    self.state = match (self.state, event) {
      | (State::Idle, Event::Start) => self.request_block(exchange),
      | (State::AwaitingResponse { .. }, Event::Completed(None)) => {
        log::debug!("no response for block {}", self.block_num);
        State::Failed(Failure::NoResponse)
      },
      | (State::AwaitingResponse { .. }, Event::Completed(Some(resp))) => {
        let (num, more) = resp.block2()
                              .map(|b: Block| (b.num(), b.more()))
                              .unwrap_or((0, false));

        if num == self.block_num {
          on_block(resp);
          self.block_num += 1;
        } else {
          log::debug!("got block {} while expecting {}", num, self.block_num);
          self.block_errors.0 += 1;
        }

        if self.block_errors >= self.config.max_errors {
          State::Failed(Failure::TooManyBlockErrors)
        } else if more {
          self.request_block(exchange)
        } else {
          State::Done
        }
      },
      | (state, _) => state,
    };

    self.state
  }

  /// Stop waiting, freeing the outstanding transaction (if any).
  pub fn abandon<E: Exchange>(&mut self, exchange: &mut E) {
    if let State::AwaitingResponse { mid } = self.state {
      exchange.cancel(mid);
      self.state = State::Failed(Failure::NoResponse);
    }
  }

  fn request_block<E: Exchange>(&mut self, exchange: &mut E) -> State {
    let mid = exchange.next_mid();

    if let Err(e) = exchange.new_transaction(mid, &self.dest) {
      log::warn!("could not allocate transaction: {:?}", e);
      return State::Failed(Failure::TransactionUnavailable(e));
    }

    if self.block_num > 0 {
      self.request
          .set_block2(Block::new(self.config.chunk_size, self.block_num, false));
    }

    match exchange.send_transaction(mid, &self.request) {
      | Ok(()) => {
        log::trace!("requested block {} (mid {})", self.block_num, mid.0);
        State::AwaitingResponse { mid }
      },
      | Err(e) => {
        exchange.cancel(mid);
        State::Failed(Failure::Send(e))
      },
    }
  }
}
