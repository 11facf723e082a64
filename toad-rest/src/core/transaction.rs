use rand::{Rng, SeedableRng};
use std_alloc::vec::Vec;
use tinyvec::ArrayVec;
use toad_msg::to_bytes::MessageToBytesError;
use toad_msg::{Id, Token, TryIntoBytes, Type};

use crate::config::Con;
use crate::endpoint::Endpoint;
use crate::logging;
use crate::resp::Response;
use crate::retry::{RetryTimer, YouShould};
use crate::time::Millis;
use crate::transport::Deliver;
use crate::Message;

// Option provides the Default implementation required by ArrayVec,
// and lets us free a slot without reindexing the others.
type Buffer<T, const N: usize> = ArrayVec<[Option<T>; N]>;

/// Why a transaction could not be allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  /// Every slot holds a live transaction
  Full,
  /// A live transaction already uses this message id
  InUse,
}

/// Why a transaction could not be sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
  /// No live transaction has this message id
  Unknown,
  /// The request could not be serialized
  ToBytes(MessageToBytesError),
  /// The clock could not be read to start the retransmission timer
  Clock,
}

/// Where a transaction is in its life
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
  /// Allocated, not sent yet
  New,
  /// Sent, waiting for an ACK or a response
  Pending,
  /// Finished. Holds the response, or `None` if the peer reset the
  /// exchange or retransmissions were exhausted.
  Complete(Option<Response>),
}

/// Bookkeeping for one outstanding confirmable request
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
  mid: Id,
  token: Option<Token>,
  dest: Endpoint,
  packet: Vec<u8>,
  retry: Option<RetryTimer>,
  acked: bool,
  status: Status,
}

impl Default for Transaction {
  fn default() -> Self {
    Self { mid: Id(0),
           token: None,
           dest: Endpoint::new(no_std_net::Ipv6Addr::UNSPECIFIED, 0, false),
           packet: Vec::new(),
           retry: None,
           acked: false,
           status: Status::New }
  }
}

impl Transaction {
  /// Message id of the request
  pub fn mid(&self) -> Id {
    self.mid
  }

  /// Where the request goes
  pub fn dest(&self) -> &Endpoint {
    &self.dest
  }

  /// Has the peer sent an empty ACK for the request?
  pub fn acked(&self) -> bool {
    self.acked
  }

  /// Where the transaction is in its life
  pub fn status(&self) -> &Status {
    &self.status
  }

  fn complete(&mut self, resp: Option<Response>) {
    self.status = Status::Complete(resp);
    self.retry = None;
    self.packet = Vec::new();
  }

  fn matches(&self, msg: &Message) -> bool {
    let piggybacked = matches!(msg.ty, Type::Ack | Type::Reset) && msg.id == self.mid;
    let separate = !msg.token.0.is_empty() && Some(msg.token) == self.token;
    piggybacked || separate
  }
}

/// Fixed-capacity table of outstanding transactions.
///
/// Guarantees at most one live transaction per message id. A
/// slot is freed when its completion is taken, or when it is cancelled.
#[derive(Debug)]
pub struct TransactionTable<const N: usize> {
  slots: Buffer<Transaction, N>,
  next_mid: u16,
  rand: rand_chacha::ChaCha8Rng,
}

impl<const N: usize> TransactionTable<N> {
  /// Create an empty table, seeding message id and token generation with `seed`
  pub fn new(seed: u64) -> Self {
    let mut rand = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
    let next_mid = rand.gen();

    Self { slots: Default::default(),
           next_mid,
           rand }
  }

  fn find(&self, mid: Id) -> Option<&Transaction> {
    self.slots.iter().flatten().find(|t| t.mid == mid)
  }

  fn find_mut(&mut self, mid: Id) -> Option<&mut Transaction> {
    self.slots.iter_mut().flatten().find(|t| t.mid == mid)
  }

  /// Number of live transactions
  pub fn len(&self) -> usize {
    self.slots.iter().flatten().count()
  }

  /// Are there no live transactions?
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Look up a live transaction
  pub fn get(&self, mid: Id) -> Option<&Transaction> {
    self.find(mid)
  }

  /// Generate a message id not used by any live transaction
  pub fn next_mid(&mut self) -> Id {
    loop {
      let mid = Id(self.next_mid);
      self.next_mid = self.next_mid.wrapping_add(1);

      if self.find(mid).is_none() {
        break mid;
      }
    }
  }

  /// Generate a random 4-byte token
  pub fn next_token(&mut self) -> Token {
    let bytes: [u8; 4] = self.rand.gen();
    Token(bytes.into_iter().collect())
  }

  /// Reserve a slot for a request with message id `mid` going to `dest`
  pub fn new_transaction(&mut self, mid: Id, dest: Endpoint) -> Result<(), AllocError> {
    if self.find(mid).is_some() {
      log::warn!("transaction {} already live", mid.0);
      return Err(AllocError::InUse);
    }

    let t = Transaction { mid,
                          dest,
                          ..Default::default() };

    let len = self.slots.len();
    match self.slots.iter_mut().find(|slot| slot.is_none()) {
      | Some(slot) => *slot = Some(t),
      | None if len < N => self.slots.push(Some(t)),
      | None => {
        log::warn!("transaction table full ({} live)", N);
        return Err(AllocError::Full);
      },
    }

    Ok(())
  }

  /// Serialize `msg` (giving it the transaction's message id), send it,
  /// and start its retransmission timer.
  ///
  /// Sending a transaction again restarts it.
  pub fn send_transaction(&mut self,
                          mid: Id,
                          mut msg: Message,
                          con: &Con,
                          now: Millis,
                          deliver: &mut impl Deliver)
                          -> Result<(), SendError> {
    let t = self.find_mut(mid).ok_or(SendError::Unknown)?;

    msg.id = mid;
    let token = msg.token;
    let packet = msg.try_into_bytes::<Vec<u8>>()
                    .map_err(SendError::ToBytes)?;

    log::debug!("sending transaction {} to {}", mid.0, logging::endpoint(&t.dest));
    deliver.deliver(&t.dest, &packet);

    t.token = Some(token);
    t.packet = packet;
    t.acked = false;
    t.status = Status::Pending;
    t.retry = Some(RetryTimer::new(now, con.unacked_retry_strategy, con.max_attempts));

    Ok(())
  }

  /// Match an inbound ACK, RST or response against the live transactions.
  ///
  /// - an empty ACK marks the request acknowledged; from then on the
  ///   acked strategy only bounds how long we wait for the separate response
  /// - an RST completes the transaction without a response
  /// - anything else with a matching id or token completes it with the response
  ///
  /// Returns the message id of the transaction affected, if any.
  pub fn on_response(&mut self, msg: &Message, con: &Con, now: Millis) -> Option<Id> {
    let t = self.slots
                .iter_mut()
                .flatten()
                .filter(|t| t.status == Status::Pending)
                .find(|t| t.matches(msg))?;

    let empty = msg.code.class == 0 && msg.code.detail == 0;

    match (msg.ty, empty) {
      | (Type::Reset, _) => {
        log::debug!("transaction {} reset by peer", t.mid.0);
        t.complete(None);
      },
      | (Type::Ack, true) => {
        log::trace!("transaction {} acked", t.mid.0);
        t.acked = true;
        t.retry = Some(RetryTimer::new(now, con.acked_retry_strategy, con.max_attempts));
      },
      | _ => {
        log::debug!("transaction {} got {}", t.mid.0, logging::msg_summary(msg));
        t.complete(Some(Response::from(msg.clone())));
      },
    }

    Some(t.mid)
  }

  /// Retransmit unacknowledged requests whose timers are due,
  /// and complete (without a response) those out of attempts.
  pub fn poll_retransmit(&mut self, now: Millis, deliver: &mut impl Deliver) {
    for t in self.slots.iter_mut().flatten() {
      let retry = match (&t.status, t.retry.as_mut()) {
        | (Status::Pending, Some(retry)) => retry,
        | _ => continue,
      };

      match retry.what_should_i_do(now) {
        | Ok(YouShould::Retry) if !t.acked => {
          log::debug!("retransmitting {} (attempt {})", t.mid.0, retry.attempts().0);
          deliver.deliver(&t.dest, &t.packet);
        },
        | Ok(YouShould::Retry) => (),
        | Ok(YouShould::Cry) => {
          log::warn!("transaction {} to {} never answered",
                     t.mid.0,
                     logging::endpoint(&t.dest));
          t.complete(None);
        },
        | Err(nb::Error::WouldBlock) => (),
        | Err(nb::Error::Other(never)) => match never {},
      }
    }
  }

  /// If the transaction has completed, free its slot and yield the outcome.
  ///
  /// `Err(WouldBlock)` while the transaction is in flight; `Ok(None)` if it completed
  /// without a response or does not exist.
  pub fn take_completion(&mut self, mid: Id) -> nb::Result<Option<Response>, core::convert::Infallible> {
    let slot = self.slots
                   .iter_mut()
                   .find(|slot| slot.as_ref().map(|t| t.mid == mid).unwrap_or(false));

    let slot = match slot {
      | Some(slot) => slot,
      | None => return Ok(None),
    };

    match slot.take() {
      | Some(Transaction { status: Status::Complete(resp),
                           .. }) => Ok(resp),
      | other => {
        *slot = other;
        Err(nb::Error::WouldBlock)
      },
    }
  }

  /// Free the slot of a transaction without waiting for it to complete
  pub fn cancel(&mut self, mid: Id) {
    self.slots
        .iter_mut()
        .filter(|slot| slot.as_ref().map(|t| t.mid == mid).unwrap_or(false))
        .for_each(|slot| *slot = None);
  }
}
