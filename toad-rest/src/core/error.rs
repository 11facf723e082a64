use toad_msg::to_bytes::MessageToBytesError;
use toad_msg::Id;

use crate::transport;

/// The context that an error occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum When {
  /// We were polling the transport or the timers
  Polling,
  /// We were sending a reply to a request
  Replying(Id),
}

impl When {
  /// Construct a specific error from the context the error occurred in
  pub fn what<SE, DE>(self, what: What<SE, DE>) -> Error<SE, DE> {
    Error { when: self, what }
  }
}

/// An error encounterable from within [`Core`](super::Core)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error<SE, DE> {
  /// What happened?
  pub what: What<SE, DE>,
  /// What were we doing when it happened?
  pub when: When,
}

/// A contextless error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum What<SE, DE> {
  /// The transport (a socket or the secure channel) failed
  Transport(transport::Error<SE, DE>),
  /// Serializing a message to bytes failed
  ToBytes(MessageToBytesError),
  /// The clock failed to provide timing.
  ///
  /// See [`embedded_time::clock::Error`]
  ClockError,
}
