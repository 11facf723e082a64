use embedded_time::duration::Milliseconds;

use crate::retry::{Attempts, Strategy};
use crate::time::Millis;

/// Ports the transport binds its two sockets to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ports {
  /// Port for plaintext CoAP.
  ///
  /// Defaults to the IANA-assigned `coap` port:
  /// ```
  /// use toad_rest::config::Ports;
  ///
  /// assert_eq!(Ports::default().plain, 5683);
  /// ```
  pub plain: u16,
  /// Port for CoAP over DTLS.
  ///
  /// Defaults to the IANA-assigned `coaps` port:
  /// ```
  /// use toad_rest::config::Ports;
  ///
  /// assert_eq!(Ports::default().secure, 5684);
  /// ```
  pub secure: u16,
}

/// Configuration options related to retransmitting outbound CON requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Con {
  /// Retry strategy for CON requests that
  /// have not yet been ACKed.
  ///
  /// Defaults to an exponential retry strategy:
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use toad_rest::config::Con;
  /// use toad_rest::retry::Strategy;
  ///
  /// assert_eq!(Con::default().unacked_retry_strategy,
  ///            Strategy::Exponential { init_min: Milliseconds(500),
  ///                                    init_max: Milliseconds(1_000) });
  /// ```
  pub unacked_retry_strategy: Strategy,
  /// Retry strategy for CON requests that have been ACKed
  /// with an empty ACK, and whose response will arrive separately.
  ///
  /// Defaults to a lazy exponential retry strategy:
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use toad_rest::config::Con;
  /// use toad_rest::retry::Strategy;
  ///
  /// assert_eq!(Con::default().acked_retry_strategy,
  ///            Strategy::Exponential { init_min: Milliseconds(1_000),
  ///                                    init_max: Milliseconds(2_000) });
  /// ```
  pub acked_retry_strategy: Strategy,
  /// Number of times we are allowed to send a CON request
  /// before the transaction completes without a response.
  ///
  /// Defaults to 4 attempts.
  /// ```
  /// use toad_rest::config::Con;
  /// use toad_rest::retry::Attempts;
  ///
  /// assert_eq!(Con::default().max_attempts, Attempts(4));
  /// ```
  pub max_attempts: Attempts,
}

impl Con {
  /// Longest time a transaction may stay open before it
  /// completes without a response.
  pub fn max_transmit_wait(&self) -> Millis {
    let unacked = self.unacked_retry_strategy.max_time(self.max_attempts);
    let acked = self.acked_retry_strategy.max_time(self.max_attempts);
    Milliseconds(unacked.0.max(acked.0))
  }
}

/// Configuration options related to block-wise transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockTransfer {
  /// Size (in bytes) of the blocks we request from servers,
  /// and the largest representation slice our resources may write
  /// into a single response.
  ///
  /// Must be a power of two between 16 and 1024; other values are
  /// rounded down to the nearest valid block size.
  ///
  /// Defaults to 64 bytes.
  /// ```
  /// use toad_rest::config::BlockTransfer;
  ///
  /// assert_eq!(BlockTransfer::default().chunk_size, 64);
  /// ```
  pub chunk_size: u16,
  /// Number of out-of-sequence blocks a blocking request
  /// tolerates before it fails.
  ///
  /// Defaults to 4.
  /// ```
  /// use toad_rest::config::BlockTransfer;
  /// use toad_rest::retry::Attempts;
  ///
  /// assert_eq!(BlockTransfer::default().max_errors, Attempts(4));
  /// ```
  pub max_errors: Attempts,
}

impl Default for Ports {
  fn default() -> Self {
    Ports { plain: 5683,
            secure: 5684 }
  }
}

impl Default for Con {
  fn default() -> Self {
    Con { unacked_retry_strategy: Strategy::Exponential { init_min: Milliseconds(500),
                                                          init_max: Milliseconds(1_000) },
          acked_retry_strategy: Strategy::Exponential { init_min: Milliseconds(1_000),
                                                        init_max: Milliseconds(2_000) },
          max_attempts: Attempts(4) }
  }
}

impl Default for BlockTransfer {
  fn default() -> Self {
    BlockTransfer { chunk_size: 64,
                    max_errors: Attempts(4) }
  }
}

/// Runtime config
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Config {
  /// See [`Ports`]
  pub ports: Ports,
  /// See [`Con`]
  pub con: Con,
  /// See [`BlockTransfer`]
  pub block: BlockTransfer,
  /// Size of the buffer inbound datagrams are read into.
  ///
  /// Bytes beyond this are dropped by the socket.
  ///
  /// Defaults to 1152, the size RFC7252 recommends
  /// when the path MTU is unknown.
  /// ```
  /// use toad_rest::config::Config;
  ///
  /// assert_eq!(Config::default().max_datagram_size, 1152);
  /// ```
  pub max_datagram_size: u16,
  /// Seed mixed with the boot time to pick the first message id.
  ///
  /// Devices that boot at the same moment should have distinct seeds
  /// (e.g. a serial number) so that their message ids don't collide.
  ///
  /// ```
  /// use toad_rest::config::Config;
  ///
  /// assert_eq!(Config::default().mid_seed, 0);
  /// ```
  pub mid_seed: u16,
  /// Whether the compiled-in PSK identity & key
  /// ([`keystore::DefaultPsk`](crate::keystore::DefaultPsk))
  /// may be used when no credential source has been registered.
  ///
  /// These credentials are public knowledge, so this is off by default.
  /// ```
  /// use toad_rest::config::Config;
  ///
  /// assert_eq!(Config::default().default_psk, false);
  /// ```
  pub default_psk: bool,
}

impl Default for Config {
  fn default() -> Self {
    Config { ports: Ports::default(),
             con: Con::default(),
             block: BlockTransfer::default(),
             max_datagram_size: 1152,
             mid_seed: 0,
             default_psk: false }
  }
}
