use std_alloc::vec::Vec;

use crate::endpoint::Endpoint;
use crate::keystore::Keystore;
use crate::logging;
use crate::net::{Addrd, Socket};

/// A secure channel's handle to the datagram socket carrying its records.
pub trait Link {
  /// Send a record (handshake, alert or encrypted application data) to `to`
  fn send(&mut self, to: &Endpoint, record: &[u8]) -> Result<(), LinkError>;
}

/// The link failed to send a record
///
/// Details are logged where the failure happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkError;

/// A DTLS implementation the transport routes secure traffic through.
///
/// The record layer (handshake state machine, ciphers) lives entirely
/// behind this trait; pre-shared keys are requested from the [`Keystore`]
/// passed to each call, synchronously, during the handshake.
///
/// Sessions are keyed by [`Endpoint`].
pub trait SecureChannel {
  /// Errors the channel may report
  type Error: core::fmt::Debug;

  /// Start a handshake with `peer` (a no-op if a session exists).
  fn connect<L: Link>(&mut self,
                      link: &mut L,
                      keys: &Keystore<'_>,
                      peer: &Endpoint)
                      -> Result<(), Self::Error>;

  /// Close the session with `peer`, if there is one.
  fn disconnect<L: Link>(&mut self, link: &mut L, peer: &Endpoint);

  /// Process a record received from `peer`.
  ///
  /// Yields the decrypted application data, or `None` if the record
  /// was consumed by the channel (handshake, alerts).
  fn handle_inbound<L: Link>(&mut self,
                             link: &mut L,
                             keys: &Keystore<'_>,
                             peer: &Endpoint,
                             record: &[u8])
                             -> Result<Option<Vec<u8>>, Self::Error>;

  /// Encrypt `data` and send it to `peer`.
  fn write<L: Link>(&mut self,
                    link: &mut L,
                    keys: &Keystore<'_>,
                    peer: &Endpoint,
                    data: &[u8])
                    -> Result<(), Self::Error>;

  /// Has the handshake with `peer` completed?
  fn is_connected(&self, peer: &Endpoint) -> bool;
}

/// [`Link`] over the secure socket
#[derive(Debug)]
pub(crate) struct SocketLink<'s, S>(pub(crate) &'s S);

impl<'s, S: Socket> Link for SocketLink<'s, S> {
  fn send(&mut self, to: &Endpoint, record: &[u8]) -> Result<(), LinkError> {
    self.0.send(Addrd(record, to.socket_addr())).map_err(|e| {
                                                   log::warn!("failed to send record to {}: {:?}",
                                                              logging::endpoint(to),
                                                              e);
                                                   LinkError
                                                 })
  }
}

/// Stand-in [`SecureChannel`] for platforms without DTLS.
///
/// Every secure operation fails with [`SecurityDisabled`], and no peer is ever connected.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NoSecurity;

/// Error of [`NoSecurity`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityDisabled;

impl SecureChannel for NoSecurity {
  type Error = SecurityDisabled;

  fn connect<L: Link>(&mut self, _: &mut L, _: &Keystore<'_>, _: &Endpoint) -> Result<(), Self::Error> {
    Err(SecurityDisabled)
  }

  fn disconnect<L: Link>(&mut self, _: &mut L, _: &Endpoint) {}

  fn handle_inbound<L: Link>(&mut self,
                             _: &mut L,
                             _: &Keystore<'_>,
                             _: &Endpoint,
                             _: &[u8])
                             -> Result<Option<Vec<u8>>, Self::Error> {
    Err(SecurityDisabled)
  }

  fn write<L: Link>(&mut self,
                    _: &mut L,
                    _: &Keystore<'_>,
                    _: &Endpoint,
                    _: &[u8])
                    -> Result<(), Self::Error> {
    Err(SecurityDisabled)
  }

  fn is_connected(&self, _: &Endpoint) -> bool {
    false
  }
}
