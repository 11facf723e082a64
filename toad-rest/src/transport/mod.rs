use no_std_net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std_alloc::vec;
use std_alloc::vec::Vec;

use crate::config::Config;
use crate::endpoint::Endpoint;
use crate::keystore::Keystore;
use crate::logging;
use crate::net::{Addrd, Socket};

mod secure;

#[doc(inline)]
pub use secure::{Link, LinkError, NoSecurity, SecureChannel, SecurityDisabled};
use secure::SocketLink;

/// A datagram received by the transport, decrypted if it arrived on the secure socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
  /// Who sent it; `from.is_secure()` tells which socket it came in on
  pub from: Endpoint,
  /// The (plaintext) payload
  pub payload: Vec<u8>,
}

/// Errors encounterable by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<SocketError, ChannelError> {
  /// A socket operation failed
  Socket(SocketError),
  /// The secure channel refused an operation
  Channel(ChannelError),
  /// A secure endpoint was used but the transport has no secure channel
  SecureUnavailable,
}

/// Something outbound messages can be handed to, without caring
/// how (or whether) they reach the peer.
///
/// Used for replies and retransmissions, where losses are
/// recovered by the retransmission machinery rather than by the caller.
pub trait Deliver {
  /// Send `bytes` to `to`, logging failures.
  fn deliver(&mut self, to: &Endpoint, bytes: &[u8]);
}

#[derive(Debug)]
struct Secure<S, D> {
  sock: S,
  channel: D,
}

/// Owns the plaintext socket and (optionally) the secure socket & channel,
/// and routes datagrams between them and the message layer by [`Endpoint`].
#[derive(Debug)]
pub struct Transport<'k, S, D> {
  plain: S,
  secure: Option<Secure<S, D>>,
  keystore: Keystore<'k>,
  route_available: bool,
  buf: Vec<u8>,
}

impl<'k, S, D> Transport<'k, S, D>
  where S: Socket,
        D: SecureChannel
{
  /// Create a plaintext-only transport over an already-bound socket
  pub fn new(plain: S, keystore: Keystore<'k>, max_datagram_size: usize) -> Self {
    Self { plain,
           secure: None,
           keystore,
           route_available: true,
           buf: vec![0u8; max_datagram_size] }
  }

  /// Add a secure socket & the channel that runs DTLS over it
  pub fn with_secure(mut self, sock: S, channel: D) -> Self {
    self.secure = Some(Secure { sock, channel });
    self
  }

  /// Bind the plaintext socket (and the secure one, when a channel is provided)
  /// to the configured [`Ports`](crate::config::Ports) on all interfaces.
  pub fn bind(config: &Config, keystore: Keystore<'k>, channel: Option<D>) -> Result<Self, S::Error> {
    let any = |port| SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0));

    let plain = S::bind_raw(any(config.ports.plain))?;
    let transport = Self::new(plain, keystore, config.max_datagram_size as usize);

    match channel {
      | Some(channel) => {
        let sock = S::bind_raw(any(config.ports.secure))?;
        Ok(transport.with_secure(sock, channel))
      },
      | None => Ok(transport),
    }
  }

  /// Does this transport have a secure channel?
  pub fn is_secure_enabled(&self) -> bool {
    self.secure.is_some()
  }

  /// Keystore handed to the secure channel during handshakes
  pub fn keystore(&self) -> &Keystore<'k> {
    &self.keystore
  }

  /// Replace the keystore
  pub fn set_keystore(&mut self, keystore: Keystore<'k>) {
    self.keystore = keystore;
  }

  /// Tell the transport whether the network has a route out (e.g. a routing
  /// parent has been joined). While `false`, no endpoint is considered connected.
  pub fn set_route_available(&mut self, available: bool) {
    self.route_available = available;
  }

  /// See [`Transport::set_route_available`]
  pub fn route_available(&self) -> bool {
    self.route_available
  }

  /// Local address of the plaintext socket
  pub fn local_addr(&self) -> SocketAddr {
    self.plain.local_addr()
  }

  /// Pull the next datagram from the plaintext socket, or failing that from
  /// the secure socket.
  ///
  /// Secure records are handed to the channel; records that fail to decrypt
  /// and handshake records are consumed here and never surfaced.
  ///
  /// Yields `nb::Error::WouldBlock` when both sockets are drained.
  pub fn poll(&mut self) -> nb::Result<Datagram, Error<S::Error, D::Error>> {
    loop {
      match self.plain.recv(&mut self.buf) {
        | Ok(Addrd(n, addr)) => {
          let from = Endpoint::from_addr(addr, false);
          log::trace!("{} bytes from {}", n, logging::endpoint(&from));
          return Ok(Datagram { from,
                               payload: self.buf[..n].to_vec() });
        },
        | Err(nb::Error::WouldBlock) => (),
        | Err(nb::Error::Other(e)) => return Err(nb::Error::Other(Error::Socket(e))),
      }

      let secure = match self.secure.as_mut() {
        | Some(secure) => secure,
        | None => return Err(nb::Error::WouldBlock),
      };

      let Addrd(n, addr) = secure.sock
                                 .recv(&mut self.buf)
                                 .map_err(|e| e.map(Error::Socket))?;

      let from = Endpoint::from_addr(addr, true);
      let mut link = SocketLink(&secure.sock);

      match secure.channel
                  .handle_inbound(&mut link, &self.keystore, &from, &self.buf[..n])
      {
        | Ok(Some(payload)) => {
          log::trace!("{} bytes from {}", payload.len(), logging::endpoint(&from));
          return Ok(Datagram { from, payload });
        },
        | Ok(None) => continue,
        | Err(e) => {
          log::warn!("dropping record from {}: {:?}", logging::endpoint(&from), e);
          continue;
        },
      }
    }
  }

  /// Send `data` to `to`, through the secure channel if `to` is secure.
  ///
  /// Sending to no endpoint is a no-op.
  pub fn send(&mut self,
              to: Option<&Endpoint>,
              data: &[u8])
              -> nb::Result<(), Error<S::Error, D::Error>> {
    let to = match to {
      | Some(to) => to,
      | None => {
        log::trace!("send without endpoint, dropping {} bytes", data.len());
        return Ok(());
      },
    };

    if to.is_secure() {
      let secure = self.secure
                       .as_mut()
                       .ok_or(nb::Error::Other(Error::SecureUnavailable))?;
      let mut link = SocketLink(&secure.sock);

      secure.channel
            .write(&mut link, &self.keystore, to, data)
            .map_err(|e| nb::Error::Other(Error::Channel(e)))
    } else {
      self.plain
          .send(Addrd(data, to.socket_addr()))
          .map_err(|e| e.map(Error::Socket))
    }
  }

  /// Can we talk to `ep` right now?
  ///
  /// Plaintext endpoints are always connected (given a route);
  /// secure endpoints only once the DTLS handshake has completed.
  pub fn is_connected(&self, ep: &Endpoint) -> bool {
    if !self.route_available {
      return false;
    }

    if ep.is_secure() {
      self.secure
          .as_ref()
          .map(|secure| secure.channel.is_connected(ep))
          .unwrap_or(false)
    } else {
      true
    }
  }

  /// Start a DTLS handshake with `ep`.
  ///
  /// Plaintext endpoints need no connection, and always succeed.
  pub fn connect(&mut self, ep: &Endpoint) -> Result<(), Error<S::Error, D::Error>> {
    if !ep.is_secure() {
      return Ok(());
    }

    let secure = self.secure.as_mut().ok_or(Error::SecureUnavailable)?;
    let mut link = SocketLink(&secure.sock);

    log::debug!("connecting to {}", logging::endpoint(ep));
    secure.channel
          .connect(&mut link, &self.keystore, ep)
          .map_err(Error::Channel)
  }

  /// Close the DTLS session with `ep`, if there is one.
  pub fn disconnect(&mut self, ep: &Endpoint) {
    if let (true, Some(secure)) = (ep.is_secure(), self.secure.as_mut()) {
      let mut link = SocketLink(&secure.sock);
      secure.channel.disconnect(&mut link, ep);
    }
  }
}

impl<'k, S, D> Deliver for Transport<'k, S, D>
  where S: Socket,
        D: SecureChannel
{
  fn deliver(&mut self, to: &Endpoint, bytes: &[u8]) {
    match self.send(Some(to), bytes) {
      | Ok(()) => (),
      | Err(nb::Error::WouldBlock) => {
        log::debug!("socket busy, dropped {} bytes to {}",
                    bytes.len(),
                    logging::endpoint(to))
      },
      | Err(nb::Error::Other(e)) => {
        log::warn!("failed to send {} bytes to {}: {:?}",
                   bytes.len(),
                   logging::endpoint(to),
                   e)
      },
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::test::{addr, ChannelMock, SockMock};

  type T<'k> = Transport<'k, SockMock, ChannelMock>;

  fn transport() -> T<'static> {
    Transport::new(SockMock::new(), Keystore::new(), 1152).with_secure(SockMock::new(),
                                                                      ChannelMock::default())
  }

  fn secure_sock<'a>(t: &'a T<'_>) -> &'a SockMock {
    &t.secure.as_ref().unwrap().sock
  }

  fn channel<'a>(t: &'a mut T<'_>) -> &'a mut ChannelMock {
    &mut t.secure.as_mut().unwrap().channel
  }

  #[test]
  fn plaintext_inbound_is_insecure() {
    let mut t = transport();
    t.plain.push_rx(addr(1), b"hello");

    let dgram = t.poll().unwrap();
    assert_eq!(dgram.from, Endpoint::from_addr(addr(1), false));
    assert_eq!(dgram.payload, b"hello".to_vec());
    assert_eq!(t.poll(), Err(nb::Error::WouldBlock));
  }

  #[test]
  fn secure_inbound_is_decrypted() {
    let mut t = transport();
    secure_sock(&t).push_rx(addr(2), &ChannelMock::seal(b"secret"));

    let dgram = t.poll().unwrap();
    assert_eq!(dgram.from, Endpoint::from_addr(addr(2), true));
    assert_eq!(dgram.payload, b"secret".to_vec());
  }

  #[test]
  fn undecryptable_records_are_dropped() {
    let mut t = transport();
    secure_sock(&t).push_rx(addr(2), b"garbage");
    secure_sock(&t).push_rx(addr(2), ChannelMock::HANDSHAKE);
    secure_sock(&t).push_rx(addr(3), &ChannelMock::seal(b"ok"));

    let dgram = t.poll().unwrap();
    assert_eq!(dgram.payload, b"ok".to_vec());
    assert_eq!(dgram.from, Endpoint::from_addr(addr(3), true));
    assert_eq!(t.poll(), Err(nb::Error::WouldBlock));

    // the handshake record made the peer connected
    assert!(t.is_connected(&Endpoint::from_addr(addr(2), true)));
  }

  #[test]
  fn send_routes_by_security() {
    let mut t = transport();
    let plain = Endpoint::from_addr(addr(1), false);
    let secure = Endpoint::from_addr(addr(1), true);

    t.send(Some(&plain), b"a").unwrap();
    t.send(Some(&secure), b"b").unwrap();

    assert_eq!(t.plain.take_tx(), vec![Addrd(b"a".to_vec(), addr(1))]);
    assert_eq!(secure_sock(&t).take_tx(),
               vec![Addrd(ChannelMock::seal(b"b"), addr(1))]);
  }

  #[test]
  fn send_without_endpoint_is_noop() {
    let mut t = transport();
    assert_eq!(t.send(None, b"a"), Ok(()));
    assert!(t.plain.take_tx().is_empty());
    assert!(secure_sock(&t).take_tx().is_empty());
  }

  #[test]
  fn secure_send_without_channel() {
    let mut t = Transport::<SockMock, NoSecurity>::new(SockMock::new(), Keystore::new(), 64);
    let secure = Endpoint::from_addr(addr(1), true);
    assert_eq!(t.send(Some(&secure), b"a"),
               Err(nb::Error::Other(Error::SecureUnavailable)));
    assert_eq!(t.connect(&secure), Err(Error::SecureUnavailable));
    assert!(!t.is_connected(&secure));
  }

  #[test]
  fn channel_errors_surface_on_send() {
    let mut t = transport();
    channel(&mut t).fail_writes = true;
    let secure = Endpoint::from_addr(addr(1), true);

    assert!(matches!(t.send(Some(&secure), b"a"),
                     Err(nb::Error::Other(Error::Channel(_)))));
  }

  #[test]
  fn connectedness() {
    let mut t = transport();
    let plain = Endpoint::from_addr(addr(1), false);
    let secure = Endpoint::from_addr(addr(1), true);

    assert!(t.is_connected(&plain));
    assert!(!t.is_connected(&secure));

    t.connect(&plain).unwrap();
    assert!(t.plain.take_tx().is_empty());

    t.connect(&secure).unwrap();
    assert_eq!(secure_sock(&t).take_tx(),
               vec![Addrd(ChannelMock::HANDSHAKE.to_vec(), addr(1))]);
    assert!(t.is_connected(&secure));

    t.set_route_available(false);
    assert!(!t.is_connected(&plain));
    assert!(!t.is_connected(&secure));
    t.set_route_available(true);

    t.disconnect(&secure);
    assert!(!t.is_connected(&secure));
  }
}
