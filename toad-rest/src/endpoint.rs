use core::fmt;
use core::str::FromStr;

use no_std_net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

/// Default port for plaintext CoAP
pub const DEFAULT_PORT: u16 = 5683;

/// Default port for CoAP over DTLS
pub const DEFAULT_SECURE_PORT: u16 = 5684;

/// A peer we exchange messages with; the triple of
/// network address, port and whether the conversation is secured with DTLS.
///
/// Two endpoints are equal only if all three match; the same host & port
/// reached over plaintext and over DTLS are different peers.
///
/// IPv4 peers are stored as [IPv4-mapped](https://datatracker.ietf.org/doc/html/rfc4291#section-2.5.5.2)
/// IPv6 addresses.
///
/// ```
/// use toad_rest::endpoint::Endpoint;
///
/// let ep: Endpoint = "coap://[2001:db8::1]:5683".parse().unwrap();
/// assert_eq!(ep.port(), 5683);
/// assert!(!ep.is_secure());
///
/// let secure: Endpoint = "coaps://[2001:db8::1]".parse().unwrap();
/// assert_eq!(secure.port(), 5684);
/// assert!(secure.is_secure());
///
/// assert_ne!(ep, secure);
/// assert!(secure.to_string().starts_with("coaps://["));
/// assert_eq!(secure.to_string().parse::<Endpoint>(), Ok(secure));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
  addr: Ipv6Addr,
  port: u16,
  secure: bool,
}

/// Errors encounterable parsing an [`Endpoint`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParseError {
  /// The text had a `scheme://` prefix other than `coap://` or `coaps://`
  UnsupportedScheme,
  /// A scheme was present but the address was not enclosed in `[` `]`
  MissingBrackets,
  /// The address was bracketed, but had no scheme
  MissingScheme,
  /// The address was not a valid IPv6 or IPv4 address
  InvalidAddress,
  /// The text after `]:` was not a valid port
  InvalidPort,
}

impl Endpoint {
  /// Create an endpoint
  pub const fn new(addr: Ipv6Addr, port: u16, secure: bool) -> Self {
    Self { addr,
           port,
           secure }
  }

  /// Create an endpoint from the source address of a datagram
  /// that arrived on the plaintext or secure socket.
  pub fn from_addr(addr: SocketAddr, secure: bool) -> Self {
    Self { addr: v6(addr.ip()),
           port: addr.port(),
           secure }
  }

  /// Parse an endpoint from text.
  ///
  /// Accepted forms:
  ///  - `coap://[<addr>]:<port>` and `coaps://[<addr>]:<port>`
  ///  - `coap://[<addr>]` (port 5683)
  ///  - `coaps://[<addr>]` (port 5684)
  ///  - a bare `<addr>` (port 5683, plaintext)
  ///
  /// A path following the authority (`coap://[::1]:5683/rd`) is ignored.
  pub fn parse(text: &str) -> Result<Self, ParseError> {
    let (rest, secure) = if let Some(rest) = text.strip_prefix("coaps://") {
      (rest, true)
    } else if let Some(rest) = text.strip_prefix("coap://") {
      (rest, false)
    } else if text.contains("://") {
      return Err(ParseError::UnsupportedScheme);
    } else if text.starts_with('[') {
      return Err(ParseError::MissingScheme);
    } else {
      return IpAddr::from_str(text).map(|ip| Self::new(v6(ip), DEFAULT_PORT, false))
                                   .map_err(|_| ParseError::InvalidAddress);
    };

    let rest = rest.strip_prefix('[').ok_or(ParseError::MissingBrackets)?;
    let end = rest.find(']').ok_or(ParseError::MissingBrackets)?;

    let addr = IpAddr::from_str(&rest[..end]).map(v6)
                                             .map_err(|_| ParseError::InvalidAddress)?;

    let authority_rest = &rest[end + 1..];
    let port = match authority_rest.strip_prefix(':') {
      | Some(port) => {
        let port = port.split('/').next().unwrap_or(port);
        port.parse::<u16>().map_err(|_| ParseError::InvalidPort)?
      },
      | None if authority_rest.is_empty() || authority_rest.starts_with('/') => {
        if secure {
          DEFAULT_SECURE_PORT
        } else {
          DEFAULT_PORT
        }
      },
      | None => return Err(ParseError::InvalidPort),
    };

    Ok(Self::new(addr, port, secure))
  }

  /// The peer's address
  pub const fn addr(&self) -> Ipv6Addr {
    self.addr
  }

  /// The peer's port
  pub const fn port(&self) -> u16 {
    self.port
  }

  /// Is this peer reached through the secure channel?
  pub const fn is_secure(&self) -> bool {
    self.secure
  }

  /// Copy this endpoint with a different security flag
  pub const fn with_secure(self, secure: bool) -> Self {
    Self { secure, ..self }
  }

  /// Socket address of the peer, unmapping IPv4-mapped addresses.
  pub fn socket_addr(&self) -> SocketAddr {
    match ipv4_mapped(&self.addr) {
      | Some(v4) => SocketAddr::V4(SocketAddrV4::new(v4, self.port)),
      | None => SocketAddr::V6(SocketAddrV6::new(self.addr, self.port, 0, 0)),
    }
  }

  /// The URI scheme of this endpoint
  pub const fn scheme(&self) -> &'static str {
    if self.secure {
      "coaps"
    } else {
      "coap"
    }
  }
}

impl FromStr for Endpoint {
  type Err = ParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl fmt::Display for Endpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}://[{}]:{}", self.scheme(), self.addr, self.port)
  }
}

fn v6(ip: IpAddr) -> Ipv6Addr {
  match ip {
    | IpAddr::V6(ip) => ip,
    | IpAddr::V4(ip) => {
      let [a, b, c, d] = ip.octets();
      Ipv6Addr::new(0,
                    0,
                    0,
                    0,
                    0,
                    0xffff,
                    u16::from_be_bytes([a, b]),
                    u16::from_be_bytes([c, d]))
    },
  }
}

fn ipv4_mapped(ip: &Ipv6Addr) -> Option<Ipv4Addr> {
  match ip.segments() {
    | [0, 0, 0, 0, 0, 0xffff, ab, cd] => {
      let [a, b] = ab.to_be_bytes();
      let [c, d] = cd.to_be_bytes();
      Some(Ipv4Addr::new(a, b, c, d))
    },
    | _ => None,
  }
}

#[cfg(test)]
mod test {
  use std_alloc::string::ToString;

  use super::*;

  fn db8_1() -> Ipv6Addr {
    Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1)
  }

  #[test]
  fn parse_explicit_port() {
    let ep = Endpoint::parse("coap://[2001:db8::1]:5683").unwrap();
    assert_eq!(ep, Endpoint::new(db8_1(), 5683, false));

    let ep = Endpoint::parse("coap://[2001:db8::1]:61616").unwrap();
    assert_eq!(ep.port(), 61616);
  }

  #[test]
  fn parse_default_ports() {
    assert_eq!(Endpoint::parse("coap://[2001:db8::1]").unwrap(),
               Endpoint::new(db8_1(), DEFAULT_PORT, false));
    assert_eq!(Endpoint::parse("coaps://[2001:db8::1]").unwrap(),
               Endpoint::new(db8_1(), DEFAULT_SECURE_PORT, true));
  }

  #[test]
  fn coaps_with_explicit_port_is_secure() {
    let ep = Endpoint::parse("coaps://[2001:db8::1]:7000").unwrap();
    assert!(ep.is_secure());
    assert_eq!(ep.port(), 7000);
  }

  #[test]
  fn parse_bare_address() {
    assert_eq!(Endpoint::parse("2001:db8::1").unwrap(),
               Endpoint::new(db8_1(), DEFAULT_PORT, false));
  }

  #[test]
  fn parse_ignores_path() {
    assert_eq!(Endpoint::parse("coap://[2001:db8::1]:5685/rd").unwrap(),
               Endpoint::new(db8_1(), 5685, false));
    assert_eq!(Endpoint::parse("coaps://[2001:db8::1]/bs").unwrap(),
               Endpoint::new(db8_1(), DEFAULT_SECURE_PORT, true));
  }

  #[test]
  fn parse_errors() {
    assert_eq!(Endpoint::parse("coap://2001:db8::1"),
               Err(ParseError::MissingBrackets));
    assert_eq!(Endpoint::parse("coap://[2001:db8::1"),
               Err(ParseError::MissingBrackets));
    assert_eq!(Endpoint::parse("[2001:db8::1]:5683"),
               Err(ParseError::MissingScheme));
    assert_eq!(Endpoint::parse("http://[2001:db8::1]"),
               Err(ParseError::UnsupportedScheme));
    assert_eq!(Endpoint::parse("coap://[not an address]"),
               Err(ParseError::InvalidAddress));
    assert_eq!(Endpoint::parse("coap://[2001:db8::1]:http"),
               Err(ParseError::InvalidPort));
    assert_eq!(Endpoint::parse("coap://[2001:db8::1]:70000"),
               Err(ParseError::InvalidPort));
    assert_eq!(Endpoint::parse("coap://[2001:db8::1]junk"),
               Err(ParseError::InvalidPort));
    assert_eq!(Endpoint::parse(""), Err(ParseError::InvalidAddress));
  }

  #[test]
  fn format_round_trips() {
    for ep in [Endpoint::new(db8_1(), 5683, false),
               Endpoint::new(db8_1(), 5684, true),
               Endpoint::new(db8_1(), 9, true),
               Endpoint::from_addr("10.0.0.7:1234".parse().unwrap(), false)]
    {
      assert_eq!(Endpoint::parse(&ep.to_string()), Ok(ep));
    }
  }

  #[test]
  fn ipv4_is_mapped_and_unmapped() {
    let sock: SocketAddr = "192.168.1.20:5683".parse().unwrap();
    let ep = Endpoint::from_addr(sock, false);

    assert_eq!(ep.addr().segments()[5], 0xffff);
    assert_eq!(ep.socket_addr(), sock);
    assert_eq!(Endpoint::parse("192.168.1.20").unwrap(), ep);
  }

  #[test]
  fn v6_socket_addr() {
    let ep = Endpoint::new(db8_1(), 5683, false);
    assert_eq!(ep.socket_addr(),
               SocketAddr::V6(SocketAddrV6::new(db8_1(), 5683, 0, 0)));
  }

  #[test]
  fn equality_considers_security() {
    let plain = Endpoint::new(db8_1(), 5684, false);
    assert_ne!(plain, plain.with_secure(true));
    assert_eq!(plain, plain.with_secure(true).with_secure(false));
  }
}
