use ::std::io;
use ::std::net as std_net;

use no_std_net as no_std;

pub(crate) fn io_to_nb(err: io::Error) -> nb::Error<io::Error> {
  match err.kind() {
    | io::ErrorKind::WouldBlock => nb::Error::WouldBlock,
    | _ => nb::Error::Other(err),
  }
}

pub(crate) fn to_std(addr: no_std::SocketAddr) -> std_net::SocketAddr {
  match addr {
    | no_std::SocketAddr::V4(v4) => {
      let [a, b, c, d] = v4.ip().octets();
      std_net::SocketAddr::V4(std_net::SocketAddrV4::new(std_net::Ipv4Addr::new(a, b, c, d),
                                                         v4.port()))
    },
    | no_std::SocketAddr::V6(v6) => {
      let [a, b, c, d, e, f, g, h] = v6.ip().segments();
      std_net::SocketAddr::V6(std_net::SocketAddrV6::new(std_net::Ipv6Addr::new(a, b, c, d, e, f, g, h),
                                                         v6.port(),
                                                         v6.flowinfo(),
                                                         v6.scope_id()))
    },
  }
}

pub(crate) fn from_std(addr: std_net::SocketAddr) -> no_std::SocketAddr {
  match addr {
    | std_net::SocketAddr::V4(v4) => {
      let [a, b, c, d] = v4.ip().octets();
      no_std::SocketAddr::V4(no_std::SocketAddrV4::new(no_std::Ipv4Addr::new(a, b, c, d),
                                                       v4.port()))
    },
    | std_net::SocketAddr::V6(v6) => {
      let [a, b, c, d, e, f, g, h] = v6.ip().segments();
      no_std::SocketAddr::V6(no_std::SocketAddrV6::new(no_std::Ipv6Addr::new(a, b, c, d, e, f, g, h),
                                                       v6.port(),
                                                       v6.flowinfo(),
                                                       v6.scope_id()))
    },
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn addrs_survive_the_trip() {
    let v6: no_std::SocketAddr = "[fe80::1]:5683".parse().unwrap();
    let v4: no_std::SocketAddr = "192.168.0.1:5684".parse().unwrap();

    assert_eq!(from_std(to_std(v6)), v6);
    assert_eq!(from_std(to_std(v4)), v4);
    assert_eq!(to_std(v4), "192.168.0.1:5684".parse::<std_net::SocketAddr>().unwrap());
  }

  #[test]
  fn would_block_is_not_an_error() {
    assert!(matches!(io_to_nb(io::Error::from(io::ErrorKind::WouldBlock)),
                     nb::Error::WouldBlock));
    assert!(matches!(io_to_nb(io::Error::from(io::ErrorKind::Other)),
                     nb::Error::Other(_)));
  }
}
