use ::std::io;
use ::std::net::UdpSocket;

use no_std_net::SocketAddr;

use crate::net::{Addrd, Socket};

mod convert;

impl Socket for UdpSocket {
  type Error = io::Error;

  fn local_addr(&self) -> SocketAddr {
    UdpSocket::local_addr(self).map(convert::from_std)
                               .unwrap_or_else(|_| {
                                 SocketAddr::new(no_std_net::Ipv6Addr::UNSPECIFIED.into(), 0)
                               })
  }

  fn bind_raw(addr: SocketAddr) -> Result<Self, Self::Error> {
    let sock = UdpSocket::bind(convert::to_std(addr))?;
    sock.set_nonblocking(true)?;
    log::debug!("bound {:?}", sock.local_addr());
    Ok(sock)
  }

  fn send(&self, msg: Addrd<&[u8]>) -> nb::Result<(), Self::Error> {
    self.send_to(msg.data(), convert::to_std(msg.addr()))
        .map(|_| ())
        .map_err(convert::io_to_nb)
  }

  fn recv(&self, buffer: &mut [u8]) -> nb::Result<Addrd<usize>, Self::Error> {
    self.recv_from(buffer)
        .map(|(n, addr)| Addrd(n, convert::from_std(addr)))
        .map_err(convert::io_to_nb)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn loopback() {
    let local = "127.0.0.1:0".parse().unwrap();
    let a = <UdpSocket as Socket>::bind_raw(local).unwrap();
    let b = <UdpSocket as Socket>::bind_raw(local).unwrap();

    let mut buf = [0u8; 16];
    assert!(matches!(Socket::recv(&b, &mut buf), Err(nb::Error::WouldBlock)));

    Socket::send(&a, Addrd(b"ping".as_ref(), Socket::local_addr(&b))).unwrap();

    let Addrd(n, from) = nb::block!(Socket::recv(&b, &mut buf)).unwrap();
    assert_eq!(&buf[..n], b"ping");
    assert_eq!(from, Socket::local_addr(&a));
  }
}
