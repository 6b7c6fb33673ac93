//! Thin convenience wrappers around UDP sockets.
//!
//! [`UdpSender`] serializes concurrent `send` calls behind an internal
//! mutex, one datagram per call. [`UdpReceiver`] owns a background thread
//! that delivers received datagrams to a user callback in receive order and
//! is stopped by dropping the receiver.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use log::warn;

/// Maximum UDP payload: 64 KiB minus the IPv4 and UDP headers.
const MAX_UDP_PAYLOAD: usize = 65_535 - 20 - 8;

/// How often the receiver thread re-checks whether it should shut down.
const RECEIVE_TIMEOUT: Duration = Duration::from_millis(200);

fn parse_ipv4(address: &str) -> io::Result<Ipv4Addr> {
    address.parse::<Ipv4Addr>().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid IPv4 address '{}'", address),
        )
    })
}

/// Sends datagrams to a fixed destination.
#[derive(Debug)]
pub struct UdpSender {
    socket: Mutex<UdpSocket>,
    destination: SocketAddrV4,
    send_from_port: u16,
}

impl UdpSender {
    /// Binds an ephemeral local socket for sending to `address:port`.
    pub fn new(address: &str, port: u16) -> io::Result<UdpSender> {
        let destination_ip = parse_ipv4(address)?;
        if port == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "destination port must not be 0",
            ));
        }

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        let send_from_port = socket.local_addr()?.port();

        Ok(UdpSender {
            socket: Mutex::new(socket),
            destination: SocketAddrV4::new(destination_ip, port),
            send_from_port,
        })
    }

    /// Sends one datagram; concurrent calls are serialized.
    ///
    /// An empty payload sends nothing, payloads beyond the maximum UDP size
    /// are rejected.
    pub fn send(&self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        if data.len() > MAX_UDP_PAYLOAD {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "datagram exceeds maximum UDP payload size",
            ));
        }

        let socket = self.socket.lock().unwrap_or_else(PoisonError::into_inner);
        socket.send_to(data, self.destination)
    }

    /// The local port datagrams are sent from.
    pub fn send_from_port(&self) -> u16 {
        self.send_from_port
    }
}

/// Receives datagrams on a background thread and hands them to a delegate.
///
/// The delegate runs on the receiver thread and is invoked with the payload,
/// the sender's address, and the receive timestamp, in receive order.
pub struct UdpReceiver {
    running: Arc<AtomicBool>,
    port: u16,
    handle: Option<JoinHandle<()>>,
}

impl UdpReceiver {
    /// Binds `address:port` (joining the group first when `address` is an
    /// IPv4 multicast address) and starts the receiver thread.
    pub fn new<F>(address: &str, port: u16, delegate: F) -> io::Result<UdpReceiver>
    where
        F: Fn(Vec<u8>, SocketAddr, SystemTime) + Send + 'static,
    {
        let ip = parse_ipv4(address)?;

        let socket = if ip.is_multicast() {
            let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))?;
            socket.join_multicast_v4(&ip, &Ipv4Addr::UNSPECIFIED)?;
            socket
        } else {
            UdpSocket::bind((ip, port))?
        };
        // A finite timeout lets the thread notice shutdown.
        socket.set_read_timeout(Some(RECEIVE_TIMEOUT))?;
        let local_port = socket.local_addr()?.port();

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let handle = std::thread::Builder::new()
            .name("udp-receiver".into())
            .spawn(move || {
                let mut buffer = vec![0u8; MAX_UDP_PAYLOAD];
                while thread_running.load(Ordering::Acquire) {
                    match socket.recv_from(&mut buffer) {
                        Ok((len, sender)) => {
                            let received_at = SystemTime::now();
                            delegate(buffer[..len].to_vec(), sender, received_at);
                        }
                        Err(error)
                            if error.kind() == io::ErrorKind::WouldBlock
                                || error.kind() == io::ErrorKind::TimedOut => {}
                        Err(error) => {
                            if thread_running.load(Ordering::Acquire) {
                                warn!("receive failed: {}", error);
                            }
                            break;
                        }
                    }
                }
            })?;

        Ok(UdpReceiver {
            running,
            port: local_port,
            handle: Some(handle),
        })
    }

    /// Whether the receiver thread is still serving datagrams.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// The locally bound port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for UdpReceiver {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn loopback_round_trip() {
        let (tx, rx) = mpsc::channel();
        let receiver = UdpReceiver::new("127.0.0.1", 0, move |data, sender, _at| {
            tx.send((data, sender)).unwrap();
        })
        .unwrap();
        assert!(receiver.is_running());

        let sender = UdpSender::new("127.0.0.1", receiver.port()).unwrap();
        assert_eq!(sender.send(b"Hello World!").unwrap(), 12);

        let (data, from) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(data, b"Hello World!");
        assert_eq!(from.port(), sender.send_from_port());
    }

    #[test]
    fn datagrams_arrive_in_send_order() {
        let (tx, rx) = mpsc::channel();
        let receiver = UdpReceiver::new("127.0.0.1", 0, move |data, _sender, _at| {
            tx.send(data).unwrap();
        })
        .unwrap();

        let sender = UdpSender::new("127.0.0.1", receiver.port()).unwrap();
        for i in 0u8..10 {
            sender.send(&[i]).unwrap();
        }

        for i in 0u8..10 {
            let data = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(data, [i]);
        }
    }

    #[test]
    fn empty_payload_sends_nothing() {
        let sender = UdpSender::new("127.0.0.1", 4242).unwrap();
        assert_eq!(sender.send(&[]).unwrap(), 0);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let sender = UdpSender::new("127.0.0.1", 4242).unwrap();
        let payload = vec![0u8; MAX_UDP_PAYLOAD + 1];
        sender.send(&payload).expect_err("oversized datagram sent");
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        UdpSender::new("not-an-address", 4242).expect_err("bad address accepted");
        UdpSender::new("127.0.0.1", 0).expect_err("port 0 accepted");
    }
}
