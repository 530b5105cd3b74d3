//! Connection multiplexer for the rtl_tcp server
//!
//! Owns the listening socket and every client connection, and is the single
//! source of truth for which sockets are readable, writable or erroring in
//! the current network cycle.
//!
//! # Readiness
//!
//! Readiness comes from one `poll(2)` call with a zero timeout over the
//! listener and all clients, so the network side never blocks sample
//! acquisition. The result is stored on each [`Client`] until the next
//! [`poll`](ConnectionMux::poll); a client torn down mid-cycle disappears
//! from every set at once because it is removed from the table.
//!
//! # Connection Lifecycle
//!
//! ```text
//! 1. Listener readable → accept exactly one connection
//! 2. Switch the stream to non-blocking, send the 12-byte handshake
//!    (failure closes it before it is ever registered)
//! 3. Each cycle: read at most the bytes missing from the current 5-byte frame
//! 4. First EOF, socket error or failed send → teardown
//! ```
//!
//! Unix only: readiness uses raw file descriptors.

use crate::error::Result;
use crate::streaming::protocol::{COMMAND_SIZE, Command, HANDSHAKE_SIZE};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::unix::io::AsRawFd;

/// Connection identifier, unique for the lifetime of the multiplexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Readiness of one socket for the current cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Ready {
    readable: bool,
    writable: bool,
    erroring: bool,
}

/// In-progress command frame, never holds more than one frame
#[derive(Debug, Default)]
struct FrameBuffer {
    bytes: [u8; COMMAND_SIZE],
    len: usize,
}

impl FrameBuffer {
    /// Unfilled tail of the frame
    fn remaining_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[self.len..]
    }

    /// Decode and clear once full
    fn take_complete(&mut self) -> Option<Command> {
        let cmd = Command::try_decode(&self.bytes[..self.len])?;
        self.len = 0;
        Some(cmd)
    }
}

/// One accepted connection
pub struct Client {
    id: ClientId,
    stream: TcpStream,
    peer: SocketAddr,
    frame: FrameBuffer,
    ready: Ready,
}

impl Client {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Single non-blocking receive sized to complete the current frame
    ///
    /// Returns the number of bytes appended. A zero-length read means the
    /// peer closed and is reported as `UnexpectedEof`.
    fn read_command_bytes(&mut self) -> io::Result<usize> {
        match self.stream.read(self.frame.remaining_mut()) {
            Ok(0) => Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                "peer closed connection",
            )),
            Ok(n) => {
                self.frame.len += n;
                Ok(n)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }
}

/// Snapshot of one readiness poll
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Readiness {
    /// A connection is waiting on the listener
    pub accept_pending: bool,
    pub readable: Vec<ClientId>,
    pub writable: Vec<ClientId>,
    pub erroring: Vec<ClientId>,
}

/// A command frame completed during [`ConnectionMux::receive`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inbound {
    pub client: ClientId,
    pub peer: SocketAddr,
    pub command: Command,
}

/// Listener plus client table with zero-timeout readiness polling
pub struct ConnectionMux {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    listener_ready: bool,
    clients: Vec<Client>,
    handshake: [u8; HANDSHAKE_SIZE],
    next_id: u64,
    /// Reused between polls to avoid allocation per cycle
    pollfds: Vec<libc::pollfd>,
}

impl ConnectionMux {
    /// Bind a non-blocking listener
    ///
    /// `std` enables `SO_REUSEADDR` on Unix listeners, so a restarted server
    /// can rebind while old connections sit in TIME_WAIT.
    pub fn bind<A: ToSocketAddrs>(addr: A, handshake: [u8; HANDSHAKE_SIZE]) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        log::info!("Listening on {}", local_addr);

        Ok(Self {
            listener: Some(listener),
            local_addr,
            listener_ready: false,
            clients: Vec::new(),
            handshake,
            next_id: 0,
            pollfds: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn clients(&self) -> impl Iterator<Item = &Client> {
        self.clients.iter()
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// Zero-timeout readiness check over the listener and every client
    pub fn poll(&mut self) -> Result<Readiness> {
        self.pollfds.clear();
        if let Some(listener) = &self.listener {
            self.pollfds.push(libc::pollfd {
                fd: listener.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            });
        }
        for client in &self.clients {
            self.pollfds.push(libc::pollfd {
                fd: client.stream.as_raw_fd(),
                events: libc::POLLIN | libc::POLLOUT,
                revents: 0,
            });
        }

        // SAFETY: pollfds is a valid, exclusively borrowed array of
        // `pollfds.len()` entries for the duration of the call.
        let rc = unsafe {
            libc::poll(
                self.pollfds.as_mut_ptr(),
                self.pollfds.len() as libc::nfds_t,
                0,
            )
        };

        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                self.clear_readiness();
                return Ok(Readiness::default());
            }
            return Err(err.into());
        }

        let mut readiness = Readiness::default();
        let mut revents = self.pollfds.iter().map(|p| p.revents);

        self.listener_ready = false;
        if self.listener.is_some() {
            let r = revents.next().unwrap_or(0);
            self.listener_ready = r & libc::POLLIN != 0;
            readiness.accept_pending = self.listener_ready;
        }

        for (client, r) in self.clients.iter_mut().zip(revents) {
            client.ready = Ready {
                readable: r & libc::POLLIN != 0,
                writable: r & libc::POLLOUT != 0,
                erroring: r & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0,
            };
            if client.ready.readable {
                readiness.readable.push(client.id);
            }
            if client.ready.writable {
                readiness.writable.push(client.id);
            }
            if client.ready.erroring {
                readiness.erroring.push(client.id);
            }
        }

        if rc > 0 {
            log::trace!(
                "poll: accept={} readable={} writable={} erroring={}",
                readiness.accept_pending,
                readiness.readable.len(),
                readiness.writable.len(),
                readiness.erroring.len()
            );
        }

        Ok(readiness)
    }

    fn clear_readiness(&mut self) {
        self.listener_ready = false;
        for client in &mut self.clients {
            client.ready = Ready::default();
        }
    }

    /// Tear down every client flagged as erroring by the last poll
    pub fn teardown_erroring(&mut self) -> usize {
        let erroring: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|c| c.ready.erroring)
            .map(|c| c.id)
            .collect();
        for &id in &erroring {
            self.teardown(id, "socket error");
        }
        erroring.len()
    }

    /// Accept one pending connection if the last poll saw one
    ///
    /// The new client gets the handshake immediately. It has no readiness
    /// until the next poll, so it is neither written to nor read from in the
    /// cycle that accepted it.
    pub fn accept_if_ready(&mut self) -> Option<ClientId> {
        if !std::mem::take(&mut self.listener_ready) {
            return None;
        }
        let listener = self.listener.as_ref()?;

        let (mut stream, peer) = match listener.accept() {
            Ok(conn) => conn,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return None,
            Err(e) => {
                log::warn!("Error accepting client connection: {}", e);
                return None;
            }
        };

        log::info!("New connection from {}", peer);

        if let Err(e) = stream.set_nonblocking(true) {
            log::warn!("Closing connection from {}: set_nonblocking failed: {}", peer, e);
            return None;
        }
        if let Err(e) = stream.write_all(&self.handshake) {
            log::info!("Closing connection from {}: handshake failed: {}", peer, e);
            return None;
        }

        let id = ClientId(self.next_id);
        self.next_id += 1;
        self.clients.push(Client {
            id,
            stream,
            peer,
            frame: FrameBuffer::default(),
            ready: Ready::default(),
        });
        Some(id)
    }

    /// Read command bytes from every readable client
    ///
    /// Each client gets one receive of at most the bytes still missing from
    /// its current frame, so at most one frame per client completes per
    /// cycle; any further bytes stay queued in the socket.
    pub fn receive(&mut self) -> Vec<Inbound> {
        let mut inbound = Vec::new();
        let mut failed = Vec::new();

        for client in self.clients.iter_mut().filter(|c| c.ready.readable) {
            match client.read_command_bytes() {
                Ok(_) => {
                    if let Some(command) = client.frame.take_complete() {
                        inbound.push(Inbound {
                            client: client.id,
                            peer: client.peer,
                            command,
                        });
                    }
                }
                Err(e) => failed.push((client.id, e)),
            }
        }

        for (id, e) in failed {
            let reason = if e.kind() == ErrorKind::UnexpectedEof {
                "peer closed".to_string()
            } else {
                format!("read error: {}", e)
            };
            self.teardown(id, &reason);
        }

        inbound
    }

    /// Clients writable in the last poll and not erroring
    pub fn writable(&self) -> Vec<ClientId> {
        self.clients
            .iter()
            .filter(|c| c.ready.writable && !c.ready.erroring)
            .map(|c| c.id)
            .collect()
    }

    /// Send all of `data` without blocking; any failure tears the client down
    ///
    /// A send that cannot complete immediately counts as a failure: the
    /// stream would otherwise be left misaligned mid-sample.
    pub fn write(&mut self, id: ClientId, data: &[u8]) -> bool {
        let Some(client) = self.clients.iter_mut().find(|c| c.id == id) else {
            return false;
        };
        match client.stream.write_all(data) {
            Ok(()) => true,
            Err(e) => {
                self.teardown(id, &format!("write error: {}", e));
                false
            }
        }
    }

    /// Drop a client from all sets and close its socket
    pub fn teardown(&mut self, id: ClientId, reason: &str) {
        let Some(index) = self.clients.iter().position(|c| c.id == id) else {
            return;
        };
        let client = self.clients.remove(index);
        log::info!("Closing connection from {}", client.peer);
        log::debug!("Client {} ({}) torn down: {}", client.id, client.peer, reason);
        let _ = client.stream.shutdown(Shutdown::Both);
    }

    /// Close every client and the listener
    pub fn shutdown_all(&mut self) {
        for client in self.clients.drain(..) {
            log::info!("Closing connection from {}", client.peer);
            let _ = client.stream.shutdown(Shutdown::Both);
        }
        if self.listener.take().is_some() {
            log::info!("Listener on {} closed", self.local_addr);
        }
        self.listener_ready = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::protocol::encode_handshake;
    use std::thread;
    use std::time::Duration;

    fn bind_local() -> ConnectionMux {
        ConnectionMux::bind("127.0.0.1:0", encode_handshake()).unwrap()
    }

    /// One network cycle without broadcast
    fn cycle(mux: &mut ConnectionMux) -> Vec<Command> {
        mux.poll().unwrap();
        mux.teardown_erroring();
        mux.accept_if_ready();
        mux.receive().into_iter().map(|i| i.command).collect()
    }

    /// Run cycles until `done` holds or ~2s pass
    fn pump_until(
        mux: &mut ConnectionMux,
        commands: &mut Vec<Command>,
        mut done: impl FnMut(&ConnectionMux, &[Command]) -> bool,
    ) -> bool {
        for _ in 0..400 {
            commands.extend(cycle(mux));
            if done(mux, commands) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn connect(mux: &mut ConnectionMux) -> TcpStream {
        let before = mux.client_count();
        let client = TcpStream::connect(mux.local_addr()).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut cmds = Vec::new();
        assert!(pump_until(mux, &mut cmds, |m, _| m.client_count() > before));
        client
    }

    #[test]
    fn test_accept_sends_handshake() {
        let mut mux = bind_local();
        let mut client = connect(&mut mux);

        let mut hs = [0u8; HANDSHAKE_SIZE];
        client.read_exact(&mut hs).unwrap();
        assert_eq!(hs, encode_handshake());
        assert_eq!(mux.client_count(), 1);
    }

    #[test]
    fn test_no_accept_without_pending_connection() {
        let mut mux = bind_local();
        let readiness = mux.poll().unwrap();
        assert!(!readiness.accept_pending);
        assert!(mux.accept_if_ready().is_none());
        assert_eq!(mux.client_count(), 0);
    }

    #[test]
    fn test_frame_assembled_across_chunks() {
        let mut mux = bind_local();
        let mut client = connect(&mut mux);
        let mut commands = Vec::new();

        client.write_all(&[0x01, 0x06]).unwrap();
        for _ in 0..10 {
            commands.extend(cycle(&mut mux));
            thread::sleep(Duration::from_millis(2));
        }
        assert!(commands.is_empty());

        client.write_all(&[0x1a, 0x80]).unwrap();
        for _ in 0..10 {
            commands.extend(cycle(&mut mux));
            thread::sleep(Duration::from_millis(2));
        }
        assert!(commands.is_empty());

        client.write_all(&[0x40]).unwrap();
        assert!(pump_until(&mut mux, &mut commands, |_, c| !c.is_empty()));
        assert_eq!(commands, vec![Command::new(0x01, 102_400_064)]);
    }

    #[test]
    fn test_spliced_frames_dispatch_once_each() {
        let mut mux = bind_local();
        let mut client = connect(&mut mux);
        let mut commands = Vec::new();

        // One and a half frames in a single send
        let mut bytes = Command::new(0x02, 2_400_000).encode().to_vec();
        bytes.extend_from_slice(&[0x04, 0x00]);
        client.write_all(&bytes).unwrap();

        assert!(pump_until(&mut mux, &mut commands, |_, c| !c.is_empty()));
        for _ in 0..10 {
            commands.extend(cycle(&mut mux));
        }
        assert_eq!(commands, vec![Command::new(0x02, 2_400_000)]);

        client.write_all(&[0x00, 0x01, 0x2c]).unwrap();
        assert!(pump_until(&mut mux, &mut commands, |_, c| c.len() == 2));
        assert_eq!(commands[1], Command::new(0x04, 300));
    }

    #[test]
    fn test_eof_tears_down_client() {
        let mut mux = bind_local();
        let client = connect(&mut mux);
        drop(client);

        let mut commands = Vec::new();
        assert!(pump_until(&mut mux, &mut commands, |m, _| m.client_count() == 0));
    }

    #[test]
    fn test_write_reaches_writable_client() {
        let mut mux = bind_local();
        let mut client = connect(&mut mux);

        let mut hs = [0u8; HANDSHAKE_SIZE];
        client.read_exact(&mut hs).unwrap();

        let readiness = mux.poll().unwrap();
        assert_eq!(readiness.writable.len(), 1);
        let id = mux.writable()[0];
        assert!(mux.write(id, b"iqiq"));

        let mut data = [0u8; 4];
        client.read_exact(&mut data).unwrap();
        assert_eq!(&data, b"iqiq");
    }

    #[test]
    fn test_write_to_unknown_client_is_noop() {
        let mut mux = bind_local();
        assert!(!mux.write(ClientId(99), b"data"));
    }

    #[test]
    fn test_teardown_leaves_other_clients() {
        let mut mux = bind_local();
        let _a = connect(&mut mux);
        let mut b = connect(&mut mux);
        let ids: Vec<ClientId> = mux.clients().map(|c| c.id()).collect();

        mux.teardown(ids[0], "test");
        mux.teardown(ids[0], "test again");
        assert_eq!(mux.client_count(), 1);

        mux.poll().unwrap();
        assert_eq!(mux.writable(), vec![ids[1]]);
        assert!(mux.write(ids[1], b"ok"));

        let mut buf = [0u8; HANDSHAKE_SIZE + 2];
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[HANDSHAKE_SIZE..], b"ok");
    }

    #[test]
    fn test_shutdown_all_closes_everything() {
        let mut mux = bind_local();
        let mut client = connect(&mut mux);

        mux.shutdown_all();
        assert_eq!(mux.client_count(), 0);
        assert!(!mux.is_listening());

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, encode_handshake());

        let readiness = mux.poll().unwrap();
        assert_eq!(readiness, Readiness::default());
    }
}
