//! Readiness multiplexer.
//!
//! Thin wrapper over the `polling` crate keyed by raw fd. The OS
//! facility underneath is oneshot, so the dispatcher re-arms every
//! fd's interest ahead of each wait; this wrapper only hides the
//! fd-to-source plumbing.

use std::io;
use std::os::unix::io::{BorrowedFd, RawFd};
use std::time::Duration;

use polling::{Event, Events, Poller};

/// Readiness bits reported for one fd.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub fd: RawFd,
    pub readable: bool,
    pub writable: bool,
}

/// Fd-keyed readiness multiplexer.
pub struct Multiplexer {
    poller: Poller,
    events: Events,
}

impl Multiplexer {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poller: Poller::new()?,
            events: Events::new(),
        })
    }

    /// Start watching `fd`. The caller keeps the fd alive until
    /// [`unregister`](Self::unregister).
    pub fn register(&self, fd: RawFd, readable: bool, writable: bool) -> io::Result<()> {
        // SAFETY: the endpoint owns the socket behind `fd` and
        // removes it from the poller before dropping it.
        unsafe { self.poller.add(fd, interest(fd, readable, writable)) }
    }

    /// Re-arm the interest for an fd already registered.
    pub fn rearm(&self, fd: RawFd, readable: bool, writable: bool) -> io::Result<()> {
        // SAFETY: `fd` is open for at least as long as it stays in
        // the connection table.
        let source = unsafe { BorrowedFd::borrow_raw(fd) };
        self.poller.modify(source, interest(fd, readable, writable))
    }

    pub fn unregister(&self, fd: RawFd) -> io::Result<()> {
        // SAFETY: as in `rearm`.
        let source = unsafe { BorrowedFd::borrow_raw(fd) };
        self.poller.delete(source)
    }

    /// Block up to `timeout_ms` and enumerate the fds that turned
    /// ready. Zero polls without blocking, poll(2) style.
    pub fn wait(&mut self, timeout_ms: u32) -> io::Result<Vec<Readiness>> {
        let timeout = Some(Duration::from_millis(timeout_ms as u64));
        self.events.clear();
        self.poller.wait(&mut self.events, timeout)?;
        Ok(self
            .events
            .iter()
            .map(|ev| Readiness {
                fd: ev.key as RawFd,
                readable: ev.readable,
                writable: ev.writable,
            })
            .collect())
    }
}

fn interest(fd: RawFd, readable: bool, writable: bool) -> Event {
    let key = fd as usize;
    match (readable, writable) {
        (true, true) => Event::all(key),
        (true, false) => Event::readable(key),
        (false, true) => Event::writable(key),
        (false, false) => Event::none(key),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};
    use std::os::unix::io::AsRawFd;

    #[test]
    fn reports_read_readiness() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();

        let mut mux = Multiplexer::new().unwrap();
        mux.register(server.as_raw_fd(), true, false).unwrap();

        // nothing buffered yet
        let ready = mux.wait(50).unwrap();
        assert!(ready.is_empty());

        client.write_all(b"x").unwrap();
        client.flush().unwrap();

        let ready = mux.wait(1000).unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].fd, server.as_raw_fd());
        assert!(ready[0].readable);

        mux.unregister(server.as_raw_fd()).unwrap();
    }

    #[test]
    fn rearm_switches_interest() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (_server, _) = listener.accept().unwrap();

        let mut mux = Multiplexer::new().unwrap();
        let fd = client.as_raw_fd();
        mux.register(fd, false, false).unwrap();

        // a fresh socket is writable once armed for writes
        assert!(mux.wait(50).unwrap().is_empty());
        mux.rearm(fd, false, true).unwrap();
        let ready = mux.wait(1000).unwrap();
        assert_eq!(ready.len(), 1);
        assert!(ready[0].writable);

        mux.unregister(fd).unwrap();
    }
}
