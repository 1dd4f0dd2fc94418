//! Locked stream for embedding callers.
//!
//! The engine itself is single-threaded and works on [`ByteStream`]
//! directly. An application that hands a buffer to a foreign thread
//! wraps it here; every access then runs under a scoped lock.

use parking_lot::Mutex;

use super::ByteStream;
use crate::error::StreamError;

/// A [`ByteStream`] behind a mutex.
#[derive(Debug, Default)]
pub struct SharedStream {
    inner: Mutex<ByteStream>,
}

impl SharedStream {
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ByteStream::new()),
        }
    }

    /// Run `f` on the stream under the lock, blocking until it is
    /// acquired.
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut ByteStream) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// Run `f` under the lock if it can be taken right away,
    /// otherwise report [`StreamError::Busy`].
    #[inline]
    pub fn try_with<R>(&self, f: impl FnOnce(&mut ByteStream) -> R) -> Result<R, StreamError> {
        match self.inner.try_lock() {
            Some(mut guard) => Ok(f(&mut guard)),
            None => Err(StreamError::Busy),
        }
    }

    #[inline]
    pub fn len(&self) -> usize { self.inner.lock().len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.inner.lock().is_empty() }

    /// Append a run of bytes.
    #[inline]
    pub fn push_back_slice(&self, source: &[u8]) {
        self.inner.lock().push_back_slice(source);
    }

    /// Destructive read from the front, see [`ByteStream::pull`].
    #[inline]
    pub fn pull(&self, destination: &mut [u8], offset: usize) -> Result<usize, StreamError> {
        self.inner.lock().pull(destination, offset)
    }

    /// Swap the guarded stream out wholesale.
    #[inline]
    pub fn replace(&self, stream: ByteStream) -> ByteStream {
        std::mem::replace(&mut self.inner.lock(), stream)
    }
}

impl From<ByteStream> for SharedStream {
    fn from(stream: ByteStream) -> Self {
        Self {
            inner: Mutex::new(stream),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scoped_access() {
        let s = SharedStream::new();
        s.push_back_slice(b"abc");
        assert_eq!(s.len(), 3);

        let sum = s.with(|inner| inner.to_vec().iter().map(|b| *b as u32).sum::<u32>());
        assert_eq!(sum, 97 + 98 + 99);
    }

    #[test]
    fn try_with_reports_busy() {
        let s = SharedStream::new();
        s.with(|_| {
            // the lock is held here, a reentrant try must not block
            assert_eq!(s.try_with(|_| ()), Err(StreamError::Busy));
        });
        assert!(s.try_with(|_| ()).is_ok());
    }
}
