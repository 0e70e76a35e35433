use crate::ids::Handle;
use crate::ring_buffer::RingBuffer;
use crate::wait_queue::{BlockReason, Scheduler, WaitQueue};
use core::task::Poll;
use kernel_info::memory::PIPE_BUFFER_LEN;

/// Bounded byte stream between processes.
///
/// Every time data goes in, all readers are woken; every time data comes
/// out, all writers are. Each woken process counts as unfulfilled until it
/// runs again, and the pipe cannot be reclaimed in the meantime.
#[derive(Debug)]
pub struct Pipe {
    handle: Handle,
    buffer: RingBuffer,
    readers: WaitQueue,
    writers: WaitQueue,
    unfulfilled: usize,
}

impl Pipe {
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self::with_capacity(handle, PIPE_BUFFER_LEN)
    }

    #[must_use]
    pub fn with_capacity(handle: Handle, capacity: usize) -> Self {
        Self {
            handle,
            buffer: RingBuffer::new(capacity),
            readers: WaitQueue::new(),
            writers: WaitQueue::new(),
            unfulfilled: 0,
        }
    }

    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.handle
    }

    /// Bytes written and not yet read.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[must_use]
    pub const fn readers(&self) -> &WaitQueue {
        &self.readers
    }

    #[must_use]
    pub const fn writers(&self) -> &WaitQueue {
        &self.writers
    }

    #[must_use]
    pub const fn unfulfilled(&self) -> usize {
        self.unfulfilled
    }

    /// Writes all of `data`, blocking whenever the buffer is full.
    ///
    /// `done` counts the bytes delivered so far and must start at zero and
    /// be carried between calls. Ready with `data.len()` once everything is
    /// in the buffer.
    pub fn write<S: Scheduler + ?Sized>(
        &mut self,
        sched: &mut S,
        data: &[u8],
        done: &mut usize,
        resumed: bool,
    ) -> Poll<usize> {
        if resumed {
            self.unfulfilled = self.unfulfilled.saturating_sub(1);
        }

        let written = self.buffer.write(&data[*done..]);
        *done += written;
        if written > 0 {
            self.unfulfilled += sched.unblock_all(&mut self.readers);
        }

        if *done < data.len() {
            sched.block(&mut self.writers, BlockReason::PipeWrite(self.handle));
            Poll::Pending
        } else {
            Poll::Ready(data.len())
        }
    }

    /// Reads what is available, up to `buf.len()`, blocking while empty.
    pub fn read<S: Scheduler + ?Sized>(
        &mut self,
        sched: &mut S,
        buf: &mut [u8],
        resumed: bool,
    ) -> Poll<usize> {
        if resumed {
            self.unfulfilled = self.unfulfilled.saturating_sub(1);
        }
        if buf.is_empty() {
            return Poll::Ready(0);
        }

        let read = self.buffer.read(buf);
        if read == 0 {
            sched.block(&mut self.readers, BlockReason::PipeRead(self.handle));
            return Poll::Pending;
        }

        self.unfulfilled += sched.unblock_all(&mut self.writers);
        Poll::Ready(read)
    }

    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.readers.is_empty() && self.writers.is_empty() && self.unfulfilled == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Pid;
    use crate::testing::FakeScheduler;

    #[test]
    fn short_read_leaves_the_rest() {
        let mut s = FakeScheduler::new(1);
        let mut pipe = Pipe::new(Handle::new(0));
        let mut done = 0;
        assert_eq!(pipe.write(&mut s, b"hello", &mut done, false), Poll::Ready(5));

        let mut buf = [0u8; 3];
        assert_eq!(pipe.read(&mut s, &mut buf, false), Poll::Ready(3));
        assert_eq!(&buf, b"hel");
        let mut buf = [0u8; 5];
        assert_eq!(pipe.read(&mut s, &mut buf, false), Poll::Ready(2));
        assert_eq!(&buf[..2], b"lo");
        assert!(pipe.is_empty());
        assert!(pipe.is_quiescent());
    }

    #[test]
    fn reader_blocks_on_empty_and_counts_as_unfulfilled_when_woken() {
        let mut s = FakeScheduler::new(2);
        let mut pipe = Pipe::new(Handle::new(4));
        let mut buf = [0u8; 8];
        assert!(pipe.read(&mut s, &mut buf, false).is_pending());
        assert_eq!(s.blocked.get(&Pid::new(2)), Some(&BlockReason::PipeRead(Handle::new(4))));

        s.run(1);
        let mut done = 0;
        let _ = pipe.write(&mut s, b"x", &mut done, false);
        assert_eq!(s.ready, [Pid::new(2)]);
        assert_eq!(pipe.unfulfilled(), 1);
        assert!(!pipe.is_quiescent());

        s.run(2);
        assert_eq!(pipe.read(&mut s, &mut buf, true), Poll::Ready(1));
        assert!(pipe.is_quiescent());
    }

    #[test]
    fn writer_blocks_when_full_and_finishes_after_a_read() {
        let mut s = FakeScheduler::new(1);
        let mut pipe = Pipe::with_capacity(Handle::new(0), 4);
        let mut done = 0;
        assert!(pipe.write(&mut s, b"abcdef", &mut done, false).is_pending());
        assert_eq!(done, 4);

        s.run(2);
        let mut buf = [0u8; 3];
        assert_eq!(pipe.read(&mut s, &mut buf, false), Poll::Ready(3));
        assert_eq!(s.ready, [Pid::new(1)]);

        s.run(1);
        assert_eq!(pipe.write(&mut s, b"abcdef", &mut done, true), Poll::Ready(6));
        let mut rest = [0u8; 8];
        assert_eq!(pipe.read(&mut s, &mut rest, false), Poll::Ready(3));
        assert_eq!(&rest[..3], b"def");
    }
}
