// exposed API of channels

use self::future::*;
use super::{
    core,
    once::Once,
};
use std::fmt::{self, Debug, Formatter};


/// Bounded FIFO channel with blocking push and pop, which can be closed
///
/// Handles are cheap to clone, and all clones refer to the same channel. The capacity is fixed
/// for the life of the channel:
///
/// - A capacity of `n > 0` buffers up to `n` items. Pushing into a full channel waits for room,
///   and popping from an empty channel waits for an item.
/// - A capacity of `0` makes a rendezvous channel, which never holds an item: a push only
///   completes by handing its item directly to a pop.
///
/// Closing a channel does not discard buffered items. They can still be popped in order, and only
/// once they are drained does popping report closure by resolving to `None`.
pub struct Channel<T>(pub(crate) core::Channel<T>);

impl<T> Channel<T> {
    /// Create a channel with the given capacity
    pub fn new(capacity: usize) -> Self {
        Channel(core::Channel::new(capacity))
    }

    /// Create a future to push an item into this channel
    ///
    /// Resolves to an error holding the item if the channel is closed before the item is
    /// accepted, even if it was only closed while the push was waiting for room.
    pub fn push(&self, item: T) -> PushFut<T> {
        PushFut(core::Push::new(self.0.clone(), Once::source(&self.0, item), 0))
    }

    /// Create a future to pop an item from this channel
    ///
    /// Resolves to `None` if the channel is closed and empty.
    pub fn pop(&self) -> PopFut<T> {
        PopFut(core::Pop::new(self.0.clone(), Once::sink(&self.0), 0))
    }

    /// Close the channel
    ///
    /// Wakes every waiting push and pop so they can re-evaluate. Waiting pushes fail, waiting pops
    /// receive buffered items and then `None`. Returns false if the channel was already closed, in
    /// which case this does nothing.
    pub fn close(&self) -> bool {
        self.0.close()
    }

    /// Stream of popped items, which ends once the channel is closed and drained
    ///
    /// Each item is popped only when the stream is polled for it. Several streams may pop from
    /// the same channel concurrently, in which case each item goes to only one of them.
    pub fn stream(&self) -> PopStream<T> {
        PopStream {
            channel: Channel(self.0.clone()),
            pop: None,
            terminated: false,
        }
    }

    /// Create a guard which closes this channel when dropped
    pub fn close_on_drop(&self) -> CloseGuard<T> {
        CloseGuard(Channel(self.0.clone()))
    }

    /// Whether the channel has been closed
    pub fn is_closed(&self) -> bool {
        self.0.lock().is_closed()
    }

    /// Number of items currently buffered
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Whether no items are currently buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of items the channel buffers, or 0 for a rendezvous channel
    pub fn capacity(&self) -> usize {
        self.0.lock().capacity()
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Channel(self.0.clone())
    }
}

impl<T> Debug for Channel<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let lock = self.0.lock();
        f.debug_struct("Channel")
            .field("capacity", &lock.capacity())
            .field("len", &lock.len())
            .field("closed", &lock.is_closed())
            .field("waiting_pushers", &lock.waiting_pushers())
            .field("waiting_poppers", &lock.waiting_poppers())
            .finish()
    }
}


/// Guard which closes a [`Channel`] when dropped
///
/// See [`Channel::close_on_drop`].
pub struct CloseGuard<T>(Channel<T>);

impl<T> CloseGuard<T> {
    /// The guarded channel
    pub fn channel(&self) -> &Channel<T> {
        &self.0
    }
}

impl<T> Drop for CloseGuard<T> {
    fn drop(&mut self) {
        self.0.close();
    }
}


// future types for channels.
pub(crate) mod future {
    use super::*;
    use crate::channel::{
        error::PushError,
        once::Resolution,
    };
    use futures::{
        future::FusedFuture,
        stream::{Stream, FusedStream},
        ready,
    };
    use std::{
        future::Future,
        pin::Pin,
        task::{Context, Poll},
    };

    /// Future for pushing into a [`Channel`]
    ///
    /// On a buffered channel, the item is not pushed until this future resolves, and dropping the
    /// future before then aborts the push without side effect on the channel. On a rendezvous
    /// channel, a pop may take the item from a suspended push at any time, after which the push
    /// has happened whether or not the future is polled again.
    pub struct PushFut<T>(pub(super) core::Push<T>);

    impl<T> Future for PushFut<T> {
        type Output = Result<(), PushError<T>>;

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
            let this = self.get_mut();
            // for implementation of FusedFuture
            if this.is_terminated() {
                return Poll::Pending;
            }
            ready!(Pin::new(&mut this.0).poll(cx));
            Poll::Ready(match this.0.once().take_resolution() {
                Some((_, Resolution::Pushed)) => Ok(()),
                Some((_, Resolution::Rejected(item))) => Err(PushError { item }),
                _ => unreachable!("push resolved its cell as a pop (internal bug)"),
            })
        }
    }

    impl<T> PushFut<T> {
        /// Whether this future has already resolved
        pub fn is_terminated(&self) -> bool {
            self.0.is_done()
        }
    }

    impl<T> FusedFuture for PushFut<T> {
        fn is_terminated(&self) -> bool {
            Self::is_terminated(self)
        }
    }

    impl<T> Debug for PushFut<T> {
        fn fmt(&self, f: &mut Formatter) -> fmt::Result {
            f.debug_struct("PushFut")
                .field("terminated", &self.is_terminated())
                .finish_non_exhaustive()
        }
    }


    /// Future for popping from a [`Channel`]
    ///
    /// Resolves to `None` if the channel is closed and empty. On a buffered channel, no item is
    /// dequeued until this future resolves, so dropping it before then leaves the channel
    /// untouched. On a rendezvous channel, a push may hand its item to a suspended pop at any
    /// time, and dropping the pop after that discards the item.
    pub struct PopFut<T>(pub(super) core::Pop<T>);

    impl<T> Future for PopFut<T> {
        type Output = Option<T>;

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
            let this = self.get_mut();
            // for implementation of FusedFuture
            if this.is_terminated() {
                return Poll::Pending;
            }
            ready!(Pin::new(&mut this.0).poll(cx));
            Poll::Ready(match this.0.once().take_resolution() {
                Some((_, Resolution::Popped(item))) => item,
                _ => unreachable!("pop resolved its cell as a push (internal bug)"),
            })
        }
    }

    impl<T> PopFut<T> {
        /// Whether this future has already resolved
        pub fn is_terminated(&self) -> bool {
            self.0.is_done()
        }
    }

    impl<T> FusedFuture for PopFut<T> {
        fn is_terminated(&self) -> bool {
            Self::is_terminated(self)
        }
    }

    impl<T> Debug for PopFut<T> {
        fn fmt(&self, f: &mut Formatter) -> fmt::Result {
            f.debug_struct("PopFut")
                .field("terminated", &self.is_terminated())
                .finish_non_exhaustive()
        }
    }


    /// Stream of items popped from a [`Channel`]
    ///
    /// See [`Channel::stream`].
    pub struct PopStream<T> {
        pub(super) channel: Channel<T>,
        // pop in progress, if the last poll returned pending.
        pub(super) pop: Option<PopFut<T>>,
        pub(super) terminated: bool,
    }

    impl<T> Stream for PopStream<T> {
        type Item = T;

        fn poll_next(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<T>> {
            let this = self.get_mut();
            if this.terminated {
                return Poll::Ready(None);
            }
            let pop = this.pop.get_or_insert_with(|| this.channel.pop());
            let item = ready!(Pin::new(pop).poll(cx));
            this.pop = None;
            if item.is_none() {
                this.terminated = true;
            }
            Poll::Ready(item)
        }
    }

    impl<T> FusedStream for PopStream<T> {
        fn is_terminated(&self) -> bool {
            self.terminated
        }
    }

    impl<T> Debug for PopStream<T> {
        fn fmt(&self, f: &mut Formatter) -> fmt::Result {
            f.debug_struct("PopStream")
                .field("channel", &self.channel)
                .field("terminated", &self.terminated)
                .finish_non_exhaustive()
        }
    }
}


// ==== tests ====
