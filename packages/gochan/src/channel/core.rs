// channel shared state and the wait loops. the exposed API is a convenience wrapper around this.
//
// push and pop are each a loop of the form "while the channel blocks this operation, suspend on
// the corresponding wait queue, then claim the cell". they are written as futures whose `poll`
// runs one iteration of that loop under the channel lock. the same loops back both direct
// operations and selector registrations.
//
// a rendezvous channel buffers nothing. a push and a pop meet in its wait queues instead: each
// loop parks with its cell, and whichever arrives second hands the item across with
// `Once::handoff`, resolving both cells and waking the parked one. a parked loop can thus find its
// cell resolved in its own favor when next polled.

use super::{
    once::{Handoff, Once},
    wait_queue::{WaitQueue, WaitKey},
};
use std::{
    collections::VecDeque,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    task::{Context, Poll},
};


// handle to a channel.
pub(crate) struct Channel<T>(Arc<Shared<T>>);

// channel shared state.
pub(crate) struct Shared<T> {
    lockable: Mutex<Lockable<T>>,
}

// cell and index of a suspended wait loop.
type Parked<T> = (Once<T>, usize);

// channel lockable state.
pub(crate) struct Lockable<T> {
    // buffered elements, in FIFO order. always empty for a rendezvous channel.
    elems: VecDeque<T>,
    // maximum number of buffered elements, or 0 for a rendezvous channel.
    capacity: usize,
    // once set, never unset.
    closed: bool,
    // push loops waiting for room, or for a pop to take their item.
    pushers: WaitQueue<Parked<T>>,
    // pop loops waiting for an element.
    poppers: WaitQueue<Parked<T>>,
}

impl<T> Channel<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Channel(Arc::new(Shared {
            lockable: Mutex::new(Lockable {
                elems: VecDeque::with_capacity(capacity),
                capacity,
                closed: false,
                pushers: WaitQueue::new(),
                poppers: WaitQueue::new(),
            }),
        }))
    }

    // weak handle, which doesn't keep the channel alive.
    pub(crate) fn downgrade(&self) -> Weak<Shared<T>> {
        Arc::downgrade(&self.0)
    }

    // lock the channel.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Lockable<T>> {
        self.0.lock()
    }

    // close the channel and wake every waiter so it re-evaluates. returns false if already closed.
    pub(crate) fn close(&self) -> bool {
        let mut lock = self.lock();
        if lock.closed {
            return false;
        }
        lock.closed = true;
        let pushers = lock.pushers.notify_all();
        let poppers = lock.poppers.notify_all();
        trace!(pushers, poppers, buffered = lock.elems.len(), "closed channel");
        true
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Channel(Arc::clone(&self.0))
    }
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Lockable<T>> {
        self.lockable.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // wake every pusher and popper so it re-checks its condition. used when a selector cell
    // registered on this channel was resolved through some other channel.
    pub(crate) fn wake_all(&self) {
        let mut lock = self.lock();
        lock.pushers.notify_all();
        lock.poppers.notify_all();
    }
}

impl<T> Lockable<T> {
    pub(crate) fn len(&self) -> usize {
        self.elems.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    // number of push loops currently suspended on the channel.
    pub(crate) fn waiting_pushers(&self) -> usize {
        self.pushers.len()
    }

    // number of pop loops currently suspended on the channel.
    pub(crate) fn waiting_poppers(&self) -> usize {
        self.poppers.len()
    }
}


// how a wait loop finished.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Exit {
    // this loop resolved the cell, or was handed or taken an item by the loop it met.
    Won,
    // the cell was resolved by some other loop, so this one did nothing.
    Abandoned,
}

fn exit(winner: usize, index: usize) -> Exit {
    if winner == index { Exit::Won } else { Exit::Abandoned }
}


// push loop future, for the item staged at `index` in `once`.
pub(crate) struct Push<T> {
    channel: Channel<T>,
    once: Once<T>,
    index: usize,
    // set while holding a place in the pushers queue.
    key: Option<WaitKey>,
    done: bool,
}

impl<T> Push<T> {
    pub(crate) fn new(channel: Channel<T>, once: Once<T>, index: usize) -> Self {
        Push { channel, once, index, key: None, done: false }
    }

    pub(crate) fn once(&self) -> &Once<T> {
        &self.once
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }
}

// no part of the future is ever pinned.
impl<T> Unpin for Push<T> {}

impl<T> Future for Push<T> {
    type Output = Exit;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Exit> {
        let this = self.get_mut();
        assert!(!this.done, "push loop polled after completion");
        let mut guard = this.channel.lock();
        let lock = &mut *guard;

        if let Some(winner) = this.once.winner() {
            // resolved by a pop taking our item, or by some other registration
            lock.pushers.leave(&mut this.key);
            this.done = true;
            let outcome = exit(winner, this.index);
            if outcome == Exit::Abandoned {
                // pass on any notification we might be holding
                lock.pushers.notify_one();
            }
            return Poll::Ready(outcome);
        }

        if lock.closed {
            lock.pushers.leave(&mut this.key);
            this.done = true;
            return match this.once.reject_source(this.index) {
                Some(fanout) => {
                    drop(guard);
                    fanout.fire();
                    Poll::Ready(Exit::Won)
                }
                None => Poll::Ready(Exit::Abandoned),
            };
        }

        if lock.capacity == 0 {
            let mut handed = None;
            lock.poppers.notify_first(|(sink, sink_index)| {
                if sink.same_cell(&this.once) {
                    return false;
                }
                match Once::handoff(&this.once, this.index, sink, *sink_index) {
                    Handoff::Done(fanout) => {
                        handed = Some(fanout);
                        true
                    }
                    Handoff::SourceResolved | Handoff::SinkResolved => false,
                }
            });
            if let Some(fanout) = handed {
                lock.pushers.leave(&mut this.key);
                this.done = true;
                drop(guard);
                fanout.fire();
                return Poll::Ready(Exit::Won);
            }
            lock.pushers.wait(&mut this.key, cx.waker(), || (this.once.clone(), this.index));
            return Poll::Pending;
        }

        if lock.elems.len() >= lock.capacity {
            lock.pushers.wait(&mut this.key, cx.waker(), || (this.once.clone(), this.index));
            return Poll::Pending;
        }
        lock.pushers.leave(&mut this.key);
        this.done = true;

        let elems = &mut lock.elems;
        let Some(fanout) = this.once.claim_source(this.index, |elem| elems.push_back(elem)) else {
            // there is still room for someone else
            lock.pushers.notify_one();
            return Poll::Ready(Exit::Abandoned);
        };
        lock.poppers.notify_one();
        drop(guard);
        fanout.fire();
        Poll::Ready(Exit::Won)
    }
}

impl<T> Drop for Push<T> {
    fn drop(&mut self) {
        if self.done || self.key.is_none() {
            return;
        }
        let mut lock = self.channel.lock();
        if lock.pushers.leave(&mut self.key) {
            lock.pushers.notify_one();
        }
    }
}


// pop loop future, resolving `once` at `index`.
pub(crate) struct Pop<T> {
    channel: Channel<T>,
    once: Once<T>,
    index: usize,
    // set while holding a place in the poppers queue.
    key: Option<WaitKey>,
    done: bool,
}

impl<T> Pop<T> {
    pub(crate) fn new(channel: Channel<T>, once: Once<T>, index: usize) -> Self {
        Pop { channel, once, index, key: None, done: false }
    }

    pub(crate) fn once(&self) -> &Once<T> {
        &self.once
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }
}

// no part of the future is ever pinned.
impl<T> Unpin for Pop<T> {}

impl<T> Future for Pop<T> {
    type Output = Exit;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Exit> {
        let this = self.get_mut();
        assert!(!this.done, "pop loop polled after completion");
        let mut guard = this.channel.lock();
        let lock = &mut *guard;

        if let Some(winner) = this.once.winner() {
            // resolved by a push handing us its item, or by some other registration
            lock.poppers.leave(&mut this.key);
            this.done = true;
            let outcome = exit(winner, this.index);
            if outcome == Exit::Abandoned {
                lock.poppers.notify_one();
            }
            return Poll::Ready(outcome);
        }

        if !lock.elems.is_empty() || lock.closed {
            // buffered items are still handed out after closing
            lock.poppers.leave(&mut this.key);
            this.done = true;

            let elems = &mut lock.elems;
            let Some(fanout) = this.once.claim_sink(this.index, || elems.pop_front()) else {
                lock.poppers.notify_one();
                return Poll::Ready(Exit::Abandoned);
            };
            lock.pushers.notify_one();
            drop(guard);
            fanout.fire();
            return Poll::Ready(Exit::Won);
        }

        if lock.capacity == 0 {
            let mut taken = None;
            lock.pushers.notify_first(|(source, source_index)| {
                if source.same_cell(&this.once) {
                    return false;
                }
                match Once::handoff(source, *source_index, &this.once, this.index) {
                    Handoff::Done(fanout) => {
                        taken = Some(fanout);
                        true
                    }
                    Handoff::SourceResolved | Handoff::SinkResolved => false,
                }
            });
            if let Some(fanout) = taken {
                lock.poppers.leave(&mut this.key);
                this.done = true;
                drop(guard);
                fanout.fire();
                return Poll::Ready(Exit::Won);
            }
        }

        lock.poppers.wait(&mut this.key, cx.waker(), || (this.once.clone(), this.index));
        Poll::Pending
    }
}

impl<T> Drop for Pop<T> {
    fn drop(&mut self) {
        if self.done || self.key.is_none() {
            return;
        }
        let mut lock = self.channel.lock();
        if lock.poppers.leave(&mut self.key) {
            lock.poppers.notify_one();
        }
    }
}
