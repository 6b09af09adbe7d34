// condition-variable-like queue of suspended wait loops.
//
// a wait loop that cannot make progress registers its waker here and returns pending. notifying
// removes a waiter from the queue and wakes it, and the woken loop re-checks its condition the
// next time it is polled. a waiter can tell whether it was notified by whether its key is still
// present in the queue.
//
// each waiter carries a payload which other loops may inspect while it is queued.

use std::{
    collections::VecDeque,
    task::Waker,
};


// identifies one waiter within one queue. owned by the wait loop.
#[derive(Debug, Eq, PartialEq)]
pub(crate) struct WaitKey(u64);

struct Waiter<P> {
    key: u64,
    waker: Waker,
    payload: P,
}

pub(crate) struct WaitQueue<P> {
    // front is the longest waiting.
    waiters: VecDeque<Waiter<P>>,
    next_key: u64,
}

impl<P> WaitQueue<P> {
    pub(crate) fn new() -> Self {
        WaitQueue {
            waiters: VecDeque::new(),
            next_key: 0,
        }
    }

    // number of waiters not yet notified.
    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    // suspend the waiter identified by `key` until notified, allocating a key if it has none.
    //
    // - if the waiter is still queued, its waker is refreshed in place, keeping its position.
    // - if the waiter was notified since it last waited, it is queued again at the back, with a
    //   new payload.
    pub(crate) fn wait(
        &mut self,
        key: &mut Option<WaitKey>,
        waker: &Waker,
        payload: impl FnOnce() -> P,
    ) {
        let k = match *key {
            Some(WaitKey(k)) => {
                if let Some(queued) = self.waiters.iter_mut().find(|waiter| waiter.key == k) {
                    if !queued.waker.will_wake(waker) {
                        queued.waker = waker.clone();
                    }
                    return;
                }
                k
            }
            None => {
                let k = self.next_key;
                self.next_key += 1;
                *key = Some(WaitKey(k));
                k
            }
        };
        self.waiters.push_back(Waiter {
            key: k,
            waker: waker.clone(),
            payload: payload(),
        });
    }

    // stop waiting, clearing the key. returns whether the waiter had been notified without having
    // re-waited since, meaning it holds a notification it must pass on if it won't act on it.
    pub(crate) fn leave(&mut self, key: &mut Option<WaitKey>) -> bool {
        let Some(WaitKey(k)) = key.take() else { return false };
        match self.waiters.iter().position(|waiter| waiter.key == k) {
            Some(i) => {
                self.waiters.remove(i);
                false
            }
            None => true,
        }
    }

    // wake the longest waiting waiter, if any. returns whether one was woken.
    pub(crate) fn notify_one(&mut self) -> bool {
        match self.waiters.pop_front() {
            Some(waiter) => {
                waiter.waker.wake();
                true
            }
            None => false,
        }
    }

    // wake the longest waiting waiter whose payload `accept` returns true for, visiting waiters
    // in order and stopping at the first accepted. returns whether one was woken.
    pub(crate) fn notify_first(&mut self, mut accept: impl FnMut(&P) -> bool) -> bool {
        let Some(i) = self.waiters.iter().position(|waiter| accept(&waiter.payload)) else {
            return false;
        };
        if let Some(waiter) = self.waiters.remove(i) {
            waiter.waker.wake();
        }
        true
    }

    // wake every waiter. returns how many were woken.
    pub(crate) fn notify_all(&mut self) -> usize {
        let n = self.waiters.len();
        for waiter in self.waiters.drain(..) {
            waiter.waker.wake();
        }
        n
    }
}
