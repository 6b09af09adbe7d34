// rendezvous cells: single-assignment synchronization points raced by the wait loops in core.
//
// a cell resolves exactly once. every operation that would resolve it checks and claims in one
// step under the cell's own exclusion, so a wait loop can never observe the cell unresolved, act,
// and then find that some other loop also acted.
//
// a direct push or pop owns a cell with a single participant. a selector shares one cell between
// every operation registered on it, possibly on different channels. the winning claim produces a
// Fanout which wakes the waiters of every other registered channel, so that the losing loops
// notice and abandon.
//
// on a rendezvous channel a push and a pop resolve together: the handoff locks both cells, in
// address order, and resolves them in the same step or not at all.

use super::core;
use smallvec::SmallVec;
use std::{
    mem::take,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};


// how a cell was resolved.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Resolution<T> {
    // the staged item was enqueued, or handed to a pop.
    Pushed,
    // the channel was closed before the staged item could be enqueued. holds the item.
    Rejected(T),
    // an item was dequeued, or None if the channel was closed and empty.
    Popped(Option<T>),
}

// outcome of trying to hand an item from a push's cell to a pop's cell.
pub(crate) enum Handoff<T> {
    // both cells resolved. fire the fanout once the channel is unlocked.
    Done(Fanout<T>),
    // the push's cell was already resolved, and nothing happened.
    SourceResolved,
    // the pop's cell was already resolved, and nothing happened.
    SinkResolved,
}


// channels to wake after a cell resolves.
pub(crate) struct Fanout<T>(SmallVec<[Weak<core::Shared<T>>; 4]>);

impl<T> Fanout<T> {
    // wake every waiter on every channel that is still alive. must not be called while holding
    // any channel's lock.
    pub(crate) fn fire(self) {
        for channel in self.0 {
            if let Some(channel) = channel.upgrade() {
                channel.wake_all();
            }
        }
    }
}


// handle to a cell.
pub(crate) struct Once<T>(Arc<Mutex<State<T>>>);

struct State<T> {
    // item to push for each registered push, None for each registered pop. indexed by
    // registration.
    staged: SmallVec<[Option<T>; 4]>,
    // channel of each registration.
    channels: SmallVec<[Weak<core::Shared<T>>; 4]>,
    // winning registration and how it resolved the cell.
    resolved: Option<(usize, Resolution<T>)>,
}

impl<T> Once<T> {
    pub(crate) fn new() -> Self {
        Once(Arc::new(Mutex::new(State {
            staged: SmallVec::new(),
            channels: SmallVec::new(),
            resolved: None,
        })))
    }

    // cell for a direct push of `item` into `channel`, at index 0.
    pub(crate) fn source(channel: &core::Channel<T>, item: T) -> Self {
        let once = Once::new();
        once.add(channel, Some(item));
        once
    }

    // cell for a direct pop from `channel`, at index 0.
    pub(crate) fn sink(channel: &core::Channel<T>) -> Self {
        let once = Once::new();
        once.add(channel, None);
        once
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // register a participant. returns its index.
    //
    // panics if the cell is already resolved.
    pub(crate) fn add(&self, channel: &core::Channel<T>, staged: Option<T>) -> usize {
        let mut lock = self.lock();
        assert!(lock.resolved.is_none(), "registered on an already resolved selector");
        let index = lock.staged.len();
        lock.staged.push(staged);
        lock.channels.push(channel.downgrade());
        index
    }

    // number of registered participants.
    pub(crate) fn len(&self) -> usize {
        self.lock().staged.len()
    }

    // whether both handles refer to the same cell.
    pub(crate) fn same_cell(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    // index of the winning participant, if resolved.
    pub(crate) fn winner(&self) -> Option<usize> {
        self.lock().resolved.as_ref().map(|&(index, _)| index)
    }

    // take the winning index and resolution, if resolved.
    pub(crate) fn take_resolution(&self) -> Option<(usize, Resolution<T>)> {
        self.lock().resolved.take()
    }

    // resolve by handing the item staged for `index` to `put`. returns None if already resolved,
    // in which case `put` is not called.
    pub(crate) fn claim_source(&self, index: usize, put: impl FnOnce(T)) -> Option<Fanout<T>> {
        let mut lock = self.lock();
        if lock.resolved.is_some() {
            return None;
        }
        put(lock.take_staged(index));
        Some(lock.resolve(index, Resolution::Pushed))
    }

    // resolve as a push which failed because its channel was closed.
    pub(crate) fn reject_source(&self, index: usize) -> Option<Fanout<T>> {
        let mut lock = self.lock();
        if lock.resolved.is_some() {
            return None;
        }
        let item = lock.take_staged(index);
        Some(lock.resolve(index, Resolution::Rejected(item)))
    }

    // resolve with whatever `take` dequeues. returns None if already resolved, in which case
    // `take` is not called.
    pub(crate) fn claim_sink(&self, index: usize, take: impl FnOnce() -> Option<T>) -> Option<Fanout<T>> {
        let mut lock = self.lock();
        if lock.resolved.is_some() {
            return None;
        }
        let popped = take();
        Some(lock.resolve(index, Resolution::Popped(popped)))
    }

    // move the item staged at `source_index` of `source` into `sink` at `sink_index`, resolving
    // both cells, or neither if either is already resolved.
    //
    // the cells must be distinct.
    pub(crate) fn handoff(
        source: &Self,
        source_index: usize,
        sink: &Self,
        sink_index: usize,
    ) -> Handoff<T> {
        debug_assert!(!source.same_cell(sink));
        let mut source_lock;
        let mut sink_lock;
        if Arc::as_ptr(&source.0) < Arc::as_ptr(&sink.0) {
            source_lock = source.lock();
            sink_lock = sink.lock();
        } else {
            sink_lock = sink.lock();
            source_lock = source.lock();
        }

        if source_lock.resolved.is_some() {
            return Handoff::SourceResolved;
        }
        if sink_lock.resolved.is_some() {
            return Handoff::SinkResolved;
        }
        let item = source_lock.take_staged(source_index);
        let mut fanout = source_lock.resolve(source_index, Resolution::Pushed);
        fanout.0.extend(sink_lock.resolve(sink_index, Resolution::Popped(Some(item))).0);
        Handoff::Done(fanout)
    }
}

impl<T> Clone for Once<T> {
    fn clone(&self) -> Self {
        Once(Arc::clone(&self.0))
    }
}

impl<T> State<T> {
    // resolve, dropping every other staged item, and build the fanout to every other channel.
    fn resolve(&mut self, index: usize, resolution: Resolution<T>) -> Fanout<T> {
        debug_assert!(self.resolved.is_none());
        self.resolved = Some((index, resolution));
        let channels = take(&mut self.channels);
        self.staged.clear();
        Fanout(channels.into_iter()
            .enumerate()
            .filter(|&(i, _)| i != index)
            .map(|(_, channel)| channel)
            .collect())
    }

    fn take_staged(&mut self, index: usize) -> T {
        self.staged[index].take().expect("push has no staged item (internal bug)")
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_source_resolves_once() {
        let channel = core::Channel::new(1);
        let once = Once::source(&channel, 7);
        assert_eq!(once.winner(), None);
        let mut out = Vec::new();
        let fanout = once.claim_source(0, |item| out.push(item)).unwrap();
        assert!(fanout.0.is_empty());
        assert_eq!(once.winner(), Some(0));
        assert!(once.reject_source(0).is_none());
        assert_eq!(out, [7]);
        assert_eq!(once.take_resolution(), Some((0, Resolution::Pushed)));
    }

    #[test]
    fn direct_source_rejected_keeps_item() {
        let channel = core::Channel::new(0);
        let once = Once::source(&channel, "a");
        assert!(once.reject_source(0).is_some());
        assert_eq!(once.take_resolution(), Some((0, Resolution::Rejected("a"))));
    }

    #[test]
    fn direct_sink_closed_sentinel() {
        let channel = core::Channel::<u32>::new(1);
        let once = Once::sink(&channel);
        assert!(once.claim_sink(0, || None).is_some());
        assert_eq!(once.take_resolution(), Some((0, Resolution::Popped(None))));
    }

    #[test]
    fn shared_cell_exactly_one_winner() {
        let a = core::Channel::new(1);
        let b = core::Channel::new(1);
        let once = Once::new();
        assert_eq!(once.add(&a, Some(1)), 0);
        assert_eq!(once.add(&b, None), 1);
        assert_eq!(once.len(), 2);

        let h1 = once.clone();
        let h2 = once.clone();
        let mut pushed = Vec::new();
        let fanout = h1.claim_source(0, |item| pushed.push(item)).expect("first claim wins");
        // only the other channel is woken
        assert_eq!(fanout.0.len(), 1);
        assert!(fanout.0[0].ptr_eq(&b.downgrade()));
        fanout.fire();

        let mut called = false;
        assert!(h2.claim_sink(1, || { called = true; Some(2) }).is_none());
        assert!(!called);
        assert_eq!(h2.winner(), Some(0));
        assert_eq!(pushed, [1]);
        assert_eq!(once.take_resolution(), Some((0, Resolution::Pushed)));
    }

    #[test]
    fn fanout_skips_dropped_channels() {
        let once = Once::<u8>::new();
        {
            let gone = core::Channel::new(0);
            once.add(&gone, None);
        }
        let kept = core::Channel::new(0);
        once.add(&kept, None);
        let fanout = once.claim_sink(1, || None).unwrap();
        assert_eq!(fanout.0.len(), 1);
        fanout.fire();
    }

    #[test]
    fn handoff_resolves_both_cells() {
        let rendezvous = core::Channel::new(0);
        let other = core::Channel::new(1);
        let source = Once::source(&rendezvous, 5);
        let sink = Once::new();
        sink.add(&other, None);
        sink.add(&rendezvous, None);

        let Handoff::Done(fanout) = Once::handoff(&source, 0, &sink, 1) else {
            panic!("handoff failed");
        };
        // the sink's other registration is woken
        assert_eq!(fanout.0.len(), 1);
        assert!(fanout.0[0].ptr_eq(&other.downgrade()));
        assert_eq!(source.take_resolution(), Some((0, Resolution::Pushed)));
        assert_eq!(sink.take_resolution(), Some((1, Resolution::Popped(Some(5)))));
    }

    #[test]
    fn handoff_to_resolved_sink_keeps_item_staged() {
        let channel = core::Channel::new(0);
        let source = Once::source(&channel, 5);
        let sink = Once::sink(&channel);
        sink.claim_sink(0, || None).unwrap();

        assert!(matches!(Once::handoff(&source, 0, &sink, 0), Handoff::SinkResolved));
        assert!(matches!(Once::handoff(&sink, 0, &source, 0), Handoff::SourceResolved));
        // the item is still there for a later claim
        let mut out = Vec::new();
        assert!(source.claim_source(0, |item| out.push(item)).is_some());
        assert_eq!(out, [5]);
    }
}
