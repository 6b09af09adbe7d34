//! Go-like select over channel operations.

use crate::channel::{
    api::Channel,
    core::{self, Exit},
    once::{Once, Resolution},
};
use futures::future::{join_all, Either};
use smallvec::SmallVec;
use std::fmt::{self, Debug, Formatter};
use thiserror::Error;


/// Outcome of the operation which won a [`Selector`]
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Selected<T> {
    /// The registered push enqueued its item
    Pushed,
    /// The registered pop dequeued an item, or `None` if its channel was closed and empty
    Popped(Option<T>),
}

impl<T> Selected<T> {
    /// The popped item, if a pop won and its channel was not closed
    pub fn into_popped(self) -> Option<T> {
        match self {
            Selected::Pushed => None,
            Selected::Popped(item) => item,
        }
    }
}

/// Error for a selection won by a push whose channel was closed
///
/// Holds the registration index of that push and the item it failed to push.
#[derive(Error, Clone, Eq, PartialEq)]
#[error("selected push (registration {index}) into a closed channel")]
pub struct SelectError<T> {
    /// Registration index of the failed push
    pub index: usize,
    /// The item that could not be pushed
    pub item: T,
}

impl<T> Debug for SelectError<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("SelectError")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

// channel operation registered on a selector. pushes keep their item staged in the cell.
enum Intent<T> {
    Push(core::Channel<T>),
    Pop(core::Channel<T>),
}

/// Offers several channel operations at once and commits to exactly one of them
///
/// Register pushes and pops, possibly on different channels, then [`gather`](Self::gather). All
/// registered operations wait concurrently, and the first one able to proceed wins. Every other
/// operation then abandons without any effect on its channel: a losing push never enqueues its
/// item, and a losing pop never dequeues one.
///
/// No fairness is guaranteed between operations which are ready at the same time. The winner is
/// whichever is first polled while able to proceed, which on the first poll is the earliest
/// registered one.
///
/// A registered pop on a closed, empty channel is able to proceed, and wins with `None`. A
/// registered push on a closed channel is also able to proceed, and wins by failing with
/// [`SelectError`].
pub struct Selector<T> {
    once: Once<T>,
    intents: SmallVec<[Intent<T>; 4]>,
}

impl<T> Selector<T> {
    /// Create a selector with no registered operations
    pub fn new() -> Self {
        Selector {
            once: Once::new(),
            intents: SmallVec::new(),
        }
    }

    /// Register a push of `item` into `channel`, returning its registration index
    pub fn push(&mut self, channel: &Channel<T>, item: T) -> usize {
        let index = self.once.add(&channel.0, Some(item));
        self.intents.push(Intent::Push(channel.0.clone()));
        debug_assert_eq!(index + 1, self.intents.len());
        index
    }

    /// Register a pop from `channel`, returning its registration index
    pub fn pop(&mut self, channel: &Channel<T>) -> usize {
        let index = self.once.add(&channel.0, None);
        self.intents.push(Intent::Pop(channel.0.clone()));
        debug_assert_eq!(index + 1, self.intents.len());
        index
    }

    /// Number of registered operations
    pub fn len(&self) -> usize {
        self.intents.len()
    }

    /// Whether no operations are registered
    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    /// Wait until one registered operation wins, and return its index and outcome
    ///
    /// Only returns once every registered operation has either won or abandoned. Waits forever if
    /// no registered operation ever becomes able to proceed.
    ///
    /// Panics if no operations are registered.
    pub async fn gather(self) -> Result<(usize, Selected<T>), SelectError<T>> {
        assert!(!self.intents.is_empty(), "Selector::gather called with no registered operations");
        debug_assert_eq!(self.once.len(), self.intents.len());

        let once = self.once;
        let loops = self.intents.into_iter()
            .enumerate()
            .map(|(index, intent)| match intent {
                Intent::Push(channel) => Either::Left(core::Push::new(channel, once.clone(), index)),
                Intent::Pop(channel) => Either::Right(core::Pop::new(channel, once.clone(), index)),
            })
            .collect::<Vec<_>>();
        let exits = join_all(loops).await;
        debug_assert_eq!(exits.iter().filter(|&&exit| exit == Exit::Won).count(), 1);

        let (index, resolution) = once.take_resolution()
            .expect("every selector loop finished without a winner (internal bug)");
        trace!(index, abandoned = exits.len() - 1, "selector resolved");
        match resolution {
            Resolution::Pushed => Ok((index, Selected::Pushed)),
            Resolution::Popped(item) => Ok((index, Selected::Popped(item))),
            Resolution::Rejected(item) => Err(SelectError { index, item }),
        }
    }
}

impl<T> Default for Selector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for Selector<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let mut f = f.debug_list();
        for intent in &self.intents {
            f.entry(&match intent {
                Intent::Push(_) => "push",
                Intent::Pop(_) => "pop",
            });
        }
        f.finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use futures::poll;
    use std::task::Poll;

    #[tokio::test]
    async fn select_closed() {
        let chan = Channel::<i32>::new(2);
        chan.close();
        let mut sel = Selector::new();
        sel.pop(&chan);
        assert_eq!(sel.gather().await, Ok((0, Selected::Popped(None))));
    }

    #[tokio::test]
    async fn select_pop() {
        let chan_1 = Channel::new(1);
        let chan_2 = Channel::new(1);

        let mut sel_1 = Selector::new();
        assert_eq!(sel_1.pop(&chan_1), 0);
        assert_eq!(sel_1.pop(&chan_2), 1);
        chan_2.push(10).await.unwrap();
        assert_eq!(sel_1.gather().await, Ok((1, Selected::Popped(Some(10)))));

        let mut sel_2 = Selector::new();
        sel_2.pop(&chan_1);
        sel_2.pop(&chan_2);
        chan_1.push(20).await.unwrap();
        assert_eq!(sel_2.gather().await, Ok((0, Selected::Popped(Some(20)))));

        assert!(chan_1.is_empty() && chan_2.is_empty());
    }

    #[tokio::test]
    async fn select_pop_leaves_other_channel_untouched() {
        let chan_1 = Channel::new(2);
        let chan_2 = Channel::new(2);
        chan_2.push(1).await.unwrap();
        chan_2.push(2).await.unwrap();

        let mut sel = Selector::new();
        sel.pop(&chan_1);
        sel.pop(&chan_2);
        assert_eq!(sel.gather().await, Ok((1, Selected::Popped(Some(1)))));
        assert_eq!(chan_1.len(), 0);
        assert_eq!(chan_2.len(), 1);
        assert_eq!(chan_2.pop().await, Some(2));
    }

    #[tokio::test]
    async fn select_push() {
        let chan_1 = Channel::new(1);
        let chan_2 = Channel::new(1);
        let mut sel = Selector::new();
        sel.push(&chan_1, 10);
        sel.push(&chan_2, 20);
        chan_1.push(11).await.unwrap();
        assert_eq!(sel.gather().await, Ok((1, Selected::Pushed)));
        chan_1.close();
        assert_eq!(chan_1.pop().await, Some(11));
        assert_eq!(chan_1.pop().await, None);
        assert_eq!(chan_2.pop().await, Some(20));
    }

    #[tokio::test]
    async fn select_push_commits_exactly_once() {
        let chan_1 = Channel::new(1);
        let chan_2 = Channel::new(1);
        let mut sel = Selector::new();
        sel.push(&chan_1, "x");
        sel.push(&chan_2, "y");
        let (index, selected) = sel.gather().await.unwrap();
        assert_eq!(selected, Selected::Pushed);

        chan_1.close();
        chan_2.close();
        let drained_1 = [chan_1.pop().await, chan_1.pop().await];
        let drained_2 = [chan_2.pop().await, chan_2.pop().await];
        match index {
            0 => {
                assert_eq!(drained_1, [Some("x"), None]);
                assert_eq!(drained_2, [None, None]);
            }
            1 => {
                assert_eq!(drained_1, [None, None]);
                assert_eq!(drained_2, [Some("y"), None]);
            }
            _ => panic!("unexpected winner {}", index),
        }
    }

    #[tokio::test]
    async fn select_both_pop() {
        let chan_1 = Channel::new(1);
        let chan_2 = Channel::new(1);

        // chan_1 is full, so the push can't proceed
        chan_1.push(10).await.unwrap();
        chan_2.push(20).await.unwrap();
        let mut sel_1 = Selector::new();
        sel_1.push(&chan_1, 20);
        sel_1.pop(&chan_2);
        assert_eq!(sel_1.gather().await, Ok((1, Selected::Popped(Some(20)))));

        // chan_2 is full, so the push can't proceed
        chan_2.push(30).await.unwrap();
        let mut sel_2 = Selector::new();
        sel_2.pop(&chan_1);
        sel_2.push(&chan_2, 40);
        assert_eq!(sel_2.gather().await, Ok((0, Selected::Popped(Some(10)))));
        assert_eq!(chan_2.pop().await, Some(30));
        assert!(chan_2.is_empty());
    }

    #[tokio::test]
    async fn select_both_push() {
        let chan_1 = Channel::new(1);
        let chan_2 = Channel::new(1);

        // chan_1 is empty, so the pop can't proceed
        let mut sel_1 = Selector::new();
        sel_1.pop(&chan_1);
        sel_1.push(&chan_2, 10);
        assert_eq!(sel_1.gather().await, Ok((1, Selected::Pushed)));
        assert_eq!(chan_2.pop().await, Some(10));

        // chan_2 is empty, so the pop can't proceed
        let mut sel_2 = Selector::new();
        sel_2.push(&chan_1, 20);
        sel_2.pop(&chan_2);
        assert_eq!(sel_2.gather().await, Ok((0, Selected::Pushed)));
        assert_eq!(chan_1.pop().await, Some(20));
    }

    #[tokio::test]
    async fn select_waits_until_some_channel_ready() {
        let chan_1 = Channel::<u8>::new(1);
        let chan_2 = Channel::<u8>::new(1);
        let mut sel = Selector::new();
        sel.pop(&chan_1);
        sel.pop(&chan_2);
        let mut gather = Box::pin(sel.gather());
        assert!(poll!(gather.as_mut()).is_pending());
        assert!(poll!(gather.as_mut()).is_pending());

        chan_2.push(3).await.unwrap();
        assert_eq!(gather.await, Ok((1, Selected::Popped(Some(3)))));
        // the losing pop left no waiter behind
        chan_1.push(4).await.unwrap();
        assert_eq!(chan_1.pop().await, Some(4));
    }

    #[tokio::test]
    async fn select_pop_wins_on_close() {
        let chan_1 = Channel::<u8>::new(1);
        let chan_2 = Channel::<u8>::new(0);
        let mut sel = Selector::new();
        sel.pop(&chan_1);
        sel.push(&chan_2, 9);
        let mut gather = Box::pin(sel.gather());
        assert!(poll!(gather.as_mut()).is_pending());

        chan_1.close();
        assert_eq!(gather.await, Ok((0, Selected::Popped(None))));
        // the losing rendezvous push never reached chan_2
        chan_2.close();
        assert_eq!(chan_2.pop().await, None);
    }

    #[tokio::test]
    async fn select_pop_takes_from_waiting_rendezvous_push() {
        let chan_1 = Channel::new(0);
        let chan_2 = Channel::new(1);
        let mut push = chan_1.push(5);
        assert!(poll!(&mut push).is_pending());

        let mut sel = Selector::new();
        sel.pop(&chan_2);
        sel.pop(&chan_1);
        let mut gather = Box::pin(sel.gather());
        assert!(poll!(gather.as_mut()).is_pending());
        chan_2.push(1).await.unwrap();

        assert_eq!(poll!(&mut push), Poll::Ready(Ok(())));
        assert_eq!(gather.await, Ok((1, Selected::Popped(Some(5)))));
        assert_eq!(chan_1.len(), 0);
        assert!(chan_1.len() <= chan_1.capacity());
        assert_eq!(chan_2.pop().await, Some(1));
    }

    #[tokio::test]
    async fn select_losing_rendezvous_pop_lends_nothing() {
        let chan_1 = Channel::new(0);
        let chan_2 = Channel::new(1);
        let mut sel = Selector::new();
        sel.pop(&chan_1);
        sel.pop(&chan_2);
        let mut gather = Box::pin(sel.gather());
        assert!(poll!(gather.as_mut()).is_pending());

        chan_2.push(2).await.unwrap();
        assert_eq!(gather.await, Ok((1, Selected::Popped(Some(2)))));
        // the losing pop left nothing for a rendezvous push to meet
        let mut push = chan_1.push(3);
        assert!(poll!(&mut push).is_pending());
        assert!(chan_1.is_empty());
    }

    #[tokio::test]
    async fn select_rendezvous_push_meets_waiting_pop() {
        let chan_1 = Channel::<u8>::new(0);
        let chan_2 = Channel::<u8>::new(0);
        let mut pop = chan_2.pop();
        assert!(poll!(&mut pop).is_pending());

        let mut sel = Selector::new();
        sel.push(&chan_1, 1);
        sel.push(&chan_2, 2);
        assert_eq!(sel.gather().await, Ok((1, Selected::Pushed)));
        assert_eq!(pop.await, Some(2));
        assert!(chan_1.is_empty() && chan_2.is_empty());
    }

    #[tokio::test]
    async fn select_push_into_closed_channel() {
        let chan = Channel::new(4);
        chan.close();
        let mut sel = Selector::new();
        sel.push(&chan, 5);
        let err = sel.gather().await.unwrap_err();
        assert_eq!(err.index, 0);
        assert_eq!(err.item, 5);
    }

    #[tokio::test]
    async fn select_against_direct_pop() {
        let chan_1 = Channel::new(0);
        let chan_2 = Channel::new(0);
        let popper = tokio::spawn({
            let chan_2 = chan_2.clone();
            async move { chan_2.pop().await }
        });
        let mut sel = Selector::new();
        sel.push(&chan_1, 1);
        sel.push(&chan_2, 2);
        assert_eq!(sel.gather().await, Ok((1, Selected::Pushed)));
        assert_eq!(popper.await.unwrap(), Some(2));
        assert!(chan_1.is_empty());
    }

    #[tokio::test]
    async fn select_push_and_pop_same_channel() {
        let chan = Channel::new(1);
        let mut sel = Selector::new();
        sel.pop(&chan);
        sel.push(&chan, 1);
        assert_eq!(sel.gather().await, Ok((1, Selected::Pushed)));
        assert_eq!(chan.len(), 1);

        let mut sel = Selector::new();
        sel.push(&chan, 2);
        sel.pop(&chan);
        assert_eq!(sel.gather().await, Ok((1, Selected::Popped(Some(1)))));
        assert!(chan.is_empty());
    }

    #[tokio::test]
    async fn dropped_gather_leaves_channels_usable() {
        let chan = Channel::new(1);
        let mut sel = Selector::new();
        sel.pop(&chan);
        {
            let mut gather = Box::pin(sel.gather());
            assert!(poll!(gather.as_mut()).is_pending());
        }
        chan.push(1).await.unwrap();
        assert_eq!(chan.pop().await, Some(1));
    }

    #[test]
    #[should_panic(expected = "no registered operations")]
    fn gather_empty_panics() {
        let sel = Selector::<()>::new();
        futures::executor::block_on(sel.gather()).ok();
    }
}
