// implementation of the channel.
//
// the basic architecture is as such:
//
// channel handles wrap around Arc<Mutex<lockable state>>
//                                         |
//          /------------------------------/
//          v
//       lockable state
//          |
//          |------ a VecDeque<T> holding the buffered elements, at most `capacity` of them
//          |       (none for a rendezvous channel)
//          |
//          |------ a "pushers" wait queue: wakers and cells of push loops suspended on a full
//          |       channel, or on a rendezvous channel with no pop to meet
//          |
//          \------ a "poppers" wait queue: wakers and cells of pop loops suspended on an empty
//                  channel
//
// every push and pop is a wait loop parameterized by a rendezvous cell (see the once module) and
// the index of the operation within that cell. a direct push or pop owns a cell with only itself
// in it. a selector shares one cell between all of its registered operations, so that exactly one
// of them transfers an element and the rest abandon. on a rendezvous channel, a push and a pop
// which meet resolve both of their cells together.
//
// the organization of these modules is as such:
//
//      wait_queue<-----core: the wait loops, written as futures. locks the channel and then the
//                   |  ^   cells, never the other way around, and two cells in address order.
//      once<--------/  |
//                      |
//                      api: convenient wrapper around core which the crate re-exports.
//
// there is also the error module, which contains the relevant error types, which is also
// re-exported publically.

pub(crate) mod error;
pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod once;

mod wait_queue;
