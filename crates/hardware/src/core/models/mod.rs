//! Core models.
//!
//! Three models share the [`Core`](crate::core::Core) interface:
//! 1. **Emulation:** One macro-op per tick, no timing; the functional reference.
//! 2. **In-order:** A pipelined core with a block-caching fetch unit, early
//!    misprediction detection, latency and port modelling and in-order commit.
//! 3. **Out-of-order:** The same front end feeding register renaming, reservation
//!    stations, a load/store queue and a reorder buffer.

/// Functional reference core.
pub mod emulation;

/// Pipelined in-order core.
pub mod inorder;

/// Renaming out-of-order core.
pub mod outoforder;

pub use emulation::EmulationCore;
pub use inorder::InOrderCore;
pub use outoforder::OutOfOrderCore;
