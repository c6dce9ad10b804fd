//! Pipeline units.
//!
//! Both timing cores are built from these units connected by [`buffer::PipelineBuffer`]s.
//!
//! Shared front end:
//! 1. **Fetch:** Block cache, loop buffer, predecode and branch prediction.
//! 2. **Decode:** Macro-op splitting and early misprediction detection.
//!
//! In-order back end:
//! 3. **Execute:** Operand collection, issue, latency modelling and branch resolution.
//! 4. **Writeback:** In-order commit into the register file and memory.
//! 5. **Dependencies:** The register dependency map used for forwarding.
//!
//! Out-of-order back end:
//! 3. **Rename:** Register alias table and reorder buffer allocation.
//! 4. **Dispatch/issue:** Reservation stations, operand scoreboard and port allocation.
//! 5. **Execution units:** One latency pipeline per issue port.
//! 6. **Load/store queue:** Memory ordering and load completion.
//! 7. **Reorder buffer:** In-order commit, exception detection and loop detection.

/// Double-row buffers between units.
pub mod buffer;

/// Decode unit.
pub mod decode;

/// Reservation stations and issue.
pub mod dispatch;

/// Execute unit.
pub mod execute;

/// Out-of-order execution unit.
pub mod execution_unit;

/// Fetch unit with block cache.
pub mod fetch;

/// Load/store queue.
pub mod lsq;

/// Issue port allocators.
pub mod port_allocator;

/// Register alias table.
pub mod rat;

/// Register dependency map.
pub mod reg_dep;

/// Rename unit.
pub mod rename;

/// Reorder buffer.
pub mod rob;

/// Writeback unit.
pub mod writeback;
