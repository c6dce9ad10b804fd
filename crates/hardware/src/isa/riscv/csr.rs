//! Control and status registers modelled by the simulator.

use crate::common::reg::Register;

/// `cycle` counter.
pub const CYCLE: u16 = 0xC00;
/// `time` counter.
pub const TIME: u16 = 0xC01;
/// `instret` counter.
pub const INSTRET: u16 = 0xC02;
/// Accrued floating-point exception flags.
pub const FFLAGS: u16 = 0x001;
/// Floating-point rounding mode.
pub const FRM: u16 = 0x002;
/// Combined floating-point control and status.
pub const FCSR: u16 = 0x003;

/// CSR addresses in system register bank order.
const MAPPED: [u16; 6] = [CYCLE, TIME, INSTRET, FFLAGS, FRM, FCSR];

/// Number of system registers.
pub const COUNT: u16 = MAPPED.len() as u16;

/// System register backing CSR `address`, if it is modelled.
pub fn register(address: u16) -> Option<Register> {
    MAPPED
        .iter()
        .position(|&csr| csr == address)
        .map(|tag| Register::system(tag as u16))
}

/// Returns `true` for the user-level counters, which cannot be written.
pub const fn is_read_only(address: u16) -> bool {
    matches!(address, CYCLE | TIME | INSTRET)
}
