//! Dispatch/issue unit of the out-of-order pipeline.
//!
//! Renamed micro-ops enter a reservation station chosen through the port
//! allocator and leave it, oldest ready first, for the issue port they were
//! allocated to. Each cycle:
//! 1. **Dispatch:** In program order, each micro-op reads the operands the
//!    scoreboard marks ready from the physical register file and claims an entry
//!    in the station of its allocated port. A station accepts at most its dispatch
//!    rate per cycle; a micro-op that finds no room stalls the input buffer.
//! 2. **Forwarding:** Executed results mark their physical registers ready and
//!    are supplied to every waiting micro-op that reads them.
//! 3. **Issue:** Each port with a free slot takes the oldest micro-op allocated to
//!    it whose operands are all present.
//!
//! A micro-op that already carries an exception, or that no port supports, skips
//! the stations and is written straight back to the reorder buffer.

use tracing::trace;

use crate::common::reg::{Register, RegisterFileSet, RegisterFileStructure};
use crate::config::OutOfOrderConfig;
use crate::core::pipeline::buffer::PipelineBuffer;
use crate::core::pipeline::port_allocator::{PortAllocator, PortAllocatorWrapper, PortCandidate};
use crate::core::pipeline::rob::ReorderBuffer;
use crate::isa::instruction::Instruction;

#[derive(Clone, Debug)]
struct StationEntry {
    port: usize,
    uop: Instruction,
}

#[derive(Clone, Debug)]
struct ReservationStation {
    capacity: usize,
    dispatch_rate: usize,
    dispatched: usize,
    /// Program order.
    entries: Vec<StationEntry>,
}

impl ReservationStation {
    fn accepts(&self) -> bool {
        self.entries.len() < self.capacity && self.dispatched < self.dispatch_rate
    }

    fn blocked_cycles(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| u64::from(e.uop.stall_cycles()))
            .sum()
    }
}

/// Reservation stations, scoreboard and port allocation.
#[derive(Clone, Debug)]
pub struct DispatchIssueUnit {
    stations: Vec<ReservationStation>,
    /// Port index to the station feeding it.
    port_station: Vec<usize>,
    allocator: PortAllocatorWrapper,
    /// Readiness of every physical register.
    scoreboard: Vec<Vec<bool>>,

    station_full_stalls: u64,
    port_busy_stalls: u64,
    frontend_stalls: u64,
}

impl DispatchIssueUnit {
    /// Creates the stations described by `config` for `ports` issue ports.
    ///
    /// # Arguments
    ///
    /// * `config` - Station sizes, rates, port mapping and allocator kind;
    ///   assumed validated.
    /// * `ports` - Number of issue ports.
    /// * `physical` - Physical register file shape, for the scoreboard.
    pub fn new(config: &OutOfOrderConfig, ports: usize, physical: &[RegisterFileStructure]) -> Self {
        let mut port_station = vec![0; ports];
        let stations = config
            .reservation_stations
            .iter()
            .enumerate()
            .map(|(index, station)| {
                if station.ports.is_empty() {
                    port_station.fill(index);
                }
                for &port in &station.ports {
                    if let Some(owner) = port_station.get_mut(usize::from(port)) {
                        *owner = index;
                    }
                }
                ReservationStation {
                    capacity: station.size,
                    dispatch_rate: station.dispatch_rate,
                    dispatched: 0,
                    entries: Vec::with_capacity(station.size),
                }
            })
            .collect();
        Self {
            stations,
            port_station,
            allocator: PortAllocatorWrapper::new(config.port_allocator, ports),
            scoreboard: physical
                .iter()
                .map(|bank| vec![true; usize::from(bank.quantity)])
                .collect(),
            station_full_stalls: 0,
            port_busy_stalls: 0,
            frontend_stalls: 0,
        }
    }

    fn is_ready(&self, reg: Register) -> bool {
        self.scoreboard
            .get(reg.kind.index())
            .and_then(|bank| bank.get(usize::from(reg.tag)))
            .copied()
            .unwrap_or(true)
    }

    fn mark(&mut self, reg: Register, ready: bool) {
        if let Some(slot) = self
            .scoreboard
            .get_mut(reg.kind.index())
            .and_then(|bank| bank.get_mut(usize::from(reg.tag)))
        {
            *slot = ready;
        }
    }

    /// Dispatches the head row of `input` into the reservation stations.
    ///
    /// # Arguments
    ///
    /// * `input` - Rename-to-dispatch buffer; stalled while a micro-op finds no room.
    /// * `registers` - Physical register file.
    /// * `rob` - Receives micro-ops that skip the stations.
    pub fn tick(
        &mut self,
        input: &mut PipelineBuffer<Instruction>,
        registers: &RegisterFileSet,
        rob: &mut ReorderBuffer,
    ) {
        for station in &mut self.stations {
            station.dispatched = 0;
        }
        if input.head_slots().iter().all(Option::is_none) {
            self.frontend_stalls += 1;
        }

        for slot in input.head_slots_mut() {
            let Some(uop) = slot.as_mut() else {
                continue;
            };
            if uop.exception_encountered() || uop.supported_ports().is_empty() {
                if let Some(uop) = slot.take() {
                    let _ = rob.writeback(uop);
                }
                continue;
            }

            let candidates: Vec<PortCandidate> = uop
                .execution_info()
                .ports
                .iter()
                .filter_map(|&port| {
                    let port = usize::from(port);
                    let station = self.stations.get(*self.port_station.get(port)?)?;
                    station.accepts().then(|| PortCandidate {
                        port,
                        free_entries: station.capacity - station.entries.len(),
                        blocked_cycles: station.blocked_cycles(),
                    })
                })
                .collect();
            let Some(port) = self.allocator.allocate(&candidates) else {
                self.station_full_stalls += 1;
                break;
            };

            let Some(mut uop) = slot.take() else {
                continue;
            };
            let sources = uop.source_registers().to_vec();
            for (i, reg) in sources.into_iter().enumerate() {
                if !uop.is_operand_ready(i) && self.is_ready(reg) {
                    uop.supply_operand(i, registers.get(reg));
                }
            }
            for &reg in uop.destination_registers() {
                self.mark(reg, false);
            }
            trace!(
                address = format_args!("{:#x}", uop.instruction_address()),
                port,
                "dispatched"
            );
            if let Some(station) = self.stations.get_mut(self.port_station[port]) {
                station.dispatched += 1;
                station.entries.push(StationEntry { port, uop });
            }
        }

        let waiting = input.head_slots().iter().any(Option::is_some);
        input.stall(waiting);
    }

    /// Marks the destinations of an executed `uop` ready and supplies its results
    /// to the micro-ops waiting for them.
    pub fn forward_operands(&mut self, uop: &Instruction) {
        for (&reg, &value) in uop.destination_registers().iter().zip(uop.results()) {
            self.mark(reg, true);
            for entry in self.stations.iter_mut().flat_map(|s| s.entries.iter_mut()) {
                let sources = entry.uop.source_registers().to_vec();
                for (i, source) in sources.into_iter().enumerate() {
                    if source == reg && !entry.uop.is_operand_ready(i) {
                        entry.uop.supply_operand(i, value);
                    }
                }
            }
        }
    }

    /// Issues at most one ready micro-op to each port with a free slot.
    pub fn issue(&mut self, ports: &mut [PipelineBuffer<Instruction>]) {
        for (port, buffer) in ports.iter_mut().enumerate() {
            let Some(station) = self
                .port_station
                .get(port)
                .and_then(|&s| self.stations.get_mut(s))
            else {
                continue;
            };
            let Some(index) = station
                .entries
                .iter()
                .position(|e| e.port == port && e.uop.can_execute())
            else {
                continue;
            };
            let Some(slot) = buffer.tail_slots_mut().first_mut().filter(|s| s.is_none()) else {
                self.port_busy_stalls += 1;
                continue;
            };
            let entry = station.entries.remove(index);
            *slot = Some(entry.uop);
            self.allocator.issued(port);
        }
    }

    /// Drops waiting micro-ops younger than instruction `after`.
    pub fn purge_flushed(&mut self, after: u64) {
        let allocator = &mut self.allocator;
        for station in &mut self.stations {
            station.entries.retain(|e| {
                let keep = e.uop.instruction_id() <= after;
                if !keep {
                    allocator.deallocate(e.port);
                }
                keep
            });
        }
    }

    /// Drops every waiting micro-op and marks every physical register ready.
    pub fn flush(&mut self) {
        for station in &mut self.stations {
            for entry in station.entries.drain(..) {
                self.allocator.deallocate(entry.port);
            }
        }
        for bank in &mut self.scoreboard {
            bank.fill(true);
        }
    }

    /// Returns `true` if no micro-op is waiting.
    pub fn is_empty(&self) -> bool {
        self.stations.iter().all(|s| s.entries.is_empty())
    }

    /// Micro-ops waiting in the stations.
    pub fn occupancy(&self) -> usize {
        self.stations.iter().map(|s| s.entries.len()).sum()
    }

    /// Cycles dispatch stopped because no station could take the next micro-op.
    pub const fn station_full_stalls(&self) -> u64 {
        self.station_full_stalls
    }

    /// Ready micro-ops that found their port's slot taken.
    pub const fn port_busy_stalls(&self) -> u64 {
        self.port_busy_stalls
    }

    /// Cycles with nothing to dispatch.
    pub const fn frontend_stalls(&self) -> u64 {
        self.frontend_stalls
    }
}
