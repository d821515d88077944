//! # Cortex-M4 Port Layer
//!
//! Hardware cycle clock and scheduler tick for the ARM Cortex-M4.
//!
//! ## Cycle Counter
//!
//! The DWT unit's `CYCCNT` register counts core clock cycles. It is 32 bits
//! wide, so [`DwtClock`] extends it to 64 bits with a [`WrapExtender`] kept
//! inside a critical section. The counter must be read at least once per
//! wrap; the scheduler tick guarantees that.
//!
//! ## Scheduler Tick
//!
//! SysTick fires every quantum and its handler calls
//! `Scheduler::tick(clock.now())`. It runs at the lowest priority so it
//! never delays application interrupts.

use core::cell::RefCell;

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{DCB, DWT, SYST};
use critical_section::Mutex;
use log::info;

use crate::clock::{CycleClock, WrapExtender};
use crate::error::ResourceKind;
use crate::supervisor::TaskHost;
use crate::sync::critical_section;
use crate::task::{TaskConfig, TaskId};

/// SysTick reload register width.
const SYST_MAX_RELOAD: u32 = 0x00FF_FFFF;

// ---------------------------------------------------------------------------
// DWT cycle clock
// ---------------------------------------------------------------------------

pub struct DwtClock {
    ext: Mutex<RefCell<WrapExtender>>,
}

impl DwtClock {
    /// Enable trace and the DWT cycle counter.
    ///
    /// Implementations that synthesised the DWT without `CYCCNT`
    /// (`DWT_CTRL.NOCYCCNT` set) yield [`ResourceKind::Clock`].
    pub fn enable(dcb: &mut DCB, dwt: &mut DWT) -> Result<Self, ResourceKind> {
        dcb.enable_trace();
        if !dwt.has_cycle_counter() {
            return Err(ResourceKind::Clock);
        }
        dwt.enable_cycle_counter();
        info!("DWT cycle counter enabled");
        Ok(Self { ext: Mutex::new(RefCell::new(WrapExtender::new())) })
    }
}

impl CycleClock for DwtClock {
    fn now(&self) -> u64 {
        critical_section(|cs| {
            let raw = DWT::cycle_count();
            self.ext.borrow(cs).borrow_mut().extend(raw)
        })
    }
}

/// Task host for bare-metal boards: every task measures itself with the
/// cycle counter, so none can start without one.
pub struct BoardHost<'c> {
    clock: Option<&'c DwtClock>,
}

impl<'c> BoardHost<'c> {
    pub fn new(clock: Option<&'c DwtClock>) -> Self {
        Self { clock }
    }
}

impl TaskHost for BoardHost<'_> {
    fn prepare(&mut self, _id: TaskId, _config: &TaskConfig) -> Result<(), ResourceKind> {
        self.clock.map(|_| ()).ok_or(ResourceKind::Clock)
    }
}

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Fire SysTick every `quantum` core cycles, capped at the 24-bit reload
/// range.
pub fn configure_tick(syst: &mut SYST, quantum: u32) {
    let reload = quantum.saturating_sub(1).clamp(1, SYST_MAX_RELOAD);
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}
