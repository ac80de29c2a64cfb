//! IRQL controller (component B): read, raise, and lower the current
//! priority level, and the trap-exit path (`end_system_interrupt`) that
//! drains pending work before a hardware ISR's `IRET`.

use crate::hooks::{hooks, BugcheckCode, TrapFrame};
use crate::levels::{Irql, APC_LEVEL, DISPATCH_LEVEL, HIGH_LEVEL, PASSIVE_LEVEL};
use crate::pcr::pcr;
use crate::replay::{self, TrapTail};
use crate::soft;

#[must_use]
pub fn current_irql() -> Irql {
    crate::pcr::snapshot().irql
}

/// Raises to `DISPATCH_LEVEL` if not already there or above, returning the
/// prior IRQL. A fast path for the lock-acquire case the scheduler hits most.
#[must_use]
pub fn raise_to_dpc() -> Irql {
    raise(DISPATCH_LEVEL)
}

#[must_use]
pub fn raise_to_synch() -> Irql {
    raise(crate::levels::SYNCH_LEVEL)
}

/// Raises the current IRQL to `new`, returning the prior value.
///
/// # Panics (via bugcheck)
/// Bugchecks with `IrqlNotGreaterOrEqual` if `new` is below the current IRQL.
/// Before calling the hook, `Irql` is set to `PASSIVE_LEVEL` - matching the
/// original HAL's behavior of clobbering the level on the way into a fatal
/// bugcheck rather than leaving it at the inconsistent caller-supplied value.
#[must_use]
pub fn raise(new: Irql) -> Irql {
    let saved = crate::port::disable();
    let p = unsafe { pcr() };
    let old = p.irql;
    if new < old {
        p.irql = PASSIVE_LEVEL;
        crate::port::restore(saved);
        hooks().bugcheck(BugcheckCode::IrqlNotGreaterOrEqual);
    }
    p.irql = new;
    crate::port::restore(saved);
    old
}

/// Lowers the current IRQL to `old`, then runs a single iteration of the
/// drain protocol so any hardware or software work unmasked by the lower
/// replays immediately, then restores the interrupt-enable state to what it
/// was before this call.
///
/// # Panics (via bugcheck)
/// Bugchecks with `IrqlNotLessOrEqual` if `old` is above the current IRQL.
/// `Irql` is set to `HIGH_LEVEL` before the hook runs, mirroring `raise`'s
/// analogous clobber-to-a-fixed-value-before-bugcheck behavior but at the
/// opposite end of the range, matching the original asymmetry verbatim.
pub fn lower(old: Irql) {
    let saved = crate::port::disable();
    let p = unsafe { pcr() };
    let current = p.irql;
    if old > current {
        p.irql = HIGH_LEVEL;
        crate::port::restore(saved);
        hooks().bugcheck(BugcheckCode::IrqlNotLessOrEqual);
    }
    p.irql = old;
    replay::drain_one(old);
    crate::port::restore(saved);
}

/// Drain-protocol tail resolution for the hardware-vector trap-exit path:
/// restores `old_irql`, then loops until no hardware slot remains pending or
/// a software slot surfaces, running that slot's handler against the given
/// trap frame before the caller's `IRET`.
pub fn end_system_interrupt(old_irql: Irql, trap_frame: &TrapFrame) {
    unsafe { pcr() }.irql = old_irql;
    if let Some(tail) = replay::drain_loop(old_irql) {
        let mut tf = *trap_frame;
        match tail {
            TrapTail::ApcTail => soft::apc_handler_2nd_entry(&mut tf),
            TrapTail::DispatchTail => soft::dispatch_handler_2nd_entry(&mut tf),
            TrapTail::Unexpected => hooks().unexpected_interrupt(),
        }
    }
}

/// Replay entry for a level-triggered hardware IRQ that reasserted while
/// still masked: pops at most one hardware slot rather than looping, so a
/// still-asserted line is left to re-fire through the PIC naturally instead
/// of spinning here.
pub fn hardware_interrupt_level() {
    replay::drain_one_level_tail();
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::hooks::{ApcMode, KernelHooks};
    use crate::levels::PROFILE_LEVEL;
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHooks {
        dpc_calls: AtomicUsize,
        unexpected_calls: AtomicUsize,
    }

    impl KernelHooks for CountingHooks {
        fn deliver_apc(&self, _mode: ApcMode, _trap_frame: &mut TrapFrame) {}
        fn dispatch_dpc(&self) {
            self.dpc_calls.fetch_add(1, Ordering::SeqCst);
        }
        fn unexpected_interrupt(&self) {
            self.unexpected_calls.fetch_add(1, Ordering::SeqCst);
        }
        fn trap_enter(&self, _trap_frame: &mut TrapFrame) {}
        fn eoi_helper(&self, _trap_frame: &TrapFrame) -> ! {
            panic!("eoi_helper reached in end_system_interrupt test");
        }
        fn bugcheck(&self, code: BugcheckCode) -> ! {
            panic!("bugcheck: {code:?}");
        }
        fn register_vector(&self, _vector: u8, _irql: Irql) {}
        fn initialize_legacy_pics(&self) {}
    }

    static HOOKS: CountingHooks =
        CountingHooks { dpc_calls: AtomicUsize::new(0), unexpected_calls: AtomicUsize::new(0) };

    fn reset_all() {
        crate::pcr::reset();
        unsafe { (*pcr()).irql = 0 };
        crate::hooks::register(&HOOKS);
        crate::port::enable();
    }

    #[test]
    fn raise_then_lower_round_trips_irql() {
        reset_all();
        let old = raise(PROFILE_LEVEL - 4);
        assert_eq!(old, 0);
        assert_eq!(current_irql(), PROFILE_LEVEL - 4);
        lower(old);
        assert_eq!(current_irql(), 0);
    }

    #[test]
    #[should_panic(expected = "IrqlNotGreaterOrEqual")]
    fn raise_below_current_bugchecks() {
        reset_all();
        unsafe { (*pcr()).irql = DISPATCH_LEVEL };
        raise(APC_LEVEL);
    }

    #[test]
    #[should_panic(expected = "IrqlNotLessOrEqual")]
    fn lower_above_current_bugchecks() {
        reset_all();
        unsafe { (*pcr()).irql = APC_LEVEL };
        lower(DISPATCH_LEVEL);
    }

    #[test]
    fn lower_drains_a_pending_dpc_inline() {
        reset_all();
        let old = raise(DISPATCH_LEVEL);
        unsafe { (*pcr()).irr |= 1 << DISPATCH_LEVEL };
        let before = HOOKS.dpc_calls.load(Ordering::SeqCst);
        lower(old);
        assert_eq!(HOOKS.dpc_calls.load(Ordering::SeqCst), before + 1);
        assert_eq!(current_irql(), 0);
    }

    #[test]
    fn end_system_interrupt_with_nothing_pending_just_restores_irql() {
        reset_all();
        unsafe { (*pcr()).irql = PROFILE_LEVEL - 4 };
        end_system_interrupt(0, &TrapFrame::default());
        assert_eq!(current_irql(), 0);
    }
}
