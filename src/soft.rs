//! Software interrupt surface (component E): request/clear of APC- and
//! DISPATCH-level software interrupts, and the APC/DPC trap handlers that
//! route through the same pending-bit machinery as hardware IRQs.
//!
//! Each handler has three forms, one inner body shared by all three:
//! - `*_entry`: reached from a bare hardware vector with no trap frame yet;
//!   synthesizes a minimal one before falling into the shared body.
//! - `*_2nd_entry`: reached when a trap frame already exists (re-entry from
//!   a drain-protocol tail); skips straight to the shared body.
//! - `*_inline`: reached from `lower`/`request_software_interrupt`'s
//!   immediate-invoke path, which has no trap frame at all and must return
//!   normally rather than tail into the IRET helper.

use crate::hooks::{hooks, ApcMode, TrapFrame};
use crate::levels::{Irql, APC_LEVEL, DISPATCH_LEVEL};
use crate::pcr::pcr;
use crate::replay::{self, TrapTail};
use crate::tables::SOFT_IRQL_FROM_IRR;

/// Sets the IRR bit for `irql` (APC_LEVEL or DISPATCH_LEVEL) and, if that
/// makes it the highest pending software IRQL and it now exceeds the
/// current IRQL, invokes it immediately.
pub fn request_software_interrupt(irql: Irql) {
    let saved = crate::port::disable();
    let p = unsafe { pcr() };
    p.irr |= 1 << irql;
    let pending = SOFT_IRQL_FROM_IRR[(p.irr & 0b111) as usize];
    if pending > p.irql {
        replay::invoke(pending as usize);
    }
    crate::port::restore(saved);
}

pub fn clear_software_interrupt(irql: Irql) {
    unsafe { pcr() }.irr &= !(1 << irql);
}

fn apc_body(trap_frame: &mut TrapFrame) -> Irql {
    let p = unsafe { pcr() };
    let old = p.irql;
    p.irql = APC_LEVEL;
    p.irr &= !(1 << APC_LEVEL);

    crate::port::enable();
    let mode = if trap_frame.is_user_mode() { ApcMode::User } else { ApcMode::Kernel };
    hooks().deliver_apc(mode, trap_frame);
    crate::port::disable();
    old
}

fn dispatch_body(trap_frame: &mut TrapFrame) -> Irql {
    let _ = trap_frame;
    let p = unsafe { pcr() };
    let old = p.irql;
    p.irql = DISPATCH_LEVEL;
    p.irr &= !(1 << DISPATCH_LEVEL);

    crate::port::enable();
    hooks().dispatch_dpc();
    crate::port::disable();
    old
}

/// Drain-protocol tail resolution for a context that does have a real trap
/// frame: restores `old`, drains, and either returns or tail-diverges into
/// the appropriate `*_2nd_entry` handler.
fn end_software_interrupt(old: Irql, trap_frame: &mut TrapFrame) {
    unsafe { pcr() }.irql = old;
    if let Some(tail) = replay::drain_loop(old) {
        match tail {
            TrapTail::ApcTail => apc_handler_2nd_entry(trap_frame),
            TrapTail::DispatchTail => dispatch_handler_2nd_entry(trap_frame),
            TrapTail::Unexpected => hooks().unexpected_interrupt(),
        }
    }
}

/// Same resolution for the inline (no real trap, no IRET) case: any further
/// tail is resolved in-process rather than handed to `eoi_helper`.
fn end_software_interrupt_inline(old: Irql) {
    unsafe { pcr() }.irql = old;
    if let Some(tail) = replay::drain_loop(old) {
        match tail {
            TrapTail::ApcTail => apc_handler_inline(),
            TrapTail::DispatchTail => dispatch_handler_inline(),
            TrapTail::Unexpected => hooks().unexpected_interrupt(),
        }
    }
}

/// Bare hardware-vector entry: builds a synthetic trap image before the
/// shared body, never returns (tail-transfers to `eoi_helper`).
pub fn apc_handler_entry(trap_frame: &mut TrapFrame) -> ! {
    hooks().trap_enter(trap_frame);
    let old = apc_body(trap_frame);
    end_software_interrupt(old, trap_frame);
    hooks().eoi_helper(trap_frame)
}

/// Re-entry with a trap frame already built (drain-protocol tail).
pub fn apc_handler_2nd_entry(trap_frame: &mut TrapFrame) -> ! {
    let old = apc_body(trap_frame);
    end_software_interrupt(old, trap_frame);
    hooks().eoi_helper(trap_frame)
}

/// Invoked in-line from `lower`/`request_software_interrupt` with no trap
/// frame at all; returns normally to its caller.
pub fn apc_handler_inline() {
    let mut trap_frame = TrapFrame::default();
    let old = apc_body(&mut trap_frame);
    end_software_interrupt_inline(old);
}

pub fn dispatch_handler_entry(trap_frame: &mut TrapFrame) -> ! {
    hooks().trap_enter(trap_frame);
    let old = dispatch_body(trap_frame);
    end_software_interrupt(old, trap_frame);
    hooks().eoi_helper(trap_frame)
}

pub fn dispatch_handler_2nd_entry(trap_frame: &mut TrapFrame) -> ! {
    let old = dispatch_body(trap_frame);
    end_software_interrupt(old, trap_frame);
    hooks().eoi_helper(trap_frame)
}

pub fn dispatch_handler_inline() {
    let mut trap_frame = TrapFrame::default();
    let old = dispatch_body(&mut trap_frame);
    end_software_interrupt_inline(old);
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::hooks::{BugcheckCode, KernelHooks};
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHooks {
        dpc_calls: AtomicUsize,
    }

    impl KernelHooks for CountingHooks {
        fn deliver_apc(&self, _mode: ApcMode, _trap_frame: &mut TrapFrame) {}
        fn dispatch_dpc(&self) {
            self.dpc_calls.fetch_add(1, Ordering::SeqCst);
        }
        fn unexpected_interrupt(&self) {}
        fn trap_enter(&self, _trap_frame: &mut TrapFrame) {}
        fn eoi_helper(&self, _trap_frame: &TrapFrame) -> ! {
            panic!("eoi_helper reached in inline test path");
        }
        fn bugcheck(&self, code: BugcheckCode) -> ! {
            panic!("bugcheck: {code:?}");
        }
        fn register_vector(&self, _vector: u8, _irql: Irql) {}
        fn initialize_legacy_pics(&self) {}
    }

    static HOOKS: CountingHooks = CountingHooks { dpc_calls: AtomicUsize::new(0) };

    fn reset_all() {
        crate::pcr::reset();
        unsafe { (*pcr()).irql = 0 };
        crate::hooks::register(&HOOKS);
        crate::port::enable();
    }

    #[test]
    fn request_at_higher_irql_than_current_invokes_immediately() {
        reset_all();
        let before = HOOKS.dpc_calls.load(Ordering::SeqCst);
        request_software_interrupt(DISPATCH_LEVEL);
        assert_eq!(HOOKS.dpc_calls.load(Ordering::SeqCst), before + 1);
        assert_eq!(unsafe { pcr() }.irr & (1 << DISPATCH_LEVEL), 0);
        assert_eq!(unsafe { pcr() }.irql, 0);
    }

    #[test]
    fn request_at_or_below_current_irql_only_sets_irr() {
        reset_all();
        unsafe { (*pcr()).irql = DISPATCH_LEVEL };
        let before = HOOKS.dpc_calls.load(Ordering::SeqCst);
        request_software_interrupt(DISPATCH_LEVEL);
        assert_eq!(HOOKS.dpc_calls.load(Ordering::SeqCst), before);
        assert_ne!(unsafe { pcr() }.irr & (1 << DISPATCH_LEVEL), 0);
    }

    #[test]
    fn clear_software_interrupt_drops_the_irr_bit() {
        reset_all();
        unsafe { (*pcr()).irr |= 1 << APC_LEVEL };
        clear_software_interrupt(APC_LEVEL);
        assert_eq!(unsafe { pcr() }.irr & (1 << APC_LEVEL), 0);
    }
}
