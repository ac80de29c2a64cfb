//! Pending/delayed engine (component D): `IRR`/`IDR`/`IrrActive` bookkeeping
//! and replay of deferred hardware interrupts.
//!
//! `ReplayTable` is, like `DismissTable`, a tagged-variant table rather than
//! sixteen near-identical function pointers: slots 0-3 are the software
//! handlers, slots 4-19 are hardware replay entries that either execute a
//! genuine `int $imm8` (on real x86 hardware, so the CPU re-enters the vector
//! path exactly as if the device had fired again) or, under the `std` host
//! model where there is no IDT to re-enter, call the same dismiss/end
//! sequence directly - the dispatch-shim fallback the design notes permit
//! when immediate-operand `int` isn't available.

#[cfg(feature = "std")]
use crate::dismiss::begin_system_interrupt;
#[cfg(feature = "std")]
use crate::hooks::TrapFrame;
use crate::hooks::hooks;
#[cfg(feature = "std")]
use crate::levels::{irq_to_vector, vector_to_irql};
use crate::levels::{Irql, DISPATCH_LEVEL, IRQ_COUNT};
use crate::pcr::pcr;
use crate::soft;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayKind {
    Unexpected,
    Apc,
    Dispatch,
    HardwareEdge,
    HardwareLevel,
}

/// Slots 0-3 (software) followed by 4-19 (one per hardware IRQ).
const REPLAY_LEN: usize = 4 + IRQ_COUNT;

struct ReplayTable(core::cell::UnsafeCell<[ReplayKind; REPLAY_LEN]>);
// SAFETY: mutated only by `enable_system_interrupt`/`initialize_pics`, with
// CPU interrupts disabled, on the sole uniprocessor.
unsafe impl Sync for ReplayTable {}

static REPLAY_TABLE: ReplayTable = ReplayTable(core::cell::UnsafeCell::new([
    ReplayKind::Unexpected,
    ReplayKind::Apc,
    ReplayKind::Dispatch,
    ReplayKind::Unexpected,
    ReplayKind::HardwareEdge,
    ReplayKind::HardwareEdge,
    ReplayKind::HardwareEdge,
    ReplayKind::HardwareEdge,
    ReplayKind::HardwareEdge,
    ReplayKind::HardwareEdge,
    ReplayKind::HardwareEdge,
    ReplayKind::HardwareEdge,
    ReplayKind::HardwareEdge,
    ReplayKind::HardwareEdge,
    ReplayKind::HardwareEdge,
    ReplayKind::HardwareEdge,
    ReplayKind::HardwareEdge,
    ReplayKind::HardwareEdge,
    ReplayKind::HardwareEdge,
    ReplayKind::HardwareEdge,
]));

#[must_use]
pub fn kind_of(slot: usize) -> ReplayKind {
    unsafe { (*REPLAY_TABLE.0.get())[slot] }
}

/// Promotes the hardware replay entry for `irq` to its level variant. Must
/// be called with CPU interrupts disabled.
pub fn promote_irq_to_level(irq: u8) {
    unsafe {
        (*REPLAY_TABLE.0.get())[irq as usize + 4] = ReplayKind::HardwareLevel;
    }
}

/// The "second entry" table (slots 0-2): usable when a trap frame already
/// exists on the stack, for the tail returned by `end_system_interrupt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapTail {
    Unexpected,
    ApcTail,
    DispatchTail,
}

#[must_use]
pub fn trap_tail_for(slot: usize) -> TrapTail {
    match slot {
        1 => TrapTail::ApcTail,
        2 => TrapTail::DispatchTail,
        _ => TrapTail::Unexpected,
    }
}

/// Runs the synthetic re-entry for an edge-triggered hardware slot `irq`, on
/// real hardware via a genuine `int $imm8`, under the host model directly
/// through the dismiss and end-of-interrupt sequence. Only edge slots use
/// this: their dismissal never re-latches `IRR`, so re-entering the full
/// vector path is safe.
fn replay_hardware_edge(irq: u8) {
    #[cfg(not(feature = "std"))]
    {
        trampoline::fire(irq);
    }
    #[cfg(feature = "std")]
    {
        let vector = irq_to_vector(irq);
        let target_irql = vector_to_irql(vector);
        let (accepted, old) = begin_system_interrupt(target_irql, irq);
        if accepted {
            crate::irql::end_system_interrupt(old, &TrapFrame::default());
        }
    }
}

/// Invokes the replay entry for `slot`, used from a non-trap context (e.g.
/// `lower`'s single-iteration drain, or `request_software_interrupt`'s
/// immediate-invoke path).
///
/// A level-triggered hardware slot does *not* re-enter the dismiss path the
/// way an edge slot does: `dismiss_level_generic` unconditionally re-sets
/// `IRR[irq+4]` on every call (§4.3), so replaying it through
/// `begin_system_interrupt` again would re-latch the very bit this drain
/// just cleared and leave `Irql` stuck raised. §4.4's "level replay entry"
/// instead only pops whatever is currently the highest-priority pending
/// slot (`drain_one_level_tail`), which may or may not be this same IRQ,
/// and returns without touching the PIC's dismiss machinery again.
pub fn invoke(slot: usize) {
    match kind_of(slot) {
        ReplayKind::Unexpected => hooks().unexpected_interrupt(),
        ReplayKind::Apc => soft::apc_handler_inline(),
        ReplayKind::Dispatch => soft::dispatch_handler_inline(),
        ReplayKind::HardwareEdge => replay_hardware_edge((slot - 4) as u8),
        ReplayKind::HardwareLevel => drain_one_level_tail(),
    }
}

/// Drain protocol (§4.4), single iteration, as used from `lower`: consults
/// `PreemptMaskByIrql` at `current`; a pending hardware slot is unmasked to
/// `IDR` alone and replayed through the synthetic-INT path (which handles
/// itself end to end), a pending software slot is invoked in-line with no
/// trap frame. Either way this runs at most one item, never loops.
pub fn drain_one(current: Irql) {
    let mask = unsafe { pcr() }.irr & crate::tables::PREEMPT_MASK_BY_IRQL[current as usize];
    if mask == 0 {
        return;
    }
    let top = 31 - mask.leading_zeros() as usize;

    if top as Irql > DISPATCH_LEVEL {
        let p = unsafe { pcr() };
        crate::pic::program_mask(p.idr & crate::tables::PIC_MASK_BITS);
        p.irr ^= 1u32 << top;
    }
    invoke(top);
}

/// Full drain loop used from `end_system_interrupt`: runs until no hardware
/// slot is left pending, or a software slot surfaces (returned as the tail
/// the caller must run on its own trap frame), or the recursion guard fires.
pub fn drain_loop(current_at_entry: Irql) -> Option<TrapTail> {
    let mut current = current_at_entry;
    loop {
        let mask = unsafe { pcr() }.irr & crate::tables::PREEMPT_MASK_BY_IRQL[current as usize];
        if mask == 0 {
            return None;
        }
        if unsafe { pcr() }.irr_active & 0xFFFF_FFF0 != 0 {
            return None;
        }
        let top = 31 - mask.leading_zeros() as usize;

        if top as Irql > DISPATCH_LEVEL {
            let p = unsafe { pcr() };
            crate::pic::program_mask(p.idr & crate::tables::PIC_MASK_BITS);
            let bit = 1u32 << top;
            if p.irr_active & bit != 0 {
                return None;
            }
            p.irr_active |= bit;
            p.irr ^= bit;
            invoke(top);
            unsafe { pcr() }.irr_active ^= bit;
            current = unsafe { pcr() }.irql;
        } else {
            return Some(trap_tail_for(top));
        }
    }
}

/// Runs the remaining hardware-only portion of the drain loop for the level
/// replay entry (`hardware_interrupt_level`): pops at most one hardware
/// slot, then returns so the next device assertion re-fires through the PIC
/// naturally.
pub fn drain_one_level_tail() {
    let current = unsafe { pcr() }.irql;
    let mask = unsafe { pcr() }.irr & crate::tables::PREEMPT_MASK_BY_IRQL[current as usize];
    if mask == 0 {
        return;
    }
    if unsafe { pcr() }.irr_active & 0xFFFF_FFF0 != 0 {
        return;
    }
    let top = 31 - mask.leading_zeros() as usize;
    let bit = 1u32 << top;
    unsafe { pcr() }.irr ^= bit;
    invoke(top);
}

#[cfg(not(feature = "std"))]
mod trampoline {
    use core::arch::naked_asm;

    macro_rules! hardware_trampoline {
        ($name:ident, $vector:expr) => {
            #[unsafe(naked)]
            unsafe extern "C" fn $name() {
                naked_asm!(concat!("int ", stringify!($vector)), "ret");
            }
        };
    }

    hardware_trampoline!(irq0, 0x30);
    hardware_trampoline!(irq1, 0x31);
    hardware_trampoline!(irq2, 0x32);
    hardware_trampoline!(irq3, 0x33);
    hardware_trampoline!(irq4, 0x34);
    hardware_trampoline!(irq5, 0x35);
    hardware_trampoline!(irq6, 0x36);
    hardware_trampoline!(irq7, 0x37);
    hardware_trampoline!(irq8, 0x38);
    hardware_trampoline!(irq9, 0x39);
    hardware_trampoline!(irq10, 0x3A);
    hardware_trampoline!(irq11, 0x3B);
    hardware_trampoline!(irq12, 0x3C);
    hardware_trampoline!(irq13, 0x3D);
    hardware_trampoline!(irq14, 0x3E);
    hardware_trampoline!(irq15, 0x3F);

    const TRAMPOLINES: [unsafe extern "C" fn(); 16] = [
        irq0, irq1, irq2, irq3, irq4, irq5, irq6, irq7, irq8, irq9, irq10, irq11, irq12, irq13,
        irq14, irq15,
    ];

    pub fn fire(irq: u8) {
        unsafe { TRAMPOLINES[irq as usize]() }
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::dismiss::{self, DismissKind};
    use crate::levels::PROFILE_LEVEL;
    use crate::port;

    fn reset_all() {
        crate::pcr::reset();
        unsafe { (*pcr()).irql = 0 };
        for irq in 0..IRQ_COUNT as u8 {
            dismiss::set_kind(irq, DismissKind::EdgeGeneric);
        }
        port::enable();
    }

    #[test]
    fn deferred_edge_interrupt_replays_on_drain() {
        reset_all();
        unsafe { (*pcr()).irql = PROFILE_LEVEL - 3 };
        let (accepted, _old) = dismiss::begin_system_interrupt(PROFILE_LEVEL - 5, 5);
        assert!(!accepted);

        unsafe { (*pcr()).irql = 0 };
        let tail = drain_loop(0);
        assert!(tail.is_none());
        assert_eq!(unsafe { pcr() }.irr & (1 << 9), 0);
    }

    #[test]
    fn software_slot_surfaces_as_trap_tail() {
        reset_all();
        unsafe { (*pcr()).irr |= 1 << DISPATCH_LEVEL };
        let tail = drain_loop(0);
        assert_eq!(tail, Some(TrapTail::DispatchTail));
    }

    #[test]
    fn level_accept_with_pending_dpc_drains_to_dispatch_tail() {
        // Scenario S4: a level-triggered IRQ10 fires and is accepted while a
        // DPC is already pending. `dismiss_level_generic` unconditionally
        // re-latches IRR[14] even on accept (§4.3), so draining through
        // `end_system_interrupt` must pop that hardware slot via the level
        // replay entry rather than re-entering the dismiss path, or `Irql`
        // is left stuck raised and the pending DPC is never reached.
        reset_all();
        dismiss::promote_to_level(10);
        promote_irq_to_level(10);
        unsafe { (*pcr()).irr |= 1 << DISPATCH_LEVEL };

        let (accepted, old) = dismiss::begin_system_interrupt(PROFILE_LEVEL - 10, 10);
        assert!(accepted);
        assert_eq!(old, 0);
        assert_ne!(unsafe { pcr() }.irr & (1 << 14), 0);

        // Mirrors `end_system_interrupt`'s restore-then-drain sequence.
        unsafe { (*pcr()).irql = old };
        let tail = drain_loop(old);

        assert_eq!(tail, Some(TrapTail::DispatchTail));
        assert_eq!(unsafe { pcr() }.irr & (1 << 14), 0);
        assert_eq!(unsafe { pcr() }.irql, old);
    }

    #[test]
    fn clear_then_drain_does_not_replay_software_slot() {
        reset_all();
        unsafe { (*pcr()).irr |= 1 << DISPATCH_LEVEL };
        soft::clear_software_interrupt(DISPATCH_LEVEL);
        let tail = drain_loop(0);
        assert!(tail.is_none());
    }
}
