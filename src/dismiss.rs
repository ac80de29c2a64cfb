//! Dismissal dispatcher (component C): per-IRQ entry handler reached from
//! every hardware-interrupt vector stub.
//!
//! `DismissTable` is a tagged-variant table rather than raw function-pointer
//! mutation (§9 design notes): the handful of real shapes an IRQ's dismissal
//! can take - generic, or one of the three spurious/latch quirks, each in an
//! edge or level flavor - are named outright, and `begin_system_interrupt`
//! dispatches on the tag. Mode switching (`enable_system_interrupt`) mutates
//! the tag in place rather than swapping a pointer, and is only ever done
//! with CPU interrupts disabled.

use crate::levels::{Irql, IRQ_COUNT};
use crate::pcr::pcr;
use crate::pic;
use crate::port;
use crate::tables::PIC_MASK_BY_IRQL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissKind {
    EdgeGeneric,
    EdgeIr07,
    EdgeIr13,
    EdgeIr15,
    LevelGeneric,
    LevelIr07,
    LevelIr13,
    LevelIr15,
}

impl DismissKind {
    #[must_use]
    pub const fn is_level(self) -> bool {
        matches!(
            self,
            Self::LevelGeneric | Self::LevelIr07 | Self::LevelIr13 | Self::LevelIr15
        )
    }

    /// Returns the level-triggered counterpart of this entry, preserving
    /// whichever quirk (IR7/IR13/IR15, or none) it already carries.
    #[must_use]
    pub const fn to_level(self) -> Self {
        match self {
            Self::EdgeGeneric | Self::LevelGeneric => Self::LevelGeneric,
            Self::EdgeIr07 | Self::LevelIr07 => Self::LevelIr07,
            Self::EdgeIr13 | Self::LevelIr13 => Self::LevelIr13,
            Self::EdgeIr15 | Self::LevelIr15 => Self::LevelIr15,
        }
    }
}

struct DismissTable(core::cell::UnsafeCell<[DismissKind; IRQ_COUNT]>);
// SAFETY: mutated only by `enable_system_interrupt`/`initialize_pics`, both of
// which run with CPU interrupts disabled on the sole uniprocessor.
unsafe impl Sync for DismissTable {}

static DISMISS_TABLE: DismissTable = DismissTable(core::cell::UnsafeCell::new([
    DismissKind::EdgeGeneric, // IRQ 0
    DismissKind::EdgeGeneric, // IRQ 1
    DismissKind::EdgeGeneric, // IRQ 2 (cascade)
    DismissKind::EdgeGeneric, // IRQ 3
    DismissKind::EdgeGeneric, // IRQ 4
    DismissKind::EdgeGeneric, // IRQ 5
    DismissKind::EdgeGeneric, // IRQ 6
    DismissKind::EdgeIr07,    // IRQ 7
    DismissKind::EdgeGeneric, // IRQ 8
    DismissKind::EdgeGeneric, // IRQ 9
    DismissKind::EdgeGeneric, // IRQ 10
    DismissKind::EdgeGeneric, // IRQ 11
    DismissKind::EdgeGeneric, // IRQ 12
    DismissKind::EdgeIr13,    // IRQ 13
    DismissKind::EdgeGeneric, // IRQ 14
    DismissKind::EdgeIr15,    // IRQ 15
]));

#[must_use]
pub fn kind_of(irq: u8) -> DismissKind {
    unsafe { (*DISMISS_TABLE.0.get())[irq as usize] }
}

/// Overwrites the dismissal-table entry for `irq`. Must be called with CPU
/// interrupts disabled.
pub fn set_kind(irq: u8, kind: DismissKind) {
    unsafe {
        (*DISMISS_TABLE.0.get())[irq as usize] = kind;
    }
}

/// Promotes the entry for `irq` to its level-triggered counterpart, keeping
/// whatever quirk selection it already has.
pub fn promote_to_level(irq: u8) {
    let current = kind_of(irq);
    set_kind(irq, current.to_level());
}

fn combined_pic_mask(irql: Irql) -> u32 {
    (PIC_MASK_BY_IRQL[irql as usize] | unsafe { pcr() }.idr) & crate::tables::PIC_MASK_BITS
}

/// Generic edge dismissal shared by every non-quirky edge entry.
fn dismiss_edge_generic(target_irql: Irql, irq: u8) -> (bool, Irql) {
    let p = unsafe { pcr() };
    let current = p.irql;

    if target_irql > current {
        p.irql = target_irql;
        pic::send_specific_eoi(irq);
        port::enable();
        (true, current)
    } else {
        p.irr |= 1 << (irq + 4);
        pic::program_mask(combined_pic_mask(current));
        log::debug!("[uphal::dismiss] edge irq {irq} deferred at irql {current}, mask tightened");
        (false, current)
    }
}

/// Generic level dismissal: EOI and tighter mask happen eagerly, before the
/// accept/defer decision, because the line stays asserted until serviced.
fn dismiss_level_generic(target_irql: Irql, irq: u8) -> (bool, Irql) {
    let p = unsafe { pcr() };
    pic::program_mask(combined_pic_mask(target_irql));
    log::debug!("[uphal::dismiss] level irq {irq} mask raised to irql {target_irql} ahead of EOI");
    p.irr |= 1 << (irq + 4);

    let current = p.irql;
    pic::send_specific_eoi(irq);

    if target_irql > current {
        p.irql = target_irql;
        port::enable();
        (true, current)
    } else {
        (false, current)
    }
}

/// Returns `true` if the real IR7 bit is set on the given PIC's ISR; if not,
/// this acknowledge was spurious.
fn ir7_really_asserted(master: bool) -> bool {
    let isr = if master { pic::read_isr_master() } else { pic::read_isr_slave() };
    isr & 0x80 != 0
}

/// Entry point for every hardware-interrupt vector stub.
///
/// Returns `(accepted, old_irql)`. When `accepted` is `false` the caller must
/// IRET without running the device ISR and without any further EOI: the
/// interrupt remains latched in `IRR` and will be replayed on drain.
#[must_use]
pub fn begin_system_interrupt(target_irql: Irql, irq: u8) -> (bool, Irql) {
    match kind_of(irq) {
        DismissKind::EdgeGeneric => dismiss_edge_generic(target_irql, irq),
        DismissKind::EdgeIr13 => {
            pic::clear_fpu_busy_latch();
            dismiss_edge_generic(target_irql, irq)
        }
        DismissKind::EdgeIr07 => {
            if !ir7_really_asserted(true) {
                log::warn!("[uphal::dismiss] spurious IR7 on master, no EOI sent");
                return (false, unsafe { pcr() }.irql);
            }
            dismiss_edge_generic(target_irql, irq)
        }
        DismissKind::EdgeIr15 => {
            if !ir7_really_asserted(false) {
                log::warn!("[uphal::dismiss] spurious IR15 on slave, cascade-only EOI sent");
                pic::send_cascade_eoi();
                return (false, unsafe { pcr() }.irql);
            }
            dismiss_edge_generic(target_irql, irq)
        }
        DismissKind::LevelGeneric => dismiss_level_generic(target_irql, irq),
        DismissKind::LevelIr13 => {
            pic::clear_fpu_busy_latch();
            dismiss_level_generic(target_irql, irq)
        }
        DismissKind::LevelIr07 => {
            if !ir7_really_asserted(true) {
                log::warn!("[uphal::dismiss] spurious IR7 on master, no EOI sent");
                return (false, unsafe { pcr() }.irql);
            }
            dismiss_level_generic(target_irql, irq)
        }
        DismissKind::LevelIr15 => {
            if !ir7_really_asserted(false) {
                log::warn!("[uphal::dismiss] spurious IR15 on slave, cascade-only EOI sent");
                pic::send_cascade_eoi();
                return (false, unsafe { pcr() }.irql);
            }
            dismiss_level_generic(target_irql, irq)
        }
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::levels::PROFILE_LEVEL;

    fn reset_all() {
        crate::pcr::reset();
        unsafe { (*pcr()).irql = 0 };
        for irq in 0..IRQ_COUNT as u8 {
            set_kind(irq, DismissKind::EdgeGeneric);
        }
        set_kind(7, DismissKind::EdgeIr07);
        set_kind(13, DismissKind::EdgeIr13);
        set_kind(15, DismissKind::EdgeIr15);
        port::enable();
    }

    #[test]
    fn plain_edge_dismissal_at_low_irql_accepts_and_eois() {
        reset_all();
        let target = PROFILE_LEVEL - 4;
        let (accepted, old) = begin_system_interrupt(target, 4);
        assert!(accepted);
        assert_eq!(old, 0);
        assert_eq!(unsafe { pcr() }.irql, target);
        assert_eq!(unsafe { pcr() }.irr, 0);
    }

    #[test]
    fn edge_defer_sets_irr_and_tightens_mask_without_eoi() {
        reset_all();
        unsafe { (*pcr()).irql = PROFILE_LEVEL - 3 };
        let before_mask = port::pic_mask(true);
        let (accepted, _old) = begin_system_interrupt(PROFILE_LEVEL - 5, 5);
        assert!(!accepted);
        assert_eq!(unsafe { pcr() }.irr & (1 << 9), 1 << 9);
        assert_ne!(port::pic_mask(true), before_mask);
    }

    #[test]
    fn spurious_ir15_acks_master_cascade_only() {
        reset_all();
        port::set_isr_bit7(false, false);
        let (accepted, old) = begin_system_interrupt(PROFILE_LEVEL - 15, 15);
        assert!(!accepted);
        assert_eq!(old, 0);
        assert_eq!(unsafe { pcr() }.irql, 0);
    }

    #[test]
    fn spurious_ir07_emits_no_eoi() {
        reset_all();
        port::set_isr_bit7(true, false);
        let before = port::pic_mask(true);
        let (accepted, _old) = begin_system_interrupt(PROFILE_LEVEL - 7, 7);
        assert!(!accepted);
        assert_eq!(port::pic_mask(true), before);
    }

    #[test]
    fn ir13_clears_fpu_latch_before_dismissal() {
        reset_all();
        unsafe { port::outb(pic::FPU_BUSY_LATCH_PORT, 0xAB) };
        assert_eq!(port::fpu_latch(), 0xAB);
        let (accepted, _old) = begin_system_interrupt(PROFILE_LEVEL - 13, 13);
        assert!(accepted);
        assert_eq!(port::fpu_latch(), 0);
    }

    #[test]
    fn level_dismissal_reprograms_mask_before_eoi() {
        reset_all();
        promote_to_level(10);
        unsafe { (*pcr()).irr |= 1 << crate::levels::DISPATCH_LEVEL };
        let target = PROFILE_LEVEL - 10;
        let (accepted, old) = begin_system_interrupt(target, 10);
        assert!(accepted);
        assert_eq!(old, 0);
        assert_eq!(unsafe { pcr() }.irr & (1 << 14), 1 << 14);
        assert_eq!(unsafe { pcr() }.irql, target);
    }
}
