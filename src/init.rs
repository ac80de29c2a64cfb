//! Boot-time PIC bring-up and the enable/disable surface for individual
//! hardware IRQs.
//!
//! The ICW programming sequence itself lives with the kernel
//! (`KernelHooks::initialize_legacy_pics`); this module handles everything
//! downstream of it: ELCR-driven edge/level classification, registering the
//! cascade vector, and per-IRQ mask/trigger-mode changes at runtime.

use crate::dismiss;
use crate::hooks::hooks;
use crate::levels::{irq_to_vector, vector_to_irq, Irql, CLOCK2_LEVEL, HIGH_LEVEL, IRQ_COUNT};
use crate::pcr::pcr;
use crate::pic;
use crate::replay;
use crate::tables::{self, CASCADE_IRQ, PIC_MASK_BITS, PIC_MASK_BY_IRQL};

/// IRQs the PC/AT platform always wires edge-triggered: the two timers, the
/// cascade line, and the RTC. A system whose ELCR disagrees is misconfigured.
const ALWAYS_EDGE_IRQS: [u8; 5] = [0, 1, CASCADE_IRQ, 8, 13];

/// Brings the PIC pair up for normal operation: classifies every IRQ as edge
/// or level from the EISA ELCR, registers the cascade vector, and leaves CPU
/// interrupts enabled if `enable_after` is set.
///
/// The interrupt-enable restore is asymmetric by design: a `false` here
/// restores whatever the flag was before this call, never forcing it off,
/// but `true` always turns interrupts on regardless of the prior state.
pub fn initialize_pics(enable_after: bool) {
    let saved = crate::port::disable();

    hooks().initialize_legacy_pics();
    crate::pcr::reset();

    let elcr = pic::read_elcr();
    for irq in 0..IRQ_COUNT as u8 {
        let level_triggered = elcr & (1 << irq) != 0;
        if level_triggered && ALWAYS_EDGE_IRQS.contains(&irq) {
            log::error!(
                "[uphal::init] ELCR reports platform-fixed edge irq {irq} as level-triggered"
            );
        }
        debug_assert!(
            !(level_triggered && ALWAYS_EDGE_IRQS.contains(&irq)),
            "platform-fixed edge IRQ reported level-triggered by ELCR"
        );
        if level_triggered {
            log::debug!("[uphal::init] irq {irq} classified level-triggered from ELCR");
            dismiss::promote_to_level(irq);
            replay::promote_irq_to_level(irq);
        }
    }

    hooks().register_vector(irq_to_vector(CASCADE_IRQ), HIGH_LEVEL);

    tables::validate();

    if enable_after {
        crate::port::enable();
    } else {
        crate::port::restore(saved);
    }
}

fn combined_mask_for(irql: Irql) -> u32 {
    (PIC_MASK_BY_IRQL[irql as usize] | unsafe { pcr() }.idr) & PIC_MASK_BITS
}

/// Unmasks `vector`'s IRQ at the PIC and, for level-sensitive lines,
/// promotes its dismissal and replay entries to their level variants.
///
/// Returns `false` without mutating any state if `vector` maps to an IRQ at
/// or above `CLOCK2_LEVEL` - a bound check kept as the original HAL has it,
/// even though no hardware IRQ number reaches that value on this cascade.
#[must_use]
pub fn enable_system_interrupt(vector: u8, irql: Irql, level_sensitive: bool) -> bool {
    let irq = vector_to_irq(vector);
    if irq >= CLOCK2_LEVEL {
        return false;
    }

    let saved = crate::port::disable();
    if level_sensitive {
        dismiss::promote_to_level(irq);
        replay::promote_irq_to_level(irq);
    }
    let p = unsafe { pcr() };
    p.idr &= !(1 << (irq + 4));
    pic::program_mask(combined_mask_for(irql));
    crate::port::restore(saved);
    true
}

/// Masks `vector`'s IRQ at the PIC.
pub fn disable_system_interrupt(vector: u8, irql: Irql) {
    let irq = vector_to_irq(vector);
    let saved = crate::port::disable();
    let p = unsafe { pcr() };
    p.idr |= 1 << (irq + 4);
    pic::program_mask(combined_mask_for(irql));
    crate::port::restore(saved);
}
