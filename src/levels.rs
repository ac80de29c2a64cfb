//! IRQL constants and the linear vector/IRQ/IRQL mapping.
//!
//! `vector = PRIMARY_VECTOR_BASE + irq`, `irql = PROFILE_LEVEL - irq`, so IRQ 0
//! (the system clock) sits at the highest hardware-reachable IRQL and IRQ 15
//! at the lowest.

/// A priority level in `[0, 31]`. Higher numbers mean higher priority.
pub type Irql = u8;

pub const PASSIVE_LEVEL: Irql = 0;
pub const APC_LEVEL: Irql = 1;
pub const DISPATCH_LEVEL: Irql = 2;
pub const PROFILE_LEVEL: Irql = 27;
pub const CLOCK2_LEVEL: Irql = 28;
pub const SYNCH_LEVEL: Irql = 28;
pub const HIGH_LEVEL: Irql = 31;

/// First vector handed to hardware IRQ 0.
pub const PRIMARY_VECTOR_BASE: u8 = 0x30;

/// Number of lines on the master/slave 8259A cascade.
pub const IRQ_COUNT: usize = 16;

#[inline]
#[must_use]
pub const fn irq_to_vector(irq: u8) -> u8 {
    PRIMARY_VECTOR_BASE.wrapping_add(irq)
}

#[inline]
#[must_use]
pub const fn vector_to_irq(vector: u8) -> u8 {
    vector.wrapping_sub(PRIMARY_VECTOR_BASE)
}

#[inline]
#[must_use]
pub const fn vector_to_irql(vector: u8) -> Irql {
    PROFILE_LEVEL.wrapping_sub(vector_to_irq(vector))
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn vector_roundtrips_through_irq() {
        for irq in 0..IRQ_COUNT as u8 {
            let vector = irq_to_vector(irq);
            assert_eq!(vector_to_irq(vector), irq);
        }
    }

    #[test]
    fn irq0_maps_to_profile_level() {
        assert_eq!(vector_to_irql(irq_to_vector(0)), PROFILE_LEVEL);
    }

    #[test]
    fn irq15_maps_to_lowest_hardware_irql() {
        assert_eq!(vector_to_irql(irq_to_vector(15)), PROFILE_LEVEL - 15);
    }
}
