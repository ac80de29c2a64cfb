//! 8259A wire protocol: mask programming, specific EOI, ISR read-back, ELCR
//! and FPU busy-latch access. The boot-time ICW programming sequence itself
//! is an external collaborator (`KernelHooks::initialize_legacy_pics`); this
//! module only knows the steady-state wire operations a running system needs.

use crate::port;

pub const PIC1_DATA_PORT: u16 = 0x21;
pub const PIC1_CONTROL_PORT: u16 = 0x20;
pub const PIC2_DATA_PORT: u16 = 0xA1;
pub const PIC2_CONTROL_PORT: u16 = 0xA0;

pub const ELCR_MASTER_PORT: u16 = 0x4D0;
pub const ELCR_SLAVE_PORT: u16 = 0x4D1;

pub const FPU_BUSY_LATCH_PORT: u16 = 0xF0;

/// OCW3 read-ISR request: set-bit-one (distinguishes OCW3 from OCW2) plus the
/// read-request bit.
const OCW3_READ_ISR: u8 = 0x0B;

/// Splits a combined 32-bit mask word into master/slave bytes and writes it
/// to the PIC pair. Only the low 16 bits of `mask` are meaningful.
#[inline]
pub fn program_mask(mask: u32) {
    let master = (mask & 0xFF) as u8;
    let slave = ((mask >> 8) & 0xFF) as u8;
    unsafe {
        port::outb(PIC1_DATA_PORT, master);
        port::outb(PIC2_DATA_PORT, slave);
    }
}

/// Reads the currently programmed mask back as a combined 16-bit value.
#[inline]
#[must_use]
pub fn read_mask() -> u32 {
    let master = unsafe { port::inb(PIC1_DATA_PORT) };
    let slave = unsafe { port::inb(PIC2_DATA_PORT) };
    u32::from(master) | (u32::from(slave) << 8)
}

/// Sends a specific EOI for `irq` (0..15), cascading through IRQ2 on the
/// master when the IRQ lives on the slave.
#[inline]
pub fn send_specific_eoi(irq: u8) {
    const SPECIFIC_EOI: u8 = 0x60;
    if irq >= 8 {
        unsafe {
            port::outb(PIC2_CONTROL_PORT, SPECIFIC_EOI | ((irq - 8) & 0x07));
            port::outb(PIC1_CONTROL_PORT, SPECIFIC_EOI | 2);
        }
    } else {
        unsafe {
            port::outb(PIC1_CONTROL_PORT, SPECIFIC_EOI | (irq & 0x07));
        }
    }
}

/// Sends a specific EOI for the master's IRQ2 alone, used when a spurious
/// IRQ15 still needs the cascade line acknowledged.
#[inline]
pub fn send_cascade_eoi() {
    const SPECIFIC_EOI: u8 = 0x60;
    unsafe { port::outb(PIC1_CONTROL_PORT, SPECIFIC_EOI | 2) };
}

/// Reads the master's in-service register via an OCW3 read-ISR request.
#[inline]
#[must_use]
pub fn read_isr_master() -> u8 {
    unsafe {
        port::outb(PIC1_CONTROL_PORT, OCW3_READ_ISR);
        port::inb(PIC1_CONTROL_PORT)
    }
}

/// Reads the slave's in-service register via an OCW3 read-ISR request.
#[inline]
#[must_use]
pub fn read_isr_slave() -> u8 {
    unsafe {
        port::outb(PIC2_CONTROL_PORT, OCW3_READ_ISR);
        port::inb(PIC2_CONTROL_PORT)
    }
}

/// Clears the 80287/80387 FPU busy latch so a pending IRQ13 can be dismissed.
#[inline]
pub fn clear_fpu_busy_latch() {
    unsafe { port::outb(FPU_BUSY_LATCH_PORT, 0) };
}

/// Reads the combined 16-bit EISA ELCR (slave in the high byte, master low).
#[inline]
#[must_use]
pub fn read_elcr() -> u16 {
    let master = unsafe { port::inb(ELCR_MASTER_PORT) };
    let slave = unsafe { port::inb(ELCR_SLAVE_PORT) };
    u16::from(master) | (u16::from(slave) << 8)
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn program_mask_splits_low_and_high_byte() {
        program_mask(0xBEEF);
        assert_eq!(read_mask(), 0xBEEF);
    }

    #[test]
    fn specific_eoi_on_slave_also_acks_master_cascade() {
        port::set_isr_bit7(false, true);
        send_specific_eoi(15);
        // After EOI the OCW3 read-ISR should no longer report bit 7 set.
        assert_eq!(read_isr_slave() & 0x80, 0);
    }
}
