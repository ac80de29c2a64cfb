//! Raw byte-wide I/O port access and the CPU interrupt-enable flag.
//!
//! On bare metal this is `in`/`out`/`cli`/`sti`/`pushfq`, following the same
//! `asm!` shape the reference HAL uses for its serial driver and PIC init.
//! Under the `std` feature (host tests) `cli`/`sti` are privileged
//! instructions that would fault in ring 3, so the enable flag is tracked in
//! an ordinary cell instead, and port reads/writes go through a small
//! software PIC/ELCR/FPU-latch model that the dismissal and replay logic
//! exercises exactly as it would the real hardware.

#[cfg(not(feature = "std"))]
mod hw {
    use core::arch::asm;

    /// # Safety
    /// Caller must ensure `port` names a readable byte-wide I/O port.
    #[inline]
    pub unsafe fn inb(port: u16) -> u8 {
        let value: u8;
        unsafe {
            asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags));
        }
        value
    }

    /// # Safety
    /// Caller must ensure `port` names a writable byte-wide I/O port.
    #[inline]
    pub unsafe fn outb(port: u16, value: u8) {
        unsafe {
            asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
        }
    }

    /// Short delay used between successive PIC command-port writes.
    #[inline]
    pub fn io_wait() {
        unsafe { outb(0x80, 0) };
    }

    /// Disables CPU interrupts, returning the prior `EFlags` image.
    #[inline]
    pub fn disable() -> u32 {
        let flags: u32;
        unsafe {
            asm!("pushfd", "pop {0:e}", out(reg) flags, options(nomem, preserves_flags));
            asm!("cli", options(nomem, nostack));
        }
        flags
    }

    /// Unconditionally enables CPU interrupts.
    #[inline]
    pub fn enable() {
        unsafe { asm!("sti", options(nomem, nostack)) };
    }

    /// Restores a previously captured `EFlags` image's interrupt bit.
    #[inline]
    pub fn restore(flags: u32) {
        if flags & 0x200 != 0 {
            enable();
        }
    }

    #[inline]
    pub fn is_enabled() -> bool {
        let flags: u32;
        unsafe {
            asm!("pushfd", "pop {0:e}", out(reg) flags, options(nomem, preserves_flags));
        }
        flags & 0x200 != 0
    }
}

#[cfg(feature = "std")]
mod model {
    use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

    static ENABLED: AtomicBool = AtomicBool::new(true);

    // Master/slave data and command ports, ELCR bytes, FPU latch byte.
    static PIC1_DATA: AtomicU8 = AtomicU8::new(0xFF);
    static PIC2_DATA: AtomicU8 = AtomicU8::new(0xFF);
    static PIC1_ISR: AtomicU8 = AtomicU8::new(0);
    static PIC2_ISR: AtomicU8 = AtomicU8::new(0);
    static ELCR_MASTER: AtomicU8 = AtomicU8::new(0);
    static ELCR_SLAVE: AtomicU8 = AtomicU8::new(0);
    static FPU_LATCH: AtomicU8 = AtomicU8::new(0);
    static OCW3_LATCHED_ISR: AtomicBool = AtomicBool::new(false);

    /// Test-only hook: pretend IR7 is currently asserted on the given PIC's ISR.
    pub fn set_isr_bit7(master: bool, set: bool) {
        let reg = if master { &PIC1_ISR } else { &PIC2_ISR };
        let mut v = reg.load(Ordering::SeqCst);
        if set {
            v |= 0x80;
        } else {
            v &= !0x80;
        }
        reg.store(v, Ordering::SeqCst);
    }

    pub fn set_elcr(master: u8, slave: u8) {
        ELCR_MASTER.store(master, Ordering::SeqCst);
        ELCR_SLAVE.store(slave, Ordering::SeqCst);
    }

    pub fn fpu_latch() -> u8 {
        FPU_LATCH.load(Ordering::SeqCst)
    }

    pub fn pic_mask(master: bool) -> u8 {
        if master {
            PIC1_DATA.load(Ordering::SeqCst)
        } else {
            PIC2_DATA.load(Ordering::SeqCst)
        }
    }

    /// # Safety
    /// Kept `unsafe` to mirror the hardware backend's signature; the model
    /// backend has no actual memory-safety requirement.
    pub unsafe fn inb(port: u16) -> u8 {
        match port {
            0x21 => PIC1_DATA.load(Ordering::SeqCst),
            0xA1 => PIC2_DATA.load(Ordering::SeqCst),
            0x20 | 0xA0 => {
                if OCW3_LATCHED_ISR.swap(false, Ordering::SeqCst) {
                    if port == 0x20 {
                        PIC1_ISR.load(Ordering::SeqCst)
                    } else {
                        PIC2_ISR.load(Ordering::SeqCst)
                    }
                } else {
                    0
                }
            }
            0x4D0 => ELCR_MASTER.load(Ordering::SeqCst),
            0x4D1 => ELCR_SLAVE.load(Ordering::SeqCst),
            _ => 0,
        }
    }

    /// # Safety
    /// See [`inb`].
    pub unsafe fn outb(port: u16, value: u8) {
        match port {
            0x21 => PIC1_DATA.store(value, Ordering::SeqCst),
            0xA1 => PIC2_DATA.store(value, Ordering::SeqCst),
            0x20 | 0xA0 => {
                // OCW3 (bit 3 set, bit 1 selects read-ISR) latches the next inb.
                if value & 0x08 != 0 && value & 0x02 != 0 {
                    OCW3_LATCHED_ISR.store(true, Ordering::SeqCst);
                }
                // A specific-EOI write clears the corresponding ISR bit.
                if value & 0x60 == 0x60 {
                    let ir = value & 0x07;
                    let reg = if port == 0x20 { &PIC1_ISR } else { &PIC2_ISR };
                    let mut v = reg.load(Ordering::SeqCst);
                    v &= !(1 << ir);
                    reg.store(v, Ordering::SeqCst);
                }
            }
            0xF0 => FPU_LATCH.store(value, Ordering::SeqCst),
            _ => {}
        }
    }

    pub fn io_wait() {}

    pub fn disable() -> u32 {
        let was = ENABLED.swap(false, Ordering::SeqCst);
        u32::from(was) << 9
    }

    pub fn enable() {
        ENABLED.store(true, Ordering::SeqCst);
    }

    pub fn restore(flags: u32) {
        if flags & 0x200 != 0 {
            enable();
        }
    }

    pub fn is_enabled() -> bool {
        ENABLED.load(Ordering::SeqCst)
    }
}

#[cfg(not(feature = "std"))]
pub use hw::{disable, enable, inb, io_wait, is_enabled, outb, restore};

#[cfg(feature = "std")]
pub use model::{disable, enable, inb, io_wait, is_enabled, outb, restore};

#[cfg(feature = "std")]
pub use model::{fpu_latch, pic_mask, set_elcr, set_isr_bit7};

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn disable_then_restore_round_trips_enabled_state() {
        assert!(is_enabled());
        let saved = disable();
        assert!(!is_enabled());
        restore(saved);
        assert!(is_enabled());
    }

    #[test]
    fn specific_eoi_clears_isr_bit() {
        enable();
        set_isr_bit7(true, true);
        unsafe { outb(0x20, 0x67) }; // specific EOI for IR7
        set_isr_bit7(true, false);
        unsafe { outb(0x20, 0x0B) }; // OCW3 read-ISR request
        assert_eq!(unsafe { inb(0x20) }, 0);
    }
}
