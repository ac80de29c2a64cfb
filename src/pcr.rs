//! Per-CPU control block: the uniprocessor's single `Irql`/`IRR`/`IDR`/`IrrActive`
//! instance. Mirrors the reference HAL's processor-control-region pattern: a
//! single static, mutated only with CPU interrupts disabled, so no lock is
//! needed on a single processor.

use crate::levels::Irql;
use core::cell::UnsafeCell;

#[derive(Debug, Default, Clone, Copy)]
pub struct Pcr {
    pub irql: Irql,
    pub irr: u32,
    pub idr: u32,
    pub irr_active: u32,
}

struct PcrCell(UnsafeCell<Pcr>);

// SAFETY: the block is only ever mutated with CPU interrupts disabled, and
// this is a uniprocessor crate, so there is exactly one execution context.
unsafe impl Sync for PcrCell {}

static PCR: PcrCell = PcrCell(UnsafeCell::new(Pcr {
    irql: crate::levels::HIGH_LEVEL,
    irr: 0,
    idr: 0,
    irr_active: 0,
}));

/// Returns a mutable reference to the sole per-CPU control block.
///
/// # Safety
/// The caller must hold the implicit "CPU interrupts disabled" invariant
/// this crate relies on instead of a lock: either interrupts are already
/// disabled on entry, or the access is known not to race a nested ISR.
#[inline]
#[allow(clippy::mut_from_ref)]
pub unsafe fn pcr() -> &'static mut Pcr {
    unsafe { &mut *PCR.0.get() }
}

/// Read-only snapshot, safe to call from anywhere: a torn read of a `Copy`
/// struct from a non-reentrant context is still a valid (if possibly stale)
/// snapshot, and every field here is independently meaningful.
#[inline]
#[must_use]
pub fn snapshot() -> Pcr {
    unsafe { *PCR.0.get() }
}

/// Resets the block to its boot state (`Irql = HIGH_LEVEL`, all bitmaps clear).
/// Used by `initialize_pics` and by host tests that need a clean slate.
pub fn reset() {
    let p = unsafe { pcr() };
    p.irql = crate::levels::HIGH_LEVEL;
    p.irr = 0;
    p.idr = 0;
    p.irr_active = 0;
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn reset_restores_boot_state() {
        {
            let p = unsafe { pcr() };
            p.irql = 5;
            p.irr = 0xFF;
        }
        reset();
        let snap = snapshot();
        assert_eq!(snap.irql, crate::levels::HIGH_LEVEL);
        assert_eq!(snap.irr, 0);
    }
}
