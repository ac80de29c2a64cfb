//! External collaborators this crate calls into but does not implement:
//! the kernel scheduler/APC machinery, the boot-time ICW sequence, the IDT
//! vector registrar, the trap-frame/IRET helper, and bugcheck reporting.

use crate::levels::Irql;

/// Minimal view of a trap frame this crate needs: enough to decide whether
/// the interrupted context was user-mode (real ring 3, or VM86) and to carry
/// the synthetic return state the bare-vector APC/DPC entries build before
/// falling into the shared handler body.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapFrame {
    pub eflags: u32,
    pub seg_cs: u16,
    pub eip: u32,
    pub v86_mode: bool,
}

impl TrapFrame {
    #[must_use]
    pub fn is_user_mode(&self) -> bool {
        (self.seg_cs & 0x3) != 0 || self.v86_mode
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApcMode {
    Kernel,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BugcheckCode {
    IrqlNotGreaterOrEqual,
    IrqlNotLessOrEqual,
}

/// The set of upcalls §6.3 lists as out of scope. A real kernel provides one
/// implementation of this trait and registers it once at boot.
pub trait KernelHooks: Sync {
    fn deliver_apc(&self, mode: ApcMode, trap_frame: &mut TrapFrame);
    fn dispatch_dpc(&self);
    fn unexpected_interrupt(&self);
    fn trap_enter(&self, trap_frame: &mut TrapFrame);
    fn eoi_helper(&self, trap_frame: &TrapFrame) -> !;
    fn bugcheck(&self, code: BugcheckCode) -> !;
    fn register_vector(&self, vector: u8, irql: Irql);
    fn initialize_legacy_pics(&self);
}

#[cfg(feature = "std")]
mod default_hooks {
    use super::{ApcMode, BugcheckCode, KernelHooks, TrapFrame};

    /// Host-test default: every upcall is either a no-op or panics, so tests
    /// asserting a precondition violation can use `#[should_panic]` instead
    /// of looping on an unreachable halt.
    pub struct NoopHooks;

    // A real kernel's `eoi_helper`/`bugcheck` never return by construction
    // (IRET, halt loop); panicking is the host stand-in for that, not a
    // recoverable error path, so the usual ban on `panic!` doesn't apply here.
    #[allow(clippy::panic)]
    impl KernelHooks for NoopHooks {
        fn deliver_apc(&self, _mode: ApcMode, _trap_frame: &mut TrapFrame) {}
        fn dispatch_dpc(&self) {}
        fn unexpected_interrupt(&self) {}
        fn trap_enter(&self, _trap_frame: &mut TrapFrame) {}
        fn eoi_helper(&self, _trap_frame: &TrapFrame) -> ! {
            panic!("eoi_helper reached in host test");
        }
        fn bugcheck(&self, code: BugcheckCode) -> ! {
            panic!("bugcheck: {code:?}");
        }
        fn register_vector(&self, _vector: u8, _irql: super::Irql) {}
        fn initialize_legacy_pics(&self) {}
    }
}

#[cfg(feature = "std")]
pub use default_hooks::NoopHooks;

static HOOKS: spin::Once<&'static dyn KernelHooks> = spin::Once::new();

/// Registers the kernel-provided hook implementation. Should be called once,
/// before any interrupt-facing entry point in this crate is reachable; a
/// second call is ignored rather than replacing the first.
pub fn register(hooks: &'static dyn KernelHooks) {
    HOOKS.call_once(|| hooks);
}

/// # Panics
/// Panics if called before [`register`] — every entry point in this crate
/// that reaches here is documented as requiring hooks to be installed first.
#[inline]
#[allow(clippy::expect_used)]
pub fn hooks() -> &'static dyn KernelHooks {
    *HOOKS.get().expect("uphal::hooks::register was never called")
}
