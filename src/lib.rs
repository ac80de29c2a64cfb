//! Interrupt-level arbitration core for a uniprocessor x86 HAL: reconciles
//! the 32-level software IRQL priority hierarchy against the 16-line
//! hardware interrupt world of a legacy dual-8259A PIC cascade.
//!
//! The boot-time ICW programming sequence, the scheduler's APC/DPC
//! machinery, and the IDT/trap-frame plumbing are external collaborators
//! (see [`hooks::KernelHooks`]); this crate owns everything downstream of
//! "a hardware line asserted" or "software code asked to be interrupted
//! later": IRQL bookkeeping, PIC mask/EOI sequencing, spurious-interrupt
//! detection, and the pending/replay machinery that reconciles the two.
//!
//! Runs `no_std` on real x86 hardware. Building with the `std` feature swaps
//! the inline-asm port layer and synthetic `int` trampolines for an
//! in-memory PIC/CPU-flag model, so the arbitration logic can be exercised
//! with `cargo test` on a host rather than only under an emulator.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod dismiss;
pub mod hooks;
pub mod init;
pub mod irql;
pub mod levels;
pub mod pcr;
pub mod pic;
mod port;
pub mod replay;
pub mod soft;
pub mod tables;

pub use dismiss::begin_system_interrupt;
pub use hooks::{register as register_hooks, ApcMode, BugcheckCode, KernelHooks, TrapFrame};
pub use init::{disable_system_interrupt, enable_system_interrupt, initialize_pics};
pub use irql::{
    current_irql, end_system_interrupt, hardware_interrupt_level, lower, raise, raise_to_dpc,
    raise_to_synch,
};
pub use levels::{irq_to_vector, vector_to_irq, vector_to_irql, Irql};
pub use soft::{
    apc_handler_2nd_entry, apc_handler_entry, clear_software_interrupt, dispatch_handler_2nd_entry,
    dispatch_handler_entry, request_software_interrupt,
};

#[cfg(feature = "std")]
pub use hooks::NoopHooks;
