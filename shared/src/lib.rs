#![cfg_attr(not(test), no_std)]

//! Ambient support crate for the PCI IDE/ATA driver core: a spinning
//! ticket mutex and an installable logging sink. Kept separate from
//! `pciide-core` so the driver core's own dependency list stays focused
//! on the ATA/PCI domain, the same split KidneyOS uses between
//! `kidneyos-shared` and `kidneyos` (the kernel crate). Test builds pull
//! in `std` (KidneyOS does the same in `main.rs`) so `cargo test` can use
//! the default harness.

extern crate alloc;

pub mod log;
pub mod mutex;

pub use mutex::{Mutex, MutexGuard};
