//! Installable logging sink for the driver core's diagnostic output.
//!
//! KidneyOS's `println!`/`eprintln!` write straight to a hardwired
//! `SerialWriter` (`kidneyos_shared::serial::SERIAL_WRITER`). That works
//! for a kernel with exactly one boot-time serial port, but the driver
//! core also needs to run its diagnostics under `cargo test` against a
//! mock fixture, so the sink here is installed at runtime instead of
//! hardwired to a port. Everything else about the macros (`println!`
//! prefixed, `eprintln!` for warnings/errors) matches KidneyOS's shape.

use crate::Mutex;
use core::fmt;

/// Destination for driver log output. A real kernel implements this over
/// its serial console (or wherever KidneyOS's `SerialWriter` would write);
/// tests install a sink that records lines for assertions, or install
/// none at all and let log output go nowhere.
pub trait LogSink: Send {
    fn write_line(&mut self, level: Level, line: fmt::Arguments<'_>);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
}

static SINK: Mutex<Option<&'static mut dyn LogSink>> = Mutex::new(None);

/// Install the sink that `log_info!`/`log_error!` write through. Passing
/// no sink (the default) makes the macros no-ops, which is what every
/// test that doesn't care about log output gets for free.
///
/// The sink must outlive every subsequent call to the logging macros;
/// callers typically pass a `'static` value obtained via `Box::leak` or a
/// `static mut` owned by the embedding kernel.
pub fn install_sink(sink: &'static mut dyn LogSink) {
    *SINK.lock() = Some(sink);
}

#[doc(hidden)]
pub fn dispatch(level: Level, args: fmt::Arguments<'_>) {
    if let Some(sink) = SINK.lock().as_mut() {
        sink.write_line(level, args);
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::log::dispatch($crate::log::Level::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::log::dispatch($crate::log::Level::Error, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use alloc::string::String;
    use alloc::vec::Vec;
    use core::cell::UnsafeCell;

    struct RecordingSink(&'static UnsafeCell<Vec<String>>);

    // SAFETY: the tests in this module run single-threaded and never hold
    // overlapping references into the cell.
    unsafe impl Send for RecordingSink {}

    impl LogSink for RecordingSink {
        fn write_line(&mut self, level: Level, line: fmt::Arguments<'_>) {
            unsafe { &mut *self.0.get() }.push(alloc::format!("{level:?}: {line}"));
        }
    }

    #[test]
    fn dispatch_reaches_installed_sink() {
        let lines: &'static UnsafeCell<Vec<String>> = Box::leak(Box::new(UnsafeCell::new(Vec::new())));
        let sink: &'static mut RecordingSink = Box::leak(Box::new(RecordingSink(lines)));
        install_sink(sink);

        log_info!("probe: controller {} found", 0);
        log_error!("identify failed on channel {}", 1);

        let recorded = unsafe { &*lines.get() };
        assert_eq!(recorded.len(), 2);
        assert!(recorded[0].starts_with("Info"));
        assert!(recorded[1].starts_with("Error"));
    }
}
