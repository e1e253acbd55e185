//! Getting a failure description to the simulator.
//!
//! Ordinary errors are written into the robot-to-simulator error buffer by
//! the bridge while it holds the turn. Crashes cannot wait for a turn: a
//! `SIGSEGV`/`SIGBUS` handler and a panic hook write straight into the
//! mapped buffer registered through [`CrashReporter`].

use quad::consts::ERROR_MESSAGE_CAPACITY;
use quad::shm::message::{RobotToSimulatorMessage, write_c_str};
use nix::errno::Errno;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use std::marker::PhantomData;
use std::ptr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicPtr, Ordering};
use tracing::debug;

/// Error buffer the crash paths write to. Null while no reporter is armed.
static ERROR_BUFFER: AtomicPtr<u8> = AtomicPtr::new(ptr::null_mut());

/// Result of the one-time handler installation.
static HANDLERS: OnceLock<Result<(), Errno>> = OnceLock::new();

/// Copy `text` into the message's error buffer, truncated and NUL-terminated.
///
/// Returns the number of bytes kept.
pub fn publish_error(message: &mut RobotToSimulatorMessage, text: &str) -> usize {
    let written = message.set_error_message(text);
    if written < text.len() {
        debug!(len = text.len(), written, "Published error truncated");
    }
    written
}

/// Keeps the crash handlers pointed at one error buffer.
///
/// Dropping it disarms the handlers. Arming a second reporter redirects
/// them to the newer buffer.
#[derive(Debug)]
pub struct CrashReporter {
    buffer: *mut u8,
    // Tied to the mapping of the thread that armed it.
    _not_send: PhantomData<*mut u8>,
}

impl CrashReporter {
    /// Point the crash handlers at `buffer`, installing them on first use.
    ///
    /// # Safety
    ///
    /// `buffer` must stay valid for writes until the returned reporter is
    /// dropped.
    pub unsafe fn arm(buffer: *mut [u8; ERROR_MESSAGE_CAPACITY]) -> Result<Self, Errno> {
        (*HANDLERS.get_or_init(install_handlers))?;
        let buffer = buffer.cast::<u8>();
        ERROR_BUFFER.store(buffer, Ordering::Release);
        debug!("Crash reporter armed");
        Ok(Self {
            buffer,
            _not_send: PhantomData,
        })
    }
}

impl Drop for CrashReporter {
    fn drop(&mut self) {
        // Only disarm if a newer reporter has not taken over.
        let _ = ERROR_BUFFER.compare_exchange(
            self.buffer,
            ptr::null_mut(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

fn install_handlers() -> Result<(), Errno> {
    let action = SigAction::new(
        SigHandler::Handler(on_fatal_signal),
        SaFlags::SA_RESETHAND | SaFlags::SA_NODEFER,
        SigSet::empty(),
    );
    for signal in [Signal::SIGSEGV, Signal::SIGBUS] {
        // SAFETY: the handler only performs async-signal-safe operations:
        // an atomic load, a bounded memcpy and raise().
        unsafe { sigaction(signal, &action) }?;
    }

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let text = format!("robot program panicked: {info}");
        let buffer = ERROR_BUFFER.load(Ordering::Acquire);
        if !buffer.is_null() {
            // SAFETY: an armed buffer is valid for ERROR_MESSAGE_CAPACITY
            // bytes until its reporter is dropped.
            let slice = unsafe { std::slice::from_raw_parts_mut(buffer, ERROR_MESSAGE_CAPACITY) };
            write_c_str(slice, &text);
        }
        previous(info);
    }));

    debug!("Crash handlers installed");
    Ok(())
}

extern "C" fn on_fatal_signal(signal: libc::c_int) {
    let text: &[u8] = match signal {
        libc::SIGSEGV => b"robot program crashed: segmentation fault (SIGSEGV)",
        libc::SIGBUS => b"robot program crashed: bus error (SIGBUS)",
        _ => b"robot program crashed: fatal signal",
    };
    let buffer = ERROR_BUFFER.load(Ordering::Acquire);
    if !buffer.is_null() {
        let len = text.len().min(ERROR_MESSAGE_CAPACITY - 1);
        // SAFETY: see the panic hook; len + 1 <= capacity.
        unsafe {
            ptr::copy_nonoverlapping(text.as_ptr(), buffer, len);
            buffer.add(len).write(0);
        }
    }
    // SA_RESETHAND restored the default action.
    // SAFETY: raise is async-signal-safe.
    unsafe {
        libc::raise(signal);
    }
}
