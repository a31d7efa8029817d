// src/system/signals.rs

//! Signal dispositions as a closed set of values.
//!
//! Handlers never cross the API as raw code addresses. A handler function is registered once and
//! referred to by its `HandlerId` afterwards. Whatever handler was installed before a change is
//! reported back as a `Disposition` as well; handlers this module has never seen (installed by
//! other code) are registered on the spot, so the previous disposition can always be reinstated.

use crate::system::error::{OsContext, SysError, SysResult};
use lazy_static::lazy_static;
use nix::errno::Errno;
use nix::libc::{c_int, c_void, siginfo_t};
use nix::sys::signal::{self as nix_signal, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// A plain `sa_handler` style handler.
pub type RawHandler = extern "C" fn(c_int);
/// An `SA_SIGINFO` style handler.
pub type RawInfoHandler = extern "C" fn(c_int, *mut siginfo_t, *mut c_void);

/// Identifies a handler in the process-wide registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u32);

impl HandlerId {
    /// The built-in handler that records delivery in a pending mask; see `take_pending`.
    pub const RECORD: Self = Self(0);

    pub fn as_raw(self) -> u32 {
        self.0
    }
}

/// What happens when a signal is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    Default,
    Ignore,
    Custom(HandlerId),
}

#[derive(Clone, Copy)]
enum Registered {
    Plain(RawHandler),
    Info(RawInfoHandler),
}

impl Registered {
    fn matches(self, other: Self) -> bool {
        match (self, other) {
            (Self::Plain(a), Self::Plain(b)) => std::ptr::fn_addr_eq(a, b),
            (Self::Info(a), Self::Info(b)) => std::ptr::fn_addr_eq(a, b),
            _ => false,
        }
    }
}

lazy_static! {
    static ref HANDLERS: Mutex<Vec<Registered>> =
        Mutex::new(vec![Registered::Plain(record_signal)]);
}

static PENDING: AtomicU64 = AtomicU64::new(0);

extern "C" fn record_signal(signo: c_int) {
    // Only an atomic OR: async-signal-safe.
    if let Some(mask) = signal_mask(signo) {
        PENDING.fetch_or(mask, Ordering::SeqCst);
    }
}

/// Adds a handler to the registry and returns its id. Registering the same function twice
/// returns the id it already has.
///
/// The handler body runs in signal context: it must restrict itself to async-signal-safe
/// operations (no allocation, no locks, no non-reentrant calls). Nothing checks this.
pub fn register_handler(handler: RawHandler) -> HandlerId {
    register(Registered::Plain(handler))
}

fn register(handler: Registered) -> HandlerId {
    let mut handlers = HANDLERS.lock().unwrap_or_else(PoisonError::into_inner);
    let index = match handlers.iter().position(|known| known.matches(handler)) {
        Some(index) => index,
        None => {
            handlers.push(handler);
            handlers.len() - 1
        }
    };
    // The registry never holds anywhere near u32::MAX entries.
    HandlerId(u32::try_from(index).unwrap_or(u32::MAX))
}

fn lookup(id: HandlerId) -> SysResult<Registered> {
    let handlers = HANDLERS.lock().unwrap_or_else(PoisonError::into_inner);
    usize::try_from(id.0)
        .ok()
        .and_then(|index| handlers.get(index).copied())
        .ok_or_else(|| SysError::os("sigaction", Errno::EINVAL))
}

/// Runs `f` with the handler registry locked.
#[cfg(test)]
pub(crate) fn with_registry_locked<R>(f: impl FnOnce() -> R) -> R {
    let _handlers = HANDLERS.lock().unwrap_or_else(PoisonError::into_inner);
    f()
}

/// Converts a raw signal number, rejecting numbers the platform does not define.
pub fn to_signal(number: i32) -> SysResult<Signal> {
    Signal::try_from(number).os_context("signal")
}

/// Installs `disposition` for `signal` and returns the one it replaces.
///
/// Handlers are installed without `SA_RESTART`, so blocking calls interrupted by a caught signal
/// fail with EINTR instead of resuming silently.
#[allow(unsafe_code)]
pub fn set_disposition(signal: Signal, disposition: Disposition) -> SysResult<Disposition> {
    let action = match disposition {
        Disposition::Default => SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty()),
        Disposition::Ignore => SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty()),
        Disposition::Custom(id) => match lookup(id)? {
            Registered::Plain(handler) => {
                SigAction::new(SigHandler::Handler(handler), SaFlags::empty(), SigSet::empty())
            }
            Registered::Info(handler) => SigAction::new(
                SigHandler::SigAction(handler),
                SaFlags::SA_SIGINFO,
                SigSet::empty(),
            ),
        },
    };

    // SAFETY: every handler reachable here is an `extern "C"` function taken from the registry;
    // keeping its body async-signal-safe is the registrant's documented obligation.
    let previous = unsafe { nix_signal::sigaction(signal, &action) }.os_context("sigaction")?;

    let previous = match previous.handler() {
        SigHandler::SigDfl => Disposition::Default,
        SigHandler::SigIgn => Disposition::Ignore,
        SigHandler::Handler(handler) => Disposition::Custom(register(Registered::Plain(handler))),
        SigHandler::SigAction(handler) => Disposition::Custom(register(Registered::Info(handler))),
    };
    log::debug!(
        "Disposition of {} set to {:?} (was {:?})",
        signal,
        disposition,
        previous
    );
    Ok(previous)
}

/// Consumes the pending flag the `RECORD` handler set for `signal`. Returns whether the signal
/// arrived since the last call.
pub fn take_pending(signal: Signal) -> bool {
    let Some(mask) = signal_mask(signal as c_int) else {
        return false;
    };
    PENDING.fetch_and(!mask, Ordering::SeqCst) & mask != 0
}

fn signal_mask(signo: c_int) -> Option<u64> {
    u32::try_from(signo)
        .ok()
        .and_then(|bit| 1u64.checked_shl(bit))
}
