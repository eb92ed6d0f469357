//! Embedding surfaces and their window handles
//!
//! The host GUI owns a native window that a foreign process can re-parent its
//! own top-level window into (an X11 socket, a Win32 child window, ...). This
//! module turns that window into a [`WindowHandle`] token that can be passed
//! to the foreign process, and provides [`AttachSignal`] so the GUI can report
//! when the foreign window has actually been plugged in.
//!
//! # Surfaces
//!
//! - [`EmbedSurface`] - Capability consumed from the GUI toolkit
//! - [`StaticSurface`] - A window id known up front (CLI host, tests)
//! - [`RawSurface`] - Any window implementing `raw_window_handle::HasWindowHandle`

use crate::error::{EmbedError, Result};
use parking_lot::Mutex;
use raw_window_handle::{HasWindowHandle, RawWindowHandle};
use std::fmt;
use std::sync::Arc;

/// Opaque token identifying an embeddable native window
///
/// The textual form is `0x` followed by lowercase hex digits, which is what
/// X11-aware tools expect for a window id (e.g. `0xc00007`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle {
    id: u64,
}

impl WindowHandle {
    /// Acquire the handle of a surface
    pub fn acquire(surface: &dyn EmbedSurface) -> Result<Self> {
        let id = surface.native_window_id()?;
        tracing::debug!("Acquired embedding surface 0x{:x}", id);
        Ok(Self { id })
    }

    /// Wrap a native window id directly
    pub fn from_raw(id: u64) -> Self {
        Self { id }
    }

    /// Native window id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Token passed to the foreign process
    pub fn token(&self) -> String {
        format!("0x{:x}", self.id)
    }

    /// Parse a token in either hex (`0x...`) or decimal form
    pub fn parse_token(token: &str) -> Result<Self> {
        let token = token.trim();
        let parsed = match token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
        {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => token.parse::<u64>(),
        };

        parsed
            .map(Self::from_raw)
            .map_err(|e| EmbedError::UnsupportedSurface(format!("bad window id '{}': {}", token, e)))
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.id)
    }
}

/// A display surface able to host a foreign top-level window
///
/// Implemented by the GUI layer. Implementations must be `Send` so the
/// controller can be moved to whichever thread runs the UI loop.
pub trait EmbedSurface: Send {
    /// Native id of the window the foreign process should attach to
    fn native_window_id(&self) -> Result<u64>;
}

/// Surface whose native id is already known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticSurface(pub u64);

impl EmbedSurface for StaticSurface {
    fn native_window_id(&self) -> Result<u64> {
        Ok(self.0)
    }
}

/// Adapter for windows exposed through `raw-window-handle`
pub struct RawSurface<W> {
    window: W,
}

impl<W: HasWindowHandle> RawSurface<W> {
    pub fn new(window: W) -> Self {
        Self { window }
    }
}

impl<W: HasWindowHandle + Send> EmbedSurface for RawSurface<W> {
    fn native_window_id(&self) -> Result<u64> {
        let handle = self
            .window
            .window_handle()
            .map_err(|e| EmbedError::UnsupportedSurface(e.to_string()))?;

        match handle.as_raw() {
            RawWindowHandle::Xlib(h) => Ok(h.window as u64),
            RawWindowHandle::Xcb(h) => Ok(u64::from(h.window.get())),
            RawWindowHandle::Win32(h) => Ok(h.hwnd.get() as u64),
            other => Err(EmbedError::UnsupportedSurface(format!(
                "cannot embed foreign windows into {:?}",
                other
            ))),
        }
    }
}

type AttachCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct AttachInner {
    fired: bool,
    callbacks: Vec<AttachCallback>,
}

/// One-shot notification that a foreign window was plugged into a surface
///
/// Cloning shares the same signal, so the GUI toolkit callback and the
/// controller can each hold one.
#[derive(Clone, Default)]
pub struct AttachSignal {
    inner: Arc<Mutex<AttachInner>>,
}

impl AttachSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback run once when the foreign window attaches
    ///
    /// Runs immediately if the signal already fired.
    pub fn on_foreign_window_attached(&self, callback: impl FnOnce() + Send + 'static) {
        let mut inner = self.inner.lock();
        if inner.fired {
            drop(inner);
            callback();
        } else {
            inner.callbacks.push(Box::new(callback));
        }
    }

    /// Fire the signal. Returns `false` if it had already fired.
    pub fn notify_attached(&self) -> bool {
        let callbacks = {
            let mut inner = self.inner.lock();
            if inner.fired {
                return false;
            }
            inner.fired = true;
            std::mem::take(&mut inner.callbacks)
        };

        // Run outside the lock so callbacks may touch the signal again
        for callback in callbacks {
            callback();
        }
        true
    }

    /// Whether the foreign window has attached
    pub fn is_attached(&self) -> bool {
        self.inner.lock().fired
    }
}

impl fmt::Debug for AttachSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("AttachSignal")
            .field("fired", &inner.fired)
            .field("pending_callbacks", &inner.callbacks.len())
            .finish()
    }
}
