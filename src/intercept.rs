//! Intercept-and-delegate wrappers for descriptor operations
//!
//! The engine does not resolve symbols itself: the embedder hands it a
//! table of callable originals ([`OriginalOps`]), resolved however the
//! surrounding interception mechanism likes (dlsym RTLD_NEXT, link-time
//! override, direct libc). Each wrapper calls the original, then feeds
//! the outcome to the tracker through one of two generic delegate
//! helpers: `track_result_fd` for operations that return the new
//! descriptor, `track_fd_pair` for operations that write a descriptor
//! pair through an out array (pipe, socketpair).
//!
//! The trigger condition is configurable; by default an allocation
//! failing with `EMFILE`/`ENFILE` while armed flips the engine to
//! attributing mode.
//!
//! Embedders that reroute the whole process through these wrappers must
//! keep the capture provider on unintercepted originals, since the
//! engine lock is held while it runs.

use crate::engine::FdTracker;
use libc::{c_char, c_int, mode_t, sockaddr, socklen_t};
use nix::errno::Errno;
use std::sync::Arc;

/// Table of callable original operations, resolved once at startup
#[derive(Clone, Copy)]
pub struct OriginalOps {
    pub open: unsafe extern "C" fn(*const c_char, c_int, mode_t) -> c_int,
    pub creat: unsafe extern "C" fn(*const c_char, mode_t) -> c_int,
    pub socket: unsafe extern "C" fn(c_int, c_int, c_int) -> c_int,
    pub accept: unsafe extern "C" fn(c_int, *mut sockaddr, *mut socklen_t) -> c_int,
    pub dup: unsafe extern "C" fn(c_int) -> c_int,
    pub dup2: unsafe extern "C" fn(c_int, c_int) -> c_int,
    pub dup3: unsafe extern "C" fn(c_int, c_int, c_int) -> c_int,
    pub pipe: unsafe extern "C" fn(*mut c_int) -> c_int,
    pub pipe2: unsafe extern "C" fn(*mut c_int, c_int) -> c_int,
    pub socketpair: unsafe extern "C" fn(c_int, c_int, c_int, *mut c_int) -> c_int,
    pub close: unsafe extern "C" fn(c_int) -> c_int,
}

// libc::open is variadic; give the table a fixed-arity entry
unsafe extern "C" fn libc_open(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    unsafe { libc::open(path, flags, mode as libc::c_uint) }
}

impl OriginalOps {
    /// Originals taken straight from the linked libc, for embedders that
    /// do not interpose at the symbol level
    pub fn libc_defaults() -> Self {
        Self {
            open: libc_open,
            creat: libc::creat,
            socket: libc::socket,
            accept: libc::accept,
            dup: libc::dup,
            dup2: libc::dup2,
            dup3: libc::dup3,
            pipe: libc::pipe,
            pipe2: libc::pipe2,
            socketpair: libc::socketpair,
            close: libc::close,
        }
    }
}

/// Predicate deciding whether a failed allocation should trigger
/// attribution
pub type TriggerCondition = fn(Errno) -> bool;

/// Default trigger: the process hit its descriptor ceiling
pub fn default_trigger_condition(errno: Errno) -> bool {
    matches!(errno, Errno::EMFILE | Errno::ENFILE)
}

/// Thin interception layer binding an [`OriginalOps`] table to a tracker
pub struct Interceptor {
    ops: OriginalOps,
    tracker: Arc<FdTracker>,
    trigger_condition: TriggerCondition,
}

impl Interceptor {
    pub fn new(ops: OriginalOps, tracker: Arc<FdTracker>) -> Self {
        Self {
            ops,
            tracker,
            trigger_condition: default_trigger_condition,
        }
    }

    /// Override which errno values count as "failed at the lowered
    /// ceiling"
    pub fn with_trigger_condition(mut self, condition: TriggerCondition) -> Self {
        self.trigger_condition = condition;
        self
    }

    pub fn tracker(&self) -> &Arc<FdTracker> {
        &self.tracker
    }

    /// Delegate helper for operations whose return value is the new
    /// descriptor. Never alters `ret`.
    fn track_result_fd(&self, ret: c_int) -> c_int {
        if ret >= 0 {
            self.tracker.record_allocation(ret);
        } else if (self.trigger_condition)(Errno::last()) {
            self.tracker.trigger();
        }
        ret
    }

    /// Delegate helper for operations that write two descriptors through
    /// an out array and return 0 on success
    ///
    /// # Safety
    /// On success `fds` must point to two readable `c_int`s, exactly as
    /// the wrapped operation guarantees.
    unsafe fn track_fd_pair(&self, ret: c_int, fds: *const c_int) -> c_int {
        if ret == 0 && !fds.is_null() {
            let (first, second) = unsafe { (*fds, *fds.add(1)) };
            self.tracker.record_allocation(first);
            self.tracker.record_allocation(second);
        } else if ret != 0 && (self.trigger_condition)(Errno::last()) {
            self.tracker.trigger();
        }
        ret
    }

    /// # Safety
    /// Same contract as `open(2)`.
    pub unsafe fn open(&self, path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
        let ret = unsafe { (self.ops.open)(path, flags, mode) };
        self.track_result_fd(ret)
    }

    /// # Safety
    /// Same contract as `creat(2)`.
    pub unsafe fn creat(&self, path: *const c_char, mode: mode_t) -> c_int {
        let ret = unsafe { (self.ops.creat)(path, mode) };
        self.track_result_fd(ret)
    }

    pub fn socket(&self, domain: c_int, ty: c_int, protocol: c_int) -> c_int {
        let ret = unsafe { (self.ops.socket)(domain, ty, protocol) };
        self.track_result_fd(ret)
    }

    /// # Safety
    /// Same contract as `accept(2)`.
    pub unsafe fn accept(
        &self,
        sockfd: c_int,
        addr: *mut sockaddr,
        addrlen: *mut socklen_t,
    ) -> c_int {
        let ret = unsafe { (self.ops.accept)(sockfd, addr, addrlen) };
        self.track_result_fd(ret)
    }

    pub fn dup(&self, oldfd: c_int) -> c_int {
        let ret = unsafe { (self.ops.dup)(oldfd) };
        self.track_result_fd(ret)
    }

    /// On success dup2 may have silently closed a live `newfd`, so its
    /// attribution is released before the new one is recorded
    pub fn dup2(&self, oldfd: c_int, newfd: c_int) -> c_int {
        let ret = unsafe { (self.ops.dup2)(oldfd, newfd) };
        if ret >= 0 && oldfd != newfd {
            self.tracker.record_release(newfd);
            self.tracker.record_allocation(ret);
        } else if ret < 0 && (self.trigger_condition)(Errno::last()) {
            self.tracker.trigger();
        }
        ret
    }

    /// Same replacement semantics as [`Interceptor::dup2`]; dup3 rejects
    /// `oldfd == newfd` so success always means a replacement
    pub fn dup3(&self, oldfd: c_int, newfd: c_int, flags: c_int) -> c_int {
        let ret = unsafe { (self.ops.dup3)(oldfd, newfd, flags) };
        if ret >= 0 {
            self.tracker.record_release(newfd);
            self.tracker.record_allocation(ret);
        } else if (self.trigger_condition)(Errno::last()) {
            self.tracker.trigger();
        }
        ret
    }

    /// # Safety
    /// Same contract as `pipe(2)`.
    pub unsafe fn pipe(&self, fds: *mut c_int) -> c_int {
        let ret = unsafe { (self.ops.pipe)(fds) };
        unsafe { self.track_fd_pair(ret, fds) }
    }

    /// # Safety
    /// Same contract as `pipe2(2)`.
    pub unsafe fn pipe2(&self, fds: *mut c_int, flags: c_int) -> c_int {
        let ret = unsafe { (self.ops.pipe2)(fds, flags) };
        unsafe { self.track_fd_pair(ret, fds) }
    }

    /// # Safety
    /// Same contract as `socketpair(2)`.
    pub unsafe fn socketpair(
        &self,
        domain: c_int,
        ty: c_int,
        protocol: c_int,
        fds: *mut c_int,
    ) -> c_int {
        let ret = unsafe { (self.ops.socketpair)(domain, ty, protocol, fds) };
        unsafe { self.track_fd_pair(ret, fds) }
    }

    /// The real close always runs first and its result is returned
    /// unchanged; the engine decides internally whether there is an
    /// attribution to release
    pub fn close(&self, fd: c_int) -> c_int {
        let ret = unsafe { (self.ops.close)(fd) };
        self.tracker.record_release(fd);
        ret
    }
}
