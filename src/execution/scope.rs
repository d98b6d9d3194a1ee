//! Execution scope (chroot target) state and scoped overrides.

use std::path::Path;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard, RwLock};

use crate::error::ValidationError;

#[derive(Debug, Default)]
struct ScopeState {
    current: Option<String>,
    depth: usize,
}

/// Per-engine scope value plus the lock that orders its overrides.
///
/// Scope blocks hold the reentrant `session` lock for their whole lifetime,
/// so blocks on different threads serialise while nested blocks on one
/// thread do not deadlock. Readers only take `state` briefly and never wait
/// for a block to end.
#[derive(Debug, Default)]
pub(crate) struct ScopeCell {
    session: ReentrantMutex<()>,
    state: RwLock<ScopeState>,
}

impl ScopeCell {
    pub(crate) fn new(initial: Option<String>) -> Self {
        Self {
            session: ReentrantMutex::new(()),
            state: RwLock::new(ScopeState {
                current: initial,
                depth: 0,
            }),
        }
    }

    /// The active scope.
    pub(crate) fn current(&self) -> Option<String> {
        self.state.read().current.clone()
    }

    /// Number of scope blocks currently entered.
    pub(crate) fn depth(&self) -> usize {
        self.state.read().depth
    }

    /// Replace the scope outside of any block.
    pub(crate) fn set(&self, scope: Option<String>) {
        let _session = self.session.lock();
        self.state.write().current = scope;
    }

    /// Enter a block with `target` as the active scope.
    pub(crate) fn enter(&self, target: Option<String>) -> ScopeGuard<'_> {
        let session = self.session.lock();
        let previous = {
            let mut state = self.state.write();
            state.depth += 1;
            std::mem::replace(&mut state.current, target)
        };
        ScopeGuard {
            cell: self,
            previous,
            restore: true,
            _session: session,
        }
    }

    /// Hold the session lock without touching the scope.
    pub(crate) fn hold(&self) -> ScopeGuard<'_> {
        let session = self.session.lock();
        let previous = {
            let mut state = self.state.write();
            state.depth += 1;
            state.current.clone()
        };
        ScopeGuard {
            cell: self,
            previous,
            restore: false,
            _session: session,
        }
    }
}

/// Active scope override, or a plain hold of the session lock.
///
/// Dropping an override guard restores the scope that was active when it
/// was created. Every guard releases the session lock last.
#[must_use = "the scope is restored as soon as the guard is dropped"]
pub struct ScopeGuard<'a> {
    cell: &'a ScopeCell,
    previous: Option<String>,
    restore: bool,
    _session: ReentrantMutexGuard<'a, ()>,
}

impl ScopeGuard<'_> {
    /// Scope active when the guard was created.
    pub fn previous(&self) -> Option<&str> {
        self.previous.as_deref()
    }
}

impl std::fmt::Debug for ScopeGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("previous", &self.previous)
            .finish_non_exhaustive()
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.cell.state.write();
        if self.restore {
            state.current = self.previous.take();
        }
        state.depth = state.depth.saturating_sub(1);
        // `_session` is released after this body returns
    }
}

/// Convert a scope path into the string handed to the formatter.
///
/// An empty path means no scoping.
pub(crate) fn scope_from_path(path: &Path) -> Result<Option<String>, ValidationError> {
    let text = path
        .to_str()
        .ok_or_else(|| ValidationError::ScopePath(path.display().to_string()))?;
    if text.contains('\0') {
        return Err(ValidationError::ScopePath(text.replace('\0', "\\0")));
    }
    Ok((!text.is_empty()).then(|| text.to_string()))
}
