//! Guard flags against overlapping sync passes.
//!
//! A guard is a test-and-set cell. Acquiring it hands out a token that
//! resets the cell when dropped, whatever the pass returned. A trigger that
//! finds the guard held is dropped; the next state change fires it again.

use std::cell::Cell;

/// A single guard cell.
#[derive(Debug)]
pub struct SyncGuard {
    name: &'static str,
    held: Cell<bool>,
}

impl SyncGuard {
    /// Create a released guard.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            held: Cell::new(false),
        }
    }

    /// Test-and-set. `None` if the guard is already held.
    pub fn try_acquire(&self) -> Option<GuardToken<'_>> {
        if self.held.replace(true) {
            log::debug!("{} pass already running, trigger dropped", self.name);
            return None;
        }
        Some(GuardToken { guard: self })
    }

    pub fn is_held(&self) -> bool {
        self.held.get()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn release(&self) {
        self.held.set(false);
    }
}

/// Releases its guard on drop.
#[must_use = "the guard is released as soon as the token is dropped"]
#[derive(Debug)]
pub struct GuardToken<'a> {
    guard: &'a SyncGuard,
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.guard.release();
    }
}

/// Every guard flag of one engine.
#[derive(Debug)]
pub struct SyncFlags {
    /// Shared by both selection/inventory directions
    pub inventory: SyncGuard,
    /// Host-vars file to host registry
    pub host_vars: SyncGuard,
    /// A delete or purge cascade is running
    pub delete_in_flight: SyncGuard,
    /// Alias-mutation queue processing
    pub mutation: SyncGuard,
    seeded: Cell<bool>,
}

impl SyncFlags {
    pub const fn new() -> Self {
        Self {
            inventory: SyncGuard::new("selection/inventory"),
            host_vars: SyncGuard::new("host-vars"),
            delete_in_flight: SyncGuard::new("delete"),
            mutation: SyncGuard::new("alias mutation"),
            seeded: Cell::new(false),
        }
    }

    /// Whether the selection has been seeded from the inventory.
    pub fn is_seeded(&self) -> bool {
        self.seeded.get()
    }

    pub fn mark_seeded(&self) {
        self.seeded.set(true);
    }

    /// Forget the seeded state, e.g. on workspace switch.
    ///
    /// Held guards stay held: a live token belongs to a pass that is still
    /// on the stack and releases its guard when it unwinds.
    pub fn reset(&self) {
        self.seeded.set(false);
    }
}

impl Default for SyncFlags {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_dropped() {
        let guard = SyncGuard::new("test");
        let token = guard.try_acquire();
        assert!(token.is_some());
        assert!(guard.is_held());
        assert!(guard.try_acquire().is_none());
        drop(token);
        assert!(!guard.is_held());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_released_on_early_return() {
        fn pass(guard: &SyncGuard, fail: bool) -> Result<(), &'static str> {
            let _token = guard.try_acquire().ok_or("busy")?;
            if fail {
                return Err("boom");
            }
            Ok(())
        }

        let guard = SyncGuard::new("test");
        assert_eq!(pass(&guard, true), Err("boom"));
        assert!(!guard.is_held());
        assert_eq!(pass(&guard, false), Ok(()));
    }

    #[test]
    fn test_reset_clears_seeded_but_not_held_guards() {
        let flags = SyncFlags::new();
        flags.mark_seeded();
        let token = flags.mutation.try_acquire();
        flags.reset();
        assert!(!flags.is_seeded());
        assert!(flags.mutation.is_held());
        assert!(flags.mutation.try_acquire().is_none());

        drop(token);
        assert!(!flags.mutation.is_held());
    }
}
