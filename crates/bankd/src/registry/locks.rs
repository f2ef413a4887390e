//! Advisory single-holder locks keyed by resource id.
//!
//! Acquisition never waits: a lock held by another session fails at once
//! with `ResourceBusy`. The first caller wins; there is no queue.

use std::collections::HashSet;

use dashmap::DashMap;
use tracing::debug;

use bank_core::{BankError, BankResult, ResourceId, SessionToken};

/// Lock slots for every lockable resource.
///
/// A slot is `None` when free. Only resources with a registered slot can be
/// locked; the ledger registers one when it creates a profile, account or
/// teller and drops it on delete.
///
/// `held` indexes the same information by holder so logout does not scan
/// every slot. Whenever both maps are touched together the slot is locked
/// first.
#[derive(Debug, Default)]
pub struct LockRegistry {
    slots: DashMap<ResourceId, Option<SessionToken>>,
    held: DashMap<SessionToken, HashSet<ResourceId>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lock for `holder` if it is free or already theirs.
    ///
    /// # Errors
    ///
    /// - `BankError::ResourceBusy` if another session holds the lock
    /// - `BankError::UnknownResource` if the resource has no slot
    pub fn try_acquire(&self, resource: &ResourceId, holder: &SessionToken) -> BankResult<()> {
        self.acquire_inner(resource, holder).map(|_| ())
    }

    /// Like `try_acquire`, but returns a guard that releases on drop.
    ///
    /// A lock the holder already had before the call is left untouched by
    /// the guard.
    pub fn acquire_scoped<'a>(
        &'a self,
        resource: &ResourceId,
        holder: &SessionToken,
    ) -> BankResult<LockGuard<'a>> {
        let newly_acquired = self.acquire_inner(resource, holder)?;
        Ok(LockGuard {
            registry: self,
            resource: resource.clone(),
            holder: holder.clone(),
            armed: newly_acquired,
        })
    }

    /// Returns `Ok(true)` if the lock was free and is now held, `Ok(false)`
    /// if the holder already had it.
    fn acquire_inner(&self, resource: &ResourceId, holder: &SessionToken) -> BankResult<bool> {
        let Some(mut slot) = self.slots.get_mut(resource) else {
            debug!(resource = %resource, "Lock refused, no such resource");
            return Err(BankError::UnknownResource {
                resource: resource.clone(),
            });
        };

        match slot.value() {
            Some(current) if current == holder => return Ok(false),
            Some(_) => {
                debug!(resource = %resource, "Lock busy");
                return Err(BankError::ResourceBusy {
                    resource: resource.clone(),
                });
            }
            None => *slot.value_mut() = Some(holder.clone()),
        }

        self.held
            .entry(holder.clone())
            .or_default()
            .insert(resource.clone());

        debug!(resource = %resource, holder = %holder.short(), "Lock acquired");
        Ok(true)
    }

    /// Returns true if `holder` currently holds `resource`.
    pub fn is_held_by(&self, resource: &ResourceId, holder: &SessionToken) -> bool {
        self.slots
            .get(resource)
            .is_some_and(|slot| slot.as_ref() == Some(holder))
    }

    /// Authorization check before any mutation.
    ///
    /// # Errors
    ///
    /// `BankError::LockNotHeld` unless `holder` holds `resource`.
    pub fn ensure_held(&self, resource: &ResourceId, holder: &SessionToken) -> BankResult<()> {
        if self.is_held_by(resource, holder) {
            Ok(())
        } else {
            Err(BankError::LockNotHeld {
                resource: resource.clone(),
            })
        }
    }

    /// Returns the current holder of `resource`, if any.
    pub fn holder(&self, resource: &ResourceId) -> Option<SessionToken> {
        self.slots.get(resource).and_then(|slot| slot.clone())
    }

    /// Frees `resource` if `holder` holds it. Returns true if it was freed.
    pub fn release(&self, resource: &ResourceId, holder: &SessionToken) -> bool {
        let Some(mut slot) = self.slots.get_mut(resource) else {
            return false;
        };
        if slot.as_ref() != Some(holder) {
            return false;
        }

        *slot = None;
        self.forget(holder, resource);
        debug!(resource = %resource, holder = %holder.short(), "Lock released");
        true
    }

    /// Frees every lock held by `holder` and returns the resources freed.
    ///
    /// Only the holder's own index entry is visited; locks of other holders
    /// are never touched.
    pub fn release_all(&self, holder: &SessionToken) -> Vec<ResourceId> {
        let Some((_, resources)) = self.held.remove(holder) else {
            return Vec::new();
        };

        let mut released = Vec::with_capacity(resources.len());
        for resource in resources {
            let Some(mut slot) = self.slots.get_mut(&resource) else {
                continue;
            };
            if slot.as_ref() == Some(holder) {
                *slot = None;
                drop(slot);
                released.push(resource);
            }
        }

        if !released.is_empty() {
            debug!(
                holder = %holder.short(),
                count = released.len(),
                "Released all locks"
            );
        }
        released
    }

    /// Registers a free slot for a new resource. Existing slots are kept.
    pub fn register_slot(&self, resource: ResourceId) {
        self.slots.entry(resource).or_insert(None);
    }

    /// Drops the slot of a deleted resource, forgetting any holder.
    pub fn remove_slot(&self, resource: &ResourceId) {
        if let Some((resource, Some(holder))) = self.slots.remove(resource) {
            self.forget(&holder, &resource);
        }
    }

    /// Returns every resource currently held by `holder`.
    pub fn held_by(&self, holder: &SessionToken) -> Vec<ResourceId> {
        self.held
            .get(holder)
            .map(|resources| resources.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of registered slots, free or held.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Removes `resource` from the holder index, dropping empty entries.
    fn forget(&self, holder: &SessionToken, resource: &ResourceId) {
        let now_empty = match self.held.get_mut(holder) {
            Some(mut resources) => {
                resources.remove(resource);
                resources.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.held.remove_if(holder, |_, resources| resources.is_empty());
        }
    }
}

/// Releases a lock when dropped, unless kept.
///
/// Used where an operation takes several locks and must give all of them
/// back if any step fails.
#[must_use = "dropping the guard releases the lock immediately"]
#[derive(Debug)]
pub struct LockGuard<'a> {
    registry: &'a LockRegistry,
    resource: ResourceId,
    holder: SessionToken,
    armed: bool,
}

impl LockGuard<'_> {
    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    /// Keeps the lock held past the guard's lifetime.
    pub fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.release(&self.resource, &self.holder);
        }
    }
}
