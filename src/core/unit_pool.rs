//! Fixed-capacity pool of execution units with an idle/busy partition.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::marker::PhantomData;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::protocol::{UnitEvent, UnitId, UnitRequest};
use super::unit::{spawn_unit, ExecutionUnit, UnitStatus};
use super::{Resolver, SchedulerError};

/// Owns every execution unit. Only the dispatch loop touches it.
pub(crate) struct UnitPool<P, R, E> {
    resolver: E,
    events: mpsc::UnboundedSender<UnitEvent<R>>,
    stack_size: usize,
    units: BTreeMap<usize, ExecutionUnit<P>>,
    /// Idle slots in the order they became idle.
    idle: VecDeque<usize>,
    /// Slots whose replacement could not be spawned yet.
    vacant: BTreeSet<usize>,
    target: usize,
    next_incarnation: u64,
    _result: PhantomData<fn() -> R>,
}

impl<P, R, E> UnitPool<P, R, E>
where
    P: Send + 'static,
    R: Send + 'static,
    E: Resolver<P, R>,
{
    pub fn new(resolver: E, events: mpsc::UnboundedSender<UnitEvent<R>>, stack_size: usize) -> Self {
        Self {
            resolver,
            events,
            stack_size,
            units: BTreeMap::new(),
            idle: VecDeque::new(),
            vacant: BTreeSet::new(),
            target: 0,
            next_incarnation: 0,
            _result: PhantomData,
        }
    }

    /// Spawn the initial units. Fails if any of them cannot start.
    pub fn start(&mut self, capacity: usize) -> Result<(), SchedulerError> {
        self.target = capacity;
        for slot in 0..capacity {
            let unit = self.spawn(slot)?;
            self.insert_idle(unit);
        }
        info!(capacity, "unit pool started");
        Ok(())
    }

    fn spawn(&mut self, slot: usize) -> Result<ExecutionUnit<P>, SchedulerError> {
        let id = UnitId {
            slot,
            incarnation: self.next_incarnation,
        };
        self.next_incarnation += 1;
        spawn_unit(id, self.resolver.clone(), self.events.clone(), self.stack_size)
    }

    fn insert_idle(&mut self, unit: ExecutionUnit<P>) {
        let slot = unit.id.slot;
        self.vacant.remove(&slot);
        self.units.insert(slot, unit);
        self.idle.push_back(slot);
    }

    /// Spawn into `slot`, or leave it vacant for a later [`refill`](Self::refill).
    fn spawn_into(&mut self, slot: usize) {
        match self.spawn(slot) {
            Ok(unit) => self.insert_idle(unit),
            Err(e) => {
                warn!(slot, error = %e, "could not spawn unit, slot left vacant");
                self.vacant.insert(slot);
            }
        }
    }

    /// Take the longest-idle unit out of the idle partition.
    ///
    /// The caller must follow up with [`mark_busy`](Self::mark_busy) or
    /// [`restore_idle`](Self::restore_idle).
    pub fn take_idle(&mut self) -> Option<UnitId> {
        let slot = self.idle.pop_front()?;
        self.units.get(&slot).map(|u| u.id)
    }

    pub fn mark_busy(&mut self, slot: usize) {
        if let Some(unit) = self.units.get_mut(&slot) {
            unit.status = UnitStatus::Busy;
        }
    }

    /// Undo [`take_idle`](Self::take_idle) without the unit having run anything.
    pub fn restore_idle(&mut self, slot: usize) {
        if self.units.contains_key(&slot) && !self.idle.contains(&slot) {
            self.idle.push_front(slot);
        }
    }

    /// A busy unit finished its task; keep it or retire it if the pool is
    /// above target.
    pub fn release(&mut self, slot: usize) {
        if self.excess() > 0 {
            self.retire(slot);
            return;
        }
        if let Some(unit) = self.units.get_mut(&slot) {
            unit.status = UnitStatus::Idle;
            if !self.idle.contains(&slot) {
                self.idle.push_back(slot);
            }
        }
    }

    pub fn send(&self, slot: usize, request: UnitRequest<P>) -> Result<(), SchedulerError> {
        self.units
            .get(&slot)
            .ok_or_else(|| SchedulerError::DispatchFailure(format!("no unit in slot {slot}")))?
            .send(request)
    }

    #[cfg(test)]
    pub fn sever_requests(&mut self, slot: usize) -> Option<crossbeam_channel::Sender<UnitRequest<P>>> {
        self.units.get_mut(&slot).map(ExecutionUnit::sever_requests)
    }

    /// Whether `unit` is the live incarnation of its slot.
    pub fn is_current(&self, unit: UnitId) -> bool {
        self.units.get(&unit.slot).is_some_and(|u| u.id == unit)
    }

    pub fn has_exited(&self, slot: usize) -> bool {
        self.units.get(&slot).is_some_and(ExecutionUnit::has_exited)
    }

    fn detach(&mut self, slot: usize) -> Option<ExecutionUnit<P>> {
        self.idle.retain(|s| *s != slot);
        self.units.remove(&slot)
    }

    /// Terminate the unit in `slot` and spawn a fresh incarnation in its
    /// place, or retire the slot if the pool is above target. Returns whether
    /// a replacement is live.
    pub fn replace(&mut self, slot: usize) -> bool {
        let Some(old) = self.detach(slot) else {
            return false;
        };
        let old_id = old.id;
        old.terminate();
        if self.live() + self.vacant.len() >= self.target {
            debug!(unit = %old_id, "slot retired instead of replaced");
            return false;
        }
        self.spawn_into(slot);
        self.units.get(&slot).is_some_and(|unit| {
            info!(old = %old_id, new = %unit.id, "execution unit replaced");
            true
        })
    }

    /// Terminate the unit in `slot` for good.
    pub fn retire(&mut self, slot: usize) {
        if let Some(unit) = self.detach(slot) {
            info!(unit = %unit.id, "execution unit retired");
            unit.terminate();
        }
    }

    /// Remove a unit without replacement, e.g. during shutdown.
    pub fn remove(&mut self, slot: usize) {
        if let Some(unit) = self.detach(slot) {
            unit.terminate();
        }
    }

    /// Retry spawning into vacant slots.
    pub fn refill(&mut self) {
        let vacant: Vec<usize> = self.vacant.iter().copied().collect();
        for slot in vacant {
            self.vacant.remove(&slot);
            self.spawn_into(slot);
        }
    }

    /// Move toward `target`: spawn into free slots when below it, retire idle
    /// units when above it. Busy units are never touched; they retire on
    /// release. Returns `(spawned, retired)`.
    pub fn set_target(&mut self, target: usize) -> (usize, usize) {
        self.target = target;
        let mut spawned = 0;
        let mut retired = 0;

        while self.live() + self.vacant.len() < self.target {
            let slot = self.free_slot();
            self.spawn_into(slot);
            spawned += 1;
        }

        while self.excess() > 0 {
            if let Some(slot) = self.vacant.iter().next_back().copied() {
                self.vacant.remove(&slot);
                continue;
            }
            let Some(slot) = self.idle.iter().max().copied() else {
                break;
            };
            self.retire(slot);
            retired += 1;
        }

        (spawned, retired)
    }

    fn free_slot(&self) -> usize {
        (0..)
            .find(|slot| !self.units.contains_key(slot) && !self.vacant.contains(slot))
            .unwrap_or(0)
    }

    /// Pick up to `n` idle units for a liveness probe.
    pub fn sample_idle(&self, n: usize) -> Vec<usize> {
        self.idle.iter().take(n).copied().collect()
    }

    /// Terminate every unit, idle or busy.
    pub fn terminate_all(&mut self) {
        self.idle.clear();
        self.vacant.clear();
        let units = std::mem::take(&mut self.units);
        let count = units.len();
        for unit in units.into_values() {
            unit.terminate();
        }
        info!(count, "all execution units terminated");
    }

    pub const fn target(&self) -> usize {
        self.target
    }

    pub fn live(&self) -> usize {
        self.units.len()
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    pub fn busy_count(&self) -> usize {
        self.units
            .values()
            .filter(|u| u.status == UnitStatus::Busy)
            .count()
    }

    /// Units beyond target, waiting to be retired.
    pub fn excess(&self) -> usize {
        (self.live() + self.vacant.len()).saturating_sub(self.target)
    }
}
