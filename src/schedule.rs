// ==============================================================================
// schedule.rs — COMPONENT SEQUENCE WITH NESTED SUBSTEP GROUPS
// ------------------------------------------------------------------------------
// A vehicle update is an ordered list of components. Any run of components can
// be wrapped in a substep group that runs N times with dt / N per pass:
//
//   add(A)
//   begin_substep_group(4)
//       add(B)  add(C)
//   end_substep_group()
//   add(D)
//
//   update(dt):  A(dt)  [B(dt/4) C(dt/4)] x4  D(dt)
//
// Storage is a fixed arena (components + groups); nothing allocates.
// Group 0 is the implicit top level and always runs once.
// A component returning false stops the rest of the sequence for this update.
//
// Handles carry a generation; clear() bumps it so handles from an earlier
// layout are rejected instead of silently hitting the wrong group.
// ==============================================================================

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::SimulationContext;
use crate::error::{Result, VehicleError};
use crate::fixed::FixedVec;
use crate::types::Real;

pub const MAX_SEQUENCE_COMPONENTS: usize = 64;
pub const MAX_SUBSTEP_GROUPS: usize = 16;

/// One stage of an update. Returns false to stop the remaining stages.
pub trait Component<D: ?Sized> {
    fn update(&self, data: &mut D, dt: Real, ctx: &SimulationContext<'_>) -> bool;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubstepGroupHandle {
    index: u8,
    generation: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum Entry {
    Component(u8),
    Group(u8),
}

impl Default for Entry {
    fn default() -> Self {
        Entry::Component(0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Group {
    substeps: u32,
    entries: FixedVec<Entry, MAX_SEQUENCE_COMPONENTS>,
}

impl Default for Group {
    fn default() -> Self {
        Self { substeps: 1, entries: FixedVec::new() }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentSequence<C: Copy + Default> {
    components: FixedVec<C, MAX_SEQUENCE_COMPONENTS>,
    groups: FixedVec<Group, MAX_SUBSTEP_GROUPS>,
    /// Open groups, innermost last. Always starts with the top level.
    open: FixedVec<u8, MAX_SUBSTEP_GROUPS>,
    generation: u32,
}

impl<C: Copy + Default> Default for ComponentSequence<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Copy + Default> ComponentSequence<C> {
    pub fn new() -> Self {
        let mut groups = FixedVec::new();
        groups.try_push(Group::default());
        let mut open = FixedVec::new();
        open.try_push(0);
        Self { components: FixedVec::new(), groups, open, generation: 0 }
    }

    fn innermost(&self) -> usize {
        self.open.last().copied().unwrap_or(0) as usize
    }

    /// Appends a component to the innermost open group. False when full.
    pub fn add(&mut self, component: C) -> bool {
        let g = self.innermost();
        if self.components.is_full() || self.groups[g].entries.is_full() {
            warn!(capacity = MAX_SEQUENCE_COMPONENTS, "component sequence full");
            return false;
        }
        let index = self.components.len() as u8;
        self.components.try_push(component);
        self.groups[g].entries.try_push(Entry::Component(index))
    }

    /// Opens a nested group running `substeps` times per pass of its parent.
    pub fn begin_substep_group(&mut self, substeps: u32) -> Option<SubstepGroupHandle> {
        let parent = self.innermost();
        if substeps == 0 || self.groups.is_full() || self.open.is_full() || self.groups[parent].entries.is_full() {
            warn!(substeps, capacity = MAX_SUBSTEP_GROUPS, "cannot open substep group");
            return None;
        }
        let index = self.groups.len() as u8;
        self.groups.try_push(Group { substeps, entries: FixedVec::new() });
        self.groups[parent].entries.try_push(Entry::Group(index));
        self.open.try_push(index);
        Some(SubstepGroupHandle { index, generation: self.generation })
    }

    /// Closes the innermost group. False if only the top level is open.
    pub fn end_substep_group(&mut self) -> bool {
        if self.open.len() <= 1 {
            return false;
        }
        self.open.pop();
        true
    }

    pub fn set_substeps(&mut self, handle: SubstepGroupHandle, substeps: u32) -> Result<()> {
        let index = handle.index as usize;
        if handle.generation != self.generation || index == 0 || index >= self.groups.len() {
            return Err(VehicleError::StaleHandle { index, generation: handle.generation });
        }
        if substeps == 0 {
            return Err(VehicleError::invalid("ComponentSequence", "substep count must be >= 1"));
        }
        self.groups[index].substeps = substeps;
        Ok(())
    }

    pub fn substeps(&self, handle: SubstepGroupHandle) -> Option<u32> {
        if handle.generation != self.generation {
            return None;
        }
        self.groups.get(handle.index as usize).map(|g| g.substeps)
    }

    /// Removes everything. Previously issued handles become stale.
    pub fn clear(&mut self) {
        *self = Self { generation: self.generation.wrapping_add(1), ..Self::new() };
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.open.len() != 1 {
            return Err(VehicleError::UnbalancedSubstepGroup("a substep group was never closed"));
        }
        Ok(())
    }

    /// Runs the whole sequence once. False if a component stopped it.
    pub fn update<D: ?Sized>(&self, data: &mut D, dt: Real, ctx: &SimulationContext<'_>) -> bool
    where
        C: Component<D>,
    {
        self.run_group(0, data, dt, ctx)
    }

    fn run_group<D: ?Sized>(&self, group: usize, data: &mut D, dt: Real, ctx: &SimulationContext<'_>) -> bool
    where
        C: Component<D>,
    {
        let g = &self.groups[group];
        let sub_dt = dt / g.substeps as Real;
        for _ in 0..g.substeps {
            for entry in g.entries.iter() {
                let keep_going = match *entry {
                    Entry::Component(i) => self.components[i as usize].update(data, sub_dt, ctx),
                    Entry::Group(j) => self.run_group(j as usize, data, sub_dt, ctx),
                };
                if !keep_going {
                    return false;
                }
            }
        }
        true
    }
}
