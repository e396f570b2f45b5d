//! Notebook aggregate
//!
//! Wraps the pure cell and group operations behind one owner that upholds
//! the notebook-wide invariants: at least one cell, unique cell ids, every
//! cell in at most one group, and no group referencing a deleted cell.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cells::{self, CellId, CellKind, NotebookCell};
use crate::execution::ExecutionTicket;
use crate::groups::{self, CellGroup, GroupId};
use crate::NotebookError;

/// Ordered cells plus their groups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notebook {
    cells: Vec<NotebookCell>,

    #[serde(default)]
    groups: Vec<CellGroup>,

    /// Latest run number per cell
    #[serde(skip)]
    runs: AHashMap<CellId, u64>,
}

impl Notebook {
    /// Create a notebook holding a single empty SQL cell
    pub fn new() -> Self {
        Self {
            cells: vec![NotebookCell::new(CellKind::Sql)],
            groups: Vec::new(),
            runs: AHashMap::new(),
        }
    }

    /// Build a notebook from existing cells
    pub fn from_cells(cells: Vec<NotebookCell>) -> Result<Self, NotebookError> {
        let notebook = Self {
            cells,
            groups: Vec::new(),
            runs: AHashMap::new(),
        };
        notebook.check_invariants()?;
        Ok(notebook)
    }

    /// Load a notebook document
    pub fn from_json(json: &str) -> Result<Self, NotebookError> {
        let mut notebook: Notebook = serde_json::from_str(json)?;
        notebook.check_invariants()?;

        // Runs do not survive a reload
        for cell in &mut notebook.cells {
            if cell.executing {
                warn!("Cell {} was saved mid-run, resetting", cell.id);
                cell.executing = false;
            }
        }

        let mut group_ids = ahash::AHashSet::new();
        for group in &notebook.groups {
            if !group_ids.insert(group.id) {
                return Err(NotebookError::DuplicateGroup(group.id));
            }
        }

        // Unknown cells are dropped; a cell listed twice stays where it
        // appears first.
        let known: ahash::AHashSet<CellId> = notebook.cells.iter().map(|c| c.id).collect();
        let mut placed = ahash::AHashSet::new();
        for group in &mut notebook.groups {
            group.cell_ids.retain(|id| known.contains(id) && placed.insert(*id));
        }
        Ok(notebook)
    }

    /// Serialize the notebook document
    pub fn to_json(&self) -> Result<String, NotebookError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn check_invariants(&self) -> Result<(), NotebookError> {
        if self.cells.is_empty() {
            return Err(NotebookError::EmptyNotebook);
        }
        let mut seen = ahash::AHashSet::new();
        for cell in &self.cells {
            if !seen.insert(cell.id) {
                return Err(NotebookError::DuplicateCell(cell.id));
            }
        }
        Ok(())
    }

    pub fn cells(&self) -> &[NotebookCell] {
        &self.cells
    }

    pub fn groups(&self) -> &[CellGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, id: CellId) -> Option<&NotebookCell> {
        self.cells.iter().find(|c| c.id == id)
    }

    pub fn index_of(&self, id: CellId) -> Option<usize> {
        cells::find_cell_index(&self.cells, id)
    }

    /// Add an empty cell, returning its id
    pub fn add_cell(&mut self, kind: CellKind, after_index: Option<usize>) -> CellId {
        self.insert_cell(NotebookCell::new(kind), after_index)
    }

    /// Add a prepared cell, returning its id
    pub fn insert_cell(&mut self, cell: NotebookCell, after_index: Option<usize>) -> CellId {
        let id = cell.id;
        self.cells = cells::insert_cell(&self.cells, cell, after_index);
        debug!("Added cell {}", id);
        id
    }

    pub fn move_cell(&mut self, from_index: usize, to_index: usize) {
        self.cells = cells::move_cell(&self.cells, from_index, to_index);
    }

    /// Duplicate the cell at `index`, returning the copy's id
    pub fn duplicate_cell(&mut self, index: usize) -> Option<CellId> {
        if self.cells.is_empty() {
            return None;
        }
        let index = index.min(self.cells.len() - 1);
        self.cells = cells::duplicate_cell(&self.cells, index);
        self.cells.get(index + 1).map(|c| c.id)
    }

    /// Delete the cell at `index`, returning it
    ///
    /// Returns `None` when nothing was removed (last cell, bad index).
    pub fn delete_cell(&mut self, index: usize) -> Option<NotebookCell> {
        let removed = self.cells.get(index).cloned()?;
        let next = cells::delete_cell(&self.cells, index);
        if next.len() == self.cells.len() {
            return None;
        }

        self.cells = next;
        self.groups = groups::remove_cell_from_groups(&self.groups, removed.id);
        self.runs.remove(&removed.id);
        debug!("Deleted cell {}", removed.id);
        Some(removed)
    }

    pub fn update_cell_value(
        &mut self,
        id: CellId,
        value: impl Into<String>,
    ) -> Result<(), NotebookError> {
        let index = self.index_of(id).ok_or(NotebookError::CellNotFound(id))?;
        self.cells = cells::update_cell_value(&self.cells, index, value);
        Ok(())
    }

    pub fn set_cell_label(
        &mut self,
        id: CellId,
        label: Option<String>,
    ) -> Result<(), NotebookError> {
        let cell = self.cell_mut(id)?;
        cell.label = label;
        Ok(())
    }

    pub fn toggle_collapsed(&mut self, id: CellId) -> Result<(), NotebookError> {
        let index = self.index_of(id).ok_or(NotebookError::CellNotFound(id))?;
        self.cells = cells::toggle_collapsed(&self.cells, index);
        Ok(())
    }

    /// Create a group, returning its id
    pub fn create_group(&mut self, title: Option<&str>) -> GroupId {
        self.groups = groups::create_group(&self.groups, title);
        self.groups[self.groups.len() - 1].id
    }

    /// Put a cell into a group, taking it out of any group it was in before
    pub fn assign_cell_to_group(
        &mut self,
        cell_id: CellId,
        group_id: GroupId,
    ) -> Result<(), NotebookError> {
        if self.cell(cell_id).is_none() {
            return Err(NotebookError::CellNotFound(cell_id));
        }
        if !self.groups.iter().any(|g| g.id == group_id) {
            return Err(NotebookError::GroupNotFound(group_id));
        }

        let ungrouped = groups::remove_cell_from_groups(&self.groups, cell_id);
        self.groups = groups::add_cell_to_group(&ungrouped, cell_id, group_id);
        Ok(())
    }

    pub fn ungroup_cell(&mut self, cell_id: CellId) {
        self.groups = groups::remove_cell_from_groups(&self.groups, cell_id);
    }

    pub fn toggle_group_collapsed(&mut self, group_id: GroupId) {
        self.groups = groups::toggle_group_collapsed(&self.groups, group_id);
    }

    pub fn delete_group(&mut self, group_id: GroupId) {
        self.groups = groups::delete_group(&self.groups, group_id);
    }

    pub fn group_of(&self, cell_id: CellId) -> Option<&CellGroup> {
        groups::group_of(&self.groups, cell_id)
    }

    /// Move a cell into `executing` and hand out the ticket for this run
    pub fn begin_execution(&mut self, id: CellId) -> Result<ExecutionTicket, NotebookError> {
        self.cell_mut(id)?.start_execution()?;

        let run = self.runs.entry(id).or_insert(0);
        *run += 1;
        Ok(ExecutionTicket { cell_id: id, run: *run })
    }

    /// Record the outcome of a run
    ///
    /// Returns `false` when the ticket is stale (the cell was deleted or a
    /// newer run started) and the outcome was dropped.
    pub fn finish_execution(
        &mut self,
        ticket: ExecutionTicket,
        outcome: Result<serde_json::Value, String>,
    ) -> bool {
        if self.runs.get(&ticket.cell_id) != Some(&ticket.run) {
            debug!("Ignoring stale response for cell {} (run {})", ticket.cell_id, ticket.run);
            return false;
        }

        let Ok(cell) = self.cell_mut(ticket.cell_id) else {
            return false;
        };

        let recorded = match outcome {
            Ok(result) => cell.complete_success(result),
            Err(error) => cell.complete_error(error),
        };

        match recorded {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping response: {}", e);
                false
            }
        }
    }

    /// Stop waiting for the cell's current run
    ///
    /// The cell returns to idle and the pending response, when it arrives,
    /// is dropped. Returns `false` if the cell was not executing.
    pub fn abandon_execution(&mut self, id: CellId) -> Result<bool, NotebookError> {
        let cell = self.cell_mut(id)?;
        if !cell.executing {
            return Ok(false);
        }
        cell.executing = false;

        *self.runs.entry(id).or_insert(0) += 1;
        debug!("Abandoned run of cell {}", id);
        Ok(true)
    }

    fn cell_mut(&mut self, id: CellId) -> Result<&mut NotebookCell, NotebookError> {
        self.cells
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(NotebookError::CellNotFound(id))
    }
}

impl Default for Notebook {
    fn default() -> Self {
        Self::new()
    }
}
