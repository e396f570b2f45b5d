//! Cell groups
//!
//! Groups are named, collapsible collections of cell ids. They only affect
//! organization, never execution. The free functions here are
//! membership-agnostic; exclusive membership is enforced by
//! [`crate::Notebook::assign_cell_to_group`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cells::CellId;

/// Unique identifier for a group
pub type GroupId = Uuid;

/// Title given to groups created without one
pub const DEFAULT_GROUP_TITLE: &str = "New Group";

/// A named collection of cells
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellGroup {
    pub id: GroupId,
    pub title: String,
    #[serde(default)]
    pub collapsed: bool,
    /// Member cells in display order
    #[serde(default)]
    pub cell_ids: Vec<CellId>,
}

impl CellGroup {
    pub fn new(title: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.unwrap_or(DEFAULT_GROUP_TITLE).to_string(),
            collapsed: false,
            cell_ids: Vec::new(),
        }
    }

    pub fn contains(&self, cell_id: CellId) -> bool {
        self.cell_ids.contains(&cell_id)
    }
}

/// Append a new empty group
pub fn create_group(groups: &[CellGroup], title: Option<&str>) -> Vec<CellGroup> {
    let mut next = groups.to_vec();
    next.push(CellGroup::new(title));
    next
}

/// Append `cell_id` to the group `group_id`
///
/// Membership in other groups is left alone. Unknown groups leave the
/// sequence unchanged, and a cell already in the target group is not
/// added twice.
pub fn add_cell_to_group(
    groups: &[CellGroup],
    cell_id: CellId,
    group_id: GroupId,
) -> Vec<CellGroup> {
    let mut next = groups.to_vec();
    if let Some(group) = next.iter_mut().find(|g| g.id == group_id) {
        if !group.contains(cell_id) {
            group.cell_ids.push(cell_id);
        }
    }
    next
}

/// Remove `cell_id` from every group that lists it
pub fn remove_cell_from_groups(groups: &[CellGroup], cell_id: CellId) -> Vec<CellGroup> {
    groups
        .iter()
        .cloned()
        .map(|mut group| {
            group.cell_ids.retain(|id| *id != cell_id);
            group
        })
        .collect()
}

pub fn toggle_group_collapsed(groups: &[CellGroup], group_id: GroupId) -> Vec<CellGroup> {
    let mut next = groups.to_vec();
    if let Some(group) = next.iter_mut().find(|g| g.id == group_id) {
        group.collapsed = !group.collapsed;
    }
    next
}

/// Drop a group; its cells stay in the notebook, ungrouped
pub fn delete_group(groups: &[CellGroup], group_id: GroupId) -> Vec<CellGroup> {
    groups.iter().filter(|g| g.id != group_id).cloned().collect()
}

/// First group listing `cell_id`
pub fn group_of(groups: &[CellGroup], cell_id: CellId) -> Option<&CellGroup> {
    groups.iter().find(|g| g.contains(cell_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_group_defaults() {
        let groups = create_group(&[], None);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].title, DEFAULT_GROUP_TITLE);
        assert!(!groups[0].collapsed);
        assert!(groups[0].cell_ids.is_empty());

        let groups = create_group(&groups, Some("Staging"));
        assert_eq!(groups[1].title, "Staging");
        assert_ne!(groups[0].id, groups[1].id);
    }

    #[test]
    fn test_add_cell_to_group_keeps_other_memberships() {
        let groups = create_group(&create_group(&[], Some("a")), Some("b"));
        let cell = Uuid::new_v4();

        let groups = add_cell_to_group(&groups, cell, groups[0].id);
        let groups = add_cell_to_group(&groups, cell, groups[1].id);

        assert!(groups[0].contains(cell));
        assert!(groups[1].contains(cell));
    }

    #[test]
    fn test_add_cell_to_unknown_group_is_noop() {
        let groups = create_group(&[], None);
        let next = add_cell_to_group(&groups, Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(next, groups);
    }

    #[test]
    fn test_remove_and_delete() {
        let groups = create_group(&[], None);
        let cell = Uuid::new_v4();
        let groups = add_cell_to_group(&groups, cell, groups[0].id);
        assert_eq!(group_of(&groups, cell).map(|g| g.id), Some(groups[0].id));

        let removed = remove_cell_from_groups(&groups, cell);
        assert!(group_of(&removed, cell).is_none());

        let toggled = toggle_group_collapsed(&groups, groups[0].id);
        assert!(toggled[0].collapsed);

        assert!(delete_group(&groups, groups[0].id).is_empty());
    }

    #[test]
    fn test_group_wire_format() {
        let groups = create_group(&[], Some("Reports"));
        let json = serde_json::to_value(&groups[0]).unwrap();
        assert_eq!(json["title"], "Reports");
        assert!(json["cellIds"].as_array().unwrap().is_empty());
    }
}
