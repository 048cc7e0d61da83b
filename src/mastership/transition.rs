//! Role Transition Table
//!
//! Every write operation is resolved against the caller's current role through
//! one explicit (Role × Operation) → Action table. The coordinator applies the
//! action; this module only decides which one.
//!
//! All twelve combinations live in one table; [`plan`] only indexes it.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::Role;

/// Write operation requested against a (node, resource) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Local node asks for whatever role policy grants it
    RequestRole,

    /// Administrative assignment of a master
    SetMaster,

    /// Register as (or demote to) standby
    SetStandby,

    /// Give up on the resource
    RelinquishRole,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::RequestRole,
        Operation::SetMaster,
        Operation::SetStandby,
        Operation::RelinquishRole,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestRole => "request_role",
            Self::SetMaster => "set_master",
            Self::SetStandby => "set_standby",
            Self::RelinquishRole => "relinquish_role",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutation the coordinator performs for one table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Already master: evict from both pools, no master change
    Reinforce,

    /// Stay standby: make sure the node is in the standby pool and a term exists
    RemainStandby,

    /// Take mastership of a masterless resource; queue as standby if another
    /// node already holds it
    Claim,

    /// Demote the current master (if any) to standby and install the node
    Promote,

    /// Displace the node via re-election, then park it in the standby pool
    ReelectThenStandby,

    /// Insert the node into the standby pool
    JoinStandby,

    /// Displace the node via re-election, then park it in the unusable pool
    ReelectThenUnusable,

    /// Insert the node into the unusable pool
    MarkUnusable,
}

impl Action {
    /// Role the acting node holds once the action is applied uncontended.
    pub fn resulting_role(&self) -> Role {
        match self {
            Self::Reinforce | Self::Claim | Self::Promote => Role::Master,
            Self::RemainStandby | Self::ReelectThenStandby | Self::JoinStandby => Role::Standby,
            Self::ReelectThenUnusable | Self::MarkUnusable => Role::None,
        }
    }

    /// Whether the action starts a re-election for the resource.
    pub fn triggers_reelection(&self) -> bool {
        matches!(self, Self::ReelectThenStandby | Self::ReelectThenUnusable)
    }

    /// Whether the action can change which node is master.
    pub fn may_change_master(&self) -> bool {
        matches!(
            self,
            Self::Claim | Self::Promote | Self::ReelectThenStandby | Self::ReelectThenUnusable
        )
    }
}

/// Roles in table column order.
pub const ROLES: [Role; 3] = [Role::None, Role::Master, Role::Standby];

/// The full transition table: one row per operation in [`Operation::ALL`]
/// order, one column per role in [`ROLES`] order.
pub const TRANSITIONS: [[Action; 3]; 4] = [
    // RequestRole
    [Action::Claim, Action::Reinforce, Action::RemainStandby],
    // SetMaster
    [Action::Promote, Action::Reinforce, Action::Promote],
    // SetStandby
    [Action::JoinStandby, Action::ReelectThenStandby, Action::JoinStandby],
    // RelinquishRole
    [Action::MarkUnusable, Action::ReelectThenUnusable, Action::MarkUnusable],
];

fn role_column(role: Role) -> usize {
    match role {
        Role::None => 0,
        Role::Master => 1,
        Role::Standby => 2,
    }
}

fn operation_row(op: Operation) -> usize {
    match op {
        Operation::RequestRole => 0,
        Operation::SetMaster => 1,
        Operation::SetStandby => 2,
        Operation::RelinquishRole => 3,
    }
}

/// Look up the action for a node currently holding `role`.
pub fn plan(role: Role, op: Operation) -> Action {
    TRANSITIONS[operation_row(op)][role_column(role)]
}

/// Every (role, operation, action) entry of the table.
pub fn entries() -> impl Iterator<Item = (Role, Operation, Action)> {
    Operation::ALL
        .into_iter()
        .flat_map(|op| ROLES.into_iter().map(move |role| (role, op, plan(role, op))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_and_column_order_match_lookup() {
        for (row, op) in Operation::ALL.into_iter().enumerate() {
            assert_eq!(operation_row(op), row);
        }
        for (column, role) in ROLES.into_iter().enumerate() {
            assert_eq!(role_column(role), column);
        }
        assert_eq!(entries().count(), 12);
    }

    #[test]
    fn test_plan_reads_documented_entries() {
        assert_eq!(plan(Role::None, Operation::RequestRole), Action::Claim);
        assert_eq!(plan(Role::Master, Operation::RequestRole), Action::Reinforce);
        assert_eq!(plan(Role::Standby, Operation::RequestRole), Action::RemainStandby);
        assert_eq!(plan(Role::Master, Operation::SetMaster), Action::Reinforce);
        assert_eq!(plan(Role::Standby, Operation::SetMaster), Action::Promote);
        assert_eq!(plan(Role::Master, Operation::SetStandby), Action::ReelectThenStandby);
        assert_eq!(plan(Role::None, Operation::SetStandby), Action::JoinStandby);
        assert_eq!(
            plan(Role::Master, Operation::RelinquishRole),
            Action::ReelectThenUnusable
        );
        assert_eq!(plan(Role::Standby, Operation::RelinquishRole), Action::MarkUnusable);
    }

    #[test]
    fn test_request_role_never_promotes_standby() {
        let action = plan(Role::Standby, Operation::RequestRole);
        assert_eq!(action.resulting_role(), Role::Standby);
        assert!(!action.may_change_master());
    }

    #[test]
    fn test_only_master_displacement_reelects() {
        for (role, _, action) in entries() {
            if action.triggers_reelection() {
                assert_eq!(role, Role::Master);
            }
        }
    }

    #[test]
    fn test_relinquish_leaves_node_without_role() {
        for role in ROLES {
            assert_eq!(
                plan(role, Operation::RelinquishRole).resulting_role(),
                Role::None
            );
        }
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::RelinquishRole.to_string(), "relinquish_role");
        let op: Operation = serde_json::from_str("\"set_standby\"").unwrap();
        assert_eq!(op, Operation::SetStandby);
    }
}
