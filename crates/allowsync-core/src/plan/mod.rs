//! Reconciliation plans
//!
//! A [`Plan`] is derived by diffing the checkpoint against a freshly fetched
//! desired document. It is never stored.
//!
//! ```text
//! checkpoint {a: 1.1.1.1, b: 2.2.2.2}
//! desired    {a: 1.1.1.1, b: 3.3.3.3, c: 4.4.4.4}
//!
//! operations: Replace(b, 2.2.2.2 -> 3.3.3.3), Add(c, 4.4.4.4)
//! steps:      Remove(b, 2.2.2.2), Add(b, 3.3.3.3), Add(c, 4.4.4.4)
//! ```

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::model::{Address, Document, Identifier};

/// One entry of a plan
///
/// Each identifier appears in at most one operation per plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Identifier is new: grant its address
    Add {
        identifier: Identifier,
        address: Address,
    },
    /// Identifier moved: revoke the old address, then grant the new one
    Replace {
        identifier: Identifier,
        old: Address,
        new: Address,
    },
    /// Identifier is gone: revoke its address
    Remove {
        identifier: Identifier,
        address: Address,
    },
}

impl Operation {
    pub fn identifier(&self) -> &Identifier {
        match self {
            Operation::Add { identifier, .. }
            | Operation::Replace { identifier, .. }
            | Operation::Remove { identifier, .. } => identifier,
        }
    }

    /// Firewall-level steps for this operation, in application order
    pub fn steps(&self) -> Vec<Step> {
        match self {
            Operation::Add {
                identifier,
                address,
            } => vec![Step::Add {
                identifier: identifier.clone(),
                address: address.clone(),
            }],
            Operation::Replace {
                identifier,
                old,
                new,
            } => vec![
                Step::Remove {
                    identifier: identifier.clone(),
                    address: old.clone(),
                },
                Step::Add {
                    identifier: identifier.clone(),
                    address: new.clone(),
                },
            ],
            Operation::Remove {
                identifier,
                address,
            } => vec![Step::Remove {
                identifier: identifier.clone(),
                address: address.clone(),
            }],
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Add {
                identifier,
                address,
            } => write!(f, "+ {identifier} {address}"),
            Operation::Replace {
                identifier,
                old,
                new,
            } => write!(f, "~ {identifier} {old} -> {new}"),
            Operation::Remove {
                identifier,
                address,
            } => write!(f, "- {identifier} {address}"),
        }
    }
}

/// A single allow-rule change against the access controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Add {
        identifier: Identifier,
        address: Address,
    },
    Remove {
        identifier: Identifier,
        address: Address,
    },
}

impl Step {
    pub fn identifier(&self) -> &Identifier {
        match self {
            Step::Add { identifier, .. } | Step::Remove { identifier, .. } => identifier,
        }
    }

    pub fn address(&self) -> &Address {
        match self {
            Step::Add { address, .. } | Step::Remove { address, .. } => address,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Add {
                identifier,
                address,
            } => write!(f, "add {address} ({identifier})"),
            Step::Remove {
                identifier,
                address,
            } => write!(f, "remove {address} ({identifier})"),
        }
    }
}

/// Ordered set of operations converging a checkpoint onto a desired document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Plan {
    operations: Vec<Operation>,
}

impl Plan {
    /// Diff `checkpoint` against `desired`
    ///
    /// Identifiers are visited in order over the union of both documents.
    /// Unchanged identifiers produce nothing, so diffing a document against
    /// itself yields an empty plan.
    pub fn diff(checkpoint: &Document, desired: &Document) -> Self {
        let identifiers: BTreeSet<&Identifier> = checkpoint
            .iter()
            .chain(desired.iter())
            .map(|(id, _)| id)
            .collect();

        let mut operations = Vec::new();
        for identifier in identifiers {
            let op = match (checkpoint.get(identifier), desired.get(identifier)) {
                (None, Some(address)) => Operation::Add {
                    identifier: identifier.clone(),
                    address: address.clone(),
                },
                (Some(old), Some(new)) if old != new => Operation::Replace {
                    identifier: identifier.clone(),
                    old: old.clone(),
                    new: new.clone(),
                },
                (Some(address), None) => Operation::Remove {
                    identifier: identifier.clone(),
                    address: address.clone(),
                },
                _ => continue,
            };
            operations.push(op);
        }

        Self { operations }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// All firewall steps, `Replace` expanded to remove-then-add
    pub fn steps(&self) -> Vec<Step> {
        self.operations.iter().flat_map(Operation::steps).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operations.is_empty() {
            return writeln!(f, "(no changes)");
        }
        for op in &self.operations {
            writeln!(f, "{op}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(entries: &[(&str, &str)]) -> Document {
        entries
            .iter()
            .map(|(id, addr)| (Identifier::new(*id).unwrap(), Address::new(*addr)))
            .collect()
    }

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    #[test]
    fn diff_emits_remove_before_add_for_changed_address() {
        let checkpoint = doc(&[("a", "1.1.1.1"), ("b", "2.2.2.2")]);
        let desired = doc(&[("a", "1.1.1.1"), ("b", "3.3.3.3"), ("c", "4.4.4.4")]);

        let plan = Plan::diff(&checkpoint, &desired);

        assert_eq!(
            plan.steps(),
            vec![
                Step::Remove {
                    identifier: id("b"),
                    address: Address::new("2.2.2.2")
                },
                Step::Add {
                    identifier: id("b"),
                    address: Address::new("3.3.3.3")
                },
                Step::Add {
                    identifier: id("c"),
                    address: Address::new("4.4.4.4")
                },
            ]
        );
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn diff_against_self_is_empty() {
        let desired = doc(&[("a", "1.1.1.1"), ("b", "2.2.2.2")]);
        assert!(Plan::diff(&desired, &desired).is_empty());
    }

    #[test]
    fn diff_to_empty_removes_everything() {
        let plan = Plan::diff(&doc(&[("a", "1.1.1.1")]), &Document::new());
        assert_eq!(
            plan.operations(),
            &[Operation::Remove {
                identifier: id("a"),
                address: Address::new("1.1.1.1")
            }]
        );
    }

    #[test]
    fn each_identifier_appears_once() {
        let checkpoint = doc(&[("a", "1.1.1.1"), ("b", "2.2.2.2"), ("d", "5.5.5.5")]);
        let desired = doc(&[("a", "9.9.9.9"), ("c", "4.4.4.4"), ("d", "5.5.5.5")]);

        let plan = Plan::diff(&checkpoint, &desired);
        let ids: Vec<&str> = plan
            .operations()
            .iter()
            .map(|op| op.identifier().as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn textual_difference_is_a_change() {
        let plan = Plan::diff(&doc(&[("a", "::1")]), &doc(&[("a", "0:0:0:0:0:0:0:1")]));
        assert!(matches!(plan.operations(), [Operation::Replace { .. }]));
    }

    #[test]
    fn display_renders_one_line_per_operation() {
        let plan = Plan::diff(
            &doc(&[("a", "1.1.1.1"), ("b", "2.2.2.2")]),
            &doc(&[("b", "3.3.3.3"), ("c", "4.4.4.4")]),
        );
        assert_eq!(
            plan.to_string(),
            "- a 1.1.1.1\n~ b 2.2.2.2 -> 3.3.3.3\n+ c 4.4.4.4\n"
        );
        assert_eq!(Plan::default().to_string(), "(no changes)\n");
    }
}
