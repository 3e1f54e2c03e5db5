//! Post-optimizer plan rewriting.
//!
//! Runs after the host's built-in optimizer. The rewriter pattern-matches
//! the plan shapes that can move work into the remote SELECT:
//!
//! - `Order(TableScan)` moves the sort spec into the scan; the Order node
//!   stays for correctness since pass-through ordering is not guaranteed.
//! - `Limit(Order(TableScan))` with no offset additionally sets TOP N when
//!   the whole ordering pushes.
//! - `Top(TableScan)` sets TOP N directly.
//!
//! Everything is gated on the attachment's `order_pushdown` setting.

use crate::expr::SortKey;
use crate::scan::ScanPlan;
use crate::sqlgen::QueryGen;

/// Neutral plan shape the host exposes to the rewrite callback.
#[derive(Debug, Clone)]
pub enum PlanNode {
    /// A remote table scan.
    TableScan {
        /// The scan's bind artifact.
        plan: ScanPlan,
    },
    /// Sort node.
    Order {
        /// Sort keys.
        keys: Vec<SortKey>,
        /// Input.
        child: Box<PlanNode>,
    },
    /// Limit node.
    Limit {
        /// Row limit.
        limit: u64,
        /// Rows skipped before the limit; a non-zero offset blocks TOP.
        offset: u64,
        /// Input.
        child: Box<PlanNode>,
    },
    /// Top-N node (limit fused into ordering by the host optimizer).
    Top {
        /// Row limit.
        n: u64,
        /// Input.
        child: Box<PlanNode>,
    },
    /// Any other operator; its children are still visited.
    Other {
        /// Inputs.
        children: Vec<PlanNode>,
    },
}

/// Rewrite the plan in place, moving ORDER/TOP into scans where safe.
pub fn push_down(node: &mut PlanNode, order_pushdown: bool, varchar_to_nvarchar: bool) {
    if !order_pushdown {
        return;
    }
    visit(node, varchar_to_nvarchar);
}

fn visit(node: &mut PlanNode, varchar_to_nvarchar: bool) {
    match node {
        PlanNode::Limit {
            limit,
            offset,
            child,
        } => {
            if let PlanNode::Order { keys, child: grandchild } = child.as_mut() {
                if let PlanNode::TableScan { plan } = grandchild.as_mut() {
                    let generator = QueryGen::new(&plan.table, varchar_to_nvarchar, true);
                    let prefix = generator.pushable_sort_prefix(keys);

                    plan.order_by = keys.clone();
                    if *offset == 0 && prefix == keys.len() {
                        // Fully pushed ordering under a plain limit: the
                        // remote TOP bounds the transfer. The Limit node
                        // stays in the plan.
                        plan.top_n = Some(*limit);
                        tracing::debug!(limit, "TOP pushed into scan");
                    }
                }
            }
            visit(child, varchar_to_nvarchar);
        }
        PlanNode::Order { keys, child } => {
            if let PlanNode::TableScan { plan } = child.as_mut() {
                // The Order node stays; the scan just pre-sorts what it can.
                plan.order_by = keys.clone();
                tracing::debug!(keys = keys.len(), "ORDER BY moved into scan");
            }
            visit(child, varchar_to_nvarchar);
        }
        PlanNode::Top { n, child } => {
            if let PlanNode::TableScan { plan } = child.as_mut() {
                let generator = QueryGen::new(&plan.table, varchar_to_nvarchar, true);
                if generator.pushable_sort_prefix(&plan.order_by) == plan.order_by.len() {
                    plan.top_n = Some(*n);
                    tracing::debug!(n, "TOP pushed into scan");
                }
            }
            visit(child, varchar_to_nvarchar);
        }
        PlanNode::TableScan { .. } => {}
        PlanNode::Other { children } => {
            for child in children {
                visit(child, varchar_to_nvarchar);
            }
        }
    }
}
