use std::fmt::{self, Write};
use std::sync::Arc;

use crate::node::OpNode;

use super::ExecutionTree;

impl ExecutionTree {
    /// Write the summary outline followed by the per-operator details for the
    /// subtree at `op` (the whole tree when `op` is None).
    pub fn print<W: Write>(&self, out: &mut W, op: Option<&Arc<OpNode>>) -> fmt::Result {
        let Some(start) = op.or(self.root.as_ref()) else {
            return writeln!(out, "Execution tree is empty");
        };
        out.write_str("Execution tree summary:\n-----------------------\n")?;
        print_node(out, start, String::new(), true, false)?;
        out.write_str("\nExecution tree operator details:\n--------------------------------\n")?;
        print_node(out, start, String::new(), true, true)
    }

    /// Compact outline of the whole tree.
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

fn print_node<W: Write>(
    out: &mut W,
    node: &Arc<OpNode>,
    mut indent: String,
    last: bool,
    detailed: bool,
) -> fmt::Result {
    if detailed {
        out.write_str(&node.detailed())?;
    } else {
        writeln!(out, "{}+- {}", indent, node)?;
        indent.push_str(if last { "    " } else { "|   " });
    }

    let children = node.children();
    let count = children.len();
    for (i, child) in children.iter().enumerate() {
        print_node(out, child, indent.clone(), i + 1 == count, detailed)?;
    }
    Ok(())
}

impl fmt::Display for ExecutionTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root.as_ref() {
            Some(root) => print_node(f, root, String::new(), true, false),
            None => writeln!(f, "Execution tree is empty"),
        }
    }
}
