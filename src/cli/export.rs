//! Export subcommand for `sb`
//!
//! Renders the tag forest and the dependency forest as JSON or as an indented
//! markdown outline.

use super::CommandOutput;
use crate::db::Database;
use crate::types::{ExportTodoNode, ExportTree, TagTreeNode};
use anyhow::Result;
use clap::{Args, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExportFormat {
    #[default]
    Json,
    Markdown,
}

/// Arguments for the export subcommand
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
    pub format: ExportFormat,

    /// Output file path (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

fn render_tags(nodes: &[TagTreeNode], depth: usize, out: &mut Vec<String>) {
    for node in nodes {
        out.push(format!("{}- {} (#{})", "  ".repeat(depth), node.name, node.id));
        render_tags(&node.children, depth + 1, out);
    }
}

fn render_todos(nodes: &[ExportTodoNode], depth: usize, out: &mut Vec<String>) {
    for node in nodes {
        let predecessors = if node.predecessor_ids.is_empty() {
            "none".to_string()
        } else {
            node.predecessor_ids
                .iter()
                .map(|id| format!("#{}", id))
                .collect::<Vec<_>>()
                .join(",")
        };
        let tag = node
            .tag_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "none".to_string());

        out.push(format!(
            "{}- #{} {} [status={}, blocked={}, tag={}, predecessors={}]",
            "  ".repeat(depth),
            node.id,
            node.description,
            node.status,
            node.is_blocked,
            tag,
            predecessors
        ));
        render_todos(&node.children, depth + 1, out);
    }
}

/// Markdown outline of an export tree.
pub fn to_markdown(tree: &ExportTree) -> String {
    let mut tags = Vec::new();
    render_tags(&tree.tag_tree, 0, &mut tags);
    if tags.is_empty() {
        tags.push("- (none)".to_string());
    }

    let mut todos = Vec::new();
    render_todos(&tree.todo_tree, 0, &mut todos);
    if todos.is_empty() {
        todos.push("- (none)".to_string());
    }

    format!(
        "# sitback export\n\n## tag_tree\n{}\n\n## todo_tree\n{}",
        tags.join("\n"),
        todos.join("\n")
    )
}

/// Run the export command
pub fn run_export(db: &Database, args: ExportArgs) -> Result<CommandOutput> {
    let tree = db.get_export_tree()?;

    let rendered = match args.format {
        ExportFormat::Json => serde_json::to_string_pretty(&tree)?,
        ExportFormat::Markdown => to_markdown(&tree),
    };

    match args.output {
        Some(path) => {
            std::fs::write(&path, &rendered)?;
            Ok(CommandOutput::text(format!("Exported to {}", path.display())))
        }
        None => Ok(CommandOutput::text(rendered)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tree_renders_placeholders() {
        let tree = ExportTree {
            tag_tree: Vec::new(),
            todo_tree: Vec::new(),
        };
        let md = to_markdown(&tree);
        assert!(md.starts_with("# sitback export"));
        assert_eq!(md.matches("- (none)").count(), 2);
    }
}
