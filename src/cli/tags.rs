//! `sb tag` subcommands.

use super::{parse_positive_id, CommandOutput};
use crate::db::Database;
use crate::error::TrackerError;
use crate::types::{TagChanges, TagId};
use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use serde_json::json;

#[derive(Subcommand, Debug)]
pub enum TagCommand {
    /// Add a tag path, creating missing segments
    Add(TagAddArgs),
    /// Show one tag's subtree, or the whole forest
    Get(TagGetArgs),
    /// Rename or move a tag
    Update(TagUpdateArgs),
    /// Delete a tag and its descendants
    Delete(TagDeleteArgs),
}

impl TagCommand {
    pub fn name(&self) -> &'static str {
        match self {
            TagCommand::Add(_) => "tag add",
            TagCommand::Get(_) => "tag get",
            TagCommand::Update(_) => "tag update",
            TagCommand::Delete(_) => "tag delete",
        }
    }
}

#[derive(Args, Debug)]
pub struct TagAddArgs {
    /// Slash-separated tag path
    #[arg(long)]
    pub path: String,
}

#[derive(Args, Debug)]
pub struct TagGetArgs {
    /// Tag ID (omit for every tag)
    #[arg(long, value_parser = parse_positive_id)]
    pub id: Option<TagId>,
}

#[derive(Args, Debug)]
pub struct TagUpdateArgs {
    /// Tag ID
    #[arg(long, value_parser = parse_positive_id)]
    pub id: TagId,

    /// New lowercase alphanumeric name
    #[arg(long)]
    pub name: Option<String>,

    /// Move the tag under this parent
    #[arg(long, value_parser = parse_positive_id, conflicts_with = "root")]
    pub parent_id: Option<TagId>,

    /// Move the tag to the root
    #[arg(long)]
    pub root: bool,
}

#[derive(Args, Debug)]
pub struct TagDeleteArgs {
    /// Tag ID
    #[arg(long, value_parser = parse_positive_id)]
    pub id: TagId,
}

pub fn run(db: &Database, command: TagCommand) -> Result<CommandOutput> {
    match command {
        TagCommand::Add(args) => CommandOutput::json(&db.ensure_tag_path(&args.path)?),
        TagCommand::Get(args) => match args.id {
            None => CommandOutput::json(&db.all_tags_summary()?),
            Some(id) => {
                let summary = db.tag_summary(id)?.ok_or(TrackerError::TagNotFound(id))?;
                CommandOutput::json(&summary)
            }
        },
        TagCommand::Update(args) => {
            let parent_id = if args.root {
                Some(None)
            } else {
                args.parent_id.map(Some)
            };
            if args.name.is_none() && parent_id.is_none() {
                bail!("No updates provided");
            }
            let updated = db.update_tag(
                args.id,
                TagChanges {
                    name: args.name,
                    parent_id,
                },
            )?;
            CommandOutput::json(&updated)
        }
        TagCommand::Delete(args) => {
            let deleted = db.delete_tag(args.id)?;
            CommandOutput::json(&json!({
                "deletedId": deleted.id,
                "deletedName": deleted.name,
            }))
        }
    }
}
