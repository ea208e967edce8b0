//! `sb todo` subcommands.

use super::{parse_positive_id, parse_status, CommandOutput};
use crate::config::Config;
use crate::db::query::{project_todos, SortField, SortOrder, TodoField, TodoQuery};
use crate::db::Database;
use crate::error::{ErrorCode, TrackerError};
use crate::types::{AddTodo, ClaimRequest, TagRef, TodoChanges, TodoId, TodoStatus};
use crate::validate::{normalize_description, parse_priority, validate_due_date};
use anyhow::{bail, Result};
use clap::{ArgAction, Args, Subcommand};
use serde_json::json;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum TodoCommand {
    /// Add a todo
    Add(AddArgs),
    /// Claim the next actionable todo (or a specific one)
    Claim(ClaimArgs),
    /// Get todos
    Get(GetArgs),
    /// Update a todo
    Update(UpdateArgs),
    /// Delete todos
    Delete(DeleteArgs),
}

impl TodoCommand {
    pub fn name(&self) -> &'static str {
        match self {
            TodoCommand::Add(_) => "todo add",
            TodoCommand::Claim(_) => "todo claim",
            TodoCommand::Get(_) => "todo get",
            TodoCommand::Update(_) => "todo update",
            TodoCommand::Delete(_) => "todo delete",
        }
    }
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Todo description
    #[arg(long)]
    pub description: String,

    /// Initial status
    #[arg(long, value_parser = parse_status)]
    pub status: Option<TodoStatus>,

    /// Slash-separated tag path; missing segments are created
    #[arg(long)]
    pub tag: Option<String>,

    /// Comma-separated predecessor IDs
    #[arg(long, value_delimiter = ',', value_parser = parse_positive_id)]
    pub predecessors: Vec<TodoId>,

    /// Work notes
    #[arg(long)]
    pub work_notes: Option<String>,

    /// Priority 1-5
    #[arg(long)]
    pub priority: Option<i64>,

    /// Due date YYYY-MM-DD
    #[arg(long)]
    pub due_date: Option<String>,
}

#[derive(Args, Debug)]
pub struct ClaimArgs {
    /// Assignee identifier
    #[arg(long)]
    pub assignee: String,

    /// Lease length in minutes (default from config)
    #[arg(long)]
    pub lease_minutes: Option<i64>,

    /// Specific todo ID to claim
    #[arg(long, value_parser = parse_positive_id)]
    pub id: Option<TodoId>,

    /// Only claim within this tag path and everything below it
    #[arg(long, conflicts_with = "tag_id")]
    pub tag: Option<String>,

    /// Only claim within this tag ID and everything below it
    #[arg(long, value_parser = parse_positive_id)]
    pub tag_id: Option<i64>,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Comma-separated todo IDs (bypasses every other filter)
    #[arg(long, value_delimiter = ',', value_parser = parse_positive_id)]
    pub ids: Option<Vec<TodoId>>,

    /// Number of todos to return (default from config)
    #[arg(long)]
    pub num: Option<usize>,

    /// Filter by blocked state (true|false)
    #[arg(long, action = ArgAction::Set)]
    pub blocked: Option<bool>,

    /// Comma-separated statuses
    #[arg(long, value_delimiter = ',', value_parser = parse_status)]
    pub status: Vec<TodoStatus>,

    /// Minimum priority filter (1-5)
    #[arg(long)]
    pub min_priority: Option<i64>,

    /// Filter by due date upper bound
    #[arg(long)]
    pub due_before: Option<String>,

    /// Filter by due date lower bound
    #[arg(long)]
    pub due_after: Option<String>,

    /// Filter by slash tag path (includes descendant tags)
    #[arg(long, conflicts_with = "tag_id")]
    pub tag: Option<String>,

    /// Filter by tag ID (includes descendant tags)
    #[arg(long, value_parser = parse_positive_id)]
    pub tag_id: Option<i64>,

    /// Filter by exact assignee
    #[arg(long)]
    pub assignee: Option<String>,

    /// Filter by whether an assignee is set (true|false)
    #[arg(long, action = ArgAction::Set)]
    pub has_assignee: Option<bool>,

    /// Filter by whether the lease has expired (true|false)
    #[arg(long, action = ArgAction::Set)]
    pub lease_expired: Option<bool>,

    /// Sort field: id, priority, due_date, created_at, updated_at
    #[arg(long)]
    pub sort_by: Option<String>,

    /// Sort order: asc or desc
    #[arg(long)]
    pub sort_order: Option<String>,

    /// Comma-separated fields to include in the output
    #[arg(long, value_delimiter = ',')]
    pub fields: Option<Vec<String>>,

    /// Print only the number of matching todos
    #[arg(long)]
    pub count: bool,
}

impl GetArgs {
    fn has_filters(&self) -> bool {
        self.blocked.is_some()
            || !self.status.is_empty()
            || self.min_priority.is_some()
            || self.due_before.is_some()
            || self.due_after.is_some()
            || self.assignee.is_some()
            || self.has_assignee.is_some()
            || self.lease_expired.is_some()
            || self.sort_by.is_some()
            || self.sort_order.is_some()
    }
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Todo ID
    #[arg(long, value_parser = parse_positive_id)]
    pub id: TodoId,

    /// Todo description
    #[arg(long)]
    pub description: Option<String>,

    /// Todo status
    #[arg(long, value_parser = parse_status)]
    pub status: Option<TodoStatus>,

    /// Comma-separated predecessor IDs (replaces the current set)
    #[arg(long, value_delimiter = ',', value_parser = parse_positive_id)]
    pub predecessors: Option<Vec<TodoId>>,

    /// Clear predecessor IDs (takes precedence over --predecessors)
    #[arg(long)]
    pub clear_predecessors: bool,

    /// Slash-separated tag path (must already exist)
    #[arg(long, conflicts_with = "tag_id")]
    pub tag: Option<String>,

    /// Tag ID
    #[arg(long, value_parser = parse_positive_id)]
    pub tag_id: Option<i64>,

    /// Work notes (empty clears)
    #[arg(long)]
    pub work_notes: Option<String>,

    /// Priority 1-5
    #[arg(long)]
    pub priority: Option<i64>,

    /// Due date YYYY-MM-DD
    #[arg(long)]
    pub due_date: Option<String>,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Comma-separated todo IDs
    #[arg(long, required = true, value_delimiter = ',', value_parser = parse_positive_id)]
    pub ids: Vec<TodoId>,
}

pub fn run(db: &Database, config: &Config, command: TodoCommand) -> Result<CommandOutput> {
    match command {
        TodoCommand::Add(args) => run_add(db, args),
        TodoCommand::Claim(args) => run_claim(db, config, args),
        TodoCommand::Get(args) => run_get(db, config, args),
        TodoCommand::Update(args) => run_update(db, args),
        TodoCommand::Delete(args) => run_delete(db, args),
    }
}

pub fn run_add(db: &Database, args: AddArgs) -> Result<CommandOutput> {
    let priority = args.priority.map(parse_priority).transpose()?;

    let todo = db.add_todo(AddTodo {
        description: args.description,
        status: args.status,
        tag_path: args.tag,
        predecessor_ids: args.predecessors,
        work_notes: args.work_notes,
        priority,
        due_date: args.due_date,
    })?;

    CommandOutput::json(&todo)
}

pub fn run_claim(db: &Database, config: &Config, args: ClaimArgs) -> Result<CommandOutput> {
    let assignee = args.assignee.trim();
    if assignee.is_empty() {
        bail!("Invalid --assignee. Provide non-empty text");
    }

    let mut request = ClaimRequest::new(
        assignee,
        args.lease_minutes.unwrap_or(config.claim.lease_minutes),
    );
    if let Some(id) = args.id {
        request = request.with_id(id);
    }
    if let Some(tag_id) = args.tag_id {
        request = request.with_tag(tag_id);
    }
    if let Some(ref path) = args.tag {
        let tag = db
            .resolve_tag_path(path)?
            .ok_or_else(|| TrackerError::TagPathNotFound(path.clone()))?;
        request = request.with_tag(tag.id);
    }

    match db.claim_todo(request)? {
        Some(todo) => {
            info!(id = todo.id, assignee, lease = ?todo.assignee_lease, "Claimed todo");
            CommandOutput::json(&todo)
        }
        None => match args.id {
            Some(id) => Err(TrackerError::NotClaimable(id).into()),
            None => {
                info!(assignee, "No claimable todo");
                Ok(CommandOutput::text("null"))
            }
        },
    }
}

pub fn run_get(db: &Database, config: &Config, args: GetArgs) -> Result<CommandOutput> {
    let mut warnings = Vec::new();

    let fields = args
        .fields
        .as_ref()
        .map(|names| names.iter().map(|n| n.parse::<TodoField>()).collect::<Result<Vec<_>, _>>())
        .transpose()?;

    if let Some(ref ids) = args.ids {
        if args.num.is_some() {
            warnings.push("Warning: --num is ignored when --ids is provided".to_string());
        }
        if args.has_filters() {
            warnings.push("Warning: filters and sorting are ignored when --ids is provided".to_string());
        }
        if args.tag.is_some() || args.tag_id.is_some() {
            warnings.push("Warning: --tag/--tag-id are ignored when --ids is provided".to_string());
        }

        let query = TodoQuery {
            ids: ids.clone(),
            ..Default::default()
        };
        return render_todos(db, &query, args.count, fields.as_deref()).map(|o| o.with_warnings(warnings));
    }

    let tag_id = match (args.tag_id, args.tag.as_deref()) {
        (Some(id), _) => db.get_tag(id)?.map(|t| t.id),
        (None, Some(path)) => db.resolve_tag_path(path)?.map(|t| t.id),
        (None, None) => None,
    };
    let tag_missing = (args.tag_id.is_some() || args.tag.is_some()) && tag_id.is_none();
    if tag_missing {
        let output = if args.count {
            CommandOutput::text("0")
        } else {
            CommandOutput::json(&Vec::<()>::new())?
        };
        return Ok(output.with_warnings(warnings));
    }

    let sort = match (args.sort_by.as_deref(), args.sort_order.as_deref()) {
        (Some(field), order) => Some((
            field.parse::<SortField>()?,
            order.map(str::parse::<SortOrder>).transpose()?.unwrap_or_default(),
        )),
        (None, Some(_)) => bail!("--sort-order requires --sort-by"),
        (None, None) => None,
    };

    let query = TodoQuery {
        ids: Vec::new(),
        blocked: args.blocked,
        statuses: args.status,
        min_priority: args.min_priority.map(parse_priority).transpose()?,
        due_before: args.due_before.as_deref().map(validate_due_date).transpose()?,
        due_after: args.due_after.as_deref().map(validate_due_date).transpose()?,
        tag_id,
        assignee: args.assignee,
        has_assignee: args.has_assignee,
        lease_expired: args.lease_expired,
        sort,
        limit: Some(args.num.unwrap_or(config.list.default_limit)),
    };

    render_todos(db, &query, args.count, fields.as_deref()).map(|o| o.with_warnings(warnings))
}

fn render_todos(
    db: &Database,
    query: &TodoQuery,
    count: bool,
    fields: Option<&[TodoField]>,
) -> Result<CommandOutput> {
    if count {
        return Ok(CommandOutput::text(db.count_todos_for_get(query)?.to_string()));
    }

    let todos = db.get_todos_for_get(query)?;
    match fields {
        Some(fields) => CommandOutput::json(&project_todos(&todos, fields)?),
        None => CommandOutput::json(&todos),
    }
}

pub fn run_update(db: &Database, args: UpdateArgs) -> Result<CommandOutput> {
    let predecessor_ids = if args.clear_predecessors {
        Some(Vec::new())
    } else {
        args.predecessors
    };

    let tag = match (args.tag_id, args.tag) {
        (Some(id), _) => Some(TagRef::Id(id)),
        (None, Some(path)) => Some(TagRef::Path(path)),
        (None, None) => None,
    };

    let changes = TodoChanges {
        description: args
            .description
            .as_deref()
            .map(normalize_description)
            .transpose()?,
        status: args.status,
        work_notes: args.work_notes.map(Some),
        priority: args.priority.map(parse_priority).transpose()?.map(Some),
        due_date: args.due_date.map(Some),
        ..Default::default()
    };

    if changes.is_empty() && tag.is_none() && predecessor_ids.is_none() {
        bail!("No updates provided");
    }

    let updated = db.update_todo_with_relations(args.id, changes, tag, predecessor_ids.as_deref())?;
    CommandOutput::json(&updated)
}

pub fn run_delete(db: &Database, args: DeleteArgs) -> Result<CommandOutput> {
    let mut deleted_ids = Vec::new();

    for &id in &args.ids {
        match db.delete_todo(id) {
            Ok(todo) => deleted_ids.push(todo.id),
            Err(e) if e.code() == ErrorCode::TodoNotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    CommandOutput::json(&json!({
        "requestedIds": args.ids,
        "deletedIds": deleted_ids,
        "deletedCount": deleted_ids.len(),
    }))
}
