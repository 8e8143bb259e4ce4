//! Task resource service — validation and query rules over the storage layer.

use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

use crate::storage::{Storage, TaskChanges, TaskRow};

const TITLE_MAX_CHARS: usize = 200;

/// Default sort: newest first, id as a deterministic tie-break.
const DEFAULT_ORDER: &str = "created_at DESC, id DESC";

#[derive(Debug, Error)]
pub enum TaskError {
    /// Field-level input rejection, rendered as `{"<field>": ["<message>"]}`.
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },
    #[error("task not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn validation(field: &'static str, message: impl Into<String>) -> TaskError {
    TaskError::Validation {
        field,
        message: message.into(),
    }
}

// ─── Priority ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, TaskError> {
        match raw {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(validation(
                "priority",
                format!("\"{other}\" is not a valid choice."),
            )),
        }
    }
}

// ─── Input types ─────────────────────────────────────────────────────────────

/// Client-supplied task fields. Server-assigned fields (id, timestamps) have
/// no counterpart here and are silently ignored on input.
#[derive(Debug, Default, Deserialize)]
pub struct TaskInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub priority: Option<String>,
}

/// Query parameters accepted by the list operation.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// Case-insensitive substring match over title and description.
    pub search: Option<String>,
    /// Comma-separated sort fields, each optionally `-`-prefixed.
    /// Recognized: created_at, priority, completed. Unknown fields are ignored.
    pub ordering: Option<String>,
}

/// Trim and bound-check a title. Returns the trimmed value that gets stored.
fn validate_title(raw: &str) -> Result<String, TaskError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(validation("title", "Title cannot be empty."));
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(validation(
            "title",
            format!("Ensure this field has no more than {TITLE_MAX_CHARS} characters."),
        ));
    }
    Ok(title.to_string())
}

/// Build a safe ORDER BY clause from client-supplied ordering fields.
///
/// Unknown fields are dropped; when nothing valid remains the default order
/// applies. `priority` sorts by its stored text (alphabetical). A trailing
/// id sort in the direction of the first key keeps the output deterministic.
fn order_clause(ordering: Option<&str>) -> String {
    let Some(ordering) = ordering else {
        return DEFAULT_ORDER.to_string();
    };

    let mut terms: Vec<String> = Vec::new();
    for raw in ordering.split(',') {
        let raw = raw.trim();
        let (field, dir) = match raw.strip_prefix('-') {
            Some(field) => (field, "DESC"),
            None => (raw, "ASC"),
        };
        if matches!(field, "created_at" | "priority" | "completed") {
            terms.push(format!("{field} {dir}"));
        }
    }

    if terms.is_empty() {
        return DEFAULT_ORDER.to_string();
    }
    let tie_dir = if terms[0].ends_with("DESC") { "DESC" } else { "ASC" };
    terms.push(format!("id {tie_dir}"));
    terms.join(", ")
}

// ─── TaskService ─────────────────────────────────────────────────────────────

/// Implements the task CRUD/query contract on top of [`Storage`].
pub struct TaskService {
    storage: Arc<Storage>,
}

impl TaskService {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub async fn create(&self, input: TaskInput) -> Result<TaskRow, TaskError> {
        let title = match input.title.as_deref() {
            Some(raw) => validate_title(raw)?,
            None => return Err(validation("title", "This field is required.")),
        };
        let priority = match input.priority.as_deref() {
            Some(raw) => Priority::parse(raw)?,
            None => Priority::default(),
        };

        let task = self
            .storage
            .create_task(
                &title,
                input.description.as_deref().unwrap_or(""),
                input.completed.unwrap_or(false),
                priority.as_str(),
            )
            .await?;
        Ok(task)
    }

    pub async fn list(&self, params: &ListParams) -> Result<Vec<TaskRow>, TaskError> {
        let order_by = order_clause(params.ordering.as_deref());
        let rows = self
            .storage
            .list_tasks(&order_by, params.search.as_deref())
            .await?;
        Ok(rows)
    }

    pub async fn retrieve(&self, id: i64) -> Result<TaskRow, TaskError> {
        self.storage.get_task(id).await?.ok_or(TaskError::NotFound)
    }

    /// Full or partial update. A full update requires `title`; a partial one
    /// validates only the fields present. Absent fields stay unchanged.
    pub async fn update(
        &self,
        id: i64,
        input: TaskInput,
        partial: bool,
    ) -> Result<TaskRow, TaskError> {
        let title = match input.title.as_deref() {
            Some(raw) => Some(validate_title(raw)?),
            None if partial => None,
            None => return Err(validation("title", "This field is required.")),
        };
        let priority = match input.priority.as_deref() {
            Some(raw) => Some(Priority::parse(raw)?.as_str().to_string()),
            None => None,
        };

        let changes = TaskChanges {
            title,
            description: input.description,
            completed: input.completed,
            priority,
        };
        self.storage
            .update_task(id, changes)
            .await?
            .ok_or(TaskError::NotFound)
    }

    pub async fn delete(&self, id: i64) -> Result<(), TaskError> {
        if self.storage.delete_task(id).await? {
            Ok(())
        } else {
            Err(TaskError::NotFound)
        }
    }

    pub async fn list_completed(&self) -> Result<Vec<TaskRow>, TaskError> {
        Ok(self.storage.list_by_completed(true).await?)
    }

    pub async fn list_pending(&self) -> Result<Vec<TaskRow>, TaskError> {
        Ok(self.storage.list_by_completed(false).await?)
    }

    pub async fn toggle_complete(&self, id: i64) -> Result<TaskRow, TaskError> {
        self.storage
            .toggle_complete(id)
            .await?
            .ok_or(TaskError::NotFound)
    }
}
