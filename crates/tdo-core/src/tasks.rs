//! Task collection client.
//!
//! Thin CRUD façade over the per-user task collection at
//! `/api/{backend_user_id}/tasks`. Nothing is cached locally, mutations
//! are not applied optimistically, and retries are the caller's business.
//! Every failure is a single generic `RequestError`; the UI shows one
//! message and does not distinguish causes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Maximum title length accepted by the backend form contract.
pub const MAX_TITLE_LEN: usize = 200;
/// Maximum description length.
pub const MAX_DESCRIPTION_LEN: usize = 1000;

/// Completion state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Incomplete,
    Complete,
}

impl TaskStatus {
    /// Returns the opposite status.
    pub fn flipped(self) -> Self {
        match self {
            TaskStatus::Incomplete => TaskStatus::Complete,
            TaskStatus::Complete => TaskStatus::Incomplete,
        }
    }

    /// Returns the wire identifier.
    pub fn id(self) -> &'static str {
        match self {
            TaskStatus::Incomplete => "incomplete",
            TaskStatus::Complete => "complete",
        }
    }

    /// Returns the status for a wire identifier.
    pub fn from_id(id: &str) -> Option<TaskStatus> {
        match id.to_lowercase().as_str() {
            "incomplete" => Some(TaskStatus::Incomplete),
            "complete" => Some(TaskStatus::Complete),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Sort options understood by the list endpoint.
///
/// All four are forwarded verbatim; the backend currently only orders by
/// the date options and ignores the priority ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
    HighestPriority,
    LowestPriority,
}

impl SortOrder {
    /// Returns all sort options.
    pub fn all() -> &'static [SortOrder] {
        &[
            SortOrder::NewestFirst,
            SortOrder::OldestFirst,
            SortOrder::HighestPriority,
            SortOrder::LowestPriority,
        ]
    }

    /// Returns the query-string identifier.
    pub fn id(self) -> &'static str {
        match self {
            SortOrder::NewestFirst => "newest_first",
            SortOrder::OldestFirst => "oldest_first",
            SortOrder::HighestPriority => "highest_priority",
            SortOrder::LowestPriority => "lowest_priority",
        }
    }

    /// Returns the sort option for a query-string identifier.
    pub fn from_id(id: &str) -> Option<SortOrder> {
        match id.to_lowercase().as_str() {
            "newest_first" => Some(SortOrder::NewestFirst),
            "oldest_first" => Some(SortOrder::OldestFirst),
            "highest_priority" => Some(SortOrder::HighestPriority),
            "lowest_priority" => Some(SortOrder::LowestPriority),
            _ => None,
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// A task record as the backend returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

/// Mutable fields for `update`; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

/// Generic request failure.
#[derive(Debug, Clone)]
pub struct RequestError {
    /// One-line summary suitable for display.
    pub message: String,
    /// Optional raw error body.
    pub details: Option<String>,
}

impl RequestError {
    /// Creates a new request error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    /// Creates an error from a non-success response, mining the backend's
    /// `detail` field for the message when present.
    pub fn http_status(status: u16, body: &str) -> Self {
        if let Ok(json) = serde_json::from_str::<Value>(body)
            && let Some(detail) = json.get("detail").and_then(|v| v.as_str())
        {
            return Self {
                message: format!("HTTP {status}: {detail}"),
                details: Some(body.to_string()),
            };
        }
        let details = if body.is_empty() {
            None
        } else {
            Some(body.to_string())
        };
        Self {
            message: format!("HTTP {status}"),
            details,
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RequestError {}

#[derive(Debug, Serialize)]
struct CreateTaskRequest<'a> {
    title: &'a str,
    description: Option<&'a str>,
    status: TaskStatus,
}

#[derive(Debug, Serialize)]
struct CompleteRequest {
    status: TaskStatus,
}

/// The toggle endpoint wraps the task in a `{message, task}` envelope.
#[derive(Debug, Deserialize)]
struct CompleteResponse {
    task: Task,
}

fn validate_title(title: &str) -> Result<(), RequestError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(RequestError::new("title must not be empty"));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(RequestError::new(format!(
            "title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), RequestError> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(RequestError::new(format!(
            "description must be at most {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(())
}

/// Client for one user's task collection.
#[derive(Debug, Clone)]
pub struct TaskClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    user_id: Uuid,
}

impl TaskClient {
    /// Creates a client scoped to `user_id`, authorizing with `token`.
    ///
    /// The id and token must come from the same bridged identity; requests
    /// scoped to any other user are rejected by the backend.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, user_id: Uuid) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
            user_id,
        }
    }

    /// Returns the user id this client is scoped to.
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    fn tasks_url(&self) -> String {
        format!("{}/api/{}/tasks", self.base_url, self.user_id)
    }

    fn task_url(&self, id: Uuid) -> String {
        format!("{}/{id}", self.tasks_url())
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, RequestError> {
        let response = request
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await
            .map_err(|e| RequestError::new(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RequestError::http_status(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| RequestError::new(format!("invalid response: {e}")))
    }

    /// Lists the user's tasks in the given order.
    ///
    /// # Errors
    /// Returns an error on any transport failure or non-success response.
    pub async fn list(&self, sort: SortOrder) -> Result<Vec<Task>, RequestError> {
        let request = self
            .http
            .get(self.tasks_url())
            .query(&[("sort", sort.id())]);
        self.send(request).await
    }

    /// Fetches a single task.
    ///
    /// # Errors
    /// Returns an error on any transport failure or non-success response.
    pub async fn get(&self, id: Uuid) -> Result<Task, RequestError> {
        self.send(self.http.get(self.task_url(id))).await
    }

    /// Creates a task. The server assigns id and timestamps; the initial
    /// status is `incomplete`.
    ///
    /// # Errors
    /// Returns an error on invalid input, transport failure, or a
    /// non-success response.
    pub async fn create(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<Task, RequestError> {
        validate_title(title)?;
        if let Some(description) = description {
            validate_description(description)?;
        }

        let request = self.http.post(self.tasks_url()).json(&CreateTaskRequest {
            title,
            description,
            status: TaskStatus::Incomplete,
        });
        self.send(request).await
    }

    /// Updates the given fields of a task.
    ///
    /// # Errors
    /// Returns an error on invalid input, transport failure, or a
    /// non-success response.
    pub async fn update(&self, id: Uuid, changes: &TaskChanges) -> Result<Task, RequestError> {
        if let Some(title) = &changes.title {
            validate_title(title)?;
        }
        if let Some(description) = &changes.description {
            validate_description(description)?;
        }

        let request = self.http.put(self.task_url(id)).json(changes);
        self.send(request).await
    }

    /// Flips a task between complete and incomplete.
    ///
    /// `current` is the caller's last-known status; the flip is computed
    /// locally and sent as the new value (last write wins at the backend).
    ///
    /// # Errors
    /// Returns an error on any transport failure or non-success response.
    pub async fn toggle_status(
        &self,
        id: Uuid,
        current: TaskStatus,
    ) -> Result<Task, RequestError> {
        let request = self
            .http
            .patch(format!("{}/complete", self.task_url(id)))
            .json(&CompleteRequest {
                status: current.flipped(),
            });
        let response: CompleteResponse = self.send(request).await?;
        Ok(response.task)
    }

    /// Deletes a task.
    ///
    /// # Errors
    /// Returns an error on any transport failure or non-success response.
    pub async fn delete(&self, id: Uuid) -> Result<(), RequestError> {
        let _ack: Value = self.send(self.http.delete(self.task_url(id))).await?;
        Ok(())
    }
}
