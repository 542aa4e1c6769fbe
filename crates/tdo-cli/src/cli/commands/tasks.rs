//! Task command handlers.

use anyhow::{Context, Result, bail};
use comfy_table::{ContentArrangement, Table};
use tdo_core::auth::{CredentialCache, ResolveError, UserResolver};
use tdo_core::backend::BackendClient;
use tdo_core::config::Config;
use tdo_core::tasks::{SortOrder, Task, TaskChanges, TaskClient, TaskStatus};
use uuid::Uuid;

/// Builds a task client for the signed-in user.
///
/// Resolves the backend user id first; the id and the stored token must
/// address the same identity or the backend rejects every request.
async fn task_client(config: &Config) -> Result<TaskClient> {
    let backend_base = config.backend_base_url()?;
    let cache = CredentialCache::new();

    let resolver = UserResolver::new(BackendClient::new(backend_base.clone()))
        .settle_delay(config.resolver.settle_delay());
    let user_id = match resolver.resolve().await {
        Ok(user_id) => user_id,
        Err(e) => {
            if matches!(e, ResolveError::Unauthorized(_)) {
                cache.clear().context("clear stale credential")?;
            }
            bail!("Not authenticated ({e}); run `tdo login`");
        }
    };

    let Some(creds) = cache.load().context("read credential cache")? else {
        bail!("Not authenticated; run `tdo login`");
    };

    Ok(TaskClient::new(backend_base, creds.backend_token, user_id))
}

fn parse_task_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).with_context(|| format!("invalid task id: {id}"))
}

fn render_table(tasks: &[Task]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(["", "id", "title", "description", "created"]);
    for task in tasks {
        let marker = match task.status {
            TaskStatus::Complete => "x",
            TaskStatus::Incomplete => " ",
        };
        table.add_row([
            marker.to_string(),
            task.id.to_string(),
            task.title.clone(),
            task.description.clone().unwrap_or_default(),
            task.created_date.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }
    table
}

pub async fn list(config: &Config, sort: &str) -> Result<()> {
    let Some(sort) = SortOrder::from_id(sort) else {
        let expected = SortOrder::all()
            .iter()
            .map(|s| s.id())
            .collect::<Vec<_>>()
            .join(", ");
        bail!("Unknown sort option '{sort}'. Expected one of: {expected}");
    };

    let client = task_client(config).await?;
    let tasks = client.list(sort).await.context("Failed to load tasks")?;

    if tasks.is_empty() {
        println!("No tasks yet.");
        return Ok(());
    }
    println!("{}", render_table(&tasks));
    Ok(())
}

pub async fn show(config: &Config, id: &str) -> Result<()> {
    let id = parse_task_id(id)?;
    let client = task_client(config).await?;
    let task = client.get(id).await.context("Failed to load task")?;

    println!("id:          {}", task.id);
    println!("title:       {}", task.title);
    println!("description: {}", task.description.as_deref().unwrap_or("-"));
    println!("status:      {}", task.status);
    println!("created:     {}", task.created_date.to_rfc3339());
    println!("updated:     {}", task.updated_date.to_rfc3339());
    Ok(())
}

pub async fn add(config: &Config, title: &str, description: Option<&str>) -> Result<()> {
    let client = task_client(config).await?;
    let task = client
        .create(title, description)
        .await
        .context("Failed to create task")?;
    println!("Created task {}", task.id);
    Ok(())
}

pub async fn edit(
    config: &Config,
    id: &str,
    title: Option<String>,
    description: Option<String>,
    status: Option<&str>,
) -> Result<()> {
    let status = match status {
        Some(s) => match TaskStatus::from_id(s) {
            Some(status) => Some(status),
            None => bail!("Unknown status '{s}'. Expected 'complete' or 'incomplete'"),
        },
        None => None,
    };
    if title.is_none() && description.is_none() && status.is_none() {
        bail!("Nothing to change; pass --title, --description, or --status");
    }

    let id = parse_task_id(id)?;
    let client = task_client(config).await?;
    let task = client
        .update(
            id,
            &TaskChanges {
                title,
                description,
                status,
            },
        )
        .await
        .context("Failed to update task")?;
    println!("Updated task {}", task.id);
    Ok(())
}

pub async fn toggle(config: &Config, id: &str) -> Result<()> {
    let id = parse_task_id(id)?;
    let client = task_client(config).await?;

    let current = client.get(id).await.context("Failed to load task")?;
    let task = client
        .toggle_status(id, current.status)
        .await
        .context("Failed to update task status")?;
    println!("Task {} is now {}", task.id, task.status);
    Ok(())
}

pub async fn rm(config: &Config, id: &str) -> Result<()> {
    let id = parse_task_id(id)?;
    let client = task_client(config).await?;
    client.delete(id).await.context("Failed to delete task")?;
    println!("Deleted task {id}");
    Ok(())
}
