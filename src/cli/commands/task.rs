use std::sync::Arc;

use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::{output_collection, output_success, resolve_target_item};
use crate::cli::{config, OutputFormat};
use crate::client::ApiClient;
use crate::models::{task_status, Task, TaskCreate};
use crate::optimistic::OptimisticList;

#[derive(Subcommand)]
pub enum TaskCommands {
    #[command(about = "List the tasks of a project")]
    List {
        #[arg(long, help = "Project ID (defaults to the current project)")]
        project: Option<String>,
    },

    #[command(about = "Create a task in a project")]
    Create {
        #[arg(help = "Task title")]
        title: String,
        #[arg(long, help = "Description")]
        description: Option<String>,
        #[arg(long, help = "Project ID (defaults to the current project)")]
        project: Option<String>,
    },

    #[command(about = "Assign a task to a project member")]
    Assign {
        #[arg(help = "Task ID")]
        id: String,
        #[arg(help = "Assignee email (omit with --unassign)")]
        email: Option<String>,
        #[arg(long, help = "Clear the assignee")]
        unassign: bool,
        #[arg(long, help = "Project ID (defaults to the current project)")]
        project: Option<String>,
    },

    #[command(about = "Move a task to todo, in_progress or done")]
    Status {
        #[arg(help = "Task ID")]
        id: String,
        #[arg(help = "New status")]
        status: String,
        #[arg(long, help = "Project ID (defaults to the current project)")]
        project: Option<String>,
    },

    #[command(about = "Delete a task")]
    Delete {
        #[arg(help = "Task ID")]
        id: String,
        #[arg(long, help = "Project ID (defaults to the current project)")]
        project: Option<String>,
    },
}

fn resolve_project(project: Option<String>) -> anyhow::Result<String> {
    resolve_target_item(project, || Ok(config::load_state()?.current_project), "project")
}

fn task_line(task: &Task) -> String {
    let assignee = task.assignee_email.as_deref().unwrap_or("unassigned");
    format!("{}  [{}]  {}  ({})", task.id, task.status, task.title, assignee)
}

fn check_status(status: &str) -> anyhow::Result<()> {
    match status {
        task_status::TODO | task_status::IN_PROGRESS | task_status::DONE => Ok(()),
        other => anyhow::bail!("Unknown task status '{}' (expected todo, in_progress or done)", other),
    }
}

/// The project's task board with its reload source
async fn board(client: &ApiClient, project_id: &str) -> anyhow::Result<OptimisticList<Task>> {
    let source = client.tasks().for_project(project_id);
    Ok(OptimisticList::<Task>::load(Arc::new(source)).await?)
}

pub async fn handle(cmd: TaskCommands, client: &ApiClient, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        TaskCommands::List { project } => {
            let project_id = resolve_project(project)?;
            let tasks = client.tasks().list_for_project(&project_id).await?;
            output_collection(&output_format, "tasks", &tasks, task_line)
        }
        TaskCommands::Create { title, description, project } => {
            let project_id = resolve_project(project)?;
            let task = client
                .tasks()
                .create_in_project(&project_id, &TaskCreate { title, description })
                .await?;
            output_success(
                &output_format,
                &format!("Created task {} ({})", task.title, task.id),
                Some(json!({ "task": task })),
            )
        }
        TaskCommands::Assign { id, email, unassign, project } => {
            let assignee = match (email, unassign) {
                (Some(_), true) => anyhow::bail!("Pass either an email or --unassign, not both"),
                (None, false) => anyhow::bail!("An assignee email is required (or --unassign)"),
                (email, _) => email,
            };

            let project_id = resolve_project(project)?;
            let view = board(client, &project_id).await?;
            let tasks = client.tasks();
            let task = view
                .apply_optimistic(
                    &id,
                    |current| Task {
                        assignee_email: assignee.clone(),
                        ..current.clone()
                    },
                    || tasks.assign(&id, assignee.as_deref()),
                )
                .await?;

            let message = match &task.assignee_email {
                Some(email) => format!("Assigned {} to {}", task.title, email),
                None => format!("Unassigned {}", task.title),
            };
            output_success(&output_format, &message, Some(json!({ "task": task })))
        }
        TaskCommands::Status { id, status, project } => {
            check_status(&status)?;
            let project_id = resolve_project(project)?;
            let view = board(client, &project_id).await?;
            let tasks = client.tasks();
            let task = view
                .apply_optimistic(
                    &id,
                    |current| Task {
                        status: status.clone(),
                        ..current.clone()
                    },
                    || tasks.set_status(&id, &status),
                )
                .await?;
            output_success(
                &output_format,
                &format!("{} is now {}", task.title, task.status),
                Some(json!({ "task": task })),
            )
        }
        TaskCommands::Delete { id, project } => {
            let project_id = resolve_project(project)?;
            let view = board(client, &project_id).await?;
            let tasks = client.tasks();
            view.remove_optimistic(&id, || tasks.remove(&id)).await?;
            output_success(&output_format, &format!("Deleted task {}", id), None)
        }
    }
}
