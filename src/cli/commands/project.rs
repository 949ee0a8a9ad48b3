use std::sync::Arc;

use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::{output_collection, output_record, output_success, yes_no};
use crate::cli::{config, OutputFormat};
use crate::client::ApiClient;
use crate::models::{task_status, Project};
use crate::optimistic::OptimisticList;
use crate::resources::{ListFilter, Resource};

#[derive(Subcommand)]
pub enum ProjectCommands {
    #[command(about = "List projects visible to the current user")]
    List {
        #[arg(long, help = "Include archived projects")]
        archived: bool,
    },

    #[command(about = "Show one project")]
    Show {
        #[arg(help = "Project ID (defaults to the current project)")]
        id: Option<String>,
    },

    #[command(about = "Create a project")]
    Create {
        #[arg(help = "Project name")]
        name: String,
        #[arg(long, help = "Description")]
        description: Option<String>,
    },

    #[command(about = "Archive a project")]
    Archive {
        #[arg(help = "Project ID")]
        id: String,
    },

    #[command(about = "Restore an archived project")]
    Unarchive {
        #[arg(help = "Project ID")]
        id: String,
    },

    #[command(about = "Delete a project")]
    Delete {
        #[arg(help = "Project ID")]
        id: String,
    },

    #[command(about = "Add a member by email")]
    AddMember {
        #[arg(help = "Project ID")]
        id: String,
        #[arg(help = "Member email")]
        email: String,
    },

    #[command(about = "Remove a member by email")]
    RemoveMember {
        #[arg(help = "Project ID")]
        id: String,
        #[arg(help = "Member email")]
        email: String,
    },

    #[command(about = "Select the project used by task commands")]
    Use {
        #[arg(help = "Project ID")]
        id: String,
    },
}

fn project_line(project: &Project) -> String {
    let archived = if project.is_archived { " [archived]" } else { "" };
    format!("{}  {}{}  ({} members)", project.id, project.name, archived, project.members.len())
}

/// Archived and active projects, the way the project board loads them
fn board(client: &ApiClient) -> Resource<Project> {
    client.projects().with_default_filter(ListFilter::include_archived(true))
}

async fn set_archived(
    client: &ApiClient,
    id: &str,
    archived: bool,
    output_format: &OutputFormat,
) -> anyhow::Result<()> {
    let projects = board(client);
    let view = OptimisticList::<Project>::load(Arc::new(projects.clone())).await?;

    let project = view
        .apply_optimistic(
            id,
            |current| Project {
                is_archived: archived,
                ..current.clone()
            },
            || projects.set_archived(id, archived),
        )
        .await?;

    let verb = if archived { "Archived" } else { "Restored" };
    output_success(
        output_format,
        &format!("{} project {}", verb, project.name),
        Some(json!({ "project": project })),
    )
}

pub async fn handle(cmd: ProjectCommands, client: &ApiClient, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ProjectCommands::List { archived } => {
            let projects = client.projects().list(Some(ListFilter::include_archived(archived))).await?;
            output_collection(&output_format, "projects", &projects, project_line)
        }
        ProjectCommands::Show { id } => {
            let id = crate::cli::utils::resolve_target_item(
                id,
                || Ok(config::load_state()?.current_project),
                "project",
            )?;
            let projects = client.projects();
            let tasks = client.tasks();
            let (project, tasks) = futures::try_join!(projects.get(&id), tasks.list_for_project(&id))?;
            let open = tasks.iter().filter(|t| t.status != task_status::DONE).count();
            output_record(
                &output_format,
                &project,
                vec![
                    ("ID", project.id.clone()),
                    ("Name", project.name.clone()),
                    ("Description", project.description.clone().unwrap_or_default()),
                    ("Owner", project.owner_email.clone()),
                    ("Members", project.members.join(", ")),
                    ("Archived", yes_no(project.is_archived).to_string()),
                    ("Tasks", format!("{} ({} open)", tasks.len(), open)),
                ],
            )
        }
        ProjectCommands::Create { name, description } => {
            let project = client.projects().create_project(&name, description.as_deref()).await?;
            output_success(
                &output_format,
                &format!("Created project {} ({})", project.name, project.id),
                Some(json!({ "project": project })),
            )
        }
        ProjectCommands::Archive { id } => set_archived(client, &id, true, &output_format).await,
        ProjectCommands::Unarchive { id } => set_archived(client, &id, false, &output_format).await,
        ProjectCommands::Delete { id } => {
            let projects = board(client);
            let view = OptimisticList::<Project>::load(Arc::new(projects.clone())).await?;
            view.remove_optimistic(&id, || projects.remove(&id)).await?;

            let mut state = config::load_state()?;
            if state.current_project.as_deref() == Some(id.as_str()) {
                state.current_project = None;
                config::save_state(&state)?;
            }
            output_success(&output_format, &format!("Deleted project {}", id), None)
        }
        ProjectCommands::AddMember { id, email } => {
            client.projects().add_member(&id, &email).await?;
            output_success(&output_format, &format!("Added {} to project {}", email, id), None)
        }
        ProjectCommands::RemoveMember { id, email } => {
            client.projects().remove_member(&id, &email).await?;
            output_success(&output_format, &format!("Removed {} from project {}", email, id), None)
        }
        ProjectCommands::Use { id } => {
            let project = client.projects().get(&id).await?;
            let mut state = config::load_state()?;
            state.current_project = Some(project.id.clone());
            config::save_state(&state)?;
            output_success(&output_format, &format!("Now using project {}", project.name), None)
        }
    }
}
