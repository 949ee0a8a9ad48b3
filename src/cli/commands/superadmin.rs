use std::sync::Arc;

use clap::Subcommand;
use serde_json::json;

use crate::cli::commands::admin::user_line;
use crate::cli::utils::{output_collection, output_success, read_password};
use crate::cli::OutputFormat;
use crate::client::ApiClient;
use crate::models::{role, Company, User, UserCreate, UserUpdate};
use crate::optimistic::OptimisticList;

#[derive(Subcommand)]
pub enum SuperadminCommands {
    #[command(about = "Manage users across all companies")]
    Users {
        #[command(subcommand)]
        cmd: SuperadminUserCommands,
    },

    #[command(about = "Manage companies")]
    Companies {
        #[command(subcommand)]
        cmd: CompanyCommands,
    },

    #[command(about = "Show the tail of the backend log")]
    Logs {
        #[arg(long, default_value_t = 200, help = "Number of lines")]
        lines: u32,
    },
}

#[derive(Subcommand)]
pub enum SuperadminUserCommands {
    #[command(about = "List all users")]
    List,

    #[command(about = "Create a user, optionally inside a company")]
    Create {
        #[arg(help = "Email")]
        email: String,
        #[arg(long, help = "Password (read from JURIS_PASSWORD or stdin if not provided)")]
        password: Option<String>,
        #[arg(long, help = "Full name")]
        full_name: Option<String>,
        #[arg(long, default_value = role::MEMBER, help = "member, asunto_lead, admin or superadmin")]
        role: String,
        #[arg(long, help = "Company ID")]
        company: Option<String>,
    },

    #[command(about = "Update a user")]
    Update {
        #[arg(help = "User ID")]
        id: String,
        #[arg(long, help = "New email")]
        email: Option<String>,
        #[arg(long, help = "New password")]
        password: Option<String>,
        #[arg(long, help = "New full name")]
        full_name: Option<String>,
        #[arg(long, help = "New role")]
        role: Option<String>,
        #[arg(long, help = "New company ID")]
        company: Option<String>,
    },

    #[command(about = "Delete a user")]
    Delete {
        #[arg(help = "User ID")]
        id: String,
    },
}

#[derive(Subcommand)]
pub enum CompanyCommands {
    #[command(about = "List companies")]
    List,

    #[command(about = "Create a company")]
    Create {
        #[arg(help = "Company name")]
        name: String,
    },

    #[command(about = "Delete a company with its users and projects")]
    Delete {
        #[arg(help = "Company ID")]
        id: String,
    },
}

async fn handle_users(cmd: SuperadminUserCommands, client: &ApiClient, output_format: OutputFormat) -> anyhow::Result<()> {
    let users = client.all_users();
    match cmd {
        SuperadminUserCommands::List => {
            let all = users.list(None).await?;
            output_collection(&output_format, "users", &all, user_line)
        }
        SuperadminUserCommands::Create { email, password, full_name, role, company } => {
            let password = read_password(password)?;
            let user = users
                .create_user(&UserCreate {
                    email,
                    password,
                    full_name,
                    role,
                    company_id: company,
                })
                .await?;
            output_success(&output_format, &format!("Created user {}", user.email), Some(json!({ "user": user })))
        }
        SuperadminUserCommands::Update { id, email, password, full_name, role, company } => {
            let update = UserUpdate {
                email,
                password,
                full_name,
                role,
                company_id: company,
            };
            let view = OptimisticList::<User>::load(Arc::new(users.clone())).await?;
            let user = view
                .apply_optimistic(
                    &id,
                    |current| User {
                        email: update.email.clone().unwrap_or_else(|| current.email.clone()),
                        full_name: update.full_name.clone().or_else(|| current.full_name.clone()),
                        role: update.role.clone().unwrap_or_else(|| current.role.clone()),
                        company_id: update.company_id.clone().or_else(|| current.company_id.clone()),
                        ..current.clone()
                    },
                    || users.update_user(&id, &update),
                )
                .await?;
            output_success(&output_format, &format!("Updated user {}", user.email), Some(json!({ "user": user })))
        }
        SuperadminUserCommands::Delete { id } => {
            let view = OptimisticList::<User>::load(Arc::new(users.clone())).await?;
            view.remove_optimistic(&id, || users.remove(&id)).await?;
            output_success(&output_format, &format!("Deleted user {}", id), None)
        }
    }
}

async fn handle_companies(cmd: CompanyCommands, client: &ApiClient, output_format: OutputFormat) -> anyhow::Result<()> {
    let companies = client.companies();
    match cmd {
        CompanyCommands::List => {
            let all = companies.list(None).await?;
            output_collection(&output_format, "companies", &all, |c: &Company| format!("{}  {}", c.id, c.name))
        }
        CompanyCommands::Create { name } => {
            let company = companies.create(&json!({ "name": name })).await?;
            output_success(
                &output_format,
                &format!("Created company {} ({})", company.name, company.id),
                Some(json!({ "company": company })),
            )
        }
        CompanyCommands::Delete { id } => {
            companies.remove(&id).await?;
            output_success(&output_format, &format!("Deleted company {}", id), None)
        }
    }
}

pub async fn handle(cmd: SuperadminCommands, client: &ApiClient, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        SuperadminCommands::Users { cmd } => handle_users(cmd, client, output_format).await,
        SuperadminCommands::Companies { cmd } => handle_companies(cmd, client, output_format).await,
        SuperadminCommands::Logs { lines } => {
            let log = client.system_logs(lines).await?;
            match output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&json!({ "lines": log }))?),
                OutputFormat::Text => {
                    for line in log {
                        println!("{}", line.trim_end());
                    }
                }
            }
            Ok(())
        }
    }
}
