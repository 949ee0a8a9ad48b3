use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::{output_collection, output_success, read_password};
use crate::cli::OutputFormat;
use crate::client::ApiClient;
use crate::models::{role, User, UserCreate};

#[derive(Subcommand)]
pub enum AdminCommands {
    #[command(about = "Manage users of your company")]
    Users {
        #[command(subcommand)]
        cmd: AdminUserCommands,
    },
}

#[derive(Subcommand)]
pub enum AdminUserCommands {
    #[command(about = "List users of your company")]
    List,

    #[command(about = "Create a user in your company")]
    Create {
        #[arg(help = "Email")]
        email: String,
        #[arg(long, help = "Password (read from JURIS_PASSWORD or stdin if not provided)")]
        password: Option<String>,
        #[arg(long, help = "Full name")]
        full_name: Option<String>,
        #[arg(long, default_value = role::MEMBER, help = "member, asunto_lead or admin")]
        role: String,
    },
}

pub fn user_line(user: &User) -> String {
    format!("{}  {}  ({})", user.email, user.display_name(), user.role)
}

pub async fn handle(cmd: AdminCommands, client: &ApiClient, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        AdminCommands::Users { cmd } => match cmd {
            AdminUserCommands::List => {
                let users = client.company_users().list(None).await?;
                output_collection(&output_format, "users", &users, user_line)
            }
            AdminUserCommands::Create { email, password, full_name, role: user_role } => {
                if user_role == role::SUPERADMIN {
                    anyhow::bail!("Company admins cannot create superadmins");
                }
                let password = read_password(password)?;
                // The backend places the user in the admin's own company
                let user = client
                    .company_users()
                    .create_user(&UserCreate {
                        email,
                        password,
                        full_name,
                        role: user_role,
                        company_id: None,
                    })
                    .await?;
                output_success(
                    &output_format,
                    &format!("Created user {}", user.email),
                    Some(json!({ "user": user })),
                )
            }
        },
    }
}
