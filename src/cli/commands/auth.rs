use chrono::{DateTime, Utc};
use clap::Subcommand;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::json;

use crate::cli::utils::{output_record, output_success, read_password};
use crate::cli::{config, OutputFormat};
use crate::client::ApiClient;

#[derive(Subcommand)]
pub enum AuthCommands {
    #[command(about = "Login to the backend")]
    Login {
        #[arg(help = "Email")]
        username: String,
        #[arg(long, help = "Password (read from JURIS_PASSWORD or stdin if not provided)")]
        password: Option<String>,
    },

    #[command(about = "Logout and remove the stored session")]
    Logout,

    #[command(about = "Show current authentication status")]
    Status,

    #[command(about = "Refresh the access token")]
    Refresh,

    #[command(about = "Show current user information")]
    Whoami,
}

#[derive(Debug, Deserialize)]
struct AccessClaims {
    sub: Option<String>,
    exp: Option<i64>,
}

/// Read the subject and expiry of an access token without verifying it.
/// Only used for display; the server remains the judge of validity.
fn inspect_token(token: &str) -> Option<(Option<String>, Option<DateTime<Utc>>)> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    let data = decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation).ok()?;
    let expires = data.claims.exp.and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0));
    Some((data.claims.sub, expires))
}

pub async fn handle(cmd: AuthCommands, client: &ApiClient, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        AuthCommands::Login { username, password } => {
            let password = read_password(password)?;
            let user = client.login(&username, &password).await?;

            let mut state = config::load_state()?;
            state.record_login(&user.email);
            config::save_state(&state)?;

            output_success(
                &output_format,
                &format!("Logged in as {} ({})", user.display_name(), user.role),
                Some(json!({ "user": user })),
            )
        }
        AuthCommands::Logout => {
            client.logout()?;
            output_success(&output_format, "Logged out", None)
        }
        AuthCommands::Status => {
            let Some(session) = client.session()? else {
                return output_success(&output_format, "Not logged in", Some(json!({ "authenticated": false })));
            };

            let (subject, expires) = inspect_token(&session.access_token).unwrap_or((None, None));
            let expired = expires.map(|at| at <= Utc::now()).unwrap_or(false);
            let status = json!({
                "authenticated": true,
                "subject": subject,
                "expires_at": expires,
                "access_token_expired": expired,
                "can_refresh": session.refresh_token.is_some(),
                "saved_at": session.saved_at,
                "api_url": client.base_url().as_str(),
            });

            output_record(
                &output_format,
                &status,
                vec![
                    ("User", subject.unwrap_or_default()),
                    ("Server", client.base_url().to_string()),
                    ("Expires", expires.map(|at| at.to_rfc3339()).unwrap_or_else(|| "unknown".to_string())),
                    ("Expired", crate::cli::utils::yes_no(expired).to_string()),
                    ("Refreshable", crate::cli::utils::yes_no(session.refresh_token.is_some()).to_string()),
                    ("Saved", session.saved_at.to_rfc3339()),
                ],
            )
        }
        AuthCommands::Refresh => {
            client.refresh_session().await?;
            output_success(&output_format, "Access token refreshed", None)
        }
        AuthCommands::Whoami => {
            let user = client.current_user().await?;
            output_record(
                &output_format,
                &user,
                vec![
                    ("Email", user.email.clone()),
                    ("Name", user.full_name.clone().unwrap_or_default()),
                    ("Role", user.role.clone()),
                    ("Company", user.company_id.clone().unwrap_or_default()),
                ],
            )
        }
    }
}
