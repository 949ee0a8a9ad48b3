use clap::Parser;
use jurisconsultor_client::cli::utils::output_error;
use jurisconsultor_client::cli::{Cli, OutputFormat};
use jurisconsultor_client::ClientError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_format = OutputFormat::from_cli(&cli);

    if let Err(e) = jurisconsultor_client::cli::run(cli).await {
        if let Some(client_error) = e.downcast_ref::<ClientError>() {
            output_error(&output_format, client_error)?;
        } else {
            match std::env::var("CLI_VERBOSE").as_deref() {
                Ok("true") | Ok("1") => eprintln!("Error: {e:?}"),
                _ => eprintln!("Error: {e}"),
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
