use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Subcommand};
use serde_json::json;

use crate::cli::utils::{output_collection, output_record, output_success};
use crate::cli::OutputFormat;
use crate::client::ApiClient;
use crate::models::{Source, SourceFields};
use crate::optimistic::OptimisticList;

#[derive(Args, Debug, Default)]
pub struct SourceArgs {
    #[arg(long, help = "Display name")]
    pub name: Option<String>,
    #[arg(long, help = "Page to scrape")]
    pub url: Option<String>,
    #[arg(long, help = "Scraper type (e.g. generic_html)")]
    pub scraper_type: Option<String>,
    #[arg(long, help = "Direct PDF URL")]
    pub pdf_direct_url: Option<String>,
    #[arg(long, help = "Follow PDF links containing this text")]
    pub pdf_link_contains: Option<String>,
    #[arg(long, help = "Follow PDF links ending with this text")]
    pub pdf_link_ends_with: Option<String>,
}

impl From<SourceArgs> for SourceFields {
    fn from(args: SourceArgs) -> Self {
        SourceFields {
            name: args.name,
            url: args.url,
            scraper_type: args.scraper_type,
            pdf_direct_url: args.pdf_direct_url,
            pdf_link_contains: args.pdf_link_contains,
            pdf_link_ends_with: args.pdf_link_ends_with,
        }
    }
}

#[derive(Subcommand)]
pub enum SourceCommands {
    #[command(about = "List scraping sources")]
    List,

    #[command(about = "Show one source")]
    Show {
        #[arg(help = "Source ID")]
        id: String,
    },

    #[command(about = "Create a source (name and url required)")]
    Create(SourceArgs),

    #[command(about = "Update fields of a source")]
    Update {
        #[arg(help = "Source ID")]
        id: String,
        #[command(flatten)]
        fields: SourceArgs,
    },

    #[command(about = "Delete a source")]
    Delete {
        #[arg(help = "Source ID")]
        id: String,
    },

    #[command(about = "Bulk-create sources from a CSV file")]
    Upload {
        #[arg(help = "CSV file with name and url columns")]
        file: PathBuf,
    },
}

fn source_line(source: &Source) -> String {
    format!("{}  [{}]  {}  {}", source.id, source.status, source.name, source.url)
}

pub async fn handle(cmd: SourceCommands, client: &ApiClient, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        SourceCommands::List => {
            let sources = client.sources().list(None).await?;
            output_collection(&output_format, "sources", &sources, source_line)
        }
        SourceCommands::Show { id } => {
            let source = client.sources().get(&id).await?;
            output_record(
                &output_format,
                &source,
                vec![
                    ("ID", source.id.clone()),
                    ("Name", source.name.clone()),
                    ("URL", source.url.clone()),
                    ("Scraper", source.scraper_type.clone()),
                    ("Status", source.status.clone()),
                    ("Error", source.error_message.clone().unwrap_or_default()),
                ],
            )
        }
        SourceCommands::Create(args) => {
            let fields = SourceFields::from(args);
            if fields.name.is_none() || fields.url.is_none() {
                anyhow::bail!("--name and --url are required");
            }
            let source = client.sources().create(&fields).await?;
            output_success(
                &output_format,
                &format!("Created source {} ({})", source.name, source.id),
                Some(json!({ "source": source })),
            )
        }
        SourceCommands::Update { id, fields } => {
            let source = client.sources().update_source(&id, &fields.into()).await?;
            output_success(
                &output_format,
                &format!("Updated source {}", source.name),
                Some(json!({ "source": source })),
            )
        }
        SourceCommands::Delete { id } => {
            let sources = client.sources();
            let view = OptimisticList::<Source>::load(Arc::new(sources.clone())).await?;
            view.remove_optimistic(&id, || sources.remove(&id)).await?;
            output_success(&output_format, &format!("Deleted source {}", id), None)
        }
        SourceCommands::Upload { file } => {
            let message = client.sources().upload_csv_file(&file).await?;
            output_success(&output_format, &message, None)
        }
    }
}
