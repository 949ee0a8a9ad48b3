use clap::Subcommand;

use crate::cli::utils::{output_collection, output_record, yes_no};
use crate::cli::OutputFormat;
use crate::client::ApiClient;
use crate::models::Document;
use crate::resources::ListFilter;

#[derive(Subcommand)]
pub enum DocumentCommands {
    #[command(about = "List indexed documents")]
    List {
        #[arg(long, help = "Include archived documents")]
        archived: bool,
    },

    #[command(about = "Show one document")]
    Show {
        #[arg(help = "Document ID")]
        id: i64,
    },
}

fn document_line(document: &Document) -> String {
    let preview: String = document.content.chars().take(60).collect();
    format!("{}  {}  {}", document.id, document.source, preview.replace('\n', " "))
}

pub async fn handle(cmd: DocumentCommands, client: &ApiClient, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        DocumentCommands::List { archived } => {
            let documents = client.documents().list(Some(ListFilter::include_archived(archived))).await?;
            output_collection(&output_format, "documents", &documents, document_line)
        }
        DocumentCommands::Show { id } => {
            let document = client.documents().get(&id.to_string()).await?;
            output_record(
                &output_format,
                &document,
                vec![
                    ("ID", document.id.to_string()),
                    ("Source", document.source.clone()),
                    ("Archived", yes_no(document.is_archived).to_string()),
                    ("Content", document.content.clone()),
                ],
            )
        }
    }
}
