use clap::Args;
use serde_json::json;

use crate::cli::{config, OutputFormat};
use crate::client::ApiClient;

#[derive(Args)]
pub struct AskArgs {
    #[arg(required = true, help = "Question for the legal agent")]
    pub question: Vec<String>,

    #[arg(long, help = "Start a new conversation instead of continuing the last one")]
    pub fresh: bool,
}

pub async fn handle(args: AskArgs, client: &ApiClient, output_format: OutputFormat) -> anyhow::Result<()> {
    let question = args.question.join(" ");
    let mut state = config::load_state()?;
    if args.fresh {
        state.chat_history.clear();
    }

    let answer = client.ask(&question, &state.chat_history).await?;

    if answer.is_error() {
        tracing::warn!("Agent reported an error: {}", answer.answer);
    } else {
        state.push_turn(&question, &answer.answer);
        config::save_state(&state)?;
    }

    match output_format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "question": question,
                    "answer": answer.answer,
                    "error": answer.is_error(),
                }))?
            );
        }
        OutputFormat::Text => println!("{}", answer.answer),
    }
    Ok(())
}
