use std::fs;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::write_private;

const MAX_HISTORY: usize = 10;

/// Per-user CLI state kept next to the session file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliState {
    pub current_project: Option<String>,
    pub last_user: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    /// Earlier chat turns sent back to `/ask` as context
    #[serde(default)]
    pub chat_history: Vec<String>,
}

impl CliState {
    pub fn record_login(&mut self, email: &str) {
        if self.last_user.as_deref() != Some(email) {
            // Another account: its projects and conversation don't apply
            self.current_project = None;
            self.chat_history.clear();
        }
        self.last_user = Some(email.to_string());
        self.last_login_at = Some(Utc::now());
    }

    pub fn push_turn(&mut self, question: &str, answer: &str) {
        self.chat_history.push(question.to_string());
        self.chat_history.push(answer.to_string());
        let excess = self.chat_history.len().saturating_sub(MAX_HISTORY * 2);
        self.chat_history.drain(..excess);
    }
}

pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    let config_dir = if let Ok(custom_dir) = std::env::var("JURIS_CONFIG_DIR") {
        PathBuf::from(custom_dir)
    } else {
        let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME environment variable not set"))?;
        PathBuf::from(home).join(".config").join("jurisconsultor").join("cli")
    };

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

pub fn session_file() -> anyhow::Result<PathBuf> {
    Ok(get_config_dir()?.join("session.json"))
}

pub fn load_state() -> anyhow::Result<CliState> {
    load_state_from(&get_config_dir()?.join("state.json"))
}

pub fn save_state(state: &CliState) -> anyhow::Result<()> {
    save_state_to(&get_config_dir()?.join("state.json"), state)
}

fn load_state_from(state_file: &Path) -> anyhow::Result<CliState> {
    if !state_file.exists() {
        return Ok(CliState::default());
    }

    let content = fs::read_to_string(state_file)?;
    let state: CliState = serde_json::from_str(&content)?;
    Ok(state)
}

fn save_state_to(state_file: &Path, state: &CliState) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(state)?;
    write_private(state_file, content.as_bytes())?;
    Ok(())
}
