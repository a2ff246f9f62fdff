//! Simulated lab console.
//!
//! A scrollback of typed entries plus a command handler. `help`, `clear`,
//! and `exit` resolve locally; everything else is forwarded to a
//! [`CommandOracle`] that fabricates a plausible terminal response for the
//! lab's sandbox environment. Oracle failures degrade to an error line in
//! the scrollback; the console itself never fails.

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::warn;

use crate::genai::{GenAiClient, GenAiError, GenerationOptions};

pub const CONSOLE_MODEL: &str = "gemini-3-flash-preview";

const HELP_TEXT: &str = "Available commands:\n  \
     ls         - List directory contents\n  \
     cat <file> - Read file contents\n  \
     gcloud     - Google Cloud CLI simulation\n  \
     kubectl    - Kubernetes CLI simulation\n  \
     nmap       - Network discovery simulation\n  \
     clear      - Clear terminal\n  \
     exit       - Close console";

const GATEWAY_LOST: &str = "Connection lost to lab gateway.";
const COMMAND_TIMED_OUT: &str = "Command execution timed out.";

/// The lab a console session is attached to.
#[derive(Debug, Clone)]
pub struct LabContext {
    pub name: String,
    pub platform: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Input,
    Output,
    Error,
    System,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub kind: LogKind,
    pub content: String,
}

/// What the caller should do after a command is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleAction {
    Continue,
    Close,
}

/// Produces terminal output for commands the console cannot answer locally.
pub trait CommandOracle: Send + Sync {
    fn simulate(&self, lab: &LabContext, command: &str) -> Result<String, GenAiError>;
}

/// Prompt asking the model to act as the lab's sandbox terminal.
pub fn simulation_prompt(lab: &LabContext, command: &str) -> String {
    format!(
        "Simulate a Linux terminal response for a {} sandbox environment. \
         Lab context: {}. \
         The user typed: \"{}\". \
         Provide a realistic, concise terminal output. If it's a security \
         command like nmap or gcloud, show appropriate logs or JSON results. \
         Keep it as raw text output only.",
        lab.platform, lab.description, command
    )
}

/// Production oracle backed by the generative endpoint.
pub struct GenAiOracle {
    client: GenAiClient,
    model: String,
}

impl GenAiOracle {
    pub fn new(client: GenAiClient) -> Self {
        Self {
            client,
            model: CONSOLE_MODEL.to_string(),
        }
    }
}

impl CommandOracle for GenAiOracle {
    fn simulate(&self, lab: &LabContext, command: &str) -> Result<String, GenAiError> {
        let options = GenerationOptions {
            temperature: Some(0.1),
            max_output_tokens: Some(200),
            ..GenerationOptions::default()
        };
        self.client
            .generate_content(&self.model, &simulation_prompt(lab, command), &options)
            .map(|reply| reply.text)
    }
}

/// One interactive console session.
pub struct LabConsole {
    lab: LabContext,
    history: Vec<LogEntry>,
    oracle: Box<dyn CommandOracle>,
}

impl LabConsole {
    /// Open a console for `lab`, seeding the scrollback with the
    /// provisioning banner.
    pub fn new(lab: LabContext, oracle: Box<dyn CommandOracle>) -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(|c| (c as char).to_ascii_lowercase())
            .collect();

        let history = vec![
            LogEntry {
                kind: LogKind::System,
                content: format!("Provisioning secure tenant for {}...", lab.platform),
            },
            LogEntry {
                kind: LogKind::System,
                content: format!("Instance ready: tech-skyline-sandbox-{suffix}"),
            },
            LogEntry {
                kind: LogKind::System,
                content: "Type 'help' to see available commands.".to_string(),
            },
        ];

        Self {
            lab,
            history,
            oracle,
        }
    }

    pub fn lab(&self) -> &LabContext {
        &self.lab
    }

    pub fn history(&self) -> &[LogEntry] {
        &self.history
    }

    /// Handle one typed line. Blank input is a no-op; `exit` asks the caller
    /// to close the console.
    pub fn handle_command(&mut self, line: &str) -> ConsoleAction {
        let command = line.trim();
        if command.is_empty() {
            return ConsoleAction::Continue;
        }

        self.history.push(LogEntry {
            kind: LogKind::Input,
            content: command.to_string(),
        });

        match command.to_lowercase().as_str() {
            "help" => {
                self.push_output(HELP_TEXT);
                return ConsoleAction::Continue;
            }
            "clear" => {
                self.history.clear();
                return ConsoleAction::Continue;
            }
            "exit" => return ConsoleAction::Close,
            _ => {}
        }

        match self.oracle.simulate(&self.lab, command) {
            Ok(output) => self.push_output(&output),
            Err(GenAiError::Empty { .. }) => self.push_output(COMMAND_TIMED_OUT),
            Err(e) => {
                warn!(error = %e, command, "lab oracle failed");
                self.history.push(LogEntry {
                    kind: LogKind::Error,
                    content: GATEWAY_LOST.to_string(),
                });
            }
        }
        ConsoleAction::Continue
    }

    fn push_output(&mut self, content: &str) {
        self.history.push(LogEntry {
            kind: LogKind::Output,
            content: content.to_string(),
        });
    }
}
