//! Terminal confirmation prompt

use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use vellum_core::gate::missing_site_question;
use vellum_core::Prompt;

/// Asks on stdin, or answers on its own when the terminal is not interactive
pub struct TerminalPrompt {
    interactive: bool,
    assume_yes: bool,
}

impl TerminalPrompt {
    /// Prompt only when the output format allows it and stdin is a TTY
    pub fn new(show_prompts: bool, assume_yes: bool) -> Self {
        Self::with_terminal(show_prompts, assume_yes, atty::is(atty::Stream::Stdin))
    }

    fn with_terminal(show_prompts: bool, assume_yes: bool, stdin_is_tty: bool) -> Self {
        Self {
            interactive: show_prompts && stdin_is_tty,
            assume_yes,
        }
    }
}

impl Prompt for TerminalPrompt {
    async fn confirm_create_site(&self, slug: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        if !self.interactive {
            eprintln!(
                "The site \"{}\" does not exist. Pass --yes to create it.",
                slug
            );
            return false;
        }

        print!("{} [y/N] ", missing_site_question(slug));
        if let Err(e) = io::stdout().flush() {
            warn!("Could not flush prompt: {}", e);
        }

        let mut answer = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match stdin.read_line(&mut answer).await {
            Ok(_) => is_yes(&answer),
            Err(e) => {
                warn!("Could not read answer: {}", e);
                false
            }
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
