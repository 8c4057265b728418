//! Line-oriented terminal surface
//!
//! Renders turns as bubbles on stdout and turns stdin lines into
//! [`UserEvent`]s for the interaction loop.

mod bubble;

pub use bubble::create_bubble;

use crate::llm::Role;
use crate::runtime::{Presentation, UserEvent};
use crossterm::style::Stylize;
use crossterm::terminal::{Clear, ClearType};
use crossterm::{cursor::MoveTo, execute};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

/// Bubble renderer over any writer. Colors and screen clearing are only
/// emitted when `styled` is set (an interactive terminal).
pub struct ConsolePresentation<W> {
    out: W,
    model: String,
    styled: bool,
}

impl<W: Write + Send> ConsolePresentation<W> {
    pub fn new(out: W, model: impl Into<String>, styled: bool) -> Self {
        Self {
            out,
            model: model.into(),
            styled,
        }
    }

    #[allow(dead_code)] // Inspected by tests
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_block(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{text}\n").and_then(|()| self.out.flush()) {
            tracing::warn!(error = %e, "Failed to write to terminal");
        }
    }
}

impl<W: Write + Send> Presentation for ConsolePresentation<W> {
    fn render_turn(&mut self, role: Role, content: &str) {
        let bubble = match role {
            Role::User => create_bubble("You", content),
            Role::Assistant => create_bubble(&self.model, content),
        };
        let bubble = if self.styled {
            match role {
                Role::User => bubble.green().to_string(),
                Role::Assistant => bubble.yellow().to_string(),
            }
        } else {
            bubble
        };
        self.write_block(&bubble);
    }

    fn clear(&mut self, conversation_id: &str) {
        if self.styled {
            if let Err(e) = execute!(self.out, Clear(ClearType::All), MoveTo(0, 0)) {
                tracing::warn!(error = %e, "Failed to clear terminal");
            }
        }
        let header = format!("== Conversation: {conversation_id} ==");
        let header = if self.styled {
            header.bold().to_string()
        } else {
            header
        };
        self.write_block(&header);
    }

    fn notice(&mut self, text: &str) {
        let text = if self.styled {
            text.dark_grey().to_string()
        } else {
            text.to_string()
        };
        self.write_block(&text);
    }
}

/// Parse one input line. Blank lines yield nothing; anything not starting
/// with `/` is a submission.
pub fn parse_input(line: &str) -> Option<UserEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if !line.starts_with('/') {
        return Some(UserEvent::Submit(line.to_string()));
    }

    let (cmd, arg) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(c, a)| (c, a.trim()));

    let event = match cmd {
        "/help" | "/h" => UserEvent::Help,
        "/quit" | "/exit" | "/q" => UserEvent::Quit,
        "/conversations" | "/list" => UserEvent::ListConversations,
        "/messages" => UserEvent::ListMessages,
        "/switch" => {
            if arg.is_empty() {
                UserEvent::Invalid("Usage: /switch <conversation id>".to_string())
            } else {
                UserEvent::SwitchConversation(arg.to_string())
            }
        }
        "/delete" => match parse_id(cmd, arg) {
            Ok(id) => UserEvent::DeleteMessage(id),
            Err(e) => e,
        },
        "/edit" => match parse_id(cmd, arg) {
            Ok(id) => UserEvent::EditMessage(id),
            Err(e) => e,
        },
        other => UserEvent::Invalid(format!("Unknown command: {other}")),
    };
    Some(event)
}

fn parse_id(cmd: &str, arg: &str) -> Result<i64, UserEvent> {
    arg.parse()
        .map_err(|_| UserEvent::Invalid(format!("Usage: {cmd} <message id>")))
}

/// Forward parsed input lines to the loop until EOF, a read error, or the
/// loop going away
#[allow(clippy::needless_pass_by_value)] // Dropping the sender closes the loop
pub async fn read_input<R>(reader: R, events: mpsc::Sender<UserEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let Some(event) = parse_input(&line) else {
                    continue;
                };
                let quit = event == UserEvent::Quit;
                if events.send(event).await.is_err() || quit {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read input");
                break;
            }
        }
    }
    tracing::debug!("Input reader stopped");
}
