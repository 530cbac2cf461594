//! Line-oriented terminal presenter
//!
//! Prints each message once, in sequence order, as `[time] name: text`. New
//! output always lands at the bottom of the terminal, so scrolling only has to
//! flush.

use std::collections::HashSet;
use std::io::Write;
use std::sync::Mutex;

use roomchat_core::{Error, Identity, Message, MessageId, MessageSequence, Presenter, ScrollUnavailable};

struct Screen<W> {
    out: W,
    printed: HashSet<MessageId>,
}

pub struct TerminalPresenter<W: Write + Send> {
    screen: Mutex<Screen<W>>,
}

impl<W: Write + Send> TerminalPresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            screen: Mutex::new(Screen {
                out,
                printed: HashSet::new(),
            }),
        }
    }

    fn with_screen<T>(&self, f: impl FnOnce(&mut Screen<W>) -> T) -> T {
        let mut screen = self
            .screen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut screen)
    }

    fn line(&self, text: &str) {
        self.with_screen(|s| {
            if let Err(e) = writeln!(s.out, "{}", text) {
                tracing::warn!(error = %e, "Terminal write failed");
            }
        });
    }

    /// Recover the writer, for inspecting output
    pub fn into_inner(self) -> W {
        self.screen
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .out
    }
}

pub fn format_message(message: &Message) -> String {
    format!(
        "[{}] {}: {}",
        message.format_timestamp(),
        message.author_display_name,
        message.text
    )
}

impl<W: Write + Send> Presenter for TerminalPresenter<W> {
    fn show_sign_in(&self) {
        self.with_screen(|s| s.printed.clear());
        self.line("Not signed in. Use /signin google or /signin github.");
    }

    fn show_chat(&self, identity: &Identity) {
        self.line(&format!(
            "Signed in as {}. Type a message and press Enter, /signout to leave, /quit to exit.",
            identity.display_name
        ));
    }

    fn render(&self, sequence: &MessageSequence) {
        self.with_screen(|s| {
            for message in sequence {
                if message.created_at.is_pending() || s.printed.contains(&message.id) {
                    continue;
                }
                if let Err(e) = writeln!(s.out, "{}", format_message(message)) {
                    tracing::warn!(error = %e, "Terminal write failed");
                    return;
                }
                s.printed.insert(message.id.clone());
            }
        });
    }

    fn scroll_to_end(&self) -> Result<(), ScrollUnavailable> {
        self.with_screen(|s| s.out.flush().map_err(|_| ScrollUnavailable))
    }

    fn show_error(&self, error: &Error) {
        self.line(&format!("error: {}", error));
    }
}
