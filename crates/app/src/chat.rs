//! Interactive chat client loop
//!
//! One task drives everything: input lines, session presence transitions and
//! room notifications are handled one at a time, in the order they arrive.

use std::sync::Arc;

use roomchat_core::{
    Composer, Error, IdentityProvider, LogService, MessageStream, Presenter, ProviderKind, RoomId,
    Session, Submission, ViewController,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use crate::error::Result;

/// A parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SignIn(ProviderKind),
    SignOut,
    Quit,
    Say(String),
}

impl Command {
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Ok(Command::Say(line.to_string()));
        };

        let mut parts = rest.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("signin"), Some(provider)) => provider.parse().map(Command::SignIn),
            (Some("signin"), None) => Err("usage: /signin google|github".to_string()),
            (Some("signout"), None) => Ok(Command::SignOut),
            (Some("quit"), None) => Ok(Command::Quit),
            _ => Err(format!("unknown command: {}", trimmed)),
        }
    }
}

/// Everything the client loop needs, passed in explicitly
pub struct ChatDeps {
    pub room: RoomId,
    pub service: Arc<dyn LogService>,
    pub provider: Arc<dyn IdentityProvider>,
    pub presenter: Arc<dyn Presenter>,
}

/// Run until `/quit` or end of input
pub async fn run<R: AsyncBufRead + Unpin>(input: R, deps: ChatDeps) -> Result<()> {
    let session = Session::new(deps.provider);
    let mut presence = session.presence();
    let mut view = ViewController::new(
        MessageStream::new(deps.service.clone()),
        deps.room.clone(),
        deps.presenter.clone(),
    );
    let mut composer = Composer::new(deps.service, deps.room);
    let presenter = deps.presenter;

    view.sync_presence(&session).await?;
    let mut lines = input.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("End of input");
                    break;
                };
                match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => handle_command(command, &session, &mut composer, presenter.as_ref()).await,
                    Err(usage) => presenter.show_error(&Error::Service(usage)),
                }
            }

            changed = presence.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Err(e) = view.sync_presence(&session).await {
                    warn!(error = %e, "Could not open the room");
                    presenter.show_error(&e);
                }
            }

            alive = view.process_next() => {
                if !alive {
                    presenter.show_error(&Error::Service("connection to the log service was lost".into()));
                    // Back to the sign-in screen so the next /signin subscribes again
                    session.sign_out().await;
                }
            }
        }
    }

    session.sign_out().await;
    info!("Chat client stopped");
    Ok(())
}

async fn handle_command(
    command: Command,
    session: &Session,
    composer: &mut Composer,
    presenter: &dyn Presenter,
) {
    match command {
        Command::SignIn(provider) => {
            if let Some(identity) = session.current() {
                debug!(user_id = %identity.id, "Already signed in");
                return;
            }
            if let Err(e) = session.sign_in(provider).await {
                presenter.show_error(&e);
            }
        }
        Command::SignOut => session.sign_out().await,
        Command::Say(text) => {
            composer.set_draft(text);
            match composer.submit(session).await {
                Ok(Submission::Sent(ack)) => debug!(message_id = %ack.id, "Delivered"),
                Ok(Submission::Ignored) => {}
                Err(e) => presenter.show_error(&e),
            }
        }
        Command::Quit => {}
    }
}
