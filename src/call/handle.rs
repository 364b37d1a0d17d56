//! Call Handle
//!
//! Runs a `CallSession` on its own task. UI commands and inbound
//! signalling/peer events are handled one at a time in receipt order, so the
//! session never needs a lock.

use super::session::{CallError, CallEvent, CallSession, CallStatus};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

enum CallCommand {
    StartAsCaller {
        room_name: String,
        reply: oneshot::Sender<Result<(), CallError>>,
    },
    JoinAsCallee {
        room_name: String,
        reply: oneshot::Sender<Result<(), CallError>>,
    },
    ToggleMute {
        reply: oneshot::Sender<Result<bool, CallError>>,
    },
    EndCall {
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<CallStatus>,
    },
}

/// Cheap, cloneable front of a running call session
#[derive(Clone)]
pub struct CallHandle {
    commands: mpsc::Sender<CallCommand>,
    events: broadcast::Sender<CallEvent>,
}

impl CallHandle {
    /// Moves `session` onto a new task; the task ends the call and exits
    /// once every handle is dropped
    pub fn spawn(session: CallSession) -> (Self, JoinHandle<()>) {
        let (commands, rx) = mpsc::channel(16);
        let events = session.event_sender();
        let task = tokio::spawn(run(session, rx));
        (Self { commands, events }, task)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    pub async fn start_as_caller(&self, room_name: impl Into<String>) -> Result<(), CallError> {
        let room_name = room_name.into();
        self.request(|reply| CallCommand::StartAsCaller { room_name, reply })
            .await?
    }

    pub async fn join_as_callee(&self, room_name: impl Into<String>) -> Result<(), CallError> {
        let room_name = room_name.into();
        self.request(|reply| CallCommand::JoinAsCallee { room_name, reply })
            .await?
    }

    pub async fn toggle_mute(&self) -> Result<bool, CallError> {
        self.request(|reply| CallCommand::ToggleMute { reply }).await?
    }

    pub async fn end_call(&self) -> Result<(), CallError> {
        self.request(|reply| CallCommand::EndCall { reply }).await
    }

    pub async fn status(&self) -> Result<CallStatus, CallError> {
        self.request(|reply| CallCommand::Status { reply }).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> CallCommand,
    ) -> Result<T, CallError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| CallError::SessionClosed)?;
        response.await.map_err(|_| CallError::SessionClosed)
    }
}

impl std::fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallHandle")
            .field("running", &!self.commands.is_closed())
            .finish()
    }
}

async fn run(mut session: CallSession, mut commands: mpsc::Receiver<CallCommand>) {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => dispatch(&mut session, command).await,
                None => break,
            },
            input = session.next_input() => session.handle_input(input).await,
        }
    }

    session.end_call().await;
    tracing::debug!("Call session task finished");
}

async fn dispatch(session: &mut CallSession, command: CallCommand) {
    match command {
        CallCommand::StartAsCaller { room_name, reply } => {
            let _ = reply.send(session.start_as_caller(&room_name).await);
        }
        CallCommand::JoinAsCallee { room_name, reply } => {
            let _ = reply.send(session.join_as_callee(&room_name).await);
        }
        CallCommand::ToggleMute { reply } => {
            let _ = reply.send(session.toggle_mute());
        }
        CallCommand::EndCall { reply } => {
            session.end_call().await;
            let _ = reply.send(());
        }
        CallCommand::Status { reply } => {
            let _ = reply.send(session.status());
        }
    }
}
