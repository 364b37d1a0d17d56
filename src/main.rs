//! flow-call: join a Flow call room from the terminal
//!
//! Signs in, creates or joins a room, then runs the call until Ctrl-C,
//! `q` on stdin, or the call ending. `m` toggles the microphone.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use flow_client::config::ClientConfig;
use flow_client::{CallEvent, CallHandle, CallStatus, FlowClient};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(name = "flow-call", version, about = "Peer-to-peer call rooms for Flow")]
struct Cli {
    /// Backend base URL (overrides FLOW_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    #[arg(long, env = "FLOW_EMAIL")]
    email: Option<String>,

    #[arg(long, env = "FLOW_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Keep the stored tokens instead of signing out on exit
    #[arg(long)]
    keep_session: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new room and wait there
    Create {
        #[arg(long, value_enum, default_value_t = Role::Callee)]
        role: Role,
    },
    /// Join an existing room and call whoever waits in it
    Join {
        room: String,
        #[arg(long, value_enum, default_value_t = Role::Caller)]
        role: Role,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Role {
    Caller,
    Callee,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    flow_client::init_tracing();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env()?;
    if let Some(api_url) = cli.api_url.as_deref() {
        config = config.with_api_url(api_url)?;
        if let Ok(ws_url) = std::env::var("FLOW_WS_URL") {
            config = config.with_ws_url(&ws_url)?;
        }
    }

    let client = FlowClient::new(config)?;

    if !client.restore_session()? {
        let email = cli.email.clone().context("--email or FLOW_EMAIL is required")?;
        let password = cli
            .password
            .clone()
            .context("--password or FLOW_PASSWORD is required")?;
        client.sign_in(&email, &password).await?;
    }

    let (room, role) = match &cli.command {
        Command::Create { role } => (client.create_room().await?, *role),
        Command::Join { room, role } => (client.join_room(room).await?, *role),
    };
    println!("Room: {}", room.name);

    let (call, task) = CallHandle::spawn(client.new_call_session());
    let mut events = call.subscribe();

    let started = match role {
        Role::Caller => call.start_as_caller(room.name.clone()).await,
        Role::Callee => call.join_as_callee(room.name.clone()).await,
    };

    match started {
        Ok(()) => run_until_done(&call, &mut events).await?,
        Err(e) => eprintln!("{}", e.user_message()),
    }

    call.end_call().await?;
    drop(call);
    task.await?;

    if !cli.keep_session {
        if let Err(e) = client.sign_out().await {
            tracing::warn!("Sign-out failed: {}", e);
        }
    }

    Ok(())
}

async fn run_until_done(
    call: &CallHandle,
    events: &mut tokio::sync::broadcast::Receiver<CallEvent>,
) -> anyhow::Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            line = stdin.next_line() => match line?.as_deref().map(str::trim) {
                Some("m") => {
                    let muted = call.toggle_mute().await?;
                    println!("{}", if muted { "Muted" } else { "Unmuted" });
                }
                Some("q") | None => break,
                Some(_) => println!("m = mute/unmute, q = end call"),
            },

            event = events.recv() => match event {
                Ok(CallEvent::StatusChanged(status)) => {
                    if !status.label().is_empty() {
                        println!("{}", status.label());
                    }
                    if status == CallStatus::Failed {
                        break;
                    }
                }
                Ok(CallEvent::RemoteTrackAdded(track)) => {
                    println!("Remote {} track ({})", track.kind, track.codec);
                }
                Ok(CallEvent::Alert(message)) => eprintln!("{message}"),
                Ok(CallEvent::Ended { .. }) | Err(RecvError::Closed) => break,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
            },
        }
    }

    Ok(())
}
