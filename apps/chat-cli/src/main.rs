//! Terminal chat client: each stdin line is typed into the draft and sent
//! with Enter. `/new` starts a new conversation; EOF or Ctrl-C quits.

mod cli;
mod render;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cws_api::{ReqwestConversationApi, SharedConversationApi};
use cws_channel::{PhoenixSocket, SocketConfig};
use cws_identity::store_for_path;
use cws_session::{
    Bootstrap, InputEvent, Key, SessionController, SessionDeps, SessionSnapshot, SubmitOutcome,
};
use cws_telemetry::{TelemetryConfig, init_telemetry};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cli::Cli;

const NEW_CONVERSATION: &str = "/new";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let telemetry = TelemetryConfig::from_env("cws-chat", env!("CARGO_PKG_VERSION"));
    init_telemetry(telemetry)?;

    let config = cli.resolve()?;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .context("build http client")?;
    let api: SharedConversationApi = Arc::new(
        ReqwestConversationApi::new(http, &config.api_base).context("conversation api client")?,
    );
    let identity = store_for_path(config.identity_path.clone()).context("identity store")?;
    let socket = Arc::new(
        PhoenixSocket::connect(SocketConfig::new(config.socket_url.clone()))
            .context("realtime socket")?,
    );

    let controller = SessionController::new(SessionDeps {
        account_id: config.account_id.clone(),
        identity,
        api,
        channel: socket.clone(),
    });

    println!("{}", config.title);
    let renderer = tokio::spawn(render_messages(controller.watch()));
    report_bootstrap(controller.activate().await);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("read stdin")? {
                Some(line) => handle_line(&controller, line).await,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("shutting down");
    controller.close().await;
    socket.disconnect().await;
    renderer.abort();
    Ok(())
}

async fn handle_line(controller: &SessionController, line: String) {
    if line.trim() == NEW_CONVERSATION {
        report_bootstrap(controller.initialize_new_conversation().await);
        return;
    }

    controller.set_draft(line).await;
    match controller.handle_input(InputEvent::KeyDown(Key::Enter)).await {
        Ok(Some(SubmitOutcome::NotReady)) => {
            println!("(not connected yet; type /new to retry)");
        }
        Ok(_) => {}
        Err(err) => warn!(error = %err, "message not sent"),
    }
}

fn report_bootstrap(outcome: Bootstrap) {
    match outcome {
        Bootstrap::Joined(conversation_id) => info!(conversation_id = %conversation_id, "chat ready"),
        Bootstrap::Degraded => println!("(chat unavailable; type /new to retry)"),
        Bootstrap::Superseded => {}
    }
}

async fn render_messages(mut snapshots: watch::Receiver<SessionSnapshot>) {
    let mut conversation = None;
    let mut rendered = 0;
    loop {
        {
            let snapshot = snapshots.borrow_and_update();
            if snapshot.conversation_id != conversation {
                conversation = snapshot.conversation_id.clone();
                rendered = 0;
                if let Some(conversation_id) = &conversation {
                    println!("-- conversation {conversation_id} --");
                }
            }
            for line in render::pending_lines(&snapshot, rendered) {
                println!("{line}");
            }
            rendered = snapshot.messages.len();
        }
        if snapshots.changed().await.is_err() {
            break;
        }
    }
}
