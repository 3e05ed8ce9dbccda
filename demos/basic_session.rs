use std::time::Duration;

use kameo::Actor;
use kameo::prelude::ActorRef;
use sonic_rs::JsonValueTrait;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use durable_ws::client::accept_async;
use durable_ws::ws::{
    Command, Connect, Destroy, EventKind, GetMetrics, SendCommand, SessionActor, SessionActorArgs,
    SessionConfig, SessionEvent, SetAuthenticated, Subscribe, listener,
};

fn usage() -> &'static str {
    "basic_session\n\
  Runs a session against a websocket server and logs every lifecycle event.\n\
  Without --url a local echo server is started that answers heartbeats and drops\n\
  the first connection after a few seconds, so the reconnect path is visible.\n\
\n\
USAGE:\n\
  cargo run --example basic_session -- [--url <ws-url>] [--seconds <N>] [--verbose]\n\
\n\
DEFAULTS:\n\
  --seconds  12\n\
"
}

fn parse_args() -> (Option<String>, u64, bool) {
    let mut url = None;
    let mut seconds = 12;
    let mut verbose = false;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--url" => url = it.next(),
            "--seconds" => {
                seconds = it
                    .next()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(|| {
                        eprintln!("--seconds expects a number");
                        std::process::exit(2);
                    });
            }
            "--verbose" => verbose = true,
            "-h" | "--help" => {
                print!("{}", usage());
                std::process::exit(0);
            }
            other => {
                eprintln!("unknown argument: {other}\n\n{}", usage());
                std::process::exit(2);
            }
        }
    }
    (url, seconds, verbose)
}

/// Echo server: answers `PING` with `PONG`, echoes everything else, and closes the first
/// connection with 1012 after three seconds.
async fn spawn_echo_server() -> Result<String, Box<dyn std::error::Error>> {
    let tcp = TcpListener::bind("127.0.0.1:0").await?;
    let addr = tcp.local_addr()?;

    tokio::spawn(async move {
        let mut accepted = 0u32;
        while let Ok((stream, peer)) = tcp.accept().await {
            accepted += 1;
            let drop_after = (accepted == 1).then(|| Duration::from_secs(3));
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                info!(%peer, "echo server accepted connection");
                let deadline = tokio::time::sleep(drop_after.unwrap_or(Duration::MAX));
                tokio::pin!(deadline);
                loop {
                    tokio::select! {
                        _ = &mut deadline => {
                            let _ = ws.close(1012, "service restart").await;
                            return;
                        }
                        frame = ws.next() => {
                            let Some(Ok(frame)) = frame else { return };
                            let Some(text) = frame.as_text() else { continue };
                            let reply = match sonic_rs::from_str::<sonic_rs::Value>(text) {
                                Ok(v) if v.get("type").as_str() == Some("PING") => {
                                    r#"{"type":"PONG"}"#.to_string()
                                }
                                _ => text.to_string(),
                            };
                            if ws.send_text(reply).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });

    Ok(format!("ws://{addr}/echo"))
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (url, seconds, verbose) = parse_args();
    let url = match url {
        Some(url) => url,
        None => spawn_echo_server().await?,
    };

    let config = SessionConfig::default()
        .with_url(url)
        .with_heartbeat(Duration::from_secs(1), Duration::from_millis(500))
        .with_reconnect(5, Duration::from_millis(250), Duration::from_secs(5), 2.0)
        .with_verbose(verbose);
    let session: ActorRef<SessionActor> = SessionActor::spawn(SessionActorArgs::new(config));

    let log_event = listener(|event| match event {
        SessionEvent::Message { raw, .. } => info!(frame = %raw, "message"),
        SessionEvent::Error { kind, message, .. } => warn!(%kind, %message, "session error"),
        other => info!(event = ?other, "session event"),
    });
    for kind in EventKind::ALL {
        session.ask(Subscribe::on(kind, log_event.clone())).await?;
    }

    session.ask(Connect).await?;
    session.ask(SetAuthenticated(true)).await?;

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    for n in 0..seconds {
        ticker.tick().await;
        let command = Command::new("ECHO", sonic_rs::json!({ "n": n }));
        let outcome = session.ask(SendCommand::new(command)).await?;
        info!(n, ?outcome, "send");
    }

    let metrics = session.ask(GetMetrics).await?;
    info!(?metrics, "final metrics");
    session.ask(Destroy).await?;
    Ok(())
}
