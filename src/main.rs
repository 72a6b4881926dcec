//! Tic-Tac-Toe Server
//!
//! Multiplayer room server. Configuration comes from the environment
//! (`BIND_HOST`, `PORT`, `MAX_CONNECTIONS`, `CHANNEL_CAPACITY`);
//! log level from `RUST_LOG`.
//!
//! `tictactoe-server selfplay [easy|medium|hard]` plays one engine-vs-engine
//! match locally instead of serving.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tictactoe::{
    VERSION,
    game::{Difficulty, GameSession, Outcome},
    network::{GameServer, ServerConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Tic-Tac-Toe Server v{}", VERSION);

    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("selfplay") {
        let difficulty: Difficulty = args
            .next()
            .as_deref()
            .unwrap_or("hard")
            .parse()
            .context("parsing difficulty")?;
        return demo_match(difficulty);
    }

    let config = ServerConfig::from_env().context("reading server configuration")?;
    info!("Max connections: {}", config.max_connections);

    let server = Arc::new(GameServer::new(config));

    let signal_server = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received");
                signal_server.shutdown();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await.context("running game server")?;

    info!("Server stopped");
    Ok(())
}

/// Play one engine-vs-engine match and log it.
fn demo_match(difficulty: Difficulty) -> anyhow::Result<()> {
    info!("=== Self-play ({}) ===", difficulty);

    let mut rng = rand::thread_rng();
    let mut session = GameSession::default();

    while let Some(mv) = session.play_engine_turn(difficulty, &mut rng)? {
        info!("Ply {}: {} -> {}", session.ply(), mv.mark, mv.index);
        for row in session.board().to_string().lines() {
            info!("  {}", row);
        }
    }

    match session.outcome() {
        Outcome::Win { mark, line } => info!("{} wins on {:?}", mark, line),
        Outcome::Draw => info!("Draw"),
        Outcome::InProgress => warn!("Match stopped early"),
    }
    info!("History digest: {}", hex::encode(session.history_digest()));

    Ok(())
}
