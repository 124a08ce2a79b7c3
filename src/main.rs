use okx_signal_bot::config::Config;
use okx_signal_bot::engine::Engine;
use okx_signal_bot::events::EventBus;
use okx_signal_bot::execution::TradeGate;
use okx_signal_bot::okx::OkxConnector;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit code for exhausted reconnect attempts or another fatal stream fault.
const EXIT_STREAM: i32 = 1;
/// Exit code for configuration validation failure.
const EXIT_CONFIG: i32 = 2;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "configuration rejected");
            std::process::exit(EXIT_CONFIG);
        }
    };
    info!(
        symbol = %config.symbol,
        timeframe = config.timeframe.label(),
        strategy = config.strategy.as_str(),
        "starting okx-signal-bot"
    );

    let bus = EventBus::new(config.market_buffer, config.bar_buffer);
    let (event_tx, event_rx) = mpsc::channel(config.market_buffer);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let connector = OkxConnector::new(&config);
    let mut connection_state = connector.state();
    tokio::spawn(async move {
        while connection_state.changed().await.is_ok() {
            let state = *connection_state.borrow();
            info!(state = %state, "connection");
        }
    });

    let engine = Engine::new(&config, bus.clone());
    let engine_task = tokio::spawn(engine.run(event_rx));

    // The signal consumer stands in for the execution collaborator boundary:
    // it serializes signal handling and enforces the trade cooldown before
    // anything would reach an order endpoint.
    let mut signals_rx = bus.subscribe_signals();
    let cooldown = config.signal_cooldown;
    tokio::spawn(async move {
        let mut gate = TradeGate::new(cooldown);
        loop {
            match signals_rx.recv().await {
                Ok(signal) => match gate.accept(&signal) {
                    Some(side) => {
                        info!(
                            side = ?side,
                            price = signal.price,
                            strategy = signal.strategy,
                            indicators = ?signal.indicators,
                            "trade signal accepted"
                        );
                    }
                    None => {
                        info!(action = %signal.action, price = signal.price, "signal observed");
                    }
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "signal consumer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut connector_task = tokio::spawn(connector.run(event_tx, shutdown_rx));

    let exit_code = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, shutting down");
            let _ = shutdown_tx.send(true);
            match connector_task.await {
                Ok(Ok(())) => 0,
                Ok(Err(err)) => {
                    error!(%err, "connector failed during shutdown");
                    EXIT_STREAM
                }
                Err(err) => {
                    error!(%err, "connector task panicked");
                    EXIT_STREAM
                }
            }
        }
        result = &mut connector_task => {
            match result {
                Ok(Ok(())) => 0,
                Ok(Err(err)) => {
                    error!(%err, "stream terminated");
                    EXIT_STREAM
                }
                Err(err) => {
                    error!(%err, "connector task panicked");
                    EXIT_STREAM
                }
            }
        }
    };

    // The connector owned the only event sender, so the engine drains and
    // stops on its own once the connector returns.
    let _ = engine_task.await;

    info!(exit_code, "okx-signal-bot stopped");
    std::process::exit(exit_code);
}
