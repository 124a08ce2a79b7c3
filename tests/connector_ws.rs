//! Connector behavior against a local mock WebSocket server: subscription
//! handshake, typed event delivery, reconnect exhaustion and shutdown.

use futures::{SinkExt, StreamExt};
use okx_signal_bot::config::{Config, ReconnectConfig, Timeframe};
use okx_signal_bot::error::BotError;
use okx_signal_bot::okx::{ConnectionState, OkxConnector, StreamEvent};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{accept_async, tungstenite::Message};

fn test_config(url: String) -> Config {
    Config {
        ws_url: url,
        symbol: "BTC-USDT-SWAP".to_string(),
        timeframe: Timeframe::M1,
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(10),
            multiplier: 1.5,
            max_attempts: 1,
        },
        ping_interval: Duration::from_secs(5),
        idle_timeout: Duration::from_secs(30),
        ..Config::default()
    }
}

#[tokio::test]
async fn connector_streams_events_then_fails_after_reconnect_budget() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // One session, then the port goes dark so reconnects are refused.
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(listener);
        let mut ws = accept_async(stream).await.unwrap();

        // The first inbound frame must be the subscription request.
        let request = ws.next().await.unwrap().unwrap();
        let request: serde_json::Value =
            serde_json::from_str(request.to_text().unwrap()).unwrap();
        assert_eq!(request["op"], "subscribe");
        assert_eq!(request["args"][0]["channel"], "tickers");
        assert_eq!(request["args"][0]["instId"], "BTC-USDT-SWAP");
        assert_eq!(request["args"][1]["channel"], "candle1m");

        ws.send(Message::text(
            r#"{"event":"subscribe","arg":{"channel":"tickers","instId":"BTC-USDT-SWAP"}}"#,
        ))
        .await
        .unwrap();
        ws.send(Message::text(
            r#"{"event":"subscribe","arg":{"channel":"candle1m","instId":"BTC-USDT-SWAP"}}"#,
        ))
        .await
        .unwrap();

        let now_ms = chrono::Utc::now().timestamp_millis();
        ws.send(Message::text(format!(
            r#"{{"arg":{{"channel":"tickers","instId":"BTC-USDT-SWAP"}},"data":[{{"last":"43250.5","vol24h":"1000","ts":"{now_ms}"}}]}}"#,
        )))
        .await
        .unwrap();

        let open_ms = now_ms / 60_000 * 60_000;
        ws.send(Message::text(format!(
            r#"{{"arg":{{"channel":"candle1m","instId":"BTC-USDT-SWAP"}},"data":[["{open_ms}","43000","43500","42900","43400","1250.5"]]}}"#,
        )))
        .await
        .unwrap();

        // A malformed frame is skipped without dropping the stream.
        ws.send(Message::text("{not json")).await.unwrap();

        let now_ms = chrono::Utc::now().timestamp_millis();
        ws.send(Message::text(format!(
            r#"{{"arg":{{"channel":"tickers","instId":"BTC-USDT-SWAP"}},"data":[{{"last":"43260.0","vol24h":"1001","ts":"{now_ms}"}}]}}"#,
        )))
        .await
        .unwrap();

        let _ = ws.send(Message::Close(None)).await;
    });

    let connector = OkxConnector::new(&test_config(format!("ws://{addr}")));
    let mut state_rx = connector.state();
    let (event_tx, mut event_rx) = mpsc::channel(64);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let run = tokio::spawn(connector.run(event_tx, shutdown_rx));

    let mut ticks = 0;
    let mut candles = 0;
    while let Some(event) = tokio::time::timeout(Duration::from_secs(5), event_rx.recv())
        .await
        .expect("events before the stream drops")
    {
        match event {
            StreamEvent::Tick(tick) => {
                assert!(tick.price > 0.0);
                ticks += 1;
            }
            StreamEvent::Candle(candle) => {
                assert_eq!(candle.close, 43400.0);
                candles += 1;
            }
        }
        if ticks == 2 && candles == 1 {
            break;
        }
    }
    assert_eq!(ticks, 2, "both ticks around the malformed frame delivered");
    assert_eq!(candles, 1);

    // One reconnect attempt against the dark port, then fatal.
    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run finishes")
        .unwrap();
    match result {
        Err(BotError::ReconnectExhausted { attempts }) => assert_eq!(attempts, 1),
        other => panic!("expected ReconnectExhausted, got {other:?}"),
    }
    assert_eq!(*state_rx.borrow_and_update(), ConnectionState::Failed);

    server.await.unwrap();
}

#[tokio::test]
async fn shutdown_closes_the_stream_and_returns_cleanly() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _subscribe = ws.next().await;
        ws.send(Message::text(
            r#"{"event":"subscribe","arg":{"channel":"tickers","instId":"BTC-USDT-SWAP"}}"#,
        ))
        .await
        .unwrap();
        ws.send(Message::text(
            r#"{"event":"subscribe","arg":{"channel":"candle1m","instId":"BTC-USDT-SWAP"}}"#,
        ))
        .await
        .unwrap();
        // Hold the connection open until the client closes it.
        while let Some(Ok(frame)) = ws.next().await {
            if let Message::Close(_) = frame {
                break;
            }
        }
    });

    let connector = OkxConnector::new(&test_config(format!("ws://{addr}")));
    let mut state_rx = connector.state();
    let (event_tx, _event_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let run = tokio::spawn(connector.run(event_tx, shutdown_rx));

    // Wait for the live subscription before requesting shutdown.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if *state_rx.borrow_and_update() == ConnectionState::Connected {
                break;
            }
            state_rx.changed().await.unwrap();
        }
    })
    .await
    .expect("connector reaches Connected");

    shutdown_tx.send(true).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run returns after shutdown")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(*state_rx.borrow_and_update(), ConnectionState::Disconnected);

    server.await.unwrap();
}

#[tokio::test]
async fn subscription_rejection_consumes_the_attempt_budget() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        // Reject the subscription on every session the budget allows.
        for _ in 0..2 {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _subscribe = ws.next().await;
            ws.send(Message::text(
                r#"{"event":"error","code":"60018","msg":"channel does not exist"}"#,
            ))
            .await
            .unwrap();
            let _ = ws.close(None).await;
        }
        drop(listener);
    });

    let connector = OkxConnector::new(&test_config(format!("ws://{addr}")));
    let (event_tx, _event_rx) = mpsc::channel(64);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        tokio::spawn(connector.run(event_tx, shutdown_rx)),
    )
    .await
    .expect("run finishes")
    .unwrap();

    match result {
        Err(BotError::ReconnectExhausted { attempts }) => assert_eq!(attempts, 1),
        other => panic!("expected ReconnectExhausted, got {other:?}"),
    }

    server.await.unwrap();
}
