/// Synthetic odds feed replay
///
/// Generates a random mix of feed messages, pushes them through an in-process
/// transport and consumes them with a regular feed session. Useful for trying
/// handlers and watching the session logs without a broker.
///
///   cargo run --example feed_replay -- [message_count] [flow]

use anyhow::Context;
use odds_feed::config::{FeedSettings, PackageSettings};
use odds_feed::entities::{HeartbeatUpdate, KeepAliveUpdate, LivescoreUpdate, MarketUpdate};
use odds_feed::message::{FIXTURE_ID, MESSAGE_GUID, MESSAGE_SEQUENCE, MESSAGE_TYPE, TIMESTAMP_IN_MS};
use odds_feed::{
    channel, handler_fn, init_logging, processor, FeedSession, Flow, Handlers, HeaderValue,
    MessageHeader, Payload, RawHeaders, TransportHeaders,
};
use rand::{Rng, SeedableRng};
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

fn local_settings() -> FeedSettings {
    let package = |package_id| PackageSettings {
        host: "localhost".to_string(),
        port: 5672,
        virtual_host: "Replay".to_string(),
        username: "replay".to_string(),
        password: "replay".to_string(),
        package_id,
        prefetch_count: 100,
        requested_heartbeat_seconds: 30,
        network_recovery_interval_seconds: 30,
        auto_ack: false,
    };
    FeedSettings {
        in_play: Some(package(1)),
        pre_match: Some(package(2)),
        customers_api: None,
    }
}

fn properties(message_type: &str, sequence: u64, fixture_id: i64) -> RawHeaders {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default();

    let mut props = RawHeaders::new();
    props.insert(MESSAGE_TYPE.to_string(), message_type.into());
    props.insert(MESSAGE_SEQUENCE.to_string(), HeaderValue::Int(sequence as i64));
    props.insert(MESSAGE_GUID.to_string(), format!("replay-{}", sequence).into());
    props.insert(FIXTURE_ID.to_string(), HeaderValue::Int(fixture_id));
    props.insert(TIMESTAMP_IN_MS.to_string(), HeaderValue::Int(now_ms));
    props
}

fn generate(rng: &mut impl Rng, sequence: u64) -> (RawHeaders, String) {
    let fixture_id = rng.gen_range(10_000_000i64..10_000_100);

    match rng.gen_range(0u8..100) {
        0..=59 => {
            let price = rng.gen_range(101u32..1000) as f64 / 100.0;
            let body = format!(
                r#"{{"Events":[{{"FixtureId":{},"Markets":[{{"Id":1,"Name":"1X2","Bets":[{{"Id":{},"Name":"1","Status":1,"Price":"{:.2}"}}]}}]}}]}}"#,
                fixture_id, sequence, price
            );
            (
                properties("MarketUpdate", sequence, fixture_id),
                format!(r#"{{"Header":{{"Type":3,"MsgSeq":{}}},"Body":{}}}"#, sequence, body),
            )
        }
        60..=84 => {
            let home = rng.gen_range(0u8..5);
            let away = rng.gen_range(0u8..5);
            let body = format!(
                r#"{{"Events":[{{"FixtureId":{},"Livescore":{{"Scoreboard":{{"Status":2,"Results":[{{"Position":"1","Value":"{}"}},{{"Position":"2","Value":"{}"}}]}}}}}}]}}"#,
                fixture_id, home, away
            );
            (
                properties("LivescoreUpdate", sequence, fixture_id),
                format!(r#"{{"header":{{"type":2,"msgSeq":{}}},"body":{}}}"#, sequence, body),
            )
        }
        85..=92 => (
            properties("HeartbeatUpdate", sequence, 0),
            format!(r#"{{"Header":{{"Type":32,"MsgSeq":{}}}}}"#, sequence),
        ),
        93..=97 => (
            properties("KeepAliveUpdate", sequence, 0),
            format!(
                r#"{{"Header":{{"Type":31,"MsgSeq":{}}},"Body":{{"KeepAlive":{{"ActiveEvents":[{}],"ProviderId":8}}}}}}"#,
                sequence, fixture_id
            ),
        ),
        // an entity type nobody registered for
        _ => (
            properties("OutrightFixtureUpdate", sequence, fixture_id),
            format!(r#"{{"Header":{{"Type":37,"MsgSeq":{}}},"Body":{{}}}}"#, sequence),
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let message_count: u64 = if args.len() > 1 {
        args[1].parse().unwrap_or(10000)
    } else {
        10000
    };
    let flow = args.get(2).cloned().unwrap_or_else(|| "inplay".to_string());

    let settings = if env::var(odds_feed::config::CONFIG_PATH_ENV).is_ok() {
        FeedSettings::from_env_or_yaml().context("loading feed settings")?
    } else {
        local_settings()
    };
    let parsed_flow: Flow = flow.parse()?;

    let markets = Arc::new(AtomicU64::new(0));
    let bets = Arc::new(AtomicU64::new(0));
    let livescores = Arc::new(AtomicU64::new(0));
    let keep_alives = Arc::new(AtomicU64::new(0));

    let handlers = {
        let markets = Arc::clone(&markets);
        let bets = Arc::clone(&bets);
        let livescores = Arc::clone(&livescores);
        let keep_alives = Arc::clone(&keep_alives);
        Handlers::new()
            .with::<MarketUpdate, _>(
                parsed_flow,
                handler_fn(
                    move |_: &TransportHeaders, _: &MessageHeader, payload: Payload<MarketUpdate>| -> anyhow::Result<()> {
                        markets.fetch_add(1, Ordering::Relaxed);
                        if let Some(update) = payload.entity() {
                            let count: usize = update
                                .events
                                .iter()
                                .flat_map(|e| e.markets.iter())
                                .map(|m| m.bets.len())
                                .sum();
                            bets.fetch_add(count as u64, Ordering::Relaxed);
                        }
                        Ok(())
                    },
                ),
            )
            .with::<LivescoreUpdate, _>(
                parsed_flow,
                handler_fn(
                    move |_: &TransportHeaders, _: &MessageHeader, _: Payload<LivescoreUpdate>| -> anyhow::Result<()> {
                        livescores.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    },
                ),
            )
            .with::<KeepAliveUpdate, _>(
                parsed_flow,
                handler_fn(
                    move |_: &TransportHeaders, _: &MessageHeader, _: Payload<KeepAliveUpdate>| -> anyhow::Result<()> {
                        keep_alives.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    },
                ),
            )
            .with::<HeartbeatUpdate, _>(
                parsed_flow,
                handler_fn(
                    |_: &TransportHeaders, header: &MessageHeader, _: Payload<HeartbeatUpdate>| -> anyhow::Result<()> {
                        tracing::debug!(msg_seq = ?header.msg_seq, "heartbeat");
                        Ok(())
                    },
                ),
            )
    };
    let handlers = Arc::new(handlers);

    let (publisher, transport) = channel(1024);
    let mut session = FeedSession::builder(&settings)
        .flow(flow)
        .processor(processor::<MarketUpdate>(parsed_flow, &handlers))
        .processor(processor::<LivescoreUpdate>(parsed_flow, &handlers))
        .processor(processor::<KeepAliveUpdate>(parsed_flow, &handlers))
        .processor(processor::<HeartbeatUpdate>(parsed_flow, &handlers))
        .transport(transport)
        .build()?;

    session.start(false, &CancellationToken::new()).await?;

    println!("Replaying {} messages on {}", message_count, parsed_flow);
    let producer = tokio::spawn(async move {
        let mut rng = rand::rngs::StdRng::from_entropy();
        for sequence in 1..=message_count {
            let (props, body) = generate(&mut rng, sequence);
            publisher.publish(props, body).await?;
        }
        Ok::<_, odds_feed::TransportError>(())
    });

    producer.await??;
    session.wait().await?;

    let stats = session.stats();
    println!("Replay complete: {} messages, {} bytes", stats.received, stats.bytes);
    println!(
        "Dispatched {} (markets {}, bets {}, livescores {}, keepalives {}), rejected {}",
        stats.dispatched,
        markets.load(Ordering::Relaxed),
        bets.load(Ordering::Relaxed),
        livescores.load(Ordering::Relaxed),
        keep_alives.load(Ordering::Relaxed),
        stats.rejected()
    );

    Ok(())
}
