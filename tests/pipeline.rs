use std::sync::Arc;
use std::time::Duration;

use solarpi::config::{Config, InverterConfig, DEFAULT_SINK_MAX_RETRIES};
use solarpi::devices::kaco::encode_frame;
use solarpi::devices::{FieldValue, KacoPowadorReader, Reader};
use solarpi::output::{
    ConnectionState, Dispatcher, DispatcherState, RecordingPubSub, RecordingTimeSeries,
    PubSubSink, Sink, TimeSeriesSink,
};
use solarpi::services::{Aggregator, Pipeline, PollOutcome, Poller};
use solarpi::transport::{MemoryLink, Transport};

const TOKENS: [&str; 9] = ["4", "360.2", "0.43", "155", "231.8", "0.59", "131", "34", "1627"];

fn inverter(link: &MemoryLink) -> Arc<dyn Reader> {
    Arc::new(KacoPowadorReader::new(
        Transport::new(link.clone()),
        1,
        Some("WR Garage".to_string()),
    ))
}

#[tokio::test]
async fn full_frame_becomes_exactly_one_point() {
    let link = MemoryLink::new();
    link.push_response(encode_frame(1, &TOKENS));

    let aggregator = Aggregator::new(8);
    let backend = RecordingTimeSeries::new();
    let dispatcher = Dispatcher::new(TimeSeriesSink::new("solarpi", backend.clone()));
    let dispatcher = tokio::spawn(dispatcher.run(aggregator.subscribe()));

    let mut poller = Poller::new(inverter(&link), Duration::from_secs(10), 2, aggregator.sender());
    let aggregator = tokio::spawn(aggregator.run());

    assert_eq!(poller.tick().await, PollOutcome::Emitted);
    drop(poller);

    assert_eq!(aggregator.await.unwrap(), 1);
    let dispatcher = dispatcher.await.unwrap();
    assert_eq!(dispatcher.state(), DispatcherState::Ready);

    let writes = backend.writes();
    assert_eq!(writes.len(), 1);
    let (bucket, point) = &writes[0];
    assert_eq!(bucket, "solarpi");
    assert_eq!(point.measurement, "WR Garage");
    assert_eq!(point.tags, vec![("device".to_string(), "WR Garage".to_string())]);
    assert_eq!(point.fields.len(), 9);
    assert_eq!(point.fields.get("status"), Some(FieldValue::Int(4)));
    assert_eq!(point.fields.get("generatorstrom"), Some(FieldValue::Float(0.43 * 1000.0)));
    assert_eq!(point.fields.get("einspeisestrom"), Some(FieldValue::Float(0.59 * 1000.0)));
    assert_eq!(point.fields.get("tagesertrag"), Some(FieldValue::Float(1627.0)));
    assert!(point.timestamp <= chrono::Utc::now());
}

#[tokio::test]
async fn short_frames_never_reach_a_sink() {
    let link = MemoryLink::new();
    link.repeat_response(vec![b'*'; 10]);

    let aggregator = Aggregator::new(8);
    let backend = RecordingTimeSeries::new();
    let dispatcher = Dispatcher::new(TimeSeriesSink::new("solarpi", backend.clone()));
    let dispatcher = tokio::spawn(dispatcher.run(aggregator.subscribe()));

    let mut poller = Poller::new(inverter(&link), Duration::from_secs(10), 2, aggregator.sender());
    let aggregator = tokio::spawn(aggregator.run());

    assert_eq!(poller.tick().await, PollOutcome::Skipped);
    assert_eq!(link.read_count(), 3);
    drop(poller);

    assert_eq!(aggregator.await.unwrap(), 0);
    let dispatcher = dispatcher.await.unwrap();
    assert_eq!(dispatcher.state(), DispatcherState::NeedsInit);
    assert_eq!(backend.opens(), 0);
    assert!(backend.writes().is_empty());
}

#[tokio::test]
async fn failing_sink_does_not_affect_the_other() {
    let link = MemoryLink::new();
    link.repeat_response(encode_frame(1, &TOKENS));

    let aggregator = Aggregator::new(16);
    let broken = RecordingPubSub::new();
    broken.fail_publishes(true);
    let healthy = RecordingTimeSeries::new();

    let a = tokio::spawn(
        Dispatcher::new(PubSubSink::new("localhost", 1883, "solarpi", broken.clone()))
            .run(aggregator.subscribe()),
    );
    let b = tokio::spawn(
        Dispatcher::new(TimeSeriesSink::new("solarpi", healthy.clone())).run(aggregator.subscribe()),
    );

    let mut poller = Poller::new(inverter(&link), Duration::from_secs(10), 0, aggregator.sender());
    let aggregator = tokio::spawn(aggregator.run());
    for _ in 0..5 {
        assert_eq!(poller.tick().await, PollOutcome::Emitted);
    }
    drop(poller);
    aggregator.await.unwrap();

    let a = a.await.unwrap();
    assert_eq!(a.published(), 0);
    assert_eq!(a.dropped(), 5);
    // Every failed publish forces a fresh connect on the next measurement.
    assert_eq!(broken.connects().len(), 5);
    assert!(broken.messages().is_empty());

    let b = b.await.unwrap();
    assert_eq!(b.published(), 5);
    let writes = healthy.writes();
    assert_eq!(writes.len(), 5);
    for (_, point) in &writes {
        assert_eq!(point.measurement, "WR Garage");
        assert_eq!(point.fields.get("temperatur"), Some(FieldValue::Float(34.0)));
    }
}

#[tokio::test]
async fn unreachable_broker_is_given_up_while_the_other_sink_keeps_writing() {
    let link = MemoryLink::new();
    link.repeat_response(encode_frame(1, &TOKENS));

    let aggregator = Aggregator::new(16);
    let broker = RecordingPubSub::new();
    broker.fail_connects(DEFAULT_SINK_MAX_RETRIES + 2);
    let healthy = RecordingTimeSeries::new();

    let a = tokio::spawn(
        Dispatcher::new(PubSubSink::new("localhost", 1883, "solarpi", broker.clone()))
            .run(aggregator.subscribe()),
    );
    let b = tokio::spawn(
        Dispatcher::new(TimeSeriesSink::new("solarpi", healthy.clone())).run(aggregator.subscribe()),
    );

    let mut poller = Poller::new(inverter(&link), Duration::from_secs(10), 0, aggregator.sender());
    let aggregator = tokio::spawn(aggregator.run());
    for _ in 0..8 {
        assert_eq!(poller.tick().await, PollOutcome::Emitted);
    }
    drop(poller);
    assert_eq!(aggregator.await.unwrap(), 8);

    let a = a.await.unwrap();
    assert_eq!(a.state(), DispatcherState::GivenUp);
    assert_eq!(a.connection_state(), ConnectionState::Disconnected);
    assert_eq!(a.published(), 0);
    assert_eq!(broker.connects().len(), DEFAULT_SINK_MAX_RETRIES as usize);
    assert!(broker.messages().is_empty());

    let b = b.await.unwrap();
    assert_eq!(b.state(), DispatcherState::Ready);
    assert_eq!(b.published(), 8);
    assert_eq!(healthy.writes().len(), 8);
}

#[tokio::test]
async fn pipeline_runs_until_shutdown() {
    let link = MemoryLink::new();
    link.repeat_response(encode_frame(1, &TOKENS));
    let config = Config {
        inverters: vec![InverterConfig {
            name: Some("WR Garage".to_string()),
            bus_address: 1,
            interval_seconds: 3600,
        }],
        ..Config::default()
    };
    let pipeline = Pipeline::with_transport(config, Transport::new(link.clone()));

    let backend = RecordingTimeSeries::new();
    let sinks: Vec<Box<dyn Sink>> = vec![Box::new(TimeSeriesSink::new("solarpi", backend.clone()))];
    let watched = backend.clone();
    let first_write = async move {
        while watched.writes().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };

    let report = tokio::time::timeout(Duration::from_secs(5), pipeline.run_until(sinks, first_write))
        .await
        .expect("pipeline did not deliver the first reading");

    assert_eq!(report.emitted, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.forwarded, 1);
    assert_eq!(report.sinks.len(), 1);
    assert_eq!(report.sinks[0].published, 1);
    assert_eq!(report.sinks[0].connection, ConnectionState::Connected);
    assert_eq!(link.writes(), vec![b"#010\r".to_vec()]);
}
