mod common;

use std::time::Duration;

use common::{ProbeEvent, TestProbe};
use futures_util::StreamExt;
use pullstream::{
    empty, failed, from_iter, from_stream, into_stream, switch_if_empty, Publisher,
    StreamBridgeConfig, StreamError,
};

#[tokio::test]
async fn into_stream_collects_items_and_completion() {
    let out = into_stream(from_iter(vec![1, 2, 3]), StreamBridgeConfig::default());
    let collected: Vec<_> = out.collect().await;

    assert_eq!(collected, vec![Ok(1), Ok(2), Ok(3)]);
}

#[tokio::test]
async fn into_stream_surfaces_upstream_error_as_final_element() {
    let out = into_stream(
        failed::<i32>(StreamError::Custom("broken".to_string())),
        StreamBridgeConfig::default(),
    );
    let collected: Vec<_> = out.collect().await;

    assert_eq!(
        collected,
        vec![Err(StreamError::Custom("broken".to_string()))]
    );
}

#[tokio::test]
async fn into_stream_windows_credit_with_small_buffers() {
    let config = StreamBridgeConfig {
        buffer_size: 2,
        refill_watermark: 1,
    };
    let out = into_stream(from_iter(0..50), config);
    let collected: Vec<_> = out.collect().await;

    assert_eq!(collected.len(), 50);
    assert!(collected.iter().all(|item| item.is_ok()));
}

#[tokio::test]
async fn from_stream_pumps_items_under_credit() {
    let probe = TestProbe::<i32>::requesting(u64::MAX);
    from_stream(futures_util::stream::iter(vec![1, 2, 3])).subscribe(probe.clone());

    tokio::time::timeout(Duration::from_secs(5), async {
        while !probe.is_completed() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("pump did not complete in time");

    assert_eq!(probe.items(), vec![1, 2, 3]);
}

#[tokio::test]
async fn from_stream_waits_for_credit() {
    let probe = TestProbe::<i32>::new();
    from_stream(futures_util::stream::iter(vec![1, 2, 3])).subscribe(probe.clone());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(probe.items().is_empty());

    probe.request(u64::MAX);
    tokio::time::timeout(Duration::from_secs(5), async {
        while !probe.is_completed() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("pump did not complete after credit arrived");

    assert_eq!(probe.items(), vec![1, 2, 3]);
}

#[tokio::test]
async fn from_stream_supports_only_one_subscription() {
    let source = from_stream(futures_util::stream::iter(vec![1]));

    let first = TestProbe::<i32>::requesting(u64::MAX);
    source.subscribe(first.clone());

    let second = TestProbe::<i32>::requesting(u64::MAX);
    source.subscribe(second.clone());

    let errors = second.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], StreamError::Custom(_)));
}

#[tokio::test]
async fn round_trip_through_the_switch_operator() {
    let primary = empty::<i32>();
    let fallback = from_stream(futures_util::stream::iter(vec![7, 8]));
    let switched = switch_if_empty(primary, vec![fallback]);

    let collected: Vec<_> = into_stream(switched, StreamBridgeConfig::default())
        .collect()
        .await;

    assert_eq!(collected, vec![Ok(7), Ok(8)]);
}

#[tokio::test]
async fn dropping_the_consumer_stream_cancels_upstream() {
    let probe_side = common::SilentPublisher::new();

    let out = into_stream::<i32>(
        probe_side.clone() as pullstream::SharedPublisher<i32>,
        StreamBridgeConfig::default(),
    );
    drop(out);

    assert!(probe_side.handle.is_cancelled());
}

#[tokio::test]
async fn cancel_mid_pump_stops_without_terminal() {
    let probe = TestProbe::<i32>::requesting(u64::MAX).cancel_after_items(1);
    from_stream(futures_util::stream::iter(0..1_000_000)).subscribe(probe.clone());

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!probe.is_completed());
    assert!(probe.errors().is_empty());
    assert!((probe.items().len() as u64) < 1_000_000);
}

#[test]
fn bridge_config_defaults_are_sane() {
    let config = StreamBridgeConfig::default();
    assert!(config.buffer_size >= config.refill_watermark);
    assert!(config.refill_watermark > 0);
}

#[test]
fn into_stream_events_match_probe_observation() {
    use tokio::runtime::Runtime;

    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let collected: Vec<_> = into_stream(from_iter(vec![9]), StreamBridgeConfig::default())
            .collect()
            .await;
        assert_eq!(collected, vec![Ok(9)]);

        let probe = TestProbe::<i32>::requesting(u64::MAX);
        from_iter(vec![9]).subscribe(probe.clone());
        assert_eq!(
            probe.events(),
            vec![ProbeEvent::Start, ProbeEvent::Item(9), ProbeEvent::Complete]
        );
    });
}
