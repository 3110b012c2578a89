// Integration tests for gapless playback scheduling
//
// A headless sink driven by a manual clock makes every start time exact.

use notebook_voice::audio::{pcm, HeadlessSinkFactory, ManualClock};
use notebook_voice::pipeline::PlaybackScheduler;
use std::sync::Arc;

const EPSILON: f64 = 1e-9;

fn chunk(rate: u32, seconds: f64) -> String {
    pcm::encode_samples(&vec![0.25f32; (rate as f64 * seconds) as usize])
}

fn mime(rate: u32) -> String {
    format!("audio/pcm;rate={rate}")
}

fn scheduler() -> (PlaybackScheduler, HeadlessSinkFactory, Arc<ManualClock>) {
    let clock = ManualClock::new();
    let sinks = HeadlessSinkFactory::manual(Arc::clone(&clock));
    let scheduler = PlaybackScheduler::new(Arc::new(sinks.clone()));
    (scheduler, sinks, clock)
}

#[test]
fn test_back_to_back_chunks_are_contiguous() {
    let (mut scheduler, _sinks, _clock) = scheduler();

    let first = scheduler.schedule(&chunk(24000, 1.0), Some(&mime(24000))).unwrap();
    let second = scheduler.schedule(&chunk(24000, 1.0), Some(&mime(24000))).unwrap();

    assert!((first.duration - 1.0).abs() < EPSILON);
    assert!((second.start_time - (first.start_time + 1.0)).abs() < EPSILON);
    assert!((scheduler.playback_clock() - 2.0).abs() < EPSILON);
}

#[test]
fn test_late_chunk_starts_now_not_at_stale_clock() {
    let (mut scheduler, _sinks, clock) = scheduler();

    scheduler.schedule(&chunk(24000, 0.5), None).unwrap();
    // The first chunk drained long ago
    clock.advance(3.0);
    let late = scheduler.schedule(&chunk(24000, 0.5), None).unwrap();

    assert!((late.start_time - 3.0).abs() < EPSILON);
}

#[test]
fn test_chunk_arriving_mid_playback_waits_for_previous_end() {
    let (mut scheduler, _sinks, clock) = scheduler();

    scheduler.schedule(&chunk(24000, 1.0), None).unwrap();
    clock.advance(0.4);
    let next = scheduler.schedule(&chunk(24000, 1.0), None).unwrap();

    assert!((next.start_time - 1.0).abs() < EPSILON);
}

#[test]
fn test_missing_rate_defaults_to_24k() {
    let (mut scheduler, _sinks, _clock) = scheduler();

    let scheduled = scheduler.schedule(&chunk(24000, 1.0), None).unwrap();

    assert_eq!(scheduled.sample_rate, 24000);
    assert_eq!(scheduler.sink_rate(), Some(24000));
}

#[test]
fn test_rate_change_rebuilds_sink_with_fresh_clock() {
    let (mut scheduler, sinks, _clock) = scheduler();

    let first = scheduler.schedule(&chunk(24000, 1.0), Some(&mime(24000))).unwrap();
    let second = scheduler.schedule(&chunk(16000, 1.0), Some(&mime(16000))).unwrap();

    assert!((first.start_time - 0.0).abs() < EPSILON);
    // Not constrained by the first chunk's end at 1.0
    assert!((second.start_time - 0.0).abs() < EPSILON);
    assert_eq!(second.sample_rate, 16000);
    assert_eq!(sinks.sinks_created(), 2);
    assert_eq!(sinks.sinks_closed(), 1);

    let records = sinks.records();
    assert_eq!(records[0].sink_index, 0);
    assert_eq!(records[1].sink_index, 1);
}

#[test]
fn test_reset_discards_future_audio() {
    let (mut scheduler, sinks, clock) = scheduler();

    let a = scheduler.schedule(&chunk(24000, 2.0), None).unwrap();
    assert!((a.start_time + a.duration - 2.0).abs() < EPSILON);

    clock.advance(0.5);
    scheduler.reset();
    assert_eq!(scheduler.playback_clock(), 0.0);
    assert_eq!(scheduler.sink_rate(), None);
    assert_eq!(sinks.sinks_closed(), 1);

    let b = scheduler.schedule(&chunk(24000, 1.0), None).unwrap();
    // Starts now on the new sink, not at a's end
    assert!((b.start_time - 0.0).abs() < EPSILON);
    assert_eq!(sinks.records().last().unwrap().sink_index, 1);
}

#[test]
fn test_malformed_chunk_leaves_queue_intact() {
    let (mut scheduler, sinks, _clock) = scheduler();

    scheduler.schedule(&chunk(24000, 1.0), None).unwrap();
    assert!(scheduler.schedule("%%%", Some(&mime(16000))).is_err());

    // The rejected chunk declared a new rate but never touched the sink
    assert_eq!(sinks.sinks_closed(), 0);
    let next = scheduler.schedule(&chunk(24000, 1.0), None).unwrap();
    assert!((next.start_time - 1.0).abs() < EPSILON);
}

#[test]
fn test_dropping_scheduler_closes_sink() {
    let (mut scheduler, sinks, _clock) = scheduler();
    scheduler.schedule(&chunk(24000, 0.1), None).unwrap();

    drop(scheduler);

    assert_eq!(sinks.sinks_closed(), 1);
}
