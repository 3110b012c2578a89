// Integration tests for the capture path: mute gating, session gating and
// what actually reaches the channel.

use notebook_voice::audio::{pcm, AudioFrame};
use notebook_voice::channel::MemoryChannel;
use notebook_voice::pipeline::{CaptureCounters, CaptureGate, CapturePipeline, FrameOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn tone(len: usize, rate: u32) -> Vec<f32> {
    (0..len)
        .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate as f32).sin() * 0.8)
        .collect()
}

fn frame(rate: u32) -> AudioFrame {
    AudioFrame {
        samples: tone(4096, rate),
        sample_rate: rate,
        timestamp_ms: 0,
    }
}

fn pipeline(
    channel: &MemoryChannel,
    gate: &Arc<CaptureGate>,
) -> (CapturePipeline, Arc<CaptureCounters>) {
    let counters = Arc::new(CaptureCounters::default());
    let (pipeline, _level) = CapturePipeline::new(
        Arc::new(channel.clone()),
        Arc::clone(gate),
        16000,
        Arc::clone(&counters),
    );
    (pipeline, counters)
}

#[test]
fn test_muted_frames_never_reach_channel() {
    let channel = MemoryChannel::new();
    let gate = CaptureGate::new(true);
    gate.set_session_id(Some("s1".into()));
    let (mut pipeline, counters) = pipeline(&channel, &gate);

    for _ in 0..20 {
        assert_eq!(pipeline.process_frame(&frame(16000)), FrameOutcome::DroppedMuted);
    }

    assert!(channel.sent_frames().is_empty());
    assert_eq!(counters.sent(), 0);
    assert_eq!(counters.dropped(), 20);
}

#[test]
fn test_frames_without_session_are_dropped() {
    let channel = MemoryChannel::new();
    let gate = CaptureGate::new(false);
    let (mut pipeline, _counters) = pipeline(&channel, &gate);

    assert_eq!(
        pipeline.process_frame(&frame(16000)),
        FrameOutcome::DroppedNoSession
    );
    assert!(channel.sent_frames().is_empty());
}

#[test]
fn test_gate_changes_apply_to_next_frame() {
    let channel = MemoryChannel::new();
    let gate = CaptureGate::new(false);
    let (mut pipeline, _counters) = pipeline(&channel, &gate);

    gate.set_session_id(Some("s1".into()));
    assert_eq!(pipeline.process_frame(&frame(16000)), FrameOutcome::Sent);

    gate.toggle_muted();
    assert_eq!(pipeline.process_frame(&frame(16000)), FrameOutcome::DroppedMuted);

    gate.toggle_muted();
    gate.set_session_id(Some("s2".into()));
    assert_eq!(pipeline.process_frame(&frame(16000)), FrameOutcome::Sent);

    let sent = channel.sent_frames();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].session_id, "s1");
    assert_eq!(sent[1].session_id, "s2");
}

#[test]
fn test_sent_frames_are_pcm16_at_wire_rate() {
    let channel = MemoryChannel::new();
    let gate = CaptureGate::new(false);
    gate.set_session_id(Some("s1".into()));
    let (mut pipeline, _counters) = pipeline(&channel, &gate);

    pipeline.process_frame(&frame(48000));
    pipeline.process_frame(&frame(16000));

    let sent = channel.sent_frames();
    let downsampled = pcm::decode_samples(&sent[0].audio_data).unwrap();
    let native = pcm::decode_samples(&sent[1].audio_data).unwrap();
    assert_eq!(downsampled.len(), 1365);
    assert_eq!(native.len(), 4096);
}

#[tokio::test]
async fn test_level_is_metered_even_while_muted() {
    let channel = MemoryChannel::new();
    let gate = CaptureGate::new(true);
    let counters = Arc::new(CaptureCounters::default());
    let (pipeline, mut level) =
        CapturePipeline::new(Arc::new(channel.clone()), gate, 16000, counters);

    let (tx, rx) = mpsc::channel(4);
    let task = pipeline.spawn(rx);

    tx.send(frame(16000)).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), level.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(*level.borrow() > 0.0);
    assert!(channel.sent_frames().is_empty());

    // Closing the frame stream ends the pipeline and zeroes the meter
    drop(tx);
    task.await.unwrap();
    assert_eq!(*level.borrow(), 0.0);
}
