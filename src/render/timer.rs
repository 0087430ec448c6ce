//! GPU timestamp benchmarking of the two eye passes.
//!
//! Three timestamps are written on a benchmarked frame: at the start of the
//! first eye's pass, at the end of the first eye's pass, and at the end of the
//! second eye's pass. The readback is polled once per frame instead of
//! spinning, and no new benchmark starts until the previous one is reported,
//! so the query slots are never overwritten while a result is pending.

use std::fmt;
use std::sync::mpsc::{self, Receiver, TryRecvError};

use thiserror::Error;

use crate::stereo::Eye;

/// Number of timestamp slots: frame start, eye split, frame end.
pub const TIMESTAMP_COUNT: u32 = 3;

const TICK_BYTES: usize = std::mem::size_of::<u64>();

const NANOS_PER_MILLI: f64 = 1_000_000.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimerError {
    #[error("cannot {action} while the benchmark is {phase:?}")]
    InvalidTransition {
        phase: TimerPhase,
        action: &'static str,
    },
    #[error("timestamps are not monotonic: start={start} mid={mid} end={end}")]
    NonMonotonic { start: u64, mid: u64, end: u64 },
    #[error("timestamp readback failed: {0}")]
    Readback(String),
}

/// Where the current benchmark stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerPhase {
    #[default]
    Idle,
    /// Frame-start timestamp recorded.
    Armed,
    /// Eye-split timestamp recorded after the first eye.
    MidSubmitted,
    /// Frame-end timestamp recorded after the second eye.
    EndSubmitted,
    /// Commands submitted; waiting for the device to hand the values back.
    Draining,
}

/// Durations of one benchmarked frame, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingReport {
    pub first_eye_ms: f64,
    pub second_eye_ms: f64,
    pub full_frame_ms: f64,
}

impl TimingReport {
    /// Converts raw device ticks using the queue's nanoseconds-per-tick period.
    pub fn from_ticks(ticks: [u64; 3], period_ns: f32) -> Result<Self, TimerError> {
        let [start, mid, end] = ticks;
        if !(start <= mid && mid <= end) {
            return Err(TimerError::NonMonotonic { start, mid, end });
        }
        let to_ms = |delta: u64| delta as f64 * f64::from(period_ns) / NANOS_PER_MILLI;
        Ok(Self {
            first_eye_ms: to_ms(mid - start),
            second_eye_ms: to_ms(end - mid),
            full_frame_ms: to_ms(end - start),
        })
    }
}

impl fmt::Display for TimingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "First Eye: {:.6} ms", self.first_eye_ms)?;
        writeln!(f, "Second Eye: {:.6} ms", self.second_eye_ms)?;
        write!(f, "Full Frame: {:.6} ms", self.full_frame_ms)
    }
}

/// Device-independent benchmark state machine.
#[derive(Debug, Default)]
pub struct TimerProtocol {
    phase: TimerPhase,
}

impl TimerProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    /// Starts a benchmark if one was requested and none is in flight.
    pub fn arm(&mut self, requested: bool) -> bool {
        if requested && self.phase == TimerPhase::Idle {
            self.phase = TimerPhase::Armed;
            true
        } else {
            false
        }
    }

    pub fn mark_mid(&mut self) -> Result<(), TimerError> {
        self.advance(TimerPhase::Armed, TimerPhase::MidSubmitted, "mark the eye split")
    }

    pub fn mark_end(&mut self) -> Result<(), TimerError> {
        self.advance(TimerPhase::MidSubmitted, TimerPhase::EndSubmitted, "mark the frame end")
    }

    pub fn submitted(&mut self) -> Result<(), TimerError> {
        self.advance(TimerPhase::EndSubmitted, TimerPhase::Draining, "start draining")
    }

    /// Finishes a drained benchmark and returns to idle.
    ///
    /// The protocol is idle afterwards even if the values are rejected.
    pub fn complete(&mut self, ticks: [u64; 3], period_ns: f32) -> Result<TimingReport, TimerError> {
        if self.phase != TimerPhase::Draining {
            return Err(TimerError::InvalidTransition {
                phase: self.phase,
                action: "report",
            });
        }
        self.phase = TimerPhase::Idle;
        TimingReport::from_ticks(ticks, period_ns)
    }

    /// Drops an in-flight benchmark, e.g. when the frame never reached the GPU.
    pub fn abandon(&mut self) {
        self.phase = TimerPhase::Idle;
    }

    fn advance(
        &mut self,
        from: TimerPhase,
        to: TimerPhase,
        action: &'static str,
    ) -> Result<(), TimerError> {
        if self.phase != from {
            return Err(TimerError::InvalidTransition {
                phase: self.phase,
                action,
            });
        }
        self.phase = to;
        Ok(())
    }
}

/// Query slots one eye's render pass writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassTimestamps {
    pub beginning: Option<u32>,
    pub end: Option<u32>,
}

/// Slots for `eye`'s pass, or `None` when the frame is not benchmarked.
///
/// The first eye records the frame start and the eye split; the second eye
/// only records the frame end.
pub fn pass_timestamps(timed: bool, eye: Eye) -> Option<PassTimestamps> {
    if !timed {
        return None;
    }
    Some(match eye {
        Eye::Left => PassTimestamps {
            beginning: Some(0),
            end: Some(1),
        },
        Eye::Right => PassTimestamps {
            beginning: None,
            end: Some(2),
        },
    })
}

/// Decodes the resolved query buffer into start, split and end ticks.
pub fn ticks_from_bytes(bytes: &[u8]) -> Result<[u64; 3], TimerError> {
    let expected = TIMESTAMP_COUNT as usize * TICK_BYTES;
    if bytes.len() != expected {
        return Err(TimerError::Readback(format!(
            "expected {expected} bytes of timestamps, got {}",
            bytes.len()
        )));
    }
    let mut ticks = [0u64; TIMESTAMP_COUNT as usize];
    for (tick, chunk) in ticks.iter_mut().zip(bytes.chunks_exact(TICK_BYTES)) {
        let mut raw = [0u8; TICK_BYTES];
        raw.copy_from_slice(chunk);
        *tick = u64::from_le_bytes(raw);
    }
    Ok(ticks)
}

type MapResult = Result<(), wgpu::BufferAsyncError>;

/// Query set, resolve and readback buffers for the benchmark.
pub struct GpuTimer {
    protocol: TimerProtocol,
    query_set: wgpu::QuerySet,
    resolve_buffer: wgpu::Buffer,
    readback_buffer: wgpu::Buffer,
    period_ns: f32,
    pending_map: Option<Receiver<MapResult>>,
}

impl GpuTimer {
    const BUFFER_SIZE: u64 = TIMESTAMP_COUNT as u64 * wgpu::QUERY_SIZE as u64;

    /// Allocates the timestamp resources. The device must have been created
    /// with [`wgpu::Features::TIMESTAMP_QUERY`].
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("eye-timestamps"),
            ty: wgpu::QueryType::Timestamp,
            count: TIMESTAMP_COUNT,
        });
        let resolve_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("timestamp-resolve"),
            size: Self::BUFFER_SIZE,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("timestamp-readback"),
            size: Self::BUFFER_SIZE,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            protocol: TimerProtocol::new(),
            query_set,
            resolve_buffer,
            readback_buffer,
            period_ns: queue.get_timestamp_period(),
            pending_map: None,
        }
    }

    /// Arms the benchmark for this frame when requested and idle.
    pub fn begin_frame(&mut self, requested: bool) -> bool {
        let armed = self.protocol.arm(requested);
        if armed {
            log::debug!("benchmark armed");
        } else if requested {
            log::trace!("benchmark request ignored while {:?}", self.protocol.phase());
        }
        armed
    }

    /// Timestamp writes for `eye`'s pass on a benchmarked frame.
    pub fn pass_writes(&self, timed: bool, eye: Eye) -> Option<wgpu::RenderPassTimestampWrites<'_>> {
        let slots = pass_timestamps(timed, eye)?;
        Some(wgpu::RenderPassTimestampWrites {
            query_set: &self.query_set,
            beginning_of_pass_write_index: slots.beginning,
            end_of_pass_write_index: slots.end,
        })
    }

    pub fn first_eye_recorded(&mut self) -> Result<(), TimerError> {
        self.protocol.mark_mid()
    }

    /// Marks the frame end and copies the timestamps into the readback buffer.
    pub fn second_eye_recorded(&mut self, encoder: &mut wgpu::CommandEncoder) -> Result<(), TimerError> {
        self.protocol.mark_end()?;
        encoder.resolve_query_set(&self.query_set, 0..TIMESTAMP_COUNT, &self.resolve_buffer, 0);
        encoder.copy_buffer_to_buffer(
            &self.resolve_buffer,
            0,
            &self.readback_buffer,
            0,
            Self::BUFFER_SIZE,
        );
        Ok(())
    }

    /// Requests the readback once the frame's commands are queued.
    pub fn after_submit(&mut self) -> Result<(), TimerError> {
        self.protocol.submitted()?;
        let (sender, receiver) = mpsc::channel();
        self.readback_buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = sender.send(result);
            });
        self.pending_map = Some(receiver);
        Ok(())
    }

    /// Discards a benchmark whose frame was not submitted.
    pub fn abandon(&mut self) {
        if self.protocol.phase() != TimerPhase::Draining {
            self.protocol.abandon();
        }
    }

    /// Checks, without blocking, whether the device has returned the values.
    pub fn poll(&mut self, device: &wgpu::Device) -> Option<Result<TimingReport, TimerError>> {
        let receiver = self.pending_map.as_ref()?;
        if let Err(err) = device.poll(wgpu::PollType::Poll) {
            log::warn!("device poll failed: {err}");
        }
        let outcome = match receiver.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(wgpu::BufferAsyncError),
        };
        self.pending_map = None;

        if let Err(err) = outcome {
            self.protocol.abandon();
            return Some(Err(TimerError::Readback(err.to_string())));
        }

        let ticks = ticks_from_bytes(&self.readback_buffer.slice(..).get_mapped_range());
        self.readback_buffer.unmap();
        match ticks {
            Ok(ticks) => Some(self.protocol.complete(ticks, self.period_ns)),
            Err(err) => {
                self.protocol.abandon();
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drained(protocol: &mut TimerProtocol) {
        assert!(protocol.arm(true));
        protocol.mark_mid().unwrap();
        protocol.mark_end().unwrap();
        protocol.submitted().unwrap();
        assert_eq!(protocol.phase(), TimerPhase::Draining);
    }

    #[test]
    fn full_cycle_reports_milliseconds() {
        let mut protocol = TimerProtocol::new();
        drained(&mut protocol);
        let report = protocol
            .complete([1_000_000, 3_500_000, 7_000_000], 1.0)
            .unwrap();
        assert_eq!(report.first_eye_ms, 2.5);
        assert_eq!(report.second_eye_ms, 3.5);
        assert_eq!(report.full_frame_ms, 6.0);
        assert_eq!(protocol.phase(), TimerPhase::Idle);
    }

    #[test]
    fn tick_period_scales_durations() {
        let report = TimingReport::from_ticks([0, 1_000, 3_000], 2.0).unwrap();
        assert_eq!(report.first_eye_ms, 0.002);
        assert_eq!(report.full_frame_ms, 0.006);
    }

    #[test]
    fn no_trigger_means_no_benchmark() {
        let mut protocol = TimerProtocol::new();
        for _ in 0..10 {
            assert!(!protocol.arm(false));
        }
        assert_eq!(protocol.phase(), TimerPhase::Idle);
        assert!(protocol.mark_mid().is_err());
    }

    #[test]
    fn held_trigger_does_not_rearm_while_draining() {
        let mut protocol = TimerProtocol::new();
        drained(&mut protocol);
        assert!(!protocol.arm(true));
        assert_eq!(protocol.phase(), TimerPhase::Draining);
        protocol.complete([0, 1, 2], 1.0).unwrap();
        assert!(protocol.arm(true));
    }

    #[test]
    fn non_monotonic_timestamps_are_rejected() {
        let mut protocol = TimerProtocol::new();
        drained(&mut protocol);
        let err = protocol.complete([10, 5, 20], 1.0).unwrap_err();
        assert_eq!(
            err,
            TimerError::NonMonotonic {
                start: 10,
                mid: 5,
                end: 20
            }
        );
        assert_eq!(protocol.phase(), TimerPhase::Idle);
    }

    #[test]
    fn equal_timestamps_are_accepted() {
        let report = TimingReport::from_ticks([7, 7, 7], 1.0).unwrap();
        assert_eq!(report.full_frame_ms, 0.0);
    }

    #[test]
    fn out_of_order_transitions_are_rejected() {
        let mut protocol = TimerProtocol::new();
        assert!(protocol.arm(true));
        assert!(protocol.mark_end().is_err());
        assert!(protocol.submitted().is_err());
        assert!(protocol.complete([0, 0, 0], 1.0).is_err());
        assert_eq!(protocol.phase(), TimerPhase::Armed);
        protocol.abandon();
        assert_eq!(protocol.phase(), TimerPhase::Idle);
    }

    #[test]
    fn untimed_frames_write_no_timestamps() {
        assert_eq!(pass_timestamps(false, Eye::Left), None);
        assert_eq!(pass_timestamps(false, Eye::Right), None);
    }

    #[test]
    fn timed_frames_split_slots_between_the_eyes() {
        assert_eq!(
            pass_timestamps(true, Eye::Left),
            Some(PassTimestamps {
                beginning: Some(0),
                end: Some(1)
            })
        );
        assert_eq!(
            pass_timestamps(true, Eye::Right),
            Some(PassTimestamps {
                beginning: None,
                end: Some(2)
            })
        );
    }

    #[test]
    fn readback_bytes_decode_little_endian() {
        let mut bytes = Vec::new();
        for tick in [1u64, 0x0102_0304_0506_0708, u64::MAX] {
            bytes.extend_from_slice(&tick.to_le_bytes());
        }
        assert_eq!(
            ticks_from_bytes(&bytes),
            Ok([1, 0x0102_0304_0506_0708, u64::MAX])
        );
    }

    #[test]
    fn short_readback_is_an_error() {
        let bytes = [0u8; 20];
        assert!(matches!(
            ticks_from_bytes(&bytes),
            Err(TimerError::Readback(_))
        ));
        assert!(ticks_from_bytes(&[]).is_err());
    }

    #[test]
    fn report_prints_three_labelled_lines() {
        let report = TimingReport {
            first_eye_ms: 1.5,
            second_eye_ms: 0.25,
            full_frame_ms: 1.75,
        };
        assert_eq!(
            report.to_string(),
            "First Eye: 1.500000 ms\nSecond Eye: 0.250000 ms\nFull Frame: 1.750000 ms"
        );
    }
}
