use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Frames between average-cost log lines.
const REPORT_INTERVAL: u32 = 120;

const QUERY_COUNT: u32 = 2;
const RESOLVE_SIZE: u64 = QUERY_COUNT as u64 * 8;

/// Optional per-frame GPU cost measurement via timestamp queries.
///
/// One query pair brackets the whole frame's compute work. Readback never
/// blocks the frame: results are mapped asynchronously and harvested on a
/// later frame. While a readback is in flight, new frames go untimed.
/// Timestamps whose delta is not positive (a timer discontinuity) are
/// discarded without logging.
pub struct GpuTimer {
    query_set: wgpu::QuerySet,
    resolve_buffer: wgpu::Buffer,
    readback_buffer: wgpu::Buffer,
    /// Nanoseconds per timestamp tick.
    period: f32,
    /// True between `after_submit` and a successful harvest.
    in_flight: bool,
    /// True while the current encoder carries the query pair.
    armed: bool,
    map_done: Arc<AtomicBool>,
    accumulated_ms: f64,
    timed_frames: u32,
}

impl GpuTimer {
    const REQUIRED: wgpu::Features = wgpu::Features::TIMESTAMP_QUERY
        .union(wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS);

    /// `None` when the device lacks timestamp support; the caller runs
    /// untimed in that case.
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Option<Self> {
        if !device.features().contains(Self::REQUIRED) {
            log::info!("timestamp queries unavailable; frame timing disabled");
            return None;
        }
        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("clarity frame timer"),
            ty: wgpu::QueryType::Timestamp,
            count: QUERY_COUNT,
        });
        let resolve_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("clarity timer resolve"),
            size: RESOLVE_SIZE,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("clarity timer readback"),
            size: RESOLVE_SIZE,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Some(Self {
            query_set,
            resolve_buffer,
            readback_buffer,
            period: queue.get_timestamp_period(),
            in_flight: false,
            armed: false,
            map_done: Arc::new(AtomicBool::new(false)),
            accumulated_ms: 0.0,
            timed_frames: 0,
        })
    }

    /// Writes the opening timestamp unless a readback is still in flight.
    pub fn begin_frame(&mut self, encoder: &mut wgpu::CommandEncoder) {
        if self.in_flight {
            return;
        }
        encoder.write_timestamp(&self.query_set, 0);
        self.armed = true;
    }

    /// Writes the closing timestamp and schedules resolve plus copy-out.
    pub fn end_frame(&mut self, encoder: &mut wgpu::CommandEncoder) {
        if !self.armed {
            return;
        }
        encoder.write_timestamp(&self.query_set, 1);
        encoder.resolve_query_set(&self.query_set, 0..QUERY_COUNT, &self.resolve_buffer, 0);
        encoder.copy_buffer_to_buffer(
            &self.resolve_buffer,
            0,
            &self.readback_buffer,
            0,
            RESOLVE_SIZE,
        );
    }

    /// Kicks off the asynchronous map once the commands are submitted.
    pub fn after_submit(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        self.in_flight = true;
        self.map_done.store(false, Ordering::Release);
        let done = Arc::clone(&self.map_done);
        self.readback_buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                if result.is_ok() {
                    done.store(true, Ordering::Release);
                }
            });
    }

    /// Collects a finished readback if one is available. Never blocks.
    pub fn harvest(&mut self, device: &wgpu::Device) {
        if !self.in_flight {
            return;
        }
        let _ = device.poll(wgpu::PollType::Poll);
        if !self.map_done.load(Ordering::Acquire) {
            return;
        }
        let stamps: [u64; 2] = {
            let view = self.readback_buffer.slice(..).get_mapped_range();
            let raw: &[u64] = bytemuck::cast_slice(&view);
            [raw[0], raw[1]]
        };
        self.readback_buffer.unmap();
        self.in_flight = false;

        if stamps[1] <= stamps[0] {
            return;
        }
        let ns = (stamps[1] - stamps[0]) as f64 * self.period as f64;
        self.accumulated_ms += ns / 1.0e6;
        self.timed_frames += 1;

        if self.timed_frames >= REPORT_INTERVAL {
            log::info!(
                "frame post-processing: {:.3} ms average over {} timed frames",
                self.accumulated_ms / self.timed_frames as f64,
                self.timed_frames
            );
            self.accumulated_ms = 0.0;
            self.timed_frames = 0;
        }
    }
}
