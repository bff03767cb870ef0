//! The gather strategy family: one small stateless computation per metric
//! shape, each writing exactly one field of the output blob.
//!
//! A strategy is constructed at plan-build time against the running byte
//! cursor: it aligns its output slot to the output type's natural alignment,
//! remembers the padding it skipped, and reserves the full width of the
//! type. At gather time it reads the frame context and writes its value at
//! the precomputed offset. All arithmetic stays on 64-bit unsigned ticks and
//! is promoted to double only when multiplied by the counter period.

use crate::frame::{FrameRecord, APP_NAME_MAX};
use crate::query::context::FrameContext;
use crate::utils::{padding_for, signed_delta_ms, ticks_to_ms, unsigned_delta_ms};

/// Identifies one QPC timestamp field of the present event. The runtime
/// table equivalent of a member pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PresentTimestamp {
    PresentStartTime,
    TimeInPresent,
    GpuStartTime,
    ReadyTime,
    GpuDuration,
    InputTime,
}

impl PresentTimestamp {
    #[inline]
    fn read(self, frame: &FrameRecord) -> u64 {
        match self {
            PresentTimestamp::PresentStartTime => frame.present.present_start_time,
            PresentTimestamp::TimeInPresent => frame.present.time_in_present,
            PresentTimestamp::GpuStartTime => frame.present.gpu_start_time,
            PresentTimestamp::ReadyTime => frame.present.ready_time,
            PresentTimestamp::GpuDuration => frame.present.gpu_duration,
            PresentTimestamp::InputTime => frame.present.input_time,
        }
    }
}

/// A plain-old-data region of the frame record to copy verbatim. Offsets
/// are resolved against [`FrameRecord`] at plan-build time, with any array
/// index already folded in.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CopySource {
    pub offset: usize,
    pub size: usize,
    pub align: usize,
    /// Character-array field: copy as a NUL-terminated string.
    pub null_terminated: bool,
}

/// The fourteen metric shapes. Boolean fields mirror the edge-case policy
/// each catalog row selects.
#[derive(Clone, Copy, Debug)]
pub(crate) enum GatherOp {
    /// Verbatim copy of a telemetry or present field.
    Copy(CopySource),
    /// Frame type of the display entry selected by the context.
    FrameTypeCopy,
    /// A single tick-count field scaled to milliseconds; zero stays 0.0.
    QpcDuration(PresentTimestamp),
    /// Milliseconds between two present-event timestamps.
    QpcDifference {
        start: PresentTimestamp,
        end: PresentTimestamp,
        zero_check: bool,
        dropped_check: bool,
        allow_negative: bool,
    },
    /// Elapsed session time of a present-event timestamp.
    StartDifference(PresentTimestamp),
    /// The context's dropped flag as a byte.
    Dropped,
    /// Raw CPU frame start QPC, unconverted.
    CpuFrameQpc,
    /// Milliseconds from the CPU frame start to a present-event timestamp.
    CpuFrameQpcDifference {
        end: PresentTimestamp,
        dropped_check: bool,
    },
    /// CPU busy plus CPU wait for the frame.
    CpuFrameQpcFrameTime,
    /// On-screen duration: this display entry to the next one.
    DisplayDifference { dropped_check: bool, zero_check: bool },
    /// CPU interval minus display interval against the previous displayed
    /// frame.
    AnimationError { dropped_check: bool, zero_check: bool },
    /// GPU idle time within the frame's GPU span, clamped at zero.
    GpuWait,
    /// Input event to screen.
    ClickToPhoton,
    /// CPU frame start to screen.
    DisplayLatency,
}

impl GatherOp {
    /// Output width and natural alignment of the value this op writes.
    fn output_layout(&self) -> (usize, usize) {
        match self {
            GatherOp::Copy(src) => (src.size, src.align),
            GatherOp::FrameTypeCopy => (4, 4),
            GatherOp::Dropped => (1, 1),
            GatherOp::CpuFrameQpc => (8, 8),
            // Everything else produces a double.
            _ => (8, 8),
        }
    }
}

/// A gather strategy bound to its slot in the output blob.
///
/// Offsets satisfy `begin <= output <= end`, with `output` aligned to the
/// output type and `end - output` equal to the type's width. The region
/// `[begin, output)` is padding introduced by alignment.
#[derive(Clone, Copy, Debug)]
pub(crate) struct GatherCommand {
    op: GatherOp,
    begin_offset: u32,
    output_offset: u32,
    end_offset: u32,
}

impl GatherCommand {
    /// Bind `op` at the current write cursor `position`.
    pub fn new(op: GatherOp, position: u32) -> Self {
        let (size, align) = op.output_layout();
        let output = position + padding_for(position as usize, align) as u32;
        GatherCommand {
            op,
            begin_offset: position,
            output_offset: output,
            end_offset: output + size as u32,
        }
    }

    pub fn begin_offset(&self) -> u32 {
        self.begin_offset
    }

    pub fn output_offset(&self) -> u32 {
        self.output_offset
    }

    pub fn end_offset(&self) -> u32 {
        self.end_offset
    }

    /// Bytes of actual payload written at `output_offset`.
    pub fn data_size(&self) -> u32 {
        self.end_offset - self.output_offset
    }

    /// Bytes this command consumes of the blob, leading padding included.
    pub fn total_size(&self) -> u32 {
        self.end_offset - self.begin_offset
    }

    /// Compute this command's value from the context and write it into
    /// `blob` at the precomputed offset.
    pub fn gather(&self, ctx: &FrameContext, blob: &mut [u8]) {
        let off = self.output_offset as usize;
        let frame = ctx.frame();
        let period = ctx.period_ms();

        match self.op {
            GatherOp::Copy(src) => self.gather_copy(src, frame, blob),
            GatherOp::FrameTypeCopy => {
                let val = frame.present.displayed_frame_type[ctx.display_index()];
                put_i32(blob, off, val);
            }
            GatherOp::QpcDuration(field) => {
                let ticks = field.read(frame);
                let val = if ticks != 0 {
                    ticks_to_ms(ticks, period)
                } else {
                    0.0
                };
                put_f64(blob, off, val);
            }
            GatherOp::QpcDifference {
                start,
                end,
                zero_check,
                dropped_check,
                allow_negative,
            } => {
                if dropped_check && ctx.dropped() {
                    put_f64(blob, off, f64::NAN);
                    return;
                }
                let start = start.read(frame);
                if zero_check && start == 0 {
                    put_f64(blob, off, f64::NAN);
                    return;
                }
                let val = if allow_negative {
                    period * (end.read(frame) as f64 - start as f64)
                } else {
                    unsigned_delta_ms(start, end.read(frame), period)
                };
                put_f64(blob, off, val);
            }
            GatherOp::StartDifference(end) => {
                let ticks = end.read(frame).wrapping_sub(ctx.qpc_start());
                put_f64(blob, off, ticks_to_ms(ticks, period));
            }
            GatherOp::Dropped => {
                blob[off] = ctx.dropped() as u8;
            }
            GatherOp::CpuFrameQpc => {
                put_u64(blob, off, ctx.cpu_start_qpc());
            }
            GatherOp::CpuFrameQpcDifference { end, dropped_check } => {
                if dropped_check && ctx.dropped() {
                    put_f64(blob, off, f64::NAN);
                    return;
                }
                let val = unsigned_delta_ms(ctx.cpu_start_qpc(), end.read(frame), period);
                put_f64(blob, off, val);
            }
            GatherOp::CpuFrameQpcFrameTime => {
                let cpu_busy = unsigned_delta_ms(
                    ctx.cpu_start_qpc(),
                    frame.present.present_start_time,
                    period,
                );
                let cpu_wait = ticks_to_ms(frame.present.time_in_present, period);
                put_f64(blob, off, cpu_busy + cpu_wait);
            }
            GatherOp::DisplayDifference {
                dropped_check,
                zero_check,
            } => {
                if dropped_check && ctx.dropped() {
                    put_f64(blob, off, f64::NAN);
                    return;
                }
                let idx = ctx.display_index();
                let screen_time = frame.present.displayed_screen_time[idx];
                // The interval ends at this present's next display entry,
                // or at the next displayed frame for the final entry.
                let next_screen_time = if (idx as u32) + 1 < frame.present.displayed_count {
                    frame.present.displayed_screen_time[idx + 1]
                } else {
                    ctx.next_displayed_qpc()
                };
                let val = unsigned_delta_ms(screen_time, next_screen_time, period);
                if zero_check && val == 0.0 {
                    put_f64(blob, off, f64::NAN);
                } else {
                    put_f64(blob, off, val);
                }
            }
            GatherOp::AnimationError {
                dropped_check,
                zero_check,
            } => {
                if dropped_check && ctx.dropped() {
                    put_f64(blob, off, f64::NAN);
                    return;
                }
                if zero_check && ctx.previous_displayed_cpu_start_qpc() == 0 {
                    put_f64(blob, off, 0.0);
                    return;
                }
                let screen_time = frame.present.displayed_screen_time[ctx.display_index()];
                let display_delta = screen_time.wrapping_sub(ctx.previous_displayed_qpc());
                let cpu_delta = ctx
                    .cpu_start_qpc()
                    .wrapping_sub(ctx.previous_displayed_cpu_start_qpc());
                // CPU interval minus display interval, signed.
                put_f64(blob, off, signed_delta_ms(display_delta, cpu_delta, period));
            }
            GatherOp::GpuWait => {
                let gpu_span = unsigned_delta_ms(
                    frame.present.gpu_start_time,
                    frame.present.ready_time,
                    period,
                );
                let gpu_busy = ticks_to_ms(frame.present.gpu_duration, period);
                put_f64(blob, off, f64::max(0.0, gpu_span - gpu_busy));
            }
            GatherOp::ClickToPhoton => {
                if ctx.dropped() {
                    put_f64(blob, off, f64::NAN);
                    return;
                }
                let input = frame.present.input_time;
                if input == 0 {
                    put_f64(blob, off, f64::NAN);
                    return;
                }
                let screen_time = frame.present.displayed_screen_time[ctx.display_index()];
                put_f64(blob, off, unsigned_delta_ms(input, screen_time, period));
            }
            GatherOp::DisplayLatency => {
                if ctx.dropped() {
                    put_f64(blob, off, f64::NAN);
                    return;
                }
                let screen_time = frame.present.displayed_screen_time[ctx.display_index()];
                let val = unsigned_delta_ms(ctx.cpu_start_qpc(), screen_time, period);
                put_f64(blob, off, val);
            }
        }
    }

    fn gather_copy(&self, src: CopySource, frame: &FrameRecord, blob: &mut [u8]) {
        let off = self.output_offset as usize;
        // The record is plain-old-data; its bytes are the wire format.
        let bytes = unsafe { plain::as_bytes(frame) };
        let field = &bytes[src.offset..src.offset + src.size];
        if src.null_terminated {
            // Copy through the terminator; force one if the field is full.
            let n = field
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(APP_NAME_MAX - 1);
            blob[off..off + n].copy_from_slice(&field[..n]);
            blob[off + n] = 0;
        } else {
            blob[off..off + src.size].copy_from_slice(field);
        }
    }
}

#[inline]
fn put_f64(blob: &mut [u8], off: usize, val: f64) {
    blob[off..off + 8].copy_from_slice(&val.to_ne_bytes());
}

#[inline]
fn put_u64(blob: &mut [u8], off: usize, val: u64) {
    blob[off..off + 8].copy_from_slice(&val.to_ne_bytes());
}

#[inline]
fn put_i32(blob: &mut [u8], off: usize, val: i32) {
    blob[off..off + 4].copy_from_slice(&val.to_ne_bytes());
}
