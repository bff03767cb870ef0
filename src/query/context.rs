//! Per-frame correlation context handed to every Gather invocation.
//!
//! Inter-frame metrics (CPU busy, displayed time, animation error, the
//! latency family) need more than the current record: they read up to four
//! neighbor frames from the stream. The producer draining the frame stream
//! resolves those neighbors (see [`crate::window::FrameWindow`]) and the
//! context reduces them to the handful of derived QPC values the gather
//! strategies consume. Any missing neighbor is tolerated: the affected
//! values stay zero and the strategies' own guards downgrade their outputs
//! to 0.0 or NaN.

use log::debug;

use crate::frame::{FrameRecord, MAX_DISPLAYED_PER_PRESENT};

/// The four correlation neighbors of a frame.
///
/// - `last_presented`: the frame presented immediately before the current
///   one; its present-call completion marks the start of the current CPU
///   frame.
/// - `next_displayed`: the next frame after the current one that reached
///   the screen.
/// - `last_displayed`: the most recent frame before the current one that
///   reached the screen.
/// - `previous_last_displayed`: the displayed frame before
///   `last_displayed`; needed to close the animation-error interval pair.
#[derive(Clone, Copy, Default)]
pub struct FrameNeighbors<'a> {
    pub next_displayed: Option<&'a FrameRecord>,
    pub last_presented: Option<&'a FrameRecord>,
    pub last_displayed: Option<&'a FrameRecord>,
    pub previous_last_displayed: Option<&'a FrameRecord>,
}

/// Source data and derived correlation values for one Gather invocation.
///
/// Built once per source frame and reused across all gather commands of a
/// plan. Holds only non-owning references; the upstream frame buffer keeps
/// the records alive for the duration of the call.
pub struct FrameContext<'a> {
    frame: &'a FrameRecord,
    performance_counter_period_ms: f64,
    qpc_start: u64,
    source_frame_display_index: u32,
    dropped: bool,
    cpu_start_qpc: u64,
    next_displayed_qpc: u64,
    previous_displayed_qpc: u64,
    previous_displayed_cpu_start_qpc: u64,
}

impl<'a> FrameContext<'a> {
    /// Build a context for `frame` with its correlation neighbors.
    ///
    /// `period_ms` converts QPC ticks to milliseconds; `qpc_start` is the
    /// session origin used by elapsed-time metrics.
    pub fn new(
        frame: &'a FrameRecord,
        neighbors: FrameNeighbors<'a>,
        period_ms: f64,
        qpc_start: u64,
    ) -> Self {
        let mut ctx = FrameContext {
            frame,
            performance_counter_period_ms: period_ms,
            qpc_start,
            source_frame_display_index: 0,
            dropped: false,
            cpu_start_qpc: 0,
            next_displayed_qpc: 0,
            previous_displayed_qpc: 0,
            previous_displayed_cpu_start_qpc: 0,
        };
        ctx.update_source_data(frame, neighbors);
        ctx
    }

    /// Repoint the context at a new source frame and recompute every
    /// derived correlation value. Resets the display index to 0.
    pub fn update_source_data(&mut self, frame: &'a FrameRecord, neighbors: FrameNeighbors<'a>) {
        self.frame = frame;
        self.source_frame_display_index = 0;
        self.dropped = frame.present.is_dropped();

        self.cpu_start_qpc = match neighbors.last_presented {
            Some(prev) => prev.present.cpu_frame_start(),
            None => {
                debug!("frame has no last-presented neighbor, cpu start unknown");
                0
            }
        };
        self.next_displayed_qpc = match neighbors.next_displayed {
            Some(next) => next.present.first_displayed_qpc(),
            None => {
                debug!("frame has no next-displayed neighbor");
                0
            }
        };
        self.previous_displayed_qpc = neighbors
            .last_displayed
            .map(|f| f.present.last_displayed_qpc())
            .unwrap_or(0);
        self.previous_displayed_cpu_start_qpc = neighbors
            .previous_last_displayed
            .map(|f| f.present.cpu_frame_start())
            .unwrap_or(0);
    }

    /// Select which display entry of a multi-display present the
    /// display-indexed strategies read. Out-of-range values clamp to the
    /// last slot.
    pub fn set_display_index(&mut self, index: u32) {
        self.source_frame_display_index = index;
    }

    pub fn frame(&self) -> &'a FrameRecord {
        self.frame
    }

    pub fn period_ms(&self) -> f64 {
        self.performance_counter_period_ms
    }

    pub fn qpc_start(&self) -> u64 {
        self.qpc_start
    }

    /// Display entry index, clamped inside the record's display arrays.
    pub fn display_index(&self) -> usize {
        (self.source_frame_display_index as usize).min(MAX_DISPLAYED_PER_PRESENT - 1)
    }

    pub fn dropped(&self) -> bool {
        self.dropped
    }

    pub fn cpu_start_qpc(&self) -> u64 {
        self.cpu_start_qpc
    }

    pub fn next_displayed_qpc(&self) -> u64 {
        self.next_displayed_qpc
    }

    pub fn previous_displayed_qpc(&self) -> u64 {
        self.previous_displayed_qpc
    }

    pub fn previous_displayed_cpu_start_qpc(&self) -> u64 {
        self.previous_displayed_cpu_start_qpc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PresentResult;

    fn displayed_frame(start: u64, in_present: u64, screen: u64) -> FrameRecord {
        let mut f = FrameRecord::default();
        f.present.present_start_time = start;
        f.present.time_in_present = in_present;
        f.present.final_state = PresentResult::Presented as i32;
        f.present.displayed_count = 1;
        f.present.displayed_screen_time[0] = screen;
        f
    }

    #[test]
    fn test_derived_values_with_all_neighbors() {
        let current = displayed_frame(1000, 50, 2000);
        let last_presented = displayed_frame(800, 40, 1900);
        let next_displayed = displayed_frame(1200, 30, 2100);
        let last_displayed = displayed_frame(700, 20, 1800);
        let prev_last_displayed = displayed_frame(600, 10, 1700);

        let ctx = FrameContext::new(
            &current,
            FrameNeighbors {
                next_displayed: Some(&next_displayed),
                last_presented: Some(&last_presented),
                last_displayed: Some(&last_displayed),
                previous_last_displayed: Some(&prev_last_displayed),
            },
            0.001,
            100,
        );

        assert!(!ctx.dropped());
        assert_eq!(ctx.cpu_start_qpc(), 840);
        assert_eq!(ctx.next_displayed_qpc(), 2100);
        assert_eq!(ctx.previous_displayed_qpc(), 1800);
        assert_eq!(ctx.previous_displayed_cpu_start_qpc(), 610);
        assert_eq!(ctx.qpc_start(), 100);
    }

    #[test]
    fn test_missing_neighbors_zero_out() {
        let current = displayed_frame(1000, 50, 2000);
        let ctx = FrameContext::new(&current, FrameNeighbors::default(), 0.001, 0);
        assert_eq!(ctx.cpu_start_qpc(), 0);
        assert_eq!(ctx.next_displayed_qpc(), 0);
        assert_eq!(ctx.previous_displayed_qpc(), 0);
        assert_eq!(ctx.previous_displayed_cpu_start_qpc(), 0);
    }

    #[test]
    fn test_dropped_flag() {
        let mut current = displayed_frame(1000, 50, 0);
        current.present.final_state = PresentResult::Discarded as i32;
        current.present.displayed_count = 0;
        let ctx = FrameContext::new(&current, FrameNeighbors::default(), 0.001, 0);
        assert!(ctx.dropped());
    }

    #[test]
    fn test_last_displayed_uses_final_entry() {
        let current = displayed_frame(1000, 50, 2000);
        let mut last_displayed = displayed_frame(700, 20, 1800);
        last_displayed.present.displayed_count = 3;
        last_displayed.present.displayed_screen_time[1] = 1850;
        last_displayed.present.displayed_screen_time[2] = 1875;

        let ctx = FrameContext::new(
            &current,
            FrameNeighbors {
                last_displayed: Some(&last_displayed),
                ..Default::default()
            },
            0.001,
            0,
        );
        assert_eq!(ctx.previous_displayed_qpc(), 1875);
    }

    #[test]
    fn test_display_index_clamps() {
        let current = displayed_frame(1000, 50, 2000);
        let mut ctx = FrameContext::new(&current, FrameNeighbors::default(), 0.001, 0);
        ctx.set_display_index(1000);
        assert_eq!(ctx.display_index(), MAX_DISPLAYED_PER_PRESENT - 1);
    }
}
