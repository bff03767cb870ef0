//! Sliding-window correlation over the frame stream.
//!
//! Inter-frame metrics need neighbors on both sides of a frame: the frame
//! presented just before it, the next frame that reached the screen, and
//! the two most recent displayed frames before it. [`FrameWindow`] buffers
//! the incoming stream and yields each frame once its forward neighbor
//! exists, so a consumer can feed [`crate::FrameContext`] without tracking
//! the stream shape itself.
//!
//! A frame becomes ready when a later frame with display entries has been
//! pushed. Frames the window has already yielded are kept only while they
//! can still serve as a neighbor of an unyielded frame, then evicted.

use std::collections::VecDeque;

use crate::frame::FrameRecord;
use crate::query::FrameNeighbors;

/// A frame ready for gathering, paired with its correlation neighbors.
pub struct CorrelatedFrame<'a> {
    pub current: &'a FrameRecord,
    pub neighbors: FrameNeighbors<'a>,
}

/// Buffers the present stream and resolves correlation neighbors.
#[derive(Default)]
pub struct FrameWindow {
    frames: VecDeque<FrameRecord>,
    /// Index (relative to the deque front) of the next frame to yield.
    cursor: usize,
}

impl FrameWindow {
    pub fn new() -> Self {
        FrameWindow::default()
    }

    /// Number of frames pushed but not yet yielded.
    pub fn pending(&self) -> usize {
        self.frames.len() - self.cursor
    }

    /// Append the next frame of the stream in present order.
    pub fn push(&mut self, frame: FrameRecord) {
        self.frames.push_back(frame);
    }

    /// Yield the next frame whose forward neighbor is known, or `None`
    /// until a displayed frame beyond it arrives.
    pub fn next_ready(&mut self) -> Option<CorrelatedFrame<'_>> {
        self.evict_retired();
        let current = self.cursor;
        if current >= self.frames.len() {
            return None;
        }
        let next_displayed = (current + 1..self.frames.len())
            .find(|&i| self.frames[i].present.is_displayed())?;
        self.cursor += 1;
        Some(self.correlate(current, Some(next_displayed)))
    }

    /// Yield the next pending frame without waiting for a forward
    /// neighbor. For end-of-session flushing; the missing next-displayed
    /// neighbor downgrades the affected metrics per their guards.
    pub fn flush_next(&mut self) -> Option<CorrelatedFrame<'_>> {
        self.evict_retired();
        let current = self.cursor;
        if current >= self.frames.len() {
            return None;
        }
        let next_displayed =
            (current + 1..self.frames.len()).find(|&i| self.frames[i].present.is_displayed());
        self.cursor += 1;
        Some(self.correlate(current, next_displayed))
    }

    fn correlate(&self, current: usize, next_displayed: Option<usize>) -> CorrelatedFrame<'_> {
        let last_presented = current.checked_sub(1).map(|i| &self.frames[i]);

        let mut last_displayed = None;
        let mut previous_last_displayed = None;
        for i in (0..current).rev() {
            if self.frames[i].present.is_displayed() {
                if last_displayed.is_none() {
                    last_displayed = Some(i);
                } else {
                    previous_last_displayed = Some(i);
                    break;
                }
            }
        }

        CorrelatedFrame {
            current: &self.frames[current],
            neighbors: FrameNeighbors {
                next_displayed: next_displayed.map(|i| &self.frames[i]),
                last_presented,
                last_displayed: last_displayed.map(|i| &self.frames[i]),
                previous_last_displayed: previous_last_displayed.map(|i| &self.frames[i]),
            },
        }
    }

    /// Drop yielded frames that can no longer be a neighbor: everything
    /// older than both the immediate predecessor of the cursor and the two
    /// most recent displayed frames before it.
    fn evict_retired(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let mut keep_from = self.cursor - 1;
        let mut displayed_found = 0;
        for i in (0..self.cursor).rev() {
            if displayed_found == 2 {
                break;
            }
            if self.frames[i].present.is_displayed() {
                displayed_found += 1;
                keep_from = keep_from.min(i);
            }
        }
        for _ in 0..keep_from {
            self.frames.pop_front();
        }
        self.cursor -= keep_from;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PresentResult;

    fn displayed(start: u64, screen: u64) -> FrameRecord {
        let mut f = FrameRecord::default();
        f.present.present_start_time = start;
        f.present.time_in_present = 10;
        f.present.final_state = PresentResult::Presented as i32;
        f.present.displayed_count = 1;
        f.present.displayed_screen_time[0] = screen;
        f
    }

    fn dropped(start: u64) -> FrameRecord {
        let mut f = FrameRecord::default();
        f.present.present_start_time = start;
        f.present.time_in_present = 10;
        f.present.final_state = PresentResult::Discarded as i32;
        f
    }

    #[test]
    fn test_not_ready_until_next_displayed() {
        let mut window = FrameWindow::new();
        window.push(displayed(100, 1000));
        assert!(window.next_ready().is_none());

        window.push(dropped(200));
        // A dropped successor is not a forward neighbor.
        assert!(window.next_ready().is_none());

        window.push(displayed(300, 3000));
        let ready = window.next_ready().unwrap();
        assert_eq!(ready.current.present.present_start_time, 100);
        assert_eq!(
            ready
                .neighbors
                .next_displayed
                .unwrap()
                .present
                .displayed_screen_time[0],
            3000
        );
        assert!(ready.neighbors.last_presented.is_none());
    }

    #[test]
    fn test_neighbor_resolution() {
        let mut window = FrameWindow::new();
        window.push(displayed(100, 1000));
        window.push(displayed(200, 2000));
        window.push(dropped(300));
        window.push(displayed(400, 4000));
        window.push(displayed(500, 5000));

        // frame 100: no backward neighbors
        let r = window.next_ready().unwrap();
        assert_eq!(r.current.present.present_start_time, 100);

        // frame 200: last_presented = 100, last_displayed = 100
        let r = window.next_ready().unwrap();
        assert_eq!(r.current.present.present_start_time, 200);
        assert_eq!(
            r.neighbors.last_presented.unwrap().present.present_start_time,
            100
        );
        assert_eq!(
            r.neighbors.last_displayed.unwrap().present.present_start_time,
            100
        );
        assert!(r.neighbors.previous_last_displayed.is_none());

        // dropped frame 300: last_presented = 200, displayed neighbors 200/100
        let r = window.next_ready().unwrap();
        assert_eq!(r.current.present.present_start_time, 300);
        assert_eq!(
            r.neighbors.last_presented.unwrap().present.present_start_time,
            200
        );
        assert_eq!(
            r.neighbors.last_displayed.unwrap().present.present_start_time,
            200
        );
        assert_eq!(
            r.neighbors
                .previous_last_displayed
                .unwrap()
                .present
                .present_start_time,
            100
        );

        // frame 400: last_presented = dropped 300, displayed pair unchanged
        let r = window.next_ready().unwrap();
        assert_eq!(r.current.present.present_start_time, 400);
        assert_eq!(
            r.neighbors.last_presented.unwrap().present.present_start_time,
            300
        );
        assert_eq!(
            r.neighbors.last_displayed.unwrap().present.present_start_time,
            200
        );
        assert_eq!(
            r.neighbors
                .previous_last_displayed
                .unwrap()
                .present
                .present_start_time,
            100
        );

        // frame 500 has no forward neighbor yet
        assert!(window.next_ready().is_none());
        assert_eq!(window.pending(), 1);
    }

    #[test]
    fn test_flush_yields_tail() {
        let mut window = FrameWindow::new();
        window.push(displayed(100, 1000));
        window.push(displayed(200, 2000));
        assert!(window.next_ready().is_some());
        assert!(window.next_ready().is_none());

        let r = window.flush_next().unwrap();
        assert_eq!(r.current.present.present_start_time, 200);
        assert!(r.neighbors.next_displayed.is_none());
        assert_eq!(
            r.neighbors.last_presented.unwrap().present.present_start_time,
            100
        );
        assert!(window.flush_next().is_none());
    }

    #[test]
    fn test_eviction_keeps_needed_neighbors() {
        let mut window = FrameWindow::new();
        for i in 0..100u64 {
            window.push(displayed(100 * (i + 1), 1000 * (i + 1)));
        }
        let mut yielded = 0;
        while let Some(r) = window.next_ready() {
            // Every frame past the second must see both displayed
            // neighbors despite eviction.
            if yielded >= 2 {
                assert!(r.neighbors.last_displayed.is_some());
                assert!(r.neighbors.previous_last_displayed.is_some());
            }
            yielded += 1;
        }
        assert_eq!(yielded, 99);
        // The window holds only the neighbors of the tail, not the whole
        // stream.
        assert!(window.frames.len() <= 4);
    }
}
