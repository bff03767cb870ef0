//! Raw frame records as produced by the present-event collector.
//!
//! One [`FrameRecord`] is emitted per swap-chain present and carries three
//! substructures: the present event itself (QPC timestamps plus present
//! metadata), a GPU power/thermal telemetry snapshot, and a CPU telemetry
//! snapshot. Records travel through shared memory as untyped bytes; the
//! structs here are plain-old-data so consumers can view or copy them
//! straight out of the transport.
//!
//! Enum-valued fields are stored as their raw integer representation (the
//! record is a wire struct) with typed accessors layered on top.

use anyhow::{anyhow, Result};
use plain::Plain;

/// Maximum length of the application executable name, including the
/// terminating NUL.
pub const APP_NAME_MAX: usize = 260;

/// Number of fan-speed slots in the GPU telemetry snapshot.
pub const MAX_FAN_COUNT: usize = 5;

/// Maximum display events a single present can produce. Frame generation
/// can put more than one displayed frame on screen per application present.
pub const MAX_DISPLAYED_PER_PRESENT: usize = 8;

/// Terminal state of a present.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentResult {
    Unknown = 0,
    /// The frame made it to the screen.
    Presented = 1,
    /// The frame was replaced before it could be displayed.
    Discarded = 2,
}

impl PresentResult {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => PresentResult::Presented,
            2 => PresentResult::Discarded,
            _ => PresentResult::Unknown,
        }
    }
}

/// How the present reached the screen.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentMode {
    Unknown = 0,
    HardwareLegacyFlip = 1,
    HardwareLegacyCopyToFrontBuffer = 2,
    HardwareIndependentFlip = 3,
    ComposedFlip = 4,
    HardwareComposedIndependentFlip = 5,
    ComposedCopyWithGpuGdi = 6,
    ComposedCopyWithCpuGdi = 7,
}

impl PresentMode {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => PresentMode::HardwareLegacyFlip,
            2 => PresentMode::HardwareLegacyCopyToFrontBuffer,
            3 => PresentMode::HardwareIndependentFlip,
            4 => PresentMode::ComposedFlip,
            5 => PresentMode::HardwareComposedIndependentFlip,
            6 => PresentMode::ComposedCopyWithGpuGdi,
            7 => PresentMode::ComposedCopyWithCpuGdi,
            _ => PresentMode::Unknown,
        }
    }
}

/// Graphics runtime the present came through.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentRuntime {
    Other = 0,
    Dxgi = 1,
    D3d9 = 2,
}

impl PresentRuntime {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => PresentRuntime::Dxgi,
            2 => PresentRuntime::D3d9,
            _ => PresentRuntime::Other,
        }
    }
}

/// Origin of a displayed frame. Generated frames are inserted by frame
/// generation between application presents.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameType {
    NotSet = 0,
    Unspecified = 1,
    Application = 2,
    Repeated = 3,
    Generated = 4,
}

impl FrameType {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => FrameType::Unspecified,
            2 => FrameType::Application,
            3 => FrameType::Repeated,
            4 => FrameType::Generated,
            _ => FrameType::NotSet,
        }
    }
}

/// The present event: QPC timestamps covering the frame's journey from the
/// present call to the screen, plus present metadata.
///
/// All timestamps are raw QPC ticks; zero means the event was never
/// observed. A present may put several frames on screen (frame generation),
/// recorded in `displayed_screen_time[..displayed_count]` with a matching
/// frame type per entry. A plain presented frame is the degenerate case
/// `displayed_count == 1`.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct PresentEvent {
    /// QPC when the application called Present.
    pub present_start_time: u64,
    /// Ticks the application spent inside the Present call.
    pub time_in_present: u64,
    /// QPC when GPU work for this frame began.
    pub gpu_start_time: u64,
    /// QPC when GPU work for this frame completed.
    pub ready_time: u64,
    /// Accumulated ticks of GPU execution for this frame.
    pub gpu_duration: u64,
    /// QPC of the input event this frame consumed, zero if none.
    pub input_time: u64,
    /// Identifies the swap chain the present went through.
    pub swap_chain_address: u64,
    /// Screen times of each displayed frame this present produced.
    pub displayed_screen_time: [u64; MAX_DISPLAYED_PER_PRESENT],
    /// Frame type per displayed entry, raw [`FrameType`] values.
    pub displayed_frame_type: [i32; MAX_DISPLAYED_PER_PRESENT],
    /// Number of valid entries in the displayed arrays; zero when the frame
    /// never reached the screen.
    pub displayed_count: u32,
    /// Raw [`PresentResult`] value.
    pub final_state: i32,
    /// Raw [`PresentMode`] value.
    pub present_mode: i32,
    /// Raw [`PresentRuntime`] value.
    pub runtime: i32,
    pub sync_interval: i32,
    pub present_flags: u32,
    /// Nonzero when the swap chain allows tearing.
    pub supports_tearing: u8,
    /// NUL-terminated application executable name.
    pub application: [u8; APP_NAME_MAX],
}

impl PresentEvent {
    /// Terminal state of this present.
    pub fn final_state(&self) -> PresentResult {
        PresentResult::from_raw(self.final_state)
    }

    /// True when the frame never made it to the screen.
    pub fn is_dropped(&self) -> bool {
        self.final_state() != PresentResult::Presented
    }

    /// True when this present produced at least one displayed frame.
    pub fn is_displayed(&self) -> bool {
        self.displayed_count > 0
    }

    /// QPC at which the CPU work for the *next* frame begins: the moment
    /// this present call returned.
    pub fn cpu_frame_start(&self) -> u64 {
        self.present_start_time + self.time_in_present
    }

    /// Screen time of the first displayed frame, zero if none.
    pub fn first_displayed_qpc(&self) -> u64 {
        if self.displayed_count > 0 {
            self.displayed_screen_time[0]
        } else {
            0
        }
    }

    /// Screen time of the last displayed frame, zero if none.
    pub fn last_displayed_qpc(&self) -> u64 {
        match self.displayed_count as usize {
            0 => 0,
            n => self.displayed_screen_time[n.min(MAX_DISPLAYED_PER_PRESENT) - 1],
        }
    }
}

impl Default for PresentEvent {
    fn default() -> Self {
        PresentEvent {
            present_start_time: 0,
            time_in_present: 0,
            gpu_start_time: 0,
            ready_time: 0,
            gpu_duration: 0,
            input_time: 0,
            swap_chain_address: 0,
            displayed_screen_time: [0; MAX_DISPLAYED_PER_PRESENT],
            displayed_frame_type: [0; MAX_DISPLAYED_PER_PRESENT],
            displayed_count: 0,
            final_state: 0,
            present_mode: 0,
            runtime: 0,
            sync_interval: 0,
            present_flags: 0,
            supports_tearing: 0,
            application: [0; APP_NAME_MAX],
        }
    }
}

/// GPU power/thermal telemetry snapshot taken around the present.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct GpuTelemetry {
    pub gpu_power_w: f64,
    pub gpu_voltage_v: f64,
    pub gpu_frequency_mhz: f64,
    pub gpu_temperature_c: f64,
    pub fan_speed_rpm: [f64; MAX_FAN_COUNT],
    pub gpu_utilization: f64,
    pub gpu_render_compute_utilization: f64,
    pub gpu_media_utilization: f64,
    pub vram_power_w: f64,
    pub vram_voltage_v: f64,
    pub vram_frequency_mhz: f64,
    pub vram_effective_frequency_gbps: f64,
    pub vram_temperature_c: f64,
    pub gpu_mem_read_bandwidth_bps: f64,
    pub gpu_mem_write_bandwidth_bps: f64,
    pub gpu_mem_total_size_b: u64,
    pub gpu_mem_used_b: u64,
    pub gpu_mem_max_bandwidth_bps: u64,
    /// Throttle flags, nonzero while the corresponding limiter is active.
    pub gpu_power_limited: u8,
    pub gpu_temperature_limited: u8,
    pub gpu_current_limited: u8,
    pub gpu_voltage_limited: u8,
    pub gpu_utilization_limited: u8,
    pub vram_power_limited: u8,
    pub vram_temperature_limited: u8,
    pub vram_current_limited: u8,
    pub vram_voltage_limited: u8,
    pub vram_utilization_limited: u8,
}

/// CPU telemetry snapshot taken around the present.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuTelemetry {
    pub cpu_utilization: f64,
    pub cpu_power_w: f64,
    pub cpu_temperature_c: f64,
    pub cpu_frequency_mhz: f64,
}

/// One raw frame record: the unit the collector writes into shared memory
/// and the query engine reads during Gather.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameRecord {
    pub present: PresentEvent,
    pub gpu: GpuTelemetry,
    pub cpu: CpuTelemetry,
}

// Every field is an integer, a float, or an array of those, so any byte
// pattern is a valid value.
unsafe impl Plain for PresentEvent {}
unsafe impl Plain for GpuTelemetry {}
unsafe impl Plain for CpuTelemetry {}
unsafe impl Plain for FrameRecord {}

impl FrameRecord {
    /// Copy a record out of an untyped byte buffer, e.g. a slot of the
    /// shared-memory transport. Fails if the buffer is shorter than a
    /// record.
    pub fn copy_from_bytes(data: &[u8]) -> Result<Self> {
        let mut record = FrameRecord::default();
        plain::copy_from_bytes(&mut record, data)
            .map_err(|_| anyhow!("frame record buffer too short: {} bytes", data.len()))?;
        Ok(record)
    }

    /// Set the application name from a string, truncating to fit and always
    /// NUL-terminating.
    pub fn set_application(&mut self, name: &str) {
        let bytes = name.as_bytes();
        let n = bytes.len().min(APP_NAME_MAX - 1);
        self.present.application[..n].copy_from_slice(&bytes[..n]);
        self.present.application[n] = 0;
    }
}
