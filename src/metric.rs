//! Metric and statistic identifiers clients use to describe query columns.
//!
//! The set is closed: every metric the service can ever report is a variant
//! here. Not every metric is event-compatible, though; some only exist as
//! windowed statistics (frame rates, static adapter strings) and have no
//! per-frame value. The frame-query catalog maps those to "unsupported" at
//! plan build time and the element is skipped with a diagnostic.

use serde::{Deserialize, Serialize};

/// A named per-frame metric or telemetry channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    // Present event copies.
    Application,
    SwapChainAddress,
    PresentMode,
    PresentRuntime,
    PresentFlags,
    SyncInterval,
    AllowsTearing,
    FrameType,

    // Frame timing, computed from QPC timestamps.
    GpuBusy,
    CpuWait,
    DroppedFrames,
    CpuStartQpc,
    CpuStartTime,
    CpuFrameTime,
    CpuBusy,
    GpuTime,
    GpuWait,
    DisplayedTime,
    AnimationError,
    GpuLatency,
    DisplayLatency,
    ClickToPhotonLatency,

    // GPU telemetry copies.
    GpuPower,
    GpuVoltage,
    GpuFrequency,
    GpuTemperature,
    GpuFanSpeed,
    GpuUtilization,
    GpuRenderComputeUtilization,
    GpuMediaUtilization,
    GpuMemPower,
    GpuMemVoltage,
    GpuMemFrequency,
    GpuMemEffectiveFrequency,
    GpuMemTemperature,
    GpuMemSize,
    GpuMemUsed,
    GpuMemMaxBandwidth,
    GpuMemWriteBandwidth,
    GpuMemReadBandwidth,
    GpuPowerLimited,
    GpuTemperatureLimited,
    GpuCurrentLimited,
    GpuVoltageLimited,
    GpuUtilizationLimited,
    GpuMemPowerLimited,
    GpuMemTemperatureLimited,
    GpuMemCurrentLimited,
    GpuMemVoltageLimited,
    GpuMemUtilizationLimited,

    // CPU telemetry copies.
    CpuUtilization,
    CpuPower,
    CpuTemperature,
    CpuFrequency,

    // Statistics-only or static metrics. These exist in the service's
    // introspection namespace but have no per-frame value, so the frame
    // query catalog rejects them.
    PresentedFps,
    DisplayedFps,
    GpuSustainedPowerLimit,
    GpuVendor,
    GpuName,
    CpuVendor,
    CpuName,
}

/// Statistic applied to a metric over a sample window. Frame event queries
/// deliver raw per-frame values and only accept [`Stat::None`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stat {
    #[default]
    None,
    Avg,
    Min,
    Max,
    Percentile90,
    Percentile95,
    Percentile99,
}
