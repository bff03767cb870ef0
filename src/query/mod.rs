//! Compiled frame event queries.
//!
//! A client describes the per-frame columns it wants as an ordered list of
//! [`QueryElement`]s. [`FrameQuery::new`] compiles that list once: each
//! element is mapped to a gather strategy, assigned an aligned slot in the
//! output blob, and the element's `data_offset`/`data_size` are written back
//! so the client knows where its column lives. The resulting plan is
//! immutable, allocation-free at gather time, and may be shared read-only
//! across threads; each Gather invocation needs its own context and blob.

mod context;
mod gather;

pub use context::{FrameContext, FrameNeighbors};

use std::fmt;
use std::mem::{align_of, offset_of, size_of};

use anyhow::Result;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::frame::{
    CpuTelemetry, FrameRecord, GpuTelemetry, PresentEvent, APP_NAME_MAX, MAX_FAN_COUNT,
};
use crate::metric::{Metric, Stat};
use crate::utils::padding_for;
use gather::{CopySource, GatherCommand, GatherOp, PresentTimestamp};

/// Blobs are sized to a multiple of this so that tightly concatenated blob
/// arrays keep every blob aligned.
pub const BLOB_ALIGN: usize = 16;

/// One requested output column of a frame event query.
///
/// `data_offset` and `data_size` are output slots the planner fills during
/// [`FrameQuery::new`]; they stay zero for elements whose metric is not
/// event-compatible.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct QueryElement {
    pub metric: Metric,
    /// Must be [`Stat::None`] for frame event queries.
    pub stat: Stat,
    /// 0 selects the universal device (CPU-host metrics and timing); a
    /// nonzero id selects a specific GPU. At most one distinct nonzero id
    /// may appear across a query.
    pub device_id: u32,
    /// Selects one slot of an array-valued source field, e.g. per-fan RPM.
    pub array_index: u16,
    pub data_offset: u32,
    pub data_size: u32,
}

impl QueryElement {
    pub fn new(metric: Metric) -> Self {
        QueryElement {
            metric,
            stat: Stat::None,
            device_id: 0,
            array_index: 0,
            data_offset: 0,
            data_size: 0,
        }
    }

    pub fn with_device(metric: Metric, device_id: u32) -> Self {
        QueryElement {
            device_id,
            ..QueryElement::new(metric)
        }
    }
}

/// Fatal errors raised while compiling a query.
#[derive(Debug, PartialEq, Eq)]
pub enum QueryError {
    /// Two distinct non-universal devices were referenced by one query.
    MultipleDevices { first: u32, second: u32 },
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::MultipleDevices { first, second } => write!(
                f,
                "cannot specify two different non-universal devices in the same query \
                 (got {first} and {second})"
            ),
        }
    }
}

impl std::error::Error for QueryError {}

/// A compiled frame event query: the ordered gather strategies plus the
/// finalized blob layout.
#[derive(Debug)]
pub struct FrameQuery {
    commands: Vec<GatherCommand>,
    blob_size: u32,
    referenced_device: Option<u32>,
}

impl FrameQuery {
    /// Compile `elements` into a gather plan.
    ///
    /// Walks the elements in order, binding each to a strategy at the
    /// running byte cursor and writing the assigned `data_offset` and
    /// `data_size` back into the element. Elements whose metric has no
    /// per-frame value are skipped with a diagnostic and keep zeroed
    /// offsets. The final blob size is rounded up to a multiple of
    /// [`BLOB_ALIGN`].
    ///
    /// Fails if the elements reference more than one distinct non-universal
    /// device.
    //
    // TODO: validation left to a later release:
    //   reject nonzero array_index when the source field is not an array
    //   reject stat != None
    //   cross-check layout size against the shared-memory record size
    pub fn new(elements: &mut [QueryElement]) -> Result<Self> {
        let mut referenced_device = None;
        let mut commands = Vec::with_capacity(elements.len());
        let mut blob_size: u32 = 0;

        for element in elements.iter_mut() {
            if element.device_id != 0 {
                match referenced_device {
                    None => referenced_device = Some(element.device_id),
                    Some(first) if first != element.device_id => {
                        return Err(QueryError::MultipleDevices {
                            first,
                            second: element.device_id,
                        }
                        .into());
                    }
                    Some(_) => {}
                }
            }

            let Some(op) = map_query_element(element) else {
                warn!(
                    "metric {:?} is not event-compatible, skipping query element",
                    element.metric
                );
                element.data_offset = 0;
                element.data_size = 0;
                continue;
            };

            let command = GatherCommand::new(op, blob_size);
            element.data_size = command.data_size();
            element.data_offset = command.output_offset();
            blob_size += command.total_size();
            commands.push(command);
        }

        // Keep blobs in an array mutually aligned.
        blob_size += padding_for(blob_size as usize, BLOB_ALIGN) as u32;

        Ok(FrameQuery {
            commands,
            blob_size,
            referenced_device,
        })
    }

    /// Run every gather strategy in construction order, filling one blob
    /// for the frame described by `ctx`.
    ///
    /// Bytes of `blob` outside the strategies' output slots are left
    /// untouched; their contents are unspecified.
    pub fn gather_to_blob(&self, ctx: &FrameContext, blob: &mut [u8]) {
        assert!(
            blob.len() >= self.blob_size as usize,
            "blob buffer too small: {} < {}",
            blob.len(),
            self.blob_size
        );
        for command in &self.commands {
            command.gather(ctx, blob);
        }
    }

    /// Size in bytes of one output blob; always a multiple of
    /// [`BLOB_ALIGN`].
    pub fn blob_size(&self) -> usize {
        self.blob_size as usize
    }

    /// The single non-universal device this query reads, if any.
    pub fn referenced_device(&self) -> Option<u32> {
        self.referenced_device
    }

    #[cfg(test)]
    pub(crate) fn commands(&self) -> &[GatherCommand] {
        &self.commands
    }
}

const PRESENT: usize = offset_of!(FrameRecord, present);
const GPU: usize = offset_of!(FrameRecord, gpu);
const CPU: usize = offset_of!(FrameRecord, cpu);

/// Verbatim copy of a plain field at `offset`, typed as `T`.
fn copy_of<T>(offset: usize) -> GatherOp {
    GatherOp::Copy(CopySource {
        offset,
        size: size_of::<T>(),
        align: align_of::<T>(),
        null_terminated: false,
    })
}

/// Map one query element to its gather strategy, or `None` when the metric
/// has no per-frame value.
fn map_query_element(element: &QueryElement) -> Option<GatherOp> {
    use GatherOp::*;
    use PresentTimestamp::*;

    let op = match element.metric {
        Metric::Application => GatherOp::Copy(CopySource {
            offset: PRESENT + offset_of!(PresentEvent, application),
            size: APP_NAME_MAX,
            align: 1,
            null_terminated: true,
        }),
        Metric::SwapChainAddress => {
            copy_of::<u64>(PRESENT + offset_of!(PresentEvent, swap_chain_address))
        }
        Metric::PresentMode => copy_of::<i32>(PRESENT + offset_of!(PresentEvent, present_mode)),
        Metric::PresentRuntime => copy_of::<i32>(PRESENT + offset_of!(PresentEvent, runtime)),
        Metric::PresentFlags => copy_of::<u32>(PRESENT + offset_of!(PresentEvent, present_flags)),
        Metric::SyncInterval => copy_of::<i32>(PRESENT + offset_of!(PresentEvent, sync_interval)),
        Metric::AllowsTearing => {
            copy_of::<u8>(PRESENT + offset_of!(PresentEvent, supports_tearing))
        }
        Metric::FrameType => FrameTypeCopy,

        Metric::GpuBusy => QpcDuration(GpuDuration),
        Metric::CpuWait => QpcDuration(TimeInPresent),
        Metric::DroppedFrames => Dropped,
        Metric::CpuStartQpc => CpuFrameQpc,
        Metric::CpuStartTime => StartDifference(PresentStartTime),
        Metric::CpuFrameTime => CpuFrameQpcFrameTime,
        Metric::CpuBusy => CpuFrameQpcDifference {
            end: PresentStartTime,
            dropped_check: false,
        },
        Metric::GpuTime => QpcDifference {
            start: GpuStartTime,
            end: ReadyTime,
            zero_check: false,
            dropped_check: false,
            allow_negative: false,
        },
        Metric::GpuWait => GatherOp::GpuWait,
        Metric::DisplayedTime => DisplayDifference {
            dropped_check: true,
            zero_check: true,
        },
        Metric::AnimationError => AnimationError {
            dropped_check: true,
            zero_check: true,
        },
        Metric::GpuLatency => CpuFrameQpcDifference {
            end: GpuStartTime,
            dropped_check: false,
        },
        Metric::DisplayLatency => GatherOp::DisplayLatency,
        Metric::ClickToPhotonLatency => ClickToPhoton,

        Metric::GpuPower => copy_of::<f64>(GPU + offset_of!(GpuTelemetry, gpu_power_w)),
        Metric::GpuVoltage => copy_of::<f64>(GPU + offset_of!(GpuTelemetry, gpu_voltage_v)),
        Metric::GpuFrequency => copy_of::<f64>(GPU + offset_of!(GpuTelemetry, gpu_frequency_mhz)),
        Metric::GpuTemperature => {
            copy_of::<f64>(GPU + offset_of!(GpuTelemetry, gpu_temperature_c))
        }
        Metric::GpuFanSpeed => {
            // Bounds validation is deferred; clamping keeps the read inside
            // the record.
            let index = (element.array_index as usize).min(MAX_FAN_COUNT - 1);
            copy_of::<f64>(
                GPU + offset_of!(GpuTelemetry, fan_speed_rpm) + index * size_of::<f64>(),
            )
        }
        Metric::GpuUtilization => copy_of::<f64>(GPU + offset_of!(GpuTelemetry, gpu_utilization)),
        Metric::GpuRenderComputeUtilization => {
            copy_of::<f64>(GPU + offset_of!(GpuTelemetry, gpu_render_compute_utilization))
        }
        Metric::GpuMediaUtilization => {
            copy_of::<f64>(GPU + offset_of!(GpuTelemetry, gpu_media_utilization))
        }
        Metric::GpuMemPower => copy_of::<f64>(GPU + offset_of!(GpuTelemetry, vram_power_w)),
        Metric::GpuMemVoltage => copy_of::<f64>(GPU + offset_of!(GpuTelemetry, vram_voltage_v)),
        Metric::GpuMemFrequency => {
            copy_of::<f64>(GPU + offset_of!(GpuTelemetry, vram_frequency_mhz))
        }
        Metric::GpuMemEffectiveFrequency => {
            copy_of::<f64>(GPU + offset_of!(GpuTelemetry, vram_effective_frequency_gbps))
        }
        Metric::GpuMemTemperature => {
            copy_of::<f64>(GPU + offset_of!(GpuTelemetry, vram_temperature_c))
        }
        Metric::GpuMemSize => copy_of::<u64>(GPU + offset_of!(GpuTelemetry, gpu_mem_total_size_b)),
        Metric::GpuMemUsed => copy_of::<u64>(GPU + offset_of!(GpuTelemetry, gpu_mem_used_b)),
        Metric::GpuMemMaxBandwidth => {
            copy_of::<u64>(GPU + offset_of!(GpuTelemetry, gpu_mem_max_bandwidth_bps))
        }
        Metric::GpuMemWriteBandwidth => {
            copy_of::<f64>(GPU + offset_of!(GpuTelemetry, gpu_mem_write_bandwidth_bps))
        }
        Metric::GpuMemReadBandwidth => {
            copy_of::<f64>(GPU + offset_of!(GpuTelemetry, gpu_mem_read_bandwidth_bps))
        }
        Metric::GpuPowerLimited => copy_of::<u8>(GPU + offset_of!(GpuTelemetry, gpu_power_limited)),
        Metric::GpuTemperatureLimited => {
            copy_of::<u8>(GPU + offset_of!(GpuTelemetry, gpu_temperature_limited))
        }
        Metric::GpuCurrentLimited => {
            copy_of::<u8>(GPU + offset_of!(GpuTelemetry, gpu_current_limited))
        }
        Metric::GpuVoltageLimited => {
            copy_of::<u8>(GPU + offset_of!(GpuTelemetry, gpu_voltage_limited))
        }
        Metric::GpuUtilizationLimited => {
            copy_of::<u8>(GPU + offset_of!(GpuTelemetry, gpu_utilization_limited))
        }
        Metric::GpuMemPowerLimited => {
            copy_of::<u8>(GPU + offset_of!(GpuTelemetry, vram_power_limited))
        }
        Metric::GpuMemTemperatureLimited => {
            copy_of::<u8>(GPU + offset_of!(GpuTelemetry, vram_temperature_limited))
        }
        Metric::GpuMemCurrentLimited => {
            copy_of::<u8>(GPU + offset_of!(GpuTelemetry, vram_current_limited))
        }
        Metric::GpuMemVoltageLimited => {
            copy_of::<u8>(GPU + offset_of!(GpuTelemetry, vram_voltage_limited))
        }
        Metric::GpuMemUtilizationLimited => {
            copy_of::<u8>(GPU + offset_of!(GpuTelemetry, vram_utilization_limited))
        }

        Metric::CpuUtilization => copy_of::<f64>(CPU + offset_of!(CpuTelemetry, cpu_utilization)),
        Metric::CpuPower => copy_of::<f64>(CPU + offset_of!(CpuTelemetry, cpu_power_w)),
        Metric::CpuTemperature => {
            copy_of::<f64>(CPU + offset_of!(CpuTelemetry, cpu_temperature_c))
        }
        Metric::CpuFrequency => copy_of::<f64>(CPU + offset_of!(CpuTelemetry, cpu_frequency_mhz)),

        // Statistics-only and static metrics have no per-frame value.
        Metric::PresentedFps
        | Metric::DisplayedFps
        | Metric::GpuSustainedPowerLimit
        | Metric::GpuVendor
        | Metric::GpuName
        | Metric::CpuVendor
        | Metric::CpuName => return None,
    };
    Some(op)
}
