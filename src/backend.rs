//! Compute backend abstraction.
//!
//! A backend describes what it can do through [`BackendCapabilities`] and is the factory
//! for the convolution engine and for the sample buffers the render thread mixes into.
//! The engine picks its options once during `init` and never branches on the backend
//! type afterwards.

use crate::convolution::{
    ConvolutionParams, ConvolutionProcessor, ResponsePublisher, host_convolution,
};
use crate::error::{AuralisError, Result};

/// Scheduling priority requested for the convolution work queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePriority {
    #[default]
    Default,
    Medium,
    /// Reserve `n` dedicated compute units
    Reserved(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackendCapabilities {
    /// Buffers can live in backend memory rather than host memory
    pub device_buffers: bool,
    /// `Medium` and `Reserved` priorities are honoured
    pub priority_queues: bool,
    /// Upper bound for `QueuePriority::Reserved`
    pub max_reserved_queues: u32,
}

/// Caller preferences forwarded to the backend at `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackendSelection {
    pub prefer_device_buffers: bool,
    pub queue_priority: QueuePriority,
}

pub trait ComputeBackend: Send {
    fn name(&self) -> &str;

    fn capabilities(&self) -> BackendCapabilities;

    /// Maps a requested priority onto one the backend supports.
    /// Anything unsupported degrades to `QueuePriority::Default`.
    fn resolve_priority(&self, requested: QueuePriority) -> QueuePriority {
        let caps = self.capabilities();
        let supported = match requested {
            QueuePriority::Default => true,
            QueuePriority::Medium => caps.priority_queues,
            QueuePriority::Reserved(n) => {
                caps.priority_queues && n > 0 && n <= caps.max_reserved_queues
            }
        };
        if supported {
            requested
        } else {
            log::warn!(
                "Backend '{}' does not support {:?} queues, using default priority",
                self.name(),
                requested
            );
            QueuePriority::Default
        }
    }

    fn create_convolution(
        &self,
        params: &ConvolutionParams,
        priority: QueuePriority,
    ) -> Result<(Box<dyn ConvolutionProcessor>, Box<dyn ResponsePublisher>)>;

    /// Allocates a zeroed buffer of `len` samples.
    fn allocate(&self, len: usize, device_resident: bool) -> Result<SampleBuffer>;
}

#[derive(Debug, Clone, PartialEq)]
enum Backing {
    Host(Vec<f32>),
    /// Host-side staging copy plus the backend-resident copy
    DeviceResident { staging: Vec<f32>, resident: Vec<f32> },
}

/// Opaque sample buffer handle. Callers read and write the host view and call
/// [`SampleBuffer::synchronize`] to make the contents visible to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    backing: Backing,
}

impl SampleBuffer {
    pub fn host(len: usize) -> Self {
        Self {
            backing: Backing::Host(vec![0.0; len]),
        }
    }

    pub fn device_resident(len: usize) -> Self {
        Self {
            backing: Backing::DeviceResident {
                staging: vec![0.0; len],
                resident: vec![0.0; len],
            },
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_device_resident(&self) -> bool {
        matches!(self.backing, Backing::DeviceResident { .. })
    }

    pub fn as_slice(&self) -> &[f32] {
        match &self.backing {
            Backing::Host(data) => data,
            Backing::DeviceResident { staging, .. } => staging,
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        match &mut self.backing {
            Backing::Host(data) => data,
            Backing::DeviceResident { staging, .. } => staging,
        }
    }

    /// Uploads the host view to backend memory. No-op for host buffers.
    pub fn synchronize(&mut self) {
        if let Backing::DeviceResident { staging, resident } = &mut self.backing {
            resident.copy_from_slice(staging);
        }
    }

    /// Contents as last seen by the backend.
    pub fn resident(&self) -> &[f32] {
        match &self.backing {
            Backing::Host(data) => data,
            Backing::DeviceResident { resident, .. } => resident,
        }
    }
}

/// Host-memory backend running convolution on the calling threads.
#[derive(Debug, Clone, Default)]
pub struct CpuBackend {
    capabilities: BackendCapabilities,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the reported capabilities.
    pub fn with_capabilities(capabilities: BackendCapabilities) -> Self {
        Self { capabilities }
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    fn create_convolution(
        &self,
        params: &ConvolutionParams,
        priority: QueuePriority,
    ) -> Result<(Box<dyn ConvolutionProcessor>, Box<dyn ResponsePublisher>)> {
        log::debug!("CPU convolution requested at {:?} priority", priority);
        host_convolution(params)
    }

    fn allocate(&self, len: usize, device_resident: bool) -> Result<SampleBuffer> {
        if device_resident && !self.capabilities.device_buffers {
            return Err(AuralisError::Backend(
                "Device-resident buffers are not supported".into(),
            ));
        }
        Ok(if device_resident {
            SampleBuffer::device_resident(len)
        } else {
            SampleBuffer::host(len)
        })
    }
}
