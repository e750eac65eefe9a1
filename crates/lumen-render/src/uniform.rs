use bytemuck::Pod;
use tracing::trace;

use crate::error::RenderError;
use crate::gpu::{BufferId, BufferUsage, GpuBackend};

/// Sync state of a [`UniformBuffer`]'s host value against GPU memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformStatus {
    /// No GPU buffer yet, or it must be recreated
    Reset,
    /// Host value changed since the last flush
    Changed,
    /// GPU memory matches the host value
    Normal,
}

/// A host value mirrored into a GPU uniform buffer.
///
/// Writes only mark the buffer dirty; GPU memory is touched in
/// [`flush`](Self::flush), which pipelines call before binding.
pub struct UniformBuffer<T: Pod> {
    value: T,
    buffer: Option<BufferId>,
    status: UniformStatus,
}

impl<T: Pod + PartialEq> UniformBuffer<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            buffer: None,
            status: UniformStatus::Reset,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Replace the host value. Setting an equal value keeps the status.
    pub fn set(&mut self, value: T) {
        if value == self.value {
            return;
        }
        self.value = value;
        if self.status == UniformStatus::Normal {
            self.status = UniformStatus::Changed;
        }
    }

    pub fn status(&self) -> UniformStatus {
        self.status
    }

    pub fn buffer(&self) -> Option<BufferId> {
        self.buffer
    }

    /// Bring GPU memory up to date. Returns `true` if anything was written.
    pub fn flush(&mut self, backend: &mut dyn GpuBackend) -> Result<bool, RenderError> {
        match (self.status, self.buffer) {
            (UniformStatus::Normal, _) => return Ok(false),
            (UniformStatus::Changed, Some(buffer)) => {
                backend.write_buffer(buffer, bytemuck::bytes_of(&self.value))?;
            }
            (_, previous) => {
                if let Some(previous) = previous {
                    backend.destroy_buffer(previous);
                }
                self.buffer =
                    Some(backend.create_buffer(BufferUsage::Uniform, bytemuck::bytes_of(&self.value))?);
            }
        }
        trace!("flushed {} byte uniform", std::mem::size_of::<T>());
        self.status = UniformStatus::Normal;
        Ok(true)
    }

    /// Force the buffer to be recreated on the next flush.
    pub fn reset(&mut self) {
        self.status = UniformStatus::Reset;
    }

    pub fn destroy(&mut self, backend: &mut dyn GpuBackend) {
        if let Some(buffer) = self.buffer.take() {
            backend.destroy_buffer(buffer);
        }
        self.status = UniformStatus::Reset;
    }
}
