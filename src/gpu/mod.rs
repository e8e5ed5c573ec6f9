// SPDX-License-Identifier: GPL-3.0-only

//! GPU texture surface for the renderer
//!
//! Uploads each presented image into a wgpu texture and releases the frame's
//! in-flight permit from the queue's submitted-work-done callback. A poller
//! thread drives the device so callbacks fire without a window event loop.

use crate::backends::camera::frame_loop::{LoopAction, LoopController};
use crate::backends::camera::types::Size;
use crate::render::{CompletionHandler, DisplaySurface, RenderTarget};
use image::RgbaImage;
use image::imageops::{self, FilterType};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

pub use wgpu;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Information about the created GPU device
#[derive(Debug)]
pub struct GpuDeviceInfo {
    /// Name of the GPU adapter
    pub adapter_name: String,
    /// Backend being used (Vulkan, Metal, DX12, etc.)
    pub backend: wgpu::Backend,
}

/// Create a wgpu device and queue for presenting depth images
pub async fn create_render_device(
    label: &str,
) -> Result<(Arc<wgpu::Device>, Arc<wgpu::Queue>, GpuDeviceInfo), String> {
    info!(label = label, "Creating GPU device for rendering");

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::VULKAN,
        ..Default::default()
    });

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|e| format!("Failed to find suitable GPU adapter: {}", e))?;

    let adapter_info = adapter.get_info();

    info!(
        adapter = %adapter_info.name,
        backend = ?adapter_info.backend,
        "GPU adapter selected for rendering"
    );

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults(),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        })
        .await
        .map_err(|e| format!("Failed to create GPU device: {}", e))?;

    let info = GpuDeviceInfo {
        adapter_name: adapter_info.name.clone(),
        backend: adapter_info.backend,
    };

    Ok((Arc::new(device), Arc::new(queue), info))
}

struct TextureSlot {
    size: Size,
    texture: Option<wgpu::Texture>,
}

/// Display surface backed by a GPU texture
pub struct TextureSurface {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    slot: Arc<Mutex<TextureSlot>>,
    completed: Arc<AtomicU64>,
    _poller: LoopController,
}

impl TextureSurface {
    pub async fn new(size: Size) -> Result<Self, String> {
        let (device, queue, info) = create_render_device("depthcam-surface").await?;
        debug!(adapter = %info.adapter_name, "Texture surface device ready");

        let poll_device = Arc::clone(&device);
        let poller = LoopController::start("gpu-poll", move || {
            if let Err(e) = poll_device.poll(wgpu::PollType::Poll) {
                warn!(error = %e, "GPU device poll failed");
                return LoopAction::Stop;
            }
            std::thread::sleep(POLL_INTERVAL);
            LoopAction::Continue
        });

        Ok(Self {
            device,
            queue,
            slot: Arc::new(Mutex::new(TextureSlot {
                size,
                texture: None,
            })),
            completed: Arc::new(AtomicU64::new(0)),
            _poller: poller,
        })
    }

    /// Change the texture size; the texture is recreated on the next frame
    pub fn resize(&self, size: Size) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.size != size {
            slot.size = size;
            slot.texture = None;
        }
    }

    /// Frames whose upload the GPU finished
    pub fn completed_frames(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    fn create_texture(&self, size: Size) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depthcam-frame"),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        })
    }
}

impl DisplaySurface for TextureSurface {
    fn drawable_size(&self) -> Size {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .size
    }

    fn next_target(&mut self) -> Option<Box<dyn RenderTarget>> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.size.is_empty() {
            return None;
        }
        let size = slot.size;
        let texture = slot
            .texture
            .get_or_insert_with(|| self.create_texture(size))
            .clone();

        Some(Box::new(TextureTarget {
            queue: Arc::clone(&self.queue),
            texture,
            size,
            pixels: RgbaImage::new(size.width, size.height),
            completed: Arc::clone(&self.completed),
        }))
    }
}

struct TextureTarget {
    queue: Arc<wgpu::Queue>,
    texture: wgpu::Texture,
    size: Size,
    pixels: RgbaImage,
    completed: Arc<AtomicU64>,
}

impl RenderTarget for TextureTarget {
    fn size(&self) -> Size {
        self.size
    }

    fn draw(&mut self, image: &RgbaImage) {
        self.pixels = if image.dimensions() == (self.size.width, self.size.height) {
            image.clone()
        } else {
            imageops::resize(image, self.size.width, self.size.height, FilterType::Triangle)
        };
    }

    fn present(self: Box<Self>, on_complete: CompletionHandler) {
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            self.pixels.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * self.size.width),
                rows_per_image: Some(self.size.height),
            },
            wgpu::Extent3d {
                width: self.size.width,
                height: self.size.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::empty());

        let completed = Arc::clone(&self.completed);
        self.queue.on_submitted_work_done(move || {
            completed.fetch_add(1, Ordering::SeqCst);
            on_complete();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_render_device() {
        // This test requires a GPU, so it may be skipped in CI
        match create_render_device("test_device").await {
            Ok((device, queue, info)) => {
                println!("Created device: {:?}", info);
                assert!(!info.adapter_name.is_empty());
                drop(queue);
                drop(device);
            }
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
            }
        }
    }
}
