use std::path::Path;

use anyhow::{bail, Context, Result};
use glam::Vec3;

use crate::scene::{BuiltinTexture, TextureKind, TextureSource};

/// Decoded RGBA8 pixels ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureImage {
    pub fn load(source: &TextureSource) -> Result<Self> {
        match source {
            TextureSource::Builtin(builtin) => Ok(Self::builtin(*builtin)),
            TextureSource::File(path) => Self::from_file(path),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("unable to load texture {}", path.display()))?
            .into_rgba8();
        let (width, height) = image.dimensions();
        Ok(Self {
            width,
            height,
            pixels: image.into_raw(),
        })
    }

    pub fn builtin(texture: BuiltinTexture) -> Self {
        match texture {
            BuiltinTexture::BrickColor => brick_color(),
            BuiltinTexture::BrickNormal => brick_normal(),
            BuiltinTexture::FlatNormal => Self::solid([128, 128, 255, 255]),
            BuiltinTexture::CarPaint => car_paint(),
        }
    }

    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: rgba.to_vec(),
        }
    }

    fn from_fn(width: u32, height: u32, mut texel: impl FnMut(u32, u32) -> [u8; 4]) -> Self {
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&texel(x, y));
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Fails unless the image fits a device whose 2D textures are at most
    /// `max_dimension` texels on a side.
    pub fn check_upload(&self, max_dimension: u32) -> Result<()> {
        let (width, height) = (self.width, self.height);
        if width == 0 || height == 0 {
            bail!("texture is empty ({width}x{height})");
        }
        if width > max_dimension || height > max_dimension {
            bail!("texture is {width}x{height} but the device allows at most {max_dimension}x{max_dimension}");
        }
        let expected = width as usize * height as usize * 4;
        if self.pixels.len() != expected {
            bail!(
                "texture holds {} bytes, expected {expected} for {width}x{height} RGBA",
                self.pixels.len()
            );
        }
        Ok(())
    }

    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = ((y * self.width + x) * 4) as usize;
        let mut rgba = [0; 4];
        rgba.copy_from_slice(&self.pixels[offset..offset + 4]);
        rgba
    }
}

const BRICK_SIZE: u32 = 256;
const BRICK_WIDTH: u32 = 64;
const BRICK_HEIGHT: u32 = 32;
const MORTAR: u32 = 3;

/// Brick height field: 1 on a brick face, 0 in the mortar.
fn brick_height(x: u32, y: u32) -> f32 {
    let row = y / BRICK_HEIGHT;
    let shifted = if row % 2 == 0 { x } else { x + BRICK_WIDTH / 2 };
    let bx = shifted % BRICK_WIDTH;
    let by = y % BRICK_HEIGHT;
    let edge = bx.min(BRICK_WIDTH - 1 - bx).min(by).min(BRICK_HEIGHT - 1 - by);
    if edge < MORTAR {
        0.0
    } else {
        1.0
    }
}

fn brick_color() -> TextureImage {
    TextureImage::from_fn(BRICK_SIZE, BRICK_SIZE, |x, y| {
        if brick_height(x, y) == 0.0 {
            return [196, 190, 178, 255];
        }
        // Per-brick tint.
        let brick = (y / BRICK_HEIGHT) * 7 + (x + (y / BRICK_HEIGHT % 2) * BRICK_WIDTH / 2) / BRICK_WIDTH;
        let tint = (brick.wrapping_mul(2_654_435_761) >> 27) as u8;
        [150 + tint, 62 + tint / 2, 48, 255]
    })
}

fn brick_normal() -> TextureImage {
    let max = BRICK_SIZE - 1;
    TextureImage::from_fn(BRICK_SIZE, BRICK_SIZE, |x, y| {
        let dx = brick_height((x + 1).min(max), y) - brick_height(x.saturating_sub(1), y);
        let dy = brick_height(x, (y + 1).min(max)) - brick_height(x, y.saturating_sub(1));
        // Tangent-space axes follow increasing u and v.
        let normal = Vec3::new(-dx, -dy, 1.0).normalize();
        encode_normal(normal)
    })
}

fn car_paint() -> TextureImage {
    TextureImage::from_fn(64, 64, |_, y| {
        if (28..36).contains(&y) {
            [235, 235, 235, 255]
        } else {
            [40, 78, 170, 255]
        }
    })
}

fn encode_normal(normal: Vec3) -> [u8; 4] {
    let encoded = (normal * 0.5 + Vec3::splat(0.5)) * 255.0;
    [
        encoded.x.round() as u8,
        encoded.y.round() as u8,
        encoded.z.round() as u8,
        255,
    ]
}

/// Uploaded texture and its view.
pub struct GpuTexture {
    _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl GpuTexture {
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image: &TextureImage,
        kind: TextureKind,
        label: &str,
    ) -> Result<Self> {
        image
            .check_upload(device.limits().max_texture_dimension_2d)
            .with_context(|| format!("cannot upload texture {label}"))?;
        let format = match kind {
            TextureKind::Color => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureKind::Normal => wgpu::TextureFormat::Rgba8Unorm,
        };
        let size = wgpu::Extent3d {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &image.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * image.width),
                rows_per_image: Some(image.height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Self {
            _texture: texture,
            view,
        })
    }
}
