// RustGlim
// copyright zipxing@hotmail.com 2022～2025

//! Texture wrappers: pixel-format dispatch, plain 2D textures and
//! render-to-texture targets.

use glow::HasContext;
use log::warn;

/// Supported pixel layouts. Compressed variants are part of the closed
/// set so callers can name them, but this backend refuses to upload them:
/// a warn plus `Err`, no GPU object is created.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PixelFormat {
    UncompressedGrayscale,
    UncompressedGrayAlpha,
    UncompressedR5G6B5,
    UncompressedR8G8B8,
    UncompressedR5G5B5A1,
    UncompressedR4G4B4A4,
    UncompressedR8G8B8A8,
    UncompressedR32G32B32A32,
    CompressedDxt1Rgb,
    CompressedDxt1Rgba,
    CompressedDxt5Rgba,
    CompressedEtc2Rgb,
    CompressedEtc2EacRgba,
    CompressedAstc4x4Rgba,
}

impl PixelFormat {
    pub fn is_compressed(self) -> bool {
        matches!(
            self,
            PixelFormat::CompressedDxt1Rgb
                | PixelFormat::CompressedDxt1Rgba
                | PixelFormat::CompressedDxt5Rgba
                | PixelFormat::CompressedEtc2Rgb
                | PixelFormat::CompressedEtc2EacRgba
                | PixelFormat::CompressedAstc4x4Rgba
        )
    }

    /// Bytes per pixel for uncompressed layouts.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::UncompressedGrayscale => Some(1),
            PixelFormat::UncompressedGrayAlpha => Some(2),
            PixelFormat::UncompressedR5G6B5 => Some(2),
            PixelFormat::UncompressedR8G8B8 => Some(3),
            PixelFormat::UncompressedR5G5B5A1 => Some(2),
            PixelFormat::UncompressedR4G4B4A4 => Some(2),
            PixelFormat::UncompressedR8G8B8A8 => Some(4),
            PixelFormat::UncompressedR32G32B32A32 => Some(16),
            PixelFormat::CompressedDxt1Rgb
            | PixelFormat::CompressedDxt1Rgba
            | PixelFormat::CompressedDxt5Rgba
            | PixelFormat::CompressedEtc2Rgb
            | PixelFormat::CompressedEtc2EacRgba
            | PixelFormat::CompressedAstc4x4Rgba => None,
        }
    }

    /// (internal format, data format, data type) for the upload call.
    pub fn gl_layout(self) -> Option<(i32, u32, u32)> {
        match self {
            PixelFormat::UncompressedGrayscale => {
                Some((glow::R8 as i32, glow::RED, glow::UNSIGNED_BYTE))
            }
            PixelFormat::UncompressedGrayAlpha => {
                Some((glow::RG8 as i32, glow::RG, glow::UNSIGNED_BYTE))
            }
            PixelFormat::UncompressedR5G6B5 => {
                Some((glow::RGB565 as i32, glow::RGB, glow::UNSIGNED_SHORT_5_6_5))
            }
            PixelFormat::UncompressedR8G8B8 => {
                Some((glow::RGB8 as i32, glow::RGB, glow::UNSIGNED_BYTE))
            }
            PixelFormat::UncompressedR5G5B5A1 => Some((
                glow::RGB5_A1 as i32,
                glow::RGBA,
                glow::UNSIGNED_SHORT_5_5_5_1,
            )),
            PixelFormat::UncompressedR4G4B4A4 => Some((
                glow::RGBA4 as i32,
                glow::RGBA,
                glow::UNSIGNED_SHORT_4_4_4_4,
            )),
            PixelFormat::UncompressedR8G8B8A8 => {
                Some((glow::RGBA8 as i32, glow::RGBA, glow::UNSIGNED_BYTE))
            }
            PixelFormat::UncompressedR32G32B32A32 => {
                Some((glow::RGBA32F as i32, glow::RGBA, glow::FLOAT))
            }
            PixelFormat::CompressedDxt1Rgb
            | PixelFormat::CompressedDxt1Rgba
            | PixelFormat::CompressedDxt5Rgba
            | PixelFormat::CompressedEtc2Rgb
            | PixelFormat::CompressedEtc2EacRgba
            | PixelFormat::CompressedAstc4x4Rgba => None,
        }
    }
}

pub struct GlTexture {
    pub texture: glow::Texture,
    pub width: i32,
    pub height: i32,
    pub format: PixelFormat,
}

impl GlTexture {
    /// Upload a texture. `data: None` allocates uninitialized storage.
    /// Wrap defaults to REPEAT and filtering to NEAREST.
    pub fn new(
        gl: &glow::Context,
        width: i32,
        height: i32,
        format: PixelFormat,
        data: Option<&[u8]>,
    ) -> Result<Self, String> {
        let (internal, layout, ty) = match format.gl_layout() {
            Some(l) => l,
            None => {
                warn!("compressed pixel format {:?} not supported, texture not created", format);
                return Err(format!("unsupported pixel format: {:?}", format));
            }
        };
        if let Some(d) = data {
            let expected = width as usize * height as usize * format.bytes_per_pixel().unwrap_or(0);
            if d.len() < expected {
                warn!(
                    "texture data too short: {} bytes, expected {}",
                    d.len(),
                    expected
                );
                return Err("texture data too short".to_string());
            }
        }
        unsafe {
            let texture = gl.create_texture()?;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                internal,
                width,
                height,
                0,
                layout,
                ty,
                data,
            );
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::REPEAT as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::REPEAT as i32);
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MIN_FILTER,
                glow::NEAREST as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MAG_FILTER,
                glow::NEAREST as i32,
            );
            gl.bind_texture(glow::TEXTURE_2D, None);

            Ok(Self {
                texture,
                width,
                height,
                format,
            })
        }
    }

    /// The 1x1 opaque-white texture every untextured draw samples.
    pub fn white_placeholder(gl: &glow::Context) -> Result<Self, String> {
        Self::new(
            gl,
            1,
            1,
            PixelFormat::UncompressedR8G8B8A8,
            Some(&[255, 255, 255, 255]),
        )
    }

    /// Sub-image update; the region must lie inside the texture and the
    /// data must use the texture's own format.
    pub fn update(
        &self,
        gl: &glow::Context,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        data: &[u8],
    ) -> Result<(), String> {
        let (_, layout, ty) = match self.format.gl_layout() {
            Some(l) => l,
            None => {
                warn!("cannot update texture with format {:?}", self.format);
                return Err(format!("unsupported pixel format: {:?}", self.format));
            }
        };
        if x < 0 || y < 0 || x + width > self.width || y + height > self.height {
            warn!(
                "texture update region {}x{}+{}+{} outside {}x{}",
                width, height, x, y, self.width, self.height
            );
            return Err("texture update region out of bounds".to_string());
        }
        let expected =
            width as usize * height as usize * self.format.bytes_per_pixel().unwrap_or(0);
        if data.len() < expected {
            warn!(
                "texture update data too short: {} bytes, expected {}",
                data.len(),
                expected
            );
            return Err("texture update data too short".to_string());
        }
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(self.texture));
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.tex_sub_image_2d(
                glow::TEXTURE_2D,
                0,
                x,
                y,
                width,
                height,
                layout,
                ty,
                glow::PixelUnpackData::Slice(data),
            );
            gl.bind_texture(glow::TEXTURE_2D, None);
        }
        Ok(())
    }

    pub fn generate_mipmaps(&self, gl: &glow::Context) {
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(self.texture));
            gl.generate_mipmap(glow::TEXTURE_2D);
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MIN_FILTER,
                glow::NEAREST_MIPMAP_LINEAR as i32,
            );
            gl.bind_texture(glow::TEXTURE_2D, None);
        }
    }

    pub fn bind(&self, gl: &glow::Context) {
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(self.texture));
        }
    }

    pub fn get_texture(&self) -> glow::Texture {
        self.texture
    }

    pub fn free(&self, gl: &glow::Context) {
        unsafe {
            gl.delete_texture(self.texture);
        }
    }
}

/// Off-screen render target: framebuffer plus RGBA color attachment.
pub struct GlRenderTexture {
    pub framebuffer: glow::Framebuffer,
    pub texture: glow::Texture,
    pub width: i32,
    pub height: i32,
}

impl GlRenderTexture {
    pub fn new(gl: &glow::Context, width: i32, height: i32) -> Result<Self, String> {
        unsafe {
            let framebuffer = gl.create_framebuffer()?;
            let texture = gl.create_texture()?;

            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                width,
                height,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                None,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MIN_FILTER,
                glow::NEAREST as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MAG_FILTER,
                glow::NEAREST as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_S,
                glow::CLAMP_TO_EDGE as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_T,
                glow::CLAMP_TO_EDGE as i32,
            );

            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(texture),
                0,
            );
            if gl.check_framebuffer_status(glow::FRAMEBUFFER) != glow::FRAMEBUFFER_COMPLETE {
                gl.bind_framebuffer(glow::FRAMEBUFFER, None);
                gl.delete_framebuffer(framebuffer);
                gl.delete_texture(texture);
                return Err("framebuffer is not complete".to_string());
            }
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            gl.bind_texture(glow::TEXTURE_2D, None);

            Ok(Self {
                framebuffer,
                texture,
                width,
                height,
            })
        }
    }

    pub fn bind(&self, gl: &glow::Context) {
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(self.framebuffer));
        }
    }

    pub fn unbind(&self, gl: &glow::Context) {
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        }
    }

    pub fn get_texture(&self) -> glow::Texture {
        self.texture
    }

    pub fn free(&self, gl: &glow::Context) {
        unsafe {
            gl.delete_framebuffer(self.framebuffer);
            gl.delete_texture(self.texture);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressed_formats_have_no_layout() {
        for f in [
            PixelFormat::CompressedDxt1Rgb,
            PixelFormat::CompressedDxt1Rgba,
            PixelFormat::CompressedDxt5Rgba,
            PixelFormat::CompressedEtc2Rgb,
            PixelFormat::CompressedEtc2EacRgba,
            PixelFormat::CompressedAstc4x4Rgba,
        ] {
            assert!(f.is_compressed());
            assert!(f.gl_layout().is_none());
            assert!(f.bytes_per_pixel().is_none());
        }
    }

    #[test]
    fn test_uncompressed_layouts() {
        assert_eq!(
            PixelFormat::UncompressedR8G8B8A8.gl_layout(),
            Some((glow::RGBA8 as i32, glow::RGBA, glow::UNSIGNED_BYTE))
        );
        assert_eq!(
            PixelFormat::UncompressedR5G6B5.gl_layout(),
            Some((glow::RGB565 as i32, glow::RGB, glow::UNSIGNED_SHORT_5_6_5))
        );
        assert_eq!(PixelFormat::UncompressedGrayscale.bytes_per_pixel(), Some(1));
        assert_eq!(
            PixelFormat::UncompressedR32G32B32A32.bytes_per_pixel(),
            Some(16)
        );
    }
}
