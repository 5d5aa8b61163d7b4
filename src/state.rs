// RustGlim
// copyright zipxing@hotmail.com 2022～2025

//! Render-state machine: blend mode, current program, auxiliary texture
//! slots, framebuffer target and the tracked enable/disable flags.
//!
//! The state object is pure bookkeeping. It answers "does this change
//! require draining the batch first?" and "which blend func/equation pair
//! does this mode map to?"; the driver calls themselves are issued by
//! `GlimContext`.

use crate::math::Matrix;
use crate::DEFAULT_BATCH_MAX_TEXTURE_UNITS;
use bitflags::bitflags;

/// Color blending presets plus the two caller-configured modes. Each maps
/// to exactly one blend func / equation setup.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlendMode {
    Alpha,
    Additive,
    Multiplied,
    AddColors,
    SubtractColors,
    AlphaPremultiply,
    Custom,
    CustomSeparate,
}

/// Raw factors for [`BlendMode::Custom`], as GL enums.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlendFactors {
    pub src: u32,
    pub dst: u32,
    pub equation: u32,
}

/// Raw per-channel factors for [`BlendMode::CustomSeparate`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlendFactorsSeparate {
    pub src_rgb: u32,
    pub dst_rgb: u32,
    pub src_alpha: u32,
    pub dst_alpha: u32,
    pub eq_rgb: u32,
    pub eq_alpha: u32,
}

/// The blend configuration a mode resolves to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlendSetup {
    Combined { src: u32, dst: u32, equation: u32 },
    Separate(BlendFactorsSeparate),
}

bitflags! {
    /// Tracked render toggles, mirrored on every enable/disable call.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct StateFlags: u32 {
        const DEPTH_TEST       = 1 << 0;
        const BACKFACE_CULLING = 1 << 1;
        const SCISSOR_TEST     = 1 << 2;
        const COLOR_BLEND      = 1 << 3;
        const STEREO_RENDER    = 1 << 4;
    }
}

/// Everything the batching layer needs to remember between driver calls.
pub struct RenderState {
    /// Custom program selected by the caller; `None` means the default
    /// shader owned by the context.
    pub program: Option<glow::Program>,
    /// mvp location of the selected program (cached at `set_shader`).
    pub program_mvp_loc: Option<glow::UniformLocation>,

    pub blend_mode: BlendMode,
    pub blend_custom: BlendFactors,
    pub blend_custom_separate: BlendFactorsSeparate,
    blend_modified: bool,

    pub flags: StateFlags,

    /// Auxiliary textures bound to units 1..N at flush, cleared after.
    aux_textures: [Option<glow::Texture>; DEFAULT_BATCH_MAX_TEXTURE_UNITS],

    /// Render target; `None` is the window framebuffer.
    pub framebuffer: Option<glow::Framebuffer>,
    pub framebuffer_width: i32,
    pub framebuffer_height: i32,

    pub projection_stereo: [Matrix; 2],
    pub view_offset_stereo: [Matrix; 2],
}

impl RenderState {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            program: None,
            program_mvp_loc: None,
            blend_mode: BlendMode::Alpha,
            blend_custom: BlendFactors {
                src: glow::SRC_ALPHA,
                dst: glow::ONE_MINUS_SRC_ALPHA,
                equation: glow::FUNC_ADD,
            },
            blend_custom_separate: BlendFactorsSeparate {
                src_rgb: glow::SRC_ALPHA,
                dst_rgb: glow::ONE_MINUS_SRC_ALPHA,
                src_alpha: glow::SRC_ALPHA,
                dst_alpha: glow::ONE_MINUS_SRC_ALPHA,
                eq_rgb: glow::FUNC_ADD,
                eq_alpha: glow::FUNC_ADD,
            },
            blend_modified: false,
            flags: StateFlags::COLOR_BLEND | StateFlags::BACKFACE_CULLING,
            aux_textures: [None; DEFAULT_BATCH_MAX_TEXTURE_UNITS],
            framebuffer: None,
            framebuffer_width: width,
            framebuffer_height: height,
            projection_stereo: [Matrix::new(), Matrix::new()],
            view_offset_stereo: [Matrix::new(), Matrix::new()],
        }
    }

    /// A blend-mode change needs a flush when the mode itself changes, or
    /// when a custom mode is re-selected after its factors were re-set.
    pub fn blend_change_needs_flush(&self, mode: BlendMode) -> bool {
        self.blend_mode != mode
            || ((mode == BlendMode::Custom || mode == BlendMode::CustomSeparate)
                && self.blend_modified)
    }

    pub fn commit_blend_mode(&mut self, mode: BlendMode) {
        self.blend_mode = mode;
        self.blend_modified = false;
    }

    pub fn set_blend_factors(&mut self, src: u32, dst: u32, equation: u32) {
        let f = BlendFactors { src, dst, equation };
        if self.blend_custom != f {
            self.blend_custom = f;
            self.blend_modified = true;
        }
    }

    pub fn set_blend_factors_separate(&mut self, f: BlendFactorsSeparate) {
        if self.blend_custom_separate != f {
            self.blend_custom_separate = f;
            self.blend_modified = true;
        }
    }

    /// Resolve a mode to its func/equation setup. Exhaustive on purpose:
    /// a new mode must be given a mapping here before it can exist.
    pub fn blend_setup(&self, mode: BlendMode) -> BlendSetup {
        match mode {
            BlendMode::Alpha => BlendSetup::Combined {
                src: glow::SRC_ALPHA,
                dst: glow::ONE_MINUS_SRC_ALPHA,
                equation: glow::FUNC_ADD,
            },
            BlendMode::Additive => BlendSetup::Combined {
                src: glow::SRC_ALPHA,
                dst: glow::ONE,
                equation: glow::FUNC_ADD,
            },
            BlendMode::Multiplied => BlendSetup::Combined {
                src: glow::DST_COLOR,
                dst: glow::ONE_MINUS_SRC_ALPHA,
                equation: glow::FUNC_ADD,
            },
            BlendMode::AddColors => BlendSetup::Combined {
                src: glow::ONE,
                dst: glow::ONE,
                equation: glow::FUNC_ADD,
            },
            BlendMode::SubtractColors => BlendSetup::Combined {
                src: glow::ONE,
                dst: glow::ONE,
                equation: glow::FUNC_SUBTRACT,
            },
            BlendMode::AlphaPremultiply => BlendSetup::Combined {
                src: glow::ONE,
                dst: glow::ONE_MINUS_SRC_ALPHA,
                equation: glow::FUNC_ADD,
            },
            BlendMode::Custom => BlendSetup::Combined {
                src: self.blend_custom.src,
                dst: self.blend_custom.dst,
                equation: self.blend_custom.equation,
            },
            BlendMode::CustomSeparate => BlendSetup::Separate(self.blend_custom_separate),
        }
    }

    /// Register a texture for an auxiliary unit. Returns the texture unit
    /// index (1-based; unit 0 carries the span texture), reusing the slot
    /// when the texture is already registered, `None` when the table is
    /// full.
    pub fn register_aux_texture(&mut self, texture: glow::Texture) -> Option<u32> {
        for (i, slot) in self.aux_textures.iter().enumerate() {
            if *slot == Some(texture) {
                return Some(i as u32 + 1);
            }
        }
        for (i, slot) in self.aux_textures.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(texture);
                return Some(i as u32 + 1);
            }
        }
        None
    }

    pub fn aux_textures(&self) -> &[Option<glow::Texture>] {
        &self.aux_textures
    }

    pub fn clear_aux_textures(&mut self) {
        self.aux_textures = [None; DEFAULT_BATCH_MAX_TEXTURE_UNITS];
    }

    pub fn stereo(&self) -> bool {
        self.flags.contains(StateFlags::STEREO_RENDER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;

    fn tex(n: u32) -> glow::Texture {
        glow::NativeTexture(NonZeroU32::new(n).unwrap())
    }

    #[test]
    fn test_blend_mode_change_needs_flush() {
        let s = RenderState::new(320, 200);
        assert!(!s.blend_change_needs_flush(BlendMode::Alpha));
        assert!(s.blend_change_needs_flush(BlendMode::Additive));
    }

    #[test]
    fn test_custom_factor_update_forces_reapply() {
        let mut s = RenderState::new(320, 200);
        s.commit_blend_mode(BlendMode::Custom);
        assert!(!s.blend_change_needs_flush(BlendMode::Custom));

        // same values: nothing changed, no flush
        s.set_blend_factors(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA, glow::FUNC_ADD);
        assert!(!s.blend_change_needs_flush(BlendMode::Custom));

        // new values: re-selecting Custom must drain first
        s.set_blend_factors(glow::ONE, glow::ONE, glow::FUNC_ADD);
        assert!(s.blend_change_needs_flush(BlendMode::Custom));
        // but a preset mode only flushes because the mode differs
        s.commit_blend_mode(BlendMode::Custom);
        assert!(!s.blend_change_needs_flush(BlendMode::Custom));
    }

    #[test]
    fn test_blend_setup_mapping() {
        let s = RenderState::new(1, 1);
        assert_eq!(
            s.blend_setup(BlendMode::Alpha),
            BlendSetup::Combined {
                src: glow::SRC_ALPHA,
                dst: glow::ONE_MINUS_SRC_ALPHA,
                equation: glow::FUNC_ADD,
            }
        );
        assert_eq!(
            s.blend_setup(BlendMode::SubtractColors),
            BlendSetup::Combined {
                src: glow::ONE,
                dst: glow::ONE,
                equation: glow::FUNC_SUBTRACT,
            }
        );
        assert_eq!(
            s.blend_setup(BlendMode::Multiplied),
            BlendSetup::Combined {
                src: glow::DST_COLOR,
                dst: glow::ONE_MINUS_SRC_ALPHA,
                equation: glow::FUNC_ADD,
            }
        );
    }

    #[test]
    fn test_custom_setup_uses_stored_factors() {
        let mut s = RenderState::new(1, 1);
        s.set_blend_factors(glow::ONE, glow::DST_COLOR, glow::FUNC_SUBTRACT);
        assert_eq!(
            s.blend_setup(BlendMode::Custom),
            BlendSetup::Combined {
                src: glow::ONE,
                dst: glow::DST_COLOR,
                equation: glow::FUNC_SUBTRACT,
            }
        );
    }

    #[test]
    fn test_aux_slots_dedup_and_fill() {
        let mut s = RenderState::new(1, 1);
        assert_eq!(s.register_aux_texture(tex(10)), Some(1));
        // registering again reuses the slot
        assert_eq!(s.register_aux_texture(tex(10)), Some(1));
        assert_eq!(s.register_aux_texture(tex(11)), Some(2));
        assert_eq!(s.register_aux_texture(tex(12)), Some(3));
        assert_eq!(s.register_aux_texture(tex(13)), Some(4));
        // table full
        assert_eq!(s.register_aux_texture(tex(14)), None);

        s.clear_aux_textures();
        assert!(s.aux_textures().iter().all(|t| t.is_none()));
        assert_eq!(s.register_aux_texture(tex(14)), Some(1));
    }

    #[test]
    fn test_default_flags() {
        let s = RenderState::new(1, 1);
        assert!(s.flags.contains(StateFlags::COLOR_BLEND));
        assert!(s.flags.contains(StateFlags::BACKFACE_CULLING));
        assert!(!s.flags.contains(StateFlags::DEPTH_TEST));
        assert!(!s.stereo());
    }
}
