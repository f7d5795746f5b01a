//! Lighting, fog and colour-correction parameters
//!
//! Plain values carried by [`DrawContext`](super::DrawContext) and read by the
//! draw backend. None of them feed the view or shadow fit, so changing them
//! never dirties the context cache.

use crate::foundation::math::{utils, Vec3};

/// Lowest gamma accepted by [`ColorCorrection`]
pub const MIN_GAMMA: f32 = 0.01;

/// Hemispherical ambient light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HemiLight {
    /// Sky colour
    pub upper: Vec3,
    /// Ground colour
    pub lower: Vec3,
    /// Unit "sky" direction
    pub up: Vec3,
    /// Blend exponent
    pub exp: f32,
    /// Overall gain
    pub gain: f32,
}

impl Default for HemiLight {
    fn default() -> Self {
        Self {
            upper: Vec3::new(1.1, 1.09, 1.12),
            lower: Vec3::new(0.12, 0.08, 0.06),
            up: Vec3::y(),
            exp: 1.0,
            gain: 1.0,
        }
    }
}

impl HemiLight {
    /// Same colour above and below
    pub fn set_const(&mut self, rgb: Vec3) {
        self.upper = rgb;
        self.lower = rgb;
    }

    /// Set the sky direction; zero vectors are ignored
    pub fn set_up(&mut self, up: Vec3) {
        let n = utils::normalize_or_zero(&up);
        if n != Vec3::zeros() {
            self.up = n;
        }
    }
}

/// Directional specular light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpecLight {
    /// Unit light direction
    pub dir: Vec3,
    /// Light colour
    pub rgb: Vec3,
    /// How much shadows attenuate the highlight
    pub shadowing: f32,
    /// Specular term on/off
    pub enabled: bool,
}

impl Default for SpecLight {
    fn default() -> Self {
        Self {
            dir: Vec3::new(0.0, 0.0, -1.0),
            rgb: Vec3::repeat(1.0),
            shadowing: 1.0,
            enabled: true,
        }
    }
}

impl SpecLight {
    /// Set the direction; zero vectors are ignored
    pub fn set_dir(&mut self, dir: Vec3) {
        let n = utils::normalize_or_zero(&dir);
        if n != Vec3::zeros() {
            self.dir = n;
        }
    }
}

/// Distance fog
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fog {
    /// Fog colour
    pub rgb: Vec3,
    density: f32,
    start: f32,
    end: f32,
    /// Bezier control points of the falloff curve
    pub curve: [f32; 2],
}

impl Default for Fog {
    fn default() -> Self {
        Self {
            rgb: Vec3::repeat(1.0),
            density: 0.0,
            start: 10.0,
            end: 1000.0,
            curve: Self::LINEAR,
        }
    }
}

impl Fog {
    /// Control points of a straight-line falloff
    pub const LINEAR: [f32; 2] = [1.0 / 3.0, 2.0 / 3.0];

    /// Set density, clamped to non-negative
    pub fn set_density(&mut self, density: f32) {
        self.density = density.max(0.0);
    }

    /// Fog density
    pub fn density(&self) -> f32 {
        self.density
    }

    /// Set start and end distances
    pub fn set_range(&mut self, start: f32, end: f32) {
        self.start = start;
        self.end = end;
    }

    /// Start distance
    pub fn start(&self) -> f32 {
        self.start
    }

    /// End distance
    pub fn end(&self) -> f32 {
        self.end
    }

    /// `1 / (end - start)`, zero for an empty range
    pub fn range_rcp(&self) -> f32 {
        utils::rcp0(self.end - self.start)
    }

    /// Set the falloff curve
    pub fn set_curve(&mut self, cp1: f32, cp2: f32) {
        self.curve = [cp1, cp2];
    }

    /// Use a straight-line falloff
    pub fn set_linear(&mut self) {
        self.curve = Self::LINEAR;
    }
}

/// Final colour correction applied by the backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorCorrection {
    gamma: Vec3,
    /// Exposure per channel; negative disables tone mapping
    pub exposure: Vec3,
    /// Linear white point
    pub linear_white: Vec3,
    /// Linear gain
    pub linear_gain: Vec3,
    /// Linear bias
    pub linear_bias: Vec3,
}

impl Default for ColorCorrection {
    fn default() -> Self {
        Self {
            gamma: Vec3::repeat(2.2),
            exposure: Vec3::repeat(-1.0),
            linear_white: Vec3::repeat(1.0),
            linear_gain: Vec3::repeat(1.0),
            linear_bias: Vec3::zeros(),
        }
    }
}

impl ColorCorrection {
    /// Set gamma per channel, clamped to [`MIN_GAMMA`]
    pub fn set_gamma_rgb(&mut self, rgb: Vec3) {
        self.gamma = rgb.map(|g| g.max(MIN_GAMMA));
    }

    /// Gamma per channel
    pub fn gamma(&self) -> Vec3 {
        self.gamma
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fog_range_and_density() {
        let mut fog = Fog::default();
        assert_relative_eq!(fog.range_rcp(), 1.0 / 990.0);
        fog.set_range(5.0, 5.0);
        assert_eq!(fog.range_rcp(), 0.0);
        fog.set_density(-3.0);
        assert_eq!(fog.density(), 0.0);
        fog.set_curve(0.1, 0.9);
        fog.set_linear();
        assert_eq!(fog.curve, Fog::LINEAR);
    }

    #[test]
    fn test_gamma_floor_and_directions() {
        let mut cc = ColorCorrection::default();
        cc.set_gamma_rgb(Vec3::new(0.0, 1.0, -2.0));
        assert_eq!(cc.gamma(), Vec3::new(MIN_GAMMA, 1.0, MIN_GAMMA));

        let mut spec = SpecLight::default();
        spec.set_dir(Vec3::new(3.0, 0.0, 0.0));
        assert_relative_eq!(spec.dir, Vec3::x());
        spec.set_dir(Vec3::zeros());
        assert_relative_eq!(spec.dir, Vec3::x());

        let mut hemi = HemiLight::default();
        hemi.set_up(Vec3::new(0.0, 0.0, 2.0));
        assert_relative_eq!(hemi.up, Vec3::z());
    }
}
