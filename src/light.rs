#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Light {
    pub position: [f32; 4],
    /// rgb color, intensity in w
    pub color: [f32; 4],
}

pub const MAX_DIRECTIONAL_LIGHTS: usize = 4;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightArrayGpu {
    directional: [Light; MAX_DIRECTIONAL_LIGHTS],
    ambient: [f32; 4],
    num_lights: u32,
    _padding: [u32; 3],
}

impl Default for Light {
    fn default() -> Self {
        Self {
            position: [0.0; 4],
            color: [0.0; 4],
        }
    }
}

fn rgb_from_hex(hex: u32) -> [f32; 3] {
    [
        ((hex >> 16) & 0xff) as f32 / 255.0,
        ((hex >> 8) & 0xff) as f32 / 255.0,
        (hex & 0xff) as f32 / 255.0,
    ]
}

/// Fixed set of lights: up to [`MAX_DIRECTIONAL_LIGHTS`] directional lights
/// shining towards the origin, plus one ambient term.
#[derive(Debug, Clone)]
pub struct LightRig {
    directional: Vec<Light>,
    ambient: [f32; 4],
}

impl LightRig {
    pub fn new() -> Self {
        Self {
            directional: Vec::with_capacity(MAX_DIRECTIONAL_LIGHTS),
            ambient: [0.0; 4],
        }
    }

    /// Three-point lighting: key, fill and rim, over a dim ambient.
    pub fn studio() -> Self {
        let mut rig = Self::new();
        rig.add_directional([5.0, 5.0, 5.0], 0xffffff, 1.0); // key
        rig.add_directional([-5.0, 3.0, 2.0], 0xffffff, 0.6); // fill
        rig.add_directional([0.0, 5.0, -5.0], 0xffffff, 1.0); // rim
        rig.set_ambient(0x404040, 0.4);
        rig
    }

    /// Returns the light's slot, or `None` when the rig is full.
    pub fn add_directional(&mut self, position: [f32; 3], color: u32, intensity: f32) -> Option<usize> {
        if self.directional.len() == MAX_DIRECTIONAL_LIGHTS {
            log::warn!("Light rig is full, ignoring light at {:?}", position);
            return None;
        }
        let [r, g, b] = rgb_from_hex(color);
        self.directional.push(Light {
            position: [position[0], position[1], position[2], 0.0],
            color: [r, g, b, intensity],
        });
        Some(self.directional.len() - 1)
    }

    pub fn set_ambient(&mut self, color: u32, intensity: f32) {
        let [r, g, b] = rgb_from_hex(color);
        self.ambient = [r, g, b, intensity];
    }

    pub fn directional(&self) -> &[Light] {
        &self.directional
    }

    pub fn ambient(&self) -> [f32; 4] {
        self.ambient
    }

    /// Directional lights plus the ambient light.
    pub fn num_lights(&self) -> usize {
        self.directional.len() + 1
    }

    pub fn sync_to_gpu(&self) -> LightArrayGpu {
        let mut directional = [Light::default(); MAX_DIRECTIONAL_LIGHTS];
        directional[..self.directional.len()].copy_from_slice(&self.directional);

        LightArrayGpu {
            directional,
            ambient: self.ambient,
            num_lights: self.directional.len() as u32,
            _padding: [0; 3],
        }
    }
}
