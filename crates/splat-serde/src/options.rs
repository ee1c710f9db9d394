use glam::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Highest SH band written to the uncompressed format (0-3).
    pub max_sh_bands: u8,
    pub viewer: ViewerSettings,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            max_sh_bands: 3,
            viewer: ViewerSettings::default(),
        }
    }
}

/// Embedded into viewer exports as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerSettings {
    /// Clear color, RGBA in `0..=1`.
    pub background: [f32; 4],
    pub camera: CameraPose,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub animation: Option<AnimTrack>,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            background: [0.0, 0.0, 0.0, 1.0],
            camera: CameraPose::default(),
            animation: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub position: Vec3,
    pub target: Vec3,
    /// Vertical field of view in degrees.
    pub fov: f32,
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            position: Vec3::new(2.0, 1.0, 2.0),
            target: Vec3::ZERO,
            fov: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimTrack {
    /// Seconds.
    pub duration: f32,
    pub frame_rate: f32,
    pub keyframes: Vec<CameraKeyframe>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraKeyframe {
    pub time: f32,
    pub position: Vec3,
    pub target: Vec3,
    pub fov: f32,
}
