use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Serial,
    Threaded,
    Gpu,
}

impl BackendKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "serial" | "cpu" => Some(BackendKind::Serial),
            "threaded" | "mt" => Some(BackendKind::Threaded),
            "gpu" | "cuda" | "hip" | "vulkan" => Some(BackendKind::Gpu),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Serial => "serial",
            BackendKind::Threaded => "threaded",
            BackendKind::Gpu => "gpu",
        }
    }
}

/// Clustering parameter set as it travels through configuration files and
/// command lines. Distance fields hold one value per dimension or a single
/// broadcast value; `dm`/`seed_dc` fall back to `dc` when absent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterParams {
    pub dc: Vec<f32>,
    pub rhoc: f32,
    #[serde(default)]
    pub dm: Option<Vec<f32>>,
    #[serde(default)]
    pub seed_dc: Option<Vec<f32>>,
    #[serde(default = "default_points_per_tile")]
    pub points_per_tile: i32,
    #[serde(default)]
    pub wrapped: Vec<bool>,
}

fn default_points_per_tile() -> i32 {
    128
}

impl ClusterParams {
    pub fn uniform(dc: f32, rhoc: f32) -> Self {
        ClusterParams {
            dc: vec![dc],
            rhoc,
            dm: None,
            seed_dc: None,
            points_per_tile: default_points_per_tile(),
            wrapped: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse_roundtrip() {
        for kind in [BackendKind::Serial, BackendKind::Threaded, BackendKind::Gpu] {
            assert_eq!(BackendKind::parse(kind.name()), Some(kind));
        }
        assert_eq!(BackendKind::parse("fpga"), None);
    }

    #[test]
    fn test_params_defaults() {
        let params = ClusterParams::uniform(1.5, 10.0);
        assert_eq!(params.points_per_tile, 128);
        assert!(params.dm.is_none());
    }
}
