use serde::Serialize;

use crate::types::Preset;

/// Spleeter configuration used when Demucs fails on a two-stem request.
pub const FALLBACK_MODEL: &str = "spleeter:2stems";

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RegistryEntry {
    pub preset: Preset,
    pub model: &'static str,
    pub description: &'static str,
}

static REGISTRY: [RegistryEntry; 3] = [
    RegistryEntry {
        preset: Preset::Fast,
        model: "htdemucs_6s",
        description: "Hybrid Transformer Demucs, 6-source variant",
    },
    RegistryEntry {
        preset: Preset::Balanced,
        model: "htdemucs",
        description: "Hybrid Transformer Demucs",
    },
    RegistryEntry {
        preset: Preset::Best,
        model: "mdx_extra_q",
        description: "Demucs MDX extra, quantized",
    },
];

/// Demucs model identifier for a preset.
pub fn resolve_model(preset: Preset) -> &'static str {
    match preset {
        Preset::Fast => REGISTRY[0].model,
        Preset::Balanced => REGISTRY[1].model,
        Preset::Best => REGISTRY[2].model,
    }
}

pub fn presets() -> &'static [RegistryEntry] {
    &REGISTRY
}
