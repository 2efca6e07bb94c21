// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Painter configuration.

/// Tunables of a [`Painter`](crate::Painter).
#[derive(Clone, Debug, PartialEq)]
pub struct PainterConfig {
    /// Largest width or height, in device pixels, of a device or offscreen
    /// image. Emulated primitives whose bounds exceed it are skipped.
    pub max_offscreen_dimension: u32,
    /// Flattening tolerance for path rasterization and stroke outlining.
    pub path_tolerance: f64,
    /// Route every primitive through offscreen compositing, even when the
    /// engine could draw it directly.
    pub force_offscreen_fallback: bool,
    /// Check in debug builds that devices with thread affinity are painted
    /// from their owning thread.
    pub check_thread_affinity: bool,
}

impl Default for PainterConfig {
    fn default() -> Self {
        Self {
            max_offscreen_dimension: 32767,
            path_tolerance: 0.1,
            force_offscreen_fallback: false,
            check_thread_affinity: true,
        }
    }
}

impl PainterConfig {
    /// The configuration for a painter compositing an emulated primitive.
    #[must_use]
    pub fn for_nested(&self) -> Self {
        Self {
            force_offscreen_fallback: false,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_config_never_forces_fallback() {
        let config = PainterConfig {
            force_offscreen_fallback: true,
            path_tolerance: 0.25,
            ..PainterConfig::default()
        };
        let nested = config.for_nested();
        assert!(!nested.force_offscreen_fallback);
        assert_eq!(nested.path_tolerance, 0.25);
    }
}
