//! User-controlled overlay adjustments and their allowed ranges.

use crate::placement::{ChainParams, EarringParams};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use thiserror::Error;

pub const CHAIN_SCALE_RANGE: RangeInclusive<f32> = 0.4..=2.5;
pub const VERTICAL_OFFSET_RANGE: RangeInclusive<f32> = -0.3..=0.5;
pub const EARRING_SCALE_RANGE: RangeInclusive<f32> = 0.4..=2.5;
pub const EARRING_OFFSET_RANGE: RangeInclusive<f32> = -0.5..=0.5;

const DEFAULT_VERTICAL_OFFSET: f32 = -0.20;

#[derive(Error, Debug, PartialEq)]
pub enum AdjustError {
    #[error("{field} must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f32 },
}

/// Everything the control surface can tune.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Adjustments {
    pub chain_scale: f32,
    pub vertical_offset: f32,
    pub earring_scale: f32,
    pub earring_horizontal_offset: f32,
    pub earring_vertical_offset: f32,
    /// Stored for the control surface; has no effect on 2D placement.
    pub earring_depth_offset: f32,
    pub show_earrings: bool,
}

impl Default for Adjustments {
    fn default() -> Self {
        Self {
            chain_scale: 1.0,
            vertical_offset: DEFAULT_VERTICAL_OFFSET,
            earring_scale: 1.0,
            earring_horizontal_offset: 0.0,
            earring_vertical_offset: 0.0,
            earring_depth_offset: 0.0,
            show_earrings: false,
        }
    }
}

fn clamp_checked(
    field: &'static str,
    value: f32,
    range: &RangeInclusive<f32>,
) -> Result<f32, AdjustError> {
    if !value.is_finite() {
        return Err(AdjustError::NotFinite { field, value });
    }
    Ok(value.clamp(*range.start(), *range.end()))
}

impl Adjustments {
    /// Set the chain scale, clamped to [`CHAIN_SCALE_RANGE`]. Returns the applied value.
    pub fn set_chain_scale(&mut self, value: f32) -> Result<f32, AdjustError> {
        self.chain_scale = clamp_checked("chain_scale", value, &CHAIN_SCALE_RANGE)?;
        Ok(self.chain_scale)
    }

    pub fn set_vertical_offset(&mut self, value: f32) -> Result<f32, AdjustError> {
        self.vertical_offset = clamp_checked("vertical_offset", value, &VERTICAL_OFFSET_RANGE)?;
        Ok(self.vertical_offset)
    }

    pub fn set_earring_scale(&mut self, value: f32) -> Result<f32, AdjustError> {
        self.earring_scale = clamp_checked("earring_scale", value, &EARRING_SCALE_RANGE)?;
        Ok(self.earring_scale)
    }

    /// Set all three earring offsets at once. Nothing changes if any value is not finite.
    pub fn set_earring_offsets(
        &mut self,
        horizontal: f32,
        vertical: f32,
        depth: f32,
    ) -> Result<(), AdjustError> {
        let h = clamp_checked("earring_horizontal_offset", horizontal, &EARRING_OFFSET_RANGE)?;
        let v = clamp_checked("earring_vertical_offset", vertical, &EARRING_OFFSET_RANGE)?;
        let d = clamp_checked("earring_depth_offset", depth, &EARRING_OFFSET_RANGE)?;
        self.earring_horizontal_offset = h;
        self.earring_vertical_offset = v;
        self.earring_depth_offset = d;
        Ok(())
    }

    /// Re-run every field through its setter. Values that arrived without
    /// going through the setters (deserialized config) come back clamped;
    /// any non-finite field is an error.
    pub fn validated(self) -> Result<Self, AdjustError> {
        let mut out = Adjustments {
            show_earrings: self.show_earrings,
            ..Adjustments::default()
        };
        out.set_chain_scale(self.chain_scale)?;
        out.set_vertical_offset(self.vertical_offset)?;
        out.set_earring_scale(self.earring_scale)?;
        out.set_earring_offsets(
            self.earring_horizontal_offset,
            self.earring_vertical_offset,
            self.earring_depth_offset,
        )?;
        Ok(out)
    }

    pub fn chain_params(&self) -> ChainParams {
        ChainParams {
            scale: self.chain_scale,
            vertical_offset: self.vertical_offset,
        }
    }

    pub fn earring_params(&self) -> EarringParams {
        EarringParams {
            scale: self.earring_scale,
            horizontal_offset: self.earring_horizontal_offset,
            vertical_offset: self.earring_vertical_offset,
        }
    }
}
