//! Overlap percentage between two intersecting geometries
//!
//! Lines are compared by spheroidal length, everything else by area in a fixed
//! planar projection. Areas are taken relative to one fixed side of the pivot,
//! so a row holds the same value whichever side resynced it last. The store
//! does the measuring; this module picks the method and turns the raw
//! measurements into a bounded percentage.

use super::repository::{GeometryRepository, Operand, OverlapMeasure, OverlapMethod};
use crate::contract::{Geometry, GeometryKind};
use anyhow::Result;
use std::sync::Arc;

/// Web Mercator, used for polygon areas
pub const DEFAULT_AREA_SRID: i32 = 3857;

pub struct OverlapCalculator {
    geometry: Arc<dyn GeometryRepository>,
    area_srid: i32,
}

impl OverlapCalculator {
    pub fn new(geometry: Arc<dyn GeometryRepository>, area_srid: i32) -> Self {
        Self {
            geometry,
            area_srid,
        }
    }

    /// Pick the measurement for a pair of shapes
    ///
    /// When both sides are lines the base is the reference. `area_reference`
    /// names the operand whose area is the denominator for non-line pairs.
    pub fn method_for(
        &self,
        base: GeometryKind,
        target: GeometryKind,
        area_reference: Operand,
    ) -> OverlapMethod {
        match (base, target) {
            (GeometryKind::Line, _) => OverlapMethod::SpheroidLength {
                reference: Operand::Base,
            },
            (_, GeometryKind::Line) => OverlapMethod::SpheroidLength {
                reference: Operand::Target,
            },
            _ => OverlapMethod::ProjectedArea {
                srid: self.area_srid,
                reference: area_reference,
            },
        }
    }

    /// Percentage of the reference geometry covered by the intersection
    pub async fn percentage(
        &self,
        base: &Geometry,
        target: &Geometry,
        base_kind: GeometryKind,
        target_kind: GeometryKind,
        area_reference: Operand,
    ) -> Result<f64> {
        let method = self.method_for(base_kind, target_kind, area_reference);
        let measure = self.geometry.measure_overlap(base, target, method).await?;
        Ok(ratio(measure))
    }
}

/// `covered / total * 100`, clamped to [0, 100]; degenerate input maps to 0
pub fn ratio(measure: OverlapMeasure) -> f64 {
    let OverlapMeasure { covered, total } = measure;
    if !covered.is_finite() || !total.is_finite() || total <= 0.0 {
        return 0.0;
    }
    (covered / total * 100.0).clamp(0.0, 100.0)
}
