//! Safe zone (geofence) polygon.
//!
//! Zones are stored as JSON `{ "name": ..., "created": ..., "points": [{"x":..,"y":..}] }`
//! in normalized image coordinates (top-left origin). A zone is immutable once loaded;
//! containment is its only operation.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::detect::BoundingBox;

pub const MIN_ZONE_POINTS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZonePoint {
    pub x: f32,
    pub y: f32,
}

/// On-disk zone file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ZoneFile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    pub points: Vec<ZonePoint>,
}

/// Validated polygon, at least three points in [0,1]^2.
#[derive(Clone, Debug, PartialEq)]
pub struct SafeZone {
    name: String,
    points: Vec<ZonePoint>,
}

impl SafeZone {
    pub fn new(name: impl Into<String>, points: Vec<ZonePoint>) -> Result<Self> {
        let name = name.into();
        if points.len() < MIN_ZONE_POINTS {
            return Err(anyhow!(
                "zone '{}' needs at least {} points, got {}",
                name,
                MIN_ZONE_POINTS,
                points.len()
            ));
        }
        if let Some(bad) = points
            .iter()
            .find(|p| !(0.0..=1.0).contains(&p.x) || !(0.0..=1.0).contains(&p.y))
        {
            return Err(anyhow!(
                "zone '{}' point ({}, {}) is outside normalized [0,1] coordinates",
                name,
                bad.x,
                bad.y
            ));
        }
        Ok(Self { name, points })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read zone file {}", path.display()))?;
        let file: ZoneFile = serde_json::from_str(&raw)
            .with_context(|| format!("invalid zone file {}", path.display()))?;
        Self::new(file.name, file.points)
    }

    pub fn to_file(&self, created: Option<String>) -> ZoneFile {
        ZoneFile {
            name: self.name.clone(),
            created,
            points: self.points.clone(),
        }
    }

    pub fn save(&self, path: &Path, created: Option<String>) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.to_file(created))?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write zone file {}", path.display()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn points(&self) -> &[ZonePoint] {
        &self.points
    }

    /// Even-odd ray casting in image coordinates.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        let mut inside = false;
        let n = self.points.len();
        let mut j = n - 1;
        for i in 0..n {
            let (pi, pj) = (self.points[i], self.points[j]);
            if (pi.y > y) != (pj.y > y) {
                let cross_x = (pj.x - pi.x) * (y - pi.y) / (pj.y - pi.y) + pi.x;
                if x < cross_x {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// True when the box center lies outside the zone, flipping vision-origin boxes first.
    pub fn is_violated_by(&self, bbox: &BoundingBox) -> bool {
        let (cx, cy) = bbox.center_in_image();
        !self.contains(cx, cy)
    }
}
