//! Polygon rasterization onto a grid
//!
//! A cell is inside a polygon when its center is. Only polygonal
//! geometries burn; points and lines in a layer are ignored.

use crate::algebra::from_cells;
use crate::maybe_rayon::*;
use geo::{BoundingRect, Contains, Geometry, Point, Polygon, Rect};
use sei_core::raster::Raster;
use sei_core::vector::Feature;
use sei_core::{GridSpec, Result};
use tracing::{debug, warn};

/// A polygonal footprint with its envelope and the value it burns
struct Footprint {
    polygons: Vec<Polygon<f64>>,
    envelope: Rect<f64>,
    value: f64,
}

impl Footprint {
    fn from_feature(feature: &Feature, value: f64) -> Option<Self> {
        let geometry = feature.geometry.as_ref()?;
        let mut polygons = Vec::new();
        collect_polygons(geometry, &mut polygons);
        if polygons.is_empty() {
            return None;
        }
        let envelope = geometry.bounding_rect()?;
        Some(Self {
            polygons,
            envelope,
            value,
        })
    }

    fn covers(&self, x: f64, y: f64) -> bool {
        let p = Point::new(x, y);
        self.polygons.iter().any(|poly| poly.contains(&p))
    }
}

fn collect_polygons(geometry: &Geometry<f64>, out: &mut Vec<Polygon<f64>>) {
    match geometry {
        Geometry::Polygon(p) => out.push(p.clone()),
        Geometry::MultiPolygon(mp) => out.extend(mp.0.iter().cloned()),
        Geometry::Rect(r) => out.push(r.to_polygon()),
        Geometry::GeometryCollection(gc) => {
            for g in gc.iter() {
                collect_polygons(g, out);
            }
        }
        _ => {}
    }
}

/// Burn footprints onto `grid`, folding overlapping values with `combine`
fn burn<F>(footprints: &[Footprint], grid: &GridSpec, combine: F) -> Result<Raster<f64>>
where
    F: Fn(f64, f64) -> f64 + Sync + Send,
{
    let template: Raster<f64> = Raster::on_grid(grid, 0.0);
    let (rows, cols) = grid.shape();
    let transform = grid.transform;

    let cells: Vec<Option<f64>> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data: Vec<Option<f64>> = vec![None; cols];
            let (_, y) = transform.pixel_to_geo(0, row);
            for fp in footprints {
                if y < fp.envelope.min().y || y > fp.envelope.max().y {
                    continue;
                }
                for (col, cell) in row_data.iter_mut().enumerate() {
                    let (x, _) = transform.pixel_to_geo(col, row);
                    if x < fp.envelope.min().x || x > fp.envelope.max().x {
                        continue;
                    }
                    if fp.covers(x, y) {
                        *cell = Some(match *cell {
                            Some(prev) => combine(prev, fp.value),
                            None => fp.value,
                        });
                    }
                }
            }
            row_data
        })
        .collect();

    from_cells(&template, cells)
}

/// 1.0 inside any feature, 0.0 elsewhere; every cell valid.
///
/// Feed the result to `update_mask` to clip a raster to the features.
pub fn rasterize_mask(features: &[Feature], grid: &GridSpec) -> Result<Raster<f64>> {
    let footprints: Vec<Footprint> = features
        .iter()
        .filter_map(|f| Footprint::from_feature(f, 1.0))
        .collect();
    debug!(features = features.len(), polygons = footprints.len(), "Rasterizing mask");
    Ok(burn(&footprints, grid, f64::max)?.unmask(0.0).named("mask"))
}

/// Integer attribute of the covering feature; invalid outside all features.
///
/// Where features overlap the later one in the list wins. Features without
/// a usable integer attribute are skipped.
pub fn rasterize_codes(features: &[Feature], grid: &GridSpec, attribute: &str) -> Result<Raster<f64>> {
    let mut skipped = 0usize;
    let footprints: Vec<Footprint> = features
        .iter()
        .filter_map(|f| match f.integer(attribute) {
            Some(code) => Footprint::from_feature(f, code as f64),
            None => {
                skipped += 1;
                None
            }
        })
        .collect();
    if skipped > 0 {
        warn!(attribute, skipped, "Features without an integer attribute were not rasterized");
    }
    Ok(burn(&footprints, grid, |_, later| later)?.named(attribute))
}

/// Per cell, the largest `attribute` year that is `<= max_year` among the
/// covering features; invalid where no such feature exists.
///
/// Fire perimeters after `max_year`, or without a readable year, burn
/// nothing.
pub fn latest_attribute_year(
    features: &[Feature],
    grid: &GridSpec,
    attribute: &str,
    max_year: i64,
) -> Result<Raster<f64>> {
    let footprints: Vec<Footprint> = features
        .iter()
        .filter_map(|f| {
            let year = f.integer(attribute)?;
            if year > max_year {
                return None;
            }
            Footprint::from_feature(f, year as f64)
        })
        .collect();
    debug!(
        attribute,
        max_year,
        perimeters = footprints.len(),
        "Rasterizing latest disturbance year"
    );
    Ok(burn(&footprints, grid, f64::max)?.named(attribute))
}
