use crate::types::{Mask, PhenoError, PhenoResult};
use ndarray::Array2;

/// Grid the ROI vertices are snapped to, in pixels
pub const VERTEX_SNAP: i64 = 10;

/// Polygonal region of interest in pixel coordinates (x = column, y = row)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roi {
    vertices: Vec<(i64, i64)>,
}

impl Roi {
    /// Create a ROI from hand-picked vertices
    ///
    /// Vertices are snapped to the nearest multiple of 10 first. Fewer than
    /// three distinct vertices or a polygon without area is rejected.
    pub fn new(vertices: &[(i64, i64)]) -> PhenoResult<Self> {
        let mut snapped: Vec<(i64, i64)> = Vec::with_capacity(vertices.len());
        for &(x, y) in vertices {
            let vertex = (snap(x), snap(y));
            if snapped.last() != Some(&vertex) {
                snapped.push(vertex);
            }
        }
        // Closing vertex repeated by the caller
        while snapped.len() > 1 && snapped.first() == snapped.last() {
            snapped.pop();
        }

        if snapped.len() < 3 {
            return Err(PhenoError::Config(format!(
                "ROI needs at least 3 distinct vertices after snapping, got {}",
                snapped.len()
            )));
        }

        let roi = Self { vertices: snapped };
        if roi.is_collinear() {
            return Err(PhenoError::Config(
                "ROI polygon is degenerate (all vertices collinear)".to_string(),
            ));
        }

        log::debug!("ROI defined with {} vertices: {:?}", roi.vertices.len(), roi.vertices);
        Ok(roi)
    }

    /// Parse `x1,y1;x2,y2;...`
    pub fn parse(text: &str) -> PhenoResult<Self> {
        let mut vertices = Vec::new();
        for pair in text.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (x, y) = pair.split_once(',').ok_or_else(|| {
                PhenoError::Config(format!("ROI vertex '{}' is not of the form x,y", pair))
            })?;
            let x = x.trim().parse::<i64>().map_err(|e| {
                PhenoError::Config(format!("Invalid ROI x coordinate '{}': {}", x, e))
            })?;
            let y = y.trim().parse::<i64>().map_err(|e| {
                PhenoError::Config(format!("Invalid ROI y coordinate '{}': {}", y, e))
            })?;
            vertices.push((x, y));
        }
        Self::new(&vertices)
    }

    pub fn vertices(&self) -> &[(i64, i64)] {
        &self.vertices
    }

    /// (min_x, min_y, max_x, max_y)
    pub fn bounding_box(&self) -> (i64, i64, i64, i64) {
        self.vertices.iter().fold(
            (i64::MAX, i64::MAX, i64::MIN, i64::MIN),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        )
    }

    /// True when every vertex lies on the line through the first two
    ///
    /// Self-intersecting polygons have zero net area but still cover pixels,
    /// so only a collinear vertex set counts as degenerate.
    fn is_collinear(&self) -> bool {
        let (ox, oy) = self.vertices[0];
        let (ax, ay) = (self.vertices[1].0 - ox, self.vertices[1].1 - oy);
        self.vertices[2..].iter().all(|&(x, y)| ax * (y - oy) - ay * (x - ox) == 0)
    }

    fn edges(&self) -> impl Iterator<Item = ((i64, i64), (i64, i64))> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    /// Rasterize the closed polygon into a (height, width) mask
    ///
    /// Pixels inside the polygon or on its boundary are 1. Parts of the
    /// polygon outside the image are clipped.
    pub fn build_mask(&self, width: usize, height: usize) -> Mask {
        let mut mask = Array2::<u8>::zeros((height, width));
        if width == 0 || height == 0 {
            return mask;
        }

        let (_, min_y, _, max_y) = self.bounding_box();
        let row_start = min_y.max(0);
        let row_end = max_y.min(height as i64 - 1);
        let last_col = width as i64 - 1;

        // Interior: even-odd scanline fill with the half-open edge rule
        let mut crossings: Vec<f64> = Vec::with_capacity(self.vertices.len());
        for y in row_start..=row_end {
            crossings.clear();
            for ((x0, y0), (x1, y1)) in self.edges() {
                if (y0 > y) != (y1 > y) {
                    let t = (y - y0) as f64 / (y1 - y0) as f64;
                    crossings.push(x0 as f64 + t * (x1 - x0) as f64);
                }
            }
            crossings.sort_by(|a, b| a.total_cmp(b));

            for span in crossings.chunks_exact(2) {
                let start = (span[0].ceil() as i64).max(0);
                let end = (span[1].floor() as i64).min(last_col);
                for x in start..=end {
                    mask[[y as usize, x as usize]] = 1;
                }
            }
        }

        // Boundary: every lattice point on each edge
        for ((x0, y0), (x1, y1)) in self.edges() {
            let (dx, dy) = (x1 - x0, y1 - y0);
            let steps = gcd(dx.abs(), dy.abs());
            let (sx, sy) = (dx / steps, dy / steps);
            for k in 0..=steps {
                let (x, y) = (x0 + k * sx, y0 + k * sy);
                if (0..=last_col).contains(&x) && (0..height as i64).contains(&y) {
                    mask[[y as usize, x as usize]] = 1;
                }
            }
        }

        log::debug!(
            "Built {}x{} ROI mask with {} pixels inside",
            width,
            height,
            mask.iter().filter(|&&v| v == 1).count()
        );
        mask
    }
}

/// Build a mask from raw vertices in one step
pub fn build_mask(vertices: &[(i64, i64)], width: usize, height: usize) -> PhenoResult<Mask> {
    Ok(Roi::new(vertices)?.build_mask(width, height))
}

/// Nearest multiple of `VERTEX_SNAP`, ties to the even multiple
fn snap(value: i64) -> i64 {
    let quotient = value.div_euclid(VERTEX_SNAP);
    let remainder = value.rem_euclid(VERTEX_SNAP);
    let half = VERTEX_SNAP / 2;
    let rounded = if remainder < half {
        quotient
    } else if remainder > half {
        quotient + 1
    } else if quotient % 2 == 0 {
        quotient
    } else {
        quotient + 1
    };
    rounded * VERTEX_SNAP
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}
