use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Axis-aligned integer rectangle used for watermark regions
///
/// Coordinates are half-open: a pixel `(x, y)` is inside when
/// `left <= x < right` and `top <= y < bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn left(&self) -> u32 {
        self.x
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn top(&self) -> u32 {
        self.y
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        self.left() <= x && x < self.right() && self.top() <= y && y < self.bottom()
    }

    /// Grow by `border` on each side, clipped to a `width` x `height` frame
    pub fn expand_clipped(&self, border: u32, width: u32, height: u32) -> Rect {
        let left = self.left().saturating_sub(border);
        let top = self.top().saturating_sub(border);
        let right = self.right().saturating_add(border).min(width);
        let bottom = self.bottom().saturating_add(border).min(height);

        Rect {
            x: left,
            y: top,
            width: right.saturating_sub(left),
            height: bottom.saturating_sub(top),
        }
    }

    /// Pixels of the ring `expand_clipped(border) \ self`, row-major
    pub fn ring_points(&self, border: u32, width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> + '_ {
        let outer = self.expand_clipped(border, width, height);
        (outer.top()..outer.bottom())
            .flat_map(move |y| (outer.left()..outer.right()).map(move |x| (x, y)))
            .filter(move |&(x, y)| !self.contains(x, y))
    }

    /// Distance from an interior pixel to the nearest region edge (0 on the edge row/column)
    pub fn distance_to_edge(&self, x: u32, y: u32) -> u32 {
        let to_left = x - self.left();
        let to_right = self.right() - x - 1;
        let to_top = y - self.top();
        let to_bottom = self.bottom() - y - 1;
        to_left.min(to_right).min(to_top).min(to_bottom)
    }

    /// Check the region lies fully inside a `width` x `height` frame
    pub fn validate_within(&self, width: u32, height: u32) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::MalformedRegion {
                input: self.to_string(),
                reason: "width and height must be greater than zero".to_string(),
            });
        }

        let fits = self.x.checked_add(self.width).is_some_and(|r| r <= width)
            && self.y.checked_add(self.height).is_some_and(|b| b <= height);

        if !fits {
            return Err(ValidationError::RegionOutOfBounds {
                region: self.to_string(),
                width,
                height,
            });
        }

        Ok(())
    }

    /// Parse `"X,Y,WIDTH,HEIGHT"`, e.g. `"10,10,50,50"`
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let malformed = |reason: &str| ValidationError::MalformedRegion {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = input.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(malformed("expected format X,Y,WIDTH,HEIGHT"));
        }

        let mut values = [0i64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| malformed(&format!("'{}' is not an integer", part)))?;
        }
        let [x, y, width, height] = values;

        if width <= 0 || height <= 0 {
            return Err(malformed("width and height must be greater than zero"));
        }
        if x < 0 || y < 0 {
            return Err(malformed("coordinates must not be negative"));
        }

        let to_u32 = |v: i64| u32::try_from(v).map_err(|_| malformed("value too large"));
        Ok(Rect::new(to_u32(x)?, to_u32(y)?, to_u32(width)?, to_u32(height)?))
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

impl FromStr for Rect {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rect::parse(s)
    }
}

impl TryFrom<String> for Rect {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rect::parse(&value)
    }
}

impl From<Rect> for String {
    fn from(rect: Rect) -> Self {
        rect.to_string()
    }
}
