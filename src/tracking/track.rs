// src/tracking/track.rs
//! Recorded route: segments of points separated by pauses

use crate::error::{Result, TrackerError};
use crate::location::LatLng;
use geo::{Coord, LineString};
use serde::{Deserialize, Serialize};

/// Points recorded during one uninterrupted tracking interval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSegment {
    pub points: Vec<LatLng>,
}

impl RunSegment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sum of distances between consecutive points, in meters
    pub fn distance_meters(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| w[0].distance_to(&w[1]))
            .sum()
    }

    pub fn last_point(&self) -> Option<&LatLng> {
        self.points.last()
    }
}

/// Full route of one run attempt.
///
/// Only the last segment can be open; once sealed no point is appended
/// until a new segment begins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTrack {
    segments: Vec<RunSegment>,
    open: bool,
}

impl RunTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sealed track from finished segments
    pub fn from_segments(segments: Vec<RunSegment>) -> Self {
        Self {
            segments,
            open: false,
        }
    }

    pub fn segments(&self) -> &[RunSegment] {
        &self.segments
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Seal the current segment (if any) and open a fresh empty one
    pub fn begin_segment(&mut self) {
        self.segments.push(RunSegment::new());
        self.open = true;
    }

    pub fn seal(&mut self) {
        self.open = false;
    }

    /// Append a point to the open segment. Returns false if sealed.
    pub fn push(&mut self, point: LatLng) -> bool {
        if !self.open {
            return false;
        }
        match self.segments.last_mut() {
            Some(segment) => {
                segment.points.push(point);
                true
            }
            None => false,
        }
    }

    pub fn point_count(&self) -> usize {
        self.segments.iter().map(RunSegment::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.point_count() == 0
    }

    /// Distance in meters. Gaps between segments are not counted.
    pub fn distance_meters(&self) -> f64 {
        self.segments.iter().map(RunSegment::distance_meters).sum()
    }

    pub fn last_point(&self) -> Option<&LatLng> {
        self.segments.iter().rev().find_map(RunSegment::last_point)
    }

    pub fn snapshot(&self) -> Result<RouteSnapshot> {
        RouteSnapshot::encode(self)
    }
}

/// Compact image of a route: one encoded polyline per segment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteSnapshot {
    pub segments: Vec<String>,
}

const POLYLINE_PRECISION: u32 = 5;

impl RouteSnapshot {
    pub fn encode(track: &RunTrack) -> Result<Self> {
        let segments = track
            .segments()
            .iter()
            .map(|segment| {
                let line: LineString<f64> = segment
                    .points
                    .iter()
                    .map(|p| Coord {
                        x: p.longitude,
                        y: p.latitude,
                    })
                    .collect();
                polyline::encode_coordinates(line, POLYLINE_PRECISION)
                    .map_err(|e| TrackerError::Route(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { segments })
    }

    pub fn decode(&self) -> Result<RunTrack> {
        let segments = self
            .segments
            .iter()
            .map(|encoded| {
                let line = polyline::decode_polyline(encoded, POLYLINE_PRECISION)
                    .map_err(|e| TrackerError::Route(e.to_string()))?;
                Ok(RunSegment {
                    points: line.coords().map(|c| LatLng::new(c.y, c.x)).collect(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RunTrack::from_segments(segments))
    }
}
