// src/run/route_export.rs
//! Route export of a stored run to common GPS formats

use super::RunRecord;
use crate::error::{Result, TrackerError};
use crate::tracking::RunTrack;
use std::fs::File;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RouteFormat {
    Gpx,
    #[value(name = "geojson")]
    GeoJson,
    Kml,
    Csv,
}

impl RouteFormat {
    pub fn extension(&self) -> &str {
        match self {
            RouteFormat::Gpx => "gpx",
            RouteFormat::GeoJson => "geojson",
            RouteFormat::Kml => "kml",
            RouteFormat::Csv => "csv",
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            RouteFormat::Gpx => "GPX (GPS Exchange)",
            RouteFormat::GeoJson => "GeoJSON",
            RouteFormat::Kml => "KML (Keyhole)",
            RouteFormat::Csv => "CSV",
        }
    }
}

/// Writes the route of one run, keeping one track segment per pause interval
pub struct RouteExporter<'a> {
    run: &'a RunRecord,
    track: RunTrack,
}

impl<'a> RouteExporter<'a> {
    pub fn new(run: &'a RunRecord) -> Result<Self> {
        Ok(Self {
            run,
            track: run.route.decode()?,
        })
    }

    fn name(&self) -> String {
        match self.run.id {
            Some(id) => format!("Run {} ({})", id, self.run.started_at.format("%Y-%m-%d %H:%M")),
            None => format!("Run {}", self.run.started_at.format("%Y-%m-%d %H:%M")),
        }
    }

    pub fn export_to_file(&self, path: &Path, format: RouteFormat) -> Result<()> {
        if self.track.is_empty() {
            return Err(TrackerError::Other("Run has no recorded route".to_string()));
        }

        let content = self.render(format)?;
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }

    pub fn render(&self, format: RouteFormat) -> Result<String> {
        Ok(match format {
            RouteFormat::Gpx => self.to_gpx(),
            RouteFormat::GeoJson => self.to_geojson()?,
            RouteFormat::Kml => self.to_kml(),
            RouteFormat::Csv => self.to_csv(),
        })
    }

    fn to_gpx(&self) -> String {
        let mut gpx = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="Run Tracker" xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
"#,
        );
        gpx.push_str(&format!("    <name>{}</name>\n", escape_xml(&self.name())));
        gpx.push_str(&format!(
            "    <desc>{:.2} km in {}</desc>\n",
            self.run.distance_km(),
            super::stats::format_stopwatch(self.run.duration_ms, false)
        ));

        for segment in self.track.segments() {
            gpx.push_str("    <trkseg>\n");
            for point in &segment.points {
                gpx.push_str(&format!(
                    "      <trkpt lat=\"{}\" lon=\"{}\"/>\n",
                    point.latitude, point.longitude
                ));
            }
            gpx.push_str("    </trkseg>\n");
        }

        gpx.push_str("  </trk>\n</gpx>\n");
        gpx
    }

    fn to_geojson(&self) -> Result<String> {
        let lines: Vec<Vec<[f64; 2]>> = self
            .track
            .segments()
            .iter()
            .map(|segment| {
                segment
                    .points
                    .iter()
                    .map(|p| [p.longitude, p.latitude])
                    .collect()
            })
            .collect();

        let feature = serde_json::json!({
            "type": "Feature",
            "geometry": {
                "type": "MultiLineString",
                "coordinates": lines
            },
            "properties": {
                "name": self.name(),
                "started_at": self.run.started_at.to_rfc3339(),
                "distance_m": self.run.distance_m,
                "duration_ms": self.run.duration_ms,
                "avg_speed_kmh": self.run.avg_speed_kmh,
                "calories": self.run.calories,
            }
        });

        Ok(serde_json::to_string_pretty(&feature)?)
    }

    fn to_kml(&self) -> String {
        let mut kml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <Placemark>
"#,
        );
        kml.push_str(&format!("      <name>{}</name>\n", escape_xml(&self.name())));
        kml.push_str(&format!(
            "      <TimeStamp><when>{}</when></TimeStamp>\n",
            self.run.started_at.to_rfc3339()
        ));
        kml.push_str("      <MultiGeometry>\n");
        for segment in self.track.segments().iter().filter(|s| !s.is_empty()) {
            let coordinates: Vec<String> = segment
                .points
                .iter()
                .map(|p| format!("{},{},0", p.longitude, p.latitude))
                .collect();
            kml.push_str("        <LineString>\n");
            kml.push_str(&format!(
                "          <coordinates>{}</coordinates>\n",
                coordinates.join(" ")
            ));
            kml.push_str("        </LineString>\n");
        }
        kml.push_str("      </MultiGeometry>\n    </Placemark>\n  </Document>\n</kml>\n");
        kml
    }

    fn to_csv(&self) -> String {
        let mut csv = String::from("segment,index,latitude,longitude\n");
        for (seg_idx, segment) in self.track.segments().iter().enumerate() {
            for (idx, point) in segment.points.iter().enumerate() {
                csv.push_str(&format!(
                    "{},{},{},{}\n",
                    seg_idx, idx, point.latitude, point.longitude
                ));
            }
        }
        csv
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
