//! Video container probing
//!
//! Uses the `ffprobe` command line tool and parses its JSON output. Callers
//! depend on the [`VideoProber`] trait so tests and embedders can supply
//! their own implementation.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{CatalogError, Result};

/// What the importer needs to know about a video container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    /// Overall duration in seconds
    pub duration: Option<f64>,
    pub codec: Option<String>,
    /// Raw stream width, before rotation correction
    pub width: Option<u32>,
    /// Raw stream height, before rotation correction
    pub height: Option<u32>,
    /// Raw `creation_time` tag
    pub creation_time: Option<String>,
    /// Display rotation in degrees
    pub rotation: Option<i32>,
}

/// Reads container-level metadata from a video file
pub trait VideoProber: Send + Sync {
    fn probe(&self, path: &Path) -> Result<ProbeReport>;
}

/// FFprobe JSON output structures
mod ffprobe {
    use super::*;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub format: Option<Format>,
        pub streams: Option<Vec<Stream>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub duration: Option<String>,
        pub tags: Option<HashMap<String, String>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub codec_name: Option<String>,
        pub codec_type: Option<String>,
        pub width: Option<u32>,
        pub height: Option<u32>,
        pub tags: Option<HashMap<String, String>>,
        pub side_data_list: Option<Vec<SideData>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct SideData {
        pub rotation: Option<f64>,
    }
}

/// Build a report from raw `ffprobe -print_format json` output
pub fn parse_probe_output(json: &[u8]) -> Result<ProbeReport> {
    let probe: ffprobe::FfprobeOutput = serde_json::from_slice(json)?;
    let streams = probe.streams.unwrap_or_default();

    // First video stream, falling back to the first stream of any kind
    let stream = streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .or_else(|| streams.first());

    let format_tags = probe.format.as_ref().and_then(|f| f.tags.as_ref());
    let stream_tags = stream.and_then(|s| s.tags.as_ref());

    let creation_time = stream_tags
        .and_then(|tags| tags.get("creation_time"))
        .or_else(|| format_tags.and_then(|tags| tags.get("creation_time")))
        .cloned();

    let rotation = stream
        .and_then(|s| s.side_data_list.as_ref())
        .and_then(|list| list.iter().find_map(|sd| sd.rotation))
        .map(|r| r.round() as i32)
        .or_else(|| {
            stream_tags
                .and_then(|tags| tags.get("rotate"))
                .and_then(|r| r.trim().parse::<i32>().ok())
        });

    Ok(ProbeReport {
        duration: probe
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.trim().parse::<f64>().ok()),
        codec: stream.and_then(|s| s.codec_name.clone()),
        width: stream.and_then(|s| s.width),
        height: stream.and_then(|s| s.height),
        creation_time,
        rotation,
    })
}

/// [`VideoProber`] backed by the `ffprobe` executable
#[derive(Debug, Clone)]
pub struct Ffprobe {
    ffprobe_path: String,
}

impl Ffprobe {
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Check if ffprobe is available
    pub fn is_available(&self) -> bool {
        Command::new(&self.ffprobe_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Default for Ffprobe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl VideoProber for Ffprobe {
    fn probe(&self, path: &Path) -> Result<ProbeReport> {
        log::debug!("Probing {}", path.display());

        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "error"])
            .args(["-print_format", "json"])
            .args(["-show_format", "-show_streams"])
            .arg(path)
            .output()
            .map_err(|e| {
                CatalogError::external_tool(
                    path.to_path_buf(),
                    format!("failed to execute {}: {}", self.ffprobe_path, e),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CatalogError::external_tool(
                path.to_path_buf(),
                format!(
                    "ffprobe exited with {}: {}",
                    output.status,
                    if stderr.trim().is_empty() {
                        "no error output"
                    } else {
                        stderr.trim()
                    }
                ),
            ));
        }

        parse_probe_output(&output.stdout).map_err(|e| e.at(path))
    }
}
