// src/frame_source.rs
//
// Ordered frame enumeration for one zone directory. Frames are sorted by
// filename; entries that fail to decode are logged and skipped so a single
// corrupt capture never aborts the zone.

use crate::types::FrameError;
use anyhow::Result;
use opencv::{imgcodecs, prelude::*};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

const FRAME_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub struct FrameSource {
    paths: Vec<PathBuf>,
    next: usize,
    skipped: usize,
}

impl FrameSource {
    pub fn open(zone_dir: &Path) -> Result<Self> {
        let mut paths: Vec<PathBuf> = WalkDir::new(zone_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| {
                        let ext = ext.to_ascii_lowercase();
                        FRAME_EXTENSIONS.contains(&ext.as_str())
                    })
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        Ok(Self {
            paths,
            next: 0,
            skipped: 0,
        })
    }

    /// Number of frame candidates found in the directory.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Frames skipped so far because they could not be decoded.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Next decodable frame in filename order, or None at end of sequence.
    pub fn next_frame(&mut self) -> Option<Mat> {
        while self.next < self.paths.len() {
            let path = self.paths[self.next].clone();
            self.next += 1;
            match decode(&path) {
                Ok(frame) => return Some(frame),
                Err(err) => {
                    warn!("skipping frame: {err}");
                    self.skipped += 1;
                }
            }
        }
        None
    }
}

fn decode(path: &Path) -> Result<Mat, FrameError> {
    let as_str = path.to_string_lossy();
    let frame = imgcodecs::imread(&as_str, imgcodecs::IMREAD_COLOR).map_err(|_| {
        FrameError::Decode {
            path: as_str.to_string(),
        }
    })?;
    if frame.empty() {
        return Err(FrameError::Decode {
            path: as_str.to_string(),
        });
    }
    Ok(frame)
}
