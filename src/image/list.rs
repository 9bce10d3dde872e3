//! Image list loading
//!
//! One identifier per line; blank lines and `#` comments are ignored.

use crate::error::{ReplicatorError, Result};
use crate::image::ImageReference;
use std::collections::HashSet;
use std::path::Path;

pub fn parse_image_list(contents: &str) -> Result<Vec<ImageReference>> {
    contents
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line_no, line)| {
            ImageReference::parse(line).map_err(|e| {
                ReplicatorError::Input(format!("line {}: {}", line_no, e))
            })
        })
        .collect()
}

/// Read and parse an image list; a missing or empty file is an input error
pub fn load_image_list(path: &Path) -> Result<Vec<ImageReference>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        ReplicatorError::Input(format!("Cannot read image list {}: {}", path.display(), e))
    })?;

    let images = parse_image_list(&contents)?;
    if images.is_empty() {
        return Err(ReplicatorError::Input(format!(
            "Image list {} contains no images",
            path.display()
        )));
    }
    Ok(images)
}

/// Drop repeated references, keeping the first occurrence; returns how many were dropped
pub fn dedupe_images(images: &mut Vec<ImageReference>) -> usize {
    let before = images.len();
    let mut seen = HashSet::new();
    images.retain(|image| seen.insert(image.clone()));
    before - images.len()
}
