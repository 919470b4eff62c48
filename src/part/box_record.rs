//! `Box.txt`: the anchor snapshot's region of interest.
//!
//! The file holds a single line `x1,y1,x2,y2`. When no region was found the
//! line is `None,None,None,None`; any `None` coordinate reads back as
//! absent.

use std::path::Path;

use super::PartError;
use crate::vision::BoundingBox;

const ABSENT: &str = "None";

pub fn format_box(bbox: Option<BoundingBox>) -> String {
    match bbox {
        Some(b) => format!("{},{},{},{}", b.x1, b.y1, b.x2, b.y2),
        None => [ABSENT; 4].join(","),
    }
}

/// Parse a box record, returning `None` on malformed input and
/// `Some(None)` for an explicitly absent box.
pub fn parse_box(text: &str) -> Option<Option<BoundingBox>> {
    let fields: Vec<&str> = text.trim().split(',').map(str::trim).collect();
    if fields.len() != 4 {
        return None;
    }
    let mut coords = [0i32; 4];
    let mut absent = false;
    for (slot, field) in coords.iter_mut().zip(&fields) {
        if *field == ABSENT {
            absent = true;
            continue;
        }
        *slot = parse_coord(field)?;
    }
    if absent {
        return Some(None);
    }
    let [x1, y1, x2, y2] = coords;
    Some(Some(BoundingBox::new(x1, y1, x2, y2)))
}

fn parse_coord(field: &str) -> Option<i32> {
    if let Ok(value) = field.parse::<i32>() {
        return Some(value);
    }
    let value = field.parse::<f64>().ok()?;
    (value.is_finite() && value.abs() < f64::from(i32::MAX)).then(|| value.round() as i32)
}

pub fn write_box(path: &Path, bbox: Option<BoundingBox>) -> Result<(), PartError> {
    std::fs::write(path, format_box(bbox)).map_err(|source| PartError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_box(path: &Path) -> Result<Option<BoundingBox>, PartError> {
    let text = std::fs::read_to_string(path).map_err(|source| PartError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_box(&text).ok_or_else(|| PartError::MalformedBox {
        path: path.to_path_buf(),
        content: text.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn box_round_trips_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Box.txt");
        let bbox = BoundingBox::new(12, 34, 156, 178);
        write_box(&path, Some(bbox)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "12,34,156,178");
        assert_eq!(read_box(&path).unwrap(), Some(bbox));
    }

    #[test]
    fn absent_box_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Box.txt");
        write_box(&path, None).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "None,None,None,None");
        assert_eq!(read_box(&path).unwrap(), None);
    }

    #[test]
    fn any_none_coordinate_means_absent() {
        assert_eq!(parse_box("1,None,3,4"), Some(None));
    }

    #[test]
    fn tolerates_whitespace_and_float_coordinates() {
        assert_eq!(
            parse_box(" 1, 2 ,3.0,4\n"),
            Some(Some(BoundingBox::new(1, 2, 3, 4)))
        );
    }

    #[test]
    fn malformed_records_are_rejected() {
        assert_eq!(parse_box("1,2,3"), None);
        assert_eq!(parse_box("a,b,c,d"), None);
        let dir = tempdir().unwrap();
        let path = dir.path().join("Box.txt");
        std::fs::write(&path, "garbage").unwrap();
        assert!(matches!(read_box(&path), Err(PartError::MalformedBox { .. })));
    }
}
