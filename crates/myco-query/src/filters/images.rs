//! Image filters.

use super::common::{between, float_range, list_value, text_value};
use super::{FilterCx, FilterName};
use crate::error::{QueryError, Result};
use crate::op::Op;
use crate::param::ParamValue;
use crate::predicate::Predicate;
use crate::schema::RecordType;

/// Size names, smallest first.
pub const IMAGE_SIZES: &[&str] = &["thumbnail", "small", "medium", "large", "huge", "full_size"];

const SIZE_PIXELS: &[u32] = &[160, 320, 640, 960, 1280];

pub const CONTENT_TYPES: &[&str] = &["jpg", "gif", "png", "raw", "tiff", "other"];

fn mime_types(content_type: &str) -> &'static [&'static str] {
    match content_type {
        "jpg" => &["image/jpeg"],
        "gif" => &["image/gif"],
        "png" => &["image/png"],
        "tiff" => &["image/tiff"],
        "raw" => &[
            "image/x-adobe-dng",
            "image/x-canon-cr2",
            "image/x-nikon-nef",
            "image/x-olympus-orf",
            "image/x-raw",
        ],
        _ => &[],
    }
}

/// `quality`: image vote within a range.
pub(super) fn quality(_: &FilterCx<'_>, name: FilterName, _: RecordType, value: &ParamValue) -> Result<Predicate> {
    let (low, high) = float_range(name, value)?;
    Ok(between("vote_cache", low, high))
}

/// `size`: at least this large on one side.
pub(super) fn size(_: &FilterCx<'_>, name: FilterName, _: RecordType, value: &ParamValue) -> Result<Predicate> {
    let size = text_value(name, value)?;
    let index = IMAGE_SIZES
        .iter()
        .position(|s| *s == size)
        .ok_or_else(|| QueryError::shape(name.as_str(), "an image size", value))?;

    let (op, pixels) = match SIZE_PIXELS.get(index) {
        Some(px) => (Op::Gte, *px),
        None => (Op::Gt, SIZE_PIXELS[SIZE_PIXELS.len() - 1]),
    };
    Ok(Predicate::or([
        Predicate::compare("width", op, pixels as i64),
        Predicate::compare("height", op, pixels as i64),
    ]))
}

/// `content_types`: any of the listed formats. `other` is everything not
/// otherwise listed.
pub(super) fn content_types(_: &FilterCx<'_>, name: FilterName, _: RecordType, value: &ParamValue) -> Result<Predicate> {
    let wanted = list_value(name, value)?
        .iter()
        .map(|v| text_value(name, v))
        .collect::<Result<Vec<_>>>()?;

    let mut parts = Vec::new();
    for content_type in wanted {
        if content_type == "other" {
            let known = CONTENT_TYPES.iter().flat_map(|t| mime_types(t).iter().copied());
            parts.push(Predicate::not(Predicate::in_set("content_type", known)));
        } else {
            parts.push(Predicate::in_set("content_type", mime_types(content_type).iter().copied()));
        }
    }
    Ok(Predicate::or(parts))
}
