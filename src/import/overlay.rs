use crate::attributes::{self, Attributes};
use crate::store::TrackMeta;
use crate::TrackId;

/// Copy layout attributes from the first existing track in the same overlay
/// group.
///
/// `top` and `height` always come from the existing track; `rangeMin` and
/// `rangeMax` only when the new track does not set them itself. Returns the
/// track the attributes were taken from.
pub(crate) fn apply_overlay(attributes: &mut Attributes, existing: &[TrackMeta]) -> Option<TrackId> {
    let group = attributes.get(attributes::OVERLAY)?.to_string();
    let source = existing
        .iter()
        .find(|track| track.attributes.get(attributes::OVERLAY) == Some(group.as_str()))?;

    for key in [attributes::TOP, attributes::HEIGHT] {
        if let Some(value) = source.attributes.get(key) {
            attributes.set(key, value);
        }
    }
    for key in [attributes::RANGE_MIN, attributes::RANGE_MAX] {
        if let Some(value) = source.attributes.get(key) {
            attributes.set_if_absent(key, value);
        }
    }
    Some(source.id)
}

/// Record the observed value range as `min.value` / `max.value` unless the
/// caller supplied them
pub(crate) fn apply_value_range(attributes: &mut Attributes, range: Option<(f64, f64)>) {
    if let Some((min, max)) = range {
        attributes.set_if_absent(attributes::MIN_VALUE, &min.to_string());
        attributes.set_if_absent(attributes::MAX_VALUE, &max.to_string());
    }
}
