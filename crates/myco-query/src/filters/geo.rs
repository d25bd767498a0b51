//! Bounding-box filter.

use super::common::between;
use super::{FilterCx, FilterName};
use crate::error::{QueryError, Result};
use crate::op::Op;
use crate::param::ParamValue;
use crate::predicate::Predicate;
use crate::schema::RecordType;

#[derive(Debug, Clone, Copy, PartialEq)]
struct GeoBox {
    north: f64,
    south: f64,
    east: f64,
    west: f64,
}

impl GeoBox {
    fn from_param(name: FilterName, value: &ParamValue) -> Result<GeoBox> {
        let fail = || QueryError::shape(name.as_str(), "a box with north, south, east and west", value);
        let map = value.as_map().ok_or_else(fail)?;
        let side = |key: &str| map.get(key).and_then(ParamValue::as_f64).ok_or_else(fail);
        Ok(GeoBox {
            north: side("north")?,
            south: side("south")?,
            east: side("east")?,
            west: side("west")?,
        })
    }

    /// Crosses the antimeridian.
    fn wraps(&self) -> bool {
        self.west > self.east
    }

    fn lat(&self, column: &'static str) -> Predicate {
        between(column, self.south, self.north)
    }

    fn lng(&self, column: &'static str) -> Predicate {
        if self.wraps() {
            Predicate::or([
                Predicate::compare(column, Op::Gte, self.west),
                Predicate::compare(column, Op::Lte, self.east),
            ])
        } else {
            between(column, self.west, self.east)
        }
    }

    /// A west-to-east extent lies inside the box's longitudes. Across the
    /// antimeridian it either wraps as well or sits wholly on one side.
    fn span(&self, west: &'static str, east: &'static str) -> Predicate {
        let plain = Predicate::columns(west, Op::Lte, east);
        if !self.wraps() {
            return Predicate::and([between(west, self.west, self.east), between(east, self.west, self.east), plain]);
        }
        let eastern = Predicate::compare(west, Op::Gte, self.west);
        let western = Predicate::compare(east, Op::Lte, self.east);
        Predicate::or([
            Predicate::and([Predicate::columns(west, Op::Gt, east), eastern.clone(), western.clone()]),
            Predicate::and([plain, Predicate::or([eastern, western])]),
        ])
    }

    fn point(&self, lat: &'static str, lng: &'static str) -> Predicate {
        Predicate::and([self.lat(lat), self.lng(lng)])
    }
}

/// `in_box`.
///
/// Observations match on their own coordinates, or on their location's
/// center when they have none. Locations must lie entirely inside the box.
pub(super) fn in_box(_: &FilterCx<'_>, name: FilterName, rt: RecordType, value: &ParamValue) -> Result<Predicate> {
    let area = GeoBox::from_param(name, value)?;

    match rt {
        RecordType::Observation => Ok(Predicate::or([
            area.point("lat", "lng"),
            Predicate::and([
                Predicate::is_null("lat"),
                area.point("location_lat", "location_lng"),
            ]),
        ])),
        RecordType::Location => Ok(Predicate::and([
            Predicate::compare("north", Op::Lte, area.north),
            Predicate::compare("south", Op::Gte, area.south),
            area.span("west", "east"),
        ])),
        _ => Err(QueryError::NotApplicable {
            record_type: rt,
            name: name.as_str(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    #[test]
    fn wrapping_box_splits_longitude() {
        let area = GeoBox {
            north: 90.0,
            south: 0.0,
            east: -170.0,
            west: 170.0,
        };
        assert_eq!(area.lng("lng").to_string(), "(lng >= 170 OR lng <= -170)");
    }

    #[test]
    fn wrapping_box_rejects_a_wide_extent() {
        let area = GeoBox {
            north: 90.0,
            south: 0.0,
            east: -170.0,
            west: 170.0,
        };
        let span = area.span("west", "east").to_string();
        assert!(span.contains("west > east"), "{span}");
        assert!(span.contains("west <= east"), "{span}");
    }

    #[test]
    fn plain_box_is_a_range() {
        let value = ParamValue::Nested(params! {
            "north" => 40.0, "south" => 30.0, "east" => -110.0, "west" => -120.0,
        });
        let area = GeoBox::from_param(FilterName::InBox, &value).unwrap();
        assert!(!area.wraps());
        assert_eq!(area.lng("lng").to_string(), "(lng >= -120 AND lng <= -110)");
    }
}
