//! Which geofence applies to a user, and whether a position is inside it.
//!
//! Precedence is user override, then department, then the global office.
//! Each level is a provider in an ordered list; the first one that yields a
//! complete, valid geofence wins and the rest are never consulted.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;
use utoipa::ToSchema;

use super::geo::GeoPoint;

pub const USER_SPECIFIC_LABEL: &str = "user-specific";
pub const DEFAULT_GLOBAL_LABEL: &str = "Global office";

/// A geofence as stored or submitted, before validation.
///
/// Any field may be missing. Numeric fields accept numbers or numeric
/// strings; other JSON values and non-finite numbers are treated as missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeofenceCandidate {
    #[serde(default, deserialize_with = "lenient_number")]
    #[schema(example = 23.8103, nullable = true)]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    #[schema(example = 90.4125, nullable = true)]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    #[schema(example = 150.0, nullable = true)]
    pub radius_meters: Option<f64>,
    #[serde(default)]
    #[schema(example = "Head office", nullable = true)]
    pub name: Option<String>,
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .filter(|n| n.is_finite()))
}

impl GeofenceCandidate {
    /// From nullable columns; `None` when nothing at all is configured.
    pub fn from_columns(
        latitude: Option<f64>,
        longitude: Option<f64>,
        radius_meters: Option<f64>,
        name: Option<String>,
    ) -> Option<Self> {
        if latitude.is_none() && longitude.is_none() && radius_meters.is_none() {
            return None;
        }
        Some(Self {
            latitude,
            longitude,
            radius_meters,
            name,
        })
    }

    /// All three numbers present, coordinates valid, radius positive.
    pub fn validate(&self) -> Option<(GeoPoint, f64)> {
        let (lat, lon, radius) = (self.latitude?, self.longitude?, self.radius_meters?);
        if !radius.is_finite() || radius <= 0.0 {
            return None;
        }
        let origin = GeoPoint::new(lat, lon).ok()?;
        Some((origin, radius))
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GeofenceSource {
    User,
    Department,
    Global,
}

/// The authoritative geofence for a user.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GeofenceSetting {
    pub origin: GeoPoint,
    #[schema(example = 150.0)]
    pub radius_meters: f64,
    #[schema(example = "Engineering")]
    pub label: String,
    pub source: GeofenceSource,
}

impl GeofenceSetting {
    pub fn distance_from(&self, position: &GeoPoint) -> f64 {
        self.origin.distance_to(position)
    }

    /// Inclusive: a position exactly on the boundary counts as inside.
    pub fn contains(&self, position: &GeoPoint) -> bool {
        self.distance_from(position) <= self.radius_meters
    }
}

type Lookup<'a> = Box<dyn Fn() -> Option<(GeofenceCandidate, String)> + 'a>;

struct Provider<'a> {
    source: GeofenceSource,
    lookup: Lookup<'a>,
}

/// Ordered list of geofence providers.
#[derive(Default)]
pub struct LocationResolver<'a> {
    providers: Vec<Provider<'a>>,
}

impl<'a> LocationResolver<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider. `lookup` returns the candidate and its label.
    pub fn then<F>(mut self, source: GeofenceSource, lookup: F) -> Self
    where
        F: Fn() -> Option<(GeofenceCandidate, String)> + 'a,
    {
        self.providers.push(Provider {
            source,
            lookup: Box::new(lookup),
        });
        self
    }

    /// Standard precedence: user override, department, global.
    pub fn for_user<D, G>(
        user_override: Option<&'a GeofenceCandidate>,
        department: Option<&'a str>,
        department_lookup: D,
        global_lookup: G,
    ) -> Self
    where
        D: Fn(&str) -> Option<GeofenceCandidate> + 'a,
        G: Fn() -> Option<GeofenceCandidate> + 'a,
    {
        Self::new()
            .then(GeofenceSource::User, move || {
                user_override.map(|c| (c.clone(), USER_SPECIFIC_LABEL.to_string()))
            })
            .then(GeofenceSource::Department, move || {
                let name = department?;
                department_lookup(name).map(|c| (c, name.to_string()))
            })
            .then(GeofenceSource::Global, move || {
                global_lookup().map(|c| {
                    let label = c
                        .name
                        .as_deref()
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .unwrap_or(DEFAULT_GLOBAL_LABEL)
                        .to_string();
                    (c, label)
                })
            })
    }

    pub fn sources(&self) -> Vec<GeofenceSource> {
        self.providers.iter().map(|p| p.source).collect()
    }

    pub fn resolve(&self) -> Option<GeofenceSetting> {
        for provider in &self.providers {
            let Some((candidate, label)) = (provider.lookup)() else {
                continue;
            };
            match candidate.validate() {
                Some((origin, radius_meters)) => {
                    return Some(GeofenceSetting {
                        origin,
                        radius_meters,
                        label,
                        source: provider.source,
                    });
                }
                None => {
                    debug!(source = ?provider.source, ?candidate, "Skipping incomplete geofence");
                }
            }
        }
        debug!(sources = ?self.sources(), "No usable geofence; clocking is unrestricted");
        None
    }
}

/// Resolve with the standard user → department → global precedence.
pub fn resolve_geofence<'a, D, G>(
    user_override: Option<&'a GeofenceCandidate>,
    department: Option<&'a str>,
    department_lookup: D,
    global_lookup: G,
) -> Option<GeofenceSetting>
where
    D: Fn(&str) -> Option<GeofenceCandidate> + 'a,
    G: Fn() -> Option<GeofenceCandidate> + 'a,
{
    LocationResolver::for_user(user_override, department, department_lookup, global_lookup)
        .resolve()
}

/// Outcome of checking a device position against the resolved geofence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Eligibility {
    /// No geofence configured anywhere.
    Unrestricted,
    /// A geofence applies but the caller sent no position.
    PositionRequired { geofence: GeofenceSetting },
    InRange {
        geofence: GeofenceSetting,
        distance_meters: f64,
    },
    OutOfRange {
        geofence: GeofenceSetting,
        distance_meters: f64,
    },
}

impl Eligibility {
    pub fn evaluate(geofence: Option<GeofenceSetting>, position: Option<&GeoPoint>) -> Self {
        let Some(geofence) = geofence else {
            return Eligibility::Unrestricted;
        };
        let Some(position) = position else {
            return Eligibility::PositionRequired { geofence };
        };
        let distance_meters = geofence.distance_from(position);
        if geofence.contains(position) {
            Eligibility::InRange {
                geofence,
                distance_meters,
            }
        } else {
            Eligibility::OutOfRange {
                geofence,
                distance_meters,
            }
        }
    }

    pub fn may_clock(&self) -> bool {
        matches!(self, Eligibility::Unrestricted | Eligibility::InRange { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl GeofenceCandidate {
        fn new(latitude: f64, longitude: f64, radius_meters: f64) -> Self {
            Self {
                latitude: Some(latitude),
                longitude: Some(longitude),
                radius_meters: Some(radius_meters),
                name: None,
            }
        }

        fn named(mut self, name: impl Into<String>) -> Self {
            self.name = Some(name.into());
            self
        }
    }
    use std::cell::Cell;

    fn user() -> GeofenceCandidate {
        GeofenceCandidate::new(23.80, 90.41, 50.0)
    }

    fn department() -> GeofenceCandidate {
        GeofenceCandidate::new(23.75, 90.39, 200.0)
    }

    fn global() -> GeofenceCandidate {
        GeofenceCandidate::new(23.70, 90.35, 500.0).named("HQ")
    }

    #[test]
    fn user_override_wins_over_everything() {
        let u = user();
        let got = resolve_geofence(Some(&u), Some("Engineering"), |_| Some(department()), || Some(global()))
            .unwrap();
        assert_eq!(got.source, GeofenceSource::User);
        assert_eq!(got.label, USER_SPECIFIC_LABEL);
        assert_eq!(got.radius_meters, 50.0);
    }

    #[test]
    fn department_wins_over_global() {
        let got = resolve_geofence(None, Some("Engineering"), |_| Some(department()), || Some(global()))
            .unwrap();
        assert_eq!(got.source, GeofenceSource::Department);
        assert_eq!(got.label, "Engineering");
        assert_eq!(got.radius_meters, 200.0);
    }

    #[test]
    fn falls_back_to_global() {
        let got = resolve_geofence(None, Some("Sales"), |_| None, || Some(global())).unwrap();
        assert_eq!(got.source, GeofenceSource::Global);
        assert_eq!(got.label, "HQ");
    }

    #[test]
    fn unnamed_global_gets_default_label() {
        let unnamed = GeofenceCandidate::new(23.70, 90.35, 500.0).named("   ");
        let got = resolve_geofence(None, None, |_| None, || Some(unnamed.clone())).unwrap();
        assert_eq!(got.label, DEFAULT_GLOBAL_LABEL);
    }

    #[test]
    fn none_when_every_source_is_invalid_or_absent() {
        let partial_user = GeofenceCandidate {
            latitude: Some(23.8),
            longitude: Some(90.4),
            radius_meters: None,
            name: None,
        };
        let zero_radius = GeofenceCandidate::new(23.7, 90.3, 0.0);
        let got = resolve_geofence(
            Some(&partial_user),
            Some("Engineering"),
            |_| Some(zero_radius.clone()),
            || None,
        );
        assert_eq!(got, None);
        assert_eq!(resolve_geofence(None, None, |_| None, || None), None);
    }

    #[test]
    fn partial_override_falls_through_instead_of_merging() {
        let partial = GeofenceCandidate {
            latitude: Some(1.0),
            longitude: None,
            radius_meters: Some(10.0),
            name: None,
        };
        let got = resolve_geofence(Some(&partial), Some("Ops"), |_| Some(department()), || None).unwrap();
        assert_eq!(got.source, GeofenceSource::Department);
        assert_eq!(got.origin, department().validate().unwrap().0);
    }

    #[test]
    fn department_lookup_skipped_without_department_name() {
        let called = Cell::new(false);
        let got = resolve_geofence(
            None,
            None,
            |_| {
                called.set(true);
                Some(department())
            },
            || Some(global()),
        )
        .unwrap();
        assert!(!called.get());
        assert_eq!(got.source, GeofenceSource::Global);
    }

    #[test]
    fn later_providers_are_not_consulted_once_resolved() {
        let global_called = Cell::new(false);
        let u = user();
        resolve_geofence(Some(&u), None, |_| None, || {
            global_called.set(true);
            None
        });
        assert!(!global_called.get());
    }

    #[test]
    fn precedence_order_is_user_department_global() {
        let resolver = LocationResolver::for_user(None, None, |_| None, || None);
        assert_eq!(
            resolver.sources(),
            vec![GeofenceSource::User, GeofenceSource::Department, GeofenceSource::Global]
        );
    }

    #[test]
    fn custom_provider_order_is_respected() {
        let resolver = LocationResolver::new()
            .then(GeofenceSource::Global, || Some((global(), "HQ".into())))
            .then(GeofenceSource::User, || Some((user(), USER_SPECIFIC_LABEL.into())));
        assert_eq!(resolver.resolve().unwrap().source, GeofenceSource::Global);
    }

    #[test]
    fn lenient_numbers_from_json() {
        let c: GeofenceCandidate = serde_json::from_str(
            r#"{"latitude": "23.8", "longitude": 90.4, "radius_meters": " 100 "}"#,
        )
        .unwrap();
        assert!(c.is_valid());

        let c: GeofenceCandidate = serde_json::from_str(
            r#"{"latitude": "north", "longitude": 90.4, "radius_meters": 100}"#,
        )
        .unwrap();
        assert_eq!(c.latitude, None);
        assert!(!c.is_valid());

        let c: GeofenceCandidate = serde_json::from_str(
            r#"{"latitude": "NaN", "longitude": "inf", "radius_meters": "1e400"}"#,
        )
        .unwrap();
        assert_eq!(c.latitude, None);
        assert_eq!(c.longitude, None);
        assert_eq!(c.radius_meters, None);
        assert!(!c.is_valid());

        let c: GeofenceCandidate = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(c, GeofenceCandidate::default());
    }

    #[test]
    fn negative_radius_and_bad_coordinates_are_invalid() {
        assert!(!GeofenceCandidate::new(23.8, 90.4, -5.0).is_valid());
        assert!(!GeofenceCandidate::new(123.8, 90.4, 5.0).is_valid());
        assert!(!GeofenceCandidate::new(23.8, 190.4, 5.0).is_valid());
    }

    #[test]
    fn eligibility_without_geofence_is_unrestricted() {
        let here = GeoPoint::new(0.0, 0.0).unwrap();
        let e = Eligibility::evaluate(None, Some(&here));
        assert_eq!(e, Eligibility::Unrestricted);
        assert!(e.may_clock());
        assert!(Eligibility::evaluate(None, None).may_clock());
    }

    #[test]
    fn eligibility_requires_position_when_restricted() {
        let g = resolve_geofence(None, None, |_| None, || Some(global()));
        let e = Eligibility::evaluate(g, None);
        assert!(matches!(e, Eligibility::PositionRequired { .. }));
        assert!(!e.may_clock());
    }

    #[test]
    fn eligibility_boundary_is_inclusive() {
        let origin = GeoPoint::new(0.0, 0.0).unwrap();
        let edge = GeoPoint::new(0.001, 0.0).unwrap();
        let exact = origin.distance_to(&edge);

        let g = GeofenceSetting {
            origin,
            radius_meters: exact,
            label: "edge".into(),
            source: GeofenceSource::Global,
        };
        assert!(g.contains(&edge));
        assert!(Eligibility::evaluate(Some(g.clone()), Some(&edge)).may_clock());

        let shrunk = GeofenceSetting {
            radius_meters: exact - 0.01,
            ..g
        };
        let e = Eligibility::evaluate(Some(shrunk), Some(&edge));
        assert!(matches!(e, Eligibility::OutOfRange { .. }));
        assert!(!e.may_clock());
    }

    #[test]
    fn eligibility_serializes_with_status_tag() {
        let json = serde_json::to_value(Eligibility::Unrestricted).unwrap();
        assert_eq!(json["status"], "unrestricted");
    }
}
