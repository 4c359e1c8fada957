//! Aspects: the typed dimensions of an allocation outcome.
//!
//! An [`AspectValue`] pairs an [`AspectType`] (start time, cost, ...) with a
//! scalar. Values of the same type compare exactly with `==` and loosely
//! with [`AspectValue::nearly_equals`]. Arrays of aspect values are keyed
//! by type, plus the asset for typed quantities, and compare without regard
//! to order.
//!
//! # Time Model
//! Time-typed aspects hold milliseconds relative to a planning epoch,
//! stored as `f64` like every other aspect so that aggregation and
//! scoring treat all aspects uniformly.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::aspect_registry;
use crate::config::NEARLY_EQUAL_EPSILON;
use crate::error::{PlanError, PlanResult};

/// Number of core aspect types (codes `0..15`).
pub const CORE_ASPECT_COUNT: usize = 15;

/// Number of standard aspect types handled by the default aggregator
/// (codes `0..13`).
pub const STANDARD_ASPECT_COUNT: usize = 13;

/// One dimension of an allocation outcome.
///
/// The core set is closed; user extensions carry a code of
/// [`CORE_ASPECT_COUNT`] or above and get their name from the aspect
/// registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AspectType {
    StartTime,
    EndTime,
    Duration,
    Cost,
    Danger,
    Risk,
    Quantity,
    Interval,
    TotalQuantity,
    TotalShipments,
    CustomerSatisfaction,
    TypedQuantity,
    Readiness,
    /// Point of debarkation.
    Pod,
    /// Arrival date at the point of debarkation.
    PodDate,
    /// User-registered aspect with its numeric code.
    Extension(ExtensionCode),
}

/// Code of a user-registered aspect type, never below
/// [`CORE_ASPECT_COUNT`]. Obtained through [`AspectType::from_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ExtensionCode(u32);

impl ExtensionCode {
    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for ExtensionCode {
    type Error = String;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        if (code as usize) < CORE_ASPECT_COUNT {
            Err(format!("aspect code {code} belongs to a core type"))
        } else {
            Ok(ExtensionCode(code))
        }
    }
}

impl From<ExtensionCode> for u32 {
    fn from(code: ExtensionCode) -> u32 {
        code.0
    }
}

const CORE_NAMES: [&str; CORE_ASPECT_COUNT] = [
    "START_TIME",
    "END_TIME",
    "DURATION",
    "COST",
    "DANGER",
    "RISK",
    "QUANTITY",
    "INTERVAL",
    "TOTAL_QUANTITY",
    "TOTAL_SHIPMENTS",
    "CUSTOMER_SATISFACTION",
    "TYPED_QUANTITY",
    "READINESS",
    "POD",
    "POD_DATE",
];

impl AspectType {
    /// All core aspect types in code order.
    pub const CORE: [AspectType; CORE_ASPECT_COUNT] = [
        AspectType::StartTime,
        AspectType::EndTime,
        AspectType::Duration,
        AspectType::Cost,
        AspectType::Danger,
        AspectType::Risk,
        AspectType::Quantity,
        AspectType::Interval,
        AspectType::TotalQuantity,
        AspectType::TotalShipments,
        AspectType::CustomerSatisfaction,
        AspectType::TypedQuantity,
        AspectType::Readiness,
        AspectType::Pod,
        AspectType::PodDate,
    ];

    /// Numeric code of this aspect type.
    pub fn code(self) -> u32 {
        match self {
            AspectType::Extension(code) => code.get(),
            core => AspectType::CORE
                .iter()
                .position(|t| *t == core)
                .map_or(0, |i| i as u32),
        }
    }

    /// Aspect type for a numeric code. Codes past the core set are extensions.
    pub fn from_code(code: u32) -> Self {
        AspectType::CORE
            .get(code as usize)
            .copied()
            .unwrap_or(AspectType::Extension(ExtensionCode(code)))
    }

    /// Canonical name of a core type, `None` for extensions.
    pub fn core_name(self) -> Option<&'static str> {
        match self {
            AspectType::Extension(_) => None,
            core => CORE_NAMES.get(core.code() as usize).copied(),
        }
    }

    /// Whether this is one of the standard aspects (codes `0..13`).
    pub fn is_standard(self) -> bool {
        (self.code() as usize) < STANDARD_ASPECT_COUNT
    }

    /// Whether values of this type are points or spans in time.
    pub fn is_time(self) -> bool {
        matches!(
            self,
            AspectType::StartTime
                | AspectType::EndTime
                | AspectType::Duration
                | AspectType::Interval
                | AspectType::PodDate
        )
    }

    /// Value kind produced for this type when none is given explicitly.
    pub fn default_kind(self) -> ValueKind {
        match self {
            t if t.is_time() => ValueKind::Time,
            AspectType::TypedQuantity => ValueKind::TypedQuantity {
                asset: String::new(),
            },
            AspectType::Extension(_) => {
                aspect_registry::kind_of(self).unwrap_or(ValueKind::Float)
            }
            _ => ValueKind::Float,
        }
    }
}

impl fmt::Display for AspectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.core_name() {
            Some(name) => f.write_str(name),
            None => match aspect_registry::name_of(*self) {
                Some(name) => f.write_str(&name),
                None => write!(f, "ASPECT_{}", self.code()),
            },
        }
    }
}

/// Interpretation of an aspect's scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Float,
    /// Milliseconds since the planning epoch (or a span in milliseconds).
    Time,
    /// Quantity per unit time.
    Rate,
    /// Quantity of a specific asset.
    TypedQuantity { asset: String },
}

/// An immutable (type, value) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AspectValue {
    aspect_type: AspectType,
    value: f64,
    kind: ValueKind,
}

impl AspectValue {
    /// Creates a value with the natural kind of `aspect_type`.
    pub fn new(aspect_type: AspectType, value: f64) -> Self {
        Self {
            aspect_type,
            value,
            kind: aspect_type.default_kind(),
        }
    }

    pub(crate) fn of_kind(aspect_type: AspectType, value: f64, kind: ValueKind) -> Self {
        Self {
            aspect_type,
            value,
            kind,
        }
    }

    /// Creates a time-typed value from milliseconds.
    pub fn time(aspect_type: AspectType, time_ms: i64) -> Self {
        Self {
            aspect_type,
            value: time_ms as f64,
            kind: ValueKind::Time,
        }
    }

    /// Creates a rate-typed value.
    pub fn rate(aspect_type: AspectType, rate: f64) -> Self {
        Self {
            aspect_type,
            value: rate,
            kind: ValueKind::Rate,
        }
    }

    /// Creates a typed quantity of `asset`.
    pub fn typed_quantity(asset: impl Into<String>, quantity: f64) -> Self {
        Self {
            aspect_type: AspectType::TypedQuantity,
            value: quantity,
            kind: ValueKind::TypedQuantity {
                asset: asset.into(),
            },
        }
    }

    #[inline]
    pub fn aspect_type(&self) -> AspectType {
        self.aspect_type
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    /// Value rounded to whole milliseconds.
    pub fn time_value(&self) -> i64 {
        self.value.round() as i64
    }

    /// Asset of a typed quantity.
    pub fn asset(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::TypedQuantity { asset } => Some(asset),
            _ => None,
        }
    }

    /// Identity within an aspect array.
    pub fn key(&self) -> (AspectType, Option<&str>) {
        (self.aspect_type, self.asset())
    }

    /// Same type and kind with a new scalar.
    pub fn dup(&self, value: f64) -> Self {
        Self {
            aspect_type: self.aspect_type,
            value,
            kind: self.kind.clone(),
        }
    }

    pub fn is_less_than(&self, other: &AspectValue) -> bool {
        self.value < other.value
    }

    pub fn is_greater_than(&self, other: &AspectValue) -> bool {
        self.value > other.value
    }

    /// `self - other` on the scalar.
    pub fn minus(&self, other: &AspectValue) -> f64 {
        self.value - other.value
    }

    /// Inclusive range test: not below `low` and not above `high`.
    pub fn is_between(&self, low: &AspectValue, high: &AspectValue) -> bool {
        !self.is_less_than(low) && !self.is_greater_than(high)
    }

    /// Same key and values equal within [`NEARLY_EQUAL_EPSILON`].
    pub fn nearly_equals(&self, other: &AspectValue) -> bool {
        self.nearly_equals_within(other, NEARLY_EQUAL_EPSILON)
    }

    /// Same key and values equal within a relative tolerance.
    pub fn nearly_equals_within(&self, other: &AspectValue, epsilon: f64) -> bool {
        self.key() == other.key() && nearly_equal(self.value, other.value, epsilon)
    }
}

impl PartialEq for AspectValue {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key() && self.value == other.value
    }
}

impl fmt::Display for AspectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValueKind::TypedQuantity { asset } => {
                write!(f, "{}[{}]={}", self.aspect_type, asset, self.value)
            }
            ValueKind::Time => write!(f, "{}={}ms", self.aspect_type, self.time_value()),
            _ => write!(f, "{}={}", self.aspect_type, self.value),
        }
    }
}

/// Relative comparison, absolute for magnitudes below 1.
pub fn nearly_equal(a: f64, b: f64, epsilon: f64) -> bool {
    if a == b {
        return true;
    }
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= epsilon * scale
}

/// Checks that an aspect array has no duplicate keys and no NaN values.
pub fn check_aspect_set(values: &[AspectValue]) -> PlanResult<()> {
    for (i, av) in values.iter().enumerate() {
        if av.value.is_nan() {
            return Err(PlanError::InvalidAspectSet {
                reason: format!("element {i} ({}) is not a number", av.aspect_type),
            });
        }
        if values[..i].iter().any(|prev| prev.key() == av.key()) {
            return Err(PlanError::InvalidAspectSet {
                reason: format!("element {i} repeats aspect {}", av.aspect_type),
            });
        }
    }
    Ok(())
}

/// Order-independent exact comparison of two aspect arrays.
pub fn aspect_sets_equal(a: &[AspectValue], b: &[AspectValue]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|x| b.iter().any(|y| y.key() == x.key() && y.value == x.value))
}

/// Order-independent nearly-equal comparison of two aspect arrays.
pub fn aspect_sets_nearly_equal(a: &[AspectValue], b: &[AspectValue]) -> bool {
    aspect_sets_nearly_equal_within(a, b, NEARLY_EQUAL_EPSILON)
}

/// [`aspect_sets_nearly_equal`] with an explicit relative tolerance.
pub fn aspect_sets_nearly_equal_within(a: &[AspectValue], b: &[AspectValue], epsilon: f64) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|x| b.iter().any(|y| y.nearly_equals_within(x, epsilon)))
}

/// Number of auxiliary query types.
pub const AQTYPE_COUNT: usize = 6;

/// Free-form side information an allocator may attach to a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuxiliaryQueryType {
    PortName,
    FailureReason,
    UnitSourced,
    PoeDate,
    Readiness,
    Overtime,
}

impl AuxiliaryQueryType {
    /// All query types in index order.
    pub const ALL: [AuxiliaryQueryType; AQTYPE_COUNT] = [
        AuxiliaryQueryType::PortName,
        AuxiliaryQueryType::FailureReason,
        AuxiliaryQueryType::UnitSourced,
        AuxiliaryQueryType::PoeDate,
        AuxiliaryQueryType::Readiness,
        AuxiliaryQueryType::Overtime,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Query type at `index`.
    ///
    /// # Errors
    /// `InvalidAuxiliaryQuery` when `index >= AQTYPE_COUNT`.
    pub fn from_index(index: usize) -> PlanResult<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(PlanError::InvalidAuxiliaryQuery { index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for (i, t) in AspectType::CORE.iter().enumerate() {
            assert_eq!(t.code(), i as u32);
            assert_eq!(AspectType::from_code(i as u32), *t);
        }
        assert!(matches!(AspectType::from_code(42), AspectType::Extension(c) if c.get() == 42));
        assert_eq!(AspectType::from_code(42).code(), 42);
    }

    #[test]
    fn test_extension_codes_stay_out_of_core_range() {
        assert!(ExtensionCode::try_from(3).is_err());
        assert_eq!(AspectType::from_code(3), AspectType::Cost);

        let ext: AspectType = serde_json::from_str(r#"{"Extension":42}"#).unwrap();
        assert_eq!(ext, AspectType::from_code(42));
        assert!(serde_json::from_str::<AspectType>(r#"{"Extension":3}"#).is_err());
        assert_eq!(serde_json::to_string(&ext).unwrap(), r#"{"Extension":42}"#);
    }

    #[test]
    fn test_names() {
        assert_eq!(AspectType::StartTime.to_string(), "START_TIME");
        assert_eq!(AspectType::PodDate.to_string(), "POD_DATE");
        assert_eq!(AspectType::from_code(9999).to_string(), "ASPECT_9999");
    }

    #[test]
    fn test_standard_and_time_classes() {
        assert!(AspectType::Readiness.is_standard());
        assert!(!AspectType::Pod.is_standard());
        assert!(AspectType::Interval.is_time());
        assert!(!AspectType::Cost.is_time());
        assert_eq!(AspectType::EndTime.default_kind(), ValueKind::Time);
    }

    #[test]
    fn test_equality_is_type_sensitive() {
        let a = AspectValue::new(AspectType::Cost, 10.0);
        let b = AspectValue::new(AspectType::Cost, 10.0);
        let c = AspectValue::new(AspectType::Quantity, 10.0);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.nearly_equals(&c));
    }

    #[test]
    fn test_nearly_equals() {
        let a = AspectValue::new(AspectType::Cost, 1_000_000.0);
        let b = AspectValue::new(AspectType::Cost, 1_000_000.0000001);
        assert_ne!(a, b);
        assert!(a.nearly_equals(&b));
        let c = AspectValue::new(AspectType::Cost, 1_000_001.0);
        assert!(!a.nearly_equals(&c));
    }

    #[test]
    fn test_comparisons() {
        let lo = AspectValue::new(AspectType::StartTime, 10.0);
        let hi = AspectValue::new(AspectType::StartTime, 20.0);
        let v = AspectValue::new(AspectType::StartTime, 20.0);
        assert!(v.is_between(&lo, &hi));
        assert!(lo.is_less_than(&hi));
        assert!(hi.is_greater_than(&lo));
        assert!((hi.minus(&lo) - 10.0).abs() < 1e-10);
        let d = lo.dup(15.0);
        assert_eq!(d.aspect_type(), AspectType::StartTime);
        assert_eq!(d.kind(), &ValueKind::Time);
    }

    #[test]
    fn test_typed_quantity_key_includes_asset() {
        let a = AspectValue::typed_quantity("fuel", 5.0);
        let b = AspectValue::typed_quantity("water", 5.0);
        assert_ne!(a, b);
        assert!(check_aspect_set(&[a.clone(), b]).is_ok());
        assert!(check_aspect_set(&[a.clone(), a]).is_err());
    }

    #[test]
    fn test_check_aspect_set_rejects_nan_and_duplicates() {
        let dup = vec![
            AspectValue::new(AspectType::Cost, 1.0),
            AspectValue::new(AspectType::Cost, 2.0),
        ];
        match check_aspect_set(&dup) {
            Err(PlanError::InvalidAspectSet { .. }) => {}
            other => panic!("expected InvalidAspectSet, got {other:?}"),
        }
        let nan = vec![AspectValue::new(AspectType::Risk, f64::NAN)];
        assert!(check_aspect_set(&nan).is_err());
    }

    #[test]
    fn test_set_comparison_ignores_order() {
        let a = vec![
            AspectValue::new(AspectType::Cost, 1.0),
            AspectValue::new(AspectType::Risk, 0.5),
        ];
        let b = vec![
            AspectValue::new(AspectType::Risk, 0.5),
            AspectValue::new(AspectType::Cost, 1.0),
        ];
        assert!(aspect_sets_equal(&a, &b));
        assert!(aspect_sets_nearly_equal(&a, &b));
        assert!(!aspect_sets_equal(&a, &b[..1]));
    }

    #[test]
    fn test_auxiliary_query_index() {
        assert_eq!(AuxiliaryQueryType::Overtime.index(), 5);
        assert_eq!(
            AuxiliaryQueryType::from_index(3).unwrap(),
            AuxiliaryQueryType::PoeDate
        );
        match AuxiliaryQueryType::from_index(AQTYPE_COUNT) {
            Err(PlanError::InvalidAuxiliaryQuery { index }) => assert_eq!(index, 6),
            other => panic!("expected InvalidAuxiliaryQuery, got {other:?}"),
        }
    }

    #[test]
    fn test_serde_round_trip() {
        let v = AspectValue::typed_quantity("fuel", 12.5);
        let json = serde_json::to_string(&v).unwrap();
        let back: AspectValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
        assert_eq!(back.asset(), Some("fuel"));
    }
}
