//! Dynamic postgres values.
//!
//! Codecs decode wire payloads into [`Value`] and encode [`Value`] back;
//! the codec for a field is selected by oid at Bind-construction time, so
//! one value surface covers every built-in and user-registered type.
use bytes::Bytes;
use std::net::IpAddr;

use crate::common::ByteStr;
use crate::postgres::Oid;

/// A decoded postgres value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    /// `oid` and the `reg*` family.
    Oid(Oid),
    Float4(f32),
    Float8(f64),
    /// Arbitrary precision number, kept as its decimal text form.
    Numeric(ByteStr),
    /// The session-encoded string family: `text`, `varchar`, `bpchar`,
    /// `name`, `char`, `xml`, and any type surfaced in its text form.
    Text(ByteStr),
    Bytea(Bytes),
    Uuid([u8; 16]),
    Date(Date),
    Time(Time),
    TimeTz(TimeTz),
    Timestamp(Timestamp),
    TimestampTz(Timestamp),
    Interval(Interval),
    /// `inet` and `cidr`.
    Inet(Inet),
    Tid(Tid),
    Json(ByteStr),
    Jsonb(ByteStr),
    /// `bit` and `varbit`.
    Bit(Bit),
    Point(Point),
    Line(Line),
    LineSegment(LineSegment),
    Box(PgBox),
    Path(PgPath),
    Polygon(Polygon),
    Circle(Circle),
    TxidSnapshot(TxidSnapshot),
    Void,
    /// An array; multidimensional arrays nest `Value::Array` elements.
    Array(Vec<Value>),
    /// A composite value, ordered by field position.
    Record(Vec<Value>),
    Range(std::boxed::Box<PgRange>),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int2(_) => "int2",
            Value::Int4(_) => "int4",
            Value::Int8(_) => "int8",
            Value::Oid(_) => "oid",
            Value::Float4(_) => "float4",
            Value::Float8(_) => "float8",
            Value::Numeric(_) => "numeric",
            Value::Text(_) => "text",
            Value::Bytea(_) => "bytea",
            Value::Uuid(_) => "uuid",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::TimeTz(_) => "timetz",
            Value::Timestamp(_) => "timestamp",
            Value::TimestampTz(_) => "timestamptz",
            Value::Interval(_) => "interval",
            Value::Inet(_) => "inet",
            Value::Tid(_) => "tid",
            Value::Json(_) => "json",
            Value::Jsonb(_) => "jsonb",
            Value::Bit(_) => "bit",
            Value::Point(_) => "point",
            Value::Line(_) => "line",
            Value::LineSegment(_) => "lseg",
            Value::Box(_) => "box",
            Value::Path(_) => "path",
            Value::Polygon(_) => "polygon",
            Value::Circle(_) => "circle",
            Value::TxidSnapshot(_) => "txid_snapshot",
            Value::Void => "void",
            Value::Array(_) => "array",
            Value::Record(_) => "record",
            Value::Range(_) => "range",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Json(s) | Value::Jsonb(s) | Value::Numeric(s) => Some(s),
            _ => None,
        }
    }
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Value {
            fn from($pat: $ty) -> Self {
                $body
            }
        }
    };
}

from!(<bool>v => Value::Bool(v));
from!(<i16>v => Value::Int2(v));
from!(<i32>v => Value::Int4(v));
from!(<i64>v => Value::Int8(v));
from!(<f32>v => Value::Float4(v));
from!(<f64>v => Value::Float8(v));
from!(<&str>v => Value::Text(ByteStr::copy_from_str(v)));
from!(<String>v => Value::Text(v.into()));
from!(<ByteStr>v => Value::Text(v));
from!(<Bytes>v => Value::Bytea(v));
from!(<Vec<u8>>v => Value::Bytea(v.into()));
from!(<[u8; 16]>v => Value::Uuid(v));
from!(<Date>v => Value::Date(v));
from!(<Time>v => Value::Time(v));
from!(<Timestamp>v => Value::Timestamp(v));
from!(<Interval>v => Value::Interval(v));
from!(<Inet>v => Value::Inet(v));
from!(<Point>v => Value::Point(v));
from!(<PgRange>v => Value::Range(std::boxed::Box::new(v)));
from!(<Vec<Value>>v => Value::Array(v));

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// Days since 2000-01-01, with the documented infinities.
///
/// The wire sentinels `0x7FFFFFFF` and `0x80000000` map to
/// [`PosInfinity`][Date::PosInfinity] and [`NegInfinity`][Date::NegInfinity].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Date {
    Finite(i32),
    PosInfinity,
    NegInfinity,
}

/// Microseconds since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time {
    pub micros: i64,
}

/// Time of day with a fixed UTC offset.
///
/// `offset_secs` is seconds east of UTC (host convention); the wire stores
/// the opposite sign and the codec flips it both ways.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeTz {
    pub micros: i64,
    pub offset_secs: i32,
}

/// Microseconds since 2000-01-01 00:00, with the documented infinities.
///
/// Naive for `timestamp`, UTC for `timestamptz`; the wire sentinels
/// `0x7FFF…FF` and `0x8000…00` map to the infinity variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    Finite(i64),
    PosInfinity,
    NegInfinity,
}

/// The three-component interval: months and days stay symbolic, everything
/// below a day is microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interval {
    pub micros: i64,
    pub days: i32,
    pub months: i32,
}

/// An `inet` or `cidr` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inet {
    pub addr: IpAddr,
    /// Network prefix bits.
    pub prefix: u8,
    /// Distinguishes `cidr` from `inet` on the wire.
    pub is_cidr: bool,
}

impl Inet {
    pub fn new(addr: IpAddr) -> Self {
        let prefix = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        Self { addr, prefix, is_cidr: false }
    }
}

/// Physical location of a tuple: (block, offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tid {
    pub block: u32,
    pub offset: u16,
}

/// A `bit` or `varbit` value: a bit count plus ceil(bits/8) data bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bit {
    pub bits: i32,
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Infinite line `ax + by + c = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub start: Point,
    pub end: Point,
}

/// Rectangle given by two opposite corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PgBox {
    pub high: Point,
    pub low: Point,
}

/// Open or closed path.
#[derive(Debug, Clone, PartialEq)]
pub struct PgPath {
    pub closed: bool,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Point,
    pub radius: f64,
}

/// A transaction snapshot: xmin, xmax and the in-progress set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxidSnapshot {
    pub xmin: u64,
    pub xmax: u64,
    pub xip: Vec<u64>,
}

/// A range value.
///
/// `None` bounds are infinite on that side. The empty range carries no
/// bounds at all.
#[derive(Debug, Clone, PartialEq)]
pub struct PgRange {
    pub lower: Option<Value>,
    pub upper: Option<Value>,
    pub lower_inc: bool,
    pub upper_inc: bool,
    pub empty: bool,
}

impl PgRange {
    pub fn empty() -> Self {
        Self { lower: None, upper: None, lower_inc: false, upper_inc: false, empty: true }
    }

    /// The canonical `[lower, upper)` range.
    pub fn new(lower: Option<Value>, upper: Option<Value>) -> Self {
        Self { lower, upper, lower_inc: true, upper_inc: false, empty: false }
    }
}

/// Tuple shape: inclusive on both ends, `None` for the infinite side.
impl From<(Option<Value>, Option<Value>)> for PgRange {
    fn from((lower, upper): (Option<Value>, Option<Value>)) -> Self {
        Self { lower, upper, lower_inc: true, upper_inc: true, empty: false }
    }
}
