//! Binary codecs for the geometric built-ins.
//!
//! All of them are tuples of float8, with `path` adding a leading
//! is-closed byte and `path`/`polygon` a point count. Text forms are not
//! parsed; they surface as [`Value::Text`] on the simple-query path.
use bytes::Bytes;

use super::{DataError, scalar::take};
use crate::io::WriteBuffer;
use crate::value::{Circle, Line, LineSegment, PgBox, PgPath, Point, Polygon, Value};

fn write_point(p: &Point, buf: &mut WriteBuffer) {
    buf.write_float64(p.x);
    buf.write_float64(p.y);
}

fn read_point(payload: &mut Bytes, name: &'static str) -> Result<Point, DataError> {
    let x = f64::from_be_bytes(take::<8>(payload, name)?);
    let y = f64::from_be_bytes(take::<8>(payload, name)?);
    Ok(Point { x, y })
}

pub(crate) fn encode_point(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        Value::Point(p) => {
            write_point(p, buf);
            Ok(())
        }
        other => Err(DataError::mismatch("point", other)),
    }
}

pub(crate) fn decode_point(payload: &mut Bytes) -> Result<Value, DataError> {
    Ok(Value::Point(read_point(payload, "point")?))
}

pub(crate) fn encode_line(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        Value::Line(l) => {
            buf.write_float64(l.a);
            buf.write_float64(l.b);
            buf.write_float64(l.c);
            Ok(())
        }
        other => Err(DataError::mismatch("line", other)),
    }
}

pub(crate) fn decode_line(payload: &mut Bytes) -> Result<Value, DataError> {
    let a = f64::from_be_bytes(take::<8>(payload, "line")?);
    let b = f64::from_be_bytes(take::<8>(payload, "line")?);
    let c = f64::from_be_bytes(take::<8>(payload, "line")?);
    Ok(Value::Line(Line { a, b, c }))
}

pub(crate) fn encode_lseg(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        Value::LineSegment(l) => {
            write_point(&l.start, buf);
            write_point(&l.end, buf);
            Ok(())
        }
        other => Err(DataError::mismatch("lseg", other)),
    }
}

pub(crate) fn decode_lseg(payload: &mut Bytes) -> Result<Value, DataError> {
    Ok(Value::LineSegment(LineSegment {
        start: read_point(payload, "lseg")?,
        end: read_point(payload, "lseg")?,
    }))
}

pub(crate) fn encode_box(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        Value::Box(b) => {
            write_point(&b.high, buf);
            write_point(&b.low, buf);
            Ok(())
        }
        other => Err(DataError::mismatch("box", other)),
    }
}

pub(crate) fn decode_box(payload: &mut Bytes) -> Result<Value, DataError> {
    Ok(Value::Box(PgBox {
        high: read_point(payload, "box")?,
        low: read_point(payload, "box")?,
    }))
}

pub(crate) fn encode_path(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        Value::Path(p) => {
            buf.write_byte(p.closed as u8);
            buf.write_int32(p.points.len() as i32);
            for point in &p.points {
                write_point(point, buf);
            }
            Ok(())
        }
        other => Err(DataError::mismatch("path", other)),
    }
}

pub(crate) fn decode_path(payload: &mut Bytes) -> Result<Value, DataError> {
    let [closed] = take::<1>(payload, "path")?;
    let count = i32::from_be_bytes(take::<4>(payload, "path")?);
    if count < 0 {
        return Err(DataError::malformed("path"));
    }
    let mut points = Vec::with_capacity(count as usize);
    for _ in 0..count {
        points.push(read_point(payload, "path")?);
    }
    Ok(Value::Path(PgPath { closed: closed != 0, points }))
}

pub(crate) fn encode_polygon(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        Value::Polygon(p) => {
            buf.write_int32(p.points.len() as i32);
            for point in &p.points {
                write_point(point, buf);
            }
            Ok(())
        }
        other => Err(DataError::mismatch("polygon", other)),
    }
}

pub(crate) fn decode_polygon(payload: &mut Bytes) -> Result<Value, DataError> {
    let count = i32::from_be_bytes(take::<4>(payload, "polygon")?);
    if count < 0 {
        return Err(DataError::malformed("polygon"));
    }
    let mut points = Vec::with_capacity(count as usize);
    for _ in 0..count {
        points.push(read_point(payload, "polygon")?);
    }
    Ok(Value::Polygon(Polygon { points }))
}

pub(crate) fn encode_circle(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        Value::Circle(c) => {
            write_point(&c.center, buf);
            buf.write_float64(c.radius);
            Ok(())
        }
        other => Err(DataError::mismatch("circle", other)),
    }
}

pub(crate) fn decode_circle(payload: &mut Bytes) -> Result<Value, DataError> {
    Ok(Value::Circle(Circle {
        center: read_point(payload, "circle")?,
        radius: f64::from_be_bytes(take::<8>(payload, "circle")?),
    }))
}
