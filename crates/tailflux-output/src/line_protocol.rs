//! InfluxDB line protocol encoding
//!
//! `measurement,tag=value field="value" timestamp`, one point per line.

use chrono::{DateTime, Utc};
use tailflux_core::{OutputError, Point, Precision};

/// Timestamp of `ts` expressed in `precision` units since the epoch
pub fn timestamp_in(precision: Precision, ts: DateTime<Utc>) -> Result<i64, OutputError> {
    let value = match precision {
        Precision::Nanoseconds => ts.timestamp_nanos_opt().ok_or_else(|| {
            OutputError::Point(format!("{} does not fit in nanoseconds", ts))
        })?,
        Precision::Microseconds => ts.timestamp_micros(),
        Precision::Milliseconds => ts.timestamp_millis(),
        Precision::Seconds => ts.timestamp(),
        Precision::Minutes => ts.timestamp().div_euclid(60),
        Precision::Hours => ts.timestamp().div_euclid(3600),
    };
    Ok(value)
}

fn escape_measurement(name: &str, out: &mut String) {
    for c in name.chars() {
        if matches!(c, ',' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Tag keys, tag values and field keys
fn escape_key(key: &str, out: &mut String) {
    for c in key.chars() {
        if matches!(c, ',' | '=' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
}

fn escape_string_field(value: &str, out: &mut String) {
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

/// Encode one point
///
/// Tags and fields are written sorted by key. Tags with an empty value are
/// omitted since the store rejects them.
pub fn encode_point(point: &Point, precision: Precision) -> Result<String, OutputError> {
    if point.measurement.is_empty() {
        return Err(OutputError::Point("measurement is empty".to_string()));
    }
    if point.fields.is_empty() {
        return Err(OutputError::Point(format!(
            "point for '{}' has no fields",
            point.measurement
        )));
    }

    let mut tags: Vec<&(String, String)> = point.tags.iter().filter(|(_, v)| !v.is_empty()).collect();
    tags.sort_by(|a, b| a.0.cmp(&b.0));
    let mut fields: Vec<&(String, String)> = point.fields.iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    let mut line = String::with_capacity(128);
    escape_measurement(&point.measurement, &mut line);

    for (key, value) in tags {
        line.push(',');
        escape_key(key, &mut line);
        line.push('=');
        escape_key(value, &mut line);
    }

    for (i, (key, value)) in fields.into_iter().enumerate() {
        line.push(if i == 0 { ' ' } else { ',' });
        escape_key(key, &mut line);
        line.push('=');
        escape_string_field(value, &mut line);
    }

    line.push(' ');
    line.push_str(&timestamp_in(precision, point.timestamp)?.to_string());
    Ok(line)
}

/// Encode several points as a newline-separated request body
pub fn encode_batch(points: &[Point], precision: Precision) -> Result<String, OutputError> {
    let lines = points
        .iter()
        .map(|p| encode_point(p, precision))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64, nanos: u32) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, nanos).unwrap()
    }

    #[test]
    fn test_precision_conversion() {
        let ts = at(1_663_833_076, 123_456_789);
        assert_eq!(timestamp_in(Precision::Nanoseconds, ts).unwrap(), 1_663_833_076_123_456_789);
        assert_eq!(timestamp_in(Precision::Microseconds, ts).unwrap(), 1_663_833_076_123_456);
        assert_eq!(timestamp_in(Precision::Milliseconds, ts).unwrap(), 1_663_833_076_123);
        assert_eq!(timestamp_in(Precision::Seconds, ts).unwrap(), 1_663_833_076);
        assert_eq!(timestamp_in(Precision::Minutes, ts).unwrap(), 27_730_551);
        assert_eq!(timestamp_in(Precision::Hours, ts).unwrap(), 462_175);
    }

    #[test]
    fn test_encode_access_point() {
        let point = Point::new("nginx_access", at(1_663_833_076, 0))
            .with_tag("Path", "/images/06.jpg")
            .with_tag("Method", "GET")
            .with_tag("Scheme", "HTTP/1.1")
            .with_tag("Status", "304")
            .with_field("SourceIp", "103.72.172.71")
            .with_field("SourceLocation", "")
            .with_field("SourceHostInfo", "Mozilla/5.0");

        let line = encode_point(&point, Precision::Seconds).unwrap();
        assert_eq!(
            line,
            r#"nginx_access,Method=GET,Path=/images/06.jpg,Scheme=HTTP/1.1,Status=304 SourceHostInfo="Mozilla/5.0",SourceIp="103.72.172.71",SourceLocation="" 1663833076"#
        );
    }

    #[test]
    fn test_escaping() {
        let point = Point::new("web access,v2", at(0, 0))
            .with_tag("Path", "/search?q=a b,c")
            .with_field("Source Host", r#"Mozilla "quoted" C:\path"#);

        let line = encode_point(&point, Precision::Seconds).unwrap();
        assert_eq!(
            line,
            r#"web\ access\,v2,Path=/search?q\=a\ b\,c Source\ Host="Mozilla \"quoted\" C:\\path" 0"#
        );
    }

    #[test]
    fn test_empty_tag_values_are_omitted() {
        let point = Point::new("m", at(0, 0))
            .with_tag("Path", "")
            .with_tag("Status", "200")
            .with_field("f", "v");
        let line = encode_point(&point, Precision::Seconds).unwrap();
        assert_eq!(line, r#"m,Status=200 f="v" 0"#);
    }

    #[test]
    fn test_point_without_fields_is_rejected() {
        let point = Point::new("m", at(0, 0)).with_tag("Path", "/");
        assert!(matches!(
            encode_point(&point, Precision::Seconds),
            Err(OutputError::Point(_))
        ));
    }

    #[test]
    fn test_encode_batch_joins_lines() {
        let points = vec![
            Point::new("m", at(1, 0)).with_field("f", "a"),
            Point::new("m", at(2, 0)).with_field("f", "b"),
        ];
        let body = encode_batch(&points, Precision::Seconds).unwrap();
        assert_eq!(body, "m f=\"a\" 1\nm f=\"b\" 2");
    }
}
