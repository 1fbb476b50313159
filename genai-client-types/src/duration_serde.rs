//! `google.protobuf.Duration` JSON form, e.g. `"3600s"` or `"1.5s"`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// 格式化为 `"<seconds>s"`。
#[must_use]
pub fn format(duration: Duration) -> String {
    let secs = duration.as_secs();
    let nanos = duration.subsec_nanos();
    if nanos == 0 {
        return format!("{secs}s");
    }
    let fraction = format!("{nanos:09}");
    format!("{secs}.{}s", fraction.trim_end_matches('0'))
}

/// 解析 `"<seconds>s"`，秒数可带小数部分。
pub fn parse(value: &str) -> Option<Duration> {
    let number = value.trim().strip_suffix('s')?;
    let (secs, fraction) = match number.split_once('.') {
        Some((secs, fraction)) => (secs, fraction),
        None => (number, ""),
    };
    let secs: u64 = secs.parse().ok()?;
    if fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let nanos = if fraction.is_empty() {
        0
    } else {
        format!("{fraction:0<9}").parse().ok()?
    };
    Some(Duration::new(secs, nanos))
}

pub mod option {
    use super::*;
    use serde::de::Error as _;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => serializer.serialize_some(&format(*duration)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(value) => parse(&value)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid duration: {value}"))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_whole_and_fractional_seconds() {
        assert_eq!(format(Duration::from_secs(3600)), "3600s");
        assert_eq!(format(Duration::from_millis(1500)), "1.5s");
    }

    #[test]
    fn parses_protobuf_durations() {
        assert_eq!(parse("300s"), Some(Duration::from_secs(300)));
        assert_eq!(parse("0.25s"), Some(Duration::from_millis(250)));
        assert_eq!(parse("300"), None);
        assert_eq!(parse("1.x5s"), None);
    }
}
