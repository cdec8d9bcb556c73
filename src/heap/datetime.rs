//! Date and time decoding.
//!
//! PostgreSQL stores dates as days and timestamps as microseconds since
//! 2000-01-01, times as microseconds since midnight, and intervals as a
//! `(microseconds, days, months)` triple. Calendar conversion goes through
//! Julian day numbers, reproducing the database's own algorithm so that
//! every representable date renders identically.

use byteorder::{ByteOrder, LittleEndian};

use crate::heap::constants::*;
use crate::heap::HeapError;

/// Convert a Julian day number to (year, month, day).
fn j2date(jd: i64) -> (i32, u32, u32) {
    let mut julian = jd as u64 + 32044;
    let mut quad = julian / 146097;
    let extra = (julian - quad * 146097) * 4 + 3;
    julian += 60 + quad * 3 + extra / 146097;
    quad = julian / 1461;
    julian -= quad * 1461;
    let mut y = (julian * 4 / 1461) as i64;
    julian = if y != 0 {
        (julian + 305) % 365
    } else {
        (julian + 306) % 366
    } + 123;
    y += (quad * 4) as i64;
    let year = y - 4800;
    let quad = julian * 2141 / 65536;
    let day = julian - 7834 * quad / 256;
    let month = (quad + 10) % 12 + 1;
    (year as i32, month as u32, day as u32)
}

/// Render a year, folding non-positive years to the BC notation.
fn push_date(out: &mut String, year: i32, month: u32, day: u32) {
    if year > 0 {
        out.push_str(&format!("{:04}-{:02}-{:02}", year, month, day));
    } else {
        out.push_str(&format!("{:04}-{:02}-{:02} BC", 1 - year, month, day));
    }
}

/// Append `HH:MM:SS` with fractional seconds, trailing zeros trimmed.
fn push_time(out: &mut String, mut usecs: i64) {
    let hour = usecs / USECS_PER_HOUR;
    usecs -= hour * USECS_PER_HOUR;
    let min = usecs / USECS_PER_MINUTE;
    usecs -= min * USECS_PER_MINUTE;
    let sec = usecs / USECS_PER_SEC;
    let frac = usecs - sec * USECS_PER_SEC;

    out.push_str(&format!("{:02}:{:02}:{:02}", hour, min, sec));
    if frac != 0 {
        let mut fs = format!(".{:06}", frac);
        while fs.ends_with('0') {
            fs.pop();
        }
        out.push_str(&fs);
    }
}

/// Decode a 4-byte `date` (days since 2000-01-01).
pub fn date_to_string(raw: &[u8]) -> Result<String, HeapError> {
    if raw.len() < 4 {
        return Err(HeapError::BadVarlena);
    }
    let d = LittleEndian::read_i32(raw);
    if d == i32::MIN {
        return Ok("-infinity".to_string());
    }
    if d == i32::MAX {
        return Ok("infinity".to_string());
    }
    let jd = d as i64 + POSTGRES_EPOCH_JDATE;
    if jd < 0 {
        return Err(HeapError::BadVarlena);
    }
    let (y, m, day) = j2date(jd);
    let mut out = String::new();
    push_date(&mut out, y, m, day);
    Ok(out)
}

/// Decode an 8-byte `time` (microseconds since midnight).
pub fn time_to_string(raw: &[u8]) -> Result<String, HeapError> {
    if raw.len() < 8 {
        return Err(HeapError::BadVarlena);
    }
    let t = LittleEndian::read_i64(raw);
    if !(0..=USECS_PER_DAY).contains(&t) {
        return Err(HeapError::BadVarlena);
    }
    let mut out = String::new();
    push_time(&mut out, t);
    Ok(out)
}

/// Decode a 12-byte `timetz` (time plus a zone displacement in seconds,
/// stored positive-west).
pub fn timetz_to_string(raw: &[u8]) -> Result<String, HeapError> {
    if raw.len() < 12 {
        return Err(HeapError::BadVarlena);
    }
    let t = LittleEndian::read_i64(&raw[0..8]);
    let zone = LittleEndian::read_i32(&raw[8..12]);
    if !(0..=USECS_PER_DAY).contains(&t) {
        return Err(HeapError::BadVarlena);
    }
    let mut out = String::new();
    push_time(&mut out, t);
    let display = -zone;
    let sign = if display < 0 { '-' } else { '+' };
    let abs = display.abs();
    let zh = abs / 3600;
    let zm = (abs % 3600) / 60;
    if zm != 0 {
        out.push_str(&format!("{}{:02}:{:02}", sign, zh, zm));
    } else {
        out.push_str(&format!("{}{:02}", sign, zh));
    }
    Ok(out)
}

fn timestamp_render(ts: i64, utc_suffix: bool) -> Result<String, HeapError> {
    if ts == i64::MIN {
        return Ok("-infinity".to_string());
    }
    if ts == i64::MAX {
        return Ok("infinity".to_string());
    }

    let mut date = ts / USECS_PER_DAY;
    let mut time = ts % USECS_PER_DAY;
    if time < 0 {
        time += USECS_PER_DAY;
        date -= 1;
    }

    let jd = date + POSTGRES_EPOCH_JDATE;
    if jd < 0 {
        return Err(HeapError::BadVarlena);
    }
    let (y, m, d) = j2date(jd);
    let mut out = String::new();
    if y > 0 {
        out.push_str(&format!("{:04}-{:02}-{:02} ", y, m, d));
        push_time(&mut out, time);
    } else {
        out.push_str(&format!("{:04}-{:02}-{:02} ", 1 - y, m, d));
        push_time(&mut out, time);
        out.push_str(" BC");
    }
    if utc_suffix {
        // Without timezone rules offline, timestamptz renders in UTC.
        out.push_str("+00");
    }
    Ok(out)
}

/// Decode an 8-byte `timestamp` (microseconds since 2000-01-01).
pub fn timestamp_to_string(raw: &[u8]) -> Result<String, HeapError> {
    if raw.len() < 8 {
        return Err(HeapError::BadVarlena);
    }
    timestamp_render(LittleEndian::read_i64(raw), false)
}

/// Decode an 8-byte `timestamptz`, rendered in UTC.
pub fn timestamptz_to_string(raw: &[u8]) -> Result<String, HeapError> {
    if raw.len() < 8 {
        return Err(HeapError::BadVarlena);
    }
    timestamp_render(LittleEndian::read_i64(raw), true)
}

/// Decode a 16-byte `interval`: microseconds, days, months.
pub fn interval_to_string(raw: &[u8]) -> Result<String, HeapError> {
    if raw.len() < 16 {
        return Err(HeapError::BadVarlena);
    }
    let time = LittleEndian::read_i64(&raw[0..8]);
    let day = LittleEndian::read_i32(&raw[8..12]);
    let month = LittleEndian::read_i32(&raw[12..16]);

    let years = month / 12;
    let months = month % 12;

    let mut parts: Vec<String> = Vec::new();
    if years != 0 {
        parts.push(format!("{} year{}", years, plural(years)));
    }
    if months != 0 {
        parts.push(format!("{} mon{}", months, plural(months)));
    }
    if day != 0 {
        parts.push(format!("{} day{}", day, plural(day)));
    }
    if time != 0 || parts.is_empty() {
        let neg = time < 0;
        let mut t = String::new();
        if neg {
            t.push('-');
        }
        push_time(&mut t, time.abs());
        parts.push(t);
    }
    Ok(parts.join(" "))
}

fn plural(n: i32) -> &'static str {
    if n == 1 || n == -1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le32(v: i32) -> Vec<u8> {
        let mut b = vec![0u8; 4];
        LittleEndian::write_i32(&mut b, v);
        b
    }

    fn le64(v: i64) -> Vec<u8> {
        let mut b = vec![0u8; 8];
        LittleEndian::write_i64(&mut b, v);
        b
    }

    #[test]
    fn test_epoch_date() {
        assert_eq!(date_to_string(&le32(0)).unwrap(), "2000-01-01");
    }

    #[test]
    fn test_date_arithmetic() {
        assert_eq!(date_to_string(&le32(31)).unwrap(), "2000-02-01");
        assert_eq!(date_to_string(&le32(60)).unwrap(), "2000-03-01"); // 2000 is a leap year
        assert_eq!(date_to_string(&le32(-1)).unwrap(), "1999-12-31");
        assert_eq!(date_to_string(&le32(9131)).unwrap(), "2024-12-31");
    }

    #[test]
    fn test_date_infinities() {
        assert_eq!(date_to_string(&le32(i32::MIN)).unwrap(), "-infinity");
        assert_eq!(date_to_string(&le32(i32::MAX)).unwrap(), "infinity");
    }

    #[test]
    fn test_time_rendering() {
        assert_eq!(time_to_string(&le64(0)).unwrap(), "00:00:00");
        let t = 13 * USECS_PER_HOUR + 14 * USECS_PER_MINUTE + 15 * USECS_PER_SEC;
        assert_eq!(time_to_string(&le64(t)).unwrap(), "13:14:15");
        assert_eq!(time_to_string(&le64(t + 500_000)).unwrap(), "13:14:15.5");
        assert_eq!(time_to_string(&le64(t + 123_456)).unwrap(), "13:14:15.123456");
    }

    #[test]
    fn test_time_out_of_range() {
        assert!(time_to_string(&le64(-1)).is_err());
        assert!(time_to_string(&le64(USECS_PER_DAY + 1)).is_err());
    }

    #[test]
    fn test_timestamp_epoch() {
        assert_eq!(timestamp_to_string(&le64(0)).unwrap(), "2000-01-01 00:00:00");
    }

    #[test]
    fn test_timestamp_negative_wraps_day() {
        assert_eq!(
            timestamp_to_string(&le64(-USECS_PER_SEC)).unwrap(),
            "1999-12-31 23:59:59"
        );
    }

    #[test]
    fn test_timestamp_fractional() {
        let ts = 86400 * USECS_PER_SEC + 1_500_000; // 2000-01-02 00:00:01.5
        assert_eq!(
            timestamp_to_string(&le64(ts)).unwrap(),
            "2000-01-02 00:00:01.5"
        );
    }

    #[test]
    fn test_timestamptz_utc_suffix() {
        assert_eq!(
            timestamptz_to_string(&le64(0)).unwrap(),
            "2000-01-01 00:00:00+00"
        );
    }

    #[test]
    fn test_timestamp_infinities() {
        assert_eq!(timestamp_to_string(&le64(i64::MIN)).unwrap(), "-infinity");
        assert_eq!(timestamp_to_string(&le64(i64::MAX)).unwrap(), "infinity");
    }

    #[test]
    fn test_timetz() {
        let mut raw = vec![0u8; 12];
        LittleEndian::write_i64(&mut raw[0..8], 4 * USECS_PER_HOUR);
        LittleEndian::write_i32(&mut raw[8..12], 28800); // 8 hours west
        assert_eq!(timetz_to_string(&raw).unwrap(), "04:00:00-08");
    }

    #[test]
    fn test_interval_styles() {
        let mut raw = vec![0u8; 16];
        LittleEndian::write_i64(&mut raw[0..8], 0);
        LittleEndian::write_i32(&mut raw[8..12], 0);
        LittleEndian::write_i32(&mut raw[12..16], 0);
        assert_eq!(interval_to_string(&raw).unwrap(), "00:00:00");

        LittleEndian::write_i32(&mut raw[12..16], 14); // 1 year 2 mons
        LittleEndian::write_i32(&mut raw[8..12], 3);
        LittleEndian::write_i64(
            &mut raw[0..8],
            4 * USECS_PER_HOUR + 5 * USECS_PER_MINUTE + 6 * USECS_PER_SEC,
        );
        assert_eq!(
            interval_to_string(&raw).unwrap(),
            "1 year 2 mons 3 days 04:05:06"
        );
    }

    #[test]
    fn test_interval_negative_time() {
        let mut raw = vec![0u8; 16];
        LittleEndian::write_i64(&mut raw[0..8], -(90 * USECS_PER_SEC));
        assert_eq!(interval_to_string(&raw).unwrap(), "-00:01:30");
    }
}
