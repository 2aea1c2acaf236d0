// src/location/nmea.rs
//! NMEA sentence parsing

use super::fix::Fix;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

/// Parse a single NMEA sentence into a position fix.
///
/// Only GGA sentences with a non-zero fix quality and RMC sentences with an
/// active status carry a usable position; everything else yields `None`.
pub fn parse_nmea_sentence(line: &str) -> Option<Fix> {
    parse_sentence_at(line, Utc::now())
}

/// `now` dates GGA sentences, which only carry the time of day, and stands
/// in for a missing or garbled receiver time.
fn parse_sentence_at(line: &str, now: DateTime<Utc>) -> Option<Fix> {
    let sentence = strip_checksum(line);
    let parts: Vec<&str> = sentence.split(',').collect();

    if sentence.starts_with("$GPGGA") || sentence.starts_with("$GNGGA") {
        parse_gga(&parts, now)
    } else if sentence.starts_with("$GPRMC") || sentence.starts_with("$GNRMC") {
        parse_rmc(&parts, now)
    } else {
        None
    }
}

fn strip_checksum(line: &str) -> &str {
    match line.find('*') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Convert an NMEA `ddmm.mmmm` field and hemisphere into decimal degrees
fn parse_coordinate(value: &str, hemisphere: &str, negative: &str) -> Option<f64> {
    if value.is_empty() || hemisphere.is_empty() {
        return None;
    }
    let raw = value.parse::<f64>().ok()?;
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;
    Some(if hemisphere == negative { -decimal } else { decimal })
}

/// Parse GGA (Global Positioning System Fix Data) sentence
fn parse_gga(parts: &[&str], now: DateTime<Utc>) -> Option<Fix> {
    if parts.len() < 10 {
        return None;
    }

    // Fix quality (field 6), 0 means no fix
    let quality = parts[6].parse::<u8>().ok()?;
    if quality == 0 {
        return None;
    }

    let latitude = parse_coordinate(parts[2], parts[3], "S")?;
    let longitude = parse_coordinate(parts[4], parts[5], "W")?;

    let timestamp = parse_time(parts[1])
        .map(|time| nearest_day(time, now))
        .unwrap_or(now);
    Some(Fix::new(latitude, longitude, timestamp))
}

/// Parse RMC (Recommended Minimum) sentence
fn parse_rmc(parts: &[&str], now: DateTime<Utc>) -> Option<Fix> {
    if parts.len() < 10 {
        return None;
    }

    // Status (field 2), A = active, V = void
    if parts[2] != "A" {
        return None;
    }

    let latitude = parse_coordinate(parts[3], parts[4], "S")?;
    let longitude = parse_coordinate(parts[5], parts[6], "W")?;

    let timestamp = parse_rmc_timestamp(parts[1], parts[9]).unwrap_or(now);
    Some(Fix::new(latitude, longitude, timestamp))
}

/// `hhmmss` or `hhmmss.ss`
fn parse_time(time: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(time, "%H%M%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H%M%S"))
        .ok()
}

/// `ddmmyy`, years taken as 20yy
fn parse_date(date: &str) -> Option<NaiveDate> {
    if date.len() != 6 || !date.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let day = date[0..2].parse::<u32>().ok()?;
    let month = date[2..4].parse::<u32>().ok()?;
    let year = 2000 + date[4..6].parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Combine RMC `hhmmss.ss` and `ddmmyy` fields into a UTC timestamp
fn parse_rmc_timestamp(time: &str, date: &str) -> Option<DateTime<Utc>> {
    let date = parse_date(date)?;
    let time = parse_time(time)?;
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}

/// Place a UTC time of day on the day that puts it closest to `now`
fn nearest_day(time: NaiveTime, now: DateTime<Utc>) -> DateTime<Utc> {
    let candidate = Utc.from_utc_datetime(&now.date_naive().and_time(time));
    let half_day = Duration::hours(12);
    if candidate - now > half_day {
        candidate - Duration::days(1)
    } else if now - candidate > half_day {
        candidate + Duration::days(1)
    } else {
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::FixThrottle;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_gga_parsing() {
        let fix = parse_nmea_sentence(
            "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47",
        )
        .unwrap();
        assert!((fix.position.latitude - 48.1173).abs() < 0.0001);
        assert!((fix.position.longitude - 11.516667).abs() < 0.0001);
    }

    #[test]
    fn test_gga_without_fix_is_ignored() {
        assert!(parse_nmea_sentence("$GPGGA,123519,,,,,0,00,,,M,,M,,*66").is_none());
    }

    #[test]
    fn test_rmc_parsing_southern_western() {
        let fix = parse_nmea_sentence(
            "$GNRMC,081836.00,A,3751.65,S,14507.36,W,000.0,360.0,130998,011.3,E*62",
        )
        .unwrap();
        assert!((fix.position.latitude + 37.860833).abs() < 0.0001);
        assert!((fix.position.longitude + 145.122667).abs() < 0.0001);
        assert_eq!(fix.timestamp.year(), 2098);
        assert_eq!(fix.timestamp.month(), 9);
        assert_eq!(fix.timestamp.hour(), 8);
        assert_eq!(fix.timestamp.minute(), 18);
    }

    #[test]
    fn test_garbled_rmc_date_falls_back_to_now() {
        let now = Utc.with_ymd_and_hms(2024, 5, 3, 8, 20, 0).unwrap();
        let fix = parse_sentence_at("$GPRMC,081836,A,3751.65,S,14507.36,W,0,0,1\u{e9}234,,", now).unwrap();
        assert!((fix.position.latitude + 37.860833).abs() < 0.0001);
        assert_eq!(fix.timestamp, now);

        assert!(parse_rmc_timestamp("081836", "1\u{e9}234").is_none());
        assert!(parse_rmc_timestamp("08\u{e9}836", "130998").is_none());
        assert!(parse_rmc_timestamp("081836", "+10998").is_none());
    }

    #[test]
    fn test_gga_uses_receiver_time_of_day() {
        let now = Utc.with_ymd_and_hms(2024, 5, 3, 12, 40, 0).unwrap();
        let fix = parse_sentence_at(
            "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47",
            now,
        )
        .unwrap();
        assert_eq!(fix.timestamp, Utc.with_ymd_and_hms(2024, 5, 3, 12, 35, 19).unwrap());

        // just after midnight the sentence still belongs to the previous day
        let after_midnight = Utc.with_ymd_and_hms(2024, 5, 4, 0, 0, 30).unwrap();
        let fix = parse_sentence_at(
            "$GPGGA,235959,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47",
            after_midnight,
        )
        .unwrap();
        assert_eq!(fix.timestamp, Utc.with_ymd_and_hms(2024, 5, 3, 23, 59, 59).unwrap());
    }

    #[test]
    fn test_gga_and_rmc_of_one_epoch_share_a_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 5, 3, 12, 35, 21).unwrap();
        let gga = parse_sentence_at(
            "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47",
            now,
        )
        .unwrap();
        let rmc = parse_sentence_at(
            "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,030524,003.1,W*6A",
            now,
        )
        .unwrap();
        assert_eq!(gga.timestamp, rmc.timestamp);

        let mut throttle = FixThrottle::new(std::time::Duration::from_secs(2));
        assert!(throttle.admit(&rmc));
        assert!(!throttle.admit(&gga));
        let next = Fix::new(48.1, 11.5, rmc.timestamp + Duration::seconds(2));
        assert!(throttle.admit(&next));
    }

    #[test]
    fn test_void_rmc_is_ignored() {
        assert!(parse_nmea_sentence("$GPRMC,081836,V,,,,,,,130998,,*00").is_none());
    }

    #[test]
    fn test_other_sentences_are_ignored() {
        assert!(parse_nmea_sentence("$GPGSV,3,1,11,03,03,111,00,04,15,270,00*74").is_none());
    }
}
