//! Fixed impact-description tables and small formatting helpers.

use chrono::{DateTime, Utc};

/// Impact sentence for an integer Kp bucket (4..=9).
#[must_use]
pub fn kp_impact(kp_floor: u32) -> Option<&'static str> {
    match kp_floor {
        4 => Some("Active conditions; faint aurora possible at very high latitudes."),
        5 => Some("G1 storm: aurora at high latitudes, weak power-grid fluctuations possible."),
        6 => Some("G2 storm: aurora reaches 55° latitude, high-latitude grids may see voltage alarms."),
        7 => Some("G3 storm: aurora to mid-latitudes, intermittent GPS and HF radio degradation likely."),
        8 => Some("G4 storm: widespread aurora, voltage control problems and satellite charging expected."),
        9 => Some("G5 storm: extreme conditions, possible grid collapse and satellite control loss."),
        _ => None,
    }
}

/// Impact sentence for a southward Bz reading, bucketed at -10/-15/-20 nT.
#[must_use]
pub fn bz_impact(bz: f64) -> Option<&'static str> {
    if bz <= -20.0 {
        Some("Severely southward IMF: very efficient energy coupling, strong storming likely while it holds.")
    } else if bz <= -15.0 {
        Some("Strongly southward IMF: efficient energy transfer into the magnetosphere, storm conditions likely.")
    } else if bz <= -10.0 {
        Some("Southward IMF: enhanced coupling with the magnetosphere, unsettled to active conditions.")
    } else {
        None
    }
}

/// Impact sentence for a solar-wind speed, bucketed at 600/700 km/s.
#[must_use]
pub fn wind_impact(speed: f64) -> Option<&'static str> {
    if speed >= 700.0 {
        Some("Very fast solar wind: strong geomagnetic response likely if the IMF turns southward.")
    } else if speed >= 600.0 {
        Some("Fast solar wind stream: elevated geomagnetic activity possible over the next hours.")
    } else {
        None
    }
}

/// Impact sentence for a flare class letter (M or X).
#[must_use]
pub fn flare_impact(letter: char) -> Option<&'static str> {
    match letter {
        'M' => Some("Minor radio blackouts on the sunlit side; possible CME if eruptive."),
        'X' => {
            Some("Strong radio blackouts on the sunlit side; energetic CME and radiation storm possible.")
        }
        _ => None,
    }
}

/// Leading class letter of an X-ray class string ("M2.1" -> 'M').
#[must_use]
pub fn flare_class_letter(class_type: &str) -> Option<char> {
    class_type
        .trim()
        .chars()
        .next()
        .map(|c| c.to_ascii_uppercase())
}

/// G-scale label for a Kp value at or above storm level.
#[must_use]
pub fn g_scale_label(kp: f64) -> &'static str {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let bucket = kp.floor().clamp(0.0, 9.0) as u32;
    match bucket {
        9 => "G5",
        8 => "G4",
        7 => "G3",
        6 => "G2",
        _ => "G1",
    }
}

/// Human ETA until a predicted arrival time.
///
/// Yields `"already past predicted arrival"`, `"imminent"` (under an
/// hour), `"~Nh"` (under two days), or `"~Nd"`.
#[must_use]
pub fn format_eta(arrival: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let remaining = arrival - now;
    if remaining < chrono::Duration::zero() {
        "already past predicted arrival".to_string()
    } else if remaining < chrono::Duration::hours(1) {
        "imminent".to_string()
    } else if remaining < chrono::Duration::hours(48) {
        format!("~{}h", remaining.num_hours())
    } else {
        format!("~{}d", remaining.num_days())
    }
}

/// Integer Kp bucket used for impact lookups: `min(floor(kp), 9)`.
#[must_use]
pub fn kp_bucket(kp: f64) -> u32 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let bucket = kp.floor().max(0.0) as u32;
    bucket.min(9)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kp_impact_covers_4_through_9() {
        for kp in 4..=9 {
            assert!(kp_impact(kp).is_some(), "no sentence for Kp {kp}");
        }
        assert!(kp_impact(3).is_none());
        assert!(kp_impact(10).is_none());
    }

    #[test]
    fn test_kp_bucket_clamps() {
        assert_eq!(kp_bucket(5.7), 5);
        assert_eq!(kp_bucket(9.9), 9);
        assert_eq!(kp_bucket(12.0), 9);
        assert_eq!(kp_bucket(-1.0), 0);
    }

    #[test]
    fn test_bz_buckets() {
        assert!(bz_impact(-21.0).unwrap().contains("Severely"));
        assert!(bz_impact(-15.0).unwrap().contains("Strongly"));
        assert!(bz_impact(-10.0).unwrap().contains("enhanced coupling"));
        assert!(bz_impact(-9.9).is_none());
    }

    #[test]
    fn test_flare_class_letter() {
        assert_eq!(flare_class_letter("M2.1"), Some('M'));
        assert_eq!(flare_class_letter("x9.0"), Some('X'));
        assert_eq!(flare_class_letter("C5.4"), Some('C'));
        assert_eq!(flare_class_letter(""), None);
    }

    #[test]
    fn test_format_eta() {
        let now = Utc::now();
        assert_eq!(
            format_eta(now - chrono::Duration::minutes(5), now),
            "already past predicted arrival"
        );
        assert_eq!(format_eta(now + chrono::Duration::minutes(30), now), "imminent");
        assert_eq!(format_eta(now + chrono::Duration::hours(18), now), "~18h");
        assert_eq!(format_eta(now + chrono::Duration::hours(72), now), "~3d");
    }

    #[test]
    fn test_g_scale_label() {
        assert_eq!(g_scale_label(5.3), "G1");
        assert_eq!(g_scale_label(7.0), "G3");
        assert_eq!(g_scale_label(9.5), "G5");
    }
}
