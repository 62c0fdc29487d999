//! Cooldown and quiet-hours suppression.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use heliowatch_notify::{Alert, Urgency};

use crate::config::{CheckerConfig, QuietHours};
use crate::state::CheckerState;

/// Apply cooldowns and quiet hours to the tick's candidate alerts.
///
/// `local_hour` is the current hour in the user's timezone; the caller
/// supplies it so the window stays testable.
#[must_use]
pub fn apply(
    candidates: Vec<Alert>,
    state: &CheckerState,
    config: &CheckerConfig,
    now: DateTime<Utc>,
    local_hour: u32,
) -> Vec<Alert> {
    let quiet = config.quiet_hours.enabled && in_quiet_window(&config.quiet_hours, local_hour);

    candidates
        .into_iter()
        .filter(|alert| {
            if on_cooldown(alert, state, config, now) {
                debug!(kind = %alert.kind, "suppressed by cooldown");
                return false;
            }
            if quiet && alert.urgency != Urgency::Critical {
                debug!(kind = %alert.kind, urgency = %alert.urgency, "suppressed by quiet hours");
                return false;
            }
            true
        })
        .collect()
}

/// Whether this alert's type is still inside its cooldown interval.
fn on_cooldown(
    alert: &Alert,
    state: &CheckerState,
    config: &CheckerConfig,
    now: DateTime<Utc>,
) -> bool {
    let minutes = config.cooldown_minutes(alert.kind);
    if minutes <= 0 {
        return false;
    }
    state
        .last_cooldowns
        .get(alert.kind.as_str())
        .is_some_and(|last| now - *last < Duration::minutes(minutes))
}

/// Inclusive start, exclusive end; `start > end` wraps past midnight.
fn in_quiet_window(quiet: &QuietHours, hour: u32) -> bool {
    if quiet.start <= quiet.end {
        hour >= quiet.start && hour < quiet.end
    } else {
        hour >= quiet.start || hour < quiet.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heliowatch_notify::AlertKind;

    fn config() -> CheckerConfig {
        CheckerConfig::with_defaults("/tmp/heliowatch-test")
    }

    fn alert(kind: AlertKind, urgency: Urgency) -> Alert {
        Alert::for_condition(kind, urgency, "t".into(), "b".into(), Utc::now())
    }

    #[test]
    fn test_cooldown_suppresses_within_interval() {
        let now = Utc::now();
        let mut state = CheckerState::default();
        state
            .last_cooldowns
            .insert("kp-threshold".into(), now - Duration::minutes(30));

        let kept = apply(
            vec![alert(AlertKind::KpThreshold, Urgency::High)],
            &state,
            &config(),
            now,
            12,
        );
        assert!(kept.is_empty());
    }

    #[test]
    fn test_cooldown_expires() {
        let now = Utc::now();
        let mut state = CheckerState::default();
        state
            .last_cooldowns
            .insert("kp-threshold".into(), now - Duration::minutes(181));

        let kept = apply(
            vec![alert(AlertKind::KpThreshold, Urgency::High)],
            &state,
            &config(),
            now,
            12,
        );
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_zero_cooldown_never_suppresses() {
        let now = Utc::now();
        let mut state = CheckerState::default();
        state.last_cooldowns.insert("flare-x".into(), now);

        let kept = apply(
            vec![alert(AlertKind::FlareX, Urgency::Critical)],
            &state,
            &config(),
            now,
            12,
        );
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_quiet_hours_drop_non_critical_only() {
        let mut config = config();
        config.quiet_hours.enabled = true;
        config.quiet_hours.start = 23;
        config.quiet_hours.end = 7;

        let candidates = vec![
            alert(AlertKind::FlareX, Urgency::Critical),
            alert(AlertKind::KpThreshold, Urgency::High),
            alert(AlertKind::ActiveRegion, Urgency::Info),
        ];
        let kept = apply(candidates, &CheckerState::default(), &config, Utc::now(), 2);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].urgency, Urgency::Critical);
    }

    #[test]
    fn test_quiet_hours_window_edges() {
        let overnight = QuietHours {
            enabled: true,
            start: 23,
            end: 7,
        };
        assert!(in_quiet_window(&overnight, 23));
        assert!(in_quiet_window(&overnight, 0));
        assert!(in_quiet_window(&overnight, 6));
        assert!(!in_quiet_window(&overnight, 7));
        assert!(!in_quiet_window(&overnight, 12));

        let daytime = QuietHours {
            enabled: true,
            start: 9,
            end: 17,
        };
        assert!(in_quiet_window(&daytime, 9));
        assert!(!in_quiet_window(&daytime, 17));
    }

    #[test]
    fn test_quiet_hours_disabled_passes_everything() {
        let kept = apply(
            vec![alert(AlertKind::ActiveRegion, Urgency::Info)],
            &CheckerState::default(),
            &config(),
            Utc::now(),
            2,
        );
        assert_eq!(kept.len(), 1);
    }
}
