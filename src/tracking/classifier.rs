use crate::core::types::{
    Direction, PredictionId, PredictionStatus, PriceSnapshot, SessionState, StatusUpdate,
};
use chrono::{DateTime, Utc};

/// Rounds to cents of a percent so band edges are not lost to float noise
/// (`0.3 * 100.0` is `30.000000000000004`).
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Signed move from `baseline` to `current` in percent. A non-positive
/// baseline yields 0.
pub fn movement_pct(baseline: f64, current: f64) -> f64 {
    if baseline <= 0.0 {
        return 0.0;
    }
    round2((current - baseline) / baseline * 100.0)
}

/// `|actual| - claimed`: negative when the move fell short of the claim.
pub fn gap(actual: f64, claimed: f64) -> f64 {
    round2(actual.abs() - claimed)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub hit: f64,
    pub partial: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            hit: 5.0,
            partial: 10.0,
        }
    }
}

/// Status for one observation. Bands are checked in priority order:
/// HIT, PARTIAL, then MISS once the session has closed.
pub fn classify(
    claimed: f64,
    direction: Direction,
    actual: f64,
    session: SessionState,
    thresholds: Thresholds,
) -> PredictionStatus {
    let g = gap(actual, claimed).abs();
    let agrees = direction.agrees_with(actual);

    if agrees && g <= thresholds.hit {
        PredictionStatus::Hit
    } else if agrees && g <= thresholds.partial {
        PredictionStatus::Partial
    } else if session == SessionState::Closed {
        PredictionStatus::Miss
    } else {
        PredictionStatus::Pending
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub snapshot: PriceSnapshot,
    pub update: StatusUpdate,
}

/// Classifies one price observation and builds the snapshot to append.
#[allow(clippy::too_many_arguments)]
pub fn evaluate(
    prediction_id: PredictionId,
    claimed: f64,
    direction: Direction,
    baseline: f64,
    current: f64,
    session: SessionState,
    thresholds: Thresholds,
    now: DateTime<Utc>,
) -> Evaluation {
    let actual = movement_pct(baseline, current);
    let g = gap(actual, claimed);
    let status = classify(claimed, direction, actual, session, thresholds);
    Evaluation {
        snapshot: PriceSnapshot {
            prediction_id,
            check_timestamp: now,
            previous_close: baseline,
            current_price: current,
            actual_movement_percentage: actual,
            gap: g,
        },
        update: StatusUpdate {
            status,
            latest_actual_percentage: Some(actual),
            latest_gap: Some(g),
        },
    }
}
