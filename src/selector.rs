//! Goalkeeper selection and ball influence on the aim point.
//!
//! Angles are blended per axis in degrees; the goalkeeper to ball gap is a
//! planar distance in (yaw, pitch), not a great-circle one.

use crate::detection::Detection;
use crate::math::lerp;

use serde_derive::Serialize;

/// Largest share of the aim point a ball may claim.
const MAX_BALL_WEIGHT: f32 = 0.4;
/// Balls closer than this (degrees) to the goalkeeper get half the weight.
const NEAR_BALL_GAP: f32 = 20.0;

/// Per-frame selection outcome.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TrackingResult {
    pub detection: Detection,
    pub yaw: f32,
    pub pitch: f32,
    pub ball_weight: f32,
    pub had_ball: bool,
}

/// Mostly proximity, a little confidence. `None` without a distance.
#[inline]
pub fn score_person(det: &Detection) -> Option<f32> {
    det.distance
        .map(|distance| (1.0 / distance) * 0.9 + det.confidence * 0.1)
}

#[inline]
pub fn score_ball(det: &Detection) -> Option<f32> {
    det.distance
        .map(|distance| (1.0 / distance) * 0.8 + det.confidence * 0.2)
}

/// Highest scoring detection; the first one wins a tie.
fn best_by<'a, I, S>(dets: I, score: S) -> Option<&'a Detection>
where
    I: IntoIterator<Item = &'a Detection>,
    S: Fn(&Detection) -> Option<f32>,
{
    let mut best: Option<(&'a Detection, f32)> = None;

    for det in dets {
        if let Some(s) = score(det) {
            if best.map_or(true, |(_, b)| s > b) {
                best = Some((det, s));
            }
        }
    }

    best.map(|(det, _)| det)
}

pub fn select_goalkeeper<'a, I>(persons: I) -> Option<&'a Detection>
where
    I: IntoIterator<Item = &'a Detection>,
{
    best_by(persons, score_person)
}

pub fn select_ball<'a, I>(balls: I) -> Option<&'a Detection>
where
    I: IntoIterator<Item = &'a Detection>,
{
    best_by(balls, score_ball)
}

/// Pulls `(base_yaw, base_pitch)` towards the best ball.
///
/// Returns `(yaw, pitch, ball_weight)`; the weight is `0` without a usable ball.
pub fn blend_with_ball<'a, I>(base_yaw: f32, base_pitch: f32, balls: I) -> (f32, f32, f32)
where
    I: IntoIterator<Item = &'a Detection>,
{
    let ball = match select_ball(balls) {
        Some(ball) => ball,
        None => return (base_yaw, base_pitch, 0.0),
    };

    // select_ball only returns balls with a distance
    let distance = ball.distance.unwrap_or(f32::INFINITY);
    let mut weight = MAX_BALL_WEIGHT.min(1.0 / (distance + 1.0));

    let gap = ((ball.yaw - base_yaw).powi(2) + (ball.pitch - base_pitch).powi(2)).sqrt();
    if gap < NEAR_BALL_GAP {
        weight *= 0.5;
    }

    (
        lerp(base_yaw, ball.yaw, weight),
        lerp(base_pitch, ball.pitch, weight),
        weight,
    )
}

/// Goalkeeper aim point for one frame of globally placed detections.
///
/// `None` when no person can be scored, which is an ordinary frame state.
pub fn track(detections: &[Detection]) -> Option<TrackingResult> {
    let keeper = select_goalkeeper(detections.iter().filter(|d| d.is_person()))?;

    let balls: Vec<&Detection> = detections.iter().filter(|d| d.is_ball()).collect();
    let (yaw, pitch, ball_weight) = blend_with_ball(keeper.yaw, keeper.pitch, balls.iter().copied());

    Some(TrackingResult {
        detection: keeper.clone(),
        yaw,
        pitch,
        ball_weight,
        had_ball: !balls.is_empty(),
    })
}
