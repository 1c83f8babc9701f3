//! Fixed-step streamline tracing through a [`VelocityField`].

use crate::error::{FieldError, FieldResult};
use crate::solvers::{Rk2, Rk4};
use crate::traits::{Steppable, VelocityField};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorKind {
    Rk2,
    #[default]
    Rk4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamlineSettings {
    /// Magnitude of the integration time step.
    pub step_size: f64,
    pub max_steps: usize,
    /// Tracing stops once the speed drops to this value or below.
    pub terminal_speed: f64,
    pub integrator: IntegratorKind,
    pub direction: Direction,
    /// Finish lines that leave the domain with a point on the boundary of the
    /// last cell.
    pub snap_to_boundary: bool,
}

impl Default for StreamlineSettings {
    fn default() -> Self {
        Self {
            step_size: 0.01,
            max_steps: 1000,
            terminal_speed: 1e-12,
            integrator: IntegratorKind::Rk4,
            direction: Direction::Forward,
            snap_to_boundary: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    OutOfDomain,
    Stagnation,
    MaxSteps,
}

/// Sampled streamline. `points`, `times` and `velocities` have equal length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Streamline {
    pub points: Vec<[f64; 3]>,
    pub times: Vec<f64>,
    pub velocities: Vec<[f64; 3]>,
    pub termination: TerminationReason,
}

impl Streamline {
    fn empty() -> Self {
        Self {
            points: Vec::new(),
            times: Vec::new(),
            velocities: Vec::new(),
            termination: TerminationReason::OutOfDomain,
        }
    }

    fn push(&mut self, point: [f64; 3], t: f64, velocity: [f64; 3]) {
        self.points.push(point);
        self.times.push(t);
        self.velocities.push(velocity);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sum of the straight segment lengths.
    pub fn arc_length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| distance(&w[0], &w[1]))
            .sum()
    }
}

enum Stepper {
    Rk2(Rk2),
    Rk4(Rk4),
}

impl Stepper {
    fn step_with_slope(
        &mut self,
        field: &mut impl VelocityField,
        slope: [f64; 3],
        t: &mut f64,
        x: &mut [f64; 3],
        dt: f64,
    ) -> FieldResult<()> {
        match self {
            Stepper::Rk2(s) => s.step_with_slope(field, slope, t, x, dt),
            Stepper::Rk4(s) => s.step_with_slope(field, slope, t, x, dt),
        }
    }
}

/// Integrates `seed` through `field` until the line leaves the domain,
/// stagnates or uses up `max_steps`.
///
/// Leaving the domain is a normal termination; a seed outside the domain
/// gives an empty streamline. Any other field error is returned.
#[instrument(level = "debug", skip(field))]
pub fn trace_streamline(
    field: &mut impl VelocityField,
    seed: [f64; 3],
    settings: &StreamlineSettings,
) -> Result<Streamline> {
    if !settings.step_size.is_finite() || settings.step_size <= 0.0 {
        bail!("Step size must be positive and finite.");
    }
    if settings.max_steps == 0 {
        bail!("Streamline tracing requires at least one integration step.");
    }
    if settings.terminal_speed.is_nan() || settings.terminal_speed < 0.0 {
        bail!("Terminal speed must be non-negative.");
    }
    if seed.iter().any(|c| !c.is_finite()) {
        bail!("Seed point must be finite.");
    }

    let dt = match settings.direction {
        Direction::Forward => settings.step_size,
        Direction::Backward => -settings.step_size,
    };
    let mut stepper = match settings.integrator {
        IntegratorKind::Rk2 => Stepper::Rk2(Rk2::new()),
        IntegratorKind::Rk4 => Stepper::Rk4(Rk4::new()),
    };

    let mut line = Streamline::empty();
    let mut t = 0.0;
    let mut x = seed;
    let Some(mut v) = sample(field, &x, t)? else {
        debug!("seed lies outside the domain");
        return Ok(line);
    };
    line.push(x, t, v);

    let termination = loop {
        if norm(&v) <= settings.terminal_speed {
            break TerminationReason::Stagnation;
        }
        if line.len() > settings.max_steps {
            break TerminationReason::MaxSteps;
        }

        let (x0, t0) = (x, t);
        // The sample that ends one step is the first stage of the next.
        let advanced = match stepper.step_with_slope(field, v, &mut t, &mut x, dt) {
            Ok(()) => sample(field, &x, t)?,
            Err(err) if err.is_out_of_domain() => None,
            Err(err) => return Err(err.into()),
        };
        match advanced {
            Some(next) => {
                v = next;
                line.push(x, t, v);
            }
            None => {
                if settings.snap_to_boundary {
                    if let Some((point, time, velocity)) =
                        boundary_point(field, &x0, t0, dt, &v)?
                    {
                        line.push(point, time, velocity);
                    }
                }
                break TerminationReason::OutOfDomain;
            }
        }
    };

    line.termination = termination;
    debug!(points = line.len(), ?termination, "streamline traced");
    Ok(line)
}

/// Velocity at `x`, or `None` outside the domain.
fn sample(field: &mut impl VelocityField, x: &[f64; 3], t: f64) -> FieldResult<Option<[f64; 3]>> {
    match field.evaluate(&[x[0], x[1], x[2], t]) {
        Ok(v) => Ok(Some(v)),
        Err(err) if err.is_out_of_domain() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Largest number of times the Euler segment is doubled while its end point
/// still lies inside the domain.
const MAX_EXTENSIONS: usize = 8;
const MAX_BISECTIONS: usize = 64;

/// Finds where the Euler ray `x + s * dt * v` leaves the domain and snaps the
/// first outside point onto the last cell that contained the ray.
///
/// The ray is bisected, so the result lies on the boundary even when many
/// cells separate `x` from the overshoot. Returns `None` when the ray stays
/// inside, the field cannot snap, or the snapped point coincides with `x`.
fn boundary_point(
    field: &mut impl VelocityField,
    x: &[f64; 3],
    t: f64,
    dt: f64,
    v: &[f64; 3],
) -> FieldResult<Option<([f64; 3], f64, [f64; 3])>> {
    let seg = [dt * v[0], dt * v[1], dt * v[2]];
    let full = norm(&seg);
    if full == 0.0 || sample(field, x, t)?.is_none() {
        return Ok(None);
    }
    let along = |s: f64| [x[0] + s * seg[0], x[1] + s * seg[1], x[2] + s * seg[2]];

    let (mut lo, mut hi) = (0.0, 1.0);
    let mut extensions = 0;
    while sample(field, &along(hi), t + hi * dt)?.is_some() {
        if extensions == MAX_EXTENSIONS {
            debug!(reach = hi, "euler ray stays inside the domain");
            return Ok(None);
        }
        lo = hi;
        hi *= 2.0;
        extensions += 1;
    }

    let resolution = 1e-12 * (1.0 + norm(x));
    for _ in 0..MAX_BISECTIONS {
        if (hi - lo) * full <= resolution {
            break;
        }
        let mid = 0.5 * (lo + hi);
        if sample(field, &along(mid), t + mid * dt)?.is_some() {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    // A failed evaluation clears the cache; put the last inside cell back.
    let inside = along(lo);
    if sample(field, &inside, t + lo * dt)?.is_none() {
        return Ok(None);
    }
    let snapped = match field.snap_point_on_cell(&along(hi)) {
        Ok(p) => p,
        Err(FieldError::NoCachedCell) => inside,
        Err(err) => return Err(err),
    };

    let travelled = distance(x, &snapped);
    if travelled <= f64::EPSILON * (1.0 + norm(x)) {
        return Ok(None);
    }
    let time = t + dt * (travelled / full).min(hi);
    Ok(sample(field, &snapped, time)?.map(|velocity| (snapped, time, velocity)))
}

fn norm(v: &[f64; 3]) -> f64 {
    v.iter().map(|c| c * c).sum::<f64>().sqrt()
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    norm(&[a[0] - b[0], a[1] - b[1], a[2] - b[2]])
}
