use crate::error::FieldResult;
use crate::traits::{Steppable, VelocityField};

fn sample(field: &mut impl VelocityField, x: &[f64; 3], t: f64) -> FieldResult<[f64; 3]> {
    field.evaluate(&[x[0], x[1], x[2], t])
}

/// Explicit midpoint rule (second order).
#[derive(Debug, Default)]
pub struct Rk2 {
    k1: [f64; 3],
    k2: [f64; 3],
    tmp: [f64; 3],
}

impl Rk2 {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Steppable for Rk2 {
    fn step_with_slope(
        &mut self,
        field: &mut impl VelocityField,
        slope: [f64; 3],
        t: &mut f64,
        position: &mut [f64; 3],
        dt: f64,
    ) -> FieldResult<()> {
        let t0 = *t;

        // k1 = v(t, x)
        self.k1 = slope;

        // k2 = v(t + dt/2, x + dt*k1/2)
        for i in 0..3 {
            self.tmp[i] = position[i] + 0.5 * dt * self.k1[i];
        }
        self.k2 = sample(field, &self.tmp, t0 + 0.5 * dt)?;

        for i in 0..3 {
            position[i] += dt * self.k2[i];
        }
        *t = t0 + dt;
        Ok(())
    }
}

/// Classic Runge-Kutta 4th Order Solver
#[derive(Debug, Default)]
pub struct Rk4 {
    k1: [f64; 3],
    k2: [f64; 3],
    k3: [f64; 3],
    k4: [f64; 3],
    tmp: [f64; 3],
}

impl Rk4 {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Steppable for Rk4 {
    fn step_with_slope(
        &mut self,
        field: &mut impl VelocityField,
        slope: [f64; 3],
        t: &mut f64,
        position: &mut [f64; 3],
        dt: f64,
    ) -> FieldResult<()> {
        let t0 = *t;

        // k1 = v(t, x)
        self.k1 = slope;

        // k2 = v(t + dt/2, x + dt*k1/2)
        for i in 0..3 {
            self.tmp[i] = position[i] + 0.5 * dt * self.k1[i];
        }
        self.k2 = sample(field, &self.tmp, t0 + 0.5 * dt)?;

        // k3 = v(t + dt/2, x + dt*k2/2)
        for i in 0..3 {
            self.tmp[i] = position[i] + 0.5 * dt * self.k2[i];
        }
        self.k3 = sample(field, &self.tmp, t0 + 0.5 * dt)?;

        // k4 = v(t + dt, x + dt*k3)
        for i in 0..3 {
            self.tmp[i] = position[i] + dt * self.k3[i];
        }
        self.k4 = sample(field, &self.tmp, t0 + dt)?;

        // x_next = x + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..3 {
            position[i] +=
                dt / 6.0 * (self.k1[i] + 2.0 * self.k2[i] + 2.0 * self.k3[i] + self.k4[i]);
        }
        *t = t0 + dt;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Rk2, Rk4};
    use crate::error::{FieldError, FieldResult};
    use crate::traits::{Steppable, VelocityField};

    /// Rigid rotation about the z axis, plus a slab that ends the domain.
    struct Rotation {
        x_max: f64,
    }

    impl VelocityField for Rotation {
        fn evaluate(&mut self, p: &[f64; 4]) -> FieldResult<[f64; 3]> {
            if p[0] > self.x_max {
                return Err(FieldError::OutOfDomain([p[0], p[1], p[2]]));
            }
            Ok([-p[1], p[0], 0.0])
        }
    }

    fn quarter_turn(stepper: &mut impl Steppable, steps: usize) -> [f64; 3] {
        let mut field = Rotation { x_max: f64::INFINITY };
        let dt = std::f64::consts::FRAC_PI_2 / steps as f64;
        let mut t = 0.0;
        let mut x = [1.0, 0.0, 0.5];
        for _ in 0..steps {
            stepper.step(&mut field, &mut t, &mut x, dt).expect("step");
        }
        assert!((t - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        x
    }

    #[test]
    fn rk4_follows_circle() {
        let x = quarter_turn(&mut Rk4::new(), 50);
        assert!(x[0].abs() < 1e-8);
        assert!((x[1] - 1.0).abs() < 1e-8);
        assert_eq!(x[2], 0.5);
    }

    #[test]
    fn rk2_is_less_accurate_than_rk4() {
        let x2 = quarter_turn(&mut Rk2::new(), 50);
        let x4 = quarter_turn(&mut Rk4::new(), 50);
        let err2 = x2[0].abs() + (x2[1] - 1.0).abs();
        let err4 = x4[0].abs() + (x4[1] - 1.0).abs();
        assert!(err2 < 1e-3);
        assert!(err4 < err2);
    }

    /// Counts evaluations of a uniform field.
    struct Counting {
        calls: usize,
    }

    impl VelocityField for Counting {
        fn evaluate(&mut self, _p: &[f64; 4]) -> FieldResult<[f64; 3]> {
            self.calls += 1;
            Ok([1.0, 2.0, 0.0])
        }
    }

    #[test]
    fn known_slope_saves_one_evaluation() {
        let mut field = Counting { calls: 0 };
        let mut t = 0.0;
        let mut x = [0.0; 3];
        Rk4::new().step(&mut field, &mut t, &mut x, 0.5).expect("step");
        assert_eq!(field.calls, 4);

        let mut y = [0.0; 3];
        let mut s = 0.0;
        Rk4::new()
            .step_with_slope(&mut field, [1.0, 2.0, 0.0], &mut s, &mut y, 0.5)
            .expect("step");
        assert_eq!(field.calls, 7);
        assert_eq!(x, y);
        assert_eq!(t, s);

        Rk2::new()
            .step_with_slope(&mut field, [1.0, 2.0, 0.0], &mut s, &mut y, 0.5)
            .expect("step");
        assert_eq!(field.calls, 8);
        assert_eq!(y, [1.0, 2.0, 0.0]);
    }

    #[test]
    fn failed_step_leaves_state_untouched() {
        let mut field = Rotation { x_max: 1.0 };
        let mut t = 2.0;
        let mut x = [1.0, -0.5, 0.0];
        let err = Rk4::new()
            .step(&mut field, &mut t, &mut x, 0.1)
            .expect_err("stage leaves the slab");
        assert!(err.is_out_of_domain());
        assert_eq!(t, 2.0);
        assert_eq!(x, [1.0, -0.5, 0.0]);
    }
}
