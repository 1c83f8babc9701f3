use crate::error::{FieldError, FieldResult};

/// A steady or unsteady velocity field sampled at `(x, y, z, t)`.
pub trait VelocityField {
    /// Evaluates the velocity at `point = [x, y, z, t]`.
    ///
    /// Takes `&mut self` because implementations may update location caches.
    /// Points outside the field's domain yield `FieldError::OutOfDomain`.
    fn evaluate(&mut self, point: &[f64; 4]) -> FieldResult<[f64; 3]>;

    /// Projects `origin` onto the cell that resolved the latest query.
    fn snap_point_on_cell(&self, _origin: &[f64; 3]) -> FieldResult<[f64; 3]> {
        Err(FieldError::NoCachedCell)
    }
}

/// A trait for integrators that advance a particle through a velocity field.
pub trait Steppable {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// position: current position (updated after step)
    ///
    /// On error neither `t` nor `position` is modified.
    fn step(
        &mut self,
        field: &mut impl VelocityField,
        t: &mut f64,
        position: &mut [f64; 3],
        dt: f64,
    ) -> FieldResult<()> {
        let slope = field.evaluate(&[position[0], position[1], position[2], *t])?;
        self.step_with_slope(field, slope, t, position, dt)
    }

    /// Same as [`Steppable::step`] with the velocity at `(position, t)`
    /// already known, e.g. from the previous step's final sample.
    fn step_with_slope(
        &mut self,
        field: &mut impl VelocityField,
        slope: [f64; 3],
        t: &mut f64,
        position: &mut [f64; 3],
        dt: f64,
    ) -> FieldResult<()>;
}
