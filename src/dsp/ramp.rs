/*
Ramped scalars
==============

Almost every continuously-variable quantity in the engine - envelope
outputs, filter coefficients, effect parameters, expression - follows the
same pattern: a value is computed once at the start of a tick and once at
the end, and the samples in between interpolate linearly. Rather than
duplicating "value + delta" fields everywhere, this type implements the
pattern once.

Geometric ramps (value multiplied by a scale each sample) are used where
the quantity is perceptually logarithmic, like a pitch glide's phase delta.
*/

/// A linearly interpolated scalar: `value` advances by `delta` per sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ramp {
    value: f64,
    delta: f64,
}

impl Ramp {
    pub const ZERO: Ramp = Ramp {
        value: 0.0,
        delta: 0.0,
    };

    /// A constant value (delta 0).
    pub fn constant(value: f64) -> Self {
        Self { value, delta: 0.0 }
    }

    /// Interpolate from `start` to `end` over `run_length` samples.
    pub fn over(start: f64, end: f64, run_length: usize) -> Self {
        let delta = if run_length == 0 {
            0.0
        } else {
            (end - start) / run_length as f64
        };
        Self {
            value: start,
            delta,
        }
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    #[inline]
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Current value, then step to the next sample.
    #[inline]
    pub fn next(&mut self) -> f64 {
        let v = self.value;
        self.value += self.delta;
        v
    }
}

/// A geometrically interpolated scalar: `value` is multiplied by `scale`
/// each sample. Used for exponential glides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometricRamp {
    value: f64,
    scale: f64,
}

impl GeometricRamp {
    pub fn constant(value: f64) -> Self {
        Self { value, scale: 1.0 }
    }

    /// Sweep from `start` to `end` over `run_length` samples along an
    /// exponential curve. Falls back to a constant when either endpoint is
    /// non-positive (an exponential can't cross zero).
    pub fn over(start: f64, end: f64, run_length: usize) -> Self {
        if run_length == 0 || start <= 0.0 || end <= 0.0 {
            return Self::constant(start);
        }
        Self {
            value: start,
            scale: (end / start).powf(1.0 / run_length as f64),
        }
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    #[inline]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    #[inline]
    pub fn next(&mut self) -> f64 {
        let v = self.value;
        self.value *= self.scale;
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_ramp_hits_endpoint() {
        let mut ramp = Ramp::over(0.0, 1.0, 4);
        let samples: Vec<f64> = (0..4).map(|_| ramp.next()).collect();
        assert_eq!(samples, vec![0.0, 0.25, 0.5, 0.75]);
        assert!((ramp.value() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_length_ramp_is_constant() {
        let mut ramp = Ramp::over(0.3, 0.9, 0);
        assert_eq!(ramp.next(), 0.3);
        assert_eq!(ramp.next(), 0.3);
    }

    #[test]
    fn geometric_ramp_doubles() {
        let mut ramp = GeometricRamp::over(1.0, 2.0, 2);
        ramp.next();
        ramp.next();
        assert!((ramp.value() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn geometric_ramp_refuses_zero_crossing() {
        let ramp = GeometricRamp::over(1.0, 0.0, 16);
        assert_eq!(ramp.scale(), 1.0);
    }
}
