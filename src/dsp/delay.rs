/// Ring-buffer delay line with power-of-two capacity, fractional reads, and
/// history-preserving growth.
///
/// Capacity is always a power of two so position wrap is a mask instead of
/// a modulo in the per-sample loops. Growing the buffer copies the existing
/// history into the new ring (a tempo change that lengthens an echo must
/// not drop the tail that is already sounding).
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    mask: usize,
    write_pos: usize,
}

impl DelayLine {
    /// Rounds the requested capacity up to a power of two.
    pub fn new(min_capacity: usize) -> Self {
        let capacity = min_capacity.max(2).next_power_of_two();
        Self {
            buffer: vec![0.0; capacity],
            mask: capacity - 1,
            write_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos & self.mask] = sample;
        self.write_pos = self.write_pos.wrapping_add(1);
    }

    /// Sample written `delay` samples ago (1 = the most recent write).
    #[inline]
    pub fn read(&self, delay: usize) -> f32 {
        let delay = delay.clamp(1, self.buffer.len());
        self.buffer[self.write_pos.wrapping_sub(delay) & self.mask]
    }

    /// Linearly interpolated read at a fractional delay.
    #[inline]
    pub fn read_fractional(&self, delay: f64) -> f32 {
        let delay = delay.clamp(1.0, (self.buffer.len() - 1) as f64);
        let whole = delay as usize;
        let frac = (delay - whole as f64) as f32;
        let a = self.read(whole);
        let b = self.read(whole + 1);
        a + (b - a) * frac
    }

    /// Grow to hold at least `min_capacity` samples, copying the existing
    /// history so delayed audio already in flight keeps playing. Shrinking
    /// is never done here; callers flush and rebuild when a line goes idle.
    pub fn grow_preserving(&mut self, min_capacity: usize) {
        if min_capacity <= self.buffer.len() {
            return;
        }
        let new_capacity = min_capacity.next_power_of_two();
        let mut new_buffer = vec![0.0; new_capacity];
        let old_len = self.buffer.len();
        for age in 1..=old_len {
            new_buffer[self.write_pos.wrapping_sub(age) & (new_capacity - 1)] =
                self.buffer[self.write_pos.wrapping_sub(age) & self.mask];
        }
        self.buffer = new_buffer;
        self.mask = new_capacity - 1;
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }

    /// True if every stored sample is exactly zero.
    pub fn is_silent(&self) -> bool {
        self.buffer.iter().all(|&s| s == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_returns_delayed_sample() {
        let mut line = DelayLine::new(16);
        for i in 0..8 {
            line.write(i as f32);
        }
        assert_eq!(line.read(1), 7.0);
        assert_eq!(line.read(4), 4.0);
    }

    #[test]
    fn fractional_read_interpolates() {
        let mut line = DelayLine::new(16);
        for i in 0..8 {
            line.write(i as f32);
        }
        // Halfway between samples written 2 and 3 writes ago (6.0 and 5.0).
        let v = line.read_fractional(2.5);
        assert!((v - 5.5).abs() < 1e-6);
    }

    #[test]
    fn growth_preserves_history() {
        let mut line = DelayLine::new(8);
        for i in 0..8 {
            line.write(i as f32);
        }
        line.grow_preserving(64);
        assert_eq!(line.capacity(), 64);
        assert_eq!(line.read(1), 7.0);
        assert_eq!(line.read(8), 0.0);
    }

    #[test]
    fn clear_silences_the_line() {
        let mut line = DelayLine::new(8);
        line.write(0.5);
        assert!(!line.is_silent());
        line.clear();
        assert!(line.is_silent());
        assert_eq!(line.read(1), 0.0);
    }
}
