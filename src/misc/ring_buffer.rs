//! Fixed size history buffer.
//! Once full, every push overwrites the oldest value.

use num_traits::Float;

/// Ring buffer that can hold any type.
/// The size of the buffer is defined as SIZE at compile time so it can be stored on the stack.
pub struct RingBuffer<T, const SIZE: usize> {
    data: [T; SIZE],
    index: usize,
    filled: bool,
}

impl<T: Default + Copy, const SIZE: usize> RingBuffer<T, SIZE> {
    /// Create a new RingBuffer using T::default().
    pub fn new() -> Self {
        Self {
            data: [T::default(); SIZE],
            index: 0,
            filled: false,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl<T: Default + Copy, const SIZE: usize> Default for RingBuffer<T, SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const SIZE: usize> RingBuffer<T, SIZE> {
    /// Adds a new value to the buffer
    pub fn push(&mut self, val: T) {
        self.data[self.index] = val;
        let idx = self.index + 1;
        self.index = idx % SIZE;

        if !self.filled && idx == SIZE {
            self.filled = true;
        }
    }

    pub fn len(&self) -> usize {
        if self.filled {
            SIZE
        } else {
            self.index
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over the stored values from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let (newer, older) = if self.filled {
            self.data.split_at(self.index)
        } else {
            (&self.data[..self.index], &self.data[..0])
        };
        older.iter().chain(newer.iter())
    }
}

impl<T: Float, const SIZE: usize> RingBuffer<T, SIZE> {
    /// Get the max value from the buffer.
    /// -Inf is returned if there are no values.
    pub fn max(&self) -> T {
        self.iter().fold(T::neg_infinity(), |a, &b| a.max(b))
    }

    /// Get the average of the values from the buffer.
    pub fn avg(&self) -> T {
        let sum = self.iter().fold(T::zero(), |a, &b| a + b);
        match T::from(self.len()) {
            Some(len) if !self.is_empty() => sum / len,
            _ => T::zero(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::RingBuffer;

    #[test]
    fn test_ring_buffer_partial() {
        let mut ring = RingBuffer::<f32, 10>::new();
        assert!(ring.is_empty());
        assert_eq!(ring.avg(), 0.0);

        ring.push(2.0);
        ring.push(4.0);

        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![2.0, 4.0]);
        assert_eq!(ring.max(), 4.0);
        assert_eq!(ring.avg(), 3.0);
    }

    #[test]
    fn test_ring_buffer_wraps_oldest_first() {
        let mut ring = RingBuffer::<f32, 4>::new();
        for i in 0..6 {
            ring.push(i as f32);
        }

        assert_eq!(ring.len(), 4);
        assert_eq!(
            ring.iter().copied().collect::<Vec<_>>(),
            vec![2.0, 3.0, 4.0, 5.0]
        );

        ring.clear();
        assert!(ring.is_empty());
    }
}
