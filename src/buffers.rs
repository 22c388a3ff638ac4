//! Double-buffered particle state
//!
//! Two particle buffers are allocated once and never copied between: one is
//! authoritative ("current"), the other is the write target ("next"). A
//! step writes `next` and then [`StateBuffers::swap`] flips a single index,
//! which is the only point where authority transfers.

/// A pair of particle buffers plus the energy reduction workspace.
///
/// `B` is the backend's particle buffer (a `Vec` on the CPU, a storage
/// buffer on the GPU) and `S` its scratch type for energy reduction.
#[derive(Debug)]
pub struct StateBuffers<B, S> {
    slots: [B; 2],
    energy: S,
    current: usize,
    capacity: usize,
    swaps: u64,
}

impl<B, S> StateBuffers<B, S> {
    /// Wrap two preallocated buffers; `first` starts out as current
    pub fn new(first: B, second: B, energy: S, capacity: usize) -> Self {
        Self {
            slots: [first, second],
            energy,
            current: 0,
            capacity,
            swaps: 0,
        }
    }

    /// Particle capacity both buffers were allocated with
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The authoritative buffer, the only one downstream readers may use
    pub fn current(&self) -> &B {
        &self.slots[self.current]
    }

    /// The write target of the step in progress
    pub fn next(&mut self) -> &mut B {
        &mut self.slots[self.current ^ 1]
    }

    /// Writable access to the current buffer, for priming the descent
    /// direction before the first step. Never used while a step is running.
    pub fn current_mut(&mut self) -> &mut B {
        &mut self.slots[self.current]
    }

    /// Borrow current (read-only), next (writable) and the energy workspace at once
    pub fn split_mut(&mut self) -> (&B, &mut B, &mut S) {
        let (low, high) = self.slots.split_at_mut(1);
        let (current, next) = if self.current == 0 {
            (&low[0], &mut high[0])
        } else {
            (&high[0], &mut low[0])
        };
        (current, next, &mut self.energy)
    }

    /// Both buffers, for (re)initialization by the injector
    pub fn slots_mut(&mut self) -> impl Iterator<Item = &mut B> {
        self.slots.iter_mut()
    }

    /// Make `next` authoritative. The former current becomes stale.
    pub fn swap(&mut self) {
        self.current ^= 1;
        self.swaps += 1;
    }

    /// Number of swaps since allocation
    pub fn swap_count(&self) -> u64 {
        self.swaps
    }

    pub fn energy(&self) -> &S {
        &self.energy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> StateBuffers<Vec<u32>, Vec<f32>> {
        StateBuffers::new(vec![1, 1], vec![2, 2], vec![0.0; 2], 2)
    }

    #[test]
    fn first_buffer_starts_current() {
        let mut buffers = pair();
        assert_eq!(buffers.current(), &vec![1, 1]);
        assert_eq!(buffers.next(), &mut vec![2, 2]);
        assert_eq!(buffers.swap_count(), 0);
    }

    #[test]
    fn swap_publishes_next() {
        let mut buffers = pair();
        buffers.next()[0] = 9;
        buffers.swap();

        assert_eq!(buffers.current(), &vec![9, 2]);
        // The former current is now the write target
        assert_eq!(buffers.next(), &mut vec![1, 1]);
        assert_eq!(buffers.swap_count(), 1);
    }

    #[test]
    fn split_follows_current_index() {
        let mut buffers = pair();
        buffers.swap();
        let (current, next, energy) = buffers.split_mut();
        assert_eq!(current, &vec![2, 2]);
        next[1] = 5;
        energy[0] = 1.5;

        assert_eq!(buffers.next(), &mut vec![1, 5]);
        assert_eq!(buffers.energy()[0], 1.5);
    }

    #[test]
    fn double_swap_restores_roles() {
        let mut buffers = pair();
        buffers.swap();
        buffers.swap();
        assert_eq!(buffers.current(), &vec![1, 1]);
        assert_eq!(buffers.capacity(), 2);
    }
}
