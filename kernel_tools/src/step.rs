/// Iterator over `init, init * 2, init * 4, ...` while the value stays below
/// `limit`.
pub struct Doubling {
    next: usize,
    limit: usize,
}

impl Iterator for Doubling {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == 0 || self.next >= self.limit {
            return None;
        }
        let next = self.next;
        self.next *= 2;
        Some(next)
    }
}

// Returns the doubling offsets of a Hillis-Steele scan with the given initial
// stride.
pub fn doubling(init: usize, limit: usize) -> Doubling {
    Doubling { next: init, limit }
}

/// Iterator over `init, init / 2, init / 4, ..., 1`.
pub struct Halving {
    next: usize,
}

impl Iterator for Halving {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == 0 {
            return None;
        }
        let next = self.next;
        self.next /= 2;
        Some(next)
    }
}

// Returns the strides of a tree reduction that starts at `init`.
pub fn halving(init: usize) -> Halving {
    Halving { next: init }
}

#[cfg(test)]
mod tests {
    use super::{doubling, halving};

    #[test]
    fn doubling_test() {
        let steps: Vec<usize> = doubling(4, 32).collect();
        assert_eq!(steps, vec![4, 8, 16]);
        assert_eq!(doubling(32, 32).count(), 0);
    }

    #[test]
    fn halving_test() {
        let steps: Vec<usize> = halving(8).collect();
        assert_eq!(steps, vec![8, 4, 2, 1]);
    }
}
