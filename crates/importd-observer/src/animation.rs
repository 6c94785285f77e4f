/// A displayed counter that walks toward its target one unit per tick.
///
/// Every real retarget bumps `generation`, which supersedes whatever walk was
/// in progress; the next tick starts from the currently displayed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnimatedCounter {
    displayed: u64,
    target: u64,
    generation: u64,
}

impl AnimatedCounter {
    pub fn new(value: u64) -> Self {
        Self {
            displayed: value,
            target: value,
            generation: 0,
        }
    }

    pub fn displayed(&self) -> u64 {
        self.displayed
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_settled(&self) -> bool {
        self.displayed == self.target
    }

    /// Returns `true` if the target moved.
    pub fn retarget(&mut self, target: u64) -> bool {
        if target == self.target {
            return false;
        }
        self.target = target;
        self.generation += 1;
        true
    }

    /// Moves one unit toward the target. Returns `false` once settled.
    pub fn step(&mut self) -> bool {
        if self.displayed < self.target {
            self.displayed += 1;
            true
        } else if self.displayed > self.target {
            self.displayed -= 1;
            true
        } else {
            false
        }
    }

    /// Jumps straight to the target.
    pub fn settle(&mut self) {
        self.displayed = self.target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_one_unit_without_overshoot() {
        let mut counter = AnimatedCounter::new(0);
        counter.retarget(3);

        let mut seen = Vec::new();
        while counter.step() {
            seen.push(counter.displayed());
        }
        assert_eq!(seen, vec![1, 2, 3]);
        assert!(!counter.step());
        assert_eq!(counter.displayed(), 3);
    }

    #[test]
    fn retarget_mid_walk_supersedes_previous_target() {
        let mut counter = AnimatedCounter::new(10);
        counter.retarget(20);
        counter.step();
        counter.step();
        assert_eq!(counter.generation(), 1);

        assert!(counter.retarget(13));
        assert_eq!(counter.generation(), 2);
        while counter.step() {}
        assert_eq!(counter.displayed(), 13);
    }

    #[test]
    fn same_target_does_not_restart() {
        let mut counter = AnimatedCounter::new(5);
        assert!(!counter.retarget(5));
        assert_eq!(counter.generation(), 0);
        assert!(counter.is_settled());
        assert!(!counter.step());
    }
}
