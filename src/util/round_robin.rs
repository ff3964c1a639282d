use std::fmt::Debug;

/// An ordered collection of members with a rotating cursor. Each call to [RoundRobinSet::next]
///  returns the member under the cursor and advances it, wrapping around at the end, so that
///  `k * n` draws from a set of `n` members return each member exactly `k` times.
///
/// Removing a member keeps the rotation intact: the member that followed the removed one is
///  the next to be returned.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RoundRobinSet<T> {
    members: Vec<T>,
    cursor: usize,
}

impl<T: Copy + Eq + Debug> RoundRobinSet<T> {
    pub fn new(members: Vec<T>) -> RoundRobinSet<T> {
        RoundRobinSet {
            members,
            cursor: 0,
        }
    }

    pub fn next(&mut self) -> Option<T> {
        if self.members.is_empty() {
            return None;
        }

        let result = self.members[self.cursor];
        self.cursor = (self.cursor + 1) % self.members.len();
        Some(result)
    }

    /// removes all occurrences of `member`, returning `true` if there was at least one
    pub fn remove(&mut self, member: &T) -> bool {
        let mut removed_any = false;
        let mut idx = 0;
        while idx < self.members.len() {
            if self.members[idx] == *member {
                self.members.remove(idx);
                if idx < self.cursor {
                    self.cursor -= 1;
                }
                removed_any = true;
            }
            else {
                idx += 1;
            }
        }

        if self.cursor >= self.members.len() {
            self.cursor = 0;
        }
        removed_any
    }

    pub fn add(&mut self, member: T) {
        self.members.push(member);
    }

    pub fn contains(&self, member: &T) -> bool {
        self.members.contains(member)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[T] {
        &self.members
    }
}

impl<T: Copy + Eq + Debug> From<Vec<T>> for RoundRobinSet<T> {
    fn from(value: Vec<T>) -> Self {
        RoundRobinSet::new(value)
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;
    use rustc_hash::FxHashMap;

    use super::*;

    #[test]
    fn test_rotation() {
        let mut set = RoundRobinSet::new(vec![5u32, 7, 9]);
        let drawn: Vec<_> = (0..7).map(|_| set.next().unwrap()).collect();
        assert_eq!(drawn, vec![5, 7, 9, 5, 7, 9, 5]);
    }

    #[test]
    fn test_empty() {
        let mut set = RoundRobinSet::<u32>::new(vec![]);
        assert!(set.is_empty());
        assert_eq!(set.next(), None);
        assert!(!set.remove(&1));
        assert_eq!(set.next(), None);
    }

    #[rstest]
    #[case::single(1, 10)]
    #[case::two(2, 3)]
    #[case::three(3, 4)]
    #[case::many(8, 5)]
    fn test_fairness(#[case] n: u32, #[case] k: usize) {
        let mut set = RoundRobinSet::new((0..n).collect());
        let mut counts = FxHashMap::default();
        for _ in 0..k * n as usize {
            *counts.entry(set.next().unwrap()).or_insert(0usize) += 1;
        }
        assert_eq!(counts.len(), n as usize);
        assert!(counts.values().all(|&c| c == k));
    }

    #[rstest]
    #[case::before_cursor(2, 1, vec![3, 4, 2, 3])]
    #[case::at_cursor(2, 3, vec![4, 1, 2, 4])]
    #[case::last_at_cursor(3, 4, vec![1, 2, 3, 1])]
    #[case::after_cursor(1, 4, vec![2, 3, 1, 2])]
    fn test_remove_keeps_rotation(#[case] num_drawn: usize, #[case] to_remove: u32, #[case] expected: Vec<u32>) {
        let mut set = RoundRobinSet::new(vec![1u32, 2, 3, 4]);
        for _ in 0..num_drawn {
            set.next();
        }
        assert!(set.remove(&to_remove));
        assert!(!set.contains(&to_remove));

        let drawn: Vec<_> = (0..expected.len()).map(|_| set.next().unwrap()).collect();
        assert_eq!(drawn, expected);
    }

    #[test]
    fn test_remove_until_empty() {
        let mut set = RoundRobinSet::new(vec![1u32, 2, 3]);
        set.next();
        set.next();
        set.next();
        assert!(set.remove(&3));
        assert!(set.remove(&1));
        assert_eq!(set.next(), Some(2));
        assert!(set.remove(&2));
        assert!(set.is_empty());
        assert_eq!(set.next(), None);
    }

    #[test]
    fn test_remove_duplicates() {
        let mut set = RoundRobinSet::new(vec![1u32, 2, 1, 3]);
        assert!(set.remove(&1));
        assert_eq!(set.members(), &[2, 3]);
    }

    #[test]
    fn test_add() {
        let mut set = RoundRobinSet::new(vec![1u32]);
        set.add(2);
        assert_eq!(set.len(), 2);
        assert_eq!(set.next(), Some(1));
        assert_eq!(set.next(), Some(2));
    }
}
