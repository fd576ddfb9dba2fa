use std::collections::VecDeque;

/// How many past selections are remembered per category
pub const RECENT_CAPACITY: usize = 5;

/// Fixed-size memory of the most recently picked items, oldest evicted first
#[derive(Debug, Clone)]
pub struct RecentSelections<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone + PartialEq> RecentSelections<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl<T: Clone + PartialEq> Default for RecentSelections<T> {
    fn default() -> Self {
        Self::new(RECENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut recent = RecentSelections::default();
        for i in 1..=6 {
            recent.push(format!("m{}", i));
        }
        let kept = recent.snapshot();
        assert_eq!(kept.len(), RECENT_CAPACITY);
        assert!(!kept.contains(&"m1".to_string()));
        assert_eq!(kept.first().map(String::as_str), Some("m2"));
        assert_eq!(kept.last().map(String::as_str), Some("m6"));
    }
}
