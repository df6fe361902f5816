use rand::Rng;

/// Alphabet in ASCII order so that generated keys compare chronologically.
const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const TIME_LEN: usize = 8;
const RANDOM_LEN: usize = 12;

/// Generates 20-character child keys: 8 characters of millisecond timestamp
/// followed by 12 random characters. Keys minted within the same millisecond
/// increment the random suffix so they keep their generation order.
#[derive(Debug, Default)]
pub struct PushIdGenerator {
    last_millis: i64,
    last_random: [u8; RANDOM_LEN],
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self, now_millis: i64) -> String {
        // A clock that steps backwards must not break ordering.
        let millis = now_millis.max(self.last_millis);
        let same_instant = millis == self.last_millis;
        self.last_millis = millis;

        if same_instant {
            self.increment_random();
        } else {
            let mut rng = rand::rng();
            for digit in &mut self.last_random {
                *digit = rng.random_range(0..64);
            }
        }

        let mut id = String::with_capacity(TIME_LEN + RANDOM_LEN);
        let mut time_chars = [0u8; TIME_LEN];
        let mut remaining = millis.max(0) as u64;
        for slot in time_chars.iter_mut().rev() {
            *slot = PUSH_CHARS[(remaining % 64) as usize];
            remaining /= 64;
        }
        id.extend(time_chars.iter().map(|&c| c as char));
        id.extend(self.last_random.iter().map(|&d| PUSH_CHARS[d as usize] as char));
        id
    }

    fn increment_random(&mut self) {
        for digit in self.last_random.iter_mut().rev() {
            if *digit == 63 {
                *digit = 0;
            } else {
                *digit += 1;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_twenty_chars() {
        let mut generator = PushIdGenerator::new();
        let id = generator.next_id(1_700_000_000_000);
        assert_eq!(id.len(), 20);
        assert!(id.bytes().all(|b| PUSH_CHARS.contains(&b)));
    }

    #[test]
    fn same_millisecond_keys_stay_ordered() {
        let mut generator = PushIdGenerator::new();
        let ids: Vec<String> = (0..500).map(|_| generator.next_id(1_700_000_000_000)).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn later_timestamps_sort_after_earlier_ones() {
        let mut generator = PushIdGenerator::new();
        let first = generator.next_id(1_000);
        let second = generator.next_id(2_000);
        let third = generator.next_id(1_500);
        assert!(first < second);
        assert!(second < third);
    }
}
