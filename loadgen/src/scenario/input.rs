//! Input domain sampled at the start of every iteration

use super::types::IterationInput;
use rand::Rng;
use rand::seq::IndexedRandom;

/// Delivery addresses used by the order and payment scenarios
pub const DEFAULT_ADDRESSES: [&str; 5] = [
    "서울시 강남구 테헤란로 123",
    "서울시 서초구 서초대로 456",
    "서울시 송파구 올림픽로 789",
    "경기도 성남시 분당구 판교역로 100",
    "경기도 수원시 영통구 광교중앙로 200",
];

/// Domain of per-iteration inputs
#[derive(Debug, Clone)]
pub struct InputDomain {
    /// User ids are sampled uniformly from `1..=total_users`
    total_users: u64,
    addresses: Vec<String>,
}

impl Default for InputDomain {
    fn default() -> Self {
        Self::new(1000, DEFAULT_ADDRESSES.iter().map(|a| a.to_string()).collect())
    }
}

impl InputDomain {
    pub fn new(total_users: u64, addresses: Vec<String>) -> Self {
        Self {
            total_users: total_users.max(1),
            addresses,
        }
    }

    pub fn total_users(&self) -> u64 {
        self.total_users
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> IterationInput {
        let user_id = rng.random_range(1..=self.total_users);
        let delivery_address = self.addresses.choose(rng).cloned().unwrap_or_default();
        IterationInput {
            user_id,
            delivery_username: format!("테스트유저{user_id}"),
            delivery_address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_samples_stay_in_domain() {
        let domain = InputDomain::new(10, vec!["a".to_string(), "b".to_string()]);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for _ in 0..500 {
            let input = domain.sample(&mut rng);
            assert!((1..=10).contains(&input.user_id));
            assert!(input.delivery_address == "a" || input.delivery_address == "b");
            assert_eq!(input.delivery_username, format!("테스트유저{}", input.user_id));
        }
    }

    #[test]
    fn test_every_user_id_is_reachable() {
        let domain = InputDomain::new(5, vec![]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut seen = [false; 5];
        for _ in 0..500 {
            seen[(domain.sample(&mut rng).user_id - 1) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_zero_users_clamps_to_one() {
        let domain = InputDomain::new(0, vec![]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(domain.sample(&mut rng).user_id, 1);
        assert_eq!(domain.total_users(), 1);
    }
}
