use dashmap::DashMap;
use serenity::model::id::UserId;
use std::{collections::VecDeque, time::Duration};
use tokio::time::Instant;

/// Per-user sliding-window rate limit, tracked separately per command.
pub struct Cooldown {
    uses: usize,
    window: Duration,
    history: DashMap<(UserId, &'static str), VecDeque<Instant>>,
}

impl Cooldown {
    pub fn new(uses: u32, window: Duration) -> Self {
        Self {
            uses: uses.max(1) as usize,
            window,
            history: DashMap::new(),
        }
    }

    /// Records a use, or returns how long the user has to wait.
    pub fn check(&self, user_id: UserId, command: &'static str) -> Result<(), Duration> {
        let now = Instant::now();
        self.history
            .retain(|_, used| used.back().is_some_and(|last| now.duration_since(*last) < self.window));

        let mut recent = self.history.entry((user_id, command)).or_default();

        while recent
            .front()
            .is_some_and(|used| now.duration_since(*used) >= self.window)
        {
            recent.pop_front();
        }

        if recent.len() >= self.uses {
            let oldest = recent.front().copied().unwrap_or(now);
            return Err(self.window.saturating_sub(now.duration_since(oldest)));
        }

        recent.push_back(now);
        Ok(())
    }

    /// Number of (user, command) pairs with a use inside the window.
    pub fn tracked(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn allows_configured_uses_per_window() {
        let cooldown = Cooldown::new(2, Duration::from_secs(5));
        let user = UserId::new(1);

        assert!(cooldown.check(user, "play").is_ok());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(cooldown.check(user, "play").is_ok());

        let wait = cooldown.check(user, "play").unwrap_err();
        assert_eq!(wait, Duration::from_secs(4));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(cooldown.check(user, "play").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn commands_and_users_are_independent() {
        let cooldown = Cooldown::new(1, Duration::from_secs(5));

        assert!(cooldown.check(UserId::new(1), "play").is_ok());
        assert!(cooldown.check(UserId::new(1), "skip").is_ok());
        assert!(cooldown.check(UserId::new(2), "play").is_ok());
        assert!(cooldown.check(UserId::new(1), "play").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_users_are_forgotten() {
        let cooldown = Cooldown::new(2, Duration::from_secs(5));

        assert!(cooldown.check(UserId::new(1), "play").is_ok());
        assert!(cooldown.check(UserId::new(1), "skip").is_ok());
        assert_eq!(cooldown.tracked(), 2);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(cooldown.check(UserId::new(2), "play").is_ok());
        assert_eq!(cooldown.tracked(), 1);
    }
}
