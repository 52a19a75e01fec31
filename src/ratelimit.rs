use governor::{DefaultDirectRateLimiter, DefaultKeyedRateLimiter, Quota};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;

// Bot API ceilings: about 30 messages a second overall, one a second per chat.
const GLOBAL_PER_SEC: NonZeroU32 = nonzero!(25u32);
const PER_CHAT_PER_SEC: NonZeroU32 = nonzero!(1u32);

/// Paces outgoing Telegram messages, overall and per recipient chat.
pub struct SendLimiter {
    global: DefaultDirectRateLimiter,
    per_chat: DefaultKeyedRateLimiter<i64>,
}

impl SendLimiter {
    pub fn new() -> Self {
        Self::with_quotas(
            Quota::per_second(GLOBAL_PER_SEC),
            Quota::per_second(PER_CHAT_PER_SEC),
        )
    }

    pub fn with_quotas(global: Quota, per_chat: Quota) -> Self {
        SendLimiter {
            global: DefaultDirectRateLimiter::direct(global),
            per_chat: DefaultKeyedRateLimiter::keyed(per_chat),
        }
    }

    /// Waits (non-blocking) until a message to `chat_id` may go out.
    pub async fn wait_for(&self, chat_id: i64) {
        // Chat first, so a chat that must wait does not hold a global slot.
        self.per_chat.until_key_ready(&chat_id).await;
        self.global.until_ready().await;
    }

    /// Drops per-chat state for chats that are back to a full budget.
    pub fn forget_idle_chats(&self) {
        self.per_chat.retain_recent();
    }
}

impl Default for SendLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_chat_has_its_own_budget() {
        let limiter = SendLimiter::new();
        assert!(limiter.per_chat.check_key(&1001).is_ok());
        assert!(limiter.per_chat.check_key(&1001).is_err());
        assert!(limiter.per_chat.check_key(&1002).is_ok());
    }

    #[test]
    fn global_budget_spans_all_chats() {
        let limiter = SendLimiter::new();
        for _ in 0..GLOBAL_PER_SEC.get() {
            assert!(limiter.global.check().is_ok());
        }
        assert!(limiter.global.check().is_err());
    }

    #[tokio::test]
    async fn distinct_chats_do_not_wait_on_each_other() {
        let limiter = SendLimiter::new();
        let both = async {
            limiter.wait_for(1001).await;
            limiter.wait_for(1002).await;
        };
        tokio::time::timeout(std::time::Duration::from_millis(500), both)
            .await
            .expect("no per-chat wait across chats");
        limiter.forget_idle_chats();
    }
}
