/// 分類リクエストの再試行ポリシー。
///
/// 既定では待機なしの即時再試行。`base_delay_ms` を設定すると
/// Full Jitter の指数バックオフになる。
use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// 最大試行回数（初回を含む）
    pub max_attempts: usize,
    /// ベースとなる遅延時間（ミリ秒）。0 なら即時再試行
    pub base_delay_ms: u64,
    /// 最大遅延時間（ミリ秒）
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 0,
            max_delay_ms: 2000,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub const fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// 指定された試行番号（1始まり）の前に待つべき時間。
    ///
    /// 初回試行とバックオフ無効時は常にゼロ。
    #[must_use]
    pub fn delay_before_attempt(&self, attempt: usize) -> Duration {
        if attempt <= 1 || self.base_delay_ms == 0 {
            return Duration::ZERO;
        }

        let exponent = u32::try_from(attempt - 2).unwrap_or(u32::MAX);
        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(1_u64.checked_shl(exponent).unwrap_or(u64::MAX));
        let capped_delay = exponential_delay.min(self.max_delay_ms);

        if capped_delay == 0 {
            return Duration::ZERO;
        }

        Duration::from_millis(rand::rng().random_range(0..=capped_delay))
    }

    /// まだ試行できるかどうか（`attempt` はこれから行う試行番号、1始まり）。
    #[must_use]
    pub const fn can_attempt(&self, attempt: usize) -> bool {
        attempt <= self.max_attempts
    }
}
