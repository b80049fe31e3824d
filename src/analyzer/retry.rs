//! 解析プロバイダ呼び出しのリトライ
//!
//! 1回ごとにタイムアウトを掛け、一時的な失敗のときだけ指数バックオフで再試行する。
//! 待ち時間は base, 2*base, 4*base ... で、最後の試行のあとは待たない。

use crate::error::{Result, ScoutError};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 試行回数の上限（1以上）
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// 1回の呼び出しのタイムアウト
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2000),
            timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// `attempt` 回目（1始まり）の失敗後に待つ時間
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// `failures` 回失敗したあと成功した場合の待ち時間の合計
    pub fn total_backoff(&self, failures: u32) -> Duration {
        (1..=failures).map(|n| self.delay_after(n)).sum()
    }
}

/// 解析呼び出しをリトライ付きで実行
///
/// # Arguments
/// * `operation_name` - ログ用の名前
/// * `policy` - 試行回数・待ち時間・タイムアウト
/// * `operation` - 1回分の呼び出しを返すクロージャ
///
/// # Returns
/// 成功した結果。一時的でない失敗はそのまま、上限到達時は `RetriesExhausted`
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(operation = operation_name, attempt, "再試行");
        }

        let outcome = match tokio::time::timeout(policy.timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(ScoutError::Timeout(policy.timeout.as_secs())),
        };

        let err = match outcome {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(operation = operation_name, attempt, "リトライ後に成功");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_transient() {
            return Err(err);
        }

        if attempt >= max_attempts {
            tracing::error!(
                operation = operation_name,
                attempt,
                error = %err,
                "リトライ上限に達しました"
            );
            return Err(ScoutError::RetriesExhausted {
                attempts: attempt,
                last_error: err.to_string(),
            });
        }

        let delay = policy.delay_after(attempt);
        tracing::warn!(
            operation = operation_name,
            attempt,
            backoff_ms = delay.as_millis() as u64,
            error = %err,
            "呼び出し失敗、待機して再試行します"
        );
        tokio::time::sleep(delay).await;
    }
}
