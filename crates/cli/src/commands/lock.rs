use std::time::Duration;

use clap::Args;
use kvlock::{DistributedLock, LockContext, LockError, LockManager, LockMode, LockOverrides};
use tracing::{debug, warn};

#[derive(Args, Debug)]
pub struct LockArgs {
    /// Lock key.
    pub key: String,
    /// How long to hold the lock once acquired, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub hold_ms: u64,
    /// Number of attempts before giving up (0 uses the configured value).
    #[arg(long)]
    pub retry_count: Option<u32>,
    /// Base delay between attempts in milliseconds.
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,
    /// Lock expiry in milliseconds.
    #[arg(long)]
    pub expiration_ms: Option<u64>,
    /// Poll until acquired or this many milliseconds pass, instead of a
    /// fixed number of attempts.
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

impl LockArgs {
    fn overrides(&self) -> LockOverrides {
        LockOverrides {
            expiration_ms: self.expiration_ms,
            retry_count: self.retry_count.filter(|&n| n > 0),
            retry_delay_ms: self.retry_delay_ms,
            ..LockOverrides::default()
        }
    }
}

/// Refresh period while holding, if the hold outlasts half the expiry.
fn refresh_interval(hold: Duration, expiration: Duration) -> Option<Duration> {
    let half = expiration / 2;
    (!half.is_zero() && hold > half).then_some(half)
}

pub async fn run(manager: &LockManager, args: &LockArgs, mode: LockMode) -> anyhow::Result<()> {
    let config = args.overrides().apply(manager.defaults().clone());
    config.validate()?;
    let release_budget = config.acquire_timeout;
    let expiration = config.expiration;
    let lock = manager.new_dyn(args.key.clone(), config, mode);

    let ctx = LockContext::new();
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let acquired = match args.timeout_ms {
        Some(ms) => {
            match lock
                .try_acquire_with_timeout(&ctx, Duration::from_millis(ms))
                .await
            {
                Err(LockError::DeadlineExceeded) => Ok(false),
                other => other,
            }
        }
        None => lock.acquire_with_retry(&ctx, 0, Duration::ZERO).await,
    }?;

    if !acquired {
        println!("Lock {} not acquired: held by another owner.", lock.key());
        return Ok(());
    }
    println!("Acquired lock {} as {}.", lock.key(), lock.value());

    let held = hold(lock.as_ref(), &ctx, Duration::from_millis(args.hold_ms), expiration).await;
    if let Err(e) = &held {
        warn!(key = %lock.key(), error = %e, "hold interrupted");
    }

    let release_ctx = LockContext::new().with_timeout(release_budget);
    match lock.release(&release_ctx).await {
        Ok(()) => println!("Released lock {}.", lock.key()),
        Err(e) if e.is_contention() => {
            println!("Lock {} expired before release.", lock.key());
        }
        Err(e) => return Err(e.into()),
    }

    match held {
        Err(e) if !e.is_cancellation() => Err(e.into()),
        _ => Ok(()),
    }
}

async fn hold(
    lock: &dyn DistributedLock,
    ctx: &LockContext,
    hold: Duration,
    expiration: Duration,
) -> Result<(), LockError> {
    let Some(interval) = refresh_interval(hold, expiration) else {
        return ctx.sleep(hold).await;
    };

    let mut remaining = hold;
    while remaining > interval {
        ctx.sleep(interval).await?;
        lock.refresh(ctx).await?;
        debug!(key = %lock.key(), "lock refreshed");
        remaining -= interval;
    }
    ctx.sleep(remaining).await
}

#[cfg(test)]
mod tests {
    use kvlock::LockConfig;

    use super::*;

    #[test]
    fn short_hold_needs_no_refresh() {
        assert_eq!(
            refresh_interval(Duration::from_secs(10), Duration::from_secs(30)),
            None
        );
    }

    #[test]
    fn long_hold_refreshes_at_half_expiry() {
        assert_eq!(
            refresh_interval(Duration::from_secs(20), Duration::from_secs(30)),
            Some(Duration::from_secs(15))
        );
    }

    #[test]
    fn overrides_only_set_given_flags() {
        let args = LockArgs {
            key: "job".into(),
            hold_ms: 0,
            retry_count: Some(7),
            retry_delay_ms: None,
            expiration_ms: None,
            timeout_ms: None,
        };
        let overrides = args.overrides();
        assert_eq!(overrides.retry_count, Some(7));
        assert_eq!(overrides.retry_delay_ms, None);
    }

    #[test]
    fn zero_retry_count_keeps_configured_value() {
        let args = LockArgs {
            key: "job".into(),
            hold_ms: 0,
            retry_count: Some(0),
            retry_delay_ms: None,
            expiration_ms: None,
            timeout_ms: None,
        };
        let base = LockConfig::default().with_retry_count(5);
        assert_eq!(args.overrides().apply(base).retry_count, 5);
    }
}
