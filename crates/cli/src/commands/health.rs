use std::time::Duration;

use kvlock::{LockContext, LockManager};

pub async fn run(manager: &LockManager, timeout: Duration) -> anyhow::Result<()> {
    let ctx = LockContext::new().with_timeout(timeout);
    let report = manager.health_check(&ctx).await;

    let mut unhealthy = 0usize;
    for health in &report {
        match &health.result {
            Ok(()) => println!("{:<40} ok", health.backend),
            Err(e) => {
                unhealthy += 1;
                println!("{:<40} FAILED: {e}", health.backend);
            }
        }
    }

    if unhealthy > 0 {
        anyhow::bail!("{unhealthy} of {} backends unhealthy", report.len());
    }
    println!("All {} backends healthy.", report.len());
    Ok(())
}
