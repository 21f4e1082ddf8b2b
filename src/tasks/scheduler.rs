use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration};

use crate::core::state::AppState;
use crate::tasks::grading;

pub(crate) async fn run(state: AppState) -> Result<()> {
    let concurrency = state.settings().grading().worker_concurrency;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::with_capacity(concurrency + 2);

    for _ in 0..concurrency {
        handles.push(tokio::spawn(ai_worker(state.clone(), shutdown_rx.clone())));
    }

    handles.push(tokio::spawn(deadline_loop(state.clone(), shutdown_rx.clone())));
    handles.push(tokio::spawn(requeue_loop(state.clone(), shutdown_rx.clone())));

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

async fn ai_worker(state: AppState, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match grading::process_next_answer(&state).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(err) => tracing::error!(error = %err, "AI grading worker pass failed"),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(Duration::from_secs(2)) => {}
        }
    }
}

async fn deadline_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = grading::submit_overdue_sessions(&state).await {
                    tracing::error!(error = %err, "submit_overdue_sessions failed");
                }
            }
        }
    }
}

async fn requeue_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(Duration::from_secs(300));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = grading::requeue_ai_grading(&state).await {
                    tracing::error!(error = %err, "requeue_ai_grading failed");
                }
            }
        }
    }
}
