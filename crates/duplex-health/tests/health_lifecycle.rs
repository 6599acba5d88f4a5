//! Health subsystem lifecycle.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use duplex_health::{checker_fn, HealthError, HealthServer, ProbeContext, ServingStatus, OVERALL};
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::time::Instant;

#[tokio::test]
async fn init_marks_everything_not_serving_before_first_pass() {
    let handle: Arc<OnceLock<HealthServer>> = Arc::new(OnceLock::new());
    let observed: Arc<Mutex<Option<(ServingStatus, ServingStatus)>>> = Arc::default();

    let (probe_handle, probe_observed) = (Arc::clone(&handle), Arc::clone(&observed));
    let health = HealthServer::builder()
        .checker(
            "db",
            checker_fn(move |_ctx| {
                if let Some(health) = probe_handle.get() {
                    probe_observed
                        .lock()
                        .get_or_insert((health.status(OVERALL), health.status("db")));
                }
                async { Ok(()) }
            }),
        )
        .build();
    handle.set(health.clone()).unwrap();

    health.init(ServingStatus::Serving).await.unwrap();

    // The first pass ran inside init.
    assert_eq!(*observed.lock(), Some((ServingStatus::NotServing, ServingStatus::NotServing)));
    assert_eq!(health.status("db"), ServingStatus::Serving);
    assert_eq!(health.status(OVERALL), ServingStatus::Serving);
    health.close();
}

#[tokio::test]
async fn mixed_checkers_after_one_pass() {
    let health = HealthServer::builder()
        .checker("db", checker_fn(|_ctx| async { Err(HealthError::failed("refused")) }))
        .checker("cache", checker_fn(|_ctx| async { Ok(()) }))
        .build();
    health.init(ServingStatus::Serving).await.unwrap();

    assert_eq!(health.check("db").unwrap(), ServingStatus::NotServing);
    assert_eq!(health.check("cache").unwrap(), ServingStatus::Serving);
    assert_eq!(health.check("").unwrap(), ServingStatus::NotServing);
    assert_eq!(health.status("unknown-service"), ServingStatus::ServiceUnknown);
    health.close();
}

#[tokio::test(start_paused = true)]
async fn no_checkers_means_no_background_passes() {
    let health = HealthServer::builder().interval(Duration::from_millis(10)).build();
    health.init(ServingStatus::Serving).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(health.statuses().len(), 1);
    assert_eq!(health.check(OVERALL).unwrap(), ServingStatus::Serving);
}

#[tokio::test(start_paused = true)]
async fn timed_out_probe_is_cancelled() {
    let health = HealthServer::builder()
        .checker(
            "slow",
            checker_fn(|ctx: ProbeContext| async move {
                tokio::select! {
                    () = ctx.cancelled() => Err(HealthError::failed("cancelled")),
                    () = tokio::time::sleep(Duration::from_secs(10)) => Ok(()),
                }
            }),
        )
        .timeout(Duration::from_secs(1))
        .build();

    let started = Instant::now();
    assert_eq!(health.check_all().await, ServingStatus::NotServing);
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(health.check("slow").unwrap(), ServingStatus::NotServing);

    // The probe task was aborted; it never reports success afterwards.
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(health.check("slow").unwrap(), ServingStatus::NotServing);
}

#[tokio::test]
async fn close_freezes_and_ends_watches() {
    let health = HealthServer::builder()
        .checker("db", checker_fn(|_ctx| async { Ok(()) }))
        .build();
    health.init(ServingStatus::Serving).await.unwrap();
    let mut overall = health.watch(OVERALL);
    assert_eq!(overall.next().await, Some(ServingStatus::Serving));

    health.close();
    health.set_status("db", ServingStatus::Serving);
    health.set_status(OVERALL, ServingStatus::Serving);

    assert_eq!(overall.next().await, Some(ServingStatus::NotServing));
    assert_eq!(overall.next().await, None);
    assert!(health
        .statuses()
        .values()
        .all(|status| *status == ServingStatus::NotServing));
}
