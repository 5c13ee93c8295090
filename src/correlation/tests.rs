use super::*;
use crate::error::{RegistryError, RequestError};
use crate::rpc::Reply;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn run_async_test<F>(future: F) -> Result<(), String>
where
    F: Future<Output = Result<(), String>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .map_err(|err| format!("Failed to build runtime: {}", err))?;
    runtime.block_on(future)
}

fn deadline_in(duration: Duration) -> Result<Option<Instant>, String> {
    Instant::now()
        .checked_add(duration)
        .map(Some)
        .ok_or_else(|| "deadline overflow".to_owned())
}

#[test]
fn resolve_delivers_reply_and_clears_entry() -> Result<(), String> {
    run_async_test(async {
        let registry = Arc::new(CorrelationRegistry::new());
        let id = CorrelationId::generate();
        let waiter = registry
            .register(id, deadline_in(Duration::from_secs(5))?)
            .map_err(|err| err.to_string())?;
        if !registry.contains(&id) {
            return Err("waiter should be registered".to_owned());
        }

        if !registry.resolve(&id, Reply::new(id, b"ok".to_vec())) {
            return Err("resolve should find the waiter".to_owned());
        }
        let reply = waiter.wait().await.map_err(|err| err.to_string())?;
        if reply.payload() != b"ok" || reply.id() != id {
            return Err(format!("unexpected reply {:?}", reply));
        }
        if registry.pending() != 0 {
            return Err(format!("expected empty registry, got {}", registry.pending()));
        }
        Ok(())
    })
}

#[test]
fn duplicate_registration_is_rejected() -> Result<(), String> {
    run_async_test(async {
        let registry = Arc::new(CorrelationRegistry::new());
        let id = CorrelationId::generate();
        let _first = registry.register(id, None).map_err(|err| err.to_string())?;
        match registry.register(id, None) {
            Err(RegistryError::DuplicateId { id: dup }) if dup == id => {}
            other => return Err(format!("expected duplicate error, got {:?}", other)),
        }
        if registry.pending() != 1 {
            return Err("original waiter must survive the rejected insert".to_owned());
        }
        Ok(())
    })
}

#[test]
fn unknown_reply_is_not_an_error() -> Result<(), String> {
    run_async_test(async {
        let registry = Arc::new(CorrelationRegistry::new());
        let id = CorrelationId::generate();
        let other = registry.register(CorrelationId::generate(), None).map_err(|err| err.to_string())?;

        if registry.resolve(&id, Reply::new(id, Vec::new())) {
            return Err("resolve for an unknown id must return false".to_owned());
        }
        if !registry.contains(&other.id()) {
            return Err("unrelated waiter must be untouched".to_owned());
        }
        Ok(())
    })
}

#[test]
fn expired_waiter_times_out_and_ignores_late_reply() -> Result<(), String> {
    run_async_test(async {
        let registry = Arc::new(CorrelationRegistry::new());
        let id = CorrelationId::generate();
        let waiter = registry
            .register(id, deadline_in(Duration::from_secs(1))?)
            .map_err(|err| err.to_string())?;

        match waiter.wait().await {
            Err(RequestError::Timeout { id: timed_out, timeout }) => {
                if timed_out != id || timeout != Duration::from_secs(1) {
                    return Err(format!("unexpected timeout {} after {:?}", timed_out, timeout));
                }
            }
            other => return Err(format!("expected timeout, got {:?}", other)),
        }
        if registry.contains(&id) {
            return Err("expired id must be removed".to_owned());
        }
        if registry.resolve(&id, Reply::new(id, b"late".to_vec())) {
            return Err("late reply must not resolve anything".to_owned());
        }
        Ok(())
    })
}

#[test]
fn expire_and_resolve_are_mutually_exclusive() -> Result<(), String> {
    run_async_test(async {
        let registry = Arc::new(CorrelationRegistry::new());
        let id = CorrelationId::generate();
        let _waiter = registry.register(id, None).map_err(|err| err.to_string())?;

        if !registry.expire(&id) {
            return Err("first expire should win".to_owned());
        }
        if registry.expire(&id) || registry.resolve(&id, Reply::new(id, Vec::new())) {
            return Err("operations after the first terminal one must be no-ops".to_owned());
        }
        Ok(())
    })
}

#[test]
fn dropping_waiter_removes_entry() -> Result<(), String> {
    run_async_test(async {
        let registry = Arc::new(CorrelationRegistry::new());
        let waiter = registry
            .register(CorrelationId::generate(), None)
            .map_err(|err| err.to_string())?;
        let id = waiter.id();
        drop(waiter);
        if registry.contains(&id) {
            return Err("dropped waiter must not leak its id".to_owned());
        }
        Ok(())
    })
}

#[test]
fn fail_all_reports_reply_channel_closed() -> Result<(), String> {
    run_async_test(async {
        let registry = Arc::new(CorrelationRegistry::new());
        let first = registry.register(CorrelationId::generate(), None).map_err(|err| err.to_string())?;
        let second = registry.register(CorrelationId::generate(), None).map_err(|err| err.to_string())?;

        if registry.fail_all() != 2 {
            return Err("expected two failed waiters".to_owned());
        }
        for waiter in [first, second] {
            match waiter.wait().await {
                Err(RequestError::ReplyChannelClosed) => {}
                other => return Err(format!("expected ReplyChannelClosed, got {:?}", other)),
            }
        }
        Ok(())
    })
}

#[test]
fn reply_racing_deadline_resolves_exactly_once() -> Result<(), String> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .map_err(|err| format!("Failed to build runtime: {}", err))?;

    runtime.block_on(async {
        let registry = Arc::new(CorrelationRegistry::new());
        for _ in 0..500 {
            let id = CorrelationId::generate();
            let waiter = registry
                .register(id, Some(Instant::now()))
                .map_err(|err| err.to_string())?;

            let resolver = {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.resolve(&id, Reply::new(id, b"r".to_vec())) })
            };
            let outcome = waiter.wait().await;
            let resolved = resolver.await.map_err(|err| err.to_string())?;

            match (&outcome, resolved) {
                (Ok(_), true) | (Err(RequestError::Timeout { .. }), false) => {}
                _ => {
                    return Err(format!(
                        "inconsistent race outcome: wait={:?}, resolve={}",
                        outcome, resolved
                    ));
                }
            }
            if registry.contains(&id) {
                return Err("raced id must be removed".to_owned());
            }
        }
        Ok(())
    })
}

#[test]
fn fail_all_racing_deadline_never_reports_timeout() -> Result<(), String> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .map_err(|err| format!("Failed to build runtime: {}", err))?;

    runtime.block_on(async {
        let registry = Arc::new(CorrelationRegistry::new());
        for _ in 0..500 {
            let waiter = registry
                .register(CorrelationId::generate(), Some(Instant::now()))
                .map_err(|err| err.to_string())?;

            let failer = {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.fail_all() })
            };
            let outcome = waiter.wait().await;
            let failed = failer.await.map_err(|err| err.to_string())?;

            match (&outcome, failed) {
                (Err(RequestError::ReplyChannelClosed), 1) | (Err(RequestError::Timeout { .. }), 0) => {}
                _ => {
                    return Err(format!(
                        "inconsistent race outcome: wait={:?}, failed={}",
                        outcome, failed
                    ));
                }
            }
            if registry.pending() != 0 {
                return Err("raced waiter must be removed".to_owned());
            }
        }
        Ok(())
    })
}

#[test]
fn correlation_ids_round_trip_through_text() -> Result<(), String> {
    let id = CorrelationId::generate();
    let parsed: CorrelationId = id.to_string().parse().map_err(|err: uuid::Error| err.to_string())?;
    if parsed != id {
        return Err(format!("expected {}, got {}", id, parsed));
    }
    if "not-a-uuid".parse::<CorrelationId>().is_ok() {
        return Err("garbage must not parse".to_owned());
    }
    Ok(())
}
