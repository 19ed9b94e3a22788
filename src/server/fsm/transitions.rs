//! Transition and guard functions.
//!
//! Each function handles one accepted message kind. It reports through the
//! handler and returns the next state; an `Err` is turned into a FAILURE by
//! the machine, which also decides between `failed` and closing.

use std::time::Instant;

use crate::bolt::message::{BoltRequest, ResultRequest};
use crate::bolt::packstream::{PackStreamValue, ValueMap};
use crate::bolt::{BoltError, BoltErrorCode, BoltResult};
use crate::server::handler::ResponseHandler;
use crate::server::protocol::Impersonation;

use super::context::MachineContext;
use super::state::StateReference;

fn unexpected(request: &BoltRequest) -> BoltError {
    BoltError::protocol_violation(format!("Unexpected {} message", request.name()))
}

fn elapsed_ms(since: Instant) -> PackStreamValue {
    PackStreamValue::Integer(since.elapsed().as_millis() as i64)
}

fn connection_metadata(ctx: &MachineContext, handler: &mut dyn ResponseHandler) {
    handler.on_metadata("server", ctx.config.server_agent.as_str().into());
    handler.on_metadata("connection_id", ctx.connection.id().into());

    let mut hints = ValueMap::new();
    if let Some(seconds) = ctx.config.recv_timeout_hint {
        hints.insert(
            "connection.recv_timeout_seconds".to_string(),
            (seconds as i64).into(),
        );
    }
    if ctx.features.telemetry {
        hints.insert(
            "telemetry.enabled".to_string(),
            ctx.config.telemetry_enabled.into(),
        );
    }
    if !hints.is_empty() {
        handler.on_metadata("hints", hints.into());
    }
}

// ============================================================================
// Session setup
// ============================================================================

/// HELLO carrying credentials (before 5.1): authenticate and go to `ready`.
pub(crate) fn hello_with_auth(
    ctx: &mut MachineContext,
    request: BoltRequest,
    handler: &mut dyn ResponseHandler,
) -> BoltResult<StateReference> {
    let hello = match request {
        BoltRequest::Hello(hello) => hello,
        other => return Err(unexpected(&other)),
    };
    ctx.connection.record_hello(&hello);
    let auth = hello
        .auth
        .ok_or_else(|| BoltError::authentication("HELLO carries no authentication token"))?;
    ctx.authenticate(&auth)?;

    connection_metadata(ctx, handler);
    handler.on_success();
    ctx.default_state = StateReference::READY;
    Ok(StateReference::READY)
}

/// HELLO without credentials (5.1+): wait for LOGON.
pub(crate) fn hello(
    ctx: &mut MachineContext,
    request: BoltRequest,
    handler: &mut dyn ResponseHandler,
) -> BoltResult<StateReference> {
    let hello = match request {
        BoltRequest::Hello(hello) => hello,
        other => return Err(unexpected(&other)),
    };
    ctx.connection.record_hello(&hello);

    connection_metadata(ctx, handler);
    handler.on_success();
    ctx.default_state = StateReference::AUTHENTICATION;
    Ok(StateReference::AUTHENTICATION)
}

pub(crate) fn logon(
    ctx: &mut MachineContext,
    request: BoltRequest,
    handler: &mut dyn ResponseHandler,
) -> BoltResult<StateReference> {
    let logon = match request {
        BoltRequest::Logon(logon) => logon,
        other => return Err(unexpected(&other)),
    };
    ctx.authenticate(&logon.auth)?;
    handler.on_success();
    ctx.default_state = StateReference::READY;
    Ok(StateReference::READY)
}

pub(crate) fn logoff(
    ctx: &mut MachineContext,
    _request: BoltRequest,
    handler: &mut dyn ResponseHandler,
) -> BoltResult<StateReference> {
    ctx.login = None;
    ctx.impersonated = None;
    handler.on_success();
    ctx.default_state = StateReference::AUTHENTICATION;
    Ok(StateReference::AUTHENTICATION)
}

// ============================================================================
// Statements and transactions
// ============================================================================

/// RUN: autocommit from `ready`, or another statement inside BEGIN.
pub(crate) fn run(
    ctx: &mut MachineContext,
    request: BoltRequest,
    handler: &mut dyn ResponseHandler,
) -> BoltResult<StateReference> {
    let started = Instant::now();
    let bytes = request.estimated_size();
    let run = match request {
        BoltRequest::Run(run) => run,
        other => return Err(unexpected(&other)),
    };

    let explicit = match ctx.transaction {
        Some(ref scope) => scope.is_explicit(),
        None => {
            ctx.open_transaction(run.extra, false, 0)?;
            false
        }
    };
    let reservation = ctx.memory.try_reserve(bytes)?;
    let (qid, fields) = ctx
        .transaction_mut()?
        .run(&run.query, &run.parameters, reservation)?;

    handler.on_metadata("fields", fields.into());
    handler.on_metadata("t_first", elapsed_ms(started));
    if explicit {
        handler.on_metadata("qid", qid.into());
        handler.on_success();
        return Ok(StateReference::EXPLICIT_TRANSACTION);
    }
    handler.on_success();
    Ok(StateReference::AUTO_COMMIT)
}

pub(crate) fn pull(
    ctx: &mut MachineContext,
    request: BoltRequest,
    handler: &mut dyn ResponseHandler,
) -> BoltResult<StateReference> {
    match request {
        BoltRequest::Pull(pull) => stream(ctx, pull, handler, false),
        other => Err(unexpected(&other)),
    }
}

pub(crate) fn discard(
    ctx: &mut MachineContext,
    request: BoltRequest,
    handler: &mut dyn ResponseHandler,
) -> BoltResult<StateReference> {
    match request {
        BoltRequest::Discard(discard) => stream(ctx, discard, handler, true),
        other => Err(unexpected(&other)),
    }
}

fn stream(
    ctx: &mut MachineContext,
    request: ResultRequest,
    handler: &mut dyn ResponseHandler,
    discard: bool,
) -> BoltResult<StateReference> {
    let scope = ctx
        .transaction
        .as_mut()
        .ok_or_else(|| BoltError::request_invalid("No open result to consume"))?;
    let qid = scope.resolve_qid(request.qid)?;
    let explicit = scope.is_explicit();
    let database = scope.database().to_string();
    let mut batch = ctx.memory.try_reserve(0)?;

    let exhausted = {
        let result = scope
            .result_mut(qid)
            .ok_or_else(|| BoltError::request_invalid(format!("No open result for qid {}", qid)))?;
        let mut remaining = if request.is_all() { None } else { Some(request.n) };
        loop {
            if remaining == Some(0) {
                break false;
            }
            // safe point
            if ctx.interrupt.is_interrupted() {
                return Err(BoltError::job(
                    BoltErrorCode::TRANSACTION_TERMINATED,
                    "The transaction has been terminated by a RESET",
                ));
            }
            match result.handle.next_record()? {
                Some(fields) => {
                    if !discard {
                        batch.grow(fields.iter().map(PackStreamValue::estimated_size).sum())?;
                        handler.on_record(fields);
                    }
                    if let Some(n) = remaining.as_mut() {
                        *n -= 1;
                    }
                }
                None => break true,
            }
        }
    };

    if !exhausted {
        handler.on_metadata("has_more", true.into());
        handler.on_success();
        return Ok(if explicit {
            StateReference::EXPLICIT_TRANSACTION
        } else {
            StateReference::AUTO_COMMIT
        });
    }

    if let Some(mut finished) = scope.close_result(qid) {
        let summary = finished.handle.summary();
        handler.on_metadata("type", summary.query_type.into());
        if summary.stats.contains_updates() || summary.stats.contains_system_updates {
            handler.on_metadata("stats", summary.stats.to_map().into());
        }
        handler.on_metadata("t_last", elapsed_ms(finished.started));
    }
    handler.on_metadata("db", database.into());

    if explicit {
        handler.on_success();
        return Ok(StateReference::EXPLICIT_TRANSACTION);
    }

    // autocommit ends with its result
    ctx.impersonated = None;
    if let Some(scope) = ctx.transaction.take() {
        if let Some(bookmark) = scope.commit()? {
            handler.on_metadata("bookmark", bookmark.into());
        }
    }
    handler.on_success();
    Ok(StateReference::READY)
}

pub(crate) fn begin(
    ctx: &mut MachineContext,
    request: BoltRequest,
    handler: &mut dyn ResponseHandler,
) -> BoltResult<StateReference> {
    if ctx.transaction.is_some() {
        return Err(BoltError::protocol_violation(
            "Nested transactions are not supported: a transaction is already open",
        ));
    }
    let bytes = request.estimated_size();
    let begin = match request {
        BoltRequest::Begin(begin) => begin,
        other => return Err(unexpected(&other)),
    };
    ctx.open_transaction(begin.extra, true, bytes)?;
    handler.on_success();
    Ok(StateReference::EXPLICIT_TRANSACTION)
}

pub(crate) fn commit(
    ctx: &mut MachineContext,
    _request: BoltRequest,
    handler: &mut dyn ResponseHandler,
) -> BoltResult<StateReference> {
    match ctx.transaction.take() {
        Some(scope) if scope.is_explicit() => {
            ctx.impersonated = None;
            if let Some(bookmark) = scope.commit()? {
                handler.on_metadata("bookmark", bookmark.into());
            }
            handler.on_success();
            Ok(StateReference::READY)
        }
        other => {
            ctx.transaction = other;
            Err(BoltError::request_invalid("There is no explicit transaction to commit"))
        }
    }
}

pub(crate) fn rollback(
    ctx: &mut MachineContext,
    _request: BoltRequest,
    handler: &mut dyn ResponseHandler,
) -> BoltResult<StateReference> {
    match ctx.transaction.take() {
        Some(scope) if scope.is_explicit() => {
            ctx.impersonated = None;
            scope.rollback()?;
            handler.on_success();
            Ok(StateReference::READY)
        }
        other => {
            ctx.transaction = other;
            Err(BoltError::request_invalid("There is no explicit transaction to roll back"))
        }
    }
}

// ============================================================================
// Routing and telemetry
// ============================================================================

pub(crate) fn route(
    ctx: &mut MachineContext,
    request: BoltRequest,
    handler: &mut dyn ResponseHandler,
) -> BoltResult<StateReference> {
    let route = match request {
        BoltRequest::Route(route) => route,
        other => return Err(unexpected(&other)),
    };
    let database = ctx.resolve_database(route.database.as_deref());
    let user = match (ctx.features.impersonation, route.imp_user.as_deref()) {
        (Impersonation::PerRequest, Some(user)) => Some(ctx.impersonate(user)?),
        _ => ctx.login.clone(),
    };
    let table = ctx
        .services
        .routing
        .route(&database, user.as_ref(), &route.routing)?;

    handler.on_metadata("rt", table.to_map().into());
    handler.on_success();
    Ok(StateReference::READY)
}

pub(crate) fn telemetry(
    ctx: &mut MachineContext,
    request: BoltRequest,
    handler: &mut dyn ResponseHandler,
) -> BoltResult<StateReference> {
    if let BoltRequest::Telemetry(ref telemetry) = request {
        if ctx.config.telemetry_enabled {
            tracing::debug!(
                connection_id = %ctx.connection.id(),
                api = telemetry.api.as_i64(),
                "Driver telemetry"
            );
        }
    }
    handler.on_success();
    Ok(StateReference::READY)
}

// ============================================================================
// Guards
// ============================================================================

/// Install (or clear) the impersonated identity before RUN/BEGIN.
pub(crate) fn check_impersonation(ctx: &mut MachineContext, request: &BoltRequest) -> BoltResult<()> {
    if ctx.features.impersonation != Impersonation::PerRequest {
        return Ok(());
    }
    let imp_user = match request {
        BoltRequest::Run(run) => run.extra.imp_user.as_deref(),
        BoltRequest::Begin(begin) => begin.extra.imp_user.as_deref(),
        _ => None,
    };
    ctx.impersonated = match imp_user {
        Some(user) => Some(ctx.impersonate(user)?),
        None => None,
    };
    Ok(())
}
