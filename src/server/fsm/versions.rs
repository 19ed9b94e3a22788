//! State definitions per protocol version.
//!
//! Each version starts from the previous one and only spells out its delta:
//!
//! | Version | Change |
//! |---------|--------|
//! | 4.3 | base states; HELLO authenticates |
//! | 4.4 | `ready` re-validates `imp_user` before RUN and BEGIN |
//! | 5.0 | same states as 4.4 |
//! | 5.1 | HELLO defers to LOGON; `authentication` state; LOGOFF in `ready` |
//! | 5.4 | TELEMETRY in `ready` |

use std::sync::Arc;

use crate::bolt::message::RequestKind;
use crate::bolt::ProtocolVersion;

use super::state::{StateDefinition, StateReference, StateTable};
use super::transitions;

struct VersionStates {
    negotiation: Arc<StateDefinition>,
    authentication: Option<Arc<StateDefinition>>,
    ready: Arc<StateDefinition>,
    auto_commit: Arc<StateDefinition>,
    explicit_transaction: Arc<StateDefinition>,
    failed: Arc<StateDefinition>,
    interrupted: Arc<StateDefinition>,
}

impl VersionStates {
    fn into_table(self, version: ProtocolVersion) -> StateTable {
        let mut table = StateTable::new(version)
            .with_state(&self.negotiation)
            .with_state(&self.ready)
            .with_state(&self.auto_commit)
            .with_state(&self.explicit_transaction)
            .with_state(&self.failed)
            .with_state(&self.interrupted);
        if let Some(ref authentication) = self.authentication {
            table = table.with_state(authentication);
        }
        table
    }
}

fn v4_3() -> VersionStates {
    VersionStates {
        negotiation: Arc::new(
            StateDefinition::new(StateReference::NEGOTIATION)
                .on(RequestKind::Hello, transitions::hello_with_auth),
        ),
        authentication: None,
        ready: Arc::new(
            StateDefinition::new(StateReference::READY)
                .on(RequestKind::Run, transitions::run)
                .on(RequestKind::Begin, transitions::begin)
                .on(RequestKind::Commit, transitions::commit)
                .on(RequestKind::Rollback, transitions::rollback)
                .on(RequestKind::Route, transitions::route),
        ),
        auto_commit: Arc::new(
            StateDefinition::new(StateReference::AUTO_COMMIT)
                .on(RequestKind::Pull, transitions::pull)
                .on(RequestKind::Discard, transitions::discard)
                .on(RequestKind::Commit, transitions::commit)
                .on(RequestKind::Rollback, transitions::rollback),
        ),
        explicit_transaction: Arc::new(
            StateDefinition::new(StateReference::EXPLICIT_TRANSACTION)
                .on(RequestKind::Run, transitions::run)
                .on(RequestKind::Pull, transitions::pull)
                .on(RequestKind::Discard, transitions::discard)
                .on(RequestKind::Begin, transitions::begin)
                .on(RequestKind::Commit, transitions::commit)
                .on(RequestKind::Rollback, transitions::rollback),
        ),
        failed: Arc::new(StateDefinition::new(StateReference::FAILED).ignore_all()),
        interrupted: Arc::new(StateDefinition::new(StateReference::INTERRUPTED).ignore_all()),
    }
}

fn v4_4() -> VersionStates {
    let base = v4_3();
    let ready = StateDefinition::new(StateReference::READY)
        .extends(Arc::clone(&base.ready))
        .guard(RequestKind::Run, transitions::check_impersonation)
        .guard(RequestKind::Begin, transitions::check_impersonation);
    VersionStates {
        ready: Arc::new(ready),
        ..base
    }
}

fn v5_1() -> VersionStates {
    let base = v4_4();
    let ready = StateDefinition::new(StateReference::READY)
        .extends(Arc::clone(&base.ready))
        .on(RequestKind::Logoff, transitions::logoff);
    VersionStates {
        negotiation: Arc::new(
            StateDefinition::new(StateReference::NEGOTIATION)
                .on(RequestKind::Hello, transitions::hello),
        ),
        authentication: Some(Arc::new(
            StateDefinition::new(StateReference::AUTHENTICATION)
                .on(RequestKind::Logon, transitions::logon),
        )),
        ready: Arc::new(ready),
        ..base
    }
}

fn v5_4() -> VersionStates {
    let base = v5_1();
    let ready = StateDefinition::new(StateReference::READY)
        .extends(Arc::clone(&base.ready))
        .on(RequestKind::Telemetry, transitions::telemetry);
    VersionStates {
        ready: Arc::new(ready),
        ..base
    }
}

/// Flattened state table for `version`.
pub fn state_table(version: ProtocolVersion) -> Option<StateTable> {
    let states = match (version.major(), version.minor()) {
        (4, 3) => v4_3(),
        (4, 4) | (5, 0) => v4_4(),
        (5, 1) | (5, 2) | (5, 3) => v5_1(),
        (5, 4) => v5_4(),
        _ => return None,
    };
    Some(states.into_table(version.exact()))
}
