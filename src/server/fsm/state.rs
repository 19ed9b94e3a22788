//! States and state tables.
//!
//! A [`StateDefinition`] is what a version declares: its own transitions,
//! guards and ignored messages, plus an optional base definition it extends.
//! At negotiation time every definition is flattened into a [`State`], so
//! dispatch is a single hash lookup no matter how deep the chain was.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::bolt::message::{BoltRequest, RequestKind};
use crate::bolt::{BoltError, BoltResult, ProtocolVersion};

use super::context::MachineContext;
use crate::server::handler::ResponseHandler;

/// Stable name of a state, used as the live state pointer and as a table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateReference(&'static str);

impl StateReference {
    /// Waiting for HELLO
    pub const NEGOTIATION: StateReference = StateReference("negotiation");
    /// Waiting for LOGON (5.1+)
    pub const AUTHENTICATION: StateReference = StateReference("authentication");
    /// Idle, authenticated session
    pub const READY: StateReference = StateReference("ready");
    /// Streaming an autocommit result
    pub const AUTO_COMMIT: StateReference = StateReference("auto_commit");
    /// Inside BEGIN .. COMMIT/ROLLBACK
    pub const EXPLICIT_TRANSACTION: StateReference = StateReference("explicit_transaction");
    /// Draining work after a RESET was signalled
    pub const INTERRUPTED: StateReference = StateReference("interrupted");
    /// A request failed; waiting for RESET
    pub const FAILED: StateReference = StateReference("failed");

    /// A reference with a custom name.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// State name.
    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for StateReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_uppercase())
    }
}

/// Handles an accepted message and names the next state.
pub type TransitionFn =
    fn(&mut MachineContext, BoltRequest, &mut dyn ResponseHandler) -> BoltResult<StateReference>;

/// Runs before a transition; an error stops the message.
pub type GuardFn = fn(&mut MachineContext, &BoltRequest) -> BoltResult<()>;

/// A state as a version declares it.
pub struct StateDefinition {
    reference: StateReference,
    base: Option<Arc<StateDefinition>>,
    transitions: Vec<(RequestKind, TransitionFn)>,
    guards: Vec<(RequestKind, GuardFn)>,
    ignored: Vec<RequestKind>,
}

impl StateDefinition {
    /// An empty state.
    pub fn new(reference: StateReference) -> Self {
        Self {
            reference,
            base: None,
            transitions: Vec::new(),
            guards: Vec::new(),
            ignored: Vec::new(),
        }
    }

    /// Inherit everything `base` accepts.
    pub fn extends(mut self, base: Arc<StateDefinition>) -> Self {
        self.base = Some(base);
        self
    }

    /// Accept `kind`, replacing whatever the base did with it.
    pub fn on(mut self, kind: RequestKind, transition: TransitionFn) -> Self {
        self.transitions.push((kind, transition));
        self
    }

    /// Check `guard` before any transition for `kind`.
    ///
    /// Guards declared here run before the ones inherited from the base.
    pub fn guard(mut self, kind: RequestKind, guard: GuardFn) -> Self {
        self.guards.push((kind, guard));
        self
    }

    /// Answer `kind` with IGNORED.
    pub fn ignore(mut self, kind: RequestKind) -> Self {
        self.ignored.push(kind);
        self
    }

    /// Answer every message with IGNORED unless a transition says otherwise.
    pub fn ignore_all(mut self) -> Self {
        self.ignored.extend(RequestKind::ALL);
        self
    }

    /// State name.
    pub fn reference(&self) -> StateReference {
        self.reference
    }

    /// Collapse the delegation chain into one dispatch table.
    pub fn flatten(&self) -> State {
        let mut state = match self.base {
            Some(ref base) => base.flatten(),
            None => State::empty(self.reference),
        };
        state.reference = self.reference;

        for kind in &self.ignored {
            state.transitions.remove(kind);
            state.ignored.insert(*kind);
        }
        for (kind, transition) in &self.transitions {
            state.ignored.remove(kind);
            state.transitions.insert(*kind, *transition);
        }
        for (kind, guard) in self.guards.iter().rev() {
            state.guards.entry(*kind).or_default().insert(0, *guard);
        }
        state
    }
}

impl fmt::Debug for StateDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateDefinition")
            .field("reference", &self.reference)
            .field("base", &self.base.as_ref().map(|b| b.reference))
            .field("accepts", &self.transitions.iter().map(|(k, _)| *k).collect::<Vec<_>>())
            .finish()
    }
}

/// A flattened state.
pub struct State {
    reference: StateReference,
    transitions: HashMap<RequestKind, TransitionFn>,
    guards: HashMap<RequestKind, Vec<GuardFn>>,
    ignored: HashSet<RequestKind>,
}

impl State {
    fn empty(reference: StateReference) -> Self {
        Self {
            reference,
            transitions: HashMap::new(),
            guards: HashMap::new(),
            ignored: HashSet::new(),
        }
    }

    /// State name.
    pub fn reference(&self) -> StateReference {
        self.reference
    }

    /// Transition for `kind`, if accepted.
    pub fn transition(&self, kind: RequestKind) -> Option<TransitionFn> {
        self.transitions.get(&kind).copied()
    }

    /// Guards for `kind`, in the order they run.
    pub fn guards(&self, kind: RequestKind) -> &[GuardFn] {
        self.guards.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `kind` is answered with IGNORED.
    pub fn ignores(&self, kind: RequestKind) -> bool {
        self.ignored.contains(&kind)
    }

    /// Whether `kind` has a transition.
    pub fn accepts(&self, kind: RequestKind) -> bool {
        self.transitions.contains_key(&kind)
    }

    /// Accepted kinds, in tag order.
    pub fn accepted(&self) -> Vec<RequestKind> {
        let mut kinds: Vec<_> = self.transitions.keys().copied().collect();
        kinds.sort_by_key(|k| k.tag());
        kinds
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("reference", &self.reference)
            .field("accepts", &self.accepted())
            .field("ignored", &self.ignored.len())
            .finish()
    }
}

/// Every state of one protocol version.
#[derive(Debug)]
pub struct StateTable {
    version: ProtocolVersion,
    states: HashMap<StateReference, State>,
}

impl StateTable {
    /// An empty table.
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            version,
            states: HashMap::new(),
        }
    }

    /// Flatten `definition` into the table.
    pub fn with_state(mut self, definition: &StateDefinition) -> Self {
        self.states.insert(definition.reference(), definition.flatten());
        self
    }

    /// Version the table belongs to.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Look a state up.
    pub fn get(&self, reference: StateReference) -> BoltResult<&State> {
        self.states.get(&reference).ok_or(BoltError::StateLookup {
            state: reference.name(),
            version: self.version,
        })
    }

    /// Whether `reference` is bound.
    pub fn contains(&self, reference: StateReference) -> bool {
        self.states.contains_key(&reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stay(
        _: &mut MachineContext,
        _: BoltRequest,
        _: &mut dyn ResponseHandler,
    ) -> BoltResult<StateReference> {
        Ok(StateReference::READY)
    }

    fn other(
        _: &mut MachineContext,
        _: BoltRequest,
        _: &mut dyn ResponseHandler,
    ) -> BoltResult<StateReference> {
        Ok(StateReference::FAILED)
    }

    fn allow(_: &mut MachineContext, _: &BoltRequest) -> BoltResult<()> {
        Ok(())
    }

    fn deny(_: &mut MachineContext, _: &BoltRequest) -> BoltResult<()> {
        Err(BoltError::authentication("denied"))
    }

    #[test]
    fn test_flatten_inherits_and_overrides() {
        let base = Arc::new(
            StateDefinition::new(StateReference::READY)
                .on(RequestKind::Run, stay)
                .on(RequestKind::Begin, stay)
                .guard(RequestKind::Run, allow),
        );
        let derived = StateDefinition::new(StateReference::READY)
            .extends(base)
            .on(RequestKind::Begin, other)
            .on(RequestKind::Logoff, stay)
            .guard(RequestKind::Run, deny);

        let state = derived.flatten();
        assert_eq!(
            state.accepted(),
            vec![RequestKind::Run, RequestKind::Begin, RequestKind::Logoff]
        );
        assert!(state.transition(RequestKind::Begin).unwrap() as usize == other as usize);
        // own guard first, inherited after
        let guards = state.guards(RequestKind::Run);
        assert_eq!(guards.len(), 2);
        assert!(guards[0] as usize == deny as usize);
        assert!(state.guards(RequestKind::Pull).is_empty());
    }

    #[test]
    fn test_ignore_all_keeps_declared_transitions() {
        let failed = StateDefinition::new(StateReference::FAILED)
            .ignore_all()
            .on(RequestKind::Goodbye, stay);
        let state = failed.flatten();
        assert!(state.ignores(RequestKind::Run));
        assert!(state.ignores(RequestKind::Pull));
        assert!(!state.ignores(RequestKind::Goodbye));
        assert!(state.accepts(RequestKind::Goodbye));
    }

    #[test]
    fn test_lookup_failure() {
        let table = StateTable::new(ProtocolVersion::V4_4)
            .with_state(&StateDefinition::new(StateReference::READY));
        assert!(table.get(StateReference::READY).is_ok());
        let err = table.get(StateReference::AUTHENTICATION).unwrap_err();
        assert!(matches!(
            err,
            BoltError::StateLookup { state: "authentication", .. }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_display() {
        assert_eq!(StateReference::AUTO_COMMIT.to_string(), "AUTO_COMMIT");
        assert_eq!(StateReference::new("custom").name(), "custom");
    }
}
