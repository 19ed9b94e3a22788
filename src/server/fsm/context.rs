//! Session data the transitions work on.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::bolt::message::{AuthToken, ResultRequest, TransactionExtra};
use crate::bolt::packstream::ValueMap;
use crate::bolt::{BoltError, BoltResult};
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::server::interrupt::InterruptHandle;
use crate::server::memory::{MemoryReservation, MemoryTracker};
use crate::server::protocol::ProtocolFeatures;
use crate::server::services::{
    BoltServices, LoginContext, ResultHandle, Transaction, TransactionContext,
};

use super::state::StateReference;

/// Everything a transition may read or change besides the current state.
pub struct MachineContext {
    pub(crate) connection: Connection,
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) services: BoltServices,
    pub(crate) features: ProtocolFeatures,
    pub(crate) memory: MemoryTracker,
    pub(crate) interrupt: InterruptHandle,
    pub(crate) login: Option<LoginContext>,
    pub(crate) impersonated: Option<LoginContext>,
    pub(crate) default_state: StateReference,
    pub(crate) transaction: Option<TransactionScope>,
}

impl MachineContext {
    pub(crate) fn new(
        connection: Connection,
        config: Arc<ServerConfig>,
        services: BoltServices,
        features: ProtocolFeatures,
        interrupt: InterruptHandle,
    ) -> Self {
        let memory = MemoryTracker::new(config.connection_memory_limit);
        Self {
            connection,
            config,
            services,
            features,
            memory,
            interrupt,
            login: None,
            impersonated: None,
            default_state: StateReference::NEGOTIATION,
            transaction: None,
        }
    }

    /// Connection metadata.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Authenticated identity, if any.
    pub fn login(&self) -> Option<&LoginContext> {
        self.login.as_ref()
    }

    /// Identity installed for the current request or transaction.
    pub fn impersonated(&self) -> Option<&LoginContext> {
        self.impersonated.as_ref()
    }

    /// Memory accounting for this connection.
    pub fn memory(&self) -> &MemoryTracker {
        &self.memory
    }

    /// Whether a transaction (implicit or explicit) is open.
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    pub(crate) fn resolve_database(&self, requested: Option<&str>) -> String {
        match requested {
            Some(db) if !db.is_empty() => db.to_string(),
            _ => self.config.default_database.clone(),
        }
    }

    /// Identity requests run as: the impersonated user if one is installed.
    pub(crate) fn effective_login(&self) -> Option<LoginContext> {
        self.impersonated.clone().or_else(|| self.login.clone())
    }

    pub(crate) fn authenticate(&mut self, token: &AuthToken) -> BoltResult<()> {
        let login = self.services.auth.authenticate(token)?;
        tracing::debug!(
            connection_id = %self.connection.id(),
            user = %login.user,
            scheme = %token.scheme,
            "Authenticated"
        );
        self.login = Some(login);
        Ok(())
    }

    pub(crate) fn impersonate(&self, user: &str) -> BoltResult<LoginContext> {
        let login = self.login.as_ref().ok_or_else(|| {
            BoltError::authentication("Impersonation requires an authenticated user")
        })?;
        self.services.auth.impersonate(login, user)
    }

    pub(crate) fn open_transaction(
        &mut self,
        extra: TransactionExtra,
        explicit: bool,
        bytes: usize,
    ) -> BoltResult<()> {
        let reservation = self.memory.try_reserve(bytes)?;
        let database = self.resolve_database(extra.database.as_deref());
        let context = TransactionContext {
            connection_id: self.connection.id().to_string(),
            login: self.effective_login(),
            database: database.clone(),
            extra,
            explicit,
            interrupt: self.interrupt.clone(),
        };
        let transaction = self.services.transactions.begin(context)?;
        self.transaction = Some(TransactionScope {
            transaction,
            explicit,
            database,
            results: BTreeMap::new(),
            next_qid: 0,
            _reservation: reservation,
        });
        Ok(())
    }

    pub(crate) fn transaction_mut(&mut self) -> BoltResult<&mut TransactionScope> {
        self.transaction
            .as_mut()
            .ok_or_else(|| BoltError::request_invalid("No open transaction"))
    }

    /// Roll back whatever is open. Failures are logged, never reported.
    pub(crate) fn rollback_transaction(&mut self) {
        if let Some(scope) = self.transaction.take() {
            if let Err(e) = scope.transaction.rollback() {
                tracing::warn!(
                    connection_id = %self.connection.id(),
                    error = %e,
                    "Rollback failed while discarding transaction"
                );
            }
        }
    }

    /// Drop the transaction and impersonation of the current request scope.
    pub(crate) fn clear_request_scope(&mut self) {
        self.rollback_transaction();
        self.impersonated = None;
    }
}

/// An open transaction and the results it is streaming.
pub(crate) struct TransactionScope {
    transaction: Box<dyn Transaction>,
    explicit: bool,
    database: String,
    results: BTreeMap<i64, OpenResult>,
    next_qid: i64,
    _reservation: MemoryReservation,
}

pub(crate) struct OpenResult {
    pub(crate) handle: Box<dyn ResultHandle>,
    pub(crate) started: Instant,
    pub(crate) _reservation: MemoryReservation,
}

impl TransactionScope {
    pub(crate) fn is_explicit(&self) -> bool {
        self.explicit
    }

    pub(crate) fn database(&self) -> &str {
        &self.database
    }

    /// Run a statement; returns its qid and column names.
    pub(crate) fn run(
        &mut self,
        query: &str,
        parameters: &ValueMap,
        reservation: MemoryReservation,
    ) -> BoltResult<(i64, Vec<String>)> {
        let handle = self.transaction.run(query, parameters)?;
        let qid = self.next_qid;
        self.next_qid += 1;
        let fields = handle.fields();
        self.results.insert(
            qid,
            OpenResult {
                handle,
                started: Instant::now(),
                _reservation: reservation,
            },
        );
        Ok((qid, fields))
    }

    /// Resolve `qid`, where `-1` means the most recently opened result.
    pub(crate) fn resolve_qid(&self, qid: i64) -> BoltResult<i64> {
        let resolved = if qid == ResultRequest::LAST {
            self.results.keys().next_back().copied()
        } else {
            Some(qid).filter(|q| self.results.contains_key(q))
        };
        resolved.ok_or_else(|| {
            BoltError::request_invalid(format!("No open result for qid {}", qid))
        })
    }

    pub(crate) fn result_mut(&mut self, qid: i64) -> Option<&mut OpenResult> {
        self.results.get_mut(&qid)
    }

    pub(crate) fn close_result(&mut self, qid: i64) -> Option<OpenResult> {
        self.results.remove(&qid)
    }

    pub(crate) fn commit(self) -> BoltResult<Option<String>> {
        self.transaction.commit()
    }

    pub(crate) fn rollback(self) -> BoltResult<()> {
        self.transaction.rollback()
    }
}
