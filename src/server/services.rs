//! Collaborators the session layer drives.
//!
//! Query execution, storage, authentication and cluster routing all live
//! outside this crate. The state machine only sees them through these
//! traits. All of them are synchronous: the connection driver already runs
//! dispatch on a blocking thread.

use std::fmt;
use std::sync::Arc;

use crate::bolt::message::{AuthToken, QueryStats, RoutingTable, TransactionExtra};
use crate::bolt::packstream::{PackStreamValue, ValueMap};
use crate::bolt::BoltResult;

use super::interrupt::InterruptHandle;

/// An authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginContext {
    /// User the requests run as
    pub user: String,
    /// User that authenticated, when `user` is impersonated
    pub authenticated_as: Option<String>,
}

impl LoginContext {
    /// Identity of a user who authenticated directly.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            authenticated_as: None,
        }
    }

    /// Identity of `user`, running on behalf of this login.
    pub fn impersonating(&self, user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            authenticated_as: Some(self.authenticated_user().to_string()),
        }
    }

    /// Whether this identity is impersonated.
    pub fn is_impersonated(&self) -> bool {
        self.authenticated_as.is_some()
    }

    /// The user that actually presented credentials.
    pub fn authenticated_user(&self) -> &str {
        self.authenticated_as.as_deref().unwrap_or(&self.user)
    }
}

/// Everything a transaction needs to know about where it comes from.
#[derive(Debug, Clone)]
pub struct TransactionContext {
    /// Owning connection
    pub connection_id: String,
    /// Identity to run as
    pub login: Option<LoginContext>,
    /// Resolved database name
    pub database: String,
    /// Bookmarks, timeout, access mode and metadata from RUN/BEGIN
    pub extra: TransactionExtra,
    /// Whether this is an explicit (BEGIN) transaction
    pub explicit: bool,
    /// Set when the client sends RESET; poll it at safe points
    pub interrupt: InterruptHandle,
}

/// Summary of a consumed result.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSummary {
    /// `r`, `w`, `rw` or `s`
    pub query_type: String,
    /// Update counters
    pub stats: QueryStats,
}

impl Default for ResultSummary {
    fn default() -> Self {
        Self {
            query_type: "r".to_string(),
            stats: QueryStats::default(),
        }
    }
}

/// Validates credentials.
pub trait AuthenticationService: Send + Sync {
    /// Check a token and return the identity it grants.
    fn authenticate(&self, token: &AuthToken) -> BoltResult<LoginContext>;

    /// Let `login` act as `user`.
    fn impersonate(&self, login: &LoginContext, user: &str) -> BoltResult<LoginContext>;
}

/// Starts transactions.
pub trait TransactionManager: Send + Sync {
    /// Open a transaction.
    fn begin(&self, context: TransactionContext) -> BoltResult<Box<dyn Transaction>>;
}

/// An open transaction.
pub trait Transaction: Send {
    /// Run one statement.
    fn run(&mut self, query: &str, parameters: &ValueMap) -> BoltResult<Box<dyn ResultHandle>>;

    /// Commit. Returns the bookmark of the committed work, if any.
    fn commit(self: Box<Self>) -> BoltResult<Option<String>>;

    /// Roll back.
    fn rollback(self: Box<Self>) -> BoltResult<()>;
}

/// A statement's result, consumed lazily by PULL and DISCARD.
pub trait ResultHandle: Send {
    /// Column names.
    fn fields(&self) -> Vec<String>;

    /// Next row, `None` once exhausted.
    fn next_record(&mut self) -> BoltResult<Option<Vec<PackStreamValue>>>;

    /// Summary, asked for once the rows are exhausted.
    fn summary(&mut self) -> ResultSummary;
}

/// Computes routing tables.
pub trait RoutingService: Send + Sync {
    /// Routing table for `database` as seen by `user`.
    fn route(
        &self,
        database: &str,
        user: Option<&LoginContext>,
        context: &ValueMap,
    ) -> BoltResult<RoutingTable>;
}

/// The collaborators a connection needs.
#[derive(Clone)]
pub struct BoltServices {
    /// Credential checks
    pub auth: Arc<dyn AuthenticationService>,
    /// Query and transaction execution
    pub transactions: Arc<dyn TransactionManager>,
    /// Cluster routing
    pub routing: Arc<dyn RoutingService>,
}

impl BoltServices {
    /// Bundle the collaborators.
    pub fn new(
        auth: Arc<dyn AuthenticationService>,
        transactions: Arc<dyn TransactionManager>,
        routing: Arc<dyn RoutingService>,
    ) -> Self {
        Self {
            auth,
            transactions,
            routing,
        }
    }
}

impl fmt::Debug for BoltServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoltServices").finish_non_exhaustive()
    }
}
