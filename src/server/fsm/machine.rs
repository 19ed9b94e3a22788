//! The per-connection state machine.

use std::sync::Arc;

use crate::bolt::message::{BoltRequest, RequestKind};
use crate::bolt::{BoltError, BoltResult, ProtocolVersion};
use crate::server::admission::AdmissionRejection;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::server::handler::ResponseHandler;
use crate::server::interrupt::InterruptHandle;
use crate::server::protocol::ProtocolBinding;
use crate::server::services::BoltServices;

use super::context::MachineContext;
use super::state::{StateReference, StateTable};

/// Session automaton for one connection.
///
/// Exactly one message is processed at a time. RESET and GOODBYE are legal
/// in every state; everything else goes through the negotiated state table.
pub struct StateMachine {
    table: Arc<StateTable>,
    current: StateReference,
    ctx: MachineContext,
    closed: bool,
}

impl StateMachine {
    /// Create a machine in `negotiation` for a freshly negotiated connection.
    pub fn new(
        binding: &ProtocolBinding,
        connection: Connection,
        config: Arc<ServerConfig>,
        services: BoltServices,
        interrupt: InterruptHandle,
    ) -> Self {
        Self {
            table: Arc::clone(binding.states()),
            current: StateReference::NEGOTIATION,
            ctx: MachineContext::new(connection, config, services, binding.features(), interrupt),
            closed: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> StateReference {
        self.current
    }

    /// State a RESET returns to.
    pub fn default_state(&self) -> StateReference {
        self.ctx.default_state
    }

    /// Negotiated version.
    pub fn version(&self) -> ProtocolVersion {
        self.table.version()
    }

    /// Session data.
    pub fn context(&self) -> &MachineContext {
        &self.ctx
    }

    /// Connection metadata.
    pub fn connection(&self) -> &Connection {
        &self.ctx.connection
    }

    /// Interrupt handle shared with the network reader.
    pub fn interrupt_handle(&self) -> &InterruptHandle {
        &self.ctx.interrupt
    }

    /// Whether the connection must be closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Process one message.
    ///
    /// Non-fatal failures are reported through `handler` and move the machine
    /// to `failed`; they come back as `Ok(FAILED)`. Fatal ones are reported
    /// the same way, close the machine and come back as `Err`.
    pub fn process(
        &mut self,
        request: BoltRequest,
        handler: &mut dyn ResponseHandler,
    ) -> BoltResult<StateReference> {
        if self.closed {
            return Err(BoltError::ConnectionClosed);
        }

        let kind = request.kind();
        let before = self.current;
        let outcome = match kind {
            RequestKind::Reset => Ok(self.reset(handler)),
            RequestKind::Goodbye => {
                self.close();
                Ok(self.current)
            }
            _ if self.ctx.interrupt.is_interrupted() => {
                self.current = StateReference::INTERRUPTED;
                handler.on_ignored();
                Ok(self.current)
            }
            _ => self.dispatch(request, handler),
        };

        tracing::debug!(
            connection_id = %self.ctx.connection.id(),
            message = kind.name(),
            from = %before,
            to = %self.current,
            "Processed message"
        );
        outcome
    }

    /// Refuse a message that admission control turned away.
    pub fn reject(
        &mut self,
        rejection: AdmissionRejection,
        handler: &mut dyn ResponseHandler,
    ) -> StateReference {
        // a queued RESET wins over admission, same as in `process`
        if self.ctx.interrupt.is_interrupted() {
            self.current = StateReference::INTERRUPTED;
            handler.on_ignored();
            return self.current;
        }
        if self.current == StateReference::FAILED || self.current == StateReference::INTERRUPTED {
            handler.on_ignored();
            return self.current;
        }
        // resource exhaustion is never fatal
        self.fail(rejection.into(), handler)
            .unwrap_or(StateReference::FAILED)
    }

    /// Release everything the session holds. Later messages are refused.
    pub fn close(&mut self) {
        self.ctx.clear_request_scope();
        self.closed = true;
    }

    fn dispatch(
        &mut self,
        request: BoltRequest,
        handler: &mut dyn ResponseHandler,
    ) -> BoltResult<StateReference> {
        let kind = request.kind();
        let table = Arc::clone(&self.table);
        let state = match table.get(self.current) {
            Ok(state) => state,
            Err(e) => return self.fail(e, handler),
        };

        if state.ignores(kind) {
            handler.on_ignored();
            return Ok(self.current);
        }
        let transition = match state.transition(kind) {
            Some(transition) => transition,
            None => {
                let error = BoltError::protocol_violation(format!(
                    "Message '{}' cannot be handled by a session in the {} state",
                    kind, self.current
                ));
                return self.fail(error, handler);
            }
        };
        for guard in state.guards(kind) {
            if let Err(e) = guard(&mut self.ctx, &request) {
                return self.fail(e, handler);
            }
        }

        match transition(&mut self.ctx, request, handler) {
            Ok(next) => match table.get(next) {
                Ok(_) => {
                    self.current = next;
                    Ok(next)
                }
                Err(e) => self.fail(e, handler),
            },
            Err(e) => self.fail(e, handler),
        }
    }

    fn reset(&mut self, handler: &mut dyn ResponseHandler) -> StateReference {
        // an earlier RESET is still queued behind this one
        if self.ctx.interrupt.acknowledge() > 0 {
            self.current = StateReference::INTERRUPTED;
            handler.on_ignored();
            return self.current;
        }
        self.ctx.clear_request_scope();
        self.current = self.ctx.default_state;
        handler.on_success();
        self.current
    }

    fn fail(
        &mut self,
        error: BoltError,
        handler: &mut dyn ResponseHandler,
    ) -> BoltResult<StateReference> {
        handler.on_failure(&error);
        self.ctx.clear_request_scope();
        if error.is_fatal() {
            tracing::warn!(
                connection_id = %self.ctx.connection.id(),
                state = %self.current,
                error = %error,
                "Fatal error, closing connection"
            );
            self.closed = true;
            return Err(error);
        }
        self.current = StateReference::FAILED;
        Ok(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::message::{
        AuthToken, BeginMessage, BoltResponse, HelloMessage, LogonMessage, ResultRequest,
        RouteMessage, RunMessage, TelemetryApi, TelemetryMessage, TransactionExtra,
    };
    use crate::bolt::registry::StructRegistry;
    use crate::bolt::packstream::encode_structure;
    use crate::bolt::BoltErrorCode;
    use crate::server::handler::ResponseCollector;
    use crate::server::services::testkit::{self, Journal, PASSWORD, USER};
    use parking_lot::Mutex;

    struct Session {
        machine: StateMachine,
        journal: Arc<Mutex<Journal>>,
    }

    impl Session {
        fn new(version: ProtocolVersion) -> Self {
            Self::with_config(version, ServerConfig::default())
        }

        fn with_config(version: ProtocolVersion, config: ServerConfig) -> Self {
            let binding = ProtocolBinding::for_version(version).unwrap();
            let (services, journal) = testkit::services();
            let machine = StateMachine::new(
                &binding,
                Connection::with_id("bolt-test", version),
                Arc::new(config),
                services,
                InterruptHandle::new(),
            );
            Self { machine, journal }
        }

        /// A session already in `ready`.
        fn ready(version: ProtocolVersion) -> Self {
            let mut session = Self::new(version);
            session.login();
            session
        }

        fn login(&mut self) {
            let auth = AuthToken::basic(USER, PASSWORD);
            if version_has_logon(self.machine.version()) {
                self.ok(BoltRequest::Hello(HelloMessage::new("test/1.0")));
                self.ok(BoltRequest::Logon(LogonMessage::new(auth)));
            } else {
                self.ok(BoltRequest::Hello(HelloMessage::new("test/1.0").with_auth(auth)));
            }
            assert_eq!(self.machine.state(), StateReference::READY);
        }

        fn send(&mut self, request: BoltRequest) -> (BoltResult<StateReference>, Vec<BoltResponse>) {
            let mut collector = ResponseCollector::new();
            let result = self.machine.process(request, &mut collector);
            (result, collector.into_responses())
        }

        /// Send and expect a SUCCESS; returns every response.
        fn ok(&mut self, request: BoltRequest) -> Vec<BoltResponse> {
            let name = request.name();
            let (result, responses) = self.send(request);
            assert!(result.is_ok(), "{} failed: {:?}", name, result);
            assert!(
                responses.last().map_or(false, BoltResponse::is_success),
                "{} did not succeed: {:?}",
                name,
                responses
            );
            responses
        }
    }

    fn version_has_logon(version: ProtocolVersion) -> bool {
        version >= ProtocolVersion::V5_1
    }

    fn run(query: &str) -> BoltRequest {
        BoltRequest::Run(RunMessage::new(query))
    }

    fn pull_all() -> BoltRequest {
        BoltRequest::Pull(ResultRequest::all())
    }

    #[test]
    fn test_hello_metadata() {
        let config = ServerConfig::builder()
            .with_server_agent("Zeta4G/9.9")
            .with_recv_timeout_hint(120)
            .with_telemetry(true)
            .build()
            .unwrap();
        let mut session = Session::with_config(ProtocolVersion::V5_4, config);

        let responses = session.ok(BoltRequest::Hello(HelloMessage::new("test/1.0")));
        let success = responses[0].as_success().unwrap();
        assert_eq!(success.server(), Some("Zeta4G/9.9"));
        assert_eq!(success.connection_id(), Some("bolt-test"));
        let hints = success.get("hints").unwrap().as_map().unwrap();
        assert_eq!(hints["connection.recv_timeout_seconds"].as_int(), Some(120));
        assert_eq!(hints["telemetry.enabled"].as_bool(), Some(true));

        assert_eq!(session.machine.state(), StateReference::AUTHENTICATION);
        assert_eq!(session.machine.connection().user_agent(), Some("test/1.0"));
    }

    #[test]
    fn test_hello_authenticates_before_5_1() {
        for version in [ProtocolVersion::V4_3, ProtocolVersion::V4_4, ProtocolVersion::V5_0] {
            let session = Session::ready(version);
            assert_eq!(session.machine.default_state(), StateReference::READY);
            assert_eq!(session.machine.context().login().unwrap().user, USER);
        }
    }

    #[test]
    fn test_logon_and_logoff() {
        let mut session = Session::ready(ProtocolVersion::V5_1);
        assert_eq!(session.machine.default_state(), StateReference::READY);

        session.ok(BoltRequest::Logoff);
        assert_eq!(session.machine.state(), StateReference::AUTHENTICATION);
        assert_eq!(session.machine.default_state(), StateReference::AUTHENTICATION);
        assert!(session.machine.context().login().is_none());

        // RESET returns to the current default, not to READY
        session.ok(BoltRequest::Reset);
        assert_eq!(session.machine.state(), StateReference::AUTHENTICATION);

        session.ok(BoltRequest::Logon(LogonMessage::new(AuthToken::basic(USER, PASSWORD))));
        assert_eq!(session.machine.state(), StateReference::READY);
    }

    #[test]
    fn test_bad_credentials_are_not_fatal() {
        let mut session = Session::new(ProtocolVersion::V5_4);
        session.ok(BoltRequest::Hello(HelloMessage::new("test/1.0")));

        let (result, responses) = session.send(BoltRequest::Logon(LogonMessage::new(
            AuthToken::basic(USER, "wrong"),
        )));
        assert_eq!(result.unwrap(), StateReference::FAILED);
        let failure = responses[0].as_failure().unwrap();
        assert_eq!(failure.code, BoltErrorCode::AUTHENTICATION_FAILED);
        assert!(!session.machine.is_closed());

        session.ok(BoltRequest::Reset);
        assert_eq!(session.machine.state(), StateReference::AUTHENTICATION);
    }

    #[test]
    fn test_run_pull_autocommit() {
        let mut session = Session::ready(ProtocolVersion::V5_4);

        let responses = session.ok(run("ROWS 3"));
        let success = responses[0].as_success().unwrap();
        assert_eq!(success.fields().unwrap(), vec!["n"]);
        assert!(success.get("t_first").is_some());
        assert!(success.qid().is_none());
        assert_eq!(session.machine.state(), StateReference::AUTO_COMMIT);

        let responses = session.ok(pull_all());
        assert_eq!(responses.len(), 4);
        assert!(matches!(&responses[0], BoltResponse::Record(r) if r.fields == vec![0i64.into()]));
        let summary = responses[3].as_success().unwrap();
        assert!(!summary.has_more());
        assert_eq!(summary.bookmark(), Some("FB:1"));
        assert_eq!(summary.db(), Some("zeta4g"));
        assert!(summary.get("t_last").is_some());
        assert_eq!(session.machine.state(), StateReference::READY);

        let journal = session.journal.lock();
        assert_eq!(journal.commits, 1);
        assert!(!journal.begun[0].explicit);
    }

    #[test]
    fn test_pull_in_batches() {
        let mut session = Session::ready(ProtocolVersion::V4_4);
        session.ok(run("ROWS 5"));

        let responses = session.ok(BoltRequest::Pull(ResultRequest::with_n(2)));
        assert_eq!(responses.len(), 3);
        assert!(responses[2].as_success().unwrap().has_more());
        assert_eq!(session.machine.state(), StateReference::AUTO_COMMIT);

        let responses = session.ok(BoltRequest::Discard(ResultRequest::all()));
        assert_eq!(responses.len(), 1);
        assert!(!responses[0].as_success().unwrap().has_more());
        assert_eq!(session.machine.state(), StateReference::READY);
    }

    #[test]
    fn test_write_reports_stats() {
        let mut session = Session::ready(ProtocolVersion::V5_0);
        session.ok(run("WRITE"));
        let responses = session.ok(pull_all());
        let summary = responses.last().unwrap().as_success().unwrap();
        assert_eq!(summary.get("type").unwrap().as_str(), Some("w"));
        let stats = summary.get("stats").unwrap().as_map().unwrap();
        assert_eq!(stats["nodes-created"].as_int(), Some(1));
    }

    #[test]
    fn test_pull_from_ready_is_violation() {
        let mut session = Session::ready(ProtocolVersion::V5_4);
        let (result, responses) = session.send(pull_all());

        let err = result.unwrap_err();
        assert!(matches!(err, BoltError::ProtocolViolation(_)));
        assert!(err.to_string().contains("PULL"));
        assert!(responses[0].is_failure());
        assert!(session.machine.is_closed());
        assert!(matches!(
            session.machine.process(BoltRequest::Reset, &mut ResponseCollector::new()),
            Err(BoltError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_explicit_transaction() {
        let mut session = Session::ready(ProtocolVersion::V5_4);
        let extra = TransactionExtra::default().with_database("movies");
        session.ok(BoltRequest::Begin(BeginMessage::new().with_extra(extra)));
        assert_eq!(session.machine.state(), StateReference::EXPLICIT_TRANSACTION);

        let first = session.ok(run("ROWS 2"));
        assert_eq!(first[0].as_success().unwrap().qid(), Some(0));
        let second = session.ok(run("ROWS 1"));
        assert_eq!(second[0].as_success().unwrap().qid(), Some(1));

        // qid -1 is the latest result
        let responses = session.ok(pull_all());
        assert_eq!(responses.len(), 2);
        let responses = session.ok(BoltRequest::Pull(ResultRequest::all().with_qid(0)));
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[2].as_success().unwrap().db(), Some("movies"));
        assert_eq!(session.machine.state(), StateReference::EXPLICIT_TRANSACTION);

        let responses = session.ok(BoltRequest::Commit);
        assert_eq!(responses[0].as_success().unwrap().bookmark(), Some("FB:1"));
        assert_eq!(session.machine.state(), StateReference::READY);

        let journal = session.journal.lock();
        assert_eq!(journal.commits, 1);
        assert_eq!(journal.begun[0].database, "movies");
        assert!(journal.begun[0].explicit);
    }

    #[test]
    fn test_unknown_qid() {
        let mut session = Session::ready(ProtocolVersion::V5_4);
        session.ok(BoltRequest::Begin(BeginMessage::new()));
        session.ok(run("ROWS 1"));
        let (result, responses) =
            session.send(BoltRequest::Pull(ResultRequest::all().with_qid(7)));
        assert_eq!(result.unwrap(), StateReference::FAILED);
        assert!(responses[0].is_failure());
        assert_eq!(session.journal.lock().rollbacks, 1);
    }

    #[test]
    fn test_commit_outside_transaction() {
        let mut session = Session::ready(ProtocolVersion::V5_4);
        let (result, responses) = session.send(BoltRequest::Commit);
        assert_eq!(result.unwrap(), StateReference::FAILED);
        assert_eq!(
            responses[0].as_failure().unwrap().code,
            BoltErrorCode::REQUEST_INVALID
        );
        assert!(!session.machine.is_closed());
    }

    #[test]
    fn test_nested_begin_is_fatal() {
        let mut session = Session::ready(ProtocolVersion::V5_4);
        session.ok(BoltRequest::Begin(BeginMessage::new()));
        let (result, _) = session.send(BoltRequest::Begin(BeginMessage::new()));
        assert!(matches!(result, Err(BoltError::ProtocolViolation(_))));
        assert!(session.machine.is_closed());
        assert_eq!(session.journal.lock().rollbacks, 1);
    }

    #[test]
    fn test_failure_then_ignored_then_reset() {
        let mut session = Session::ready(ProtocolVersion::V5_4);
        let (result, responses) = session.send(run("FAIL"));
        assert_eq!(result.unwrap(), StateReference::FAILED);
        assert_eq!(
            responses[0].as_failure().unwrap().code,
            BoltErrorCode::SYNTAX_ERROR
        );
        // the implicit transaction is gone
        assert!(!session.machine.context().in_transaction());
        assert_eq!(session.journal.lock().rollbacks, 1);

        let (_, responses) = session.send(pull_all());
        assert_eq!(responses, vec![BoltResponse::Ignored]);

        session.ok(BoltRequest::Reset);
        assert_eq!(session.machine.state(), StateReference::READY);
        session.ok(run("RETURN 1"));
    }

    #[test]
    fn test_stream_failure_rolls_back() {
        let mut session = Session::ready(ProtocolVersion::V5_4);
        session.ok(BoltRequest::Begin(BeginMessage::new()));
        session.ok(run("FAIL_STREAM"));
        let (result, responses) = session.send(pull_all());
        assert_eq!(result.unwrap(), StateReference::FAILED);
        let failure = responses[0].as_failure().unwrap();
        assert!(failure.is_transient());
        assert_eq!(session.journal.lock().rollbacks, 1);
    }

    /// Drive a fresh session into `state`.
    fn session_in(state: StateReference) -> Session {
        let mut s = Session::new(ProtocolVersion::V5_4);
        match state.name() {
            "negotiation" => {}
            "authentication" => {
                s.ok(BoltRequest::Hello(HelloMessage::new("t/1")));
            }
            "ready" => s.login(),
            "auto_commit" => {
                s.login();
                s.ok(run("ROWS 3"));
            }
            "explicit_transaction" => {
                s.login();
                s.ok(BoltRequest::Begin(BeginMessage::new()));
            }
            "failed" => {
                s.login();
                let _ = s.send(run("FAIL"));
            }
            "interrupted" => {
                s.login();
                s.machine.interrupt_handle().interrupt();
                let _ = s.send(run("RETURN 1"));
            }
            other => panic!("no setup for {}", other),
        }
        assert_eq!(s.machine.state(), state);
        s
    }

    #[test]
    fn test_reset_from_every_state() {
        for state in [
            StateReference::NEGOTIATION,
            StateReference::AUTHENTICATION,
            StateReference::READY,
            StateReference::AUTO_COMMIT,
            StateReference::EXPLICIT_TRANSACTION,
            StateReference::FAILED,
            StateReference::INTERRUPTED,
        ] {
            let mut session = session_in(state);
            let default = session.machine.default_state();

            let (result, responses) = session.send(BoltRequest::Reset);
            assert_eq!(result.unwrap(), default, "RESET from {}", state);
            assert_eq!(responses.len(), 1);
            assert!(responses[0].is_success());
            assert!(!session.machine.context().in_transaction());
        }
    }

    #[test]
    fn test_reset_rolls_back_open_transaction() {
        let mut session = Session::ready(ProtocolVersion::V4_4);
        session.ok(BoltRequest::Begin(BeginMessage::new()));
        session.ok(run("ROWS 10"));
        session.ok(BoltRequest::Reset);

        let journal = session.journal.lock();
        assert_eq!(journal.rollbacks, 1);
        assert_eq!(journal.commits, 0);
    }

    #[test]
    fn test_interrupt_ignores_until_last_reset() {
        let mut session = Session::ready(ProtocolVersion::V5_4);
        session.ok(run("ROWS 3"));

        // two RESETs are queued behind a PULL
        let interrupt = session.machine.interrupt_handle().clone();
        interrupt.interrupt();
        interrupt.interrupt();

        let (_, responses) = session.send(pull_all());
        assert_eq!(responses, vec![BoltResponse::Ignored]);
        assert_eq!(session.machine.state(), StateReference::INTERRUPTED);

        let (_, responses) = session.send(BoltRequest::Reset);
        assert_eq!(responses, vec![BoltResponse::Ignored]);
        assert_eq!(session.machine.state(), StateReference::INTERRUPTED);

        let (result, responses) = session.send(BoltRequest::Reset);
        assert_eq!(result.unwrap(), StateReference::READY);
        assert!(responses[0].is_success());
        assert!(!interrupt.is_interrupted());
        assert_eq!(session.journal.lock().rollbacks, 1);
    }

    #[test]
    fn test_goodbye_closes_and_rolls_back() {
        let mut session = Session::ready(ProtocolVersion::V5_4);
        session.ok(BoltRequest::Begin(BeginMessage::new()));
        let (result, responses) = session.send(BoltRequest::Goodbye);
        assert!(result.is_ok());
        assert!(responses.is_empty());
        assert!(session.machine.is_closed());
        assert_eq!(session.journal.lock().rollbacks, 1);
    }

    #[test]
    fn test_route() {
        let mut session = Session::ready(ProtocolVersion::V4_4);
        let responses = session.ok(BoltRequest::Route(RouteMessage::new().with_database("movies")));
        let rt = responses[0].as_success().unwrap().get("rt").unwrap().as_map().unwrap();
        assert_eq!(rt["db"].as_str(), Some("movies"));
        assert_eq!(rt["ttl"].as_int(), Some(300));
        assert_eq!(rt["servers"].as_list().unwrap().len(), 3);

        let (result, responses) =
            session.send(BoltRequest::Route(RouteMessage::new().with_database("missing")));
        assert_eq!(result.unwrap(), StateReference::FAILED);
        assert!(responses[0].is_failure());
    }

    #[test]
    fn test_route_impersonation_by_version() {
        let request = BoltRequest::Route(RouteMessage::new().with_imp_user("alice"));

        let mut v44 = Session::ready(ProtocolVersion::V4_4);
        let responses = v44.ok(request.clone());
        let rt = responses[0].as_success().unwrap().get("rt").unwrap().as_map().unwrap();
        let servers = format!("{:?}", rt["servers"]);
        assert!(servers.contains("alice.replica"));

        let mut v43 = Session::ready(ProtocolVersion::V4_3);
        let responses = v43.ok(request);
        let rt = responses[0].as_success().unwrap().get("rt").unwrap().as_map().unwrap();
        assert!(!format!("{:?}", rt["servers"]).contains("alice"));
    }

    #[test]
    fn test_impersonated_run() {
        let mut session = Session::ready(ProtocolVersion::V5_0);
        let extra = TransactionExtra::default().with_imp_user("alice");
        session.ok(BoltRequest::Run(RunMessage::new("RETURN 1").with_extra(extra)));
        assert_eq!(session.machine.context().impersonated().unwrap().user, "alice");
        session.ok(pull_all());
        // the slot only lives as long as the autocommit result
        assert!(session.machine.context().impersonated().is_none());

        let login = session.journal.lock().begun[0].login.clone().unwrap();
        assert_eq!(login.user, "alice");
        assert_eq!(login.authenticated_user(), USER);
    }

    #[test]
    fn test_impersonation_rejected() {
        let mut session = Session::ready(ProtocolVersion::V5_4);
        let extra = TransactionExtra::default().with_imp_user("forbidden");
        let (result, responses) =
            session.send(BoltRequest::Begin(BeginMessage::new().with_extra(extra)));
        assert_eq!(result.unwrap(), StateReference::FAILED);
        assert_eq!(
            responses[0].as_failure().unwrap().code,
            BoltErrorCode::AUTHENTICATION_FAILED
        );
        assert!(session.journal.lock().begun.is_empty());
    }

    #[test]
    fn test_imp_user_ignored_on_4_3() {
        let mut session = Session::ready(ProtocolVersion::V4_3);
        let extra = TransactionExtra::default().with_imp_user("forbidden");
        session.ok(BoltRequest::Run(RunMessage::new("RETURN 1").with_extra(extra)));
        assert!(session.machine.context().impersonated().is_none());
    }

    #[test]
    fn test_telemetry_only_on_5_4() {
        let telemetry = BoltRequest::Telemetry(TelemetryMessage {
            api: TelemetryApi::from_i64(1).unwrap(),
        });
        let mut v54 = Session::ready(ProtocolVersion::V5_4);
        v54.ok(telemetry.clone());
        assert_eq!(v54.machine.state(), StateReference::READY);

        let mut v53 = Session::ready(ProtocolVersion::V5_3);
        let (result, _) = v53.send(telemetry);
        assert!(result.is_err());
    }

    #[test]
    fn test_memory_limit_is_transient() {
        let config = ServerConfig::builder()
            .with_connection_memory_limit(2048)
            .build()
            .unwrap();
        let mut session = Session::with_config(ProtocolVersion::V5_4, config);
        session.login();

        let query = "x".repeat(4096);
        let (result, responses) = session.send(run(&query));
        assert_eq!(result.unwrap(), StateReference::FAILED);
        let failure = responses[0].as_failure().unwrap();
        assert_eq!(failure.code, BoltErrorCode::RESOURCE_EXHAUSTED);
        assert!(failure.is_transient());
        assert_eq!(session.machine.context().memory().used(), 0);

        session.ok(BoltRequest::Reset);
        session.ok(run("RETURN 1"));
    }

    #[test]
    fn test_reject_moves_to_failed() {
        let mut session = Session::ready(ProtocolVersion::V5_4);
        let rejection = crate::server::admission::AdmissionController::new(1, None);
        let _held = rejection.try_admit(0).unwrap();
        let refused = rejection.try_admit(0).unwrap_err();

        let mut collector = ResponseCollector::new();
        assert_eq!(
            session.machine.reject(refused.clone(), &mut collector),
            StateReference::FAILED
        );
        let failure = collector.responses()[0].as_failure().unwrap();
        assert!(failure.is_transient());
        assert!(!session.machine.is_closed());

        // already failed: the next refusal is just ignored
        let mut collector = ResponseCollector::new();
        session.machine.reject(refused, &mut collector);
        assert!(collector.responses()[0].is_ignored());
    }

    #[test]
    fn test_reject_with_pending_reset_is_ignored() {
        let mut session = Session::ready(ProtocolVersion::V5_0);
        let admission = crate::server::admission::AdmissionController::new(1, None);
        let _held = admission.try_admit(0).unwrap();
        let refused = admission.try_admit(0).unwrap_err();

        session.machine.interrupt_handle().interrupt();
        let mut collector = ResponseCollector::new();
        assert_eq!(
            session.machine.reject(refused, &mut collector),
            StateReference::INTERRUPTED
        );
        assert_eq!(collector.responses(), &[BoltResponse::Ignored][..]);

        // the queued RESET still lands on the default state
        let (result, responses) = session.send(BoltRequest::Reset);
        assert_eq!(result.unwrap(), StateReference::READY);
        assert!(responses[0].is_success());
    }

    #[test]
    fn test_unknown_tag_does_not_advance() {
        let mut session = Session::ready(ProtocolVersion::V5_4);
        session.ok(run("ROWS 2"));

        let registry = StructRegistry::for_version(ProtocolVersion::V5_4).unwrap();
        let bytes = encode_structure(&crate::bolt::packstream::PackStreamStructure::new(
            0x55,
            vec![],
        ))
        .unwrap();
        let err = registry.decode(&bytes, 64).unwrap_err();
        assert!(matches!(err, BoltError::ProtocolViolation(_)));

        // decoding never reached the machine
        assert_eq!(session.machine.state(), StateReference::AUTO_COMMIT);
        assert!(!session.machine.is_closed());
    }
}
