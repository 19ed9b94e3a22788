//! Connection handling
//!
//! Takes one socket through its whole life: handshake, message decoding,
//! state machine execution and response writing.
//!
//! ```text
//! socket ──▶ reader task ──(mpsc)──▶ worker ──▶ StateMachine ──▶ FramedWrite
//!              │   ▲                   │
//!              │   └── InboundThrottle ◀┘ end_job
//!              └── RESET ─▶ InterruptHandle
//! ```

use std::io;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::bolt::handshake::Handshake;
use crate::bolt::message::{BoltRequest, BoltResponse, RequestKind};
use crate::bolt::{BoltError, BoltResult, BoltServerCodec, HANDSHAKE_SIZE};

use super::admission::AdmissionController;
use super::config::ServerConfig;
use super::connection::Connection;
use super::fsm::{StateMachine, StateReference};
use super::handler::ResponseCollector;
use super::interrupt::InterruptHandle;
use super::protocol::{ProtocolBinding, ProtocolTable};
use super::services::BoltServices;
use super::throttle::InboundThrottle;

type Inbound = mpsc::UnboundedReceiver<BoltResult<BoltRequest>>;

// ============================================================================
// BoltConnector
// ============================================================================

/// Bolt connection handler
///
/// Every connection shares the config, protocol table, services and admission controller.
#[derive(Debug, Clone)]
pub struct BoltConnector {
    config: Arc<ServerConfig>,
    protocols: Arc<ProtocolTable>,
    services: BoltServices,
    admission: AdmissionController,
}

impl BoltConnector {
    /// Create a connection handler
    ///
    /// Returns a `Configuration` error if the config is invalid.
    pub fn new(config: ServerConfig, services: BoltServices) -> BoltResult<Self> {
        config.validate()?;
        let protocols = ProtocolTable::new(&config.supported_versions)?;
        let admission = AdmissionController::from_config(&config);
        Ok(Self {
            config: Arc::new(config),
            protocols: Arc::new(protocols),
            services,
            admission,
        })
    }

    /// Server config
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Protocol table
    pub fn protocols(&self) -> &ProtocolTable {
        &self.protocols
    }

    /// Admission controller
    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Accept connections from the listener, each on its own task
    pub async fn listen(self, listener: TcpListener) -> BoltResult<()> {
        info!(address = ?listener.local_addr().ok(), "Bolt connector listening");
        loop {
            let (socket, peer) = listener.accept().await?;
            let _ = socket.set_nodelay(true);
            let connector = self.clone();
            tokio::spawn(async move {
                if let Err(e) = connector.serve(socket).await {
                    debug!(peer = %peer, error = %e, "Connection ended with error");
                }
            });
        }
    }

    /// Serve one connection to the end
    ///
    /// GOODBYE or a client hang-up ends in `Ok`; handshake failures and fatal
    /// errors end in `Err`. Either way, any open transaction is rolled back.
    pub async fn serve<S>(&self, mut stream: S) -> BoltResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let binding = self.handshake(&mut stream).await?;
        let connection = Connection::new(binding.version());
        let connection_id = connection.id().to_string();
        let started = connection.connected_at();
        info!(
            connection_id = %connection_id,
            version = %binding.version(),
            "Bolt connection opened"
        );

        let throttle = Arc::new(InboundThrottle::new(
            self.config.inbound_high_watermark,
            self.config.inbound_low_watermark,
        )?);
        let interrupt = InterruptHandle::new();
        let machine = StateMachine::new(
            &binding,
            connection,
            Arc::clone(&self.config),
            self.services.clone(),
            interrupt.clone(),
        );

        let (read_half, write_half) = tokio::io::split(stream);
        let frames = FramedRead::new(read_half, self.server_codec(&binding));
        let mut sink = FramedWrite::new(write_half, self.server_codec(&binding));
        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_requests(
            frames,
            Arc::clone(&throttle),
            interrupt,
            tx,
        ));

        let outcome = self.drive(machine, rx, &mut sink, &throttle).await;

        throttle.close();
        reader.abort();
        let _ = sink.get_mut().shutdown().await;
        info!(
            connection_id = %connection_id,
            duration_ms = (chrono::Utc::now() - started).num_milliseconds(),
            suspensions = throttle.suspensions(),
            "Bolt connection closed"
        );
        outcome
    }

    fn server_codec(&self, binding: &ProtocolBinding) -> BoltServerCodec {
        BoltServerCodec::new(Arc::clone(binding.registry()))
            .with_max_message_size(self.config.max_message_size)
            .with_max_depth(self.config.max_nesting_depth)
    }

    /// Read the 20-byte preamble and negotiate a version
    async fn handshake<S>(&self, stream: &mut S) -> BoltResult<Arc<ProtocolBinding>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut preamble = [0u8; HANDSHAKE_SIZE];
        if let Err(e) = stream.read_exact(&mut preamble).await {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                return Err(crate::bolt::HandshakeError::ConnectionClosed.into());
            }
            return Err(e.into());
        }

        let result = self.protocols.negotiate(&preamble);
        let result = match result {
            Ok(negotiated) => self.protocols.bind(&negotiated).map(|binding| (negotiated, binding)),
            Err(e) => Err(e),
        };
        match result {
            Ok((negotiated, binding)) => {
                stream
                    .write_all(&Handshake::generate_response(&Ok(negotiated)))
                    .await?;
                stream.flush().await?;
                Ok(binding)
            }
            Err(e @ crate::bolt::HandshakeError::InvalidMagic { .. }) => {
                // not a Bolt client, no reply at all
                warn!(error = %e, "Rejected connection");
                let _ = stream.shutdown().await;
                Err(e.into())
            }
            Err(e) => {
                warn!(error = %e, "Version negotiation failed");
                let reply = Handshake::generate_response(&Err(e.clone()));
                stream.write_all(&reply).await?;
                let _ = stream.shutdown().await;
                Err(e.into())
            }
        }
    }

    /// Run requests in order and write their responses
    async fn drive<W>(
        &self,
        mut machine: StateMachine,
        mut inbound: Inbound,
        sink: &mut FramedWrite<WriteHalf<W>, BoltServerCodec>,
        throttle: &InboundThrottle,
    ) -> BoltResult<()>
    where
        W: AsyncWrite + Send + 'static,
    {
        let outcome = loop {
            let request = match inbound.recv().await {
                Some(Ok(request)) => request,
                Some(Err(e)) => {
                    // framing or decoding failed: the stream cannot be resynchronized
                    warn!(
                        connection_id = %machine.connection().id(),
                        error = %e,
                        "Undecodable message, closing connection"
                    );
                    let _ = write_responses(sink, vec![BoltResponse::Failure(e.to_failure())]).await;
                    break Err(e);
                }
                None => break Ok(()),
            };

            let kind = request.kind();
            let permit = match kind {
                RequestKind::Reset | RequestKind::Goodbye => None,
                _ => match self.admission.try_admit(request.estimated_size()) {
                    Ok(permit) => Some(permit),
                    Err(rejection) => {
                        let mut collector = ResponseCollector::new();
                        machine.reject(rejection, &mut collector);
                        throttle.end_job();
                        if let Err(e) = write_responses(sink, collector.into_responses()).await {
                            break Err(e);
                        }
                        continue;
                    }
                },
            };

            let (returned, responses, result) = execute(machine, request).await?;
            machine = returned;
            drop(permit);
            throttle.end_job();

            if let Err(e) = write_responses(sink, responses).await {
                break Err(e);
            }
            match result {
                Err(e) => break Err(e),
                Ok(_) if machine.is_closed() => break Ok(()),
                Ok(state) if state == StateReference::FAILED => {
                    debug!(connection_id = %machine.connection().id(), message = kind.name(), "Request failed");
                }
                Ok(_) => {}
            }
        };

        machine.close();
        outcome
    }
}

/// Serve one connection with shared components
///
/// Same as [`BoltConnector::serve`], but takes an already built table and
/// controller.
pub async fn serve_connection<S>(
    stream: S,
    config: Arc<ServerConfig>,
    protocols: Arc<ProtocolTable>,
    services: BoltServices,
    admission: AdmissionController,
) -> BoltResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let connector = BoltConnector {
        config,
        protocols,
        services,
        admission,
    };
    connector.serve(stream).await
}

/// Run a blocking service call off the runtime
async fn execute(
    mut machine: StateMachine,
    request: BoltRequest,
) -> BoltResult<(StateMachine, Vec<BoltResponse>, BoltResult<StateReference>)> {
    tokio::task::spawn_blocking(move || {
        let mut collector = ResponseCollector::new();
        let result = machine.process(request, &mut collector);
        (machine, collector.into_responses(), result)
    })
    .await
    .map_err(|e| BoltError::Io(io::Error::new(io::ErrorKind::Other, e)))
}

async fn write_responses<W>(
    sink: &mut FramedWrite<WriteHalf<W>, BoltServerCodec>,
    responses: Vec<BoltResponse>,
) -> BoltResult<()>
where
    W: AsyncWrite,
{
    for response in responses {
        sink.feed(response).await?;
    }
    sink.flush().await
}

/// Read requests from the socket and hand them to the worker queue
///
/// Reading stops while the throttle is suspended. RESET raises the interrupt
/// before it is queued so a running job stops at its next safe point.
async fn read_requests<R>(
    mut frames: FramedRead<ReadHalf<R>, BoltServerCodec>,
    throttle: Arc<InboundThrottle>,
    interrupt: InterruptHandle,
    queue: mpsc::UnboundedSender<BoltResult<BoltRequest>>,
) where
    R: AsyncRead,
{
    loop {
        throttle.wait_until_readable().await;
        match frames.next().await {
            Some(Ok(request)) => {
                if request.kind() == RequestKind::Reset {
                    interrupt.interrupt();
                }
                throttle.begin_job();
                if queue.send(Ok(request)).is_err() {
                    break;
                }
            }
            Some(Err(e)) => {
                let _ = queue.send(Err(e));
                break;
            }
            None => break,
        }
    }
}
