//! The RTR server.
//!
//! [`Server`] listens on a stream of incoming connections and runs one
//! task per client. The data served comes from a type implementing
//! [`PayloadSource`] – in practice the shared payload history. Update
//! notifications reach the connection tasks through a broadcast
//! channel: keep the [`NotifySender`] and call
//! [`notify`][NotifySender::notify] whenever a new serial has been
//! committed; delivery to each client is best effort.

use std::io;
use std::time::Duration;
use futures_util::future;
use futures_util::pin_mut;
use futures_util::future::Either;
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio::task::spawn;
use tokio_stream::{Stream, StreamExt};
use crate::payload::{Action, Payload};
use crate::rtr::pdu;
use crate::rtr::pdu::{err_code, pdu_type};
use crate::rtr::state::State;


//============ Traits ========================================================

//------------ PayloadSource et al. ------------------------------------------

/// A source of payload for an RTR server.
///
/// The server needs four things from its source: the current state for
/// serial notifies, an iterator over the full payload set, an iterator
/// over the difference between a given state and the current state, and
/// the timing values for End of Data. None of these are asked for
/// before [`ready`][Self::ready] returns `true`, giving the source
/// time to finish its initial validation.
pub trait PayloadSource: Clone + Sync + Send + 'static {
    /// An iterator over the complete payload set.
    type Set: PayloadSet;

    /// An iterator over a difference between payload sets.
    type Diff: PayloadDiff;

    /// Returns whether the source is ready to serve data.
    fn ready(&self) -> bool;

    /// Returns the current state of the source.
    fn notify(&self) -> State;

    /// Returns the current state and the full payload set.
    fn full(&self) -> (State, Self::Set);

    /// Returns the current state and the diff from `state` to it.
    ///
    /// Returns `None` if the source cannot provide that diff, e.g.
    /// because the serial has fallen out of history.
    fn diff(&self, state: State) -> Option<(State, Self::Diff)>;

    /// Returns the timing information for the current state.
    fn timing(&self) -> Timing;
}

/// A type providing access to a complete payload set.
pub trait PayloadSet: Sync + Send + 'static {
    /// Returns the next element of the payload set.
    fn next(&mut self) -> Option<&Payload>;
}

/// A type providing access to a diff between payload sets.
pub trait PayloadDiff: Sync + Send + 'static {
    /// Returns the next element of the diff.
    fn next(&mut self) -> Option<(&Payload, Action)>;
}


//------------ Timing --------------------------------------------------------

/// The timing parameters of a data exchange.
///
/// These are included in the End of Data PDU of protocol version 1.
#[derive(Clone, Copy, Debug)]
pub struct Timing {
    /// Seconds until a client should refresh its data.
    pub refresh: u32,

    /// Seconds a client should wait before retrying to connect.
    pub retry: u32,

    /// Seconds before unrefreshed data expires.
    pub expire: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            refresh: 3600,
            retry: 600,
            expire: 7200,
        }
    }
}


//------------ Server --------------------------------------------------------

/// An RTR server.
///
/// The server takes a stream of new connections, a notify sender whose
/// subscriptions wake the connection tasks, and a payload source.
pub struct Server<Listener, Source> {
    /// The listener socket.
    listener: Listener,

    /// The sender for notifications.
    ///
    /// Kept here to fabricate new receivers for new connections.
    notify: NotifySender,

    /// The source of payload.
    source: Source,

    /// How long to wait for client activity before hanging up.
    timeout: Duration,
}

impl<Listener, Source> Server<Listener, Source> {
    /// Creates a new RTR server from its components.
    pub fn new(
        listener: Listener,
        notify: NotifySender,
        source: Source,
        timeout: Duration,
    ) -> Self {
        Server { listener, notify, source, timeout }
    }

    /// Runs the server.
    ///
    /// Returns successfully when the listener stream finishes and with
    /// an error if it errors out.
    pub async fn run<Sock>(mut self) -> Result<(), io::Error>
    where
        Listener: Stream<Item = Result<Sock, io::Error>> + Unpin,
        Sock: AsyncRead + AsyncWrite + Unpin + Sync + Send + 'static,
        Source: PayloadSource,
    {
        while let Some(sock) = self.listener.next().await {
            let _ = spawn(
                Connection::new(
                    sock?,
                    self.notify.subscribe(),
                    self.source.clone(),
                    self.timeout,
                ).run()
            );
        }
        Ok(())
    }
}


//------------ Connection ----------------------------------------------------

/// A single server connection.
struct Connection<Sock, Source> {
    /// The socket the connection runs on.
    sock: Sock,

    /// The receiver for update notifications.
    notify: NotifyReceiver,

    /// The payload source.
    source: Source,

    /// The RTR protocol version of this connection.
    ///
    /// This is `None` before the client’s first PDU.
    version: Option<u8>,

    /// How long to wait for client activity before hanging up.
    timeout: Duration,
}

impl<Sock, Source> Connection<Sock, Source> {
    fn new(
        sock: Sock,
        notify: NotifyReceiver,
        source: Source,
        timeout: Duration,
    ) -> Self {
        Connection { sock, notify, source, version: None, timeout }
    }

    /// Returns the protocol version agreed on.
    ///
    /// Before negotiation this is the lowest version we support.
    fn version(&self) -> u8 {
        self.version.unwrap_or(0)
    }
}

/// # High-level operation
///
impl<Sock, Source> Connection<Sock, Source>
where
    Sock: AsyncRead + AsyncWrite + Unpin,
    Source: PayloadSource,
{
    /// Runs the connection until it is done.
    ///
    /// Returns successfully if the connection was closed cleanly and
    /// with an error otherwise. The error is only used for question
    /// mark convenience; nobody looks at it.
    async fn run(mut self) -> Result<(), io::Error> {
        while let Some(query) = self.recv().await? {
            match query {
                Query::Serial(state) => self.serial(state).await?,
                Query::Reset => self.reset().await?,
                Query::Error(err) => {
                    self.error(err).await?;
                    return Ok(())
                }
                Query::Notify => self.notify().await?,
            }
        }
        Ok(())
    }
}

/// # Receiving
///
impl<Sock, Source> Connection<Sock, Source>
where Sock: AsyncRead + Unpin {
    /// Receives the next query.
    ///
    /// This is either a query PDU from the client or a notification
    /// that the source has new data. Waiting is bounded by the idle
    /// timeout; its expiry closes the session without an error report.
    async fn recv(&mut self) -> Result<Option<Query>, io::Error> {
        let header = {
            let notify = self.notify.recv();
            let header = pdu::Header::read(&mut self.sock);
            pin_mut!(notify);
            pin_mut!(header);
            let select = future::select(notify, header);
            match tokio::time::timeout(self.timeout, select).await {
                Err(_) => {
                    debug!("RTR: closing idle connection");
                    return Ok(None)
                }
                Ok(Either::Left(_)) => return Ok(Some(Query::Notify)),
                Ok(Either::Right((Ok(header), _))) => header,
                Ok(Either::Right((Err(err), _))) => {
                    if err.kind() == io::ErrorKind::UnexpectedEof {
                        return Ok(None)
                    }
                    return Err(err)
                }
            }
        };
        if let Err(err) = self.check_version(header) {
            return Ok(Some(err))
        }
        if header.length() > pdu::MAX_PDU_SIZE {
            return Ok(Some(Query::Error(pdu::Error::new(
                header.version(),
                err_code::CORRUPT_DATA,
                header.to_bytes(),
                "PDU too large",
            ))))
        }
        match header.pdu() {
            pdu_type::SERIAL_QUERY => {
                debug!("RTR: got serial query");
                if header.length() != pdu::SerialQuery::SIZE {
                    debug!("RTR: ... with bad length");
                    return Ok(Some(Self::invalid_length(header)))
                }
                let payload
                    = pdu::SerialQueryPayload::read(&mut self.sock).await?;
                Ok(Some(Query::Serial(State::from_parts(
                    header.session(), payload.serial()
                ))))
            }
            pdu_type::RESET_QUERY => {
                debug!("RTR: got reset query");
                if header.length() != pdu::ResetQuery::SIZE {
                    debug!("RTR: ... with bad length");
                    return Ok(Some(Self::invalid_length(header)))
                }
                Ok(Some(Query::Reset))
            }
            pdu_type::ERROR_REPORT => {
                debug!("RTR: got error report, closing");
                Err(io::Error::other("got error PDU"))
            }
            pdu => {
                debug!("RTR: got PDU of unexpected type {}", pdu);
                Ok(Some(Query::Error(
                    pdu::Error::new(
                        header.version(),
                        err_code::UNSUPPORTED_PDU_TYPE,
                        header.to_bytes(),
                        "expected Serial Query or Reset Query"
                    )
                )))
            }
        }
    }

    /// Checks the version of a received PDU.
    ///
    /// The client’s first PDU selects the version for the session; we
    /// accept what we speak. Later PDUs must stick to it.
    fn check_version(
        &mut self,
        header: pdu::Header
    ) -> Result<(), Query> {
        if let Some(current) = self.version {
            if current != header.version() {
                Err(Query::Error(
                    pdu::Error::new(
                        header.version(),
                        err_code::UNSUPPORTED_PROTOCOL_VERSION,
                        header.to_bytes(),
                        "version switched during connection"
                    )
                ))
            }
            else {
                Ok(())
            }
        }
        else if header.version() > pdu::MAX_VERSION {
            Err(Query::Error(
                pdu::Error::new(
                    header.version(),
                    err_code::UNSUPPORTED_PROTOCOL_VERSION,
                    header.to_bytes(),
                    "only versions 0 and 1 supported"
                )
            ))
        }
        else {
            self.version = Some(header.version());
            Ok(())
        }
    }

    fn invalid_length(header: pdu::Header) -> Query {
        Query::Error(pdu::Error::new(
            header.version(),
            err_code::INVALID_REQUEST,
            header.to_bytes(),
            "invalid length"
        ))
    }
}

/// # Sending
///
impl<Sock, Source> Connection<Sock, Source>
where
    Sock: AsyncRead + AsyncWrite + Unpin,
    Source: PayloadSource,
{
    /// Responds to a serial query.
    async fn serial(&mut self, state: State) -> Result<(), io::Error> {
        debug!("RTR: request for serial {}", state.serial());
        if !self.source.ready() {
            return pdu::Error::new(
                self.version(),
                err_code::NO_DATA_AVAILABLE,
                b"",
                b"running initial validation",
            ).write(&mut self.sock).await;
        }
        match self.source.diff(state) {
            Some((state, mut diff)) => {
                debug!("RTR: source has a diff");
                pdu::CacheResponse::new(
                    self.version(), state
                ).write(&mut self.sock).await?;
                while let Some((payload, action)) = diff.next() {
                    if let Some(pdu) = pdu::PayloadPdu::new(
                        self.version(), action.into_flags(), payload
                    ) {
                        pdu.write(&mut self.sock).await?;
                    }
                }
                let timing = self.source.timing();
                pdu::EndOfData::new(
                    self.version(), state, timing
                ).write(&mut self.sock).await?;
                self.sock.flush().await
            }
            None => {
                debug!("RTR: no diff for that serial, sending reset");
                pdu::CacheReset::new(self.version()).write(
                    &mut self.sock
                ).await
            }
        }
    }

    /// Responds to a reset query.
    async fn reset(&mut self) -> Result<(), io::Error> {
        if !self.source.ready() {
            return pdu::Error::new(
                self.version(),
                err_code::NO_DATA_AVAILABLE,
                b"",
                b"running initial validation",
            ).write(&mut self.sock).await;
        }
        let (state, mut iter) = self.source.full();
        pdu::CacheResponse::new(
            self.version(), state
        ).write(&mut self.sock).await?;
        while let Some(payload) = iter.next() {
            if let Some(pdu) = pdu::PayloadPdu::new(
                self.version(), Action::Announce.into_flags(), payload
            ) {
                pdu.write(&mut self.sock).await?;
            }
        }
        let timing = self.source.timing();
        pdu::EndOfData::new(
            self.version(), state, timing
        ).write(&mut self.sock).await?;
        self.sock.flush().await
    }

    /// Sends an error response.
    async fn error(
        &mut self, err: pdu::Error
    ) -> Result<(), io::Error> {
        err.write(&mut self.sock).await?;
        self.sock.flush().await
    }

    /// Sends a serial notify.
    async fn notify(&mut self) -> Result<(), io::Error> {
        let state = self.source.notify();
        pdu::SerialNotify::new(
            self.version(), state
        ).write(&mut self.sock).await
    }
}


//------------ Query ---------------------------------------------------------

/// What a connection was asked to do next.
enum Query {
    /// A serial query with the given state was received.
    Serial(State),

    /// A reset query was received.
    Reset,

    /// The client misbehaved; send this error and close.
    Error(pdu::Error),

    /// The source has new data available.
    Notify,
}


//------------ NotifySender --------------------------------------------------

/// A sender to notify connections of new data.
#[derive(Clone, Debug)]
pub struct NotifySender(broadcast::Sender<()>);

impl NotifySender {
    /// Creates a new notify sender.
    pub fn new() -> NotifySender {
        NotifySender(broadcast::channel(1).0)
    }

    /// Notifies all connections that there are updates available.
    ///
    /// Delivery is best effort: connections that went away are simply
    /// skipped.
    pub fn notify(&self) {
        // Sending only fails if all receivers are gone, which is fine.
        let _ = self.0.send(());
    }

    fn subscribe(&self) -> NotifyReceiver {
        NotifyReceiver(Some(self.0.subscribe()))
    }
}

impl Default for NotifySender {
    fn default() -> Self {
        Self::new()
    }
}


//------------ NotifyReceiver ------------------------------------------------

/// The per-connection receiver for notifications.
#[derive(Debug)]
struct NotifyReceiver(Option<broadcast::Receiver<()>>);

impl NotifyReceiver {
    pub async fn recv(&mut self) {
        use tokio::sync::broadcast::error::{RecvError, TryRecvError};

        if let Some(ref mut rx) = self.0 {
            match rx.recv().await {
                Ok(()) => return,
                Err(RecvError::Lagged(_)) => {
                    // Missed notifications collapse into one; drain
                    // the latest value and report.
                    if let Err(TryRecvError::Closed) = rx.try_recv() {
                    }
                    else {
                        return
                    }
                }
                Err(RecvError::Closed) => { }
            }
        }
        self.0 = None;
        future::pending().await
    }
}
