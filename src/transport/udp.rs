//! UDP transport for probe datagrams.
//!
//! [`UdpTransport`] moves whole packets over a tokio socket, attaching the
//! observed sender and the socket's own address to every decoded packet.
//! [`Reflector`] is the server loop that timestamps and answers probes;
//! [`probe`] and [`send_data`] are the client side of one round trip, and
//! [`probe_series`] repeats probes to build a measurement log.
//!
//! Nothing here retries. A lost probe surfaces as `ProtocolError::Timeout`,
//! a datagram that does not decode is counted and dropped.

use crate::config::{ClientConfig, ServerConfig};
use crate::core::decoder::decode;
use crate::core::encoder::encode;
use crate::core::packet::{DataFields, Packet};
use crate::core::packet_type::PacketType;
use crate::core::report::Report;
use crate::error::{constants, ProtocolError, Result};
use crate::utils::metrics::{global_metrics, init_metrics, Metrics};
use crate::utils::time::Clock;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, instrument, warn};

/// One byte more than the largest valid payload so that oversized datagrams
/// show up with a wrong length instead of being silently truncated to a valid
/// one.
const RECV_BUFFER_SIZE: usize = PacketType::Long.size() + 1;

/// A bound UDP socket speaking the probe wire format.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    metrics: Arc<Metrics>,
    /// Reused by every receive; held across the await so concurrent
    /// receivers take turns.
    recv_buf: Mutex<Box<[u8]>>,
}

impl UdpTransport {
    /// Bind a socket to `addr`.
    #[instrument]
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        debug!(%local_addr, "Bound probe socket");
        Ok(Self {
            socket,
            local_addr,
            metrics: Arc::new(Metrics::new()),
            recv_buf: Mutex::new(vec![0u8; RECV_BUFFER_SIZE].into_boxed_slice()),
        })
    }

    /// Report into a shared metrics collector instead of a private one.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Encode `packet` and send it to `packet.to()`.
    ///
    /// # Errors
    /// Returns `ProtocolError::EncodingOverflow` for oversized data packets,
    /// `ProtocolError::TransportError` if the datagram went out truncated and
    /// `ProtocolError::Io` for other socket failures.
    pub async fn send(&self, packet: &Packet) -> Result<()> {
        let payload = encode(packet).inspect_err(|e| {
            if matches!(e, ProtocolError::EncodingOverflow { .. }) {
                self.metrics.encoding_overflow();
            }
        })?;
        let sent = self.socket.send_to(&payload, packet.to()).await?;
        if sent != payload.len() {
            return Err(ProtocolError::TransportError(format!(
                "{} ({sent} of {} bytes)",
                constants::ERR_SHORT_WRITE,
                payload.len()
            )));
        }
        self.metrics.datagram_sent(sent as u64);
        debug!(to = %packet.to(), bytes = sent, kind = %packet.packet_type(), "Sent datagram");
        Ok(())
    }

    /// Wait for the next datagram and decode it.
    ///
    /// # Errors
    /// Returns `ProtocolError::MalformedPacket` for a datagram that does not
    /// decode; the caller should drop it and keep receiving.
    pub async fn recv(&self) -> Result<Packet> {
        let mut buf = self.recv_buf.lock().await;
        let (len, from) = self.socket.recv_from(&mut buf[..]).await?;
        self.metrics.datagram_received(len as u64);

        decode(&buf[..len], from, self.local_addr).inspect_err(|e| {
            if e.is_malformed() {
                self.metrics.malformed_datagram();
                warn!(%from, bytes = len, error = %e, "Dropping malformed datagram");
            }
        })
    }
}

/// Server side of the protocol: stamps every probe with reception and send
/// times and returns it to its sender.
///
/// Data packets are authenticated on arrival. Those that verify are handed to
/// the ingestion channel, if one is attached; the reply to a data packet is a
/// plain LONG probe.
pub struct Reflector {
    transport: UdpTransport,
    clock: Arc<dyn Clock>,
    data_tx: Option<mpsc::Sender<Packet>>,
}

impl Reflector {
    pub fn new(transport: UdpTransport, clock: Arc<dyn Clock>) -> Self {
        Self {
            transport,
            clock,
            data_tx: None,
        }
    }

    /// Forward verified data packets to `data_tx`.
    pub fn with_data_channel(mut self, data_tx: mpsc::Sender<Packet>) -> Self {
        self.data_tx = Some(data_tx);
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        self.transport.metrics()
    }

    /// Serve until `shutdown_rx` yields or its sender is dropped.
    ///
    /// # Errors
    /// Returns the underlying error if the socket fails; decode and
    /// per-datagram send failures are logged and skipped.
    #[instrument(skip(self, shutdown_rx), fields(local_addr = %self.transport.local_addr()))]
    pub async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        info!("Reflector listening");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutting down reflector");
                    break;
                }

                received = self.transport.recv() => {
                    match received {
                        Ok(packet) => {
                            if let Err(e) = self.reflect(packet).await {
                                warn!(error = %e, "Failed to answer probe");
                            }
                        }
                        Err(e) if e.is_malformed() => {}
                        Err(e) if is_peer_unreachable(&e) => {
                            warn!(error = %e, "Previous peer unreachable, continuing");
                        }
                        Err(e) => {
                            error!(error = %e, "Socket error, stopping reflector");
                            return Err(e);
                        }
                    }
                }
            }
        }

        self.transport.metrics().log_metrics();
        Ok(())
    }

    async fn reflect(&self, packet: Packet) -> Result<()> {
        let reception = self.clock.nanos_of_day();

        if packet.is_data() {
            self.ingest(&packet);
        }

        let reply = packet
            .to_builder()
            .endpoints(packet.to(), packet.from())
            .without_data()
            .reception_timestamp(reception)
            .sent_timestamp(self.clock.nanos_of_day())
            .build()?;
        self.transport.send(&reply).await
    }

    fn ingest(&self, packet: &Packet) {
        let outcome = packet.is_valid();
        self.transport.metrics().data_packet(&outcome);

        match outcome {
            Ok(true) => {
                let Some(data_tx) = &self.data_tx else {
                    return;
                };
                match data_tx.try_send(packet.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(from = %packet.from(), "Data queue full, dropping upload");
                    }
                    Err(TrySendError::Closed(_)) => {
                        warn!("{}", constants::ERR_CHANNEL_CLOSED);
                    }
                }
            }
            Ok(false) => {
                warn!(from = %packet.from(), "Data packet signature does not match");
            }
            Err(e) => {
                warn!(from = %packet.from(), error = %e, "Data packet key or signature unreadable");
            }
        }
    }
}

/// Bind a reflector from configuration and serve until CTRL+C.
///
/// Verified uploads go to `data_tx` when given.
#[instrument(skip(config, clock, data_tx), fields(address = %config.address))]
pub async fn start_reflector(
    config: &ServerConfig,
    clock: Arc<dyn Clock>,
    data_tx: Option<mpsc::Sender<Packet>>,
) -> Result<()> {
    let addr: SocketAddr = config
        .address
        .parse()
        .map_err(|e| ProtocolError::ConfigError(format!("Invalid server address: {e}")))?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    init_metrics();
    let transport = UdpTransport::bind(addr).await?.with_metrics(global_metrics());
    let mut reflector = Reflector::new(transport, clock);
    if let Some(data_tx) = data_tx {
        reflector = reflector.with_data_channel(data_tx);
    }
    reflector.run(shutdown_rx).await
}

/// Send one timing probe to `server` and wait for its reflection.
///
/// The returned packet carries all four timestamps: the initial one sampled
/// here before sending, the two the server stamped, and the final one sampled
/// here on arrival.
///
/// # Errors
/// Returns `ProtocolError::Timeout` if no matching reply arrives in time.
#[instrument(skip(transport, clock))]
pub async fn probe(
    transport: &UdpTransport,
    server: SocketAddr,
    packet_type: PacketType,
    clock: &dyn Clock,
    timeout: Duration,
) -> Result<Packet> {
    let request = Packet::probe(
        packet_type,
        transport.local_addr(),
        server,
        clock.nanos_of_day(),
    )
    .build()?;
    exchange(transport, &request, clock, timeout).await
}

/// Upload a signed measurement batch to `server` and wait for the
/// acknowledging probe.
#[instrument(skip(transport, data, clock), fields(user_id = data.user_id()))]
pub async fn send_data(
    transport: &UdpTransport,
    server: SocketAddr,
    data: DataFields,
    clock: &dyn Clock,
    timeout: Duration,
) -> Result<Packet> {
    let request = Packet::data(transport.local_addr(), server, clock.nanos_of_day(), data).build()?;
    exchange(transport, &request, clock, timeout).await
}

/// Ingestion channel sized from configuration.
pub fn data_channel(config: &ServerConfig) -> (mpsc::Sender<Packet>, mpsc::Receiver<Packet>) {
    mpsc::channel(config.data_queue_capacity.max(1))
}

/// Bind the client socket and resolve the reflector address from
/// configuration.
pub async fn connect_client(config: &ClientConfig) -> Result<(UdpTransport, SocketAddr)> {
    let bind: SocketAddr = config
        .bind_address
        .parse()
        .map_err(|e| ProtocolError::ConfigError(format!("Invalid client bind address: {e}")))?;
    let server: SocketAddr = config
        .server_address
        .parse()
        .map_err(|e| ProtocolError::ConfigError(format!("Invalid client server address: {e}")))?;
    Ok((UdpTransport::bind(bind).await?, server))
}

/// Run `count` probes spaced by the configured interval and collect one
/// [`Report`] per answered probe.
///
/// Lost probes are logged and skipped; any other failure aborts the series.
#[instrument(skip(transport, config, clock))]
pub async fn probe_series(
    transport: &UdpTransport,
    server: SocketAddr,
    config: &ClientConfig,
    clock: &dyn Clock,
    count: usize,
) -> Result<Vec<Report>> {
    let mut reports = Vec::with_capacity(count);
    // interval() panics on a zero period
    let mut ticker = tokio::time::interval(config.probe_interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    for _ in 0..count {
        ticker.tick().await;
        match probe(transport, server, config.packet_type, clock, config.response_timeout).await {
            Ok(reply) => reports.push(Report::from(&reply)),
            Err(ProtocolError::Timeout) => {
                warn!(%server, "Probe lost");
            }
            Err(e) => return Err(e),
        }
    }

    debug!(answered = reports.len(), sent = count, "Probe series finished");
    Ok(reports)
}

async fn exchange(
    transport: &UdpTransport,
    request: &Packet,
    clock: &dyn Clock,
    timeout: Duration,
) -> Result<Packet> {
    transport.send(request).await?;
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let received = tokio::time::timeout_at(deadline, transport.recv())
            .await
            .map_err(|_| ProtocolError::Timeout)?;
        let arrival = clock.nanos_of_day();

        match received {
            Ok(reply)
                if reply.from() == request.to()
                    && reply.initial_timestamp() == request.initial_timestamp() =>
            {
                return reply.to_builder().final_timestamp(arrival).build();
            }
            // Late or duplicated replies to earlier probes
            Ok(other) => {
                debug!(from = %other.from(), initial = other.initial_timestamp(), "Ignoring unrelated reply");
            }
            Err(e) if e.is_malformed() || is_peer_unreachable(&e) => {}
            Err(e) => return Err(e),
        }
    }
}

/// ICMP port-unreachable for an earlier datagram, reported on a later receive
/// by some platforms (WSAECONNRESET on Windows). It concerns one peer, not the
/// socket.
fn is_peer_unreachable(err: &ProtocolError) -> bool {
    matches!(
        err,
        ProtocolError::Io(e)
            if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused)
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::utils::time::FixedClock;

    #[tokio::test]
    async fn test_send_recv_short() {
        let a = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();

        let packet = Packet::probe(PacketType::Short, a.local_addr(), b.local_addr(), 77)
            .build()
            .unwrap();
        a.send(&packet).await.unwrap();
        let received = b.recv().await.unwrap();

        assert_eq!(received, packet);
        assert_eq!(a.metrics().snapshot().bytes_sent, 32);
        assert_eq!(b.metrics().snapshot().datagrams_received, 1);
    }

    #[tokio::test]
    async fn test_receive_buffer_reused_across_sizes() {
        let a = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();

        let long = Packet::probe(PacketType::Long, a.local_addr(), b.local_addr(), 5)
            .build()
            .unwrap();
        let short = Packet::probe(PacketType::Short, a.local_addr(), b.local_addr(), 6)
            .build()
            .unwrap();
        a.send(&long).await.unwrap();
        a.send(&short).await.unwrap();

        assert_eq!(b.recv().await.unwrap(), long);
        // Stale LONG bytes past the new length must not leak into the decode
        assert_eq!(b.recv().await.unwrap(), short);
        assert_eq!(b.metrics().snapshot().bytes_received, 4448 + 32);
    }

    #[tokio::test]
    async fn test_oversized_datagram_is_malformed() {
        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();

        raw.send_to(&vec![0u8; 5000], b.local_addr()).await.unwrap();
        let err = b.recv().await.unwrap_err();

        assert!(err.is_malformed());
        assert_eq!(b.metrics().snapshot().malformed_datagrams, 1);
    }

    #[tokio::test]
    async fn test_probe_times_out_without_server() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let clock = FixedClock::new(1, 1);

        let err = probe(
            &client,
            silent.local_addr().unwrap(),
            PacketType::Short,
            &clock,
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProtocolError::Timeout));
    }

    #[tokio::test]
    async fn test_probe_series_skips_lost_probes() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = ClientConfig {
            bind_address: "127.0.0.1:0".into(),
            server_address: silent.local_addr().unwrap().to_string(),
            response_timeout: Duration::from_millis(20),
            probe_interval: Duration::from_millis(10),
            packet_type: PacketType::Short,
        };
        let (client, server) = connect_client(&config).await.unwrap();
        let clock = FixedClock::new(1, 1);

        let reports = probe_series(&client, server, &config, &clock, 3).await.unwrap();
        assert!(reports.is_empty());
        assert_eq!(client.metrics().snapshot().datagrams_sent, 3);
    }

    #[tokio::test]
    async fn test_connect_client_rejects_bad_address() {
        let config = ClientConfig {
            server_address: "nowhere".into(),
            ..ClientConfig::default()
        };
        assert!(matches!(
            connect_client(&config).await,
            Err(ProtocolError::ConfigError(_))
        ));
    }

    #[test]
    fn test_unreachable_peer_is_not_fatal() {
        for kind in [ErrorKind::ConnectionReset, ErrorKind::ConnectionRefused] {
            assert!(is_peer_unreachable(&ProtocolError::Io(kind.into())));
        }
        assert!(!is_peer_unreachable(&ProtocolError::Io(ErrorKind::PermissionDenied.into())));
        assert!(!is_peer_unreachable(&ProtocolError::Timeout));
    }

    #[tokio::test]
    async fn test_reflector_keeps_serving_after_refused_send() {
        let server = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let reflector = Reflector::new(server, Arc::new(FixedClock::new(50, 1)));
        let server_addr = reflector.local_addr();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(reflector.run(shutdown_rx));

        // A client that vanishes before its reply arrives
        let gone = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let request = Packet::probe(PacketType::Short, gone.local_addr(), server_addr, 1)
            .build()
            .unwrap();
        gone.send(&request).await.unwrap();
        drop(gone);

        let client = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let clock = FixedClock::new(9, 1);
        let reply = probe(&client, server_addr, PacketType::Short, &clock, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reply.initial_timestamp(), 9);

        shutdown_tx.send(()).await.unwrap();
        handle.await.unwrap().unwrap();
    }

    #[test]
    fn test_data_channel_uses_configured_capacity() {
        let config = ServerConfig {
            data_queue_capacity: 3,
            ..ServerConfig::default()
        };
        let (tx, _rx) = data_channel(&config);
        assert_eq!(tx.max_capacity(), 3);
    }
}
