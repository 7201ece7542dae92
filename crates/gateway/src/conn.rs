//! Accept loop and per-connection HTTP/1.1 serving with read, write and idle
//! limits.

use std::{
    future::Future,
    io,
    net::SocketAddr,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    task::{Context, Poll},
    time::{Duration, Instant},
};

use {
    axum::{Router, body::Body, extract::ConnectInfo},
    hyper::{Request, body::Incoming, server::conn::http1, service::service_fn},
    hyper_util::rt::{TokioIo, TokioTimer},
    tokio::{
        io::{AsyncRead, AsyncWrite, ReadBuf},
        net::{TcpListener, TcpStream},
    },
    tower::ServiceExt,
    tracing::{debug, info, warn},
};

pub const READ_TIMEOUT: Duration = Duration::from_secs(10);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(120);
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Pause after a failed `accept` (e.g. file descriptor exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Per-connection resource limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    /// Bound on receiving request headers, counted from the request's first
    /// byte, and separately on reading the body.
    pub read_timeout: Duration,
    /// Bound on handling a request and producing its response. Exceeding it
    /// aborts the connection.
    pub write_timeout: Duration,
    /// Connections with no socket traffic between requests for this long are
    /// closed.
    pub idle_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            read_timeout: READ_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
            idle_timeout: IDLE_TIMEOUT,
            max_body_bytes: MAX_BODY_BYTES,
        }
    }
}

/// Serve `app` on `listener` until `shutdown` resolves.
///
/// Each connection runs on its own task; a failing connection never stops
/// the loop.
pub async fn serve<F>(listener: TcpListener, app: Router, limits: ConnectionLimits, shutdown: F)
where
    F: Future<Output = ()> + Send,
{
    tokio::pin!(shutdown);
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            () = &mut shutdown => {
                info!("shutdown requested, no longer accepting connections");
                return;
            },
        };
        match accepted {
            Ok((stream, peer)) => {
                let app = app.clone();
                tokio::spawn(serve_connection(stream, peer, app, limits));
            },
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            },
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    app: Router,
    limits: ConnectionLimits,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%peer, error = %e, "failed to set TCP_NODELAY");
    }

    let activity = Arc::new(Activity::new());
    let io = TokioIo::new(ActivityStream {
        inner: stream,
        activity: Arc::clone(&activity),
    });

    let write_timeout = limits.write_timeout;
    let service_activity = Arc::clone(&activity);
    let service = service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        let app = app.clone();
        let in_flight = InFlight::begin(Arc::clone(&service_activity));
        async move {
            let _in_flight = in_flight;
            match tokio::time::timeout(write_timeout, app.oneshot(request.map(Body::new))).await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(never)) => match never {},
                Err(_) => {
                    warn!(
                        %peer,
                        timeout = ?write_timeout,
                        "request exceeded write timeout, closing connection"
                    );
                    Err(io::Error::new(io::ErrorKind::TimedOut, "write timeout"))
                },
            }
        }
    });

    // Header reads are bounded by the watchdog below, which only starts the
    // clock once the first byte of a request arrives.
    let mut builder = http1::Builder::new();
    builder.timer(TokioTimer::new()).keep_alive(true);
    let conn = builder.serve_connection(io, service);
    tokio::pin!(conn);

    let outcome = loop {
        let wait = match activity.phase() {
            Phase::Handling => write_timeout,
            Phase::Receiving(elapsed) if elapsed >= limits.read_timeout => break Expiry::Read,
            Phase::Receiving(elapsed) => limits.read_timeout - elapsed,
            Phase::Idle(elapsed) if elapsed >= limits.idle_timeout => break Expiry::Idle,
            Phase::Idle(elapsed) => limits.idle_timeout - elapsed,
        };
        tokio::select! {
            result = conn.as_mut() => break Expiry::Finished(result),
            () = tokio::time::sleep(wait) => {},
        }
    };

    let result = match outcome {
        Expiry::Finished(result) => result,
        Expiry::Read => {
            debug!(
                %peer,
                timeout = ?limits.read_timeout,
                "request headers not received in time, closing connection"
            );
            return;
        },
        Expiry::Idle => {
            debug!(%peer, "closing idle connection");
            conn.as_mut().graceful_shutdown();
            conn.await
        },
    };
    if let Err(e) = result {
        debug!(%peer, error = %e, "connection closed with error");
    }
}

enum Expiry {
    Finished(hyper::Result<()>),
    Read,
    Idle,
}

// ── Activity tracking ────────────────────────────────────────────────────────

/// Where a connection is in its request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Between requests, for this long since the last byte moved.
    Idle(Duration),
    /// Part of a request has arrived; time since its first byte.
    Receiving(Duration),
    /// A request is being handled by the service.
    Handling,
}

/// Socket activity of one connection. Millisecond stamps are offsets from
/// `epoch`; `request_started` stores the stamp plus one so zero means unset.
struct Activity {
    epoch: Instant,
    last_millis: AtomicU64,
    request_started: AtomicU64,
    in_flight: AtomicBool,
}

impl Activity {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_millis: AtomicU64::new(0),
            request_started: AtomicU64::new(0),
            in_flight: AtomicBool::new(false),
        }
    }

    fn now_millis(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn touch(&self) {
        self.last_millis.store(self.now_millis(), Ordering::Relaxed);
    }

    /// Bytes arrived; the first ones after an idle period open a request.
    fn record_read(&self) {
        let now = self.now_millis();
        self.last_millis.store(now, Ordering::Relaxed);
        if !self.in_flight.load(Ordering::Acquire) {
            let _ = self.request_started.compare_exchange(
                0,
                now.saturating_add(1),
                Ordering::AcqRel,
                Ordering::Relaxed,
            );
        }
    }

    fn phase(&self) -> Phase {
        if self.in_flight.load(Ordering::Acquire) {
            return Phase::Handling;
        }
        let since = |millis: u64| {
            self.epoch
                .elapsed()
                .saturating_sub(Duration::from_millis(millis))
        };
        match self.request_started.load(Ordering::Acquire) {
            0 => Phase::Idle(since(self.last_millis.load(Ordering::Relaxed))),
            started => Phase::Receiving(since(started - 1)),
        }
    }
}

/// Marks a request as handed to the service until dropped.
struct InFlight(Arc<Activity>);

impl InFlight {
    fn begin(activity: Arc<Activity>) -> Self {
        activity.in_flight.store(true, Ordering::Release);
        activity.request_started.store(0, Ordering::Release);
        Self(activity)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.touch();
        self.0.in_flight.store(false, Ordering::Release);
    }
}

/// A socket that records read and write activity.
struct ActivityStream<S> {
    inner: S,
    activity: Arc<Activity>,
}

impl<S: AsyncRead + Unpin> AsyncRead for ActivityStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if matches!(poll, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            this.activity.record_read();
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for ActivityStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if matches!(poll, Poll::Ready(Ok(n)) if n > 0) {
            this.activity.touch();
        }
        poll
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write_vectored(cx, bufs);
        if matches!(poll, Poll::Ready(Ok(n)) if n > 0) {
            this.activity.touch();
        }
        poll
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        tokio::io::{AsyncReadExt, AsyncWriteExt, duplex},
    };

    #[test]
    fn default_limits_match_operational_values() {
        let limits = ConnectionLimits::default();
        assert_eq!(limits.read_timeout, Duration::from_secs(10));
        assert_eq!(limits.write_timeout, Duration::from_secs(10));
        assert_eq!(limits.idle_timeout, Duration::from_secs(120));
    }

    #[tokio::test]
    async fn activity_stream_records_traffic() {
        let (mut client, server) = duplex(64);
        let activity = Arc::new(Activity::new());
        let mut stream = ActivityStream {
            inner: server,
            activity: Arc::clone(&activity),
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(matches!(activity.phase(), Phase::Idle(d) if d >= Duration::from_millis(30)));

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert!(matches!(activity.phase(), Phase::Receiving(d) if d < Duration::from_millis(30)));

        let in_flight = InFlight::begin(Arc::clone(&activity));
        assert_eq!(activity.phase(), Phase::Handling);
        stream.write_all(b"pong").await.unwrap();
        drop(in_flight);
        assert!(matches!(activity.phase(), Phase::Idle(d) if d < Duration::from_millis(30)));
    }

    #[test]
    fn request_clock_starts_with_first_byte() {
        let activity = Activity::new();
        std::thread::sleep(Duration::from_millis(30));
        assert!(matches!(activity.phase(), Phase::Idle(_)));

        activity.record_read();
        std::thread::sleep(Duration::from_millis(30));
        // Later bytes of the same request do not restart the clock.
        activity.record_read();
        assert!(matches!(activity.phase(), Phase::Receiving(d) if d >= Duration::from_millis(30)));
    }

    #[test]
    fn finished_request_returns_to_idle() {
        let activity = Arc::new(Activity::new());
        activity.record_read();
        let in_flight = InFlight::begin(Arc::clone(&activity));
        activity.record_read();
        assert_eq!(activity.phase(), Phase::Handling);
        drop(in_flight);
        assert!(matches!(activity.phase(), Phase::Idle(_)));
    }
}
