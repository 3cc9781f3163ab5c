//! Bandwidth-capped byte streams.
//!
//! [`RateLimitedReader`] wraps any [`AsyncRead`] and paces it with a `governor`
//! rate limiter whose quota is `K * 1024` bytes per second, where `K` is the
//! job's speed cap in kb/s. The quota allows a burst of [`BURST_BYTES`] and
//! starts full, so short streams pass without delay.
//!
//! Bytes pulled from the inner source are held back until the limiter admits
//! them, so a read returns only after the delay its bytes require. Reads from
//! the inner source are capped at [`BURST_BYTES`] so any single read fits the
//! quota.
//!
//! The limiter runs on tokio's clock, which keeps it in step with
//! `tokio::time::pause` in tests.
//!
//! The delay is interruptible: a reader built with
//! [`with_cancellation`](RateLimitedReader::with_cancellation) drops its inner
//! source and fails with [`io::ErrorKind::Interrupted`] as soon as the token is
//! cancelled, which the rest of the crate reads as a stop request.

use governor::clock::{Clock, FakeRelativeClock};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::future::Future;
use std::io;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::{Duration, Instant, Sleep};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};


/// Quota burst in bytes.
pub const BURST_BYTES: u32 = 1000 * 1024;

/// Bytes per second allowed by a cap of `kbps`.
pub fn bytes_per_second(kbps: u32) -> u64 {
    u64::from(kbps) * 1024
}

/// Nanosecond instants measured on tokio's clock.
type ClockInstant = <FakeRelativeClock as Clock>::Instant;

/// A [`Clock`] reading elapsed time from `tokio::time`.
#[derive(Debug, Clone)]
struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    type Instant = ClockInstant;

    fn now(&self) -> Self::Instant {
        self.origin.elapsed().into()
    }
}

type Limiter = RateLimiter<NotKeyed, InMemoryState, TokioClock, NoOpMiddleware<ClockInstant>>;

/// A direct limiter over a byte quota plus the clock it measures against.
struct Pacer {
    limiter: Limiter,
    clock: TokioClock,
}

impl Pacer {
    fn new(kbps: u32) -> Option<Self> {
        let rate = u32::try_from(bytes_per_second(kbps)).unwrap_or(u32::MAX);
        let rate = NonZeroU32::new(rate)?;
        let burst = NonZeroU32::new(BURST_BYTES)?;
        let clock = TokioClock::new();
        let limiter = RateLimiter::direct_with_clock(Quota::per_second(rate).allow_burst(burst), &clock);
        Some(Self { limiter, clock })
    }

    /// Admits `n` bytes now, or returns how long to wait before asking again.
    fn admit(&self, n: usize) -> Option<Duration> {
        let cells = NonZeroU32::new(u32::try_from(n).ok()?)?;
        match self.limiter.check_n(cells) {
            Ok(Ok(())) => None,
            Ok(Err(not_until)) => Some(not_until.wait_time_from(self.clock.now())),
            // reads are capped at the burst size
            Err(_) => None,
        }
    }
}

/// An [`AsyncRead`] capped at a fixed bandwidth.
///
/// # Examples
///
/// ```
/// use libreplica::ratelimit::RateLimitedReader;
/// use tokio::io::AsyncReadExt;
///
/// # tokio_test::block_on(async {
/// let mut reader = RateLimitedReader::new(&b"layer"[..], 1024);
/// let mut out = Vec::new();
/// reader.read_to_end(&mut out).await.unwrap();
/// assert_eq!(out, b"layer");
/// assert_eq!(reader.bytes_read(), 5);
/// # });
/// ```
pub struct RateLimitedReader<R> {
    inner: Option<R>,
    /// `None` when the cap is zero.
    pacer: Option<Pacer>,
    /// Bytes read from `inner` that have not been handed out yet.
    held: Vec<u8>,
    admitted: bool,
    scratch: Vec<u8>,
    delay: Option<Pin<Box<Sleep>>>,
    cancelled: Option<Pin<Box<WaitForCancellationFutureOwned>>>,
    bytes_read: u64,
}

impl<R> RateLimitedReader<R> {
    /// Wraps `inner` at `kbps` kb/s. A cap of zero disables pacing.
    pub fn new(inner: R, kbps: u32) -> Self {
        Self {
            inner: Some(inner),
            pacer: Pacer::new(kbps),
            held: Vec::new(),
            admitted: false,
            scratch: Vec::new(),
            delay: None,
            cancelled: None,
            bytes_read: 0,
        }
    }

    /// Aborts reads, including one waiting out a delay, once `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancelled = Some(Box::pin(token.cancelled_owned()));
        self
    }

    /// Total bytes handed to callers so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Drops the inner source and any held bytes. Later reads fail.
    pub fn close(&mut self) {
        self.inner = None;
        self.delay = None;
        self.held.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    fn hand_out(&mut self, buf: &mut ReadBuf<'_>) {
        let n = self.held.len().min(buf.remaining());
        buf.put_slice(&self.held[..n]);
        self.held.drain(..n);
        self.bytes_read += n as u64;
        if self.held.is_empty() {
            self.admitted = false;
        }
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "reader closed")
}

impl<R: AsyncRead + Unpin> AsyncRead for RateLimitedReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if let Some(cancelled) = this.cancelled.as_mut()
            && cancelled.as_mut().poll(cx).is_ready()
        {
            this.close();
            return Poll::Ready(Err(closed()));
        }

        loop {
            if !this.held.is_empty() {
                if !this.admitted {
                    if let Some(delay) = this.delay.as_mut() {
                        ready!(delay.as_mut().poll(cx));
                        this.delay = None;
                    }
                    let wait = this.pacer.as_ref().and_then(|p| p.admit(this.held.len()));
                    if let Some(wait) = wait {
                        this.delay = Some(Box::pin(tokio::time::sleep(wait)));
                        continue;
                    }
                    this.admitted = true;
                }
                this.hand_out(buf);
                return Poll::Ready(Ok(()));
            }

            let Some(inner) = this.inner.as_mut() else {
                return Poll::Ready(Err(closed()));
            };

            if this.pacer.is_none() {
                let before = buf.filled().len();
                ready!(Pin::new(inner).poll_read(cx, buf))?;
                this.bytes_read += (buf.filled().len() - before) as u64;
                return Poll::Ready(Ok(()));
            }

            let want = buf.remaining().min(BURST_BYTES as usize);
            if want == 0 {
                return Poll::Ready(Ok(()));
            }
            this.scratch.resize(want, 0);
            let mut scratch = ReadBuf::new(&mut this.scratch);
            ready!(Pin::new(inner).poll_read(cx, &mut scratch))?;
            let n = scratch.filled().len();
            if n == 0 {
                return Poll::Ready(Ok(()));
            }
            this.held.extend_from_slice(&this.scratch[..n]);
        }
    }
}
