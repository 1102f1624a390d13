use std::io;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::warn;
use tts_core::{
    ByteStream, CancellationToken, SessionError, SynthesisRequest, SynthesisTransport, Url,
};

/// Transport wrapper that cancels the session when the backend goes quiet for
/// `limit`, either before the response arrives or between two chunks.
///
/// `cancel` must be the token the session runs under.
pub struct IdleTimeout<T> {
    inner: T,
    limit: Duration,
    cancel: CancellationToken,
}

impl<T> IdleTimeout<T> {
    pub fn new(inner: T, limit: Duration, cancel: CancellationToken) -> Self {
        Self {
            inner,
            limit,
            cancel,
        }
    }
}

#[async_trait]
impl<T: SynthesisTransport> SynthesisTransport for IdleTimeout<T> {
    async fn open(&self, endpoint: &Url, request: &SynthesisRequest) -> Result<ByteStream, SessionError> {
        let limit = self.limit;
        let mut inner = match tokio::time::timeout(limit, self.inner.open(endpoint, request)).await {
            Ok(opened) => opened?,
            Err(_) => {
                warn!("No response from the TTS backend for {}s, cancelling", limit.as_secs_f32());
                self.cancel.cancel();
                return Err(SessionError::Cancelled);
            }
        };

        let cancel = self.cancel.clone();
        let guarded = async_stream::stream! {
            loop {
                match tokio::time::timeout(limit, inner.next()).await {
                    Ok(Some(item)) => yield item,
                    Ok(None) => break,
                    Err(_) => {
                        warn!("No audio data received for {}s, cancelling", limit.as_secs_f32());
                        cancel.cancel();
                        yield Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("no data received for {:.1}s", limit.as_secs_f32()),
                        ));
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(guarded))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use bytes::Bytes;
    use tts_core::{Session, SessionConfig, SessionState, WavDecoder, WavRenderClock};

    /// Sends two bytes, then nothing.
    struct Stalling;

    #[async_trait]
    impl SynthesisTransport for Stalling {
        async fn open(&self, _endpoint: &Url, _request: &SynthesisRequest) -> Result<ByteStream, SessionError> {
            let first = futures_util::stream::iter(vec![Ok(Bytes::from_static(b"\x00\x00"))]);
            Ok(Box::pin(first.chain(futures_util::stream::pending())))
        }
    }

    /// Accepts the request but never answers it.
    struct Silent;

    #[async_trait]
    impl SynthesisTransport for Silent {
        async fn open(&self, _endpoint: &Url, _request: &SynthesisRequest) -> Result<ByteStream, SessionError> {
            std::future::pending::<Result<ByteStream, SessionError>>().await
        }
    }

    fn request() -> SynthesisRequest {
        SynthesisRequest {
            text: "Hello".to_string(),
            voice: "af_sky".to_string(),
        }
    }

    fn endpoint() -> Url {
        Url::parse("http://localhost:8002").unwrap()
    }

    #[tokio::test]
    async fn test_idle_stream_times_out() {
        let token = CancellationToken::new();
        let transport = IdleTimeout::new(Stalling, Duration::from_millis(20), token.clone());
        let mut stream = transport.open(&endpoint(), &request()).await.unwrap();

        assert!(stream.next().await.unwrap().is_ok());
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(stream.next().await.is_none());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_unanswered_request_times_out() {
        let token = CancellationToken::new();
        let transport = IdleTimeout::new(Silent, Duration::from_millis(20), token.clone());

        let opened = tokio::time::timeout(Duration::from_secs(5), transport.open(&endpoint(), &request()))
            .await
            .expect("open was not bounded by the idle limit");
        assert!(matches!(opened, Err(SessionError::Cancelled)));
        assert!(token.is_cancelled());
    }

    async fn run_with_idle_limit<T: SynthesisTransport + 'static>(inner: T) -> (Session, Result<(), SessionError>) {
        let token = CancellationToken::new();
        let transport = Arc::new(IdleTimeout::new(inner, Duration::from_millis(20), token.clone()));
        let mut session = Session::new(
            SessionConfig::new("localhost:8002"),
            "Hello",
            transport,
            Arc::new(WavDecoder),
            Arc::new(WavRenderClock::new()),
        )
        .with_cancellation(token);

        let result = tokio::time::timeout(Duration::from_secs(5), session.run())
            .await
            .expect("session outlived its idle limit");
        (session, result.map(|_| ()))
    }

    #[tokio::test]
    async fn test_idle_stream_cancels_session() {
        let (session, result) = run_with_idle_limit(Stalling).await;
        assert!(matches!(result, Err(SessionError::Cancelled)));
        assert_eq!(session.state(), SessionState::Cancelled);
    }

    #[tokio::test]
    async fn test_unanswered_request_cancels_session() {
        let (session, result) = run_with_idle_limit(Silent).await;
        assert!(matches!(result, Err(SessionError::Cancelled)));
        assert_eq!(session.state(), SessionState::Cancelled);
        assert!(session.report().scheduled.is_empty());
    }
}
