//! Render surface seam and the screenshot round-trip.
//!
//! A capture is a one-shot exchange: the executor creates a
//! [`CaptureRequest`] / [`CaptureReply`] pair, hands the reply half to the
//! surface, and waits on the request half for at most the configured
//! timeout. The surface answers exactly once, from whatever task owns the
//! renderer, with a [`CaptureMessage`].
//!
//! ```text
//! Idle --request_capture--> AwaitingCapture --SCREENSHOT_RESULT--> Captured
//!                                           --SCREENSHOT_ERROR---> Failed
//!                                           --timeout------------> TimedOut
//! ```
//!
//! Late answers land on a closed channel and are dropped.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{oneshot, watch};

use crate::vfs::VirtualFs;

/// Errors from the preview surface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    /// No surface is attached to this executor.
    #[error("no preview surface is attached")]
    Unavailable,
    /// The surface did not answer in time.
    #[error("screenshot timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    /// The surface reported a capture failure.
    #[error("screenshot failed: {0}")]
    Capture(String),
    /// The surface could not rebuild the preview.
    #[error("preview rebuild failed: {0}")]
    Rebuild(String),
    /// The capture payload was not valid base64 image data.
    #[error("screenshot data could not be decoded: {0}")]
    Decode(String),
    /// The wait was cancelled by the host.
    #[error("screenshot cancelled")]
    Cancelled,
}

/// The live preview the `preview` and `take_screenshot` tools drive.
///
/// Implementations own the actual renderer (a browser iframe, a headless
/// page, a test double) and are shared behind an `Arc`.
#[async_trait]
pub trait RenderSurface: Send + Sync {
    /// Rebuild the preview from the current project files.
    ///
    /// Returns once the new preview has loaded.
    async fn rebuild(&self, files: &VirtualFs) -> Result<(), SurfaceError>;

    /// Start a capture. The result is delivered through `reply`, possibly
    /// from another task and possibly never.
    fn request_capture(&self, reply: CaptureReply) -> Result<(), SurfaceError>;
}

/// Answer to a capture request, in the shape renderers post back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CaptureMessage {
    /// Image as a `data:image/png;base64,...` URL or bare base64.
    #[serde(rename = "SCREENSHOT_RESULT")]
    Result {
        /// Encoded image.
        data: String,
    },
    /// The renderer could not capture.
    #[serde(rename = "SCREENSHOT_ERROR")]
    Error {
        /// Renderer's description.
        message: String,
    },
}

/// Sending half of a capture round-trip.
#[derive(Debug)]
pub struct CaptureReply {
    tx: oneshot::Sender<CaptureMessage>,
}

impl CaptureReply {
    /// Deliver an answer. Returns false if nobody is waiting any more.
    pub fn send(self, message: CaptureMessage) -> bool {
        self.tx.send(message).is_ok()
    }

    /// Deliver encoded image data.
    pub fn succeed(self, data: impl Into<String>) -> bool {
        self.send(CaptureMessage::Result { data: data.into() })
    }

    /// Deliver a failure.
    pub fn fail(self, message: impl Into<String>) -> bool {
        self.send(CaptureMessage::Error {
            message: message.into(),
        })
    }

    /// True once the waiting side has given up.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Terminal state of a capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Decoded image bytes.
    Captured(Vec<u8>),
    /// Surface reported an error, dropped the reply, or sent bad data.
    Failed(SurfaceError),
    /// No answer within the timeout.
    TimedOut(Duration),
}

impl CaptureOutcome {
    /// Convert to a result.
    pub fn into_result(self) -> Result<Vec<u8>, SurfaceError> {
        match self {
            CaptureOutcome::Captured(bytes) => Ok(bytes),
            CaptureOutcome::Failed(err) => Err(err),
            CaptureOutcome::TimedOut(after) => Err(SurfaceError::Timeout(after)),
        }
    }
}

/// Waiting half of a capture round-trip.
#[derive(Debug)]
pub struct CaptureRequest {
    rx: oneshot::Receiver<CaptureMessage>,
    timeout: Duration,
}

impl CaptureRequest {
    /// Create a request that waits at most `timeout` for its reply.
    pub fn new(timeout: Duration) -> (Self, CaptureReply) {
        let (tx, rx) = oneshot::channel();
        (Self { rx, timeout }, CaptureReply { tx })
    }

    /// Wait for the answer.
    pub async fn outcome(self) -> CaptureOutcome {
        match tokio::time::timeout(self.timeout, self.rx).await {
            Err(_) => CaptureOutcome::TimedOut(self.timeout),
            Ok(Err(_)) => CaptureOutcome::Failed(SurfaceError::Capture(
                "preview surface dropped the request".to_string(),
            )),
            Ok(Ok(CaptureMessage::Error { message })) => {
                CaptureOutcome::Failed(SurfaceError::Capture(message))
            }
            Ok(Ok(CaptureMessage::Result { data })) => match decode_image(&data) {
                Ok(bytes) => CaptureOutcome::Captured(bytes),
                Err(err) => CaptureOutcome::Failed(err),
            },
        }
    }

    /// Wait for the answer unless `cancel` flips to true first.
    ///
    /// Returns `None` on cancellation. A dropped cancel sender never cancels.
    pub async fn outcome_or_cancel(
        self,
        cancel: &mut watch::Receiver<bool>,
    ) -> Option<CaptureOutcome> {
        tokio::select! {
            outcome = self.outcome() => Some(outcome),
            () = cancelled(cancel) => None,
        }
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Decode a `data:` URL or bare base64 string into bytes.
pub fn decode_image(data: &str) -> Result<Vec<u8>, SurfaceError> {
    let encoded = if data.starts_with("data:") {
        data.split_once(',')
            .map(|(_, payload)| payload)
            .ok_or_else(|| SurfaceError::Decode("data URL has no payload".to_string()))?
    } else {
        data
    };
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| SurfaceError::Decode(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_data_url() {
        let bytes = decode_image("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(bytes, vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);
    }

    #[test]
    fn test_decode_bare_base64() {
        assert_eq!(decode_image("aGk=").unwrap(), b"hi".to_vec());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_image("data:image/png;base64,@@@"),
            Err(SurfaceError::Decode(_))
        ));
        assert!(matches!(
            decode_image("data:image/png;base64"),
            Err(SurfaceError::Decode(_))
        ));
    }

    #[test]
    fn test_capture_message_wire_shape() {
        let msg: CaptureMessage =
            serde_json::from_str(r#"{"type":"SCREENSHOT_ERROR","message":"blank canvas"}"#).unwrap();
        assert_eq!(
            msg,
            CaptureMessage::Error {
                message: "blank canvas".to_string()
            }
        );

        let json = serde_json::to_value(CaptureMessage::Result {
            data: "aGk=".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "SCREENSHOT_RESULT");
        assert_eq!(json["data"], "aGk=");
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_succeeds() {
        let (request, reply) = CaptureRequest::new(Duration::from_secs(8));
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            reply.succeed("data:image/png;base64,aGk=");
        });

        assert_eq!(request.outcome().await, CaptureOutcome::Captured(b"hi".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_reports_surface_error() {
        let (request, reply) = CaptureRequest::new(Duration::from_secs(8));
        reply.fail("blank canvas");

        assert_eq!(
            request.outcome().await.into_result(),
            Err(SurfaceError::Capture("blank canvas".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_times_out() {
        let (request, reply) = CaptureRequest::new(Duration::from_secs(8));
        let handle = tokio::spawn(request.outcome());

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(reply.is_closed());
        assert!(!reply.succeed("aGk="));
        assert_eq!(
            handle.await.unwrap(),
            CaptureOutcome::TimedOut(Duration::from_secs(8))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_reply_fails_immediately() {
        let (request, reply) = CaptureRequest::new(Duration::from_secs(8));
        drop(reply);

        assert!(matches!(
            request.outcome().await,
            CaptureOutcome::Failed(SurfaceError::Capture(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_abandons_wait() {
        let (request, reply) = CaptureRequest::new(Duration::from_secs(8));
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            cancel_tx.send(true).unwrap();
        });

        assert_eq!(request.outcome_or_cancel(&mut cancel_rx).await, None);
        assert!(reply.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_cancel_sender_never_cancels() {
        let (request, reply) = CaptureRequest::new(Duration::from_secs(8));
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        drop(cancel_tx);
        reply.succeed("aGk=");

        assert_eq!(
            request.outcome_or_cancel(&mut cancel_rx).await,
            Some(CaptureOutcome::Captured(b"hi".to_vec()))
        );
    }
}
