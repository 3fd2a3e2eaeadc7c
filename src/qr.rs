//! QR decoding results: short-code extraction and the touch-to-scan cache.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::session::BehaviorResolver;

/// Short code carried by a decoded QR payload: the last non-empty path
/// segment of the URL. Non-URL payloads carry no code.
pub fn extract_short_code(decoded: &str) -> Option<String> {
    let url = url::Url::parse(decoded.trim()).ok()?;
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrDecodeOutcome {
    /// Payload was not a URL with a short code.
    Rejected,
    /// Touch-to-scan mode: kept until the next scan.
    Cached(String),
    /// Automatic mode: handed to the resolver.
    Dispatched { short_code: String, accepted: bool },
}

/// Receives decoded QR payloads from the camera pipeline.
#[derive(Debug)]
pub struct QrCodeDetector {
    resolver: Arc<BehaviorResolver>,
    touch_to_scan: bool,
    cached: Mutex<Option<String>>,
}

impl QrCodeDetector {
    pub fn new(resolver: Arc<BehaviorResolver>) -> Self {
        let touch_to_scan = resolver.options().touch_to_scan;
        Self {
            resolver,
            touch_to_scan,
            cached: Mutex::new(None),
        }
    }

    pub fn on_decoded(&self, decoded: &str) -> QrDecodeOutcome {
        let Some(short_code) = extract_short_code(decoded) else {
            tracing::debug!(payload = %decoded, "QR payload carries no short code");
            return QrDecodeOutcome::Rejected;
        };

        if self.touch_to_scan {
            *self.cached.lock() = Some(short_code.clone());
            return QrDecodeOutcome::Cached(short_code);
        }

        let accepted = self.resolver.trigger_short_code(&short_code);
        QrDecodeOutcome::Dispatched {
            short_code,
            accepted,
        }
    }

    pub fn has_cached_result(&self) -> bool {
        self.cached.lock().is_some()
    }

    pub fn cached_result(&self) -> Option<String> {
        self.cached.lock().clone()
    }

    /// Resolve the cached code. The cache is consumed only when the resolver
    /// accepts it.
    pub fn execute_cached_result(&self) -> bool {
        let Some(short_code) = self.cached_result() else {
            return false;
        };
        let accepted = self.resolver.trigger_short_code(&short_code);
        if accepted {
            self.cached.lock().take();
        }
        accepted
    }

    pub fn clear_cached_result(&self) {
        self.cached.lock().take();
    }
}
