//! Cached Date header values.
//!
//! Formatting an IMF-fixdate for every response is wasted work at high
//! request rates, so a background task renders the date once per second
//! and publishes it through an [`ArcSwap`]. Connections clone the current
//! value, which is a cheap refcount bump on the shared bytes.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use bytes::Bytes;
use once_cell::sync::Lazy;

use crate::buffer::ByteStr;

pub struct DateService {
    current: Arc<ArcSwap<Bytes>>,
    handle: tokio::task::JoinHandle<()>,
}

static DATE_SERVICE: Lazy<DateService> =
    Lazy::new(|| DateService::with_update_interval(Duration::from_secs(1)));

impl DateService {
    /// The process-wide instance. First use must happen inside a tokio
    /// runtime because it spawns the refresh task.
    pub fn global() -> &'static DateService {
        &DATE_SERVICE
    }

    fn with_update_interval(update_interval: Duration) -> Self {
        let current = Arc::new(ArcSwap::from_pointee(render_date()));
        let shared = Arc::clone(&current);

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(update_interval).await;
                shared.store(Arc::new(render_date()));
            }
        });

        DateService { current, handle }
    }

    /// The current Date header value.
    pub fn http_date(&self) -> ByteStr {
        let date = self.current.load().as_ref().clone();
        // SAFETY: the date buffer is rendered by faf_http_date and is ASCII
        unsafe { ByteStr::from_utf8_unchecked(date) }
    }
}

fn render_date() -> Bytes {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);
    Bytes::from_owner(buf)
}

impl std::fmt::Debug for DateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DateService").field("current", &self.http_date()).finish()
    }
}

impl Drop for DateService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn date_value_looks_like_imf_fixdate() {
        let date = DateService::global().http_date();
        // e.g. "Tue, 01 Jul 2025 10:00:00 GMT"
        assert!(date.contains("GMT"), "unexpected date value: {date}");
        assert!(date.len() >= 29);
    }
}
