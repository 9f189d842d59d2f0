//! Diagnostic page published into a tenant's store when a deploy fails.
//!
//! The presence of the page is the externally visible health signal: it is
//! uploaded on failure and removed after the next successful deploy.

use crate::publish::store::{delete_batch, ObjectStore};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

pub struct ErrorReporter {
    store: Arc<dyn ObjectStore>,
    key: String,
}

impl ErrorReporter {
    pub fn new(store: Arc<dyn ObjectStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Upload the error page. Failures are logged, never returned.
    pub async fn set(&self, detail: &str) {
        let page = render_error_page(detail, Utc::now());
        match self
            .store
            .put(&self.key, Bytes::from(page), "text/html")
            .await
        {
            Ok(()) => info!("Error page set on {}", self.store.name()),
            Err(e) => warn!("Failed to set error page on {}: {}", self.store.name(), e),
        }
    }

    /// Remove the error page. Safe when there is none.
    pub async fn clear(&self) {
        if let Err(e) = delete_batch(self.store.as_ref(), &[self.key.clone()]).await {
            warn!("Failed to clear error page on {}: {}", self.store.name(), e);
        }
    }
}

pub fn render_error_page(detail: &str, at: DateTime<Utc>) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head><meta charset=\"utf-8\"><title>Deploy failed</title></head>\n\
         <body>\n\
         <h1>Deploy failed</h1>\n\
         <p>{}</p>\n\
         <pre>{}</pre>\n\
         </body>\n\
         </html>\n",
        at.format("%Y-%m-%d %H:%M:%S UTC"),
        escape_html(detail)
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
