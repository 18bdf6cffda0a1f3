//! Native response metadata sink.
//!
//! On the gRPC path cookies are written straight into the response metadata
//! of the `tonic::Response`, with no carrier in between.

use std::sync::Mutex;

use http::header::{HeaderName, HeaderValue};
use memo_core::auth::carrier::HeaderSink;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};
use tracing::warn;

/// [`HeaderSink`] backed by a tonic [`MetadataMap`].
#[derive(Debug, Default)]
pub struct MetadataSink {
    metadata: Mutex<MetadataMap>,
}

impl MetadataSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the collected metadata onto `response`, keeping what it already has.
    pub fn apply<T>(self, response: &mut tonic::Response<T>) {
        let collected = self
            .metadata
            .into_inner()
            .unwrap_or_else(|e| e.into_inner())
            .into_headers();
        let target = response.metadata_mut();
        for (name, value) in collected.iter() {
            match convert(name, value) {
                Some((key, value)) => {
                    target.append(key, value);
                }
                None => warn!(header = %name, "dropping header that is not valid ASCII metadata"),
            }
        }
    }

    fn write(&self, name: HeaderName, value: HeaderValue, replace: bool) {
        let Some((key, value)) = convert(&name, &value) else {
            warn!(header = %name, "dropping header that is not valid ASCII metadata");
            return;
        };
        let mut metadata = self.metadata.lock().unwrap_or_else(|e| e.into_inner());
        if replace {
            metadata.insert(key, value);
        } else {
            metadata.append(key, value);
        }
    }
}

fn convert(name: &HeaderName, value: &HeaderValue) -> Option<(AsciiMetadataKey, AsciiMetadataValue)> {
    let key = AsciiMetadataKey::from_bytes(name.as_str().as_bytes()).ok()?;
    let value = AsciiMetadataValue::try_from(value.as_bytes()).ok()?;
    Some((key, value))
}

impl HeaderSink for MetadataSink {
    fn set(&self, name: HeaderName, value: HeaderValue) {
        self.write(name, value, true);
    }

    fn append(&self, name: HeaderName, value: HeaderValue) {
        self.write(name, value, false);
    }
}
