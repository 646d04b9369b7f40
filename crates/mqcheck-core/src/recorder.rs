//! Append-only evidence log.
//!
//! The recorder is the only thing final assertions look at. Entries go in
//! strictly in the order protocol events were observed; there is no way to
//! remove or reorder them.

use bytes::Bytes;
use serde::{Serialize, Serializer};

/// Something observed during a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Artifact {
    /// A retrieved message body
    Body(#[serde(serialize_with = "body_as_text")] Bytes),
    /// A named boolean observation
    Flag {
        /// What was observed
        name: &'static str,
        /// Observed value
        value: bool,
    },
}

impl Artifact {
    /// Body bytes, if this is a body.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        match self {
            Self::Body(body) => Some(body),
            Self::Flag { .. } => None,
        }
    }
}

fn body_as_text<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(body))
}

/// Ordered, append-only sequence of [`Artifact`]s.
#[derive(Debug, Clone, Default)]
pub struct OutcomeRecorder {
    entries: Vec<Artifact>,
}

impl OutcomeRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observation.
    pub fn append(&mut self, artifact: Artifact) {
        tracing::debug!(index = self.entries.len(), ?artifact, "recorded artifact");
        self.entries.push(artifact);
    }

    /// Current sequence, oldest first.
    ///
    /// Safe to call mid-scenario for diagnostics; verdicts must only be
    /// drawn once the scenario is terminal.
    #[must_use]
    pub fn snapshot(&self) -> &[Artifact] {
        &self.entries
    }

    /// Recorded bodies in order, skipping flags.
    pub fn bodies(&self) -> impl Iterator<Item = &Bytes> + '_ {
        self.entries.iter().filter_map(Artifact::body)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_preserves_append_order() {
        let mut recorder = OutcomeRecorder::new();
        recorder.append(Artifact::Body(Bytes::from_static(b"a")));
        recorder.append(Artifact::Flag { name: "x", value: true });
        recorder.append(Artifact::Body(Bytes::from_static(b"b")));

        assert_eq!(recorder.len(), 3);
        assert_eq!(recorder.snapshot()[0], Artifact::Body(Bytes::from_static(b"a")));
        assert_eq!(recorder.snapshot()[1], Artifact::Flag { name: "x", value: true });

        let bodies: Vec<_> = recorder.bodies().cloned().collect();
        assert_eq!(bodies, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
    }
}
