use std::fmt;
use std::str::FromStr;

/// A three-segment `application.worker.state` routing key, per the
/// grammar in spec §6: each segment matches `[A-Za-z0-9-]+`.
///
/// `application` is echoed verbatim by workers when they publish a reply,
/// so that replies route back to the originating application's queue
/// rather than being cross-consumed by another app sharing the fabric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoutingKey {
    pub application: String,
    pub worker: String,
    pub state: String,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("routing key {0:?} must have exactly three dot-separated segments")]
    WrongSegmentCount(String),
    #[error("routing key segment {0:?} is empty or contains characters outside [A-Za-z0-9-]")]
    InvalidSegment(String),
}

fn validate_segment(segment: &str) -> Result<(), Error> {
    if !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        Ok(())
    } else {
        Err(Error::InvalidSegment(segment.to_string()))
    }
}

impl RoutingKey {
    pub fn new(
        application: impl Into<String>,
        worker: impl Into<String>,
        state: impl Into<String>,
    ) -> Result<Self, Error> {
        let (application, worker, state) = (application.into(), worker.into(), state.into());
        validate_segment(&application)?;
        validate_segment(&worker)?;
        validate_segment(&state)?;
        Ok(Self {
            application,
            worker,
            state,
        })
    }

    /// Build the reply key a worker should publish, preserving the
    /// caller's `application` segment but rewriting `worker.state`.
    pub fn reply(&self, worker: impl Into<String>, state: impl Into<String>) -> Result<Self, Error> {
        Self::new(self.application.clone(), worker, state)
    }
}

impl FromStr for RoutingKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let (Some(application), Some(worker), Some(state), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::WrongSegmentCount(s.to_string()));
        };
        Self::new(application, worker, state)
    }
}

impl TryFrom<String> for RoutingKey {
    type Error = Error;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RoutingKey> for String {
    fn from(key: RoutingKey) -> String {
        key.to_string()
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.application, self.worker, self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_segments() {
        let key: RoutingKey = "nlds-api.index.init".parse().unwrap();
        assert_eq!(key.application, "nlds-api");
        assert_eq!(key.worker, "index");
        assert_eq!(key.state, "init");
        assert_eq!(key.to_string(), "nlds-api.index.init");
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert!("a.b".parse::<RoutingKey>().is_err());
        assert!("a.b.c.d".parse::<RoutingKey>().is_err());
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!("a.b_c.d".parse::<RoutingKey>().is_err());
        assert!("a..d".parse::<RoutingKey>().is_err());
    }

    #[test]
    fn reply_preserves_application_segment() {
        let key: RoutingKey = "nlds-api.route.put".parse().unwrap();
        let reply = key.reply("index", "complete").unwrap();
        assert_eq!(reply.to_string(), "nlds-api.index.complete");
    }
}
