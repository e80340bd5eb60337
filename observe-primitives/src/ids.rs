//! Trace and span identifier types.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a random identifier.
            #[must_use]
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(self) -> Uuid {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                Display::fmt(&self.0.simple(), f)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::parse_str(s).map_err(Error::from)?;
                Ok(Self::from_uuid(uuid))
            }
        }
    };
}

uuid_id! {
    /// Identifier shared by every span belonging to one trace tree.
    TraceId
}

uuid_id! {
    /// Unique identifier of a single span.
    SpanId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_span_id() {
        let id = SpanId::random();
        let parsed = id.to_string().parse::<SpanId>().expect("parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn trace_and_span_ids_are_distinct_types() {
        let trace = TraceId::random();
        let span = SpanId::from_uuid(trace.as_uuid());
        assert_eq!(trace.as_uuid(), span.as_uuid());
    }
}
