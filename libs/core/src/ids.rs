use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Empty or whitespace-only ids count as absent.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Account (tenant) that owns the widget and every conversation it opens.
    AccountId
);
string_id!(
    /// Durable customer identifier provisioned by the backend.
    ///
    /// ```
    /// use cws_core::CustomerId;
    ///
    /// let id = CustomerId::from("cust1");
    /// assert_eq!(id.to_string(), "cust1");
    /// assert_eq!(serde_json::to_string(&id).unwrap(), "\"cust1\"");
    /// assert!(CustomerId::from("  ").is_blank());
    /// ```
    CustomerId
);
string_id!(
    /// Conversation identifier; also scopes the realtime topic.
    ConversationId
);
