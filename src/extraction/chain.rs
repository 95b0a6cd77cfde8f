//! First-match-wins extraction rules over headers and messages.

use std::any::{Any, TypeId};
use std::collections::HashSet;

use crate::error::{PersistenceError, Result};
use crate::pipeline::Headers;

type HeaderFn<T> = Box<dyn Fn(&Headers) -> Option<T> + Send + Sync>;
type MessageFn<T> = Box<dyn Fn(&dyn Any, &Headers) -> Option<T> + Send + Sync>;

struct HeaderRule<T> {
    description: String,
    extract: HeaderFn<T>,
}

struct MessageRule<T> {
    description: String,
    extract: MessageFn<T>,
}

/// Ordered extraction rules producing a `T` from message headers or from the
/// deserialized message.
///
/// Rules are tried in registration order and the first that produces a value
/// wins. A header key or a message type can be claimed by one rule only.
pub struct ExtractorChain<T> {
    header_rules: Vec<HeaderRule<T>>,
    header_keys: HashSet<String>,
    message_rules: Vec<MessageRule<T>>,
    message_types: HashSet<TypeId>,
}

impl<T> Default for ExtractorChain<T> {
    fn default() -> Self {
        Self {
            header_rules: Vec::new(),
            header_keys: HashSet::new(),
            message_rules: Vec::new(),
            message_types: HashSet::new(),
        }
    }
}

impl<T: 'static> ExtractorChain<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract from the header `key`, converting its value.
    ///
    /// The rule matches when the header is present and `convert` yields a
    /// value.
    pub fn extract_from_header<F>(&mut self, key: impl Into<String>, convert: F) -> Result<&mut Self>
    where
        F: Fn(&str) -> Option<T> + Send + Sync + 'static,
    {
        let key = key.into();
        if !self.header_keys.insert(key.clone()) {
            return Err(PersistenceError::DuplicateExtractor {
                kind: "header key",
                key,
            });
        }
        let lookup = key.clone();
        self.header_rules.push(HeaderRule {
            description: format!("header '{}'", key),
            extract: Box::new(move |headers| headers.get(&lookup).and_then(|v| convert(v.as_str()))),
        });
        Ok(self)
    }

    /// Extract with an arbitrary function of the headers.
    pub fn extract_from_headers<F>(&mut self, extract: F) -> &mut Self
    where
        F: Fn(&Headers) -> Option<T> + Send + Sync + 'static,
    {
        self.header_rules.push(HeaderRule {
            description: "custom header rule".to_string(),
            extract: Box::new(extract),
        });
        self
    }

    /// Extract from messages of type `M`.
    pub fn extract_from_message<M, F>(&mut self, extract: F) -> Result<&mut Self>
    where
        M: Any,
        F: Fn(&M, &Headers) -> Option<T> + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<M>();
        if !self.message_types.insert(TypeId::of::<M>()) {
            return Err(PersistenceError::DuplicateExtractor {
                kind: "message type",
                key: type_name.to_string(),
            });
        }
        self.message_rules.push(MessageRule {
            description: format!("message type '{}'", type_name),
            extract: Box::new(move |message, headers| {
                message
                    .downcast_ref::<M>()
                    .and_then(|m| extract(m, headers))
            }),
        });
        Ok(self)
    }

    /// Extract with an arbitrary function of the message.
    ///
    /// Matches any message type the function recognizes, which is how a rule
    /// covering a family of message types is expressed.
    pub fn extract_from_any_message<F>(&mut self, extract: F) -> &mut Self
    where
        F: Fn(&dyn Any, &Headers) -> Option<T> + Send + Sync + 'static,
    {
        self.message_rules.push(MessageRule {
            description: "custom message rule".to_string(),
            extract: Box::new(extract),
        });
        self
    }

    pub fn try_extract_from_headers(&self, headers: &Headers) -> Option<T> {
        if headers.is_empty() {
            return None;
        }
        self.header_rules.iter().find_map(|rule| {
            let value = (rule.extract)(headers)?;
            tracing::trace!(rule = %rule.description, "Header extraction rule matched");
            Some(value)
        })
    }

    pub fn try_extract_from_message(&self, message: &dyn Any, headers: &Headers) -> Option<T> {
        self.message_rules.iter().find_map(|rule| {
            let value = (rule.extract)(message, headers)?;
            tracing::trace!(rule = %rule.description, "Message extraction rule matched");
            Some(value)
        })
    }

    pub fn has_header_rules(&self) -> bool {
        !self.header_rules.is_empty()
    }

    pub fn has_message_rules(&self) -> bool {
        !self.message_rules.is_empty()
    }
}
